use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::error::{LiveError, LiveResult};
use crate::live::LiveCommands;
use crate::model::LooperInfo;

/// Parameter name to index table for one device
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterMapping {
    by_name: HashMap<String, i32>,
}

impl ParameterMapping {
    /// Build from the names in device order; a repeated name keeps its last index
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Self {
        let by_name = names
            .iter()
            .enumerate()
            .map(|(index, name)| (name.as_ref().to_string(), index as i32))
            .collect();
        Self { by_name }
    }

    pub fn index(&self, name: &str) -> Option<i32> {
        self.by_name.get(name).copied()
    }

    /// `(name, index)` pairs ordered by index
    pub fn entries(&self) -> Vec<(&str, i32)> {
        let mut entries: Vec<(&str, i32)> = self
            .by_name
            .iter()
            .map(|(name, index)| (name.as_str(), *index))
            .collect();
        entries.sort_by_key(|(_, index)| *index);
        entries
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

/// Researches and caches parameter tables per looper id
pub struct ParameterMapper {
    commands: Arc<LiveCommands>,
    mappings: RwLock<HashMap<String, ParameterMapping>>,
}

impl ParameterMapper {
    pub fn new(commands: Arc<LiveCommands>) -> Self {
        Self {
            commands,
            mappings: RwLock::new(HashMap::new()),
        }
    }

    /// Enumerate a looper's parameters and (re)build its table
    pub async fn research(&self, looper: &LooperInfo) -> LiveResult<ParameterMapping> {
        info!(
            "🔬 Researching parameters for \"{}\" (track {}, device {})",
            looper.track_name, looper.track_index, looper.device_index
        );

        let names = self
            .commands
            .get_parameter_names(looper.track_index, looper.device_index)
            .await?;

        // Values are only used for the diagnostic dump below
        match self
            .commands
            .get_parameter_values(looper.track_index, looper.device_index)
            .await
        {
            Ok(values) => {
                for (index, name) in names.iter().enumerate() {
                    match values.get(index) {
                        Some(value) => debug!("  [{}] \"{}\": {}", index, name, value),
                        None => debug!("  [{}] \"{}\": <missing>", index, name),
                    }
                }
            }
            Err(e) => debug!("Parameter values unavailable for {}: {}", looper.id, e),
        }

        let mapping = ParameterMapping::from_names(&names);
        self.mappings
            .write()
            .insert(looper.id.clone(), mapping.clone());

        info!("✅ Stored {} parameter mappings for {}", mapping.len(), looper.id);
        Ok(mapping)
    }

    /// Research every looper; returns the ids that failed
    pub async fn map_all(&self, loopers: &[LooperInfo]) -> Vec<String> {
        let mut failed = Vec::new();
        for looper in loopers {
            if let Err(e) = self.research(looper).await {
                error!("❌ Error researching parameters for {}: {}", looper.id, e);
                failed.push(looper.id.clone());
            }
        }
        if !failed.is_empty() {
            warn!("Parameter research failed for {} looper(s)", failed.len());
        }
        failed
    }

    pub fn resolve(&self, id: &str, name: &str) -> Option<i32> {
        self.mappings.read().get(id).and_then(|m| m.index(name))
    }

    /// Like [`resolve`](Self::resolve), but as an error for callers that need the index
    pub fn require(&self, id: &str, name: &str) -> LiveResult<i32> {
        self.resolve(id, name)
            .ok_or_else(|| LiveError::UnmappedParameter {
                entity_id: id.to_string(),
                name: name.to_string(),
            })
    }

    pub fn mappings(&self, id: &str) -> Option<ParameterMapping> {
        self.mappings.read().get(id).cloned()
    }

    pub fn forget(&self, id: &str) -> bool {
        self.mappings.write().remove(id).is_some()
    }
}
