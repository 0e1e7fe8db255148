use std::sync::Arc;
use tracing::{debug, info, warn};

use super::fallback_track_name;
use crate::error::LiveResult;
use crate::live::addresses::LOOPER_CLASS_NAME;
use crate::live::LiveCommands;
use crate::model::LooperInfo;

/// Scans every track for devices of a given class (Live's Looper by default)
pub struct LooperDiscovery {
    commands: Arc<LiveCommands>,
    class_name: String,
}

impl LooperDiscovery {
    pub fn new(commands: Arc<LiveCommands>) -> Self {
        Self::with_class_name(commands, LOOPER_CLASS_NAME)
    }

    pub fn with_class_name(commands: Arc<LiveCommands>, class_name: impl Into<String>) -> Self {
        Self {
            commands,
            class_name: class_name.into(),
        }
    }

    /// Find every matching device
    ///
    /// Only a failure to read the track count is fatal, or losing the
    /// connection mid-scan. A track whose device list times out or is
    /// malformed contributes nothing; a track whose name cannot be read is
    /// reported as `Track {index}`.
    pub async fn find_loopers(&self) -> LiveResult<Vec<LooperInfo>> {
        let num_tracks = self.commands.get_num_tracks().await?;
        info!("🔍 Scanning {} tracks for {} devices", num_tracks, self.class_name);

        let mut found: Vec<(i32, i32)> = Vec::new();
        for track in 0..num_tracks {
            match self.commands.get_device_class_names(track).await {
                Ok(class_names) => {
                    for (device, class_name) in class_names.iter().enumerate() {
                        if *class_name == self.class_name {
                            debug!("Found {} on track {}, device {}", self.class_name, track, device);
                            found.push((track, device as i32));
                        }
                    }
                }
                Err(e) if !e.is_recoverable() => return Err(e),
                Err(e) => warn!("Error checking track {}: {}", track, e),
            }
        }

        let mut loopers = Vec::with_capacity(found.len());
        for (track, device) in found {
            let name = match self.commands.get_track_name(track).await {
                Ok(name) => name,
                Err(e) => {
                    warn!("Error getting name for track {}: {}", track, e);
                    fallback_track_name(track)
                }
            };
            let color = self.commands.get_track_color(track).await.unwrap_or_else(|e| {
                debug!("No color for track {}: {}", track, e);
                0
            });
            loopers.push(LooperInfo::new(track, device, name, color));
        }

        info!("✅ Total loopers found: {}", loopers.len());
        Ok(loopers)
    }
}
