use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

use super::{Broadcaster, LooperStateMachine, StateMachine, StateManager, STATE_PARAM};
use crate::discovery::{ParameterMapper, ParameterMapping};
use crate::error::LiveResult;
use crate::live::{LiveCommands, ParamValue};
use crate::model::{ItemKind, ItemStateUpdate, LooperInfo};
use crate::visual::VisualRegistry;

struct MonitoredLooper {
    info: LooperInfo,
    machine: LooperStateMachine,
    parameters: ParameterMapping,
    /// Merged snapshot of every value received so far
    current: HashMap<String, ParamValue>,
    last_update: Instant,
}

struct Inner {
    commands: Arc<LiveCommands>,
    visuals: Arc<VisualRegistry>,
    loopers: Mutex<HashMap<String, MonitoredLooper>>,
    broadcaster: Broadcaster,
}

/// Monitors Looper devices through parameter push notifications
///
/// Values are folded into the state machine as they arrive; the broadcast
/// timer only reads snapshots.
pub struct LooperStateManager {
    inner: Arc<Inner>,
    mapper: Arc<ParameterMapper>,
}

impl LooperStateManager {
    pub fn new(
        commands: Arc<LiveCommands>,
        mapper: Arc<ParameterMapper>,
        visuals: Arc<VisualRegistry>,
        broadcast_interval: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                commands,
                visuals,
                loopers: Mutex::new(HashMap::new()),
                broadcaster: Broadcaster::new(broadcast_interval),
            }),
            mapper,
        }
    }

    /// Current snapshot of one looper
    pub fn snapshot(&self, id: &str) -> Option<ItemStateUpdate> {
        self.inner.loopers.lock().get(id).map(snapshot_of)
    }

    /// Time since the looper's state machine last reported a change
    pub fn since_last_update(&self, id: &str) -> Option<Duration> {
        self.inner
            .loopers
            .lock()
            .get(id)
            .map(|looper| looper.last_update.elapsed())
    }

    pub fn is_broadcasting(&self) -> bool {
        self.inner.broadcaster.is_running()
    }

    fn unsubscribe_all(&self, looper: &MonitoredLooper) {
        for (_, index) in looper.parameters.entries() {
            if let Err(e) = self.inner.commands.unsubscribe_parameter(
                looper.info.track_index,
                looper.info.device_index,
                index,
            ) {
                debug!("Unsubscribe of parameter {} on {} failed: {}", index, looper.info.id, e);
            }
        }
    }
}

fn snapshot_of(looper: &MonitoredLooper) -> ItemStateUpdate {
    ItemStateUpdate {
        item_id: looper.info.id.clone(),
        kind: ItemKind::Looper,
        state: looper.machine.state(),
        position: looper.machine.position(),
        length: looper.machine.length(),
        has_position: false,
    }
}

impl Inner {
    fn handle_parameter_update(&self, id: &str, name: &str, value: ParamValue) {
        let mut loopers = self.loopers.lock();
        // Stopped while the message was in flight
        let Some(looper) = loopers.get_mut(id) else {
            return;
        };

        trace!("📊 {} parameter {} = {}", id, name, value);
        looper.current.insert(name.to_string(), value);

        if looper.machine.update_from_parameters(&looper.current) {
            looper.last_update = Instant::now();
            debug!(
                "{} → {} (pos {:.2}, len {:.2})",
                id,
                looper.machine.state(),
                looper.machine.position(),
                looper.machine.length()
            );
        }
    }

    /// One broadcast tick; false once nothing is monitored
    fn broadcast(&self) -> bool {
        let updates: Vec<ItemStateUpdate> = {
            let loopers = self.loopers.lock();
            if loopers.is_empty() {
                return false;
            }
            loopers.values().map(snapshot_of).collect()
        };

        for update in &updates {
            self.visuals.publish(update);
        }
        true
    }
}

fn broadcast_tick(inner: Weak<Inner>) -> impl Fn() -> bool + Send + 'static {
    move || inner.upgrade().is_some_and(|inner| inner.broadcast())
}

#[async_trait]
impl StateManager for LooperStateManager {
    type Item = LooperInfo;

    /// Subscribe to every researched parameter of the looper
    ///
    /// The looper must have been researched with the [`ParameterMapper`]
    /// first; without a mapping nothing is subscribed.
    async fn start_monitoring(&self, looper: &LooperInfo) -> LiveResult<bool> {
        info!(
            "🎬 Starting monitoring for looper \"{}\" ({}: track {}, device {})",
            looper.track_name, looper.id, looper.track_index, looper.device_index
        );

        let Some(parameters) = self.mapper.mappings(&looper.id) else {
            error!("❌ No parameter mappings found for looper {}", looper.id);
            return Ok(false);
        };

        if let Err(e) = self.mapper.require(&looper.id, STATE_PARAM) {
            warn!("{}; state will read as STOPPED", e);
        }

        match self.inner.loopers.lock().entry(looper.id.clone()) {
            Entry::Occupied(_) => {
                warn!("⚠️ Already monitoring looper {}", looper.id);
                return Ok(false);
            }
            Entry::Vacant(slot) => {
                slot.insert(MonitoredLooper {
                    info: looper.clone(),
                    machine: LooperStateMachine::new(),
                    parameters: parameters.clone(),
                    current: HashMap::new(),
                    last_update: Instant::now(),
                });
            }
        }

        debug!("🔔 Subscribing to {} parameters", parameters.len());
        for (name, index) in parameters.entries() {
            let weak = Arc::downgrade(&self.inner);
            let id = looper.id.clone();
            let param_name = name.to_string();

            let subscribed = self.inner.commands.subscribe_parameter(
                looper.track_index,
                looper.device_index,
                index,
                Arc::new(move |value: ParamValue| {
                    if let Some(inner) = weak.upgrade() {
                        inner.handle_parameter_update(&id, &param_name, value);
                    }
                }),
            );

            if let Err(e) = subscribed {
                error!("❌ Failed to subscribe {} \"{}\": {}", looper.id, name, e);
                let record = self.inner.loopers.lock().remove(&looper.id);
                if let Some(record) = record {
                    self.unsubscribe_all(&record);
                }
                return Err(e);
            }
        }

        self.inner
            .broadcaster
            .ensure_running(broadcast_tick(Arc::downgrade(&self.inner)));

        info!("✅ Monitoring looper {}", looper.track_name);
        Ok(true)
    }

    fn stop_monitoring(&self, id: &str) -> bool {
        let (removed, now_empty) = {
            let mut loopers = self.inner.loopers.lock();
            let removed = loopers.remove(id);
            (removed, loopers.is_empty())
        };
        let Some(looper) = removed else {
            return false;
        };

        self.unsubscribe_all(&looper);

        if now_empty {
            self.inner.broadcaster.stop();
        }
        info!("Stopped monitoring looper: {}", id);
        true
    }

    fn monitored_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.loopers.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    fn is_monitoring(&self, id: &str) -> bool {
        self.inner.loopers.lock().contains_key(id)
    }
}
