//! Visual consumers - where broadcast snapshots end up
//!
//! A consumer stands in for one on-screen indicator. The registry maps item
//! ids to consumers; the state managers publish through it on every tick.

use colored::*;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::io::Write;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::model::{ItemStateUpdate, MonitoredItem, MonitoredState};

/// Receives state snapshots. Must not block: it is called from the broadcast timer.
pub trait VisualConsumer: Send + Sync {
    fn push(&self, update: &ItemStateUpdate);
}

/// Item id → consumers
pub struct VisualRegistry {
    consumers: DashMap<String, Vec<Arc<dyn VisualConsumer>>>,
    /// Ids already reported as missing a consumer
    missing_warned: DashMap<String, ()>,
}

impl Default for VisualRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl VisualRegistry {
    pub fn new() -> Self {
        Self {
            consumers: DashMap::new(),
            missing_warned: DashMap::new(),
        }
    }

    /// Attach a consumer; several consumers per id all receive every push
    pub fn register(&self, id: &str, consumer: Arc<dyn VisualConsumer>) {
        self.missing_warned.remove(id);
        self.consumers.entry(id.to_string()).or_default().push(consumer);
        debug!("Visual consumer registered for {}", id);
    }

    /// Drop every consumer of an id; returns how many were removed
    pub fn unregister(&self, id: &str) -> usize {
        self.missing_warned.remove(id);
        self.consumers.remove(id).map_or(0, |(_, list)| list.len())
    }

    pub fn has_consumer(&self, id: &str) -> bool {
        self.consumers.get(id).is_some_and(|list| !list.is_empty())
    }

    /// Deliver to every consumer of `update.item_id`; false when there is none
    pub fn publish(&self, update: &ItemStateUpdate) -> bool {
        // Clone the list so no shard lock is held while consumers run
        let targets: Vec<Arc<dyn VisualConsumer>> = self
            .consumers
            .get(&update.item_id)
            .map(|list| list.value().clone())
            .unwrap_or_default();

        if targets.is_empty() {
            if self
                .missing_warned
                .insert(update.item_id.clone(), ())
                .is_none()
            {
                warn!("⚠️ No visual consumer for item {}", update.item_id);
            }
            return false;
        }

        for consumer in targets {
            consumer.push(update);
        }
        true
    }
}

fn state_label(state: MonitoredState) -> ColoredString {
    let label = state.as_str();
    match state {
        MonitoredState::Empty => label.bright_black(),
        MonitoredState::Stopped => label.white(),
        MonitoredState::Recording | MonitoredState::ArmedRecording => label.bright_red().bold(),
        MonitoredState::Playing | MonitoredState::ArmedStopping => label.bright_green().bold(),
        MonitoredState::Overdubbing | MonitoredState::ArmedOverdub => label.bright_yellow().bold(),
    }
}

/// Prints a colored line whenever the item's state changes
pub struct ConsoleConsumer {
    label: String,
    last_state: Mutex<Option<MonitoredState>>,
}

impl ConsoleConsumer {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            last_state: Mutex::new(None),
        }
    }

    pub fn for_item(item: &MonitoredItem) -> Arc<dyn VisualConsumer> {
        Arc::new(Self::new(item.display_name()))
    }
}

impl VisualConsumer for ConsoleConsumer {
    fn push(&self, update: &ItemStateUpdate) {
        {
            let mut last = self.last_state.lock();
            if *last == Some(update.state) {
                return;
            }
            *last = Some(update.state);
        }

        let detail = if update.has_position && update.length > 0.0 {
            format!(
                " {:>5.1}% of {:.1} beats",
                update.position * 100.0,
                update.length
            )
        } else if update.length > 0.0 {
            format!(" ({:.1} beats)", update.length)
        } else {
            String::new()
        };

        println!(
            "[{}] {:<24} {} {}{}",
            chrono::Local::now().format("%H:%M:%S%.3f").to_string().dimmed(),
            self.label.bright_white(),
            "→".dimmed(),
            state_label(update.state),
            detail.dimmed()
        );
    }
}

/// Writes one JSON object per line whenever the item's state changes
pub struct JsonLinesConsumer {
    last_state: Mutex<Option<MonitoredState>>,
}

impl JsonLinesConsumer {
    pub fn new() -> Self {
        Self {
            last_state: Mutex::new(None),
        }
    }

    pub fn for_item(_item: &MonitoredItem) -> Arc<dyn VisualConsumer> {
        Arc::new(Self::new())
    }
}

impl Default for JsonLinesConsumer {
    fn default() -> Self {
        Self::new()
    }
}

impl VisualConsumer for JsonLinesConsumer {
    fn push(&self, update: &ItemStateUpdate) {
        {
            let mut last = self.last_state.lock();
            if *last == Some(update.state) {
                return;
            }
            *last = Some(update.state);
        }

        match serde_json::to_string(update) {
            Ok(line) => {
                let mut stdout = std::io::stdout().lock();
                let _ = writeln!(stdout, "{}", line);
            }
            Err(e) => warn!("Failed to serialize update for {}: {}", update.item_id, e),
        }
    }
}

/// Forwards every snapshot into a channel
pub struct ChannelConsumer {
    tx: mpsc::UnboundedSender<ItemStateUpdate>,
}

impl ChannelConsumer {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ItemStateUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }

    /// Share one sender between several items
    pub fn from_sender(tx: mpsc::UnboundedSender<ItemStateUpdate>) -> Arc<Self> {
        Arc::new(Self { tx })
    }
}

impl VisualConsumer for ChannelConsumer {
    fn push(&self, update: &ItemStateUpdate) {
        // Receiver gone means nobody is watching anymore
        let _ = self.tx.send(update.clone());
    }
}
