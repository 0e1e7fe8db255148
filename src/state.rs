//! State tracking engine - interpreted display state per monitored item
//!
//! Two state machines turn raw Live signals into a [`MonitoredState`]: the
//! looper machine reads the device's parameter snapshot, the clip machine
//! reads clip-slot properties. Each manager owns its monitored records, wires
//! subscriptions and poll timers per record, and runs one shared broadcast
//! timer pushing snapshots to the visual registry.

mod broadcast;
mod clip_machine;
mod clip_manager;
mod looper_machine;
mod looper_manager;

pub use broadcast::Broadcaster;
pub use clip_machine::{ClipProperties, ClipStateMachine, ClipUpdate};
pub use clip_manager::ClipStateManager;
pub use looper_machine::{LooperStateMachine, LENGTH_PARAM, POSITION_PARAM, STATE_PARAM};
pub use looper_manager::LooperStateManager;

use async_trait::async_trait;

use crate::error::LiveResult;
use crate::model::MonitoredState;

/// Read side shared by both state machines
pub trait StateMachine {
    fn state(&self) -> MonitoredState;
    /// Normalized for clips, raw for loopers
    fn position(&self) -> f64;
    fn length(&self) -> f64;
}

/// Lifecycle contract of a state manager
#[async_trait]
pub trait StateManager: Send + Sync {
    type Item: Send + Sync;

    /// Returns false when the item was not started (already monitored, or nothing to subscribe)
    async fn start_monitoring(&self, item: &Self::Item) -> LiveResult<bool>;

    /// Cancels every timer of the item before returning. Unknown ids are a no-op.
    fn stop_monitoring(&self, id: &str) -> bool;

    fn monitored_ids(&self) -> Vec<String>;

    fn is_monitoring(&self, id: &str) -> bool;

    fn stop_all_monitoring(&self) {
        for id in self.monitored_ids() {
            self.stop_monitoring(&id);
        }
    }
}
