//! Live Monitor GW
//!
//! Tracks the state of Ableton Live Looper devices and clip slots over
//! AbletonOSC and pushes display snapshots to visual consumers at a fixed rate.

pub mod cli;
pub mod config;
pub mod discovery;
pub mod error;
pub mod live;
pub mod logging;
pub mod model;
pub mod osc;
pub mod paths;
pub mod session;
pub mod state;
pub mod visual;

#[cfg(test)]
mod testing;

pub use error::{LiveError, LiveResult};
pub use session::Session;
