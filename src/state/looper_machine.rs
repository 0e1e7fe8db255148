use std::collections::HashMap;
use tracing::{debug, warn};

use super::StateMachine;
use crate::live::ParamValue;
use crate::model::MonitoredState;

pub const STATE_PARAM: &str = "State";
pub const POSITION_PARAM: &str = "Song Pos";
pub const LENGTH_PARAM: &str = "Length";

const POSITION_THRESHOLD: f64 = 0.01;
const LENGTH_THRESHOLD: f64 = 0.01;

/// Interprets a Looper device from its merged parameter snapshot
///
/// The device exposes no armed states and no empty/stopped distinction, so
/// only STOPPED, RECORDING, PLAYING and OVERDUBBING are ever produced after
/// the first update.
#[derive(Debug, Clone, Default)]
pub struct LooperStateMachine {
    state: MonitoredState,
    position: f64,
    length: f64,
}

impl LooperStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-evaluate from the full snapshot; true when state, position or length moved
    pub fn update_from_parameters(&mut self, params: &HashMap<String, ParamValue>) -> bool {
        let mut changed = false;

        if let Some(state) = detect_state(params) {
            if state != self.state {
                debug!("🎯 Looper state changed: {} -> {}", self.state, state);
                self.state = state;
                changed = true;
            }
        }

        if let Some(position) = params.get(POSITION_PARAM).and_then(ParamValue::as_number) {
            if (position - self.position).abs() > POSITION_THRESHOLD {
                self.position = position;
                changed = true;
            }
        }

        if let Some(length) = params.get(LENGTH_PARAM).and_then(ParamValue::as_number) {
            if (length - self.length).abs() > LENGTH_THRESHOLD {
                self.length = length;
                changed = true;
            }
        }

        changed
    }
}

impl StateMachine for LooperStateMachine {
    fn state(&self) -> MonitoredState {
        self.state
    }

    fn position(&self) -> f64 {
        self.position
    }

    fn length(&self) -> f64 {
        self.length
    }
}

/// `None` keeps the current state
fn detect_state(params: &HashMap<String, ParamValue>) -> Option<MonitoredState> {
    let Some(value) = params.get(STATE_PARAM) else {
        return Some(MonitoredState::Stopped);
    };

    match value {
        ParamValue::Text(text) => {
            let state = state_from_text(text);
            if state.is_none() {
                warn!("⚠️ Unknown looper state string: \"{}\"", text);
            }
            state
        }
        ParamValue::Number(n) => state_from_number(*n),
    }
}

fn state_from_text(text: &str) -> Option<MonitoredState> {
    match text.to_lowercase().as_str() {
        "stop" | "stopped" => Some(MonitoredState::Stopped),
        "record" | "recording" => Some(MonitoredState::Recording),
        "play" | "playing" => Some(MonitoredState::Playing),
        "overdub" | "overdubbing" => Some(MonitoredState::Overdubbing),
        _ => None,
    }
}

fn state_from_number(value: f64) -> Option<MonitoredState> {
    if value == 0.0 {
        Some(MonitoredState::Stopped)
    } else if value == 1.0 {
        Some(MonitoredState::Recording)
    } else if value == 2.0 {
        Some(MonitoredState::Playing)
    } else if value == 3.0 {
        Some(MonitoredState::Overdubbing)
    } else {
        None
    }
}
