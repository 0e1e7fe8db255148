use rosc::OscType;

use super::StateMachine;
use crate::live::{osc_bool, ClipAttribute};
use crate::model::MonitoredState;
use crate::osc::osc_number;

const LENGTH_THRESHOLD: f64 = 0.01;
const POSITION_THRESHOLD: f64 = 0.001;

/// Last known clip-slot properties (`None` until first seen)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClipProperties {
    pub has_clip: Option<bool>,
    pub is_playing: Option<bool>,
    pub is_recording: Option<bool>,
    /// Raw playing position in beats
    pub position: Option<f64>,
    /// Beats
    pub length: Option<f64>,
}

/// Partial batch of clip properties; buffered by the manager between ticks
pub type ClipUpdate = ClipProperties;

impl ClipProperties {
    pub fn is_empty(&self) -> bool {
        self.has_clip.is_none()
            && self.is_playing.is_none()
            && self.is_recording.is_none()
            && self.position.is_none()
            && self.length.is_none()
    }

    /// Record a raw value for one attribute. Returns false if the value has the wrong type.
    pub fn set(&mut self, attribute: ClipAttribute, value: &OscType) -> bool {
        match attribute {
            ClipAttribute::HasClip => assign(&mut self.has_clip, osc_bool(value)),
            ClipAttribute::IsPlaying => assign(&mut self.is_playing, osc_bool(value)),
            ClipAttribute::IsRecording => assign(&mut self.is_recording, osc_bool(value)),
            ClipAttribute::PlayingPosition => assign(&mut self.position, osc_number(value)),
            ClipAttribute::Length => assign(&mut self.length, osc_number(value)),
        }
    }

    /// Overlay the fields present in `newer`
    pub fn merge(&mut self, newer: &ClipProperties) {
        self.has_clip = newer.has_clip.or(self.has_clip);
        self.is_playing = newer.is_playing.or(self.is_playing);
        self.is_recording = newer.is_recording.or(self.is_recording);
        self.position = newer.position.or(self.position);
        self.length = newer.length.or(self.length);
    }
}

fn assign<T>(slot: &mut Option<T>, value: Option<T>) -> bool {
    match value {
        Some(v) => {
            *slot = Some(v);
            true
        }
        None => false,
    }
}

/// Derives a clip slot's display state from its properties
///
/// Priority: no clip → EMPTY, recording → RECORDING, playing → PLAYING,
/// otherwise STOPPED. Armed states are never produced.
#[derive(Debug, Clone, Default)]
pub struct ClipStateMachine {
    properties: ClipProperties,
    state: MonitoredState,
    /// Normalized 0.0..=1.0
    position: f64,
    length: f64,
}

impl ClipStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a partial batch; true when any property or the state moved
    pub fn update(&mut self, update: &ClipUpdate) -> bool {
        let mut changed = false;
        let props = &mut self.properties;

        for (incoming, stored) in [
            (update.has_clip, &mut props.has_clip),
            (update.is_playing, &mut props.is_playing),
            (update.is_recording, &mut props.is_recording),
        ] {
            if let Some(value) = incoming {
                if *stored != Some(value) {
                    *stored = Some(value);
                    changed = true;
                }
            }
        }

        // Length first: position normalization needs it
        if let Some(length) = update.length {
            if (length - props.length.unwrap_or(0.0)).abs() > LENGTH_THRESHOLD {
                props.length = Some(length);
                self.length = length;
                changed = true;
            }
        }

        if let Some(position) = update.position {
            if (position - props.position.unwrap_or(0.0)).abs() > POSITION_THRESHOLD {
                props.position = Some(position);
                self.position = normalize_position(position, self.length);
                changed = true;
            }
        }

        let state = derive_state(&self.properties);
        if state != self.state {
            self.state = state;
            changed = true;
        }

        changed
    }

    pub fn properties(&self) -> &ClipProperties {
        &self.properties
    }
}

impl StateMachine for ClipStateMachine {
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

/// `clamp(position / length, 0, 1)`, or 0 without a positive length
pub fn normalize_position(position: f64, length: f64) -> f64 {
    if length > 0.0 {
        (position / length).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn derive_state(props: &ClipProperties) -> MonitoredState {
    if props.has_clip == Some(false) {
        MonitoredState::Empty
    } else if props.is_recording == Some(true) {
        MonitoredState::Recording
    } else if props.is_playing == Some(true) {
        MonitoredState::Playing
    } else {
        MonitoredState::Stopped
    }
}
