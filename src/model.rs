//! Monitored entities and the state snapshots pushed to visual consumers

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemKind {
    Looper,
    Clip,
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemKind::Looper => f.write_str("LOOPER"),
            ItemKind::Clip => f.write_str("CLIP"),
        }
    }
}

/// Discrete display state shared by loopers and clips
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MonitoredState {
    #[default]
    Empty,
    Stopped,
    ArmedRecording,
    Recording,
    ArmedStopping,
    Playing,
    ArmedOverdub,
    Overdubbing,
}

impl MonitoredState {
    pub fn as_str(self) -> &'static str {
        match self {
            MonitoredState::Empty => "EMPTY",
            MonitoredState::Stopped => "STOPPED",
            MonitoredState::ArmedRecording => "ARMED_RECORDING",
            MonitoredState::Recording => "RECORDING",
            MonitoredState::ArmedStopping => "ARMED_STOPPING",
            MonitoredState::Playing => "PLAYING",
            MonitoredState::ArmedOverdub => "ARMED_OVERDUB",
            MonitoredState::Overdubbing => "OVERDUBBING",
        }
    }
}

impl fmt::Display for MonitoredState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A Looper device found on a track
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LooperInfo {
    pub track_index: i32,
    pub device_index: i32,
    pub track_name: String,
    pub track_color: i32,
    /// `track-device`
    pub id: String,
}

impl LooperInfo {
    pub fn new(track_index: i32, device_index: i32, track_name: impl Into<String>, track_color: i32) -> Self {
        Self {
            track_index,
            device_index,
            track_name: track_name.into(),
            track_color,
            id: Self::make_id(track_index, device_index),
        }
    }

    pub fn make_id(track_index: i32, device_index: i32) -> String {
        format!("{}-{}", track_index, device_index)
    }

    pub fn display_name(&self) -> String {
        self.track_name.clone()
    }
}

/// A clip slot on a track, addressed by scene
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipInfo {
    pub track_index: i32,
    pub clip_index: i32,
    pub track_name: String,
    pub track_color: i32,
    /// `clip-track-scene`
    pub id: String,
}

impl ClipInfo {
    pub fn new(track_index: i32, clip_index: i32, track_name: impl Into<String>, track_color: i32) -> Self {
        Self {
            track_index,
            clip_index,
            track_name: track_name.into(),
            track_color,
            id: Self::make_id(track_index, clip_index),
        }
    }

    pub fn make_id(track_index: i32, clip_index: i32) -> String {
        format!("clip-{}-{}", track_index, clip_index)
    }

    pub fn display_name(&self) -> String {
        format!("{} - Scene {}", self.track_name, self.clip_index + 1)
    }
}

/// Track as listed for the clip picker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackInfo {
    pub index: i32,
    pub name: String,
    pub color: i32,
}

/// Anything a visual consumer can be attached to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitoredItem {
    Looper(LooperInfo),
    Clip(ClipInfo),
}

impl MonitoredItem {
    pub fn id(&self) -> &str {
        match self {
            MonitoredItem::Looper(l) => &l.id,
            MonitoredItem::Clip(c) => &c.id,
        }
    }

    pub fn kind(&self) -> ItemKind {
        match self {
            MonitoredItem::Looper(_) => ItemKind::Looper,
            MonitoredItem::Clip(_) => ItemKind::Clip,
        }
    }

    pub fn display_name(&self) -> String {
        match self {
            MonitoredItem::Looper(l) => l.display_name(),
            MonitoredItem::Clip(c) => c.display_name(),
        }
    }

    pub fn track_color(&self) -> i32 {
        match self {
            MonitoredItem::Looper(l) => l.track_color,
            MonitoredItem::Clip(c) => c.track_color,
        }
    }
}

/// Snapshot pushed to visual consumers on every broadcast tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemStateUpdate {
    pub item_id: String,
    #[serde(rename = "type")]
    pub kind: ItemKind,
    pub state: MonitoredState,
    /// 0.0..=1.0 once a length is known
    pub position: f64,
    /// Beats
    pub length: f64,
    pub has_position: bool,
}
