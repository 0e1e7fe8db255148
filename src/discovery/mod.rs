//! Entity discovery and parameter research

mod looper;
mod parameters;
mod tracks;

pub use looper::LooperDiscovery;
pub use parameters::{ParameterMapper, ParameterMapping};
pub use tracks::{TrackListProvider, DEFAULT_SCENE_COUNT};

/// Name used when a track's real name could not be fetched
pub(crate) fn fallback_track_name(index: i32) -> String {
    format!("Track {}", index)
}
