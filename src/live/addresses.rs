//! AbletonOSC address table
//!
//! Every request address doubles as its own reply address.

pub const TEST: &str = "/live/test";

pub const SONG_NUM_TRACKS: &str = "/live/song/get/num_tracks";
pub const SONG_NUM_SCENES: &str = "/live/song/get/num_scenes";

pub const TRACK_NAME: &str = "/live/track/get/name";
pub const TRACK_COLOR: &str = "/live/track/get/color";
pub const TRACK_DEVICE_CLASS_NAMES: &str = "/live/track/get/devices/class_name";

pub const DEVICE_NAME: &str = "/live/device/get/name";
pub const DEVICE_PARAMETER_NAMES: &str = "/live/device/get/parameters/name";
pub const DEVICE_PARAMETER_VALUES: &str = "/live/device/get/parameters/value";
pub const DEVICE_PARAMETER_VALUE: &str = "/live/device/get/parameter/value";
pub const DEVICE_PARAMETER_VALUE_STRING: &str = "/live/device/get/parameter/value_string";
pub const DEVICE_SET_PARAMETER_VALUE: &str = "/live/device/set/parameter/value";
pub const DEVICE_START_LISTEN_PARAMETER: &str = "/live/device/start_listen/parameter/value";
pub const DEVICE_STOP_LISTEN_PARAMETER: &str = "/live/device/stop_listen/parameter/value";

pub const CLIP_SLOT_HAS_CLIP: &str = "/live/clip_slot/get/has_clip";
pub const CLIP_SLOT_START_LISTEN_HAS_CLIP: &str = "/live/clip_slot/start_listen/has_clip";
pub const CLIP_SLOT_STOP_LISTEN_HAS_CLIP: &str = "/live/clip_slot/stop_listen/has_clip";

pub const CLIP_IS_PLAYING: &str = "/live/clip/get/is_playing";
pub const CLIP_START_LISTEN_IS_PLAYING: &str = "/live/clip/start_listen/is_playing";
pub const CLIP_STOP_LISTEN_IS_PLAYING: &str = "/live/clip/stop_listen/is_playing";

pub const CLIP_IS_RECORDING: &str = "/live/clip/get/is_recording";
pub const CLIP_START_LISTEN_IS_RECORDING: &str = "/live/clip/start_listen/is_recording";
pub const CLIP_STOP_LISTEN_IS_RECORDING: &str = "/live/clip/stop_listen/is_recording";

pub const CLIP_PLAYING_POSITION: &str = "/live/clip/get/playing_position";
pub const CLIP_START_LISTEN_PLAYING_POSITION: &str = "/live/clip/start_listen/playing_position";
pub const CLIP_STOP_LISTEN_PLAYING_POSITION: &str = "/live/clip/stop_listen/playing_position";

pub const CLIP_LENGTH: &str = "/live/clip/get/length";
pub const CLIP_START_LISTEN_LENGTH: &str = "/live/clip/start_listen/length";
pub const CLIP_STOP_LISTEN_LENGTH: &str = "/live/clip/stop_listen/length";

/// Device class name reported for Live's Looper
pub const LOOPER_CLASS_NAME: &str = "Looper";
