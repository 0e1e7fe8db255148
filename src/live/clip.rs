//! Clip-slot property descriptors
//!
//! Only `has_clip` gets reliable push notifications from Live; everything else
//! is polled. The acquisition mode is data here so the state manager does not
//! hard-code which property is pushed and which is polled.

use super::addresses::*;
use std::fmt;

/// Which poll timer fetches a property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PollGroup {
    /// Slow timer (playing / recording flags)
    State,
    /// Fast timer, only while the clip plays
    Position,
}

/// How a property's value reaches the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Acquisition {
    /// Live pushes changes after `start_listen`
    Push,
    Poll(PollGroup),
    /// Fetched when playback starts or recording stops
    OnTransition,
}

/// Whether the property lives on the clip slot or on the clip inside it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClipScope {
    ClipSlot,
    Clip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClipAttribute {
    HasClip,
    IsPlaying,
    IsRecording,
    PlayingPosition,
    Length,
}

impl ClipAttribute {
    pub const ALL: [ClipAttribute; 5] = [
        ClipAttribute::HasClip,
        ClipAttribute::IsPlaying,
        ClipAttribute::IsRecording,
        ClipAttribute::PlayingPosition,
        ClipAttribute::Length,
    ];

    pub fn wire_name(self) -> &'static str {
        match self {
            ClipAttribute::HasClip => "has_clip",
            ClipAttribute::IsPlaying => "is_playing",
            ClipAttribute::IsRecording => "is_recording",
            ClipAttribute::PlayingPosition => "playing_position",
            ClipAttribute::Length => "length",
        }
    }

    pub fn scope(self) -> ClipScope {
        match self {
            ClipAttribute::HasClip => ClipScope::ClipSlot,
            _ => ClipScope::Clip,
        }
    }

    pub fn acquisition(self) -> Acquisition {
        match self {
            ClipAttribute::HasClip => Acquisition::Push,
            ClipAttribute::IsPlaying | ClipAttribute::IsRecording => {
                Acquisition::Poll(PollGroup::State)
            }
            ClipAttribute::PlayingPosition => Acquisition::Poll(PollGroup::Position),
            ClipAttribute::Length => Acquisition::OnTransition,
        }
    }

    /// Attributes acquired in the given mode
    pub fn acquired_by(mode: Acquisition) -> impl Iterator<Item = ClipAttribute> {
        Self::ALL
            .into_iter()
            .filter(move |attr| attr.acquisition() == mode)
    }

    /// Attributes Live pushes once subscribed
    pub fn pushed() -> impl Iterator<Item = ClipAttribute> {
        Self::acquired_by(Acquisition::Push)
    }

    /// Request (and reply) address
    pub fn get_address(self) -> &'static str {
        match self {
            ClipAttribute::HasClip => CLIP_SLOT_HAS_CLIP,
            ClipAttribute::IsPlaying => CLIP_IS_PLAYING,
            ClipAttribute::IsRecording => CLIP_IS_RECORDING,
            ClipAttribute::PlayingPosition => CLIP_PLAYING_POSITION,
            ClipAttribute::Length => CLIP_LENGTH,
        }
    }

    pub fn start_listen_address(self) -> &'static str {
        match self {
            ClipAttribute::HasClip => CLIP_SLOT_START_LISTEN_HAS_CLIP,
            ClipAttribute::IsPlaying => CLIP_START_LISTEN_IS_PLAYING,
            ClipAttribute::IsRecording => CLIP_START_LISTEN_IS_RECORDING,
            ClipAttribute::PlayingPosition => CLIP_START_LISTEN_PLAYING_POSITION,
            ClipAttribute::Length => CLIP_START_LISTEN_LENGTH,
        }
    }

    pub fn stop_listen_address(self) -> &'static str {
        match self {
            ClipAttribute::HasClip => CLIP_SLOT_STOP_LISTEN_HAS_CLIP,
            ClipAttribute::IsPlaying => CLIP_STOP_LISTEN_IS_PLAYING,
            ClipAttribute::IsRecording => CLIP_STOP_LISTEN_IS_RECORDING,
            ClipAttribute::PlayingPosition => CLIP_STOP_LISTEN_PLAYING_POSITION,
            ClipAttribute::Length => CLIP_STOP_LISTEN_LENGTH,
        }
    }
}

impl fmt::Display for ClipAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}
