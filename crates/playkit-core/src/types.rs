//! Core types for playkit

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier for an analytics session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a player embedded on a page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceId(pub Uuid);

impl InstanceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for InstanceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for InstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "player-{}", self.0.simple())
    }
}

/// Playback backend families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    /// Progressive video (mp4, webm, ...)
    Video,
    /// Plain audio file
    Audio,
    /// HTTP Live Streaming
    Hls,
    /// MPEG-DASH
    Dash,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Video => "video",
            MediaType::Audio => "audio",
            MediaType::Hls => "hls",
            MediaType::Dash => "dash",
        }
    }

    /// Adaptive types expose quality levels from a manifest
    pub fn is_adaptive(&self) -> bool {
        matches!(self, MediaType::Hls | MediaType::Dash)
    }
}

impl FromStr for MediaType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "video" | "mp4" | "progressive" => Ok(MediaType::Video),
            "audio" | "mp3" => Ok(MediaType::Audio),
            "hls" | "m3u8" => Ok(MediaType::Hls),
            "dash" | "mpd" => Ok(MediaType::Dash),
            other => Err(crate::Error::UnsupportedMediaType(other.to_string())),
        }
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Player instance state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerPhase {
    /// Source being created and loaded
    Initializing,
    /// First data decoded, playback not yet started
    Ready,
    /// Content is playing
    Playing,
    /// Playback paused
    Paused,
    /// Seek in flight (transient)
    Seeking,
    /// Waiting for data (transient)
    Buffering,
    /// Playback reached the end
    Ended,
    /// Fatal error, needs explicit re-init
    Error,
}

impl PlayerPhase {
    /// Check if transition to target phase is valid
    pub fn can_transition_to(&self, target: PlayerPhase) -> bool {
        use PlayerPhase::*;
        if target == Error {
            return *self != Error;
        }
        matches!(
            (self, target),
            // From Initializing
            (Initializing, Ready) | (Initializing, Initializing) |
            // From Ready
            (Ready, Playing) | (Ready, Paused) | (Ready, Seeking) | (Ready, Buffering) |
            (Ready, Ended) | (Ready, Initializing) |
            // From Playing
            (Playing, Paused) | (Playing, Seeking) | (Playing, Buffering) | (Playing, Ended) |
            (Playing, Initializing) |
            // From Paused
            (Paused, Playing) | (Paused, Seeking) | (Paused, Buffering) | (Paused, Ended) |
            (Paused, Initializing) |
            // Transient overlays settle back onto a stable phase
            (Seeking, Ready) | (Seeking, Playing) | (Seeking, Paused) | (Seeking, Buffering) |
            (Seeking, Ended) | (Seeking, Initializing) |
            (Buffering, Ready) | (Buffering, Playing) | (Buffering, Paused) | (Buffering, Seeking) |
            (Buffering, Ended) | (Buffering, Initializing) |
            // From Ended
            (Ended, Playing) | (Ended, Paused) | (Ended, Seeking) | (Ended, Initializing) |
            // From Error
            (Error, Initializing)
        )
    }

    /// Seeking and buffering overlay a stable phase
    pub fn is_transient(&self) -> bool {
        matches!(self, PlayerPhase::Seeking | PlayerPhase::Buffering)
    }
}

impl std::fmt::Display for PlayerPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlayerPhase::Initializing => write!(f, "initializing"),
            PlayerPhase::Ready => write!(f, "ready"),
            PlayerPhase::Playing => write!(f, "playing"),
            PlayerPhase::Paused => write!(f, "paused"),
            PlayerPhase::Seeking => write!(f, "seeking"),
            PlayerPhase::Buffering => write!(f, "buffering"),
            PlayerPhase::Ended => write!(f, "ended"),
            PlayerPhase::Error => write!(f, "error"),
        }
    }
}

/// Name of the adaptive quality selection
pub const AUTO_QUALITY: &str = "auto";

/// Quality level exposed by an adaptive backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityLevel {
    /// Display name ("auto", "720p", ...)
    pub name: String,
    /// Backend level index, -1 for auto
    pub index: i32,
    /// Vertical resolution
    pub height: Option<u32>,
    /// Bitrate in bits per second
    pub bitrate: Option<u64>,
}

impl QualityLevel {
    /// The adaptive "auto" sentinel
    pub fn auto() -> Self {
        Self {
            name: AUTO_QUALITY.to_string(),
            index: -1,
            height: None,
            bitrate: None,
        }
    }

    pub fn is_auto(&self) -> bool {
        self.index < 0
    }
}

/// Session playback state, owned by the player instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackState {
    pub current_time: f64,
    pub duration: f64,
    pub volume: f64,
    pub muted: bool,
    pub playing: bool,
    pub buffering: bool,
    pub fullscreen: bool,
    pub pip: bool,
    pub quality: String,
    pub playback_rate: f64,
    pub seeking: bool,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            current_time: 0.0,
            duration: 0.0,
            volume: 1.0,
            muted: false,
            playing: false,
            buffering: false,
            fullscreen: false,
            pip: false,
            quality: AUTO_QUALITY.to_string(),
            playback_rate: 1.0,
            seeking: false,
        }
    }
}

impl PlaybackState {
    /// Fraction of the content watched at the current position
    pub fn progress(&self) -> f64 {
        if self.duration > 0.0 {
            (self.current_time / self.duration).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_type_parse() {
        assert_eq!("HLS".parse::<MediaType>().unwrap(), MediaType::Hls);
        assert_eq!("mp4".parse::<MediaType>().unwrap(), MediaType::Video);
        assert!(matches!(
            "flash".parse::<MediaType>(),
            Err(crate::Error::UnsupportedMediaType(_))
        ));
    }

    #[test]
    fn test_phase_transitions() {
        assert!(PlayerPhase::Initializing.can_transition_to(PlayerPhase::Ready));
        assert!(PlayerPhase::Ready.can_transition_to(PlayerPhase::Playing));
        assert!(PlayerPhase::Playing.can_transition_to(PlayerPhase::Paused));
        assert!(PlayerPhase::Ended.can_transition_to(PlayerPhase::Initializing));
        assert!(PlayerPhase::Buffering.can_transition_to(PlayerPhase::Error));

        assert!(!PlayerPhase::Initializing.can_transition_to(PlayerPhase::Playing));
        assert!(!PlayerPhase::Error.can_transition_to(PlayerPhase::Playing));
        assert!(!PlayerPhase::Error.can_transition_to(PlayerPhase::Error));
    }

    #[test]
    fn test_progress_without_duration() {
        let state = PlaybackState {
            current_time: 12.0,
            ..Default::default()
        };
        assert_eq!(state.progress(), 0.0);
        assert_eq!(state.quality, AUTO_QUALITY);
    }
}
