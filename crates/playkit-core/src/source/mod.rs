//! Media backends
//!
//! Every playback technology implements [`MediaSource`]. The player only
//! ever talks to this trait; [`factory::MediaSourceFactory`] picks the
//! implementation.
//!
//! ```text
//!                  ┌──────────────────────┐
//!  SourceRequest ─>│  MediaSourceFactory  │── detect_media_type()
//!                  └──────────┬───────────┘
//!          ┌──────────┬───────┴─────┬────────────┐
//!     Mp4Source  AudioSource   HlsSource    DashSource
//!          │          │             │            │
//!          └──────────┴─ ElementBridge ──────────┘   (element → MediaEvent)
//!                                   └─ AdaptiveController (engine levels)
//! ```

pub mod adaptive;
pub mod audio;
pub mod bridge;
#[cfg(feature = "dash")]
pub mod dash;
pub mod factory;
#[cfg(feature = "hls")]
pub mod hls;
pub mod mp4;

pub use audio::AudioSource;
pub use bridge::ElementBridge;
#[cfg(feature = "dash")]
pub use dash::DashSource;
pub use factory::{detect_media_type, MediaSourceFactory, SourceRequest};
#[cfg(feature = "hls")]
pub use hls::HlsSource;
pub use mp4::Mp4Source;

use crate::events::{EventEmitter, MediaEvent};
use crate::types::{MediaType, QualityLevel};
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Uniform control surface over one playback technology
///
/// Control calls return once the request reached the backend. State changes
/// are reported only through [`MediaSource::events`].
#[async_trait]
pub trait MediaSource: Send + Sync {
    fn media_type(&self) -> MediaType;

    fn url(&self) -> &str;

    /// Normalized event stream
    fn events(&self) -> Arc<EventEmitter<MediaEvent>>;

    /// Resolves once the first data is decoded
    async fn load(&self) -> Result<()>;

    async fn play(&self) -> Result<()>;

    fn pause(&self) -> Result<()>;

    fn seek(&self, time: f64) -> Result<()>;

    /// Volume is clamped to [0, 1]
    fn set_volume(&self, volume: f64) -> Result<()>;

    fn set_muted(&self, muted: bool) -> Result<()>;

    fn set_playback_rate(&self, rate: f64) -> Result<()>;

    /// Select a quality by name. Unknown names fall back to adaptive mode.
    fn set_quality(&self, name: &str) -> Result<()>;

    /// Available qualities, `auto` first. Empty for progressive sources.
    fn qualities(&self) -> Vec<QualityLevel>;

    fn supports_pip(&self) -> bool;

    async fn toggle_picture_in_picture(&self) -> Result<()>;

    /// Release the element and any engine. Idempotent.
    fn destroy(&self);
}
