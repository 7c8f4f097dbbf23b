//! Platform collaborators
//!
//! The player never decodes media or parses manifests itself. It drives
//! what the host environment provides: media elements, adaptive streaming
//! engines, the container subtree and the fullscreen/network APIs. Each of
//! those is a trait here so a browser binding, a native shell or the
//! [`headless`] platform can plug in.

pub mod headless;

use crate::events::EventEmitter;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// MIME type reported by elements that decode HLS natively
pub const HLS_MIME: &str = "application/vnd.apple.mpegurl";
/// MIME type reported by elements that decode DASH natively
pub const DASH_MIME: &str = "application/dash+xml";

/// Kind of media element to create
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    Video,
    Audio,
}

/// Raw events fired by a platform media element
#[derive(Debug, Clone, PartialEq)]
pub enum ElementEvent {
    LoadStart,
    LoadedMetadata { duration: f64 },
    CanPlay,
    Play,
    Playing,
    Pause,
    Ended,
    Waiting,
    TimeUpdate { current_time: f64, duration: f64 },
    VolumeChange { volume: f64, muted: bool },
    Seeking,
    Seeked,
    RateChange { rate: f64 },
    EnterPictureInPicture,
    LeavePictureInPicture,
    Error { code: u16, message: String },
}

/// A platform media element (`<video>` / `<audio>` or equivalent)
#[async_trait]
pub trait MediaElement: Send + Sync {
    fn kind(&self) -> ElementKind;

    fn set_src(&self, url: &str);

    fn src(&self) -> Option<String>;

    /// Start fetching the current source
    fn load(&self);

    /// Begin playback. Platforms may refuse (autoplay policy).
    async fn play(&self) -> Result<()>;

    fn pause(&self);

    fn set_current_time(&self, time: f64);

    fn set_volume(&self, volume: f64);

    fn set_muted(&self, muted: bool);

    fn set_playback_rate(&self, rate: f64);

    fn can_play_type(&self, mime: &str) -> bool;

    fn supports_picture_in_picture(&self) -> bool;

    fn in_picture_in_picture(&self) -> bool;

    async fn request_picture_in_picture(&self) -> Result<()>;

    async fn exit_picture_in_picture(&self) -> Result<()>;

    /// Drop the source and release decoder resources
    fn detach(&self);

    fn events(&self) -> &EventEmitter<ElementEvent>;
}

/// Variant advertised by a streaming engine after manifest parse
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineLevel {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub bitrate: u64,
    pub name: Option<String>,
}

/// Events fired by an adaptive streaming engine
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    ManifestParsed { levels: Vec<EngineLevel> },
    LevelSwitched { index: usize },
    Error { fatal: bool, details: String },
}

/// Control surface of a third-party adaptive streaming library
pub trait StreamingEngine: Send + Sync {
    /// Library name used in logs and wrapped errors
    fn name(&self) -> &'static str;

    /// Whether the library can decode on this platform
    fn is_supported(&self) -> bool;

    /// Bind to an element and start loading the manifest
    fn attach(&self, element: Arc<dyn MediaElement>, url: &str, config: &serde_json::Value) -> Result<()>;

    /// Pin a level, or `None` for adaptive selection
    fn set_level(&self, index: Option<usize>);

    fn auto_level_enabled(&self) -> bool;

    fn destroy(&self);

    fn events(&self) -> &EventEmitter<EngineEvent>;
}

/// The host subtree a player renders into
pub trait Container: Send + Sync {
    fn id(&self) -> &str;

    fn mount(&self, node: &str);

    fn nodes(&self) -> Vec<String>;

    fn clear(&self);

    fn is_empty(&self) -> bool {
        self.nodes().is_empty()
    }
}

/// Network information reported to analytics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    pub effective_type: Option<String>,
    pub downlink_mbps: Option<f64>,
    pub rtt_ms: Option<u32>,
    pub save_data: bool,
}

/// Viewport size in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl std::fmt::Display for Viewport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Everything the player needs from its host environment
#[async_trait]
pub trait Platform: Send + Sync {
    /// Look up a container by id
    fn container(&self, id: &str) -> Option<Arc<dyn Container>>;

    fn create_element(&self, kind: ElementKind) -> Arc<dyn MediaElement>;

    /// A fresh HLS engine, if the library is available
    fn hls_engine(&self) -> Option<Arc<dyn StreamingEngine>>;

    /// A fresh DASH engine, if the library is available
    fn dash_engine(&self) -> Option<Arc<dyn StreamingEngine>>;

    async fn request_fullscreen(&self, container_id: &str) -> Result<()>;

    async fn exit_fullscreen(&self) -> Result<()>;

    fn connection_info(&self) -> ConnectionInfo;

    fn user_agent(&self) -> String;

    fn viewport(&self) -> Viewport;
}
