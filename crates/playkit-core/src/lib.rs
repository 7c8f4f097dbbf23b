//! Playkit Core - Embeddable Media Player
//!
//! This crate provides the core of an embeddable player:
//! - Layered configuration with validation
//! - Pluggable media backends (progressive video, audio, HLS, DASH)
//! - Backend detection from explicit type, priority or URL
//! - A lifecycle state machine with ordered event delivery
//! - Control surface model with keyboard shortcuts and auto-hide
//! - Batched analytics with session telemetry
//! - Pre-roll, pause-roll and post-roll advertising
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          Playkit Core                           │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐           │
//! │  │    Config    │  │   Registry   │  │   Platform   │           │
//! │  │    Merge     │  │              │  │  (headless)  │           │
//! │  └──────┬───────┘  └──────┬───────┘  └──────┬───────┘           │
//! │         │                 │                 │                   │
//! │         └─────────────────┼─────────────────┘                   │
//! │                           │                                     │
//! │                    ┌──────┴──────┐                              │
//! │                    │   Player    │                              │
//! │                    │  Instance   │                              │
//! │                    └──────┬──────┘                              │
//! │                           │                                     │
//! │  ┌──────────────┐  ┌──────┴──────┐  ┌──────────────┐            │
//! │  │  Analytics   │  │   Media     │  │     Ads      │            │
//! │  │  Collector   │  │   Source    │  │  Controller  │            │
//! │  └──────────────┘  └──────┬──────┘  └──────────────┘            │
//! │                           │                                     │
//! │         ┌─────────┬───────┴─┬─────────┐    ┌──────────────┐     │
//! │         │  MP4    │ Audio   │ HLS     │    │  UI Control  │     │
//! │         │         │         │ DASH    │    │   Surface    │     │
//! │         └─────────┴─────────┴─────────┘    └──────────────┘     │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use playkit_core::platform::headless::HeadlessPlatform;
//! use playkit_core::{PlayerEvent, PlayerRegistry};
//! use std::sync::Arc;
//!
//! # async fn run() -> playkit_core::Result<()> {
//! let platform = Arc::new(HeadlessPlatform::default());
//! platform.add_container("player");
//!
//! let registry = PlayerRegistry::new(platform);
//! let player = registry.insert("player", serde_json::json!({ "videoUrl": "clip.mp4" }))?;
//! player.events().on(|event: &PlayerEvent| println!("{}", event.name()));
//! player.initialize().await?;
//! player.play().await?;
//! # Ok(())
//! # }
//! ```

pub mod ads;
pub mod analytics;
pub mod config;
pub mod error;
pub mod events;
pub mod platform;
pub mod player;
pub mod registry;
pub mod source;
pub mod types;
pub mod ui;

pub use ads::{AdController, AdKind, AdOutcome};
pub use analytics::{AnalyticsCollector, AnalyticsEvent, AnalyticsTransport, HttpTransport, SessionTelemetry};
pub use config::{create_config, default_config, PlayerConfig};
pub use error::{Error, Result};
pub use events::{EventEmitter, ListenerId, MediaEvent, PlayerEvent, UiIntent};
pub use player::PlayerInstance;
pub use registry::PlayerRegistry;
pub use source::{detect_media_type, MediaSource, MediaSourceFactory, SourceRequest};
pub use types::*;
pub use ui::{Control, ControlSurface, UiController};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the player library with default configuration
pub fn init() {
    tracing::info!(version = VERSION, "Playkit Core initialized");
}
