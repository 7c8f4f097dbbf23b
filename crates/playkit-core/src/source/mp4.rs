//! Progressive video backend

use super::bridge::ElementBridge;
use super::MediaSource;
use crate::events::{EventEmitter, MediaEvent};
use crate::platform::{ElementKind, Platform};
use crate::types::{MediaType, QualityLevel};
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Plays a single progressive file (mp4, webm, ...) on a video element
pub struct Mp4Source {
    url: String,
    bridge: ElementBridge,
}

impl Mp4Source {
    pub fn new(url: &str, platform: &dyn Platform) -> Self {
        Self {
            url: url.to_string(),
            bridge: ElementBridge::new(platform.create_element(ElementKind::Video)),
        }
    }
}

#[async_trait]
impl MediaSource for Mp4Source {
    fn media_type(&self) -> MediaType {
        MediaType::Video
    }

    fn url(&self) -> &str {
        &self.url
    }

    fn events(&self) -> Arc<EventEmitter<MediaEvent>> {
        self.bridge.events()
    }

    #[instrument(skip(self), fields(url = %self.url))]
    async fn load(&self) -> Result<()> {
        self.bridge.load_src(&self.url).await
    }

    async fn play(&self) -> Result<()> {
        self.bridge.play().await
    }

    fn pause(&self) -> Result<()> {
        self.bridge.pause()
    }

    fn seek(&self, time: f64) -> Result<()> {
        self.bridge.seek(time)
    }

    fn set_volume(&self, volume: f64) -> Result<()> {
        self.bridge.set_volume(volume)
    }

    fn set_muted(&self, muted: bool) -> Result<()> {
        self.bridge.set_muted(muted)
    }

    fn set_playback_rate(&self, rate: f64) -> Result<()> {
        self.bridge.set_playback_rate(rate)
    }

    fn set_quality(&self, name: &str) -> Result<()> {
        debug!(quality = name, "Progressive sources have a single rendition");
        Ok(())
    }

    fn qualities(&self) -> Vec<QualityLevel> {
        Vec::new()
    }

    fn supports_pip(&self) -> bool {
        self.bridge.supports_pip()
    }

    async fn toggle_picture_in_picture(&self) -> Result<()> {
        self.bridge.toggle_picture_in_picture().await
    }

    fn destroy(&self) {
        self.bridge.destroy();
    }
}
