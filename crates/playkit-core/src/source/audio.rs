//! Plain audio backend

use super::bridge::ElementBridge;
use super::MediaSource;
use crate::events::{EventEmitter, MediaEvent};
use crate::platform::{ElementKind, Platform};
use crate::types::{MediaType, QualityLevel};
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::instrument;

/// Plays an audio file on an audio element
pub struct AudioSource {
    url: String,
    bridge: ElementBridge,
}

impl AudioSource {
    pub fn new(url: &str, platform: &dyn Platform) -> Self {
        Self {
            url: url.to_string(),
            bridge: ElementBridge::new(platform.create_element(ElementKind::Audio)),
        }
    }
}

#[async_trait]
impl MediaSource for AudioSource {
    fn media_type(&self) -> MediaType {
        MediaType::Audio
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

    fn set_quality(&self, _name: &str) -> Result<()> {
        Ok(())
    }

    fn qualities(&self) -> Vec<QualityLevel> {
        Vec::new()
    }

    fn supports_pip(&self) -> bool {
        false
    }

    async fn toggle_picture_in_picture(&self) -> Result<()> {
        Err(Error::playback("pip", "audio sources have no picture"))
    }

    fn destroy(&self) {
        self.bridge.destroy();
    }
}
