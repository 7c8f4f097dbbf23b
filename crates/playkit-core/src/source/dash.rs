//! DASH backend

use super::adaptive::{AdaptiveController, DecodePath};
use super::MediaSource;
use crate::events::{EventEmitter, MediaEvent};
use crate::platform::{ElementKind, Platform, DASH_MIME};
use crate::types::{MediaType, QualityLevel};
use crate::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::instrument;

/// MPEG-DASH through the platform's DASH engine
pub struct DashSource {
    inner: AdaptiveController,
}

impl DashSource {
    pub fn new(url: &str, platform: &dyn Platform, engine_config: Value) -> Self {
        let element = platform.create_element(ElementKind::Video);
        Self {
            inner: AdaptiveController::new(
                MediaType::Dash,
                DASH_MIME,
                url,
                element,
                platform.dash_engine(),
                engine_config,
            ),
        }
    }

    pub fn decode_path(&self) -> Option<DecodePath> {
        self.inner.decode_path()
    }
}

#[async_trait]
impl MediaSource for DashSource {
    fn media_type(&self) -> MediaType {
        MediaType::Dash
    }

    fn url(&self) -> &str {
        self.inner.url()
    }

    fn events(&self) -> Arc<EventEmitter<MediaEvent>> {
        self.inner.bridge().events()
    }

    #[instrument(skip(self), fields(url = %self.inner.url()))]
    async fn load(&self) -> Result<()> {
        self.inner.load().await
    }

    async fn play(&self) -> Result<()> {
        self.inner.bridge().play().await
    }

    fn pause(&self) -> Result<()> {
        self.inner.bridge().pause()
    }

    fn seek(&self, time: f64) -> Result<()> {
        self.inner.bridge().seek(time)
    }

    fn set_volume(&self, volume: f64) -> Result<()> {
        self.inner.bridge().set_volume(volume)
    }

    fn set_muted(&self, muted: bool) -> Result<()> {
        self.inner.bridge().set_muted(muted)
    }

    fn set_playback_rate(&self, rate: f64) -> Result<()> {
        self.inner.bridge().set_playback_rate(rate)
    }

    fn set_quality(&self, name: &str) -> Result<()> {
        self.inner.set_quality(name)
    }

    fn qualities(&self) -> Vec<QualityLevel> {
        self.inner.qualities()
    }

    fn supports_pip(&self) -> bool {
        self.inner.bridge().supports_pip()
    }

    async fn toggle_picture_in_picture(&self) -> Result<()> {
        self.inner.bridge().toggle_picture_in_picture().await
    }

    fn destroy(&self) {
        self.inner.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::headless::HeadlessPlatform;

    #[tokio::test]
    async fn test_dash_uses_engine() {
        let platform = HeadlessPlatform::default();
        let source = DashSource::new("https://cdn.example.com/stream.mpd", &platform, Value::Null);

        source.load().await.unwrap();

        assert_eq!(source.decode_path(), Some(DecodePath::Engine));
        assert_eq!(
            platform.last_engine().unwrap().url().as_deref(),
            Some("https://cdn.example.com/stream.mpd")
        );
        assert_eq!(source.qualities()[0].index, -1);
    }

    #[tokio::test]
    async fn test_abr_switch_in_auto_mode_keeps_auto() {
        let platform = HeadlessPlatform::default();
        let source = DashSource::new("stream.mpd", &platform, Value::Null);
        source.load().await.unwrap();
        let changes = Arc::new(parking_lot::Mutex::new(0));
        let c = Arc::clone(&changes);
        source.events().on(move |e| {
            if matches!(e, MediaEvent::QualityChanged { .. }) {
                *c.lock() += 1;
            }
        });

        platform.last_engine().unwrap().switch_level(2);

        assert_eq!(*changes.lock(), 0);
    }
}
