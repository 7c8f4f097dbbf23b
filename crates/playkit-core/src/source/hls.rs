//! HLS backend

use super::adaptive::{AdaptiveController, DecodePath};
use super::MediaSource;
use crate::events::{EventEmitter, MediaEvent};
use crate::platform::{ElementKind, Platform, HLS_MIME};
use crate::types::{MediaType, QualityLevel};
use crate::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::instrument;

/// HTTP Live Streaming, decoded natively when the element can, otherwise
/// through the platform's HLS engine
pub struct HlsSource {
    inner: AdaptiveController,
}

impl HlsSource {
    pub fn new(url: &str, platform: &dyn Platform, engine_config: Value) -> Self {
        let element = platform.create_element(ElementKind::Video);
        Self {
            inner: AdaptiveController::new(
                MediaType::Hls,
                HLS_MIME,
                url,
                element,
                platform.hls_engine(),
                engine_config,
            ),
        }
    }

    /// Decode path chosen by the last `load`
    pub fn decode_path(&self) -> Option<DecodePath> {
        self.inner.decode_path()
    }
}

#[async_trait]
impl MediaSource for HlsSource {
    fn media_type(&self) -> MediaType {
        MediaType::Hls
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
    use crate::platform::headless::{HeadlessOptions, HeadlessPlatform};
    use crate::platform::{MediaElement, StreamingEngine};
    use crate::Error;
    use parking_lot::Mutex;

    fn record(source: &HlsSource) -> Arc<Mutex<Vec<MediaEvent>>> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let l = Arc::clone(&log);
        source.events().on(move |e| l.lock().push(e.clone()));
        log
    }

    #[tokio::test]
    async fn test_engine_path_extracts_qualities() {
        let platform = HeadlessPlatform::default();
        let source = HlsSource::new("https://cdn.example.com/master.m3u8", &platform, Value::Null);

        source.load().await.unwrap();

        assert_eq!(source.decode_path(), Some(DecodePath::Engine));
        let names: Vec<_> = source.qualities().into_iter().map(|q| q.name).collect();
        assert_eq!(names, vec!["auto", "360p", "720p", "1080p"]);
    }

    #[tokio::test]
    async fn test_native_path_preferred() {
        let platform = HeadlessPlatform::new(HeadlessOptions {
            native_hls: true,
            ..Default::default()
        });
        let source = HlsSource::new("master.m3u8", &platform, Value::Null);

        source.load().await.unwrap();

        assert_eq!(source.decode_path(), Some(DecodePath::Native));
        assert_eq!(source.qualities().len(), 1);
        assert_eq!(
            platform.last_element().unwrap().src().as_deref(),
            Some("master.m3u8")
        );
    }

    #[tokio::test]
    async fn test_unsupported_without_native_or_engine() {
        let platform = HeadlessPlatform::new(HeadlessOptions {
            hls_engine: false,
            ..Default::default()
        });
        let source = HlsSource::new("master.m3u8", &platform, Value::Null);

        assert!(matches!(
            source.load().await,
            Err(Error::UnsupportedMediaType(_))
        ));
    }

    #[tokio::test]
    async fn test_quality_switch_and_unknown_fallback() {
        let platform = HeadlessPlatform::default();
        let source = HlsSource::new("master.m3u8", &platform, Value::Null);
        source.load().await.unwrap();
        let log = record(&source);

        source.set_quality("720p").unwrap();
        source.set_quality("4K").unwrap();

        assert_eq!(
            *log.lock(),
            vec![
                MediaEvent::QualityChanged { quality: "720p".into() },
                MediaEvent::QualityChanged { quality: "auto".into() },
            ]
        );
        assert!(platform.last_engine().unwrap().auto_level_enabled());
    }

    #[tokio::test]
    async fn test_fatal_engine_error_is_forwarded() {
        let platform = HeadlessPlatform::default();
        let source = HlsSource::new("master.m3u8", &platform, Value::Null);
        source.load().await.unwrap();
        let log = record(&source);

        platform.last_engine().unwrap().fail(false, "fragLoadTimeOut");
        platform.last_engine().unwrap().fail(true, "manifestLoadError");

        let log = log.lock();
        assert_eq!(log.len(), 1);
        assert!(matches!(&log[0], MediaEvent::Error { message } if message.contains("manifestLoadError")));
    }

    #[tokio::test]
    async fn test_destroy_releases_engine() {
        let platform = HeadlessPlatform::default();
        let source = HlsSource::new("master.m3u8", &platform, Value::Null);
        source.load().await.unwrap();

        source.destroy();

        let engine = platform.last_engine().unwrap();
        assert!(engine.is_destroyed());
        assert_eq!(engine.events().listener_count(), 0);
    }
}
