//! Ad break sequencing
//!
//! Each break plays on its own [`MediaSource`], built by the same factory as
//! the content, and settles when the ad ends, errors or is skipped. Only one
//! break runs at a time.

use crate::analytics::{fields, AnalyticsCollector};
use crate::config::{AdRollConfig, AdRollsConfig};
use crate::events::{ListenerId, MediaEvent};
use crate::source::{MediaSource, MediaSourceFactory, SourceRequest};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{info, instrument, warn};

/// Position of a break relative to the content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdKind {
    PreRoll,
    PauseRoll,
    PostRoll,
}

impl AdKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdKind::PreRoll => "pre_roll",
            AdKind::PauseRoll => "pause_roll",
            AdKind::PostRoll => "post_roll",
        }
    }
}

impl std::fmt::Display for AdKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a break finished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdOutcome {
    Completed,
    Skipped,
    /// The roll is disabled or has no URL
    NotConfigured,
}

/// The break currently playing
#[derive(Debug, Clone, PartialEq)]
pub struct AdSession {
    pub config: AdRollConfig,
    pub kind: AdKind,
    pub start_time: DateTime<Utc>,
}

type Settle = Arc<Mutex<Option<oneshot::Sender<Result<AdOutcome>>>>>;

struct ActiveAd {
    session: AdSession,
    source: Arc<dyn MediaSource>,
    listener: ListenerId,
    /// Ad playback position in seconds
    position: Arc<Mutex<f64>>,
    settle: Settle,
}

fn settle(slot: &Settle, result: Result<AdOutcome>) -> bool {
    match slot.lock().take() {
        Some(tx) => {
            let _ = tx.send(result);
            true
        }
        None => false,
    }
}

pub struct AdController {
    rolls: AdRollsConfig,
    factory: Arc<MediaSourceFactory>,
    analytics: Arc<AnalyticsCollector>,
    active: Mutex<Option<ActiveAd>>,
    destroyed: AtomicBool,
}

impl AdController {
    pub fn new(
        rolls: AdRollsConfig,
        factory: Arc<MediaSourceFactory>,
        analytics: Arc<AnalyticsCollector>,
    ) -> Self {
        Self {
            rolls,
            factory,
            analytics,
            active: Mutex::new(None),
            destroyed: AtomicBool::new(false),
        }
    }

    pub fn roll(&self, kind: AdKind) -> &AdRollConfig {
        match kind {
            AdKind::PreRoll => &self.rolls.pre_roll,
            AdKind::PauseRoll => &self.rolls.pause_roll,
            AdKind::PostRoll => &self.rolls.post_roll,
        }
    }

    pub fn is_configured(&self, kind: AdKind) -> bool {
        self.roll(kind).is_active()
    }

    pub async fn play_pre_roll(&self) -> Result<AdOutcome> {
        self.play(AdKind::PreRoll).await
    }

    pub async fn play_pause_roll(&self) -> Result<AdOutcome> {
        self.play(AdKind::PauseRoll).await
    }

    pub async fn play_post_roll(&self) -> Result<AdOutcome> {
        self.play(AdKind::PostRoll).await
    }

    /// Play a break to completion, skip or error
    #[instrument(skip(self))]
    pub async fn play(&self, kind: AdKind) -> Result<AdOutcome> {
        if self.destroyed.load(Ordering::SeqCst) {
            return Err(Error::Destroyed);
        }
        let config = self.roll(kind).clone();
        let Some(url) = config.url.clone().filter(|_| config.is_active()) else {
            return Ok(AdOutcome::NotConfigured);
        };

        let (tx, rx) = oneshot::channel();
        let slot: Settle = Arc::new(Mutex::new(Some(tx)));
        let source = {
            let mut active = self.active.lock();
            if active.is_some() {
                return Err(Error::AdBusy);
            }
            let source = self
                .factory
                .create(&SourceRequest::new(url.as_str()))
                .map_err(|e| Error::Ad(e.to_string()))?;
            let position = Arc::new(Mutex::new(0.0));
            let listener = {
                let slot = Arc::clone(&slot);
                let position = Arc::clone(&position);
                source.events().on(move |event| match event {
                    MediaEvent::TimeUpdate { current_time, .. } => *position.lock() = *current_time,
                    MediaEvent::Ended => {
                        settle(&slot, Ok(AdOutcome::Completed));
                    }
                    MediaEvent::Error { message } => {
                        settle(&slot, Err(Error::Ad(message.clone())));
                    }
                    _ => {}
                })
            };
            *active = Some(ActiveAd {
                session: AdSession {
                    config,
                    kind,
                    start_time: Utc::now(),
                },
                source: Arc::clone(&source),
                listener,
                position,
                settle: Arc::clone(&slot),
            });
            source
        };

        info!(kind = %kind, url = %url, "Ad break started");
        self.analytics
            .track("ad_start", fields([("kind", kind.as_str().into()), ("url", url.as_str().into())]));

        let started = match source.load().await {
            Ok(()) => source.play().await,
            Err(e) => Err(e),
        };
        if let Err(e) = started {
            settle(&slot, Err(Error::Ad(e.to_string())));
        }

        let result = rx.await.unwrap_or(Err(Error::Destroyed));
        self.finish();

        match &result {
            Ok(AdOutcome::Skipped) => self.analytics.track("ad_skip", kind_field(kind)),
            Ok(_) => self.analytics.track("ad_complete", kind_field(kind)),
            Err(e) => {
                warn!(kind = %kind, error = %e, "Ad break failed");
                self.analytics.track(
                    "ad_error",
                    fields([("kind", kind.as_str().into()), ("message", e.to_string().into())]),
                );
            }
        }
        result
    }

    fn finish(&self) {
        let ad = self.active.lock().take();
        if let Some(ad) = ad {
            ad.source.events().off(ad.listener);
            ad.source.destroy();
        }
    }

    /// Current position inside the playing ad, in seconds
    pub fn ad_position(&self) -> Option<f64> {
        self.active.lock().as_ref().map(|ad| *ad.position.lock())
    }

    /// Whether the skip affordance is shown
    pub fn skip_available(&self) -> bool {
        self.active.lock().as_ref().is_some_and(|ad| {
            ad.session.config.skippable && *ad.position.lock() >= ad.session.config.skip_delay
        })
    }

    /// Skip the playing ad. Refused before the skip delay has elapsed.
    pub fn skip(&self) -> bool {
        if !self.skip_available() {
            return false;
        }
        let slot = match self.active.lock().as_ref() {
            Some(ad) => Arc::clone(&ad.settle),
            None => return false,
        };
        settle(&slot, Ok(AdOutcome::Skipped))
    }

    pub fn is_playing(&self) -> bool {
        self.active.lock().is_some()
    }

    pub fn session(&self) -> Option<AdSession> {
        self.active.lock().as_ref().map(|ad| ad.session.clone())
    }

    /// Abort any playing ad
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        let slot = self.active.lock().as_ref().map(|ad| Arc::clone(&ad.settle));
        if let Some(slot) = slot {
            settle(&slot, Err(Error::Destroyed));
        }
        self.finish();
    }
}

fn kind_field(kind: AdKind) -> serde_json::Map<String, serde_json::Value> {
    fields([("kind", kind.as_str().into())])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{create_config, PlayerConfig};
    use crate::platform::headless::{HeadlessOptions, HeadlessPlatform};
    use crate::platform::Platform;
    use serde_json::json;
    use std::time::Duration;

    struct Fixture {
        platform: Arc<HeadlessPlatform>,
        ads: Arc<AdController>,
        analytics: Arc<AnalyticsCollector>,
    }

    fn fixture(options: HeadlessOptions, rolls: serde_json::Value) -> Fixture {
        let config: PlayerConfig = create_config(json!({
            "videoUrl": "clip.mp4",
            "adRolls": rolls,
            "eventTracking": { "enabled": true, "endpoint": "https://collect.example.com" }
        }))
        .unwrap();
        let platform = Arc::new(HeadlessPlatform::new(options));
        let factory = Arc::new(MediaSourceFactory::with_defaults(
            Arc::clone(&platform) as Arc<dyn Platform>
        ));
        let analytics = Arc::new(AnalyticsCollector::new("p", &config, platform.as_ref()));
        let ads = Arc::new(AdController::new(
            config.ad_rolls.clone(),
            factory,
            Arc::clone(&analytics),
        ));
        Fixture {
            platform,
            ads,
            analytics,
        }
    }

    fn pre_roll(skip_delay: f64) -> serde_json::Value {
        json!({ "preRoll": { "enabled": true, "url": "https://ads.example.com/pre.mp4", "skipDelay": skip_delay } })
    }

    fn tracked(analytics: &AnalyticsCollector) -> Vec<String> {
        analytics.queued().into_iter().map(|e| e.event_type).collect()
    }

    async fn wait_until_playing(ads: &AdController) {
        for _ in 0..100 {
            if ads.ad_position().is_some() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    #[tokio::test]
    async fn test_unconfigured_roll_resolves_immediately() {
        let f = fixture(HeadlessOptions::default(), json!({}));

        assert_eq!(f.ads.play_post_roll().await.unwrap(), AdOutcome::NotConfigured);
        assert!(f.platform.elements().is_empty());
    }

    #[tokio::test]
    async fn test_ad_completes_on_ended() {
        let f = fixture(
            HeadlessOptions {
                media_duration: 15.0,
                ..Default::default()
            },
            pre_roll(5.0),
        );

        let ads = Arc::clone(&f.ads);
        let task = tokio::spawn(async move { ads.play_pre_roll().await });
        wait_until_playing(&f.ads).await;
        assert_eq!(f.ads.session().unwrap().kind, AdKind::PreRoll);

        f.platform.tick(16.0);

        assert_eq!(task.await.unwrap().unwrap(), AdOutcome::Completed);
        assert!(!f.ads.is_playing());
        assert_eq!(tracked(&f.analytics), vec!["ad_start", "ad_complete"]);
    }

    #[tokio::test]
    async fn test_skip_refused_before_delay() {
        let f = fixture(HeadlessOptions::default(), pre_roll(5.0));

        let ads = Arc::clone(&f.ads);
        let task = tokio::spawn(async move { ads.play_pre_roll().await });
        wait_until_playing(&f.ads).await;

        f.platform.tick(2.0);
        assert!(!f.ads.skip_available());
        assert!(!f.ads.skip());

        f.platform.tick(3.5);
        assert!(f.ads.skip_available());
        assert!(f.ads.skip());

        assert_eq!(task.await.unwrap().unwrap(), AdOutcome::Skipped);
        assert_eq!(tracked(&f.analytics), vec!["ad_start", "ad_skip"]);
    }

    #[tokio::test]
    async fn test_second_break_is_busy() {
        let f = fixture(
            HeadlessOptions::default(),
            json!({
                "preRoll": { "enabled": true, "url": "pre.mp4" },
                "pauseRoll": { "enabled": true, "url": "pause.mp4" }
            }),
        );

        let ads = Arc::clone(&f.ads);
        let task = tokio::spawn(async move { ads.play_pre_roll().await });
        wait_until_playing(&f.ads).await;

        assert!(matches!(f.ads.play_pause_roll().await, Err(Error::AdBusy)));

        f.ads.destroy();
        assert!(matches!(task.await.unwrap(), Err(Error::Destroyed)));
    }

    #[tokio::test]
    async fn test_ad_load_failure_is_ad_error() {
        let f = fixture(
            HeadlessOptions {
                failing_urls: vec!["pre.mp4".into()],
                ..Default::default()
            },
            pre_roll(0.0),
        );

        let err = f.ads.play_pre_roll().await.unwrap_err();

        assert!(matches!(err, Error::Ad(_)));
        assert!(!f.ads.is_playing());
        assert_eq!(tracked(&f.analytics), vec!["ad_start", "ad_error"]);
    }
}
