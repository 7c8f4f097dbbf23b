//! Analytics collection
//!
//! Captures playback events for one player session and ships them in
//! batches of [`ANALYTICS_BATCH_SIZE`] to the configured endpoint:
//!
//! ```text
//! POST <endpoint>
//! { "events": [ { "eventType": "play", "playerId": ..., ... } ], "timestamp": ... }
//! ```
//!
//! A failed batch goes back to the front of the queue and is retried on the
//! next flush, with no backoff and no retry limit.

use crate::config::{PlayerConfig, ANALYTICS_BATCH_SIZE};
use crate::platform::{ConnectionInfo, Platform, Viewport};
use crate::types::SessionId;
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

/// Event type reported once per session when the viewed threshold is crossed
pub const VIEWED_THRESHOLD_REACHED: &str = "viewed_threshold_reached";

/// Fields describing where the session runs, attached to every event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cdn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub isp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_id: Option<String>,
    pub player_source: String,
    pub user_agent: String,
    pub viewport: Viewport,
    pub connection: ConnectionInfo,
}

impl EnvironmentInfo {
    pub fn collect(config: &PlayerConfig, platform: &dyn Platform) -> Self {
        let tracking = &config.event_tracking;
        Self {
            cdn: tracking.cdn.clone(),
            isp: tracking.isp.clone(),
            geo: tracking.geo.clone(),
            video_id: config.video_id.clone(),
            player_source: tracking.player_source.clone(),
            user_agent: platform.user_agent(),
            viewport: platform.viewport(),
            connection: platform.connection_info(),
        }
    }
}

/// A single tracked event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsEvent {
    pub event_type: String,
    pub player_id: String,
    pub timestamp: DateTime<Utc>,
    pub session_id: SessionId,
    /// Event-specific fields
    #[serde(flatten)]
    pub fields: Map<String, Value>,
    #[serde(flatten)]
    pub environment: EnvironmentInfo,
}

/// Request body sent to the endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsBatch {
    pub events: Vec<AnalyticsEvent>,
    pub timestamp: DateTime<Utc>,
}

/// Derived statistics plus the log of tracked events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTelemetry {
    pub session_id: SessionId,
    pub start_time: DateTime<Utc>,
    /// Seconds spent playing
    pub total_play_time: f64,
    pub seek_count: u32,
    pub quality_changes: u32,
    /// Furthest progress fraction reached
    pub max_progress: f64,
    pub events: Vec<AnalyticsEvent>,
}

impl SessionTelemetry {
    fn new() -> Self {
        Self {
            session_id: SessionId::new(),
            start_time: Utc::now(),
            total_play_time: 0.0,
            seek_count: 0,
            quality_changes: 0,
            max_progress: 0.0,
            events: Vec::new(),
        }
    }
}

/// Delivers batches to a collection endpoint
#[async_trait]
pub trait AnalyticsTransport: Send + Sync {
    async fn send(&self, batch: &AnalyticsBatch) -> Result<()>;
}

/// JSON POST over HTTP
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpTransport {
    pub fn new(endpoint: &str) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| Error::AnalyticsSend(format!("invalid endpoint '{endpoint}': {e}")))?;
        Ok(Self {
            client: reqwest::Client::new(),
            endpoint,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl AnalyticsTransport for HttpTransport {
    async fn send(&self, batch: &AnalyticsBatch) -> Result<()> {
        self.client
            .post(self.endpoint.clone())
            .json(batch)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| Error::AnalyticsSend(e.to_string()))?;
        Ok(())
    }
}

/// Per-instance event collector
pub struct AnalyticsCollector {
    player_id: String,
    enabled: bool,
    filter: Vec<String>,
    viewed_threshold: f64,
    flush_interval: Duration,
    environment: EnvironmentInfo,
    transport: Option<Arc<dyn AnalyticsTransport>>,
    queue: Mutex<VecDeque<AnalyticsEvent>>,
    telemetry: Mutex<SessionTelemetry>,
    play_started: Mutex<Option<Instant>>,
    viewed_reached: AtomicBool,
    flush_task: Mutex<Option<JoinHandle<()>>>,
    destroyed: AtomicBool,
}

impl AnalyticsCollector {
    /// Collector using an HTTP transport for the configured endpoint
    pub fn new(player_id: impl ToString, config: &PlayerConfig, platform: &dyn Platform) -> Self {
        let tracking = &config.event_tracking;
        let transport = match tracking.endpoint.as_deref() {
            Some(endpoint) if tracking.enabled => match HttpTransport::new(endpoint) {
                Ok(transport) => Some(Arc::new(transport) as Arc<dyn AnalyticsTransport>),
                Err(e) => {
                    warn!(error = %e, "Analytics endpoint unusable, events stay queued");
                    None
                }
            },
            _ => None,
        };

        Self {
            player_id: player_id.to_string(),
            enabled: tracking.enabled,
            filter: tracking.events.clone(),
            viewed_threshold: tracking.viewed_threshold,
            flush_interval: Duration::from_millis(tracking.flush_interval_ms.max(1)),
            environment: EnvironmentInfo::collect(config, platform),
            transport,
            queue: Mutex::new(VecDeque::new()),
            telemetry: Mutex::new(SessionTelemetry::new()),
            play_started: Mutex::new(None),
            viewed_reached: AtomicBool::new(false),
            flush_task: Mutex::new(None),
            destroyed: AtomicBool::new(false),
        }
    }

    /// Replace the transport
    pub fn with_transport(mut self, transport: Arc<dyn AnalyticsTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn session_id(&self) -> SessionId {
        self.telemetry.lock().session_id
    }

    fn accepts(&self, event_type: &str) -> bool {
        self.enabled
            && !self.destroyed.load(Ordering::SeqCst)
            && (self.filter.is_empty() || self.filter.iter().any(|e| e == event_type))
    }

    /// Queue an event. No-op when tracking is disabled or the type is filtered out.
    pub fn track(&self, event_type: &str, fields: Map<String, Value>) {
        if !self.accepts(event_type) {
            return;
        }

        let event = {
            let mut telemetry = self.telemetry.lock();
            let event = AnalyticsEvent {
                event_type: event_type.to_string(),
                player_id: self.player_id.clone(),
                timestamp: Utc::now(),
                session_id: telemetry.session_id,
                fields,
                environment: self.environment.clone(),
            };
            telemetry.events.push(event.clone());
            event
        };
        debug!(event_type, player_id = %self.player_id, "Analytics event queued");
        self.queue.lock().push_back(event);
    }

    pub fn on_play(&self) {
        self.play_started.lock().get_or_insert_with(Instant::now);
        self.track("play", Map::new());
    }

    pub fn on_pause(&self) {
        self.stop_play_clock();
        self.track("pause", Map::new());
    }

    pub fn on_ended(&self) {
        self.stop_play_clock();
        self.track("ended", Map::new());
    }

    pub fn on_seek(&self, from: f64, to: f64) {
        self.telemetry.lock().seek_count += 1;
        self.track("seek", fields([("from", from.into()), ("to", to.into())]));
    }

    pub fn on_quality_change(&self, quality: &str) {
        self.telemetry.lock().quality_changes += 1;
        self.track("quality_change", fields([("quality", quality.into())]));
    }

    pub fn on_error(&self, code: &str, message: &str, fatal: bool) {
        self.track(
            "error",
            fields([
                ("code", code.into()),
                ("message", message.into()),
                ("fatal", fatal.into()),
            ]),
        );
    }

    /// Record playback progress. Returns true when this call crossed the
    /// viewed threshold for the first time in the session.
    pub fn on_progress(&self, current_time: f64, duration: f64) -> bool {
        if duration <= 0.0 || !current_time.is_finite() {
            return false;
        }
        let progress = (current_time / duration).clamp(0.0, 1.0);
        {
            let mut telemetry = self.telemetry.lock();
            if progress > telemetry.max_progress {
                telemetry.max_progress = progress;
            }
        }

        if progress < self.viewed_threshold || self.viewed_reached.swap(true, Ordering::SeqCst) {
            return false;
        }
        info!(player_id = %self.player_id, progress, "Viewed threshold reached");
        self.track(
            VIEWED_THRESHOLD_REACHED,
            fields([
                ("progress", progress.into()),
                ("threshold", self.viewed_threshold.into()),
            ]),
        );
        true
    }

    fn stop_play_clock(&self) {
        if let Some(started) = self.play_started.lock().take() {
            self.telemetry.lock().total_play_time += started.elapsed().as_secs_f64();
        }
    }

    /// Snapshot of the session, including the running play segment
    pub fn telemetry(&self) -> SessionTelemetry {
        let started = *self.play_started.lock();
        let running = started.map_or(0.0, |started| started.elapsed().as_secs_f64());
        let mut snapshot = self.telemetry.lock().clone();
        snapshot.total_play_time += running;
        snapshot
    }

    pub fn queue_len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Events waiting to be sent, oldest first
    pub fn queued(&self) -> Vec<AnalyticsEvent> {
        self.queue.lock().iter().cloned().collect()
    }

    /// Send one batch. A failed batch returns to the front of the queue.
    pub async fn flush_once(&self) -> Result<usize> {
        let Some(transport) = self.transport.clone() else {
            return Ok(0);
        };
        let events: Vec<AnalyticsEvent> = {
            let mut queue = self.queue.lock();
            let n = queue.len().min(ANALYTICS_BATCH_SIZE);
            queue.drain(..n).collect()
        };
        if events.is_empty() {
            return Ok(0);
        }

        let batch = AnalyticsBatch {
            events,
            timestamp: Utc::now(),
        };
        match transport.send(&batch).await {
            Ok(()) => {
                debug!(count = batch.events.len(), "Analytics batch sent");
                Ok(batch.events.len())
            }
            Err(e) => {
                warn!(error = %e, count = batch.events.len(), "Analytics batch failed, requeued");
                let mut queue = self.queue.lock();
                for event in batch.events.into_iter().rev() {
                    queue.push_front(event);
                }
                Err(e)
            }
        }
    }

    /// Start the periodic flush loop
    pub fn start(self: &Arc<Self>) {
        if !self.enabled || self.transport.is_none() {
            return;
        }
        let mut task = self.flush_task.lock();
        if task.is_some() {
            return;
        }

        let weak: Weak<Self> = Arc::downgrade(self);
        let period = self.flush_interval;
        *task = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(collector) = weak.upgrade() else {
                    break;
                };
                if collector.destroyed.load(Ordering::SeqCst) {
                    break;
                }
                // Failures are logged and requeued by flush_once
                let _ = collector.flush_once().await;
            }
        }));
        info!(player_id = %self.player_id, interval_ms = period.as_millis() as u64, "Analytics flush loop started");
    }

    /// Stop the flush loop. Queued events are dropped with the collector.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.stop_play_clock();
        if let Some(task) = self.flush_task.lock().take() {
            task.abort();
        }
        debug!(player_id = %self.player_id, "Analytics collector destroyed");
    }
}

impl Drop for AnalyticsCollector {
    fn drop(&mut self) {
        if let Some(task) = self.flush_task.get_mut().take() {
            task.abort();
        }
    }
}

/// Build an event field map
pub fn fields<const N: usize>(pairs: [(&str, Value); N]) -> Map<String, Value> {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::headless::HeadlessPlatform;
    use serde_json::json;

    #[derive(Default)]
    struct MockTransport {
        batches: Mutex<Vec<AnalyticsBatch>>,
        failing: AtomicBool,
    }

    #[async_trait]
    impl AnalyticsTransport for MockTransport {
        async fn send(&self, batch: &AnalyticsBatch) -> Result<()> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(Error::AnalyticsSend("503 Service Unavailable".into()));
            }
            self.batches.lock().push(batch.clone());
            Ok(())
        }
    }

    fn collector(tracking: Value) -> (Arc<MockTransport>, Arc<AnalyticsCollector>) {
        let config = crate::config::create_config(json!({
            "videoUrl": "clip.mp4",
            "videoId": "vid-42",
            "eventTracking": tracking
        }))
        .unwrap();
        let transport = Arc::new(MockTransport::default());
        let collector = AnalyticsCollector::new("player-1", &config, &HeadlessPlatform::default())
            .with_transport(Arc::clone(&transport) as Arc<dyn AnalyticsTransport>);
        (transport, Arc::new(collector))
    }

    fn enabled() -> Value {
        json!({ "enabled": true, "endpoint": "https://collect.example.com/events" })
    }

    fn types(events: &[AnalyticsEvent]) -> Vec<String> {
        events.iter().map(|e| e.event_type.clone()).collect()
    }

    #[tokio::test]
    async fn test_batches_of_ten() {
        let (transport, collector) = collector(enabled());
        for i in 0..25 {
            collector.track("custom", fields([("n", i.into())]));
        }

        assert_eq!(collector.flush_once().await.unwrap(), 10);
        assert_eq!(collector.flush_once().await.unwrap(), 10);
        assert_eq!(collector.flush_once().await.unwrap(), 5);
        assert_eq!(collector.flush_once().await.unwrap(), 0);

        let batches = transport.batches.lock();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[2].events[0].fields["n"], 20);
    }

    #[tokio::test]
    async fn test_failed_batch_requeued_at_front_in_order() {
        let (transport, collector) = collector(enabled());
        for i in 0..12 {
            collector.track("custom", fields([("n", i.into())]));
        }

        transport.failing.store(true, Ordering::SeqCst);
        assert!(collector.flush_once().await.is_err());
        assert_eq!(collector.queue_len(), 12);
        let order: Vec<_> = collector.queued().iter().map(|e| e.fields["n"].clone()).collect();
        assert_eq!(order, (0..12).map(Value::from).collect::<Vec<_>>());

        transport.failing.store(false, Ordering::SeqCst);
        assert_eq!(collector.flush_once().await.unwrap(), 10);
        assert_eq!(transport.batches.lock()[0].events[0].fields["n"], 0);
    }

    #[tokio::test]
    async fn test_disabled_tracking_is_noop() {
        let (_, collector) = collector(json!({ "enabled": false }));

        collector.on_play();
        collector.on_seek(1.0, 9.0);
        collector.track("custom", Map::new());

        assert_eq!(collector.queue_len(), 0);
        assert!(collector.telemetry().events.is_empty());
        assert_eq!(collector.telemetry().seek_count, 1);
    }

    #[tokio::test]
    async fn test_event_filter() {
        let mut tracking = enabled();
        tracking["events"] = json!(["play", "ended"]);
        let (_, collector) = collector(tracking);

        collector.on_play();
        collector.on_pause();
        collector.on_ended();

        assert_eq!(types(&collector.queued()), vec!["play", "ended"]);
    }

    #[test]
    fn test_viewed_threshold_fires_once() {
        let mut tracking = enabled();
        tracking["viewedThreshold"] = json!(0.5);
        let (_, collector) = collector(tracking);

        assert!(!collector.on_progress(10.0, 100.0));
        assert!(collector.on_progress(50.0, 100.0));
        assert!(!collector.on_progress(80.0, 100.0));
        assert!(!collector.on_progress(20.0, 100.0));
        // Seeking back and crossing again stays silent
        assert!(!collector.on_progress(70.0, 100.0));

        let viewed = collector
            .queued()
            .iter()
            .filter(|e| e.event_type == VIEWED_THRESHOLD_REACHED)
            .count();
        assert_eq!(viewed, 1);
        assert_eq!(collector.telemetry().max_progress, 0.8);
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_time_from_play_pause_deltas() {
        let (_, collector) = collector(enabled());

        collector.on_play();
        tokio::time::advance(Duration::from_secs(3)).await;
        collector.on_pause();
        tokio::time::advance(Duration::from_secs(10)).await;
        collector.on_play();
        tokio::time::advance(Duration::from_secs(2)).await;

        assert_eq!(collector.telemetry().total_play_time, 5.0);
        collector.on_ended();
        assert_eq!(collector.telemetry().total_play_time, 5.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_loop_sends_and_stops_on_destroy() {
        let mut tracking = enabled();
        tracking["flushIntervalMs"] = json!(1000);
        let (transport, collector) = collector(tracking);
        collector.start();

        collector.on_play();
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(transport.batches.lock().len(), 1);

        collector.destroy();
        collector.track("custom", Map::new());
        collector.on_pause();
        tokio::time::sleep(Duration::from_millis(3000)).await;
        assert_eq!(transport.batches.lock().len(), 1);
    }

    #[test]
    fn test_event_wire_format() {
        let (_, collector) = collector(enabled());
        collector.on_seek(4.0, 30.0);

        let value = serde_json::to_value(&collector.queued()[0]).unwrap();
        assert_eq!(value["eventType"], "seek");
        assert_eq!(value["playerId"], "player-1");
        assert_eq!(value["videoId"], "vid-42");
        assert_eq!(value["playerSource"], "playkit");
        assert_eq!(value["to"], 30.0);
        assert!(value["sessionId"].is_string());
        assert!(value.get("cdn").is_none());
    }

    #[test]
    fn test_invalid_endpoint_rejected_by_transport() {
        assert!(HttpTransport::new("not a url").is_err());
        let transport = HttpTransport::new("https://collect.example.com/e").unwrap();
        assert_eq!(transport.endpoint().host_str(), Some("collect.example.com"));
    }
}
