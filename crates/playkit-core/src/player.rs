//! Player instance - orchestrator for one embed
//!
//! Coordinates:
//! - Source selection and (re)loading through the factory
//! - The playback state machine, driven by media events
//! - The control surface (UI intents in, state updates out)
//! - Analytics and ad breaks
//!
//! Media events are authoritative: [`PlaybackState`] only changes when the
//! backend reports something, except for fullscreen which has no media
//! event. UI intents are routed through an intent pump task into the same
//! public methods a host page calls.

use crate::ads::{AdController, AdKind, AdOutcome};
use crate::analytics::{fields, AnalyticsCollector, SessionTelemetry};
use crate::config::PlayerConfig;
use crate::events::{EventEmitter, ListenerId, MediaEvent, PlayerEvent, UiIntent};
use crate::platform::{Container, Platform};
use crate::source::{MediaSource, MediaSourceFactory, SourceRequest};
use crate::types::{InstanceId, PlaybackState, PlayerPhase, QualityLevel, AUTO_QUALITY};
use crate::ui::UiController;
use crate::{Error, Result};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

/// Auto-hide check period
const UI_TICK: Duration = Duration::from_millis(250);

struct Inner {
    source: Option<Arc<dyn MediaSource>>,
    source_listener: Option<ListenerId>,
    url: String,
    /// Explicit type for `url`, only set for the configured URL
    type_hint: Option<String>,
    state: PlaybackState,
    phase: PlayerPhase,
    /// Phase under the seeking/buffering overlays
    stable: PlayerPhase,
    pre_roll_done: bool,
    seek_from: f64,
    seek_target: Option<f64>,
}

/// One embedded player
pub struct PlayerInstance {
    id: InstanceId,
    container_id: String,
    config: PlayerConfig,
    platform: Arc<dyn Platform>,
    factory: Arc<MediaSourceFactory>,
    container: Arc<dyn Container>,
    ui: Arc<UiController>,
    analytics: Arc<AnalyticsCollector>,
    ads: Arc<AdController>,
    events: EventEmitter<PlayerEvent>,
    inner: Mutex<Inner>,
    phase_tx: watch::Sender<PlayerPhase>,
    intent_tx: mpsc::UnboundedSender<UiIntent>,
    intent_rx: Mutex<Option<mpsc::UnboundedReceiver<UiIntent>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    /// Held for the whole of an ad break; content playback waits on it
    ad_break: AsyncMutex<()>,
    generation: AtomicU64,
    destroyed: AtomicBool,
    weak: Weak<PlayerInstance>,
}

impl PlayerInstance {
    /// Build an instance with the default backends. Nothing loads until
    /// [`PlayerInstance::initialize`].
    pub fn new(
        id: InstanceId,
        container_id: &str,
        config: PlayerConfig,
        platform: Arc<dyn Platform>,
    ) -> Result<Arc<Self>> {
        let factory = Arc::new(MediaSourceFactory::with_defaults(Arc::clone(&platform)));
        Self::with_factory(id, container_id, config, platform, factory)
    }

    /// Build an instance with a custom backend factory
    pub fn with_factory(
        id: InstanceId,
        container_id: &str,
        config: PlayerConfig,
        platform: Arc<dyn Platform>,
        factory: Arc<MediaSourceFactory>,
    ) -> Result<Arc<Self>> {
        let container = platform
            .container(container_id)
            .ok_or_else(|| Error::ContainerNotFound(container_id.to_string()))?;

        let ui = Arc::new(UiController::new(Arc::clone(&container), &config));
        let analytics = Arc::new(AnalyticsCollector::new(id, &config, platform.as_ref()));
        let ads = Arc::new(AdController::new(
            config.ad_rolls.clone(),
            Arc::clone(&factory),
            Arc::clone(&analytics),
        ));
        let (phase_tx, _) = watch::channel(PlayerPhase::Initializing);
        let (intent_tx, intent_rx) = mpsc::unbounded_channel();

        let state = PlaybackState {
            volume: config.volume,
            muted: config.muted,
            playback_rate: config.speed.default,
            ..Default::default()
        };
        let inner = Inner {
            source: None,
            source_listener: None,
            url: config.video_url.clone(),
            type_hint: config.media_type.clone(),
            state,
            phase: PlayerPhase::Initializing,
            stable: PlayerPhase::Ready,
            pre_roll_done: false,
            seek_from: 0.0,
            seek_target: None,
        };

        info!(player_id = %id, container = container_id, url = %config.video_url, "Player created");

        Ok(Arc::new_cyclic(|weak| Self {
            id,
            container_id: container_id.to_string(),
            config,
            platform,
            factory,
            container,
            ui,
            analytics,
            ads,
            events: EventEmitter::new(),
            inner: Mutex::new(inner),
            phase_tx,
            intent_tx,
            intent_rx: Mutex::new(Some(intent_rx)),
            tasks: Mutex::new(Vec::new()),
            ad_break: AsyncMutex::new(()),
            generation: AtomicU64::new(0),
            destroyed: AtomicBool::new(false),
            weak: weak.clone(),
        }))
    }

    /// Build and initialize. A failed load leaves the instance in the
    /// `Error` phase instead of failing creation.
    pub async fn create(
        id: InstanceId,
        container_id: &str,
        config: PlayerConfig,
        platform: Arc<dyn Platform>,
    ) -> Result<Arc<Self>> {
        let instance = Self::new(id, container_id, config, platform)?;
        if let Err(e) = instance.initialize().await {
            debug!(player_id = %id, error = %e, "Initial load failed");
        }
        Ok(instance)
    }

    /// Wire UI, analytics and background tasks, then load the configured source
    #[instrument(skip(self), fields(player_id = %self.id))]
    pub async fn initialize(&self) -> Result<()> {
        self.ensure_alive()?;

        let intent_rx = self.intent_rx.lock().take();
        if let Some(mut rx) = intent_rx {
            let tx = self.intent_tx.clone();
            self.ui.intents().on(move |intent| {
                let _ = tx.send(intent.clone());
            });

            let weak = self.weak.clone();
            self.spawn(async move {
                while let Some(intent) = rx.recv().await {
                    let Some(player) = weak.upgrade() else {
                        break;
                    };
                    player.handle_intent(intent).await;
                }
            });

            let weak = self.weak.clone();
            self.spawn(async move {
                let mut interval = tokio::time::interval(UI_TICK);
                loop {
                    interval.tick().await;
                    let Some(player) = weak.upgrade() else {
                        break;
                    };
                    player.ui.tick(Instant::now());
                }
            });

            self.analytics.start();
        }

        let (url, type_hint) = {
            let inner = self.inner.lock();
            (inner.url.clone(), inner.type_hint.clone())
        };
        self.load_source(url, type_hint, self.config.autoplay).await
    }

    // Accessors

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    /// Lifecycle events for the host page
    pub fn events(&self) -> &EventEmitter<PlayerEvent> {
        &self.events
    }

    pub fn state(&self) -> PlaybackState {
        self.inner.lock().state.clone()
    }

    pub fn phase(&self) -> PlayerPhase {
        self.inner.lock().phase
    }

    /// Watch phase changes
    pub fn subscribe_phase(&self) -> watch::Receiver<PlayerPhase> {
        self.phase_tx.subscribe()
    }

    pub fn url(&self) -> String {
        self.inner.lock().url.clone()
    }

    pub fn qualities(&self) -> Vec<QualityLevel> {
        self.source().map(|s| s.qualities()).unwrap_or_default()
    }

    pub fn telemetry(&self) -> SessionTelemetry {
        self.analytics.telemetry()
    }

    pub fn ui(&self) -> &UiController {
        &self.ui
    }

    pub fn ads(&self) -> &AdController {
        &self.ads
    }

    pub fn analytics(&self) -> &AnalyticsCollector {
        &self.analytics
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.is_destroyed() {
            Err(Error::Destroyed)
        } else {
            Ok(())
        }
    }

    fn source(&self) -> Option<Arc<dyn MediaSource>> {
        self.inner.lock().source.clone()
    }

    /// Current source, once loaded and not failed
    fn ready_source(&self, operation: &str) -> Result<Arc<dyn MediaSource>> {
        self.ensure_alive()?;
        let inner = self.inner.lock();
        match (inner.phase, &inner.source) {
            (PlayerPhase::Error, _) => Err(Error::playback(operation, "player is in the error state")),
            (PlayerPhase::Initializing, _) | (_, None) => {
                Err(Error::playback(operation, "media is not loaded yet"))
            }
            (_, Some(source)) => Ok(Arc::clone(source)),
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        !self.is_destroyed() && self.generation.load(Ordering::SeqCst) == generation
    }

    fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let mut tasks = self.tasks.lock();
                tasks.retain(|t| !t.is_finished());
                tasks.push(handle.spawn(future));
            }
            Err(_) => warn!(player_id = %self.id, "No async runtime, background task skipped"),
        }
    }

    // Source lifecycle

    async fn load_source(&self, url: String, type_hint: Option<String>, autoplay: bool) -> Result<()> {
        self.ensure_alive()?;
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let (old, old_listener) = {
            let mut inner = self.inner.lock();
            inner.url = url.clone();
            inner.type_hint = type_hint.clone();
            (inner.source.take(), inner.source_listener.take())
        };
        if let Some(old) = old {
            if let Some(id) = old_listener {
                old.events().off(id);
            }
            old.destroy();
        }
        self.transition(PlayerPhase::Initializing);

        let source = match self.create_source(&url, type_hint) {
            Ok(source) => source,
            Err(e) => {
                self.fail(&e);
                return Err(e);
            }
        };
        info!(player_id = %self.id, url = %url, media_type = %source.media_type(), "Loading source");

        let listener = {
            let weak = self.weak.clone();
            source.events().on(move |event| {
                if let Some(player) = weak.upgrade() {
                    player.on_media_event(generation, event);
                }
            })
        };
        let (volume, muted, rate) = {
            let mut inner = self.inner.lock();
            inner.source = Some(Arc::clone(&source));
            inner.source_listener = Some(listener);
            inner.stable = PlayerPhase::Ready;
            let state = &mut inner.state;
            state.current_time = 0.0;
            state.duration = 0.0;
            state.playing = false;
            state.buffering = false;
            state.seeking = false;
            state.pip = false;
            state.quality = AUTO_QUALITY.to_string();
            (state.volume, state.muted, state.playback_rate)
        };

        let applied = source
            .set_volume(volume)
            .and_then(|_| source.set_muted(muted))
            .and_then(|_| source.set_playback_rate(rate));
        if let Err(e) = applied {
            debug!(error = %e, "Initial media settings not applied");
        }

        let loaded = source.load().await;
        if !self.is_current(generation) {
            debug!(player_id = %self.id, url = %url, "Load settled after teardown, ignored");
            return if self.is_destroyed() {
                Err(Error::Destroyed)
            } else {
                Ok(())
            };
        }
        if let Err(e) = loaded {
            self.fail(&e);
            return Err(e);
        }

        let duration = self.inner.lock().state.duration;
        self.ui.update_progress(0.0, duration);
        self.transition(PlayerPhase::Ready);
        info!(player_id = %self.id, url = %url, "Player ready");
        self.events.emit(&PlayerEvent::Ready);
        self.analytics.track("ready", fields([("url", url.as_str().into())]));

        let quality = &self.config.quality.default;
        if quality != AUTO_QUALITY {
            if let Err(e) = source.set_quality(quality) {
                debug!(quality = %quality, error = %e, "Default quality not applied");
            }
        }
        if autoplay {
            if let Err(e) = self.play().await {
                debug!(player_id = %self.id, error = %e, "Autoplay did not start");
            }
        }
        Ok(())
    }

    fn create_source(&self, url: &str, type_hint: Option<String>) -> Result<Arc<dyn MediaSource>> {
        let mut request = SourceRequest {
            url: url.to_string(),
            media_type: type_hint,
            priority: self.config.priority.clone(),
            engine_config: serde_json::Value::Null,
        };
        let media_type = request.resolve_type()?;
        request.engine_config = self.config.engine_config(media_type);
        self.factory.create(&request)
    }

    /// Replace the media with `url`. The type is detected again from the URL.
    #[instrument(skip(self), fields(player_id = %self.id))]
    pub async fn load_url(&self, url: &str) -> Result<()> {
        self.change_source(url, self.config.autoplay).await
    }

    async fn change_source(&self, url: &str, autoplay: bool) -> Result<()> {
        self.ensure_alive()?;
        self.events.emit(&PlayerEvent::SourceChanged {
            url: url.to_string(),
        });
        self.load_source(url.to_string(), None, autoplay).await
    }

    /// Reload the current media, recovering from the `Error` phase
    #[instrument(skip(self), fields(player_id = %self.id))]
    pub async fn reinit(&self) -> Result<()> {
        self.ensure_alive()?;
        let (url, type_hint) = {
            let inner = self.inner.lock();
            (inner.url.clone(), inner.type_hint.clone())
        };
        self.load_source(url, type_hint, self.config.autoplay).await
    }

    // Phase bookkeeping

    fn transition(&self, to: PlayerPhase) -> bool {
        let from = {
            let mut inner = self.inner.lock();
            let from = inner.phase;
            if from == to {
                return false;
            }
            if !from.can_transition_to(to) {
                warn!(player_id = %self.id, from = %from, to = %to, "Invalid phase transition ignored");
                return false;
            }
            inner.phase = to;
            from
        };
        debug!(player_id = %self.id, from = %from, to = %to, "Phase transition");
        self.phase_tx.send_replace(to);
        self.events.emit(&PlayerEvent::PhaseChanged { from, to });
        true
    }

    /// Recompute the phase from the stable phase and the overlays
    fn refresh_phase(&self) {
        let target = {
            let inner = self.inner.lock();
            if matches!(inner.phase, PlayerPhase::Initializing | PlayerPhase::Error) {
                return;
            }
            if inner.state.seeking {
                PlayerPhase::Seeking
            } else if inner.state.buffering {
                PlayerPhase::Buffering
            } else {
                inner.stable
            }
        };
        self.transition(target);
    }

    /// Enter the `Error` phase and report a fatal error
    fn fail(&self, err: &Error) {
        let from = {
            let mut inner = self.inner.lock();
            if inner.phase == PlayerPhase::Error {
                return;
            }
            let from = inner.phase;
            inner.phase = PlayerPhase::Error;
            inner.state.playing = false;
            from
        };
        error!(player_id = %self.id, error = %err, code = err.error_code(), "Player failed");
        self.phase_tx.send_replace(PlayerPhase::Error);
        self.ui.update_play_button(false);
        self.events.emit(&PlayerEvent::PhaseChanged {
            from,
            to: PlayerPhase::Error,
        });
        self.events.emit(&PlayerEvent::Error {
            code: err.error_code().to_string(),
            message: err.to_string(),
            fatal: true,
        });
        self.analytics.on_error(err.error_code(), &err.to_string(), true);
    }

    /// Surface an error without leaving the current phase
    fn report(&self, err: &Error) {
        warn!(player_id = %self.id, error = %err, code = err.error_code(), "Operation failed");
        self.events.emit(&PlayerEvent::Error {
            code: err.error_code().to_string(),
            message: err.to_string(),
            fatal: false,
        });
        self.analytics.on_error(err.error_code(), &err.to_string(), false);
    }

    // Media events

    fn on_media_event(&self, generation: u64, event: &MediaEvent) {
        if !self.is_current(generation) {
            return;
        }

        match event {
            MediaEvent::Play => {
                {
                    let mut inner = self.inner.lock();
                    inner.state.playing = true;
                    inner.stable = PlayerPhase::Playing;
                }
                self.ui.update_play_button(true);
                self.analytics.on_play();
                self.events.emit(&PlayerEvent::Play);
            }
            MediaEvent::Pause => {
                {
                    let mut inner = self.inner.lock();
                    inner.state.playing = false;
                    if inner.stable != PlayerPhase::Ended {
                        inner.stable = PlayerPhase::Paused;
                    }
                }
                self.ui.update_play_button(false);
                self.analytics.on_pause();
                self.events.emit(&PlayerEvent::Pause);
            }
            MediaEvent::Ended => {
                {
                    let mut inner = self.inner.lock();
                    inner.state.playing = false;
                    inner.stable = PlayerPhase::Ended;
                }
                self.ui.update_play_button(false);
                self.analytics.on_ended();
                self.refresh_phase();
                self.on_ended(generation);
                return;
            }
            MediaEvent::TimeUpdate {
                current_time,
                duration,
            } => {
                {
                    let mut inner = self.inner.lock();
                    inner.state.current_time = *current_time;
                    inner.state.duration = *duration;
                }
                self.ui.update_progress(*current_time, *duration);
                self.analytics.on_progress(*current_time, *duration);
                self.events.emit(&PlayerEvent::TimeUpdate {
                    current_time: *current_time,
                    duration: *duration,
                });
            }
            MediaEvent::VolumeChange { volume, muted } => {
                {
                    let mut inner = self.inner.lock();
                    inner.state.volume = *volume;
                    inner.state.muted = *muted;
                }
                self.ui.update_volume(*volume, *muted);
            }
            MediaEvent::Seeking => {
                let mut inner = self.inner.lock();
                inner.state.seeking = true;
                inner.seek_from = inner.state.current_time;
            }
            MediaEvent::Seeked => {
                let (from, to) = {
                    let mut inner = self.inner.lock();
                    inner.state.seeking = false;
                    let to = inner.seek_target.take().unwrap_or(inner.state.current_time);
                    (inner.seek_from, to)
                };
                self.analytics.on_seek(from, to);
            }
            MediaEvent::Buffering { buffering } => {
                self.inner.lock().state.buffering = *buffering;
                self.ui.show_buffering(*buffering);
            }
            MediaEvent::QualityChanged { quality } => {
                self.inner.lock().state.quality = quality.clone();
                self.ui.update_quality(quality);
                self.analytics.on_quality_change(quality);
                self.events.emit(&PlayerEvent::QualityChanged {
                    quality: quality.clone(),
                });
            }
            MediaEvent::QualitiesAvailable { levels } => self.ui.set_qualities(levels),
            MediaEvent::RateChange { rate } => {
                self.inner.lock().state.playback_rate = *rate;
                self.ui.update_speed(*rate);
            }
            MediaEvent::PictureInPicture { active } => {
                self.inner.lock().state.pip = *active;
            }
            MediaEvent::Error { message } => {
                // While loading, the rejected load reports the failure
                if self.phase() != PlayerPhase::Initializing {
                    let url = self.url();
                    self.fail(&Error::load(url, message.clone()));
                }
                return;
            }
            MediaEvent::LoadStart | MediaEvent::CanPlay => {}
        }

        self.refresh_phase();
    }

    /// Post-roll, then `player:ended`, then loop or the next video
    fn on_ended(&self, generation: u64) {
        let post_roll = self.ads.is_configured(AdKind::PostRoll);
        let next_url = self.config.next_video.url.clone();
        let continues = self.config.loop_playback || next_url.is_some();

        if !post_roll {
            self.events.emit(&PlayerEvent::Ended);
            if !continues {
                return;
            }
        }

        let weak = self.weak.clone();
        self.spawn(async move {
            let Some(player) = weak.upgrade() else {
                return;
            };
            if post_roll {
                {
                    let _break = player.ad_break.lock().await;
                    player.run_ad(AdKind::PostRoll).await;
                }
                if !player.is_current(generation) {
                    return;
                }
                player.events.emit(&PlayerEvent::Ended);
            }

            if player.config.loop_playback {
                debug!(player_id = %player.id, "Looping");
                let restarted = match player.source() {
                    Some(source) => source.seek(0.0),
                    None => Ok(()),
                };
                if let Err(e) = restarted {
                    player.report(&e);
                    return;
                }
                let _ = player.play().await;
            } else if let Some(url) = next_url {
                info!(player_id = %player.id, url = %url, "Loading next video");
                let autoplay = player.config.next_video.autoplay;
                if let Err(e) = player.change_source(&url, autoplay).await {
                    debug!(player_id = %player.id, error = %e, "Next video did not load");
                }
            }
        });
    }

    /// Play one ad break around the content. Callers hold `ad_break`.
    async fn run_ad(&self, kind: AdKind) {
        if !self.ads.is_configured(kind) {
            return;
        }
        self.events.emit(&PlayerEvent::AdStart {
            kind: kind.as_str().to_string(),
        });
        let skipped = match self.ads.play(kind).await {
            Ok(outcome) => outcome == AdOutcome::Skipped,
            Err(Error::Destroyed) => return,
            Err(e) => {
                self.report(&e);
                true
            }
        };
        if self.is_destroyed() {
            return;
        }
        self.events.emit(&PlayerEvent::AdEnd {
            kind: kind.as_str().to_string(),
            skipped,
        });
    }

    // Controls

    /// Start playback. The first call plays the pre-roll. While any ad
    /// break runs, content playback waits for it to settle.
    #[instrument(skip(self), fields(player_id = %self.id))]
    pub async fn play(&self) -> Result<()> {
        let source = self.ready_source("play")?;
        let generation = self.generation.load(Ordering::SeqCst);

        let _break = self.ad_break.lock().await;
        if !self.is_current(generation) {
            return Err(Error::Destroyed);
        }
        let first = {
            let mut inner = self.inner.lock();
            !std::mem::replace(&mut inner.pre_roll_done, true)
        };
        if first {
            self.run_ad(AdKind::PreRoll).await;
            if !self.is_current(generation) {
                return Err(Error::Destroyed);
            }
        }

        source.play().await.map_err(|e| {
            self.report(&e);
            e
        })
    }

    /// Pause playback, then play the pause-roll if configured
    #[instrument(skip(self), fields(player_id = %self.id))]
    pub async fn pause(&self) -> Result<()> {
        let source = self.ready_source("pause")?;
        let was_playing = self.inner.lock().state.playing;
        source.pause()?;
        if was_playing && self.ads.is_configured(AdKind::PauseRoll) {
            let _break = self.ad_break.lock().await;
            self.run_ad(AdKind::PauseRoll).await;
        }
        Ok(())
    }

    pub async fn toggle_play(&self) -> Result<()> {
        if self.state().playing {
            self.pause().await
        } else {
            self.play().await
        }
    }

    /// Seek to `time` seconds, clamped to the media duration
    pub fn seek(&self, time: f64) -> Result<()> {
        let source = self.ready_source("seek")?;
        if !time.is_finite() {
            return Err(Error::playback("seek", format!("invalid seek target {time}")));
        }
        let target = {
            let mut inner = self.inner.lock();
            let duration = inner.state.duration;
            let target = if duration > 0.0 {
                time.clamp(0.0, duration)
            } else {
                time.max(0.0)
            };
            inner.seek_target = Some(target);
            target
        };
        source.seek(target)
    }

    /// Set the volume. Zero also mutes; a positive volume never unmutes.
    pub fn set_volume(&self, volume: f64) -> Result<()> {
        let source = self.ready_source("volume")?;
        if !volume.is_finite() {
            return Err(Error::playback("volume", format!("invalid volume {volume}")));
        }
        let volume = volume.clamp(0.0, 1.0);
        source.set_volume(volume)?;
        if volume == 0.0 {
            source.set_muted(true)?;
        }
        Ok(())
    }

    pub fn mute(&self) -> Result<()> {
        self.ready_source("mute")?.set_muted(true)
    }

    pub fn unmute(&self) -> Result<()> {
        self.ready_source("unmute")?.set_muted(false)
    }

    pub fn toggle_mute(&self) -> Result<()> {
        let muted = self.state().muted;
        self.ready_source("mute")?.set_muted(!muted)
    }

    pub fn set_playback_rate(&self, rate: f64) -> Result<()> {
        self.ready_source("rate")?.set_playback_rate(rate)
    }

    /// Select a quality by name, `auto` for adaptive selection
    pub fn set_quality(&self, quality: &str) -> Result<()> {
        self.ready_source("quality")?.set_quality(quality)
    }

    /// Enter or leave fullscreen on the container
    pub async fn toggle_fullscreen(&self) -> Result<()> {
        self.ensure_alive()?;
        let fullscreen = self.state().fullscreen;
        let result = if fullscreen {
            self.platform.exit_fullscreen().await
        } else {
            self.platform.request_fullscreen(&self.container_id).await
        };
        if let Err(e) = result {
            self.report(&e);
            return Err(e);
        }
        self.inner.lock().state.fullscreen = !fullscreen;
        debug!(player_id = %self.id, fullscreen = !fullscreen, "Fullscreen toggled");
        Ok(())
    }

    pub async fn toggle_pip(&self) -> Result<()> {
        let source = self.ready_source("pip")?;
        source.toggle_picture_in_picture().await.map_err(|e| {
            self.report(&e);
            e
        })
    }

    async fn handle_intent(&self, intent: UiIntent) {
        debug!(player_id = %self.id, intent = intent.name(), "UI intent");
        let result = match intent {
            UiIntent::Play => self.play().await,
            UiIntent::Pause => self.pause().await,
            UiIntent::Seek { time } => self.seek(time),
            UiIntent::Volume { volume } => self.set_volume(volume),
            UiIntent::Mute => self.toggle_mute(),
            UiIntent::Fullscreen => self.toggle_fullscreen().await,
            UiIntent::PictureInPicture => self.toggle_pip().await,
            UiIntent::Speed { rate } => self.set_playback_rate(rate),
            UiIntent::Quality { quality } => self.set_quality(&quality),
        };
        if let Err(e) = result {
            debug!(player_id = %self.id, error = %e, "UI intent not applied");
        }
    }

    /// Tear everything down. Idempotent.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.generation.fetch_add(1, Ordering::SeqCst);

        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        let (source, listener) = {
            let mut inner = self.inner.lock();
            inner.state.playing = false;
            (inner.source.take(), inner.source_listener.take())
        };
        if let Some(source) = source {
            if let Some(id) = listener {
                source.events().off(id);
            }
            source.destroy();
        }
        self.ads.destroy();
        self.analytics.destroy();
        self.ui.destroy();
        self.container.clear();

        info!(player_id = %self.id, container = %self.container_id, "Player destroyed");
        self.events.emit(&PlayerEvent::Destroyed);
        self.events.clear();
    }
}

impl Drop for PlayerInstance {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::create_config;
    use crate::platform::headless::{HeadlessOptions, HeadlessPlatform};
    use serde_json::json;

    async fn setup(
        options: HeadlessOptions,
        config: serde_json::Value,
    ) -> (Arc<HeadlessPlatform>, Arc<PlayerInstance>, Arc<Mutex<Vec<String>>>) {
        let platform = Arc::new(HeadlessPlatform::new(options));
        platform.add_container("player");
        let config = create_config(config).unwrap();
        let player = PlayerInstance::new(
            InstanceId::new(),
            "player",
            config,
            Arc::clone(&platform) as Arc<dyn Platform>,
        )
        .unwrap();

        let log = Arc::new(Mutex::new(Vec::new()));
        let l = Arc::clone(&log);
        player.events().on(move |e| {
            if !matches!(e, PlayerEvent::TimeUpdate { .. } | PlayerEvent::PhaseChanged { .. }) {
                l.lock().push(e.name().to_string());
            }
        });
        let _ = player.initialize().await;
        (platform, player, log)
    }

    async fn settle() {
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_missing_container() {
        let platform = Arc::new(HeadlessPlatform::default());
        let config = create_config(json!({ "videoUrl": "clip.mp4" })).unwrap();

        let err = PlayerInstance::new(InstanceId::new(), "nope", config, platform)
            .err()
            .unwrap();

        assert!(matches!(err, Error::ContainerNotFound(id) if id == "nope"));
    }

    #[tokio::test]
    async fn test_ready_then_play_pause() {
        let (_, player, log) = setup(Default::default(), json!({ "videoUrl": "clip.mp4" })).await;
        assert_eq!(player.phase(), PlayerPhase::Ready);
        assert!(!player.state().playing);

        player.play().await.unwrap();
        assert_eq!(player.phase(), PlayerPhase::Playing);
        assert!(player.state().playing);

        player.pause().await.unwrap();
        assert_eq!(player.phase(), PlayerPhase::Paused);
        assert!(!player.state().playing);

        assert_eq!(*log.lock(), vec!["player:ready", "player:play", "player:pause"]);
    }

    #[tokio::test]
    async fn test_autoplay_rejection_is_not_fatal() {
        let (platform, player, log) = setup(
            HeadlessOptions {
                autoplay_allowed: false,
                ..Default::default()
            },
            json!({ "videoUrl": "clip.mp4", "autoplay": true }),
        )
        .await;

        assert_eq!(player.phase(), PlayerPhase::Ready);
        assert_eq!(*log.lock(), vec!["player:ready", "player:error"]);

        platform.last_element().unwrap().set_autoplay_allowed(true);
        player.play().await.unwrap();
        assert_eq!(player.phase(), PlayerPhase::Playing);
    }

    #[tokio::test]
    async fn test_load_failure_then_reinit() {
        let (_, player, log) = setup(
            HeadlessOptions {
                failing_urls: vec!["clip".into()],
                ..Default::default()
            },
            json!({ "videoUrl": "clip.mp4" }),
        )
        .await;

        assert_eq!(player.phase(), PlayerPhase::Error);
        assert_eq!(*log.lock(), vec!["player:error"]);
        assert!(player.play().await.is_err());

        assert!(player.load_url("other.mp4").await.is_ok());
        assert_eq!(player.phase(), PlayerPhase::Ready);
    }

    #[tokio::test]
    async fn test_volume_zero_mutes_and_positive_keeps_mute() {
        let (_, player, _) = setup(Default::default(), json!({ "videoUrl": "clip.mp4" })).await;

        player.set_volume(0.0).unwrap();
        assert!(player.state().muted);
        player.set_volume(0.6).unwrap();
        assert!(player.state().muted);
        assert_eq!(player.state().volume, 0.6);

        player.unmute().unwrap();
        assert!(!player.state().muted);
    }

    #[tokio::test]
    async fn test_seek_overlay_and_stats() {
        let (_, player, _) = setup(Default::default(), json!({ "videoUrl": "clip.mp4" })).await;
        let mut phases = player.subscribe_phase();

        player.seek(500.0).unwrap();

        assert_eq!(player.state().current_time, 60.0);
        assert_eq!(player.phase(), PlayerPhase::Ready);
        assert!(phases.has_changed().unwrap());
        assert_eq!(player.telemetry().seek_count, 1);
    }

    #[tokio::test]
    async fn test_buffering_overlay() {
        let (platform, player, _) = setup(Default::default(), json!({ "videoUrl": "clip.mp4" })).await;
        player.play().await.unwrap();
        let element = platform.last_element().unwrap();

        element.stall();
        assert_eq!(player.phase(), PlayerPhase::Buffering);
        assert!(player.state().buffering);

        element.resume_data();
        assert_eq!(player.phase(), PlayerPhase::Playing);
    }

    #[tokio::test]
    async fn test_mid_playback_error_is_fatal() {
        let (platform, player, log) = setup(Default::default(), json!({ "videoUrl": "clip.mp4" })).await;
        player.play().await.unwrap();

        platform.last_element().unwrap().fail(3, "MEDIA_ERR_DECODE");

        assert_eq!(player.phase(), PlayerPhase::Error);
        assert!(!player.state().playing);
        assert_eq!(log.lock().last().map(String::as_str), Some("player:error"));
    }

    #[tokio::test]
    async fn test_ended_then_loop() {
        let (platform, player, log) = setup(
            HeadlessOptions {
                media_duration: 10.0,
                ..Default::default()
            },
            json!({ "videoUrl": "clip.mp4", "loop": true }),
        )
        .await;
        player.play().await.unwrap();

        platform.tick(11.0);
        assert!(log.lock().contains(&"player:ended".to_string()));
        settle().await;

        assert!(player.state().playing);
        assert_eq!(player.phase(), PlayerPhase::Playing);
    }

    #[tokio::test]
    async fn test_ui_intents_drive_the_player() {
        let (_, player, _) = setup(Default::default(), json!({ "videoUrl": "clip.mp4" })).await;

        player.ui().press_play();
        settle().await;
        assert!(player.state().playing);
        assert!(player.ui().view().playing);

        player.ui().choose_speed(1.5);
        settle().await;
        assert_eq!(player.state().playback_rate, 1.5);
    }

    #[tokio::test]
    async fn test_fullscreen_toggle() {
        let (platform, player, _) = setup(Default::default(), json!({ "videoUrl": "clip.mp4" })).await;

        player.toggle_fullscreen().await.unwrap();
        assert!(player.state().fullscreen);
        assert_eq!(platform.fullscreen_container().as_deref(), Some("player"));

        player.toggle_fullscreen().await.unwrap();
        assert!(!player.state().fullscreen);
        assert!(platform.fullscreen_container().is_none());
    }

    #[tokio::test]
    async fn test_destroy_is_idempotent_and_clears_everything() {
        let (platform, player, log) = setup(Default::default(), json!({ "videoUrl": "clip.mp4" })).await;

        player.destroy();
        player.destroy();

        assert!(platform.headless_container("player").unwrap().is_empty());
        assert_eq!(player.events().listener_count(), 0);
        assert!(matches!(player.play().await, Err(Error::Destroyed)));
        assert_eq!(log.lock().last().map(String::as_str), Some("player:destroyed"));
    }
}
