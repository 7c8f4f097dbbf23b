//! Headless platform
//!
//! An in-memory stand-in for a browser page: containers are node lists,
//! media elements keep a clock that only moves when [`HeadlessElement::advance`]
//! (or [`HeadlessPlatform::tick`]) is called, and streaming engines publish a
//! fixed quality ladder. Used by the CLI and by tests.

use super::{
    ConnectionInfo, Container, ElementEvent, ElementKind, EngineEvent, EngineLevel, MediaElement,
    Platform, StreamingEngine, Viewport, DASH_MIME, HLS_MIME,
};
use crate::events::EventEmitter;
use crate::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Capabilities of the simulated environment
#[derive(Debug, Clone)]
pub struct HeadlessOptions {
    /// Elements decode HLS without an engine
    pub native_hls: bool,
    /// Elements decode DASH without an engine
    pub native_dash: bool,
    /// An HLS engine is available and supported
    pub hls_engine: bool,
    /// A DASH engine is available and supported
    pub dash_engine: bool,
    /// `play()` is allowed without a user gesture
    pub autoplay_allowed: bool,
    pub pip_supported: bool,
    pub fullscreen_enabled: bool,
    /// Duration reported for every loaded source, in seconds
    pub media_duration: f64,
    /// Sources whose URL contains one of these fail to load
    pub failing_urls: Vec<String>,
    /// Quality ladder published by engines
    pub levels: Vec<EngineLevel>,
    pub connection: ConnectionInfo,
    pub viewport: Viewport,
    pub user_agent: String,
}

impl Default for HeadlessOptions {
    fn default() -> Self {
        let level = |height: u32, width: u32, bitrate: u64| EngineLevel {
            width: Some(width),
            height: Some(height),
            bitrate,
            name: None,
        };

        Self {
            native_hls: false,
            native_dash: false,
            hls_engine: true,
            dash_engine: true,
            autoplay_allowed: true,
            pip_supported: true,
            fullscreen_enabled: true,
            media_duration: 60.0,
            failing_urls: Vec::new(),
            levels: vec![
                level(360, 640, 800_000),
                level(720, 1280, 2_500_000),
                level(1080, 1920, 5_000_000),
            ],
            connection: ConnectionInfo {
                effective_type: Some("4g".to_string()),
                downlink_mbps: Some(10.0),
                rtt_ms: Some(50),
                save_data: false,
            },
            viewport: Viewport {
                width: 1280,
                height: 720,
            },
            user_agent: format!("playkit-headless/{}", crate::VERSION),
        }
    }
}

/// In-memory page hosting any number of containers
pub struct HeadlessPlatform {
    options: HeadlessOptions,
    containers: Mutex<HashMap<String, Arc<HeadlessContainer>>>,
    elements: Mutex<Vec<Arc<HeadlessElement>>>,
    engines: Mutex<Vec<Arc<HeadlessEngine>>>,
    fullscreen: Mutex<Option<String>>,
}

impl HeadlessPlatform {
    pub fn new(options: HeadlessOptions) -> Self {
        Self {
            options,
            containers: Mutex::new(HashMap::new()),
            elements: Mutex::new(Vec::new()),
            engines: Mutex::new(Vec::new()),
            fullscreen: Mutex::new(None),
        }
    }

    pub fn options(&self) -> &HeadlessOptions {
        &self.options
    }

    /// Add an empty container to the page
    pub fn add_container(&self, id: &str) -> Arc<HeadlessContainer> {
        let container = Arc::new(HeadlessContainer::new(id));
        self.containers
            .lock()
            .insert(id.to_string(), Arc::clone(&container));
        container
    }

    pub fn headless_container(&self, id: &str) -> Option<Arc<HeadlessContainer>> {
        self.containers.lock().get(id).cloned()
    }

    /// Every element created so far, oldest first
    pub fn elements(&self) -> Vec<Arc<HeadlessElement>> {
        self.elements.lock().clone()
    }

    pub fn last_element(&self) -> Option<Arc<HeadlessElement>> {
        self.elements.lock().last().cloned()
    }

    /// Every engine created so far, oldest first
    pub fn engines(&self) -> Vec<Arc<HeadlessEngine>> {
        self.engines.lock().clone()
    }

    pub fn last_engine(&self) -> Option<Arc<HeadlessEngine>> {
        self.engines.lock().last().cloned()
    }

    /// Container currently shown fullscreen
    pub fn fullscreen_container(&self) -> Option<String> {
        self.fullscreen.lock().clone()
    }

    /// Advance the clock of every playing element
    pub fn tick(&self, seconds: f64) {
        for element in self.elements() {
            element.advance(seconds);
        }
    }

    fn new_engine(&self, name: &'static str, supported: bool) -> Arc<dyn StreamingEngine> {
        let engine = Arc::new(HeadlessEngine::new(name, supported, self.options.levels.clone()));
        self.engines.lock().push(Arc::clone(&engine));
        engine
    }
}

impl Default for HeadlessPlatform {
    fn default() -> Self {
        Self::new(HeadlessOptions::default())
    }
}

#[async_trait]
impl Platform for HeadlessPlatform {
    fn container(&self, id: &str) -> Option<Arc<dyn Container>> {
        self.headless_container(id)
            .map(|c| c as Arc<dyn Container>)
    }

    fn create_element(&self, kind: ElementKind) -> Arc<dyn MediaElement> {
        let element = Arc::new(HeadlessElement::new(kind, &self.options));
        self.elements.lock().push(Arc::clone(&element));
        element
    }

    fn hls_engine(&self) -> Option<Arc<dyn StreamingEngine>> {
        Some(self.new_engine("hls.js", self.options.hls_engine))
    }

    fn dash_engine(&self) -> Option<Arc<dyn StreamingEngine>> {
        Some(self.new_engine("dash.js", self.options.dash_engine))
    }

    async fn request_fullscreen(&self, container_id: &str) -> Result<()> {
        if !self.options.fullscreen_enabled {
            return Err(Error::playback("fullscreen", "fullscreen is not enabled on this page"));
        }
        *self.fullscreen.lock() = Some(container_id.to_string());
        Ok(())
    }

    async fn exit_fullscreen(&self) -> Result<()> {
        *self.fullscreen.lock() = None;
        Ok(())
    }

    fn connection_info(&self) -> ConnectionInfo {
        self.options.connection.clone()
    }

    fn user_agent(&self) -> String {
        self.options.user_agent.clone()
    }

    fn viewport(&self) -> Viewport {
        self.options.viewport
    }
}

/// Container holding a flat list of node names
pub struct HeadlessContainer {
    id: String,
    nodes: Mutex<Vec<String>>,
}

impl HeadlessContainer {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            nodes: Mutex::new(Vec::new()),
        }
    }
}

impl Container for HeadlessContainer {
    fn id(&self) -> &str {
        &self.id
    }

    fn mount(&self, node: &str) {
        self.nodes.lock().push(node.to_string());
    }

    fn nodes(&self) -> Vec<String> {
        self.nodes.lock().clone()
    }

    fn clear(&self) {
        self.nodes.lock().clear();
    }
}

#[derive(Debug)]
struct ElementState {
    src: Option<String>,
    loaded: bool,
    current_time: f64,
    duration: f64,
    paused: bool,
    ended: bool,
    volume: f64,
    muted: bool,
    rate: f64,
    pip: bool,
}

/// Simulated media element
pub struct HeadlessElement {
    kind: ElementKind,
    state: Mutex<ElementState>,
    events: EventEmitter<ElementEvent>,
    autoplay_allowed: AtomicBool,
    pip_supported: bool,
    native_hls: bool,
    native_dash: bool,
    media_duration: f64,
    failing_urls: Vec<String>,
}

impl HeadlessElement {
    fn new(kind: ElementKind, options: &HeadlessOptions) -> Self {
        Self {
            kind,
            state: Mutex::new(ElementState {
                src: None,
                loaded: false,
                current_time: 0.0,
                duration: 0.0,
                paused: true,
                ended: false,
                volume: 1.0,
                muted: false,
                rate: 1.0,
                pip: false,
            }),
            events: EventEmitter::new(),
            autoplay_allowed: AtomicBool::new(options.autoplay_allowed),
            pip_supported: options.pip_supported && kind == ElementKind::Video,
            native_hls: options.native_hls,
            native_dash: options.native_dash,
            media_duration: options.media_duration,
            failing_urls: options.failing_urls.clone(),
        }
    }

    /// Move the playback clock forward by `seconds` of wall time
    pub fn advance(&self, seconds: f64) {
        let (current_time, duration, ended) = {
            let mut state = self.state.lock();
            if state.paused || !state.loaded {
                return;
            }
            state.current_time += seconds * state.rate;
            if state.current_time >= state.duration {
                state.current_time = state.duration;
                state.paused = true;
                state.ended = true;
            }
            (state.current_time, state.duration, state.ended)
        };

        self.events.emit(&ElementEvent::TimeUpdate {
            current_time,
            duration,
        });
        if ended {
            self.events.emit(&ElementEvent::Ended);
        }
    }

    /// Simulate the decoder running out of data
    pub fn stall(&self) {
        self.events.emit(&ElementEvent::Waiting);
    }

    /// Simulate data arriving after a stall
    pub fn resume_data(&self) {
        self.events.emit(&ElementEvent::CanPlay);
        self.events.emit(&ElementEvent::Playing);
    }

    /// Simulate a decode or network error
    pub fn fail(&self, code: u16, message: &str) {
        self.events.emit(&ElementEvent::Error {
            code,
            message: message.to_string(),
        });
    }

    pub fn set_autoplay_allowed(&self, allowed: bool) {
        self.autoplay_allowed.store(allowed, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    pub fn current_time(&self) -> f64 {
        self.state.lock().current_time
    }

    pub fn volume(&self) -> f64 {
        self.state.lock().volume
    }

    pub fn muted(&self) -> bool {
        self.state.lock().muted
    }

    pub fn playback_rate(&self) -> f64 {
        self.state.lock().rate
    }
}

#[async_trait]
impl MediaElement for HeadlessElement {
    fn kind(&self) -> ElementKind {
        self.kind
    }

    fn set_src(&self, url: &str) {
        let mut state = self.state.lock();
        state.src = Some(url.to_string());
        state.loaded = false;
    }

    fn src(&self) -> Option<String> {
        self.state.lock().src.clone()
    }

    fn load(&self) {
        self.events.emit(&ElementEvent::LoadStart);

        let src = self.state.lock().src.clone();
        let Some(url) = src else {
            self.fail(4, "MEDIA_ERR_SRC_NOT_SUPPORTED: no source set");
            return;
        };
        if self.failing_urls.iter().any(|f| url.contains(f.as_str())) {
            self.fail(2, &format!("MEDIA_ERR_NETWORK: failed to fetch {url}"));
            return;
        }

        let duration = {
            let mut state = self.state.lock();
            state.loaded = true;
            state.current_time = 0.0;
            state.duration = self.media_duration;
            state.paused = true;
            state.ended = false;
            state.duration
        };
        debug!(url = %url, duration, "Headless element loaded");

        self.events.emit(&ElementEvent::LoadedMetadata { duration });
        self.events.emit(&ElementEvent::CanPlay);
    }

    async fn play(&self) -> Result<()> {
        if !self.autoplay_allowed.load(Ordering::SeqCst) {
            return Err(Error::playback(
                "play",
                "NotAllowedError: play() failed because the user didn't interact with the document first",
            ));
        }

        let restarted = {
            let mut state = self.state.lock();
            if !state.loaded {
                return Err(Error::playback("play", "no media loaded"));
            }
            if !state.paused {
                return Ok(());
            }
            let restarted = state.ended;
            if restarted {
                state.current_time = 0.0;
                state.ended = false;
            }
            state.paused = false;
            restarted
        };

        if restarted {
            self.events.emit(&ElementEvent::Seeking);
            self.events.emit(&ElementEvent::Seeked);
        }
        self.events.emit(&ElementEvent::Play);
        self.events.emit(&ElementEvent::Playing);
        Ok(())
    }

    fn pause(&self) {
        {
            let mut state = self.state.lock();
            if state.paused {
                return;
            }
            state.paused = true;
        }
        self.events.emit(&ElementEvent::Pause);
    }

    fn set_current_time(&self, time: f64) {
        self.events.emit(&ElementEvent::Seeking);
        let (current_time, duration) = {
            let mut state = self.state.lock();
            state.current_time = time.clamp(0.0, state.duration.max(0.0));
            state.ended = false;
            (state.current_time, state.duration)
        };
        self.events.emit(&ElementEvent::Seeked);
        self.events.emit(&ElementEvent::TimeUpdate {
            current_time,
            duration,
        });
    }

    fn set_volume(&self, volume: f64) {
        let muted = {
            let mut state = self.state.lock();
            state.volume = volume.clamp(0.0, 1.0);
            state.muted
        };
        self.events.emit(&ElementEvent::VolumeChange {
            volume: volume.clamp(0.0, 1.0),
            muted,
        });
    }

    fn set_muted(&self, muted: bool) {
        let volume = {
            let mut state = self.state.lock();
            state.muted = muted;
            state.volume
        };
        self.events.emit(&ElementEvent::VolumeChange { volume, muted });
    }

    fn set_playback_rate(&self, rate: f64) {
        self.state.lock().rate = rate;
        self.events.emit(&ElementEvent::RateChange { rate });
    }

    fn can_play_type(&self, mime: &str) -> bool {
        match mime {
            HLS_MIME => self.native_hls,
            DASH_MIME => self.native_dash,
            other => other.starts_with("video/") || other.starts_with("audio/"),
        }
    }

    fn supports_picture_in_picture(&self) -> bool {
        self.pip_supported
    }

    fn in_picture_in_picture(&self) -> bool {
        self.state.lock().pip
    }

    async fn request_picture_in_picture(&self) -> Result<()> {
        if !self.pip_supported {
            return Err(Error::playback("pip", "picture-in-picture is not supported"));
        }
        self.state.lock().pip = true;
        self.events.emit(&ElementEvent::EnterPictureInPicture);
        Ok(())
    }

    async fn exit_picture_in_picture(&self) -> Result<()> {
        self.state.lock().pip = false;
        self.events.emit(&ElementEvent::LeavePictureInPicture);
        Ok(())
    }

    fn detach(&self) {
        let mut state = self.state.lock();
        state.src = None;
        state.loaded = false;
        state.paused = true;
    }

    fn events(&self) -> &EventEmitter<ElementEvent> {
        &self.events
    }
}

struct EngineState {
    element: Option<Arc<dyn MediaElement>>,
    url: Option<String>,
    level: Option<usize>,
    destroyed: bool,
}

/// Simulated HLS/DASH library
pub struct HeadlessEngine {
    name: &'static str,
    supported: bool,
    levels: Vec<EngineLevel>,
    state: Mutex<EngineState>,
    events: EventEmitter<EngineEvent>,
}

impl HeadlessEngine {
    fn new(name: &'static str, supported: bool, levels: Vec<EngineLevel>) -> Self {
        Self {
            name,
            supported,
            levels,
            state: Mutex::new(EngineState {
                element: None,
                url: None,
                level: None,
                destroyed: false,
            }),
            events: EventEmitter::new(),
        }
    }

    pub fn url(&self) -> Option<String> {
        self.state.lock().url.clone()
    }

    pub fn is_destroyed(&self) -> bool {
        self.state.lock().destroyed
    }

    /// Simulate the ABR algorithm moving to another level
    pub fn switch_level(&self, index: usize) {
        self.events.emit(&EngineEvent::LevelSwitched { index });
    }

    /// Simulate a library error
    pub fn fail(&self, fatal: bool, details: &str) {
        self.events.emit(&EngineEvent::Error {
            fatal,
            details: details.to_string(),
        });
    }
}

impl StreamingEngine for HeadlessEngine {
    fn name(&self) -> &'static str {
        self.name
    }

    fn is_supported(&self) -> bool {
        self.supported
    }

    fn attach(&self, element: Arc<dyn MediaElement>, url: &str, _config: &serde_json::Value) -> Result<()> {
        {
            let mut state = self.state.lock();
            if state.destroyed {
                return Err(Error::engine(self.name, "attach", "engine has been destroyed"));
            }
            state.element = Some(Arc::clone(&element));
            state.url = Some(url.to_string());
        }

        self.events.emit(&EngineEvent::ManifestParsed {
            levels: self.levels.clone(),
        });
        element.set_src(&format!("blob:{url}"));
        element.load();
        Ok(())
    }

    fn set_level(&self, index: Option<usize>) {
        let index = index.filter(|i| *i < self.levels.len());
        self.state.lock().level = index;
        if let Some(index) = index {
            self.events.emit(&EngineEvent::LevelSwitched { index });
        }
    }

    fn auto_level_enabled(&self) -> bool {
        self.state.lock().level.is_none()
    }

    fn destroy(&self) {
        let element = {
            let mut state = self.state.lock();
            state.destroyed = true;
            state.element.take()
        };
        if let Some(element) = element {
            element.detach();
        }
    }

    fn events(&self) -> &EventEmitter<EngineEvent> {
        &self.events
    }
}
