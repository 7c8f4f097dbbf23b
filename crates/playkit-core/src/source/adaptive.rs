//! Shared machinery for manifest-based backends (HLS, DASH)
//!
//! Decides between native decoding and a streaming engine, maps engine
//! levels to named [`QualityLevel`]s and translates engine events. Bitrate
//! adaptation itself stays inside the engine.

use super::bridge::{ElementBridge, LoadSignal};
use crate::events::{ListenerId, MediaEvent};
use crate::platform::{EngineEvent, EngineLevel, MediaElement, StreamingEngine};
use crate::types::{MediaType, QualityLevel, AUTO_QUALITY};
use crate::{Error, Result};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

/// How the manifest gets decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodePath {
    /// The platform element understands the manifest itself
    Native,
    /// A streaming engine feeds the element
    Engine,
}

/// Named quality ladder with the `auto` sentinel first
#[derive(Debug, Clone)]
pub struct QualityMap {
    levels: Vec<QualityLevel>,
    current: String,
}

impl Default for QualityMap {
    fn default() -> Self {
        Self {
            levels: Vec::new(),
            current: AUTO_QUALITY.to_string(),
        }
    }
}

impl QualityMap {
    /// Rebuild from the levels an engine published
    pub fn rebuild(&mut self, engine_levels: &[EngineLevel]) {
        let mut levels = vec![QualityLevel::auto()];
        for (index, level) in engine_levels.iter().enumerate() {
            let kbps = level.bitrate / 1000;
            let mut name = level
                .name
                .clone()
                .or_else(|| level.height.map(|h| format!("{h}p")))
                .unwrap_or_else(|| format!("{kbps}k"));
            if levels.iter().any(|l| l.name == name) {
                name = format!("{name} ({kbps}k)");
            }
            levels.push(QualityLevel {
                name,
                index: index as i32,
                height: level.height,
                bitrate: Some(level.bitrate),
            });
        }
        self.levels = levels;
    }

    /// Only the `auto` entry, used when the platform decodes natively
    pub fn auto_only(&mut self) {
        self.levels = vec![QualityLevel::auto()];
    }

    pub fn levels(&self) -> Vec<QualityLevel> {
        self.levels.clone()
    }

    /// Engine index for a named, non-auto quality
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.levels
            .iter()
            .find(|l| !l.is_auto() && l.name == name)
            .map(|l| l.index as usize)
    }

    pub fn name_of(&self, index: usize) -> Option<String> {
        self.levels
            .iter()
            .find(|l| l.index == index as i32)
            .map(|l| l.name.clone())
    }

    pub fn current(&self) -> &str {
        &self.current
    }

    /// Record the selected quality. Returns true if it changed.
    pub fn set_current(&mut self, name: &str) -> bool {
        if self.current == name {
            return false;
        }
        self.current = name.to_string();
        true
    }
}

/// Native-or-engine playback of a manifest URL
pub struct AdaptiveController {
    media_type: MediaType,
    mime: &'static str,
    url: String,
    engine_config: Value,
    bridge: ElementBridge,
    engine: Option<Arc<dyn StreamingEngine>>,
    path: Mutex<Option<DecodePath>>,
    qualities: Arc<Mutex<QualityMap>>,
    engine_listener: Mutex<Option<ListenerId>>,
}

impl AdaptiveController {
    pub fn new(
        media_type: MediaType,
        mime: &'static str,
        url: &str,
        element: Arc<dyn MediaElement>,
        engine: Option<Arc<dyn StreamingEngine>>,
        engine_config: Value,
    ) -> Self {
        Self {
            media_type,
            mime,
            url: url.to_string(),
            engine_config,
            bridge: ElementBridge::new(element),
            engine,
            path: Mutex::new(None),
            qualities: Arc::new(Mutex::new(QualityMap::default())),
            engine_listener: Mutex::new(None),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn bridge(&self) -> &ElementBridge {
        &self.bridge
    }

    pub fn decode_path(&self) -> Option<DecodePath> {
        *self.path.lock()
    }

    /// Native decoding wins when available, then a supported engine
    pub fn select_path(&self) -> Result<DecodePath> {
        if self.bridge.element().can_play_type(self.mime) {
            return Ok(DecodePath::Native);
        }
        match &self.engine {
            Some(engine) if engine.is_supported() => Ok(DecodePath::Engine),
            _ => Err(Error::UnsupportedMediaType(format!(
                "{}: no native decoder or streaming engine available",
                self.media_type
            ))),
        }
    }

    pub async fn load(&self) -> Result<()> {
        self.bridge.ensure_alive()?;
        let path = self.select_path()?;
        *self.path.lock() = Some(path);
        info!(url = %self.url, media_type = %self.media_type, path = ?path, "Loading adaptive source");

        match (path, &self.engine) {
            (DecodePath::Engine, Some(engine)) => {
                self.subscribe_engine(engine);
                let config = &self.engine_config;
                self.bridge
                    .load_with(&self.url, |element| {
                        engine.attach(Arc::clone(element), &self.url, config)
                    })
                    .await
            }
            _ => {
                let levels = {
                    let mut map = self.qualities.lock();
                    map.auto_only();
                    map.levels()
                };
                self.bridge.emit(MediaEvent::QualitiesAvailable { levels });
                self.bridge.load_src(&self.url).await
            }
        }
    }

    fn subscribe_engine(&self, engine: &Arc<dyn StreamingEngine>) {
        let events = self.bridge.events();
        let signal = self.bridge.load_signal();
        let qualities = Arc::clone(&self.qualities);
        let weak: Weak<dyn StreamingEngine> = Arc::downgrade(engine);
        let engine_name = engine.name();
        let url = self.url.clone();

        let id = engine.events().on(move |event| match event {
            EngineEvent::ManifestParsed { levels } => {
                let levels = {
                    let mut map = qualities.lock();
                    map.rebuild(levels);
                    map.levels()
                };
                debug!(engine = engine_name, count = levels.len(), "Manifest parsed");
                events.emit(&MediaEvent::QualitiesAvailable { levels });
            }
            EngineEvent::LevelSwitched { index } => {
                let auto = weak.upgrade().map_or(true, |e| e.auto_level_enabled());
                let changed = {
                    let mut map = qualities.lock();
                    let name = if auto {
                        Some(AUTO_QUALITY.to_string())
                    } else {
                        map.name_of(*index)
                    };
                    name.filter(|n| map.set_current(n))
                };
                if let Some(quality) = changed {
                    events.emit(&MediaEvent::QualityChanged { quality });
                }
            }
            EngineEvent::Error { fatal, details } => {
                if *fatal {
                    let err = Error::engine(engine_name, &url, details);
                    let message = err.to_string();
                    warn!(engine = engine_name, error = %message, "Fatal engine error");
                    signal.fail(err);
                    events.emit(&MediaEvent::Error { message });
                } else {
                    debug!(engine = engine_name, details = %details, "Recoverable engine error");
                }
            }
        });
        *self.engine_listener.lock() = Some(id);
    }

    /// Map a quality name to an engine level, falling back to adaptive
    pub fn set_quality(&self, name: &str) -> Result<()> {
        self.bridge.ensure_alive()?;
        let engine = match (self.decode_path(), &self.engine) {
            (Some(DecodePath::Engine), Some(engine)) => engine,
            _ => {
                debug!(quality = name, "Quality selection unavailable for this decode path");
                return Ok(());
            }
        };

        let index = if name == AUTO_QUALITY {
            None
        } else {
            let index = self.qualities.lock().index_of(name);
            if index.is_none() {
                warn!(quality = name, "Unknown quality, using adaptive selection");
            }
            index
        };

        engine.set_level(index);
        let fell_back = index.is_none() && self.qualities.lock().set_current(AUTO_QUALITY);
        if fell_back {
            self.bridge.emit(MediaEvent::QualityChanged {
                quality: AUTO_QUALITY.to_string(),
            });
        }
        Ok(())
    }

    pub fn qualities(&self) -> Vec<QualityLevel> {
        self.qualities.lock().levels()
    }

    pub fn destroy(&self) {
        if let Some(engine) = &self.engine {
            if let Some(id) = self.engine_listener.lock().take() {
                engine.events().off(id);
            }
            engine.destroy();
        }
        self.bridge.destroy();
    }
}
