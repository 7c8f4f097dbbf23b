//! Typed publish/subscribe
//!
//! Every component talks through an [`EventEmitter`]: media backends publish
//! [`MediaEvent`]s, the control surface publishes [`UiIntent`]s and the player
//! instance publishes [`PlayerEvent`]s for the host page.
//!
//! Dispatch is synchronous. `emit` returns after every handler ran, in the
//! order the handlers subscribed. Handlers may subscribe, unsubscribe or
//! emit from inside a callback; the set of handlers for an emission is fixed
//! when the emission starts.

use crate::types::{PlayerPhase, QualityLevel};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Handle returned by [`EventEmitter::on`], used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Listener<E> {
    id: ListenerId,
    once: bool,
    handler: Handler<E>,
}

/// Synchronous, ordered event emitter
pub struct EventEmitter<E> {
    listeners: Mutex<Vec<Listener<E>>>,
    next_id: AtomicU64,
}

impl<E> EventEmitter<E> {
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Subscribe a handler for every emission
    pub fn on<F>(&self, handler: F) -> ListenerId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.subscribe(handler, false)
    }

    /// Subscribe a handler for the next emission only
    pub fn once<F>(&self, handler: F) -> ListenerId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.subscribe(handler, true)
    }

    fn subscribe<F>(&self, handler: F, once: bool) -> ListenerId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push(Listener {
            id,
            once,
            handler: Arc::new(handler),
        });
        id
    }

    /// Unsubscribe a handler. Returns false if it was not subscribed.
    pub fn off(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|l| l.id != id);
        listeners.len() != before
    }

    /// Deliver an event to every handler in subscription order
    pub fn emit(&self, event: &E) {
        let handlers: Vec<Handler<E>> = {
            let mut listeners = self.listeners.lock();
            let handlers = listeners.iter().map(|l| Arc::clone(&l.handler)).collect();
            listeners.retain(|l| !l.once);
            handlers
        };

        for handler in handlers {
            handler(event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Remove every handler
    pub fn clear(&self) {
        self.listeners.lock().clear();
    }
}

impl<E> Default for EventEmitter<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Normalized events published by every media backend
#[derive(Debug, Clone, PartialEq)]
pub enum MediaEvent {
    LoadStart,
    CanPlay,
    Play,
    Pause,
    Ended,
    TimeUpdate { current_time: f64, duration: f64 },
    VolumeChange { volume: f64, muted: bool },
    Seeking,
    Seeked,
    Buffering { buffering: bool },
    QualityChanged { quality: String },
    QualitiesAvailable { levels: Vec<QualityLevel> },
    RateChange { rate: f64 },
    PictureInPicture { active: bool },
    Error { message: String },
}

impl MediaEvent {
    /// Event name on the wire
    pub fn name(&self) -> &'static str {
        match self {
            MediaEvent::LoadStart => "loadstart",
            MediaEvent::CanPlay => "canplay",
            MediaEvent::Play => "play",
            MediaEvent::Pause => "pause",
            MediaEvent::Ended => "ended",
            MediaEvent::TimeUpdate { .. } => "timeupdate",
            MediaEvent::VolumeChange { .. } => "volumechange",
            MediaEvent::Seeking => "seeking",
            MediaEvent::Seeked => "seeked",
            MediaEvent::Buffering { .. } => "buffering",
            MediaEvent::QualityChanged { .. } => "quality_changed",
            MediaEvent::QualitiesAvailable { .. } => "qualities_available",
            MediaEvent::RateChange { .. } => "ratechange",
            MediaEvent::PictureInPicture { .. } => "pip",
            MediaEvent::Error { .. } => "error",
        }
    }
}

/// User intent published by the control surface
///
/// Intents are requests. Only the media events they cause change state.
#[derive(Debug, Clone, PartialEq)]
pub enum UiIntent {
    Play,
    Pause,
    Seek { time: f64 },
    Volume { volume: f64 },
    Mute,
    Fullscreen,
    PictureInPicture,
    Speed { rate: f64 },
    Quality { quality: String },
}

impl UiIntent {
    pub fn name(&self) -> &'static str {
        match self {
            UiIntent::Play => "ui:play",
            UiIntent::Pause => "ui:pause",
            UiIntent::Seek { .. } => "ui:seek",
            UiIntent::Volume { .. } => "ui:volume",
            UiIntent::Mute => "ui:mute",
            UiIntent::Fullscreen => "ui:fullscreen",
            UiIntent::PictureInPicture => "ui:pip",
            UiIntent::Speed { .. } => "ui:speed",
            UiIntent::Quality { .. } => "ui:quality",
        }
    }
}

/// Lifecycle events consumed by the host page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PlayerEvent {
    Ready,
    Play,
    Pause,
    Ended,
    Error {
        code: String,
        message: String,
        fatal: bool,
    },
    TimeUpdate {
        current_time: f64,
        duration: f64,
    },
    QualityChanged {
        quality: String,
    },
    PhaseChanged {
        from: PlayerPhase,
        to: PlayerPhase,
    },
    AdStart {
        kind: String,
    },
    AdEnd {
        kind: String,
        skipped: bool,
    },
    SourceChanged {
        url: String,
    },
    Destroyed,
}

impl PlayerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            PlayerEvent::Ready => "player:ready",
            PlayerEvent::Play => "player:play",
            PlayerEvent::Pause => "player:pause",
            PlayerEvent::Ended => "player:ended",
            PlayerEvent::Error { .. } => "player:error",
            PlayerEvent::TimeUpdate { .. } => "player:timeupdate",
            PlayerEvent::QualityChanged { .. } => "player:quality_changed",
            PlayerEvent::PhaseChanged { .. } => "player:phase_changed",
            PlayerEvent::AdStart { .. } => "player:ad_start",
            PlayerEvent::AdEnd { .. } => "player:ad_end",
            PlayerEvent::SourceChanged { .. } => "player:source_changed",
            PlayerEvent::Destroyed => "player:destroyed",
        }
    }
}
