//! Element event forwarding shared by every backend

use crate::events::{EventEmitter, ListenerId, MediaEvent};
use crate::platform::{ElementEvent, MediaElement};
use crate::{Error, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, warn};

struct PendingLoad {
    url: String,
    tx: oneshot::Sender<Result<()>>,
}

/// Settles the load currently awaited by [`ElementBridge::load_with`]
#[derive(Clone, Default)]
pub struct LoadSignal(Arc<Mutex<Option<PendingLoad>>>);

impl LoadSignal {
    fn arm(&self, url: &str) -> oneshot::Receiver<Result<()>> {
        let (tx, rx) = oneshot::channel();
        *self.0.lock() = Some(PendingLoad {
            url: url.to_string(),
            tx,
        });
        rx
    }

    fn disarm(&self) {
        self.0.lock().take();
    }

    /// Resolve the pending load, if any
    pub fn resolve(&self) {
        if let Some(pending) = self.0.lock().take() {
            let _ = pending.tx.send(Ok(()));
        }
    }

    /// Reject the pending load with a load error for its URL
    pub fn reject(&self, reason: &str) {
        if let Some(pending) = self.0.lock().take() {
            let err = Error::load(pending.url, reason);
            let _ = pending.tx.send(Err(err));
        }
    }

    /// Reject the pending load with a specific error
    pub fn fail(&self, err: Error) {
        if let Some(pending) = self.0.lock().take() {
            let _ = pending.tx.send(Err(err));
        }
    }
}

/// Translates raw element events into [`MediaEvent`]s and owns the element
pub struct ElementBridge {
    element: Arc<dyn MediaElement>,
    events: Arc<EventEmitter<MediaEvent>>,
    signal: LoadSignal,
    listener: Mutex<Option<ListenerId>>,
    destroyed: AtomicBool,
}

impl ElementBridge {
    pub fn new(element: Arc<dyn MediaElement>) -> Self {
        let events = Arc::new(EventEmitter::new());
        let signal = LoadSignal::default();
        let waiting = Arc::new(AtomicBool::new(false));

        let listener = {
            let events = Arc::clone(&events);
            let signal = signal.clone();
            element
                .events()
                .on(move |raw| forward(raw, &events, &signal, &waiting))
        };

        Self {
            element,
            events,
            signal,
            listener: Mutex::new(Some(listener)),
            destroyed: AtomicBool::new(false),
        }
    }

    pub fn element(&self) -> &Arc<dyn MediaElement> {
        &self.element
    }

    pub fn events(&self) -> Arc<EventEmitter<MediaEvent>> {
        Arc::clone(&self.events)
    }

    pub fn load_signal(&self) -> LoadSignal {
        self.signal.clone()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    pub fn ensure_alive(&self) -> Result<()> {
        if self.is_destroyed() {
            Err(Error::Destroyed)
        } else {
            Ok(())
        }
    }

    /// Run `start` and wait for the element to decode its first data
    pub async fn load_with<F>(&self, url: &str, start: F) -> Result<()>
    where
        F: FnOnce(&Arc<dyn MediaElement>) -> Result<()> + Send,
    {
        self.ensure_alive()?;
        let rx = self.signal.arm(url);

        if let Err(err) = start(&self.element) {
            self.signal.disarm();
            return Err(err);
        }

        match rx.await {
            Ok(result) => result,
            // Sender dropped: destroyed or superseded while loading
            Err(_) => Err(Error::Destroyed),
        }
    }

    /// Point the element at `url` and load it
    pub async fn load_src(&self, url: &str) -> Result<()> {
        self.load_with(url, |element| {
            element.set_src(url);
            element.load();
            Ok(())
        })
        .await
    }

    pub async fn play(&self) -> Result<()> {
        self.ensure_alive()?;
        self.element.play().await
    }

    pub fn pause(&self) -> Result<()> {
        self.ensure_alive()?;
        self.element.pause();
        Ok(())
    }

    pub fn seek(&self, time: f64) -> Result<()> {
        self.ensure_alive()?;
        if !time.is_finite() {
            return Err(Error::playback("seek", format!("invalid seek target {time}")));
        }
        self.element.set_current_time(time.max(0.0));
        Ok(())
    }

    pub fn set_volume(&self, volume: f64) -> Result<()> {
        self.ensure_alive()?;
        self.element.set_volume(volume.clamp(0.0, 1.0));
        Ok(())
    }

    pub fn set_muted(&self, muted: bool) -> Result<()> {
        self.ensure_alive()?;
        self.element.set_muted(muted);
        Ok(())
    }

    pub fn set_playback_rate(&self, rate: f64) -> Result<()> {
        self.ensure_alive()?;
        if !(rate.is_finite() && rate > 0.0) {
            return Err(Error::playback("rate", format!("invalid playback rate {rate}")));
        }
        self.element.set_playback_rate(rate);
        Ok(())
    }

    pub fn supports_pip(&self) -> bool {
        self.element.supports_picture_in_picture()
    }

    pub async fn toggle_picture_in_picture(&self) -> Result<()> {
        self.ensure_alive()?;
        if !self.supports_pip() {
            return Err(Error::playback("pip", "picture-in-picture is not supported"));
        }
        if self.element.in_picture_in_picture() {
            self.element.exit_picture_in_picture().await
        } else {
            self.element.request_picture_in_picture().await
        }
    }

    /// Publish an event that did not come from the element
    pub fn emit(&self, event: MediaEvent) {
        self.events.emit(&event);
    }

    /// Stop forwarding, release the element and drop every subscriber
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(id) = self.listener.lock().take() {
            self.element.events().off(id);
        }
        self.signal.disarm();
        self.element.pause();
        self.element.detach();
        self.events.clear();
        debug!("Element bridge destroyed");
    }
}

fn forward(
    raw: &ElementEvent,
    events: &EventEmitter<MediaEvent>,
    signal: &LoadSignal,
    waiting: &AtomicBool,
) {
    let event = match raw {
        ElementEvent::LoadStart => MediaEvent::LoadStart,
        ElementEvent::LoadedMetadata { duration } => MediaEvent::TimeUpdate {
            current_time: 0.0,
            duration: *duration,
        },
        ElementEvent::CanPlay => {
            signal.resolve();
            if waiting.swap(false, Ordering::SeqCst) {
                events.emit(&MediaEvent::Buffering { buffering: false });
            }
            MediaEvent::CanPlay
        }
        ElementEvent::Play => MediaEvent::Play,
        ElementEvent::Playing => {
            if !waiting.swap(false, Ordering::SeqCst) {
                return;
            }
            MediaEvent::Buffering { buffering: false }
        }
        ElementEvent::Pause => MediaEvent::Pause,
        ElementEvent::Ended => MediaEvent::Ended,
        ElementEvent::Waiting => {
            if waiting.swap(true, Ordering::SeqCst) {
                return;
            }
            MediaEvent::Buffering { buffering: true }
        }
        ElementEvent::TimeUpdate {
            current_time,
            duration,
        } => MediaEvent::TimeUpdate {
            current_time: *current_time,
            duration: *duration,
        },
        ElementEvent::VolumeChange { volume, muted } => MediaEvent::VolumeChange {
            volume: *volume,
            muted: *muted,
        },
        ElementEvent::Seeking => MediaEvent::Seeking,
        ElementEvent::Seeked => MediaEvent::Seeked,
        ElementEvent::RateChange { rate } => MediaEvent::RateChange { rate: *rate },
        ElementEvent::EnterPictureInPicture => MediaEvent::PictureInPicture { active: true },
        ElementEvent::LeavePictureInPicture => MediaEvent::PictureInPicture { active: false },
        ElementEvent::Error { code, message } => {
            let message = format!("media error {code}: {message}");
            warn!(code, error = %message, "Media element error");
            signal.reject(&message);
            MediaEvent::Error { message }
        }
    };
    events.emit(&event);
}
