//! Headless control surface
//!
//! [`UiController`] owns the control model for one player: which controls
//! exist (gated by [`FeaturesConfig`]), what they currently show
//! ([`ControlView`]) and whether they are visible. User gestures only
//! publish [`UiIntent`]s. The player decides what happens and reports back
//! through the `update_*` calls.

use crate::config::{FeaturesConfig, PlayerConfig, SpeedConfig, UiConfig};
use crate::events::{EventEmitter, UiIntent};
use crate::platform::Container;
use crate::types::{QualityLevel, AUTO_QUALITY};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// One control on the surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Control {
    TopBar,
    PlayPause,
    Progress,
    TimeLabel,
    Volume,
    Mute,
    Speed,
    Quality,
    PictureInPicture,
    Fullscreen,
    BufferingIndicator,
}

impl Control {
    /// Node name mounted into the container
    pub fn node(&self) -> &'static str {
        match self {
            Control::TopBar => "playkit-top-bar",
            Control::PlayPause => "playkit-play",
            Control::Progress => "playkit-progress",
            Control::TimeLabel => "playkit-time",
            Control::Volume => "playkit-volume",
            Control::Mute => "playkit-mute",
            Control::Speed => "playkit-speed",
            Control::Quality => "playkit-quality",
            Control::PictureInPicture => "playkit-pip",
            Control::Fullscreen => "playkit-fullscreen",
            Control::BufferingIndicator => "playkit-spinner",
        }
    }
}

/// Controls present for a given set of feature flags
#[derive(Debug, Clone, PartialEq)]
pub struct ControlSurface {
    controls: Vec<Control>,
}

impl ControlSurface {
    pub fn from_features(features: &FeaturesConfig) -> Self {
        let gated = [
            (features.top_bar, Control::TopBar),
            (true, Control::PlayPause),
            (features.progress, Control::Progress),
            (true, Control::TimeLabel),
            (features.volume, Control::Volume),
            (features.volume, Control::Mute),
            (features.speed, Control::Speed),
            (features.quality, Control::Quality),
            (features.pip, Control::PictureInPicture),
            (features.fullscreen, Control::Fullscreen),
            (true, Control::BufferingIndicator),
        ];
        Self {
            controls: gated
                .into_iter()
                .filter_map(|(enabled, control)| enabled.then_some(control))
                .collect(),
        }
    }

    pub fn has(&self, control: Control) -> bool {
        self.controls.contains(&control)
    }

    pub fn controls(&self) -> &[Control] {
        &self.controls
    }
}

/// What the surface currently renders
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlView {
    pub visible: bool,
    pub playing: bool,
    pub buffering: bool,
    pub current_time: f64,
    pub duration: f64,
    /// Progress bar fill in [0, 1]
    pub progress: f64,
    /// "elapsed / total"
    pub time_label: String,
    pub volume: f64,
    pub muted: bool,
    pub speed: f64,
    pub quality: String,
    /// Entries of the quality menu, `auto` first
    pub qualities: Vec<String>,
    pub title: Option<String>,
}

impl ControlView {
    fn new(config: &PlayerConfig) -> Self {
        Self {
            visible: true,
            playing: false,
            buffering: false,
            current_time: 0.0,
            duration: 0.0,
            progress: 0.0,
            time_label: format!("{} / {}", format_time(0.0), format_time(0.0)),
            volume: config.volume,
            muted: config.muted,
            speed: config.speed.default,
            quality: AUTO_QUALITY.to_string(),
            qualities: Vec::new(),
            title: config.ui.title.clone(),
        }
    }
}

/// Format seconds as `m:ss`, or `h:mm:ss` past an hour
pub fn format_time(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m}:{s:02}")
    }
}

/// Control model and gesture handling for one player
pub struct UiController {
    container: Arc<dyn Container>,
    settings: UiConfig,
    features: FeaturesConfig,
    speed: SpeedConfig,
    surface: ControlSurface,
    view: Mutex<ControlView>,
    last_activity: Mutex<Instant>,
    intents: EventEmitter<UiIntent>,
    destroyed: AtomicBool,
}

impl UiController {
    /// Build the surface and mount it into `container`
    pub fn new(container: Arc<dyn Container>, config: &PlayerConfig) -> Self {
        let surface = ControlSurface::from_features(&config.features);
        for control in surface.controls() {
            container.mount(control.node());
        }
        debug!(
            container = container.id(),
            controls = surface.controls().len(),
            "Control surface mounted"
        );

        Self {
            container,
            settings: config.ui.clone(),
            features: config.features.clone(),
            speed: config.speed.clone(),
            surface,
            view: Mutex::new(ControlView::new(config)),
            last_activity: Mutex::new(Instant::now()),
            intents: EventEmitter::new(),
            destroyed: AtomicBool::new(false),
        }
    }

    /// Intents published by gestures
    pub fn intents(&self) -> &EventEmitter<UiIntent> {
        &self.intents
    }

    pub fn surface(&self) -> &ControlSurface {
        &self.surface
    }

    pub fn view(&self) -> ControlView {
        self.view.lock().clone()
    }

    fn publish(&self, control: Control, intent: UiIntent) {
        if self.destroyed.load(Ordering::SeqCst) {
            return;
        }
        if !self.surface.has(control) {
            debug!(control = ?control, intent = intent.name(), "Gesture on disabled control ignored");
            return;
        }
        self.pointer_activity(Instant::now());
        self.intents.emit(&intent);
    }

    // Gestures

    pub fn press_play(&self) {
        self.publish(Control::PlayPause, UiIntent::Play);
    }

    pub fn press_pause(&self) {
        self.publish(Control::PlayPause, UiIntent::Pause);
    }

    pub fn toggle_play(&self) {
        let playing = self.view.lock().playing;
        if playing {
            self.press_pause();
        } else {
            self.press_play();
        }
    }

    /// Seek to a fraction of the duration
    pub fn scrub_to(&self, fraction: f64) {
        let duration = self.view.lock().duration;
        if duration <= 0.0 || !fraction.is_finite() {
            return;
        }
        let time = fraction.clamp(0.0, 1.0) * duration;
        self.publish(Control::Progress, UiIntent::Seek { time });
    }

    pub fn drag_volume(&self, volume: f64) {
        if !volume.is_finite() {
            return;
        }
        self.publish(
            Control::Volume,
            UiIntent::Volume {
                volume: volume.clamp(0.0, 1.0),
            },
        );
    }

    pub fn press_mute(&self) {
        self.publish(Control::Mute, UiIntent::Mute);
    }

    pub fn press_fullscreen(&self) {
        self.publish(Control::Fullscreen, UiIntent::Fullscreen);
    }

    pub fn press_pip(&self) {
        self.publish(Control::PictureInPicture, UiIntent::PictureInPicture);
    }

    /// Pick a rate from the speed menu
    pub fn choose_speed(&self, rate: f64) {
        if !self.speed.options.iter().any(|r| (r - rate).abs() < f64::EPSILON) {
            debug!(rate, "Speed not offered in the menu");
            return;
        }
        self.publish(Control::Speed, UiIntent::Speed { rate });
    }

    /// Pick an entry of the quality menu
    pub fn choose_quality(&self, name: &str) {
        let offered = self.view.lock().qualities.iter().any(|q| q == name);
        if !offered {
            debug!(quality = name, "Quality not offered in the menu");
            return;
        }
        self.publish(
            Control::Quality,
            UiIntent::Quality {
                quality: name.to_string(),
            },
        );
    }

    /// Keyboard shortcuts. Returns true if the key was handled.
    pub fn handle_key(&self, key: &str) -> bool {
        if !self.features.keyboard || self.destroyed.load(Ordering::SeqCst) {
            return false;
        }
        let (current_time, duration, volume) = {
            let view = self.view.lock();
            (view.current_time, view.duration, view.volume)
        };
        let step = self.settings.seek_step;

        match key {
            " " | "k" => self.toggle_play(),
            "ArrowLeft" | "ArrowRight" => {
                let delta = if key == "ArrowLeft" { -step } else { step };
                let mut time = (current_time + delta).max(0.0);
                if duration > 0.0 {
                    time = time.min(duration);
                }
                self.publish(Control::Progress, UiIntent::Seek { time });
            }
            "ArrowUp" | "ArrowDown" => {
                let delta = if key == "ArrowUp" {
                    self.settings.volume_step
                } else {
                    -self.settings.volume_step
                };
                self.drag_volume(volume + delta);
            }
            "m" => self.press_mute(),
            "f" => self.press_fullscreen(),
            _ => return false,
        }
        true
    }

    // State updates from the player

    pub fn update_play_button(&self, playing: bool) {
        self.view.lock().playing = playing;
        if !playing {
            self.pointer_activity(Instant::now());
        }
    }

    pub fn update_progress(&self, current_time: f64, duration: f64) {
        let mut view = self.view.lock();
        view.current_time = current_time;
        view.duration = duration;
        view.progress = if duration > 0.0 {
            (current_time / duration).clamp(0.0, 1.0)
        } else {
            0.0
        };
        view.time_label = format!("{} / {}", format_time(current_time), format_time(duration));
    }

    pub fn update_volume(&self, volume: f64, muted: bool) {
        let mut view = self.view.lock();
        view.volume = volume;
        view.muted = muted;
    }

    pub fn show_buffering(&self, buffering: bool) {
        self.view.lock().buffering = buffering;
    }

    /// Populate the quality menu
    pub fn set_qualities(&self, levels: &[QualityLevel]) {
        self.view.lock().qualities = levels.iter().map(|l| l.name.clone()).collect();
    }

    pub fn update_quality(&self, quality: &str) {
        self.view.lock().quality = quality.to_string();
    }

    pub fn update_speed(&self, rate: f64) {
        self.view.lock().speed = rate;
    }

    // Auto-hide

    /// Pointer or keyboard activity shows the controls immediately
    pub fn pointer_activity(&self, now: Instant) {
        *self.last_activity.lock() = now;
        self.view.lock().visible = true;
    }

    /// Hide the controls once idle long enough while playing.
    /// Returns true if visibility changed.
    pub fn tick(&self, now: Instant) -> bool {
        if !self.settings.auto_hide {
            return false;
        }
        let idle = now.saturating_duration_since(*self.last_activity.lock());
        let mut view = self.view.lock();
        if view.visible
            && view.playing
            && idle >= Duration::from_millis(self.settings.auto_hide_delay_ms)
        {
            view.visible = false;
            return true;
        }
        false
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// Unmount every node and drop every intent listener
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.container.clear();
        self.intents.clear();
        debug!(container = self.container.id(), "Control surface destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::headless::HeadlessContainer;
    use serde_json::json;

    fn controller(overrides: serde_json::Value) -> (Arc<HeadlessContainer>, UiController) {
        let mut user = json!({ "videoUrl": "clip.mp4" });
        if let (Some(base), Some(extra)) = (user.as_object_mut(), overrides.as_object()) {
            base.extend(extra.clone());
        }
        let config = crate::config::create_config(user).unwrap();
        let container = Arc::new(HeadlessContainer::new("player"));
        let ui = UiController::new(Arc::clone(&container) as Arc<dyn Container>, &config);
        (container, ui)
    }

    fn record(ui: &UiController) -> Arc<Mutex<Vec<UiIntent>>> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let l = Arc::clone(&log);
        ui.intents().on(move |i| l.lock().push(i.clone()));
        log
    }

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(0.0), "0:00");
        assert_eq!(format_time(65.9), "1:05");
        assert_eq!(format_time(3725.0), "1:02:05");
        assert_eq!(format_time(f64::NAN), "0:00");
    }

    #[test]
    fn test_feature_flags_gate_controls() {
        let (container, ui) = controller(json!({ "features": { "pip": false, "speed": false } }));

        assert!(!ui.surface().has(Control::PictureInPicture));
        assert!(!ui.surface().has(Control::Speed));
        assert!(ui.surface().has(Control::Quality));
        assert!(container.nodes().contains(&"playkit-play".to_string()));
        assert!(!container.nodes().contains(&"playkit-pip".to_string()));
    }

    #[test]
    fn test_gated_gestures_are_ignored() {
        let (_, ui) = controller(json!({ "features": { "pip": false, "volume": false } }));
        let log = record(&ui);

        ui.press_pip();
        ui.drag_volume(0.3);
        ui.press_mute();
        ui.press_play();

        assert_eq!(*log.lock(), vec![UiIntent::Play]);
    }

    #[test]
    fn test_scrub_and_menus() {
        let (_, ui) = controller(json!({}));
        let log = record(&ui);
        ui.update_progress(10.0, 200.0);
        ui.set_qualities(&[QualityLevel::auto()]);

        ui.scrub_to(0.25);
        ui.choose_speed(3.0);
        ui.choose_speed(1.5);
        ui.choose_quality("1080p");
        ui.choose_quality("auto");

        assert_eq!(
            *log.lock(),
            vec![
                UiIntent::Seek { time: 50.0 },
                UiIntent::Speed { rate: 1.5 },
                UiIntent::Quality { quality: "auto".into() },
            ]
        );
    }

    #[test]
    fn test_keyboard_shortcuts() {
        let (_, ui) = controller(json!({}));
        let log = record(&ui);
        ui.update_progress(3.0, 100.0);
        ui.update_volume(0.95, false);

        assert!(ui.handle_key(" "));
        assert!(ui.handle_key("ArrowLeft"));
        assert!(ui.handle_key("ArrowUp"));
        assert!(!ui.handle_key("z"));

        assert_eq!(
            *log.lock(),
            vec![
                UiIntent::Play,
                UiIntent::Seek { time: 0.0 },
                UiIntent::Volume { volume: 1.0 },
            ]
        );
    }

    #[test]
    fn test_keyboard_seek_needs_progress_bar() {
        let (_, ui) = controller(json!({ "features": { "progress": false } }));
        let log = record(&ui);
        ui.update_progress(30.0, 100.0);

        assert!(ui.handle_key("ArrowRight"));
        assert!(ui.handle_key("k"));

        assert_eq!(*log.lock(), vec![UiIntent::Play]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_hide_only_while_playing() {
        let (_, ui) = controller(json!({ "ui": { "autoHideDelayMs": 1000 } }));
        let start = Instant::now();

        assert!(!ui.tick(start + Duration::from_secs(5)));
        assert!(ui.view().visible);

        ui.update_play_button(true);
        ui.pointer_activity(start);
        assert!(!ui.tick(start + Duration::from_millis(500)));
        assert!(ui.tick(start + Duration::from_millis(1500)));
        assert!(!ui.view().visible);

        ui.update_play_button(false);
        assert!(ui.view().visible);
    }

    #[test]
    fn test_destroy_clears_container_and_listeners() {
        let (container, ui) = controller(json!({}));
        let _log = record(&ui);

        ui.destroy();
        ui.destroy();

        assert!(container.is_empty());
        assert_eq!(ui.intents().listener_count(), 0);
    }
}
