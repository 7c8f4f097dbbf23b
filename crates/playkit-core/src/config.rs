//! Embed configuration
//!
//! The host page passes a JSON option tree. [`create_config`] deep-merges it
//! over [`PlayerConfig::default`], deserializes the result and validates it,
//! reporting every violation at once.
//!
//! ```rust
//! use playkit_core::config::create_config;
//!
//! let config = create_config(serde_json::json!({
//!     "videoUrl": "https://cdn.example.com/clip.mp4",
//!     "ui": { "autoHideDelayMs": 1500 }
//! })).unwrap();
//!
//! assert_eq!(config.ui.auto_hide_delay_ms, 1500);
//! assert!(config.ui.auto_hide);
//! ```

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use tracing::debug;

/// Number of analytics events sent per flush
pub const ANALYTICS_BATCH_SIZE: usize = 10;

/// Resolved, immutable player configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlayerConfig {
    /// Media URL (required)
    pub video_url: String,
    /// Explicit backend type ("video", "audio", "hls", "dash")
    #[serde(rename = "type")]
    pub media_type: Option<String>,
    /// Preferred backend when no explicit type is given
    pub priority: Option<String>,
    /// Content identifier reported to analytics
    pub video_id: Option<String>,
    /// Poster image URL
    pub poster: Option<String>,
    pub autoplay: bool,
    pub muted: bool,
    /// Initial volume in [0, 1]
    pub volume: f64,
    #[serde(rename = "loop")]
    pub loop_playback: bool,
    pub features: FeaturesConfig,
    pub theme: ThemeConfig,
    /// Options handed to the HLS engine untouched
    pub hls_config: Value,
    /// Options handed to the DASH engine untouched
    pub dash_config: Value,
    pub event_tracking: EventTrackingConfig,
    pub ad_rolls: AdRollsConfig,
    pub ui: UiConfig,
    pub quality: QualityConfig,
    pub speed: SpeedConfig,
    pub subtitles: SubtitlesConfig,
    pub next_video: NextVideoConfig,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            video_url: String::new(),
            media_type: None,
            priority: None,
            video_id: None,
            poster: None,
            autoplay: false,
            muted: false,
            volume: 1.0,
            loop_playback: false,
            features: FeaturesConfig::default(),
            theme: ThemeConfig::default(),
            hls_config: serde_json::json!({
                "enableWorker": true,
                "lowLatencyMode": false,
                "maxBufferLength": 30,
                "startLevel": -1
            }),
            dash_config: serde_json::json!({
                "streaming": { "abr": { "autoSwitchBitrate": { "video": true } } }
            }),
            event_tracking: EventTrackingConfig::default(),
            ad_rolls: AdRollsConfig::default(),
            ui: UiConfig::default(),
            quality: QualityConfig::default(),
            speed: SpeedConfig::default(),
            subtitles: SubtitlesConfig::default(),
            next_video: NextVideoConfig::default(),
        }
    }
}

/// Feature flags gating optional controls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FeaturesConfig {
    pub speed: bool,
    pub volume: bool,
    pub pip: bool,
    pub quality: bool,
    pub top_bar: bool,
    pub fullscreen: bool,
    pub progress: bool,
    pub keyboard: bool,
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            speed: true,
            volume: true,
            pip: true,
            quality: true,
            top_bar: true,
            fullscreen: true,
            progress: true,
            keyboard: true,
        }
    }
}

/// Theme colors, carried for the renderer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ThemeConfig {
    pub primary_color: String,
    pub background_color: String,
    pub text_color: String,
}

impl Default for ThemeConfig {
    fn default() -> Self {
        Self {
            primary_color: "#9b30ff".to_string(),
            background_color: "#0c0a12".to_string(),
            text_color: "#f6f2ff".to_string(),
        }
    }
}

/// Analytics reporting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventTrackingConfig {
    pub enabled: bool,
    /// Endpoint receiving `POST {events, timestamp}`
    pub endpoint: Option<String>,
    pub flush_interval_ms: u64,
    /// Progress fraction that triggers `viewed_threshold_reached`
    pub viewed_threshold: f64,
    /// Event types to report, empty for all
    pub events: Vec<String>,
    pub cdn: Option<String>,
    pub isp: Option<String>,
    pub geo: Option<String>,
    pub player_source: String,
}

impl Default for EventTrackingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: None,
            flush_interval_ms: 10_000,
            viewed_threshold: 0.5,
            events: Vec::new(),
            cdn: None,
            isp: None,
            geo: None,
            player_source: "playkit".to_string(),
        }
    }
}

/// Pre/pause/post-roll ad breaks
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AdRollsConfig {
    pub pre_roll: AdRollConfig,
    pub pause_roll: AdRollConfig,
    pub post_roll: AdRollConfig,
}

/// A single ad break
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AdRollConfig {
    pub enabled: bool,
    /// Ad media URL
    pub url: Option<String>,
    /// Seconds before the skip affordance appears
    pub skip_delay: f64,
    pub skippable: bool,
    pub click_url: Option<String>,
}

impl Default for AdRollConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: None,
            skip_delay: 5.0,
            skippable: true,
            click_url: None,
        }
    }
}

impl AdRollConfig {
    /// Enabled with a media URL
    pub fn is_active(&self) -> bool {
        self.enabled && self.url.as_deref().is_some_and(|u| !u.trim().is_empty())
    }
}

/// Control surface behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UiConfig {
    pub auto_hide: bool,
    pub auto_hide_delay_ms: u64,
    pub title: Option<String>,
    pub seek_step: f64,
    pub volume_step: f64,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            auto_hide: true,
            auto_hide_delay_ms: 3000,
            title: None,
            seek_step: 5.0,
            volume_step: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QualityConfig {
    /// Quality selected once levels are known
    pub default: String,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            default: crate::types::AUTO_QUALITY.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SpeedConfig {
    pub default: f64,
    pub options: Vec<f64>,
}

impl Default for SpeedConfig {
    fn default() -> Self {
        Self {
            default: 1.0,
            options: vec![0.5, 0.75, 1.0, 1.25, 1.5, 2.0],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubtitlesConfig {
    pub enabled: bool,
    pub default_language: Option<String>,
    pub tracks: Vec<SubtitleTrack>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubtitleTrack {
    pub src: String,
    pub label: String,
    pub language: String,
    #[serde(default)]
    pub default: bool,
}

/// Content loaded automatically when the current one ends
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NextVideoConfig {
    pub url: Option<String>,
    pub title: Option<String>,
    pub autoplay: bool,
}

impl Default for NextVideoConfig {
    fn default() -> Self {
        Self {
            url: None,
            title: None,
            autoplay: true,
        }
    }
}

impl PlayerConfig {
    /// Parse and resolve a JSON document
    pub fn from_json_str(json: &str) -> Result<Self> {
        let user: Value = serde_json::from_str(json)?;
        create_config(user)
    }

    /// Read and resolve a JSON config file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Collect every configuration violation
    pub fn validate(&self) -> Result<()> {
        let mut violations = Vec::new();

        if self.video_url.trim().is_empty() {
            violations.push("videoUrl is required".to_string());
        }
        for (field, value) in [("type", &self.media_type), ("priority", &self.priority)] {
            if let Some(value) = value {
                if value.parse::<crate::types::MediaType>().is_err() {
                    violations.push(format!("{field} '{value}' is not a known media type"));
                }
            }
        }
        if !(0.0..=1.0).contains(&self.volume) {
            violations.push(format!("volume must be within [0, 1], got {}", self.volume));
        }
        for (field, color) in [
            ("theme.primaryColor", &self.theme.primary_color),
            ("theme.backgroundColor", &self.theme.background_color),
            ("theme.textColor", &self.theme.text_color),
        ] {
            if !is_hex_color(color) {
                violations.push(format!("{field} must be a hex color, got '{color}'"));
            }
        }

        if self.speed.options.iter().any(|r| *r <= 0.0) {
            violations.push("speed.options must all be positive".to_string());
        }
        if self.speed.default <= 0.0 {
            violations.push("speed.default must be positive".to_string());
        } else if !self.speed.options.is_empty()
            && !self.speed.options.iter().any(|r| (r - self.speed.default).abs() < f64::EPSILON)
        {
            violations.push(format!(
                "speed.default {} is not one of speed.options",
                self.speed.default
            ));
        }

        let tracking = &self.event_tracking;
        if !(tracking.viewed_threshold > 0.0 && tracking.viewed_threshold <= 1.0) {
            violations.push(format!(
                "eventTracking.viewedThreshold must be within (0, 1], got {}",
                tracking.viewed_threshold
            ));
        }
        if tracking.enabled {
            match tracking.endpoint.as_deref().map(str::trim) {
                None | Some("") => violations
                    .push("eventTracking.endpoint is required when tracking is enabled".to_string()),
                Some(endpoint) => {
                    if let Err(e) = url::Url::parse(endpoint) {
                        violations.push(format!("eventTracking.endpoint '{endpoint}' is not a URL: {e}"));
                    }
                }
            }
            if tracking.flush_interval_ms == 0 {
                violations.push("eventTracking.flushIntervalMs must be positive".to_string());
            }
        }

        for (name, roll) in [
            ("preRoll", &self.ad_rolls.pre_roll),
            ("pauseRoll", &self.ad_rolls.pause_roll),
            ("postRoll", &self.ad_rolls.post_roll),
        ] {
            if roll.enabled && !roll.is_active() {
                violations.push(format!("adRolls.{name}.url is required when the roll is enabled"));
            }
            if roll.skip_delay < 0.0 {
                violations.push(format!("adRolls.{name}.skipDelay must not be negative"));
            }
        }

        if self.ui.auto_hide && self.ui.auto_hide_delay_ms == 0 {
            violations.push("ui.autoHideDelayMs must be positive when autoHide is enabled".to_string());
        }
        if let Some(url) = &self.next_video.url {
            if url.trim().is_empty() {
                violations.push("nextVideo.url must not be empty".to_string());
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(violations))
        }
    }

    /// Backend options for the given adaptive engine
    pub fn engine_config(&self, media_type: crate::types::MediaType) -> Value {
        match media_type {
            crate::types::MediaType::Hls => self.hls_config.clone(),
            crate::types::MediaType::Dash => self.dash_config.clone(),
            _ => Value::Null,
        }
    }
}

fn is_hex_color(color: &str) -> bool {
    let Some(hex) = color.strip_prefix('#') else {
        return false;
    };
    matches!(hex.len(), 3 | 4 | 6 | 8) && hex.chars().all(|c| c.is_ascii_hexdigit())
}

/// The documented defaults
pub fn default_config() -> PlayerConfig {
    PlayerConfig::default()
}

/// The documented defaults as a JSON tree
pub fn default_config_value() -> Value {
    serde_json::to_value(default_config()).unwrap_or(Value::Null)
}

/// Deep-merge `overlay` onto `base`
///
/// Objects merge key by key. Any other overlay value replaces the base
/// value, except `null`, which keeps it.
pub fn deep_merge(base: &Value, overlay: &Value) -> Value {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            let mut merged = base_map.clone();
            for (key, value) in overlay_map {
                let next = match merged.get(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value.clone(),
                };
                merged.insert(key.clone(), next);
            }
            Value::Object(merged)
        }
        (base, Value::Null) => base.clone(),
        (_, overlay) => overlay.clone(),
    }
}

/// Resolve user options into a validated configuration
pub fn create_config(user: Value) -> Result<PlayerConfig> {
    if !user.is_object() {
        return Err(Error::Validation(vec![
            "configuration must be a JSON object".to_string(),
        ]));
    }

    let merged = deep_merge(&default_config_value(), &user);
    let config: PlayerConfig = serde_json::from_value(merged)
        .map_err(|e| Error::Validation(vec![e.to_string()]))?;
    config.validate()?;

    debug!(url = %config.video_url, autoplay = config.autoplay, "Configuration resolved");
    Ok(config)
}
