//! Backend selection
//!
//! [`detect_media_type`] is pure: explicit type, then priority, then the URL
//! extension. [`MediaSourceFactory`] maps the chosen [`MediaType`] to a
//! registered constructor, which is the only step that touches the platform.

use super::{AudioSource, MediaSource, Mp4Source};
use crate::platform::Platform;
use crate::types::MediaType;
use crate::{Error, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use url::Url;

const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "ogg", "oga", "m4a", "aac", "flac", "opus", "weba"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "m4v", "webm", "ogv", "mov", "mkv"];

/// What to play and how the embedder asked for it
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRequest {
    pub url: String,
    /// Explicit `type` from the configuration
    pub media_type: Option<String>,
    pub priority: Option<String>,
    /// Options for an adaptive engine, if one ends up being used
    pub engine_config: Value,
}

impl SourceRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            media_type: None,
            priority: None,
            engine_config: Value::Null,
        }
    }

    pub fn with_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = Some(media_type.into());
        self
    }

    pub fn with_priority(mut self, priority: impl Into<String>) -> Self {
        self.priority = Some(priority.into());
        self
    }

    /// Resolve the backend type, rejecting unknown type strings
    pub fn resolve_type(&self) -> Result<MediaType> {
        let explicit = self.media_type.as_deref().map(str::parse::<MediaType>).transpose()?;
        let priority = self.priority.as_deref().map(str::parse::<MediaType>).transpose()?;
        Ok(detect_media_type(&self.url, explicit, priority))
    }
}

/// Pick a backend for `url`
pub fn detect_media_type(
    url: &str,
    explicit: Option<MediaType>,
    priority: Option<MediaType>,
) -> MediaType {
    if let Some(media_type) = explicit.or(priority) {
        return media_type;
    }

    let path = url_path(url).to_ascii_lowercase();
    let extension = path
        .rsplit('/')
        .next()
        .and_then(|segment| segment.rsplit_once('.'))
        .map(|(_, ext)| ext)
        .unwrap_or_default();

    match extension {
        "m3u8" => MediaType::Hls,
        "mpd" => MediaType::Dash,
        ext if AUDIO_EXTENSIONS.contains(&ext) => MediaType::Audio,
        ext if VIDEO_EXTENSIONS.contains(&ext) => MediaType::Video,
        _ => MediaType::Video,
    }
}

/// Path component without query or fragment
fn url_path(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_string(),
    }
}

type Constructor = Box<dyn Fn(&SourceRequest) -> Arc<dyn MediaSource> + Send + Sync>;

/// Registry of backend constructors keyed by media type
pub struct MediaSourceFactory {
    constructors: HashMap<MediaType, Constructor>,
}

impl MediaSourceFactory {
    /// An empty factory
    pub fn new() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Every built-in backend, bound to `platform`
    pub fn with_defaults(platform: Arc<dyn Platform>) -> Self {
        let mut factory = Self::new();

        let p = Arc::clone(&platform);
        factory.register(MediaType::Video, move |req| {
            Arc::new(Mp4Source::new(&req.url, p.as_ref())) as Arc<dyn MediaSource>
        });
        let p = Arc::clone(&platform);
        factory.register(MediaType::Audio, move |req| {
            Arc::new(AudioSource::new(&req.url, p.as_ref())) as Arc<dyn MediaSource>
        });
        #[cfg(feature = "hls")]
        {
            let p = Arc::clone(&platform);
            factory.register(MediaType::Hls, move |req| {
                Arc::new(super::HlsSource::new(&req.url, p.as_ref(), req.engine_config.clone()))
                    as Arc<dyn MediaSource>
            });
        }
        #[cfg(feature = "dash")]
        {
            let p = Arc::clone(&platform);
            factory.register(MediaType::Dash, move |req| {
                Arc::new(super::DashSource::new(&req.url, p.as_ref(), req.engine_config.clone()))
                    as Arc<dyn MediaSource>
            });
        }

        factory
    }

    /// Install or replace the constructor for `media_type`
    pub fn register<F>(&mut self, media_type: MediaType, constructor: F)
    where
        F: Fn(&SourceRequest) -> Arc<dyn MediaSource> + Send + Sync + 'static,
    {
        self.constructors.insert(media_type, Box::new(constructor));
    }

    /// Remove a backend. Returns true if one was registered.
    pub fn unregister(&mut self, media_type: MediaType) -> bool {
        self.constructors.remove(&media_type).is_some()
    }

    pub fn supports(&self, media_type: MediaType) -> bool {
        self.constructors.contains_key(&media_type)
    }

    pub fn create(&self, request: &SourceRequest) -> Result<Arc<dyn MediaSource>> {
        let media_type = request.resolve_type()?;
        let constructor = self.constructors.get(&media_type).ok_or_else(|| {
            Error::UnsupportedMediaType(format!("no backend registered for {media_type}"))
        })?;
        debug!(url = %request.url, media_type = %media_type, "Creating media source");
        Ok(constructor(request))
    }
}

impl Default for MediaSourceFactory {
    fn default() -> Self {
        Self::new()
    }
}
