//! CLI command implementations

use crate::output::{print_event, print_telemetry, to_json, OutputFormat};
use playkit_core::platform::headless::{HeadlessOptions, HeadlessPlatform};
use playkit_core::platform::Platform;
use playkit_core::{
    create_config, detect_media_type, Error, MediaType, PlayerConfig, PlayerEvent, PlayerPhase,
    PlayerRegistry,
};
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Container id used for simulated sessions
const CONTAINER: &str = "playkit";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConfigSummary {
    valid: bool,
    video_url: String,
    media_type: MediaType,
    autoplay: bool,
    muted: bool,
    looped: bool,
    tracking_endpoint: Option<String>,
    ad_rolls: Vec<&'static str>,
    next_video: Option<String>,
}

impl ConfigSummary {
    fn new(config: &PlayerConfig) -> anyhow::Result<Self> {
        let explicit = config.media_type.as_deref().map(str::parse::<MediaType>).transpose()?;
        let priority = config.priority.as_deref().map(str::parse::<MediaType>).transpose()?;
        let rolls = &config.ad_rolls;
        let ad_rolls = [
            ("pre_roll", rolls.pre_roll.is_active()),
            ("pause_roll", rolls.pause_roll.is_active()),
            ("post_roll", rolls.post_roll.is_active()),
        ]
        .into_iter()
        .filter_map(|(name, active)| active.then_some(name))
        .collect();

        Ok(Self {
            valid: true,
            video_url: config.video_url.clone(),
            media_type: detect_media_type(&config.video_url, explicit, priority),
            autoplay: config.autoplay,
            muted: config.muted,
            looped: config.loop_playback,
            tracking_endpoint: config
                .event_tracking
                .enabled
                .then(|| config.event_tracking.endpoint.clone())
                .flatten(),
            ad_rolls,
            next_video: config.next_video.url.clone(),
        })
    }
}

fn read_config(path: &Path) -> anyhow::Result<Value> {
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

/// Validate a configuration file
pub fn validate(path: &Path, format: &str) -> anyhow::Result<()> {
    let format = OutputFormat::from(format);
    let user = read_config(path)?;

    let config = match create_config(user) {
        Ok(config) => config,
        Err(Error::Validation(violations)) => {
            match format {
                OutputFormat::Json => {
                    let report = serde_json::json!({ "valid": false, "violations": violations });
                    println!("{}", to_json(&report));
                }
                OutputFormat::Text => {
                    println!("Invalid configuration: {}", path.display());
                    for violation in &violations {
                        println!("  - {violation}");
                    }
                }
            }
            std::process::exit(1);
        }
        Err(e) => return Err(e.into()),
    };

    let summary = ConfigSummary::new(&config)?;
    match format {
        OutputFormat::Json => println!("{}", to_json(&summary)),
        OutputFormat::Text => {
            println!("Valid configuration: {}", path.display());
            println!("  Media: {} ({})", summary.video_url, summary.media_type);
            println!("  Autoplay: {} (muted: {})", summary.autoplay, summary.muted);
            println!("  Loop: {}", summary.looped);
            if let Some(endpoint) = &summary.tracking_endpoint {
                println!("  Analytics endpoint: {endpoint}");
            }
            if !summary.ad_rolls.is_empty() {
                println!("  Ad rolls: {}", summary.ad_rolls.join(", "));
            }
            if let Some(next) = &summary.next_video {
                println!("  Next video: {next}");
            }
        }
    }
    Ok(())
}

/// Print the backend that would play `url`
pub fn detect(
    url: &str,
    media_type: Option<&str>,
    priority: Option<&str>,
    format: &str,
) -> anyhow::Result<()> {
    let explicit = media_type.map(str::parse::<MediaType>).transpose()?;
    let priority = priority.map(str::parse::<MediaType>).transpose()?;
    let detected = detect_media_type(url, explicit, priority);

    match OutputFormat::from(format) {
        OutputFormat::Json => {
            let report = serde_json::json!({
                "url": url,
                "mediaType": detected,
                "adaptive": detected.is_adaptive(),
            });
            println!("{}", to_json(&report));
        }
        OutputFormat::Text => println!("{url}: {detected}"),
    }
    Ok(())
}

/// Run a simulated session on the headless platform
///
/// The media clock advances by `step` seconds per iteration until the
/// session ends, fails or `max_duration` simulated seconds have passed.
pub async fn play(
    path: &Path,
    media_duration: f64,
    max_duration: f64,
    step: f64,
    format: &str,
) -> anyhow::Result<()> {
    if step <= 0.0 || !step.is_finite() {
        anyhow::bail!("step must be positive, got {step}");
    }
    let format = OutputFormat::from(format);
    let user = read_config(path)?;

    let platform = Arc::new(HeadlessPlatform::new(HeadlessOptions {
        media_duration,
        ..Default::default()
    }));
    platform.add_container(CONTAINER);
    let registry = PlayerRegistry::new(Arc::clone(&platform) as Arc<dyn Platform>);
    let player = registry.insert(CONTAINER, user)?;

    let (tx, mut rx) = mpsc::unbounded_channel::<PlayerEvent>();
    player.events().on(move |event| {
        let _ = tx.send(event.clone());
    });

    info!(player_id = %player.id(), url = %player.config().video_url, "Starting session");
    let init = {
        let player = Arc::clone(&player);
        tokio::spawn(async move { player.initialize().await })
    };

    let mut elapsed = 0.0;
    let mut play_requested = false;
    loop {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        while let Ok(event) = rx.try_recv() {
            if !matches!(event, PlayerEvent::TimeUpdate { .. }) {
                print_event(&event, elapsed, format);
            }
        }

        if !play_requested && init.is_finished() && player.phase() == PlayerPhase::Ready {
            play_requested = true;
            let player = Arc::clone(&player);
            tokio::spawn(async move {
                if let Err(e) = player.play().await {
                    warn!(error = %e, "Play request rejected");
                }
            });
            continue;
        }

        let finished = match player.phase() {
            PlayerPhase::Error => true,
            PlayerPhase::Ended => !player.ads().is_playing(),
            _ => false,
        };
        if finished || elapsed >= max_duration {
            break;
        }

        platform.tick(step);
        elapsed += step;
    }

    let media_time = player.state().current_time;
    print_telemetry(&player.telemetry(), media_time, format);
    let failed = player.phase() == PlayerPhase::Error;
    registry.destroy_all();

    if failed {
        anyhow::bail!("session ended in the error state");
    }
    Ok(())
}
