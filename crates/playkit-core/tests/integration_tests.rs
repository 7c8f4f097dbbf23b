//! End-to-end tests driving players on the headless platform

use parking_lot::Mutex;
use playkit_core::analytics::VIEWED_THRESHOLD_REACHED;
use playkit_core::config::{create_config, deep_merge, default_config_value};
use playkit_core::platform::headless::{HeadlessOptions, HeadlessPlatform};
use playkit_core::platform::{Container, Platform};
use playkit_core::{
    detect_media_type, Error, MediaType, PlayerEvent, PlayerInstance, PlayerPhase, PlayerRegistry,
};
use serde_json::{json, Value};
use std::sync::Arc;

struct Page {
    platform: Arc<HeadlessPlatform>,
    registry: PlayerRegistry,
}

impl Page {
    fn new(options: HeadlessOptions) -> Self {
        let platform = Arc::new(HeadlessPlatform::new(options));
        platform.add_container("player");
        let registry = PlayerRegistry::new(Arc::clone(&platform) as Arc<dyn Platform>);
        Self { platform, registry }
    }

    /// Register a player, record its lifecycle events, then initialize it
    async fn player(&self, config: Value) -> (Arc<PlayerInstance>, Arc<Mutex<Vec<String>>>) {
        let player = self.registry.insert("player", config).unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));
        let l = Arc::clone(&log);
        player.events().on(move |e| {
            if !matches!(e, PlayerEvent::TimeUpdate { .. } | PlayerEvent::PhaseChanged { .. }) {
                l.lock().push(e.name().to_string());
            }
        });
        let _ = player.initialize().await;
        (player, log)
    }
}

async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn test_embed_play_destroy() {
    let page = Page::new(HeadlessOptions::default());
    let (player, log) = page
        .player(json!({ "videoUrl": "clip.mp4", "autoplay": false }))
        .await;

    assert_eq!(player.phase(), PlayerPhase::Ready);
    assert!(!player.state().playing);
    assert!(!page.platform.headless_container("player").unwrap().is_empty());

    player.play().await.unwrap();
    assert_eq!(player.phase(), PlayerPhase::Playing);
    assert_eq!(*log.lock(), vec!["player:ready", "player:play"]);

    page.registry.destroy(player.id());
    assert!(page.platform.headless_container("player").unwrap().is_empty());
    assert_eq!(player.events().listener_count(), 0);
    assert!(page.registry.is_empty());
}

#[tokio::test]
async fn test_autoplay_starts_playback() {
    let page = Page::new(HeadlessOptions::default());
    let (player, log) = page
        .player(json!({ "videoUrl": "clip.mp4", "autoplay": true, "muted": true }))
        .await;

    assert_eq!(player.phase(), PlayerPhase::Playing);
    assert!(player.state().muted);
    assert_eq!(*log.lock(), vec!["player:ready", "player:play"]);
}

#[tokio::test]
async fn test_volume_and_mute_reach_the_element() {
    let page = Page::new(HeadlessOptions::default());
    let (player, _) = page.player(json!({ "videoUrl": "clip.mp4" })).await;
    let element = page.platform.last_element().unwrap();

    player.set_volume(0.4).unwrap();
    assert_eq!(element.volume(), 0.4);
    assert_eq!(player.ui().view().volume, 0.4);

    player.toggle_mute().unwrap();
    assert!(element.muted());
    assert!(player.state().muted);

    player.set_volume(2.0).unwrap();
    assert_eq!(player.state().volume, 1.0);
}

#[tokio::test]
async fn test_viewed_threshold_fires_once() {
    let page = Page::new(HeadlessOptions {
        media_duration: 100.0,
        ..Default::default()
    });
    let (player, _) = page
        .player(json!({
            "videoUrl": "clip.mp4",
            "eventTracking": {
                "enabled": true,
                "endpoint": "http://127.0.0.1:9/collect",
                "viewedThreshold": 0.3
            }
        }))
        .await;
    player.play().await.unwrap();

    for _ in 0..8 {
        page.platform.tick(10.0);
    }

    let viewed = player
        .analytics()
        .queued()
        .into_iter()
        .filter(|e| e.event_type == VIEWED_THRESHOLD_REACHED)
        .count();
    assert_eq!(viewed, 1);
    assert!(player.telemetry().max_progress >= 0.8);
}

#[tokio::test]
async fn test_next_video_loads_and_autoplays() {
    let page = Page::new(HeadlessOptions {
        media_duration: 10.0,
        ..Default::default()
    });
    let (player, log) = page
        .player(json!({
            "videoUrl": "first.mp4",
            "nextVideo": { "url": "second.mp4", "autoplay": true }
        }))
        .await;
    player.play().await.unwrap();

    page.platform.tick(11.0);
    settle().await;

    assert_eq!(player.url(), "second.mp4");
    assert_eq!(player.phase(), PlayerPhase::Playing);
    let log = log.lock();
    let ended = log.iter().position(|e| e == "player:ended").unwrap();
    let changed = log.iter().position(|e| e == "player:source_changed").unwrap();
    assert!(ended < changed);
}

#[tokio::test]
async fn test_next_video_respects_its_own_autoplay() {
    let page = Page::new(HeadlessOptions {
        media_duration: 10.0,
        ..Default::default()
    });
    let (player, _) = page
        .player(json!({
            "videoUrl": "first.mp4",
            "autoplay": true,
            "nextVideo": { "url": "second.mp4", "autoplay": false }
        }))
        .await;
    assert_eq!(player.phase(), PlayerPhase::Playing);

    page.platform.tick(11.0);
    settle().await;

    assert_eq!(player.url(), "second.mp4");
    assert_eq!(player.phase(), PlayerPhase::Ready);
    assert!(!player.state().playing);
}

#[tokio::test]
async fn test_pre_roll_before_first_play() {
    let page = Page::new(HeadlessOptions {
        media_duration: 5.0,
        ..Default::default()
    });
    let (player, log) = page
        .player(json!({
            "videoUrl": "clip.mp4",
            "adRolls": { "preRoll": { "enabled": true, "url": "ad.mp4" } }
        }))
        .await;

    let task = {
        let player = Arc::clone(&player);
        tokio::spawn(async move { player.play().await })
    };
    settle().await;
    assert!(player.ads().is_playing());
    assert!(!player.state().playing);

    page.platform.last_element().unwrap().advance(6.0);
    task.await.unwrap().unwrap();

    assert!(!player.ads().is_playing());
    assert!(player.state().playing);
    assert_eq!(
        *log.lock(),
        vec!["player:ready", "player:ad_start", "player:ad_end", "player:play"]
    );

    // Only the first play runs the pre-roll
    player.pause().await.unwrap();
    player.play().await.unwrap();
    assert_eq!(log.lock().iter().filter(|e| *e == "player:ad_start").count(), 1);
}

#[tokio::test]
async fn test_ui_play_waits_for_autoplay_pre_roll() {
    let page = Page::new(HeadlessOptions {
        media_duration: 5.0,
        ..Default::default()
    });
    let player = page
        .registry
        .insert(
            "player",
            json!({
                "videoUrl": "clip.mp4",
                "autoplay": true,
                "adRolls": { "preRoll": { "enabled": true, "url": "ad.mp4" } }
            }),
        )
        .unwrap();
    let plays = Arc::new(Mutex::new(0));
    let p = Arc::clone(&plays);
    player.events().on(move |e| {
        if matches!(e, PlayerEvent::Play) {
            *p.lock() += 1;
        }
    });
    let init = {
        let player = Arc::clone(&player);
        tokio::spawn(async move { player.initialize().await })
    };
    settle().await;
    assert!(player.ads().is_playing());

    player.ui().press_play();
    settle().await;

    let content = page.platform.elements()[0].clone();
    assert!(content.is_paused());
    assert!(!player.state().playing);
    assert!(player.ads().is_playing());

    page.platform.last_element().unwrap().advance(6.0);
    init.await.unwrap().unwrap();
    settle().await;

    assert_eq!(player.phase(), PlayerPhase::Playing);
    assert!(!content.is_paused());
    assert_eq!(*plays.lock(), 1);
}

#[tokio::test]
async fn test_failing_pre_roll_falls_through_to_content() {
    let page = Page::new(HeadlessOptions {
        failing_urls: vec!["ad.mp4".into()],
        ..Default::default()
    });
    let (player, log) = page
        .player(json!({
            "videoUrl": "clip.mp4",
            "adRolls": { "preRoll": { "enabled": true, "url": "ad.mp4" } }
        }))
        .await;
    let phases = Arc::new(Mutex::new(Vec::new()));
    let fatal = Arc::new(Mutex::new(Vec::new()));
    {
        let phases = Arc::clone(&phases);
        let fatal = Arc::clone(&fatal);
        player.events().on(move |e| match e {
            PlayerEvent::PhaseChanged { to, .. } => phases.lock().push(*to),
            PlayerEvent::Error { fatal: f, .. } => fatal.lock().push(*f),
            _ => {}
        });
    }

    player.play().await.unwrap();

    assert_eq!(player.phase(), PlayerPhase::Playing);
    assert!(!player.ads().is_playing());
    assert_eq!(
        *log.lock(),
        vec![
            "player:ready",
            "player:ad_start",
            "player:error",
            "player:ad_end",
            "player:play"
        ]
    );
    assert_eq!(*fatal.lock(), vec![false]);
    assert!(!phases.lock().contains(&PlayerPhase::Error));
}

#[tokio::test]
async fn test_hls_qualities_through_the_player() {
    let page = Page::new(HeadlessOptions::default());
    let (player, _) = page
        .player(json!({ "videoUrl": "https://cdn.example.com/live/master.m3u8" }))
        .await;

    assert_eq!(player.phase(), PlayerPhase::Ready);
    let names: Vec<String> = player.qualities().into_iter().map(|q| q.name).collect();
    assert_eq!(names, vec!["auto", "360p", "720p", "1080p"]);
    assert!(page.platform.last_engine().is_some());
}

#[tokio::test]
async fn test_container_in_use() {
    let page = Page::new(HeadlessOptions::default());
    page.player(json!({ "videoUrl": "a.mp4" })).await;

    let err = page
        .registry
        .insert("player", json!({ "videoUrl": "b.mp4" }))
        .err()
        .unwrap();
    assert!(matches!(err, Error::ContainerInUse(_)));
}

#[test]
fn test_media_type_detection() {
    assert_eq!(detect_media_type("https://x.io/a/index.m3u8?token=1", None, None), MediaType::Hls);
    assert_eq!(detect_media_type("https://x.io/manifest.MPD", None, None), MediaType::Dash);
    assert_eq!(detect_media_type("/podcast/episode.mp3#t=10", None, None), MediaType::Audio);
    assert_eq!(detect_media_type("https://x.io/watch", None, None), MediaType::Video);
    assert_eq!(
        detect_media_type("https://x.io/a.m3u8", Some(MediaType::Video), None),
        MediaType::Video
    );
}

#[test]
fn test_config_merge_keeps_defaults() {
    let config = create_config(json!({
        "videoUrl": "clip.mp4",
        "features": { "pip": false },
        "speed": { "default": 1.5 }
    }))
    .unwrap();

    assert!(!config.features.pip);
    assert!(config.features.fullscreen);
    assert_eq!(config.speed.default, 1.5);
    assert_eq!(config.speed.options.len(), 6);

    let merged = deep_merge(&default_config_value(), &json!({ "volume": null }));
    assert_eq!(merged["volume"], json!(1.0));
}
