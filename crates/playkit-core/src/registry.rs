//! Explicit registry of the players on a page

use crate::config::create_config;
use crate::platform::Platform;
use crate::player::PlayerInstance;
use crate::source::MediaSourceFactory;
use crate::types::InstanceId;
use crate::{Error, Result};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Maps instance ids to live players, one player per container
pub struct PlayerRegistry {
    platform: Arc<dyn Platform>,
    factory: Option<Arc<MediaSourceFactory>>,
    players: Mutex<BTreeMap<InstanceId, Arc<PlayerInstance>>>,
}

impl PlayerRegistry {
    pub fn new(platform: Arc<dyn Platform>) -> Self {
        Self {
            platform,
            factory: None,
            players: Mutex::new(BTreeMap::new()),
        }
    }

    /// Share one backend factory across every player
    pub fn with_factory(mut self, factory: Arc<MediaSourceFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Register a player without loading it, so the caller can subscribe
    /// to its events before [`PlayerInstance::initialize`]
    pub fn insert(&self, container_id: &str, user_config: Value) -> Result<Arc<PlayerInstance>> {
        let config = create_config(user_config)?;
        let mut players = self.players.lock();
        if players.values().any(|p| p.container_id() == container_id) {
            return Err(Error::ContainerInUse(container_id.to_string()));
        }

        let id = InstanceId::new();
        let platform = Arc::clone(&self.platform);
        let player = match &self.factory {
            Some(factory) => {
                PlayerInstance::with_factory(id, container_id, config, platform, Arc::clone(factory))?
            }
            None => PlayerInstance::new(id, container_id, config, platform)?,
        };
        players.insert(id, Arc::clone(&player));
        info!(player_id = %id, container = container_id, total = players.len(), "Player registered");
        Ok(player)
    }

    /// Register and initialize a player. A media load failure still returns
    /// the instance, in the `Error` phase.
    pub async fn create(&self, container_id: &str, user_config: Value) -> Result<Arc<PlayerInstance>> {
        let player = self.insert(container_id, user_config)?;
        if let Err(e) = player.initialize().await {
            debug!(player_id = %player.id(), error = %e, "Player registered in error state");
        }
        Ok(player)
    }

    pub fn get(&self, id: InstanceId) -> Option<Arc<PlayerInstance>> {
        self.players.lock().get(&id).cloned()
    }

    pub fn ids(&self) -> Vec<InstanceId> {
        self.players.lock().keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.players.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.lock().is_empty()
    }

    /// Destroy and forget one player. Returns false for unknown ids.
    pub fn destroy(&self, id: InstanceId) -> bool {
        let player = self.players.lock().remove(&id);
        match player {
            Some(player) => {
                player.destroy();
                true
            }
            None => false,
        }
    }

    pub fn destroy_all(&self) {
        let players = std::mem::take(&mut *self.players.lock());
        let count = players.len();
        for player in players.into_values() {
            player.destroy();
        }
        info!(count, "All players destroyed");
    }
}

impl Drop for PlayerRegistry {
    fn drop(&mut self) {
        for player in self.players.get_mut().values() {
            player.destroy();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::headless::HeadlessPlatform;
    use crate::platform::Container;
    use crate::types::PlayerPhase;
    use serde_json::json;

    fn registry() -> (Arc<HeadlessPlatform>, PlayerRegistry) {
        let platform = Arc::new(HeadlessPlatform::default());
        platform.add_container("a");
        platform.add_container("b");
        let registry = PlayerRegistry::new(Arc::clone(&platform) as Arc<dyn Platform>);
        (platform, registry)
    }

    #[tokio::test]
    async fn test_create_and_lookup() {
        let (_, registry) = registry();

        let a = registry.create("a", json!({ "videoUrl": "a.mp4" })).await.unwrap();
        let b = registry.create("b", json!({ "videoUrl": "b.m3u8" })).await.unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get(a.id()).unwrap().container_id(), "a");
        assert!(registry.ids().contains(&b.id()));
        assert_eq!(b.phase(), PlayerPhase::Ready);
    }

    #[tokio::test]
    async fn test_container_in_use() {
        let (_, registry) = registry();
        registry.create("a", json!({ "videoUrl": "a.mp4" })).await.unwrap();

        let err = registry
            .create("a", json!({ "videoUrl": "other.mp4" }))
            .await
            .err()
            .unwrap();

        assert!(matches!(err, Error::ContainerInUse(c) if c == "a"));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_config_and_missing_container() {
        let (_, registry) = registry();

        assert!(matches!(
            registry.create("a", json!({})).await.err(),
            Some(Error::Validation(_))
        ));
        assert!(matches!(
            registry.create("zzz", json!({ "videoUrl": "a.mp4" })).await.err(),
            Some(Error::ContainerNotFound(_))
        ));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_destroy_frees_container() {
        let (platform, registry) = registry();
        let a = registry.create("a", json!({ "videoUrl": "a.mp4" })).await.unwrap();
        registry.create("b", json!({ "videoUrl": "b.mp4" })).await.unwrap();

        assert!(registry.destroy(a.id()));
        assert!(!registry.destroy(a.id()));
        assert!(a.is_destroyed());
        assert!(platform.headless_container("a").unwrap().is_empty());

        registry.create("a", json!({ "videoUrl": "again.mp4" })).await.unwrap();
        registry.destroy_all();
        assert!(registry.is_empty());
    }
}
