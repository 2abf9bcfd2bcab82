//! Read-through lookup across the two tiers.
//!
//! The local tier is consulted first and a hit returns immediately. On a
//! local miss the remote tier (when enabled) is tried and a remote hit is
//! copied into the local tier so the next lookup stays local. Misses are
//! never remembered.

use super::{CacheKey, CachedArtifact, LocalTier, RemoteTier};
use crate::observability::AppObservability;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct CacheResolver {
    local: LocalTier,
    remote: Option<RemoteTier>,
    observability: Option<AppObservability>,
}

impl CacheResolver {
    pub fn new(local: LocalTier, remote: Option<RemoteTier>) -> Self {
        Self {
            local,
            remote,
            observability: None,
        }
    }

    pub fn with_observability(mut self, observability: AppObservability) -> Self {
        self.observability = Some(observability);
        self
    }

    fn record(&self, tier: &'static str, hit: bool) {
        if let Some(observability) = &self.observability {
            observability.record_cache_lookup(tier, hit);
        }
    }

    /// Look up `key`; read failures count as misses.
    pub async fn resolve(&self, key: &CacheKey) -> Option<CachedArtifact> {
        debug!("Get local cached image {}", key);
        match self.local.read(key).await {
            Ok(Some(artifact)) => {
                self.record("local", true);
                return Some(artifact);
            }
            Ok(None) => self.record("local", false),
            Err(e) => {
                self.record("local", false);
                warn!("Local cache read failed for {}: {}", key, e);
            }
        }

        let remote = self.remote.as_ref()?;
        debug!("Get remote cached image {}", remote.object_key(key));
        let artifact = match remote.fetch(key).await {
            Ok(Some(artifact)) => artifact,
            Ok(None) => {
                self.record("remote", false);
                return None;
            }
            Err(e) => {
                self.record("remote", false);
                warn!("Remote cache read failed for {}: {}", key, e);
                return None;
            }
        };
        self.record("remote", true);

        match self.local.write(key, &artifact.content).await {
            Ok(true) => debug!("Copied remote cached image {} to local tier", key),
            Ok(false) => debug!("Local cached image {} appeared concurrently", key),
            Err(e) => warn!("Failed to copy {} into local tier: {}", key, e),
        }

        Some(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ArtifactSource;
    use crate::storage::MemoryObjectStore;
    use bytes::Bytes;
    use std::sync::Arc;
    use std::time::{Duration, SystemTime};

    async fn setup(remote_enabled: bool) -> (tempfile::TempDir, Arc<MemoryObjectStore>, CacheResolver) {
        let dir = tempfile::tempdir().unwrap();
        let local = LocalTier::open(dir.path()).await.unwrap();
        let store = Arc::new(MemoryObjectStore::new());
        let remote = remote_enabled.then(|| RemoteTier::new(store.clone(), "resized"));
        (dir, store, CacheResolver::new(local, remote))
    }

    #[tokio::test]
    async fn test_local_hit_never_calls_remote() {
        let (dir, store, resolver) = setup(true).await;
        let key = CacheKey::new("custom-w100", "/cat.jpg");
        LocalTier::open(dir.path())
            .await
            .unwrap()
            .write(&key, &Bytes::from_static(b"local"))
            .await
            .unwrap();

        let artifact = resolver.resolve(&key).await.unwrap();
        assert_eq!(artifact.source, ArtifactSource::Local);
        assert_eq!(artifact.content, Bytes::from_static(b"local"));
        assert_eq!(store.calls().total(), 0);
    }

    #[tokio::test]
    async fn test_remote_hit_populates_local_tier() {
        let (dir, store, resolver) = setup(true).await;
        let key = CacheKey::new("custom-w100", "/cat.jpg");
        let modified = SystemTime::now() - Duration::from_secs(600);
        store.insert("resized/custom-w100/cat.jpg", Bytes::from_static(b"remote"), modified);

        let artifact = resolver.resolve(&key).await.unwrap();
        assert_eq!(artifact.source, ArtifactSource::Remote);
        assert_eq!(artifact.last_modified, modified);
        assert_eq!(
            std::fs::read(dir.path().join("custom-w100/cat.jpg")).unwrap(),
            b"remote"
        );

        let again = resolver.resolve(&key).await.unwrap();
        assert_eq!(again.source, ArtifactSource::Local);
        assert_eq!(store.calls().gets, 1);
    }

    #[tokio::test]
    async fn test_double_miss_is_not_remembered() {
        let (_dir, store, resolver) = setup(true).await;
        let key = CacheKey::new("custom-w100", "/cat.jpg");

        assert!(resolver.resolve(&key).await.is_none());
        assert!(resolver.resolve(&key).await.is_none());
        assert_eq!(store.calls().gets, 2);
    }

    #[tokio::test]
    async fn test_disabled_remote_tier_is_never_consulted() {
        let (_dir, store, resolver) = setup(false).await;
        store.insert("resized/custom-w100/cat.jpg", Bytes::from_static(b"remote"), SystemTime::now());

        assert!(
            resolver
                .resolve(&CacheKey::new("custom-w100", "/cat.jpg"))
                .await
                .is_none()
        );
        assert_eq!(store.calls().total(), 0);
    }
}
