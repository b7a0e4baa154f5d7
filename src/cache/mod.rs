//! On-disk JSON cache, scoped per identity.
//!
//! Layout: `{root}/user/{user_id}/{kind}_{digest}.json`. Every entry carries
//! its write time and owning library id. Reads treat anything unreadable,
//! unparseable, expired, or owned by another library as a miss. Writes are
//! best effort: a failed write is logged and the pipeline carries on, since
//! the cache only ever short-circuits work that can be redone.

pub mod fingerprint;

use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::models::Identity;

pub use fingerprint::Fingerprint;

/// Envelope wrapping every cached payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEnvelope<T> {
    #[serde(flatten)]
    pub payload: T,
    pub cached_at: DateTime<Utc>,
    pub library_id: String,
}

/// File-backed cache store.
#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
    ttl: Duration,
    enabled: bool,
}

impl CacheStore {
    pub fn new(root: PathBuf, ttl_hours: u64, enabled: bool) -> Self {
        Self {
            root,
            ttl: Duration::hours(ttl_hours as i64),
            enabled,
        }
    }

    /// Read a fresh entry, or `None` on any kind of miss.
    pub async fn get<T: DeserializeOwned>(
        &self,
        identity: &Identity,
        fingerprint: &Fingerprint,
    ) -> Option<CacheEnvelope<T>> {
        if !self.enabled {
            return None;
        }
        let path = self.entry_path(identity, fingerprint);
        let bytes = tokio::fs::read(&path).await.ok()?;
        let envelope: CacheEnvelope<T> = match serde_json::from_slice(&bytes) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "discarding unreadable cache entry");
                return None;
            }
        };
        if envelope.library_id != identity.library_id() {
            tracing::warn!(
                path = %path.display(),
                "cache entry belongs to another library, treating as miss"
            );
            return None;
        }
        if Utc::now().signed_duration_since(envelope.cached_at) > self.ttl {
            tracing::debug!(path = %path.display(), "cache entry expired");
            return None;
        }
        Some(envelope)
    }

    /// Write an entry. Errors are logged, never propagated.
    pub async fn put<T: Serialize>(
        &self,
        identity: &Identity,
        fingerprint: &Fingerprint,
        payload: T,
    ) {
        if !self.enabled {
            return;
        }
        let envelope = CacheEnvelope {
            payload,
            cached_at: Utc::now(),
            library_id: identity.library_id().to_string(),
        };
        let dir = self.identity_dir(identity);
        if let Err(e) = tokio::fs::create_dir_all(&dir).await {
            tracing::warn!(dir = %dir.display(), error = %e, "failed to create cache directory");
            return;
        }
        let path = dir.join(fingerprint.file_name());
        let bytes = match serde_json::to_vec_pretty(&envelope) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize cache entry");
                return;
            }
        };
        if let Err(e) = tokio::fs::write(&path, bytes).await {
            tracing::warn!(path = %path.display(), error = %e, "failed to write cache entry");
        } else {
            tracing::debug!(path = %path.display(), "cache entry written");
        }
    }

    /// Remove an entry. Returns whether a file was actually removed.
    pub async fn invalidate(&self, identity: &Identity, fingerprint: &Fingerprint) -> bool {
        let path = self.entry_path(identity, fingerprint);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::info!(path = %path.display(), "cache entry removed");
                true
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to remove cache entry");
                false
            }
        }
    }

    fn identity_dir(&self, identity: &Identity) -> PathBuf {
        self.root.join("user").join(identity.user_id())
    }

    fn entry_path(&self, identity: &Identity, fingerprint: &Fingerprint) -> PathBuf {
        self.identity_dir(identity).join(fingerprint.file_name())
    }
}
