//! In-memory denylist of revoked refresh tokens.
//!
//! Entries are keyed by the token's `jti` and remembered until the token would
//! have expired anyway, after which `purge_expired` drops them.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::auth::token::{TokenClaims, unix_now};

/// Shared set of revoked refresh token IDs.
#[derive(Debug, Clone, Default)]
pub struct RevocationList {
    /// Revoked `jti` to its `exp`.
    entries: Arc<RwLock<HashMap<String, u64>>>,
}

impl RevocationList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Revoke the token described by `claims`.
    pub async fn revoke(&self, claims: &TokenClaims) {
        let mut entries = self.entries.write().await;
        entries.insert(claims.jti.clone(), claims.exp);
        debug!("Revoked refresh token for subject: {}", claims.sub);
    }

    pub async fn is_revoked(&self, jti: &str) -> bool {
        self.entries.read().await.contains_key(jti)
    }

    /// Drop entries for tokens that have expired by `now`.
    ///
    /// Returns the number of entries removed.
    pub async fn purge_expired(&self, now: u64) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, exp| *exp > now);
        before - entries.len()
    }

    /// Purge expired entries every `period` until the task is aborted.
    pub fn spawn_sweeper(&self, period: Duration) -> JoinHandle<()> {
        let list = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let removed = list.purge_expired(unix_now()).await;
                if removed > 0 {
                    debug!("Purged {} expired revocation entries", removed);
                }
            }
        })
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
