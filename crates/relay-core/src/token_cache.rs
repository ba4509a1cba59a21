//! Single-slot bearer token cache.
//!
//! One instance lives for the whole process and is shared by every caller
//! that needs a ServiceNow token. The slot is guarded by an async mutex that
//! stays locked across a refresh, so concurrent callers never run two OAuth
//! exchanges at once: the second caller waits and then reuses the token the
//! first one stored.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

use crate::error::{RelayError, Result};

/// Tokens within this many seconds of expiry are treated as expired.
pub const SAFETY_BUFFER_SECS: i64 = 5 * 60;

/// Lifetime assumed when the token endpoint omits `expires_in`.
pub const DEFAULT_EXPIRES_IN_SECS: i64 = 1800;

/// Longest lifetime honoured. Larger `expires_in` values are clamped.
pub const MAX_EXPIRES_IN_SECS: i64 = 24 * 60 * 60;

/// Source of "now". Injected so expiry can be tested without sleeping.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// What an OAuth exchange hands back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedToken {
    pub access_token: String,
    /// Seconds until expiry, if the upstream reported it.
    pub expires_in: Option<i64>,
}

#[derive(Debug, Clone)]
struct Credential {
    token: String,
    expires_at: DateTime<Utc>,
}

impl Credential {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at - Duration::seconds(SAFETY_BUFFER_SECS)
    }
}

pub struct TokenCache {
    slot: Mutex<Option<Credential>>,
    clock: Clock,
}

impl Default for TokenCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TokenCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCache").finish_non_exhaustive()
    }
}

impl TokenCache {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(Utc::now))
    }

    pub fn with_clock(clock: Clock) -> Self {
        Self {
            slot: Mutex::new(None),
            clock,
        }
    }

    /// Return the cached token, or run `fetch` and cache what it returns.
    ///
    /// A failed fetch leaves the slot empty and propagates the error; stale
    /// tokens are never handed out.
    pub async fn get_token<F, Fut>(&self, fetch: F) -> Result<String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<FetchedToken>>,
    {
        let mut slot = self.slot.lock().await;
        if let Some(cred) = slot.as_ref() {
            if cred.is_fresh((self.clock)()) {
                return Ok(cred.token.clone());
            }
        }

        *slot = None;
        let fetched = fetch().await?;
        let lifetime = fetched
            .expires_in
            .unwrap_or(DEFAULT_EXPIRES_IN_SECS)
            .clamp(0, MAX_EXPIRES_IN_SECS);
        let expires_at = (self.clock)()
            .checked_add_signed(Duration::seconds(lifetime))
            .ok_or_else(|| RelayError::Unexpected("token expiry out of range".into()))?;
        tracing::debug!(%expires_at, "cached new bearer token");
        *slot = Some(Credential {
            token: fetched.access_token.clone(),
            expires_at,
        });
        Ok(fetched.access_token)
    }

    /// Drop the cached credential so the next `get_token` re-fetches.
    pub async fn invalidate(&self) {
        let mut slot = self.slot.lock().await;
        if slot.take().is_some() {
            tracing::info!("bearer token invalidated");
        }
    }

    /// Expiry of the cached credential, if one is held.
    pub async fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.slot.lock().await.as_ref().map(|c| c.expires_at)
    }
}
