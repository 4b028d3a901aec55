// Credential store
// Holds the single process-wide credential behind a read-write lock

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;

use super::types::{Credential, SessionData, StatusSnapshot};

/// Thread-safe store for the shared credential.
/// Cloning the store shares the same underlying state.
#[derive(Clone, Default)]
pub struct CredentialStore {
    inner: Arc<RwLock<Credential>>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current credential (cloned)
    pub async fn get(&self) -> Credential {
        self.inner.read().await.clone()
    }

    /// Replace the credential wholesale
    pub async fn set(&self, credential: Credential) {
        let mut cred = self.inner.write().await;
        *cred = credential;
    }

    /// True when the token is absent, the expiry is unknown,
    /// or the expiry has passed.
    pub async fn is_expired(&self) -> bool {
        self.inner.read().await.is_expired(Utc::now())
    }

    /// Apply a refresh result: overwrite token and expiry, keep the
    /// previous refresh token unless the upstream rotated it, and
    /// preserve the identity. Single write section so concurrent
    /// refreshes cannot interleave.
    pub async fn apply_refresh(&self, data: SessionData) {
        let mut cred = self.inner.write().await;
        cred.token = Some(data.token);
        cred.expires_at = Some(data.expires_at);
        if data.refresh_token.is_some() {
            cred.refresh_token = data.refresh_token;
        }
        if data.identity.is_some() {
            cred.identity = data.identity;
        }
    }

    /// Apply a full authenticate result, replacing all fields
    pub async fn apply_session(&self, data: SessionData) {
        let mut cred = self.inner.write().await;
        *cred = Credential {
            token: Some(data.token),
            refresh_token: data.refresh_token,
            expires_at: Some(data.expires_at),
            identity: data.identity,
        };
    }

    /// Drop the credential back to the empty state
    pub async fn clear(&self) {
        let mut cred = self.inner.write().await;
        *cred = Credential::default();
    }

    /// Snapshot for status/debug endpoints. Performs no network calls.
    pub async fn snapshot(&self) -> StatusSnapshot {
        let cred = self.inner.read().await;
        StatusSnapshot {
            authenticated: !cred.is_expired(Utc::now()),
            expires_at: cred.expires_at,
            user_id: cred.identity.as_ref().map(|i| i.user_id.clone()),
            fleet_id: cred.identity.as_ref().map(|i| i.fleet_id.clone()),
        }
    }
}
