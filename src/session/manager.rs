// Session manager
// Drives the token lifecycle: acquire, cache, expire, refresh

use reqwest::Client;
use tokio::sync::{Mutex, RwLock};

use crate::error::GatewayError;

use super::flows::AuthFlow;
use super::store::CredentialStore;
use super::types::{Identity, Login};

/// Owns the shared credential and decides, on each outbound call, whether
/// it is usable, expired, or absent. The refresh/re-authenticate sequence
/// runs under a single lock so concurrent callers observing an expired
/// token do not each trigger redundant upstream round-trips.
pub struct SessionManager {
    store: CredentialStore,
    flow: AuthFlow,
    client: Client,
    login: RwLock<Option<Login>>,
    session_ttl: u64,
    auth_lock: Mutex<()>,
}

impl SessionManager {
    pub fn new(flow: AuthFlow, client: Client, login: Option<Login>, session_ttl: u64) -> Self {
        Self {
            store: CredentialStore::new(),
            flow,
            client,
            login: RwLock::new(login),
            session_ttl,
            auth_lock: Mutex::new(()),
        }
    }

    /// The credential store backing this manager
    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// Ensure the stored credential is usable, renewing it if needed.
    ///
    /// The fallback chain is bounded and visible here: expired ->
    /// at most one refresh -> at most one full authenticate -> fail.
    pub async fn ensure_valid(&self) -> Result<(), GatewayError> {
        // Fast path: live credential, zero network calls
        if !self.store.is_expired().await {
            return Ok(());
        }

        // Single-flight: one caller drives the renewal, the rest wait here
        let _guard = self.auth_lock.lock().await;
        if !self.store.is_expired().await {
            // Another caller renewed the session while we waited
            return Ok(());
        }

        let current = self.store.get().await;

        // Step 1: at most one refresh attempt
        if let Some(refresh_token) = current.refresh_token.as_deref() {
            match self.flow.refresh(&self.client, refresh_token).await {
                Ok(data) => {
                    self.store.apply_refresh(data).await;
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(
                        "Token refresh failed, falling back to re-authentication: {:#}",
                        e
                    );
                }
            }
        }

        // Step 2: at most one full authenticate
        let login = self.configured_login().await?;
        self.full_authenticate(&login, current.identity).await?;
        Ok(())
    }

    /// Full authentication with the configured account credentials.
    /// Backs `POST /auth/fleet-complete`.
    pub async fn authenticate(&self) -> Result<Identity, GatewayError> {
        let login = self.configured_login().await?;
        let _guard = self.auth_lock.lock().await;
        self.full_authenticate(&login, None).await
    }

    /// Full authentication with explicitly provided credentials
    /// (tool operation `authenticate`). The credentials are remembered
    /// so later lazy re-authentication uses the same account.
    pub async fn authenticate_with(&self, login: Login) -> Result<Identity, GatewayError> {
        let _guard = self.auth_lock.lock().await;
        {
            let mut stored = self.login.write().await;
            *stored = Some(login.clone());
        }
        // An explicit login starts from a clean slate
        self.store.clear().await;
        self.full_authenticate(&login, None).await
    }

    async fn configured_login(&self) -> Result<Login, GatewayError> {
        self.login
            .read()
            .await
            .clone()
            .ok_or_else(|| GatewayError::Auth("no credentials configured".to_string()))
    }

    /// One authenticate round-trip. Populates token, expiry, and identity;
    /// the identity lookup call is issued only when the authenticate
    /// response did not already include identity and none was held before.
    /// On failure nothing is stored.
    async fn full_authenticate(
        &self,
        login: &Login,
        prior_identity: Option<Identity>,
    ) -> Result<Identity, GatewayError> {
        let mut data = self
            .flow
            .authenticate(&self.client, login, self.session_ttl)
            .await
            .map_err(|e| GatewayError::Auth(format!("{:#}", e)))?;

        if data.identity.is_none() {
            data.identity = prior_identity;
        }

        let identity = match data.identity.clone() {
            Some(identity) => identity,
            None => {
                let identity = self
                    .flow
                    .fetch_identity(&self.client, &data.token)
                    .await
                    .map_err(|e| GatewayError::Auth(format!("identity lookup failed: {:#}", e)))?;
                data.identity = Some(identity.clone());
                identity
            }
        };

        self.store.apply_session(data).await;
        Ok(identity)
    }
}
