// Backend-specific authenticate / refresh / identity lookup calls

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde_json::{json, Value};

use super::types::{Identity, Login, RpcAuthResult, SessionData, TokenResponse};

/// GraphQL query used for the post-auth identity lookup when the token
/// response did not carry identity fields.
const IDENTITY_QUERY: &str = r#"query Me { me { id fleet { id } } }"#;

/// Authentication flow for one of the two upstream backends.
/// The JSON-RPC backend issues session tokens with no refresh token;
/// the GraphQL backend issues OAuth-style access/refresh token pairs.
#[derive(Debug, Clone)]
pub enum AuthFlow {
    Rpc { base_url: String },
    Graph { base_url: String, api_key: Option<String> },
}

impl AuthFlow {
    /// Perform a full authenticate with the given account credentials.
    /// `session_ttl` applies when the response carries no expiry of its own.
    pub async fn authenticate(
        &self,
        client: &Client,
        login: &Login,
        session_ttl: u64,
    ) -> Result<SessionData> {
        match self {
            AuthFlow::Rpc { base_url } => {
                authenticate_rpc(client, base_url, login, session_ttl).await
            }
            AuthFlow::Graph { base_url, .. } => authenticate_graph(client, base_url, login).await,
        }
    }

    /// Exchange a refresh token for a new access token.
    /// Only the GraphQL backend supports this.
    pub async fn refresh(&self, client: &Client, refresh_token: &str) -> Result<SessionData> {
        match self {
            AuthFlow::Rpc { .. } => {
                anyhow::bail!("session refresh is not supported by the JSON-RPC backend")
            }
            AuthFlow::Graph { base_url, .. } => {
                refresh_graph(client, base_url, refresh_token).await
            }
        }
    }

    /// Look up the caller identity for a freshly issued token.
    /// Used only when the authenticate response did not include identity.
    pub async fn fetch_identity(&self, client: &Client, token: &str) -> Result<Identity> {
        match self {
            AuthFlow::Rpc { .. } => {
                // The JSON-RPC authenticate result always embeds identity
                anyhow::bail!("identity lookup is not supported by the JSON-RPC backend")
            }
            AuthFlow::Graph { base_url, api_key } => {
                fetch_identity_graph(client, base_url, api_key.as_deref(), token).await
            }
        }
    }
}

/// Client fingerprint for the User-Agent on auth calls
fn get_machine_fingerprint() -> String {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let hostname = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());

    let mut hasher = DefaultHasher::new();
    hostname.hash(&mut hasher);
    format!("{:x}", hasher.finish())
}

fn user_agent() -> String {
    format!(
        "fleet-gateway/{}-{}",
        env!("CARGO_PKG_VERSION"),
        get_machine_fingerprint()
    )
}

/// Extract the application-level error message from a JSON-RPC body,
/// if one is present. The API reports failures inside a 200 response.
pub(crate) fn rpc_error_message(body: &Value) -> Option<String> {
    let error = body.get("error")?;
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| error.to_string());
    Some(message)
}

/// Compute an absolute expiry from an optional `expires_in`, with a
/// 60 second buffer so tokens are renewed slightly before the upstream
/// deadline.
pub(crate) fn expiry_from_expires_in(expires_in: Option<u64>, default_secs: u64) -> DateTime<Utc> {
    let secs = expires_in.unwrap_or(default_secs).saturating_sub(60);
    Utc::now() + Duration::seconds(secs as i64)
}

/// Authenticate against the JSON-RPC backend.
/// The session expiry is not reported by the API, so the configured
/// session TTL is used.
async fn authenticate_rpc(
    client: &Client,
    base_url: &str,
    login: &Login,
    session_ttl: u64,
) -> Result<SessionData> {
    tracing::info!("Authenticating against JSON-RPC backend...");

    let database = login
        .database
        .as_deref()
        .context("database is required for JSON-RPC authentication")?;

    let payload = json!({
        "method": "Authenticate",
        "params": {
            "userName": login.username,
            "password": login.password,
            "database": database,
        }
    });

    let response = client
        .post(format!("{}/apiv1", base_url))
        .header("Content-Type", "application/json")
        .header("User-Agent", user_agent())
        .json(&payload)
        .send()
        .await
        .context("Failed to send authenticate request")?;

    let status = response.status();
    let text = response
        .text()
        .await
        .context("Failed to read authenticate response")?;
    let body: Value = serde_json::from_str(&text).unwrap_or(Value::Null);

    // Failures are reported inside the body even on HTTP 200
    if let Some(message) = rpc_error_message(&body) {
        anyhow::bail!("authenticate rejected: {}", message);
    }
    if !status.is_success() {
        anyhow::bail!("authenticate failed: {} - {}", status, text);
    }

    let result: RpcAuthResult = serde_json::from_value(body.get("result").cloned().unwrap_or_default())
        .context("Authenticate response has no credentials")?;

    let expires_at = Utc::now() + Duration::seconds(session_ttl as i64);
    tracing::info!(
        "Session established for {} on {}, assumed expiry: {}",
        result.credentials.user_name,
        result.credentials.database,
        expires_at.to_rfc3339()
    );

    Ok(SessionData {
        token: result.credentials.session_id,
        refresh_token: None,
        expires_at,
        identity: Some(Identity {
            user_id: result.credentials.user_name,
            fleet_id: result.credentials.database,
        }),
    })
}

/// Authenticate against the GraphQL backend token endpoint
/// (OAuth password grant).
async fn authenticate_graph(client: &Client, base_url: &str, login: &Login) -> Result<SessionData> {
    tracing::info!("Acquiring access token from GraphQL backend...");

    let form = [
        ("grant_type", "password"),
        ("username", login.username.as_str()),
        ("password", login.password.as_str()),
    ];

    let response = client
        .post(format!("{}/auth/token", base_url))
        .header("User-Agent", user_agent())
        .form(&form)
        .send()
        .await
        .context("Failed to send token request")?;

    let status = response.status();
    if !status.is_success() {
        let error_text = response.text().await.unwrap_or_default();
        anyhow::bail!("token request failed: {} - {}", status, error_text);
    }

    let data: TokenResponse = response
        .json()
        .await
        .context("Failed to parse token response")?;

    if data.access_token.is_empty() {
        anyhow::bail!("token response does not contain an access token");
    }

    let expires_at = expiry_from_expires_in(data.expires_in, 3600);
    tracing::info!("Access token acquired, expires: {}", expires_at.to_rfc3339());

    let identity = match (data.user_id, data.fleet_id) {
        (Some(user_id), Some(fleet_id)) => Some(Identity { user_id, fleet_id }),
        _ => None,
    };

    Ok(SessionData {
        token: data.access_token,
        refresh_token: data.refresh_token,
        expires_at,
        identity,
    })
}

/// Exchange a refresh token at the GraphQL backend token endpoint
async fn refresh_graph(client: &Client, base_url: &str, refresh_token: &str) -> Result<SessionData> {
    tracing::info!("Refreshing access token...");

    let form = [
        ("grant_type", "refresh_token"),
        ("refresh_token", refresh_token),
    ];

    let response = client
        .post(format!("{}/auth/token", base_url))
        .header("User-Agent", user_agent())
        .form(&form)
        .send()
        .await
        .context("Failed to send refresh request")?;

    let status = response.status();
    if !status.is_success() {
        let error_text = response.text().await.unwrap_or_default();
        anyhow::bail!("token refresh failed: {} - {}", status, error_text);
    }

    let data: TokenResponse = response
        .json()
        .await
        .context("Failed to parse refresh response")?;

    if data.access_token.is_empty() {
        anyhow::bail!("refresh response does not contain an access token");
    }

    let expires_at = expiry_from_expires_in(data.expires_in, 3600);
    tracing::info!("Access token refreshed, expires: {}", expires_at.to_rfc3339());

    Ok(SessionData {
        token: data.access_token,
        refresh_token: data.refresh_token,
        expires_at,
        identity: None,
    })
}

/// Identity lookup via the GraphQL endpoint
async fn fetch_identity_graph(
    client: &Client,
    base_url: &str,
    api_key: Option<&str>,
    token: &str,
) -> Result<Identity> {
    tracing::debug!("Looking up identity for new session...");

    let mut request = client
        .post(format!("{}/graphql", base_url))
        .header("Authorization", format!("Bearer {}", token))
        .header("Content-Type", "application/json")
        .json(&json!({ "query": IDENTITY_QUERY, "variables": {} }));
    if let Some(key) = api_key {
        request = request.header("X-Api-Key", key);
    }

    let response = request
        .send()
        .await
        .context("Failed to send identity query")?;

    let status = response.status();
    if !status.is_success() {
        let error_text = response.text().await.unwrap_or_default();
        anyhow::bail!("identity query failed: {} - {}", status, error_text);
    }

    let body: Value = response
        .json()
        .await
        .context("Failed to parse identity response")?;

    if let Some(errors) = body.get("errors").and_then(Value::as_array) {
        if !errors.is_empty() {
            let message = errors[0]
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            anyhow::bail!("identity query rejected: {}", message);
        }
    }

    let me = body
        .pointer("/data/me")
        .context("Identity response has no `me` field")?;
    let user_id = me
        .get("id")
        .and_then(Value::as_str)
        .context("Identity response has no user id")?;
    let fleet_id = me
        .pointer("/fleet/id")
        .and_then(Value::as_str)
        .context("Identity response has no fleet id")?;

    Ok(Identity {
        user_id: user_id.to_string(),
        fleet_id: fleet_id.to_string(),
    })
}
