// Session types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity fields derived from a successful authenticate
/// (or a post-auth identity lookup)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub fleet_id: String,
}

/// The process-wide credential. Either empty (no token) or live
/// (token present with a known expiry) - never a token without an expiry.
#[derive(Debug, Clone, Default)]
pub struct Credential {
    pub token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub identity: Option<Identity>,
}

impl Credential {
    /// True when the credential cannot be used for calls: token absent,
    /// expiry unknown, or expiry in the past.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        if self.token.is_none() {
            return true;
        }
        match self.expires_at {
            None => true,
            Some(exp) => now >= exp,
        }
    }
}

/// Account credentials submitted on a full authenticate
#[derive(Debug, Clone)]
pub struct Login {
    pub username: String,
    pub password: String,
    pub database: Option<String>,
}

/// Token data produced by an authenticate or refresh call
#[derive(Debug, Clone)]
pub struct SessionData {
    pub token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub identity: Option<Identity>,
}

/// Read-only view of the credential state for `/auth/status` and `/api/debug`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub authenticated: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub user_id: Option<String>,
    pub fleet_id: Option<String>,
}

/// JSON-RPC authenticate result: `{"credentials": {...}, "path": ...}`
#[derive(Debug, Deserialize)]
pub struct RpcAuthResult {
    pub credentials: RpcCredentials,
    #[allow(dead_code)]
    pub path: Option<String>,
}

/// Embedded credentials object used by the JSON-RPC backend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcCredentials {
    pub session_id: String,
    pub user_name: String,
    pub database: String,
}

/// OAuth-style token endpoint response (GraphQL backend).
/// Identity fields are optional; when absent a separate lookup runs.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<u64>,
    pub user_id: Option<String>,
    pub fleet_id: Option<String>,
}
