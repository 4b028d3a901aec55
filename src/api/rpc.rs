// JSON-RPC call shape
// Single endpoint, method + params body, credentials embedded in params.
// Failures can arrive inside a 200 response body.

use std::sync::Arc;

use reqwest::Client;
use serde_json::{json, Value};

use crate::error::GatewayError;
use crate::session::SessionManager;

pub struct RpcClient {
    http: Client,
    session: Arc<SessionManager>,
    endpoint: String,
}

impl RpcClient {
    pub fn new(http: Client, session: Arc<SessionManager>, base_url: &str) -> Self {
        Self {
            http,
            session,
            endpoint: format!("{}/apiv1", base_url.trim_end_matches('/')),
        }
    }

    /// Invoke an API method with the current session credentials embedded
    /// in the params object.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, GatewayError> {
        self.session.ensure_valid().await?;

        let credential = self.session.store().get().await;
        let token = credential
            .token
            .ok_or_else(|| GatewayError::Auth("no session token available".to_string()))?;
        let identity = credential
            .identity
            .ok_or_else(|| GatewayError::Auth("session has no identity".to_string()))?;

        let mut params = match params {
            Value::Object(map) => map,
            Value::Null => serde_json::Map::new(),
            _ => {
                return Err(GatewayError::Validation(
                    "params must be a JSON object".to_string(),
                ))
            }
        };
        params.insert(
            "credentials".to_string(),
            json!({
                "userName": identity.user_id,
                "sessionId": token,
                "database": identity.fleet_id,
            }),
        );

        let payload = json!({ "method": method, "params": params });
        tracing::debug!(method = method, "Sending JSON-RPC request");

        let response = self
            .http
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                GatewayError::Internal(anyhow::anyhow!("request to fleet API failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GatewayError::Upstream {
                status: status.as_u16(),
                message,
            });
        }

        let body: Value = response.json().await.map_err(|e| {
            GatewayError::Api(format!("invalid JSON from fleet API: {}", e))
        })?;

        // A 200 response can still carry an application-level error
        if let Some(err) = classify_rpc_error(&body) {
            return Err(err);
        }

        Ok(body.get("result").cloned().unwrap_or(Value::Null))
    }
}

/// Map the `error` field of a JSON-RPC body, if present, onto the error
/// taxonomy. Session rejections become auth errors; everything else is
/// an application-level API error.
fn classify_rpc_error(body: &Value) -> Option<GatewayError> {
    let error = body.get("error")?;
    let name = error.get("name").and_then(Value::as_str).unwrap_or("");
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| error.to_string());

    if name == "InvalidUserException" {
        Some(GatewayError::Auth(message))
    } else {
        Some(GatewayError::Api(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{AuthFlow, Identity, Login, SessionData};
    use chrono::{Duration, Utc};

    fn seeded_client(base_url: &str) -> RpcClient {
        let session = Arc::new(SessionManager::new(
            AuthFlow::Rpc {
                base_url: base_url.to_string(),
            },
            Client::new(),
            Some(Login {
                username: "ops@example.com".to_string(),
                password: "secret".to_string(),
                database: Some("acme".to_string()),
            }),
            3600,
        ));
        RpcClient::new(Client::new(), session, base_url)
    }

    async fn seed_live(client: &RpcClient) {
        client
            .session
            .store()
            .apply_session(SessionData {
                token: "sess-123".to_string(),
                refresh_token: None,
                expires_at: Utc::now() + Duration::hours(1),
                identity: Some(Identity {
                    user_id: "ops@example.com".to_string(),
                    fleet_id: "acme".to_string(),
                }),
            })
            .await;
    }

    #[test]
    fn test_classify_rpc_error() {
        let body = json!({
            "error": { "name": "InvalidUserException", "message": "session expired" }
        });
        assert!(matches!(
            classify_rpc_error(&body),
            Some(GatewayError::Auth(_))
        ));

        let body = json!({
            "error": { "name": "JSONRPCError", "message": "unknown method" }
        });
        assert!(matches!(
            classify_rpc_error(&body),
            Some(GatewayError::Api(_))
        ));

        let body = json!({ "result": [] });
        assert!(classify_rpc_error(&body).is_none());
    }

    #[tokio::test]
    async fn test_call_embeds_credentials() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/apiv1")
            .match_body(mockito::Matcher::PartialJson(json!({
                "method": "Get",
                "params": {
                    "typeName": "Device",
                    "credentials": {
                        "userName": "ops@example.com",
                        "sessionId": "sess-123",
                        "database": "acme"
                    }
                }
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({ "result": [{ "id": "b1" }] }).to_string())
            .expect(1)
            .create_async()
            .await;

        let client = seeded_client(&server.url());
        seed_live(&client).await;

        let result = client
            .call("Get", json!({ "typeName": "Device" }))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(result, json!([{ "id": "b1" }]));
    }

    #[tokio::test]
    async fn test_error_in_200_body_is_api_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/apiv1")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "error": { "name": "JSONRPCError", "message": "unknown type name" }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = seeded_client(&server.url());
        seed_live(&client).await;

        let err = client.call("Get", json!({})).await.unwrap_err();
        assert!(matches!(err, GatewayError::Api(_)));
        assert!(err.to_string().contains("unknown type name"));
    }

    #[tokio::test]
    async fn test_non_2xx_is_upstream_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/apiv1")
            .with_status(503)
            .with_body("maintenance window")
            .create_async()
            .await;

        let client = seeded_client(&server.url());
        seed_live(&client).await;

        let err = client.call("Get", json!({})).await.unwrap_err();
        match err {
            GatewayError::Upstream { status, message } => {
                assert_eq!(status, 503);
                assert!(message.contains("maintenance"));
            }
            other => panic!("expected Upstream error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_invalid_user_in_200_body_is_auth_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/apiv1")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "error": { "name": "InvalidUserException", "message": "session expired" }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = seeded_client(&server.url());
        seed_live(&client).await;

        let err = client.call("Get", json!({})).await.unwrap_err();
        assert!(matches!(err, GatewayError::Auth(_)));
    }

    #[tokio::test]
    async fn test_non_object_params_rejected() {
        let server = mockito::Server::new_async().await;
        let client = seeded_client(&server.url());
        seed_live(&client).await;

        let err = client.call("Get", json!([1, 2, 3])).await.unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)));
    }
}
