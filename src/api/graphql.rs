// GraphQL call shape
// Single endpoint, query + variables body, credential as a Bearer header
// plus the fleet identity header. Failures can arrive as an `errors`
// array inside a 200 response.

use std::sync::Arc;

use reqwest::Client;
use serde_json::{json, Value};

use crate::error::GatewayError;
use crate::session::SessionManager;

const ACTIVE_VEHICLES_QUERY: &str = r#"query ActiveVehicles($limit: Int) {
  vehicles(status: ACTIVE, limit: $limit) {
    id
    name
    licensePlate
    make
    model
    year
    status
  }
}"#;

const VEHICLE_LOCATIONS_QUERY: &str = r#"query VehicleLocations($limit: Int) {
  vehicleLocations(limit: $limit) {
    vehicleId
    latitude
    longitude
    speed
    heading
    recordedAt
  }
}"#;

const DRIVER_ASSIGNMENTS_QUERY: &str = r#"query DriverAssignments($limit: Int) {
  driverAssignments(active: true, limit: $limit) {
    driverId
    driverName
    vehicleId
    assignedAt
  }
}"#;

const GEOFENCES_QUERY: &str = r#"query Geofences($limit: Int) {
  geofences(limit: $limit) {
    id
    name
    active
    geometry
  }
}"#;

/// Resolve an operation name to its fixed query text
fn query_for(operation: &str) -> Option<&'static str> {
    match operation {
        "activeVehicles" => Some(ACTIVE_VEHICLES_QUERY),
        "vehicleLocations" => Some(VEHICLE_LOCATIONS_QUERY),
        "driverAssignments" => Some(DRIVER_ASSIGNMENTS_QUERY),
        "geofences" => Some(GEOFENCES_QUERY),
        _ => None,
    }
}

pub struct GraphClient {
    http: Client,
    session: Arc<SessionManager>,
    endpoint: String,
    api_key: Option<String>,
}

impl GraphClient {
    pub fn new(
        http: Client,
        session: Arc<SessionManager>,
        base_url: &str,
        api_key: Option<String>,
    ) -> Self {
        Self {
            http,
            session,
            endpoint: format!("{}/graphql", base_url.trim_end_matches('/')),
            api_key,
        }
    }

    /// Invoke one of the fixed named operations
    pub async fn call(&self, operation: &str, variables: Value) -> Result<Value, GatewayError> {
        let query = query_for(operation).ok_or_else(|| {
            GatewayError::Validation(format!("unknown operation: {}", operation))
        })?;
        self.query(query, variables).await
    }

    /// Execute a GraphQL query with the current credential attached
    pub async fn query(&self, query: &str, variables: Value) -> Result<Value, GatewayError> {
        self.session.ensure_valid().await?;

        let credential = self.session.store().get().await;
        let token = credential
            .token
            .ok_or_else(|| GatewayError::Auth("no access token available".to_string()))?;

        let mut request = self
            .http
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", token))
            .header("Content-Type", "application/json");
        if let Some(identity) = &credential.identity {
            request = request.header("X-Fleet-Id", identity.fleet_id.clone());
        }
        if let Some(key) = &self.api_key {
            request = request.header("X-Api-Key", key.clone());
        }

        tracing::debug!("Sending GraphQL request");

        let response = request
            .json(&json!({ "query": query, "variables": variables }))
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

        // An `errors` array in a 200 body is still a failure
        if let Some(err) = classify_graphql_errors(&body) {
            return Err(err);
        }

        Ok(body.get("data").cloned().unwrap_or(Value::Null))
    }
}

/// Map a non-empty `errors` array onto the error taxonomy
fn classify_graphql_errors(body: &Value) -> Option<GatewayError> {
    let errors = body.get("errors")?.as_array()?;
    if errors.is_empty() {
        return None;
    }
    let message = errors[0]
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("unknown error")
        .to_string();

    let code = errors[0]
        .pointer("/extensions/code")
        .and_then(Value::as_str)
        .unwrap_or("");
    if code == "UNAUTHENTICATED" {
        Some(GatewayError::Auth(message))
    } else {
        Some(GatewayError::Api(message))
    }
}
