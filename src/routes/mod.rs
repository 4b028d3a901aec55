use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::api::{clamp_limit, ApiClient};
use crate::config::Config;
use crate::error::{GatewayError, Result};
use crate::models::{DriverAssignment, Geofence, Vehicle, VehicleLocation};
use crate::session::{SessionManager, StatusSnapshot};

/// Application version from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub session: Arc<SessionManager>,
    pub client: Arc<ApiClient>,
    pub config: Arc<Config>,
}

/// Common query parameters for the list endpoints
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<u32>,
}

/// Health check routes (no upstream interaction)
pub fn health_routes() -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
}

/// Authentication routes
pub fn auth_routes(state: AppState) -> Router {
    Router::new()
        .route("/auth/fleet-complete", post(fleet_auth_handler))
        .route("/auth/status", get(auth_status_handler))
        .with_state(state)
}

/// Dashboard data routes
pub fn api_routes(state: AppState) -> Router {
    Router::new()
        .route("/api/vehicles", get(vehicles_handler))
        .route("/api/locations", get(locations_handler))
        .route("/api/drivers", get(drivers_handler))
        .route("/api/geofences", get(geofences_handler))
        .route("/api/debug", get(debug_handler))
        .with_state(state)
}

/// GET / - Simple liveness check
async fn root_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "message": "Fleet Gateway is running",
        "version": VERSION
    }))
}

/// GET /health - Detailed health check
///
/// Does not require authentication (for load balancers).
async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "version": VERSION
    }))
}

/// POST /auth/fleet-complete - Authenticate with the configured account
///
/// Triggers a full authenticate against the upstream and returns the
/// resolved identity. Failures surface as `{success: false, error}`.
async fn fleet_auth_handler(State(state): State<AppState>) -> Result<Json<Value>> {
    tracing::info!("Request to /auth/fleet-complete");

    let identity = state.session.authenticate().await?;

    Ok(Json(json!({
        "success": true,
        "userId": identity.user_id,
        "fleetId": identity.fleet_id,
    })))
}

/// GET /auth/status - Current session snapshot
///
/// Reads the credential store only; never triggers upstream calls.
async fn auth_status_handler(State(state): State<AppState>) -> Json<StatusSnapshot> {
    Json(state.session.store().snapshot().await)
}

/// GET /api/vehicles - Active vehicles
async fn vehicles_handler(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>> {
    let limit = clamp_limit(query.limit);
    tracing::info!("Request to /api/vehicles (limit={})", limit);

    let data = state
        .client
        .call("activeVehicles", json!({ "limit": limit }))
        .await?;
    let vehicles: Vec<Vehicle> = parse_list(&data, "vehicles")?;

    Ok(Json(json!({
        "success": true,
        "vehicles": vehicles,
        "count": vehicles.len(),
    })))
}

/// GET /api/locations - Last known vehicle positions
async fn locations_handler(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>> {
    let limit = clamp_limit(query.limit);
    tracing::info!("Request to /api/locations (limit={})", limit);

    let data = state
        .client
        .call("vehicleLocations", json!({ "limit": limit }))
        .await?;
    let locations: Vec<VehicleLocation> = parse_list(&data, "vehicleLocations")?;

    Ok(Json(json!({
        "success": true,
        "locations": locations,
        "count": locations.len(),
    })))
}

/// GET /api/drivers - Current driver assignments
async fn drivers_handler(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>> {
    let limit = clamp_limit(query.limit);
    tracing::info!("Request to /api/drivers (limit={})", limit);

    let data = state
        .client
        .call("driverAssignments", json!({ "limit": limit }))
        .await?;
    let drivers: Vec<DriverAssignment> = parse_list(&data, "driverAssignments")?;

    Ok(Json(json!({
        "success": true,
        "drivers": drivers,
        "count": drivers.len(),
    })))
}

/// GET /api/geofences - Configured geofences
async fn geofences_handler(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>> {
    let limit = clamp_limit(query.limit);
    tracing::info!("Request to /api/geofences (limit={})", limit);

    let data = state
        .client
        .call("geofences", json!({ "limit": limit }))
        .await?;
    let geofences: Vec<Geofence> = parse_list(&data, "geofences")?;

    Ok(Json(json!({
        "success": true,
        "geofences": geofences,
        "count": geofences.len(),
    })))
}

/// GET /api/debug - Token and configuration introspection
///
/// The token is masked; this endpoint exists for local troubleshooting,
/// not for exposing credentials.
async fn debug_handler(State(state): State<AppState>) -> Json<Value> {
    let credential = state.session.store().get().await;
    let snapshot = state.session.store().snapshot().await;

    Json(json!({
        "success": true,
        "backend": state.client.backend_name(),
        "apiBase": state.config.api_base,
        "credentialsConfigured":
            state.config.username.is_some() && state.config.password.is_some(),
        "token": credential.token.as_deref().map(mask_token),
        "hasRefreshToken": credential.refresh_token.is_some(),
        "expiresAt": snapshot.expires_at,
        "userId": snapshot.user_id,
        "fleetId": snapshot.fleet_id,
        "version": VERSION,
    }))
}

/// Pull a named list out of an upstream response payload
fn parse_list<T: DeserializeOwned>(data: &Value, key: &str) -> Result<Vec<T>> {
    let list = data.get(key).cloned().unwrap_or(Value::Array(Vec::new()));
    serde_json::from_value(list)
        .map_err(|e| GatewayError::Api(format!("unexpected {} response shape: {}", key, e)))
}

/// Show only a prefix of the token
fn mask_token(token: &str) -> String {
    let prefix: String = token.chars().take(8).collect();
    if token.chars().count() <= 8 {
        "***".to_string()
    } else {
        format!("{}...", prefix)
    }
}
