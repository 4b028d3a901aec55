// Stdio tool server
// Exposes the fleet operations to agent protocols as JSON-RPC 2.0 over
// stdin/stdout with Content-Length framing. All logging goes to stderr;
// stdout carries protocol frames only.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::{json, Map, Value};
use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use uuid::Uuid;

use crate::api::{clamp_limit, ApiClient};
use crate::error::GatewayError;
use crate::models::Device;
use crate::session::{Login, SessionManager};

const PROTOCOL_VERSION: &str = "2024-11-05";
const SERVER_NAME: &str = "fleet-gateway";

/// A tool exposed over the protocol
struct ToolDefinition {
    name: &'static str,
    description: &'static str,
    input_schema: Value,
}

fn tool_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "authenticate",
            description: "Authenticate with the fleet API using account credentials.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "userName": { "type": "string", "description": "Fleet account user name" },
                    "password": { "type": "string", "description": "Fleet account password" },
                    "database": { "type": "string", "description": "Tenant database name" }
                },
                "required": ["userName", "password", "database"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "get_vehicles",
            description: "List vehicles in the fleet with identification details.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "resultsLimit": {
                        "type": "integer",
                        "description": "Maximum number of results",
                        "default": 50
                    }
                },
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "get_vehicle_locations",
            description: "List last known vehicle positions with speed and heading.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "resultsLimit": {
                        "type": "integer",
                        "description": "Maximum number of results",
                        "default": 50
                    }
                },
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "get_devices",
            description: "List telematics devices registered in the fleet.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "resultsLimit": {
                        "type": "integer",
                        "description": "Maximum number of results",
                        "default": 50
                    }
                },
                "additionalProperties": false
            }),
        },
    ]
}

/// JSON-RPC protocol error
#[derive(Debug)]
struct RpcError {
    code: i64,
    message: String,
}

impl RpcError {
    fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            code: -32600,
            message: message.into(),
        }
    }

    fn method_not_found(method: &str) -> Self {
        Self {
            code: -32601,
            message: format!("Method not found: {}", method),
        }
    }

    fn invalid_params(message: impl Into<String>) -> Self {
        Self {
            code: -32602,
            message: message.into(),
        }
    }
}

fn success_response(id: Value, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result
    })
}

fn error_response(id: Value, error: RpcError) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {
            "code": error.code,
            "message": error.message
        }
    })
}

/// Successful tool invocation envelope
fn tool_response(text: String) -> Value {
    json!({
        "content": [{ "type": "text", "text": text }]
    })
}

/// Failed tool invocation envelope (the call itself is a protocol success)
fn tool_error_response(message: String) -> Value {
    json!({
        "isError": true,
        "content": [{ "type": "text", "text": message }]
    })
}

pub struct ToolServer {
    session: Arc<SessionManager>,
    client: Arc<ApiClient>,
    session_id: String,
}

impl ToolServer {
    pub fn new(session: Arc<SessionManager>, client: Arc<ApiClient>) -> Self {
        Self {
            session,
            client,
            session_id: format!("stdio-{}", Uuid::new_v4()),
        }
    }

    /// Serve the protocol over stdin/stdout until EOF
    pub async fn serve_stdio(&self) -> Result<()> {
        tracing::info!(session_id = %self.session_id, "Tool server ready on stdio");

        let stdin = io::stdin();
        let mut reader = BufReader::new(stdin);
        let mut stdout = io::stdout();

        loop {
            let incoming = read_framed_json(&mut reader)
                .await
                .context("Failed to read protocol message")?;
            let Some(incoming) = incoming else {
                break;
            };

            if let Some(response) = self.handle_message(incoming).await {
                write_framed_json(&mut stdout, &response)
                    .await
                    .context("Failed to write protocol response")?;
            }
        }

        tracing::info!("Tool server shutting down (stdin closed)");
        Ok(())
    }

    /// Handle one incoming message; notifications produce no response
    async fn handle_message(&self, incoming: Value) -> Option<Value> {
        let Some(obj) = incoming.as_object() else {
            return Some(error_response(
                Value::Null,
                RpcError::invalid_request("Request must be a JSON object"),
            ));
        };

        if obj.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
            let id = obj.get("id").cloned().unwrap_or(Value::Null);
            return Some(error_response(
                id,
                RpcError::invalid_request("jsonrpc must be '2.0'"),
            ));
        }

        let Some(method) = obj.get("method").and_then(Value::as_str) else {
            // Most likely a client response; this server issues no requests
            return None;
        };

        let params = obj.get("params").cloned().unwrap_or(Value::Null);
        if let Some(id) = obj.get("id").cloned() {
            let result = self.handle_request(method, params).await;
            Some(match result {
                Ok(payload) => success_response(id, payload),
                Err(err) => error_response(id, err),
            })
        } else {
            // Known notifications are acknowledged by silence,
            // unknown ones are ignored
            None
        }
    }

    async fn handle_request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        match method {
            "initialize" => Ok(self.initialize_payload()),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(tools_list_payload()),
            "tools/call" => self.handle_tools_call(params).await,
            _ => Err(RpcError::method_not_found(method)),
        }
    }

    fn initialize_payload(&self) -> Value {
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {
                "tools": { "listChanged": false }
            },
            "serverInfo": {
                "name": SERVER_NAME,
                "version": env!("CARGO_PKG_VERSION")
            },
            "instructions":
                "Call authenticate with fleet account credentials before using the \
                 data tools. get_vehicles, get_vehicle_locations and get_devices \
                 accept an optional resultsLimit (default 50)."
        })
    }

    async fn handle_tools_call(&self, params: Value) -> Result<Value, RpcError> {
        let params = params
            .as_object()
            .ok_or_else(|| RpcError::invalid_params("tools/call params must be an object"))?;

        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::invalid_params("tools/call requires string field 'name'"))?;

        let args = match params.get("arguments") {
            Some(Value::Object(map)) => map.clone(),
            Some(Value::Null) | None => Map::new(),
            Some(_) => {
                return Err(RpcError::invalid_params(
                    "tools/call 'arguments' must be an object",
                ));
            }
        };

        tracing::debug!(tool = name, "Handling tool call");

        let result = match name {
            "authenticate" => self.call_authenticate(&args).await,
            "get_vehicles" => self.call_get_vehicles(&args).await,
            "get_vehicle_locations" => self.call_get_vehicle_locations(&args).await,
            "get_devices" => self.call_get_devices(&args).await,
            _ => return Err(RpcError::invalid_params(format!("unknown tool: {}", name))),
        };

        match result {
            Ok(payload) => Ok(payload),
            Err(ToolCallError::Protocol(err)) => Err(err),
            Err(ToolCallError::Execution(err)) => {
                tracing::warn!(tool = name, "Tool call failed: {}", err);
                Ok(tool_error_response(err.to_string()))
            }
        }
    }

    async fn call_authenticate(&self, args: &Map<String, Value>) -> ToolResult {
        let username = required_string(args, "userName")?;
        let password = required_string(args, "password")?;
        let database = required_string(args, "database")?;

        let identity = self
            .session
            .authenticate_with(Login {
                username,
                password,
                database: Some(database),
            })
            .await?;

        let text = format!(
            "Authenticated successfully:\n{}",
            pretty(&json!({
                "userId": identity.user_id,
                "fleetId": identity.fleet_id,
            }))
        );
        Ok(tool_response(text))
    }

    async fn call_get_vehicles(&self, args: &Map<String, Value>) -> ToolResult {
        let limit = results_limit(args)?;
        let result = self
            .client
            .call("Get", json!({ "typeName": "Device", "resultsLimit": limit }))
            .await?;

        let records = result.as_array().cloned().unwrap_or_default();
        let vehicles: Vec<Value> = records.iter().map(vehicle_summary).collect();
        let text = format!("Found {} vehicles:\n{}", vehicles.len(), pretty(&json!(vehicles)));
        Ok(tool_response(text))
    }

    async fn call_get_vehicle_locations(&self, args: &Map<String, Value>) -> ToolResult {
        let limit = results_limit(args)?;
        let result = self
            .client
            .call(
                "Get",
                json!({ "typeName": "DeviceStatusInfo", "resultsLimit": limit }),
            )
            .await?;

        let records = result.as_array().cloned().unwrap_or_default();
        let locations: Vec<Value> = records.iter().map(location_summary).collect();
        let text = format!(
            "Found {} vehicle locations:\n{}",
            locations.len(),
            pretty(&json!(locations))
        );
        Ok(tool_response(text))
    }

    async fn call_get_devices(&self, args: &Map<String, Value>) -> ToolResult {
        let limit = results_limit(args)?;
        let result = self
            .client
            .call("Get", json!({ "typeName": "Device", "resultsLimit": limit }))
            .await?;

        let devices: Vec<Device> = serde_json::from_value(result).map_err(|e| {
            GatewayError::Api(format!("unexpected device response shape: {}", e))
        })?;
        let text = format!("Found {} devices:\n{}", devices.len(), pretty(&json!(devices)));
        Ok(tool_response(text))
    }
}

/// A tool call either fails at the protocol level (malformed arguments)
/// or during execution (auth/upstream/API failures).
enum ToolCallError {
    Protocol(RpcError),
    Execution(GatewayError),
}

impl From<RpcError> for ToolCallError {
    fn from(err: RpcError) -> Self {
        ToolCallError::Protocol(err)
    }
}

impl From<GatewayError> for ToolCallError {
    fn from(err: GatewayError) -> Self {
        ToolCallError::Execution(err)
    }
}

type ToolResult = Result<Value, ToolCallError>;

fn tools_list_payload() -> Value {
    let tools: Vec<Value> = tool_definitions()
        .into_iter()
        .map(|tool| {
            json!({
                "name": tool.name,
                "description": tool.description,
                "inputSchema": tool.input_schema,
            })
        })
        .collect();
    json!({ "tools": tools })
}

fn required_string(args: &Map<String, Value>, key: &str) -> Result<String, RpcError> {
    args.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| RpcError::invalid_params(format!("'{}' is required", key)))
}

/// Resolve the optional resultsLimit argument (default 50, capped)
fn results_limit(args: &Map<String, Value>) -> Result<u32, RpcError> {
    match args.get("resultsLimit") {
        None | Some(Value::Null) => Ok(clamp_limit(None)),
        Some(value) => {
            let limit = value.as_u64().ok_or_else(|| {
                RpcError::invalid_params("'resultsLimit' must be a non-negative integer")
            })?;
            Ok(clamp_limit(Some(limit.min(u32::MAX as u64) as u32)))
        }
    }
}

/// Reduce a raw device record to the fields a vehicle listing needs
fn vehicle_summary(record: &Value) -> Value {
    let mut summary = Map::new();
    for key in ["id", "name", "licensePlate", "vehicleIdentificationNumber"] {
        if let Some(value) = record.get(key) {
            summary.insert(key.to_string(), value.clone());
        }
    }
    Value::Object(summary)
}

/// Reduce a raw status record to position fields
fn location_summary(record: &Value) -> Value {
    let mut summary = Map::new();
    if let Some(device_id) = record.pointer("/device/id") {
        summary.insert("deviceId".to_string(), device_id.clone());
    }
    for key in ["latitude", "longitude", "speed", "bearing", "dateTime"] {
        if let Some(value) = record.get(key) {
            summary.insert(key.to_string(), value.clone());
        }
    }
    Value::Object(summary)
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}

/// Read one Content-Length framed JSON message; None on clean EOF
async fn read_framed_json<R>(reader: &mut R) -> Result<Option<Value>, std::io::Error>
where
    R: AsyncBufRead + Unpin,
{
    let mut content_length: Option<usize> = None;

    loop {
        let mut line = String::new();
        let bytes_read = reader.read_line(&mut line).await?;
        if bytes_read == 0 {
            if content_length.is_none() {
                return Ok(None);
            }
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "Unexpected EOF while reading message headers",
            ));
        }

        if line == "\r\n" || line == "\n" {
            break;
        }

        let line = line.trim_end_matches(['\r', '\n']);
        if line.to_ascii_lowercase().starts_with("content-length:") {
            let raw_len = line
                .split_once(':')
                .map(|(_, right)| right.trim())
                .unwrap_or_default();
            let parsed = raw_len.parse::<usize>().map_err(|_| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "Invalid Content-Length header",
                )
            })?;
            content_length = Some(parsed);
        }
    }

    let content_length = content_length.ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "Missing Content-Length header",
        )
    })?;
    let mut payload = vec![0_u8; content_length];
    reader.read_exact(&mut payload).await?;

    let json: Value = serde_json::from_slice(&payload).map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Invalid JSON payload: {}", e),
        )
    })?;
    Ok(Some(json))
}

/// Write one Content-Length framed JSON message
async fn write_framed_json<W>(writer: &mut W, value: &Value) -> Result<(), std::io::Error>
where
    W: AsyncWrite + Unpin,
{
    let body = serde_json::to_vec(value).map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Failed to serialize JSON: {}", e),
        )
    })?;
    let header = format!("Content-Length: {}\r\n\r\n", body.len());
    writer.write_all(header.as_bytes()).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::RpcClient;
    use crate::session::{AuthFlow, Identity, SessionData};
    use chrono::{Duration, Utc};

    fn test_server(base_url: &str) -> ToolServer {
        let session = Arc::new(SessionManager::new(
            AuthFlow::Rpc {
                base_url: base_url.to_string(),
            },
            reqwest::Client::new(),
            None,
            3600,
        ));
        let client = Arc::new(ApiClient::Rpc(RpcClient::new(
            reqwest::Client::new(),
            session.clone(),
            base_url,
        )));
        ToolServer::new(session, client)
    }

    async fn seed_live(server: &ToolServer) {
        server
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
    fn test_tool_definitions_expose_four_tools() {
        let tools = tool_definitions();
        let names: Vec<&str> = tools.iter().map(|t| t.name).collect();
        assert_eq!(
            names,
            vec![
                "authenticate",
                "get_vehicles",
                "get_vehicle_locations",
                "get_devices"
            ]
        );

        for tool in &tools {
            assert_eq!(tool.input_schema["type"], "object");
        }

        let authenticate = &tools[0];
        assert_eq!(
            authenticate.input_schema["required"],
            json!(["userName", "password", "database"])
        );
    }

    #[test]
    fn test_results_limit_defaults_and_caps() {
        assert_eq!(results_limit(&Map::new()).unwrap(), 50);

        let mut args = Map::new();
        args.insert("resultsLimit".to_string(), json!(10));
        assert_eq!(results_limit(&args).unwrap(), 10);

        args.insert("resultsLimit".to_string(), json!(99_999));
        assert_eq!(results_limit(&args).unwrap(), 500);

        args.insert("resultsLimit".to_string(), json!("ten"));
        assert!(results_limit(&args).is_err());
    }

    #[test]
    fn test_vehicle_summary_selects_fields() {
        let record = json!({
            "id": "b1",
            "name": "Truck 7",
            "licensePlate": "ABC-123",
            "serialNumber": "G9-000",
            "odometer": 120000
        });
        let summary = vehicle_summary(&record);
        assert_eq!(
            summary,
            json!({ "id": "b1", "name": "Truck 7", "licensePlate": "ABC-123" })
        );
    }

    #[test]
    fn test_location_summary_flattens_device() {
        let record = json!({
            "device": { "id": "b1" },
            "latitude": 43.65,
            "longitude": -79.38,
            "speed": 60,
            "bearing": 180,
            "dateTime": "2024-05-01T12:00:00Z",
            "isDriving": true
        });
        let summary = location_summary(&record);
        assert_eq!(summary["deviceId"], "b1");
        assert_eq!(summary["latitude"], 43.65);
        assert!(summary.get("isDriving").is_none());
    }

    #[tokio::test]
    async fn test_initialize_and_tools_list() {
        let server = test_server("http://127.0.0.1:9");

        let init = server
            .handle_request("initialize", Value::Null)
            .await
            .unwrap();
        assert_eq!(init["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(init["serverInfo"]["name"], SERVER_NAME);

        let list = server
            .handle_request("tools/list", Value::Null)
            .await
            .unwrap();
        assert_eq!(list["tools"].as_array().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_unknown_method_is_method_not_found() {
        let server = test_server("http://127.0.0.1:9");
        let err = server
            .handle_request("resources/list", Value::Null)
            .await
            .unwrap_err();
        assert_eq!(err.code, -32601);
    }

    #[tokio::test]
    async fn test_unknown_tool_is_invalid_params() {
        let server = test_server("http://127.0.0.1:9");
        let err = server
            .handle_request(
                "tools/call",
                json!({ "name": "drop_fleet", "arguments": {} }),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, -32602);
    }

    #[tokio::test]
    async fn test_authenticate_requires_all_fields() {
        let server = test_server("http://127.0.0.1:9");
        let err = server
            .handle_request(
                "tools/call",
                json!({
                    "name": "authenticate",
                    "arguments": { "userName": "ops@example.com" }
                }),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, -32602);
        assert!(err.message.contains("password"));
    }

    #[tokio::test]
    async fn test_get_vehicles_defaults_limit_to_50() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/apiv1")
            .match_body(mockito::Matcher::PartialJson(json!({
                "method": "Get",
                "params": { "typeName": "Device", "resultsLimit": 50 }
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({ "result": [{ "id": "b1", "name": "Truck 7" }] }).to_string(),
            )
            .expect(1)
            .create_async()
            .await;

        let tool_server = test_server(&server.url());
        seed_live(&tool_server).await;

        let result = tool_server
            .handle_request(
                "tools/call",
                json!({ "name": "get_vehicles", "arguments": {} }),
            )
            .await
            .unwrap();

        mock.assert_async().await;
        let text = result["content"][0]["text"].as_str().unwrap();
        assert!(text.starts_with("Found 1 vehicles:"));
        assert!(text.contains("Truck 7"));
    }

    #[tokio::test]
    async fn test_get_vehicles_forwards_explicit_limit() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/apiv1")
            .match_body(mockito::Matcher::PartialJson(json!({
                "params": { "resultsLimit": 10 }
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({ "result": [] }).to_string())
            .expect(1)
            .create_async()
            .await;

        let tool_server = test_server(&server.url());
        seed_live(&tool_server).await;

        tool_server
            .handle_request(
                "tools/call",
                json!({ "name": "get_vehicles", "arguments": { "resultsLimit": 10 } }),
            )
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_failed_tool_call_returns_error_envelope() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/apiv1")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "error": { "name": "JSONRPCError", "message": "over quota" }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let tool_server = test_server(&server.url());
        seed_live(&tool_server).await;

        let result = tool_server
            .handle_request(
                "tools/call",
                json!({ "name": "get_devices", "arguments": {} }),
            )
            .await
            .unwrap();

        assert_eq!(result["isError"], true);
        let text = result["content"][0]["text"].as_str().unwrap();
        assert!(text.contains("over quota"));
    }

    #[tokio::test]
    async fn test_authenticate_then_get_devices_end_to_end() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/apiv1")
            .match_body(mockito::Matcher::PartialJson(json!({
                "method": "Authenticate"
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "result": {
                        "credentials": {
                            "sessionId": "sess-777",
                            "userName": "ops@example.com",
                            "database": "acme"
                        }
                    }
                })
                .to_string(),
            )
            .expect(1)
            .create_async()
            .await;
        server
            .mock("POST", "/apiv1")
            .match_body(mockito::Matcher::PartialJson(json!({
                "method": "Get",
                "params": {
                    "typeName": "Device",
                    "credentials": { "sessionId": "sess-777" }
                }
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "result": [
                        { "id": "b1", "serialNumber": "G9-0001" },
                        { "id": "b2", "serialNumber": "G9-0002" }
                    ]
                })
                .to_string(),
            )
            .expect(1)
            .create_async()
            .await;

        let tool_server = test_server(&server.url());

        let auth = tool_server
            .handle_request(
                "tools/call",
                json!({
                    "name": "authenticate",
                    "arguments": {
                        "userName": "ops@example.com",
                        "password": "secret",
                        "database": "acme"
                    }
                }),
            )
            .await
            .unwrap();
        let text = auth["content"][0]["text"].as_str().unwrap();
        assert!(text.contains("Authenticated successfully"));
        assert!(text.contains("ops@example.com"));

        let devices = tool_server
            .handle_request(
                "tools/call",
                json!({ "name": "get_devices", "arguments": {} }),
            )
            .await
            .unwrap();
        let text = devices["content"][0]["text"].as_str().unwrap();
        assert!(text.starts_with("Found 2 devices:"));
        assert!(text.contains("G9-0002"));
    }

    #[tokio::test]
    async fn test_authenticate_failure_reports_tool_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/apiv1")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "error": {
                        "message": "Incorrect login credentials",
                        "name": "InvalidUserException"
                    }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let tool_server = test_server(&server.url());

        let result = tool_server
            .handle_request(
                "tools/call",
                json!({
                    "name": "authenticate",
                    "arguments": {
                        "userName": "ops@example.com",
                        "password": "wrong",
                        "database": "acme"
                    }
                }),
            )
            .await
            .unwrap();

        assert_eq!(result["isError"], true);
        // No token stored after a rejected authenticate
        assert!(tool_server.session.store().get().await.token.is_none());
    }

    #[tokio::test]
    async fn test_handle_message_rejects_wrong_version() {
        let server = test_server("http://127.0.0.1:9");
        let response = server
            .handle_message(json!({ "jsonrpc": "1.0", "id": 1, "method": "ping" }))
            .await
            .unwrap();
        assert_eq!(response["error"]["code"], -32600);
    }

    #[tokio::test]
    async fn test_handle_message_ignores_notifications() {
        let server = test_server("http://127.0.0.1:9");
        let response = server
            .handle_message(json!({
                "jsonrpc": "2.0",
                "method": "notifications/initialized"
            }))
            .await;
        assert!(response.is_none());
    }

    #[tokio::test]
    async fn test_framing_round_trip() {
        let message = json!({ "jsonrpc": "2.0", "id": 7, "method": "ping" });

        let mut buffer: Vec<u8> = Vec::new();
        write_framed_json(&mut buffer, &message).await.unwrap();

        let mut reader = BufReader::new(std::io::Cursor::new(buffer));
        let decoded = read_framed_json(&mut reader).await.unwrap().unwrap();
        assert_eq!(decoded, message);

        // Clean EOF yields None
        assert!(read_framed_json(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_framing_requires_content_length() {
        let mut reader = BufReader::new(std::io::Cursor::new(b"\r\n{}".to_vec()));
        let err = read_framed_json(&mut reader).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }
}
