// API client module
// One call contract over the two upstream call shapes

mod graphql;
mod rpc;

pub use graphql::GraphClient;
pub use rpc::RpcClient;

use serde_json::Value;

use crate::error::GatewayError;

/// Result-count limit applied when the caller does not provide one
pub const DEFAULT_RESULTS_LIMIT: u32 = 50;

/// Upper bound on caller-provided result-count limits
pub const MAX_RESULTS_LIMIT: u32 = 500;

/// Default and cap a caller-provided result-count limit
pub fn clamp_limit(limit: Option<u32>) -> u32 {
    limit.unwrap_or(DEFAULT_RESULTS_LIMIT).min(MAX_RESULTS_LIMIT)
}

/// The two supported upstream backends behind a single contract.
/// `call` ensures the session is valid, performs the shaped request,
/// and classifies both HTTP-level and in-body failures.
pub enum ApiClient {
    Rpc(RpcClient),
    Graph(GraphClient),
}

impl ApiClient {
    pub async fn call(&self, operation: &str, params: Value) -> Result<Value, GatewayError> {
        match self {
            ApiClient::Rpc(client) => client.call(operation, params).await,
            ApiClient::Graph(client) => client.call(operation, params).await,
        }
    }

    /// Backend name for status and debug output
    pub fn backend_name(&self) -> &'static str {
        match self {
            ApiClient::Rpc(_) => "json-rpc",
            ApiClient::Graph(_) => "graphql",
        }
    }
}
