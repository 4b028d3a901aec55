use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

/// Fleet Gateway - agent tool server and dashboard proxy for fleet tracking APIs
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    #[command(subcommand)]
    pub mode: Option<Mode>,

    /// Server host address (HTTP mode)
    #[arg(short = 'H', long, env = "SERVER_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Server port (HTTP mode)
    #[arg(short, long, env = "SERVER_PORT", default_value = "3000")]
    pub port: u16,

    /// Base host of the upstream fleet API (host name or full URL)
    #[arg(short = 'a', long, env = "FLEET_API_HOST", default_value = "my.geotab.com")]
    pub api_host: String,

    /// Fleet API account user name
    #[arg(short = 'u', long, env = "FLEET_USERNAME")]
    pub username: Option<String>,

    /// Fleet API account password
    #[arg(long, env = "FLEET_PASSWORD")]
    pub password: Option<String>,

    /// Tenant database name (JSON-RPC backend)
    #[arg(short = 'd', long, env = "FLEET_DATABASE")]
    pub database: Option<String>,

    /// Optional API key forwarded to the GraphQL backend
    #[arg(short = 'k', long, env = "FLEET_API_KEY")]
    pub api_key: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// HTTP request timeout in seconds
    #[arg(long, env = "HTTP_REQUEST_TIMEOUT", default_value = "30")]
    pub http_timeout: u64,
}

/// Which surface to run
#[derive(Subcommand, Debug, Clone, Copy, PartialEq)]
pub enum Mode {
    /// Run the HTTP dashboard server (default)
    Serve,
    /// Run the stdio tool server for agent protocols
    Tools,
}

#[derive(Clone, Debug)]
pub struct Config {
    // Server settings
    pub server_host: String,
    pub server_port: u16,

    // Upstream fleet API
    pub api_base: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
    pub api_key: Option<String>,

    // Session lifetime assumed when the authenticate response carries no expiry
    pub session_ttl: u64,

    // HTTP client
    pub http_connect_timeout: u64,
    pub http_request_timeout: u64,

    // Logging
    pub log_level: String,

    pub mode: Mode,
}

impl Config {
    /// Load configuration from all sources with priority: CLI > ENV > defaults
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        // Parse CLI arguments
        let args = CliArgs::parse();

        Ok(Self::from_args(args))
    }

    /// Build a config from parsed CLI arguments
    pub fn from_args(args: CliArgs) -> Self {
        Config {
            server_host: args.host,
            server_port: args.port,

            api_base: normalize_base_url(&args.api_host),
            username: args.username,
            password: args.password,
            database: args.database,
            api_key: args.api_key,

            session_ttl: std::env::var("SESSION_TTL")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(86_400),

            http_connect_timeout: std::env::var("HTTP_CONNECT_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),

            http_request_timeout: args.http_timeout,

            log_level: args.log_level,

            mode: args.mode.unwrap_or(Mode::Serve),
        }
    }

    /// Validate configuration. Missing account credentials are a warning,
    /// not a hard failure: the process starts and fails lazily on first use.
    pub fn validate(&self) -> Result<()> {
        if self.api_base.is_empty() {
            anyhow::bail!("FLEET_API_HOST must not be empty");
        }

        if self.username.is_none() || self.password.is_none() {
            tracing::warn!(
                "FLEET_USERNAME/FLEET_PASSWORD not configured; \
                 authenticated calls will fail until credentials are provided"
            );
        }

        Ok(())
    }

    /// Build the shared HTTP client with the configured timeouts
    pub fn http_client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(self.http_connect_timeout))
            .timeout(std::time::Duration::from_secs(self.http_request_timeout))
            .build()
            .context("Failed to create HTTP client")
    }
}

/// Normalize the configured host into a full base URL.
/// Accepts either a bare host name ("my.geotab.com") or a full URL
/// ("http://127.0.0.1:8080" in tests).
fn normalize_base_url(host: &str) -> String {
    let trimmed = host.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    }
}
