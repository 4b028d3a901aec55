use anyhow::Result;
use std::sync::Arc;

mod api;
mod config;
mod error;
mod models;
mod routes;
mod session;
mod tools;

use config::Mode;
use session::{AuthFlow, Login, SessionManager};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (for log level)
    let config = config::Config::load()?;

    // Initialize logging with the configured level. In tool-server mode
    // stdout carries protocol frames, so logs must go to stderr.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.log_level.to_lowercase()));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true);

    if config.mode == Mode::Tools {
        subscriber.with_writer(std::io::stderr).init();
    } else {
        subscriber.init();
    }

    config.validate()?;

    tracing::info!("Fleet Gateway starting...");
    tracing::debug!("Upstream API base: {}", config.api_base);

    // Shared HTTP client with explicit timeouts
    let http = config.http_client()?;

    let login = match (&config.username, &config.password) {
        (Some(username), Some(password)) => Some(Login {
            username: username.clone(),
            password: password.clone(),
            database: config.database.clone(),
        }),
        _ => None,
    };

    match config.mode {
        Mode::Serve => run_server(config, http, login).await,
        Mode::Tools => run_tool_server(config, http, login).await,
    }
}

/// Run the HTTP dashboard against the GraphQL backend
async fn run_server(
    config: config::Config,
    http: reqwest::Client,
    login: Option<Login>,
) -> Result<()> {
    let session = Arc::new(SessionManager::new(
        AuthFlow::Graph {
            base_url: config.api_base.clone(),
            api_key: config.api_key.clone(),
        },
        http.clone(),
        login,
        config.session_ttl,
    ));

    let client = Arc::new(api::ApiClient::Graph(api::GraphClient::new(
        http,
        session.clone(),
        &config.api_base,
        config.api_key.clone(),
    )));

    let addr = format!("{}:{}", config.server_host, config.server_port);

    let state = routes::AppState {
        session,
        client,
        config: Arc::new(config),
    };

    let app = build_app(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Dashboard listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Run the stdio tool server against the JSON-RPC backend
async fn run_tool_server(
    config: config::Config,
    http: reqwest::Client,
    login: Option<Login>,
) -> Result<()> {
    let session = Arc::new(SessionManager::new(
        AuthFlow::Rpc {
            base_url: config.api_base.clone(),
        },
        http.clone(),
        login,
        config.session_ttl,
    ));

    let client = Arc::new(api::ApiClient::Rpc(api::RpcClient::new(
        http,
        session.clone(),
        &config.api_base,
    )));

    tools::ToolServer::new(session, client).serve_stdio().await
}

/// Build the application with all routes and middleware
fn build_app(state: routes::AppState) -> axum::Router {
    use axum::Router;

    let health_routes = routes::health_routes();
    let auth_routes = routes::auth_routes(state.clone());
    let api_routes = routes::api_routes(state);

    Router::new()
        .merge(health_routes)
        .merge(auth_routes)
        .merge(api_routes)
        .layer(cors_layer())
}

/// CORS layer for the browser dashboard
fn cors_layer() -> tower_http::cors::CorsLayer {
    use tower_http::cors::{Any, CorsLayer};

    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Handle graceful shutdown signal
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown...");
        },
    }
}
