use std::env;
use std::sync::Arc;
mod app;
mod auth;
mod config;
mod db;
mod error;
mod handlers;

use app::{AppState, build_router};
use auth::jwt::TokenSigner;
use auth::services::AuthService;
use config::Config;
use db::repositories::refresh_token_repository::RefreshTokenRepository;
use db::repositories::user_repository::UserRepository;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub async fn setup_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        // Si RUST_LOG n'est pas défini, utiliser ces règles par défaut
        tracing_subscriber::EnvFilter::new("info,taskhub=debug,hyper_util=warn,tower_http=info")
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

// ----------------- Main -----------------

#[tokio::main]
async fn main() -> Result<(), lambda_http::Error> {
    // Initialize logging for all environments
    setup_logging().await;
    tracing::info!("Starting taskhub...");

    let config = Config::from_env()?;

    let signer = TokenSigner::new(&config.access_token_secret, &config.refresh_token_secret);
    let service = Arc::new(AuthService::new(
        signer.clone(),
        Arc::new(UserRepository),
        Arc::new(RefreshTokenRepository),
    ));
    let app = build_router(AppState { service, signer });

    if env::var("AWS_LAMBDA_FUNCTION_NAME").is_ok() {
        tracing::info!("Running in Lambda mode");
        lambda_http::run(app).await
    } else {
        tracing::info!("Running in local HTTP server mode");
        let addr = format!("{}:{}", config.server_host, config.server_port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        tracing::info!("🚀 Server running at http://{}", addr);
        axum::serve(listener, app).await?;

        Ok(())
    }
}
