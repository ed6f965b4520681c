use gatehouse_server::{AppState, ServerConfig, router};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from an optional file and the environment
    let file = ServerConfig::file_from_env();
    let config = ServerConfig::load(file.as_deref()).expect("failed to load configuration");
    tracing::info!(
        auth_provider = ?config.auth_provider,
        session_provider = ?config.session_provider,
        "Loaded configuration"
    );

    let state = AppState::from_config(&config).expect("failed to initialize authentication");
    let app = router(state, &config.static_dir);

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .expect("failed to bind to address");

    tracing::info!("listening on http://{}", config.listen_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
