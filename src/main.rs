use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use dotenvy::dotenv;
use tokio::net::TcpListener;
use tokio::signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tracing::info;
use tracing_subscriber::EnvFilter;

use noupick::api::{AppState, create_router};
use noupick::config::CONFIG;
use noupick::gemini::{GeminiBackend, GenerationClient};
use noupick::rate_limit::FixedWindowLimiter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let limiter = Arc::new(FixedWindowLimiter::new(
        CONFIG.rate_limit_max,
        Duration::from_millis(CONFIG.rate_limit_window_ms),
    ));

    // Sweep stale rate-limit windows so the map stays bounded over time.
    let sweeper = limiter.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(CONFIG.rate_limit_window_ms));
        loop {
            interval.tick().await;
            sweeper.purge_expired();
        }
    });

    let backend = GeminiBackend::new(CONFIG.gemini_model.clone(), CONFIG.auth());
    let generator = Arc::new(GenerationClient::new(Arc::new(backend)));

    let app = create_router(AppState { limiter, generator });

    let address = format!("0.0.0.0:{}", CONFIG.port);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address).await?;
    info!("noupick API running on {address}");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        ctrl_c().await.expect("Failed to install Ctrl+C handler");
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        signal(SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
