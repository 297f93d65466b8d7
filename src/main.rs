use anyhow::Result;
use std::{io::ErrorKind, net::SocketAddr, path::Path, sync::Arc};
use tokio::{net::TcpListener, signal};
use tracing_subscriber::EnvFilter;
use upload_audit::{config::AppConfig, db, routes::routes, state::AppState};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("upload_audit=info,tower_http=info")),
        )
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = AppConfig::from_env_and_args()?;

    tracing::info!("Starting upload-audit with config: {:?}", cfg);

    // --- Ensure upload directory exists ---
    if !Path::new(&cfg.upload_dir).exists() {
        tokio::fs::create_dir_all(&cfg.upload_dir).await?;
        tracing::info!("Created upload directory at {}", cfg.upload_dir.display());
    }

    // --- Initialize SQLite pool + schema ---
    let pool = db::connect(&cfg).await?;
    db::run_migrations(&pool).await?;

    if migrate {
        tracing::info!("Database migration complete.");
        pool.close().await;
        return Ok(()); // exit after migration
    }

    db::check_connection(&pool).await;
    let db = Arc::new(pool);

    // --- Build router ---
    let app = routes::app(&cfg, AppState::new(db.clone(), &cfg));

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    // --- Teardown ---
    db.close().await;
    tracing::info!("Connection pool closed, bye.");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", err);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!("Failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("Received terminate signal, shutting down"),
    }
}
