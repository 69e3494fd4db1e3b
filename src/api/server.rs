use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use super::handlers;
use crate::wallet::WalletManager;

pub fn create_router(manager: Arc<WalletManager>) -> Router {
    // Set ALLOWED_ORIGINS="https://a.example,https://b.example" to restrict CORS
    let cors = match std::env::var("ALLOWED_ORIGINS") {
        Ok(origins) if !origins.is_empty() => {
            log::info!("CORS configured for origins: {}", origins);
            let origin_list: Vec<_> = origins
                .split(',')
                .filter_map(|s| match s.trim().parse() {
                    Ok(origin) => Some(origin),
                    Err(_) => {
                        log::warn!("Ignoring invalid CORS origin '{}'", s.trim());
                        None
                    }
                })
                .collect();
            CorsLayer::new()
                .allow_origin(origin_list)
                .allow_methods(Any)
                .allow_headers(Any)
        }
        _ => {
            log::warn!("CORS: Allowing all origins (development mode). Set ALLOWED_ORIGINS env var for production.");
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    };

    Router::new()
        .route("/health", get(handlers::health_handler))
        .route(
            "/api/accounts",
            get(handlers::list_accounts_handler).post(handlers::create_account_handler),
        )
        .route(
            "/api/accounts/:id/call",
            post(handlers::call_account_method_handler),
        )
        .layer(cors)
        .with_state(manager)
}

pub async fn run_server(manager: Arc<WalletManager>, addr: &str) -> anyhow::Result<()> {
    let app = create_router(manager);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            log::info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            log::info!("Received SIGTERM signal");
        },
    }

    log::info!("Shutting down gracefully...");
}
