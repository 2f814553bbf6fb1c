//! xavyo WS-Federation identity provider
//!
//! Serves the passive requestor endpoint, federation metadata and, when an
//! admin token is configured, the relying party administration API.

mod config;
mod logging;
mod openapi;
mod principal;

use axum::{middleware, Router};
use config::Config;
use principal::{AdminToken, PrincipalLayerState};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use xavyo_api_wsfed::{
    create_wsfed_state, wsfed_admin_router, wsfed_public_router, PrincipalClaimsResolver,
};
use xavyo_core::SystemClock;
use xavyo_db::{run_migrations, DbPool};

/// Form posts carry at most a realm, reply and 4 KiB context.
const MAX_REQUEST_BODY_BYTES: usize = 64 * 1024;

#[tokio::main]
async fn main() {
    // Load configuration (fail-fast on missing required values)
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    logging::init_logging(&config.rust_log);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        host = %config.host,
        port = config.port,
        env = %config.app_env,
        issuer = %config.issuer,
        "Starting xavyo WS-Federation IdP"
    );

    match config.validate_security_config() {
        Ok(warnings) => {
            for warning in &warnings {
                tracing::warn!(target: "security", "{}", warning);
            }
        }
        Err(errors) => {
            for error in &errors {
                tracing::error!(target: "security", "{}", error);
            }
            eprintln!(
                "FATAL: {} insecure setting(s) detected in production mode.",
                errors.len()
            );
            std::process::exit(1);
        }
    }

    let pool = match DbPool::connect(&config.database_url).await {
        Ok(pool) => pool,
        Err(e) => {
            eprintln!("Failed to connect to database: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = run_migrations(&pool).await {
        eprintln!("Failed to run migrations: {e}");
        std::process::exit(1);
    }

    let clock = SystemClock::shared();
    let (wsfed_state, admin_state) = create_wsfed_state(
        pool.inner().clone(),
        config.wsfed_config(),
        clock.clone(),
        config.key_encryption_key,
        Arc::new(PrincipalClaimsResolver),
    );

    let principal_state = PrincipalLayerState {
        header: config.trusted_principal_header.as_deref().map(Arc::from),
        clock,
    };
    if principal_state.header.is_none() {
        tracing::warn!(
            "WSFED_TRUSTED_PRINCIPAL_HEADER not set; every sign-in is treated as unauthenticated"
        );
    }

    let mut app = Router::new()
        .merge(wsfed_public_router(wsfed_state))
        .merge(openapi::openapi_routes());

    match config.admin_token.as_deref() {
        Some(token) => {
            let admin = wsfed_admin_router(admin_state).layer(middleware::from_fn_with_state(
                AdminToken(Arc::from(token)),
                principal::require_admin_token,
            ));
            app = app.nest("/admin/wsfed", admin);
            info!("Admin routes mounted under /admin/wsfed");
        }
        None => info!("WSFED_ADMIN_TOKEN not set; admin routes disabled"),
    }

    let app = app
        .layer(middleware::from_fn_with_state(
            principal_state,
            principal::inject_principal,
        ))
        .layer(RequestBodyLimitLayer::new(MAX_REQUEST_BODY_BYTES))
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = match config.bind_addr().parse() {
        Ok(a) => a,
        Err(e) => {
            tracing::error!("Invalid bind address '{}': {e}", config.bind_addr());
            std::process::exit(1);
        }
    };

    info!(%addr, "Server listening");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("Failed to bind to address {addr}: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!("Server error: {e}");
        std::process::exit(1);
    }

    info!("Server shutdown complete");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        () = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
