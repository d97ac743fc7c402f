//! The agent's REST API.
//!
//! Every request passes the access gate first. Requests that get through reach handlers that
//! drive the daemon lifecycle, its configuration, the journal and the access policy itself.

mod handlers;
mod middleware;
mod routes;
mod state;
pub mod types;

use std::{net::SocketAddr, path::Path, time::Duration};

use axum_server::{tls_rustls::RustlsConfig, Handle};
use tokio::net::TcpListener;

use crate::AgentResult;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use handlers::ApiError;
pub use middleware::*;
pub use routes::*;
pub use state::*;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// How long in-flight requests may run after a shutdown signal.
const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(10);

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Serves the API over plain HTTP until ctrl-c.
pub async fn serve(listener: TcpListener, state: AgentState) -> AgentResult<()> {
    tracing::info!("serving http on {}", listener.local_addr()?);

    let app = create_router(state);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

/// Serves the API over HTTPS with the given PEM certificate chain and private key until ctrl-c.
pub async fn serve_tls(
    addr: SocketAddr,
    state: AgentState,
    cert: impl AsRef<Path>,
    key: impl AsRef<Path>,
) -> AgentResult<()> {
    let config = RustlsConfig::from_pem_file(cert.as_ref(), key.as_ref()).await?;
    tracing::info!("serving https on {}", addr);
    tracing::info!("using certificate {}", cert.as_ref().display());

    let handle = Handle::new();
    tokio::spawn({
        let handle = handle.clone();
        async move {
            shutdown_signal().await;
            handle.graceful_shutdown(Some(SHUTDOWN_GRACE_PERIOD));
        }
    });

    let app = create_router(state);
    axum_server::bind_rustls(addr, config)
        .handle(handle)
        .serve(app.into_make_service_with_connect_info::<SocketAddr>())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }

    tracing::info!("shutdown signal received");
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
