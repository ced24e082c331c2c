//! The replay HTTP server (SPEC_FULL.md §4.7): archive URL routing,
//! link rewriting, dynamic download triggering and SSE progress
//! reporting, built on the same `axum`/`tower-http` stack the rest of
//! this codebase's services use.

pub mod archive_url;
pub mod error;
mod handlers;
pub mod headers;
mod link_rewrite;
mod routes;
pub mod state;

pub use crate::routes::build_router;
pub use crate::state::AppState;

use exn::ResultExt;
use tokio::net::TcpListener;

use crate::error::{ErrorKind, Result};

/// Serves the replay HTTP API on an already-bound listener until the
/// process receives a shutdown signal. Does not itself drive the
/// scheduler's dispatch loop — callers are expected to have already
/// spawned `state.scheduler.run()`.
pub async fn serve(state: AppState, listener: TcpListener) -> Result<()> {
    let app = build_router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .or_raise(|| ErrorKind::Serve)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        let mut signal = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        signal.recv().await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
