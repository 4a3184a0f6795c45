//! The HTTP surface of the control plane.
//!
//! Every route acts on behalf of the team named by the `X-Team-ID` header and delegates to the
//! [`SandboxService`](crate::lifecycle::SandboxService). Errors leave the server as an
//! [`ErrorResponse`] with the status code of their kind.

mod handlers;
mod routes;
mod state;
mod types;

use tokio::net::TcpListener;

use crate::{lifecycle::SandboxService, SandplaneResult};

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use routes::*;
pub use state::*;
pub use types::*;

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Serves the API on `listener` until the service shuts down.
pub async fn serve(listener: TcpListener, service: SandboxService) -> SandplaneResult<()> {
    let addr = listener.local_addr()?;
    let shutdown = service.shutdown_token();
    let app = create_router(ServerState::new(service));

    tracing::info!(%addr, "server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    tracing::info!("server stopped");
    Ok(())
}
