//! HTTP transport.
//!
//! Thin axum layer over the tenant registry. Every route lives under
//! `/solidq`, answers with an [`Envelope`] and passes the request gate
//! first. Queue routes also answer `isPaused` while the server is paused.

mod auth;
mod handlers;
mod types;

use std::net::SocketAddr;
use std::time::Instant;

use axum::Router;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::error::{Error, Result};

pub use auth::{AuthChain, AuthCheck, SharedSecret, request_token};
pub use types::{AppState, Envelope, ServerState};

/// Rejects requests the gate does not admit.
async fn auth_middleware(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if state.gate.allows(&request) {
        return next.run(request).await;
    }
    handlers::respond("auth", "", Instant::now(), Err(Error::Unauthorized)).into_response()
}

/// Short-circuits queue routes while paused.
async fn pause_gate(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if state.is_paused() {
        return (StatusCode::OK, axum::Json(Envelope::paused())).into_response();
    }
    next.run(request).await
}

/// Create the router. `cross_origin` adds a permissive CORS layer that also
/// answers preflight requests before the gate sees them.
pub fn create_router(state: AppState, cross_origin: bool) -> Router {
    let queue_routes = Router::new()
        .route("/solidq/push/{address}", post(handlers::push))
        .route("/solidq/pop/{channel}/{count}", get(handlers::pop))
        .route("/solidq/count/{channel}", get(handlers::count))
        .route("/solidq/reset/{channel}", get(handlers::reset))
        .route("/solidq/channels/{tenant}", get(handlers::channels))
        .route("/solidq/listapps/{physical}", get(handlers::list_apps))
        .route("/solidq/stats/{tenant}", get(handlers::stats))
        .route_layer(middleware::from_fn_with_state(state.clone(), pause_gate));

    let router = Router::new()
        .route("/solidq/pause", get(handlers::pause))
        .route("/solidq/unpause", get(handlers::unpause))
        .merge(queue_routes)
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state);

    if cross_origin {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}

/// Bind `addr` and serve until `shutdown` is cancelled.
pub async fn serve(
    addr: SocketAddr,
    state: AppState,
    cross_origin: bool,
    shutdown: CancellationToken,
) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    serve_on(listener, state, cross_origin, shutdown).await
}

/// Serve on an already bound listener until `shutdown` is cancelled.
///
/// In-flight requests finish before this returns; open engines are then
/// closed so their file locks are released.
pub async fn serve_on(
    listener: TcpListener,
    state: AppState,
    cross_origin: bool,
    shutdown: CancellationToken,
) -> Result<()> {
    info!(addr = %listener.local_addr()?, "solidq listening");

    let app = create_router(state.clone(), cross_origin);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    info!("solidq stopped, closing tenants");
    state.registry.close_all()
}
