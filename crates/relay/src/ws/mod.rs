// STOMP-over-WebSocket endpoint.
//
// `/live` upgrades to a socket that speaks STOMP 1.2, one frame per text
// message. Authentication happens in-band on CONNECT, so the handshake path
// is exempt from bearer auth.

pub mod handler;
pub mod outbox;

use std::sync::Arc;

use axum::{routing::get, Router};

use crate::auth::middleware::LIVE_PATH;
use crate::metrics::RelayMetrics;
use crate::registry::{ConnectionRegistry, PendingDeliveryQueue};
use crate::stomp::ClientInboundInterceptor;

pub use outbox::SessionOutbox;

#[derive(Clone)]
pub struct LiveSocketState {
    pub interceptor: Arc<ClientInboundInterceptor>,
    pub connections: Arc<ConnectionRegistry>,
    pub pending: Arc<PendingDeliveryQueue>,
    pub outbox: Arc<SessionOutbox>,
    pub metrics: Arc<RelayMetrics>,
}

pub fn router(state: LiveSocketState) -> Router {
    Router::new()
        .route(LIVE_PATH, get(handler::ws_upgrade))
        .route(&format!("{LIVE_PATH}/{{*transport}}"), get(handler::ws_upgrade))
        .with_state(state)
}
