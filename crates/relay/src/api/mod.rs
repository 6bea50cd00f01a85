pub mod live_event;

use std::sync::Arc;

use axum::{routing::post, Router};

use crate::delivery::LiveEventDispatcher;

#[derive(Clone)]
pub struct ApiState {
    pub dispatcher: Arc<LiveEventDispatcher>,
}

/// REST surface for upstream services. Bearer auth is applied by the
/// top-level router.
pub fn router(dispatcher: Arc<LiveEventDispatcher>) -> Router {
    Router::new()
        .route("/liveevent/send", post(live_event::send_live_event))
        .with_state(ApiState { dispatcher })
}
