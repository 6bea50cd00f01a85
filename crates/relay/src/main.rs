mod api;
mod auth;
mod config;
mod cors;
mod delivery;
mod error;
mod metrics;
mod registry;
mod stomp;
mod validation;
mod ws;

use anyhow::Context;
use axum::{
    body::Body,
    extract::{DefaultBodyLimit, State},
    http::{header::CONTENT_TYPE, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::{sync::Arc, time::Instant};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::auth::jwt::{JwtTokenVerifier, TokenVerifier};
use crate::config::RelayConfig;
use crate::delivery::{LiveEventDispatcher, RedeliveryPolicy};
use crate::error::{
    attach_request_id_header, request_id_from_headers_or_generate, with_request_id_scope,
    ErrorCode, RelayError,
};
use crate::metrics::RelayMetrics;
use crate::registry::{ConnectionRegistry, PendingDeliveryQueue};
use crate::stomp::{ClientInboundInterceptor, HandlerRegistry};
use crate::validation::MAX_REST_BODY_BYTES;
use crate::ws::{LiveSocketState, SessionOutbox};

/// Shared relay state, built once at startup.
#[derive(Clone)]
struct Relay {
    verifier: Arc<dyn TokenVerifier>,
    connections: Arc<ConnectionRegistry>,
    pending: Arc<PendingDeliveryQueue>,
    outbox: Arc<SessionOutbox>,
    interceptor: Arc<ClientInboundInterceptor>,
    dispatcher: Arc<LiveEventDispatcher>,
    metrics: Arc<RelayMetrics>,
}

impl Relay {
    fn new(verifier: Arc<dyn TokenVerifier>) -> anyhow::Result<Self> {
        let connections = Arc::new(ConnectionRegistry::default());
        let pending = Arc::new(PendingDeliveryQueue::default());
        let outbox = Arc::new(SessionOutbox::default());

        let handlers = HandlerRegistry::with_defaults(
            Arc::clone(&verifier),
            Arc::clone(&connections),
            Arc::clone(&pending),
        )
        .context("failed to register STOMP handlers")?;
        let dispatcher = Arc::new(LiveEventDispatcher::new(
            Arc::clone(&connections),
            Arc::clone(&pending),
            Arc::clone(&outbox),
        ));

        Ok(Self {
            verifier,
            connections,
            pending,
            outbox,
            interceptor: Arc::new(ClientInboundInterceptor::new(handlers)),
            dispatcher,
            metrics: Arc::new(RelayMetrics::default()),
        })
    }

    fn socket_state(&self) -> LiveSocketState {
        LiveSocketState {
            interceptor: Arc::clone(&self.interceptor),
            connections: Arc::clone(&self.connections),
            pending: Arc::clone(&self.pending),
            outbox: Arc::clone(&self.outbox),
            metrics: Arc::clone(&self.metrics),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = RelayConfig::from_env();
    init_tracing(&config)?;

    if config.is_dev_jwt_secret() {
        warn!("using the development JWT secret; set LIVE_RELAY_JWT_SECRET or LIVE_RELAY_JWT_PUBLIC_KEY");
    }

    let verifier = JwtTokenVerifier::from_config(&config).context("invalid JWT configuration")?;
    let relay = Relay::new(Arc::new(verifier))?;
    metrics::set_global_metrics(Arc::clone(&relay.metrics));

    let redelivery = delivery::spawn_redelivery_worker(
        Arc::clone(&relay.dispatcher),
        RedeliveryPolicy::from_config(&config),
    );

    let app = build_router(&relay, config.cors_origins.as_deref());
    let listener = TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind relay listener on {}", config.listen_addr))?;

    info!(listen_addr = %config.listen_addr, "starting live relay");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("relay server exited unexpectedly");
    redelivery.abort();
    served
}

fn init_tracing(config: &RelayConfig) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_new(&config.log_filter)
        .with_context(|| format!("invalid log filter `{}`", config.log_filter))?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let installed = if config.log_json { builder.json().try_init() } else { builder.try_init() };
    installed.map_err(anyhow::Error::msg).context("failed to install tracing subscriber")
}

fn build_router(relay: &Relay, cors_origins: Option<&str>) -> Router {
    let routes = Router::new()
        .route("/healthz", get(healthz))
        .merge(Router::new().route("/metrics", get(render_metrics)).with_state(Arc::clone(&relay.metrics)))
        .merge(ws::router(relay.socket_state()))
        .merge(api::router(Arc::clone(&relay.dispatcher)))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&relay.verifier),
            auth::middleware::require_bearer_auth,
        ));

    apply_middleware(routes, Arc::clone(&relay.metrics), cors_origins)
}

fn apply_middleware(router: Router, metrics: Arc<RelayMetrics>, cors_origins: Option<&str>) -> Router {
    router
        .layer(DefaultBodyLimit::max(MAX_REST_BODY_BYTES))
        .layer(middleware::from_fn_with_state(metrics, request_context_middleware))
        .layer(middleware::from_fn(panic_handler))
        .layer(cors::cors_layer(cors_origins))
}

async fn healthz() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

async fn render_metrics(State(metrics): State<Arc<RelayMetrics>>) -> impl IntoResponse {
    ([(CONTENT_TYPE, "text/plain; version=0.0.4")], metrics.render_prometheus())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            error!(error = %error, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                error!(error = %error, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received");
}

async fn panic_handler(request: Request<Body>, next: Next) -> Response {
    match tokio::spawn(async move { next.run(request).await }).await {
        Ok(response) => response,
        Err(join_error) => {
            error!(?join_error, "request handling panicked");
            RelayError::from_code(ErrorCode::InternalError).into_response()
        }
    }
}

async fn request_context_middleware(
    State(metrics): State<Arc<RelayMetrics>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let request_id = request_id_from_headers_or_generate(request.headers());
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let started_at = Instant::now();

    let mut response = with_request_id_scope(request_id.clone(), next.run(request)).await;
    attach_request_id_header(&mut response, &request_id);

    let latency_ms = started_at.elapsed().as_millis() as u64;
    metrics.record_http_request(method.as_str(), &path, response.status().as_u16(), latency_ms);
    info!(
        request_id = %request_id,
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        latency_ms,
        "request completed"
    );

    response
}
