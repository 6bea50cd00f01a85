use axum::{
    extract::{Extension, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use liveservice_common::protocol::live_event::LiveEventMessage;
use serde_json::json;
use tracing::info;

use super::ApiState;
use crate::auth::middleware::AuthenticatedUser;
use crate::error::{ErrorCode, RelayError};
use crate::validation::ValidatedJson;

/// `POST /liveevent/send`: pushes one live event to every live session of
/// the listed users.
pub async fn send_live_event(
    State(state): State<ApiState>,
    caller: Option<Extension<AuthenticatedUser>>,
    ValidatedJson(message): ValidatedJson<LiveEventMessage>,
) -> Response {
    if message.user_ids.is_empty() {
        return RelayError::new(ErrorCode::ValidationFailed, "userIds must not be empty")
            .with_details(json!({ "field": "userIds" }))
            .into_response();
    }

    let delivered = state.dispatcher.publish(&message);
    info!(
        caller = caller.as_ref().map(|Extension(user)| user.user_id.as_str()).unwrap_or("anonymous"),
        event_type = message.event_type.as_str(),
        recipients = message.user_ids.len(),
        delivered,
        "live event accepted"
    );

    StatusCode::OK.into_response()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{header::CONTENT_TYPE, Method, Request, StatusCode},
        Router,
    };
    use serde_json::{json, Value};
    use tokio::sync::mpsc;
    use tower::ServiceExt;

    use crate::api::router;
    use crate::delivery::LiveEventDispatcher;
    use crate::registry::{
        connection::Subscription, ConnectionRegistry, PendingDeliveryQueue, SessionId, UserId,
    };
    use crate::ws::SessionOutbox;

    struct Harness {
        app: Router,
        connections: Arc<ConnectionRegistry>,
        pending: Arc<PendingDeliveryQueue>,
        outbox: Arc<SessionOutbox>,
    }

    fn harness() -> Harness {
        let connections = Arc::new(ConnectionRegistry::default());
        let pending = Arc::new(PendingDeliveryQueue::default());
        let outbox = Arc::new(SessionOutbox::default());
        let dispatcher = Arc::new(LiveEventDispatcher::new(
            Arc::clone(&connections),
            Arc::clone(&pending),
            Arc::clone(&outbox),
        ));
        Harness { app: router(dispatcher), connections, pending, outbox }
    }

    fn send(body: impl Into<Body>, content_type: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method(Method::POST).uri("/liveevent/send");
        if let Some(content_type) = content_type {
            builder = builder.header(CONTENT_TYPE, content_type);
        }
        builder.body(body.into()).expect("request should build")
    }

    fn send_json(body: Value) -> Request<Body> {
        send(body.to_string(), Some("application/json"))
    }

    async fn status_and_body(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.expect("request should return a response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("readable body");
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn accepts_each_event_type() {
        for (event_type, payload) in [
            ("DIRECTMESSAGE", Value::Null),
            ("VIDEOCALLREQUEST", json!({})),
            ("VIDEOCALLDENY", Value::Null),
        ] {
            let (status, _) = status_and_body(
                harness().app,
                send_json(json!({
                    "eventType": event_type,
                    "userIds": ["1", "2"],
                    "videoCallPayload": payload,
                })),
            )
            .await;
            assert_eq!(status, StatusCode::OK, "{event_type} should be accepted");
        }
    }

    #[tokio::test]
    async fn rejects_missing_or_empty_user_ids() {
        for body in [json!({ "eventType": "DIRECTMESSAGE" }), json!({ "eventType": "DIRECTMESSAGE", "userIds": [] })]
        {
            let (status, parsed) = status_and_body(harness().app, send_json(body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(parsed["error"]["code"], "VALIDATION_FAILED");
        }
    }

    #[tokio::test]
    async fn rejects_missing_event_type_and_empty_body() {
        let (status, _) = status_and_body(harness().app, send_json(json!({ "userIds": ["1"] }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = status_and_body(harness().app, send("", Some("application/json"))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn rejects_unknown_event_type_and_non_json_bodies() {
        let (status, _) = status_and_body(
            harness().app,
            send_json(json!({ "eventType": "SOMETHINGELSE", "userIds": ["1"] })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) =
            status_and_body(harness().app, send("InvalidEventType", Some("application/json"))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = status_and_body(harness().app, send("{}", None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn valid_request_fans_out_to_subscribed_session() {
        let harness = harness();
        let session = SessionId::new("s-1");
        let (sender, mut receiver) = mpsc::unbounded_channel();
        harness.connections.add(UserId::new("validId"), session.clone());
        harness.connections.subscribe(
            &session,
            Subscription { id: "sub-0".into(), destination: "/user/events".into() },
        );
        harness.outbox.register(session, sender);

        let (status, _) = status_and_body(
            harness.app.clone(),
            send_json(json!({
                "eventType": "VIDEOCALLREQUEST",
                "userIds": ["validId"],
                "eventContent": { "videoCallUrl": "https://video.example/room" },
            })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let frame = receiver.try_recv().expect("MESSAGE frame should be queued");
        assert!(frame.starts_with("MESSAGE\n"));
        assert!(frame.contains("\"videoCallUrl\":\"https://video.example/room\""));
        assert_eq!(harness.pending.len(), 1);
    }

    #[tokio::test]
    async fn rejected_request_has_no_side_effects() {
        let harness = harness();
        let session = SessionId::new("s-1");
        let (sender, mut receiver) = mpsc::unbounded_channel();
        harness.connections.add(UserId::new("validId"), session.clone());
        harness.connections.subscribe(
            &session,
            Subscription { id: "sub-0".into(), destination: "/user/events".into() },
        );
        harness.outbox.register(session, sender);

        let (status, _) = status_and_body(
            harness.app.clone(),
            send_json(json!({ "eventType": "NOPE", "userIds": ["validId"] })),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(receiver.try_recv().is_err());
        assert!(harness.pending.is_empty());
    }
}
