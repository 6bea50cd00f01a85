// Live event types shared by the REST submission endpoint and the STOMP
// MESSAGE frames pushed to subscribed clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventType {
    DirectMessage,
    VideoCallRequest,
    VideoCallDeny,
}

impl EventType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DirectMessage => "DIRECTMESSAGE",
            Self::VideoCallRequest => "VIDEOCALLREQUEST",
            Self::VideoCallDeny => "VIDEOCALLDENY",
        }
    }
}

/// Details of a video call request. Every field is optional on the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VideoCallPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rc_group_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_call_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initiator_username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initiator_rc_user_id: Option<String>,
}

/// Body of `POST /liveevent/send`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LiveEventMessage {
    pub event_type: EventType,
    pub user_ids: Vec<String>,
    #[serde(default, alias = "eventContent", skip_serializing_if = "Option::is_none")]
    pub video_call_payload: Option<VideoCallPayload>,
}

/// One emitted event. Each delivery to a session gets its own `id`, which the
/// client echoes back in its ACK frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveEvent {
    pub id: String,
    pub event_type: EventType,
    pub target_user_ids: Vec<String>,
    pub payload: Option<VideoCallPayload>,
    pub created_at: DateTime<Utc>,
}

impl LiveEvent {
    pub fn new(
        event_type: EventType,
        target_user_ids: Vec<String>,
        payload: Option<VideoCallPayload>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            event_type,
            target_user_ids,
            payload,
            created_at: Utc::now(),
        }
    }

    pub fn body(&self) -> LiveEventBody {
        LiveEventBody { event_type: self.event_type, event_content: self.payload.clone() }
    }
}

/// JSON body of the MESSAGE frame delivered to clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LiveEventBody {
    pub event_type: EventType,
    pub event_content: Option<VideoCallPayload>,
}
