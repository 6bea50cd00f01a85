// Inbound STOMP command dispatch.
//
// Every decoded WebSocket message passes through `ClientInboundInterceptor`,
// which looks the command up in the `HandlerRegistry` and runs the matching
// `StompHandler` against the shared connection and delivery state.

pub mod handlers;
pub mod interceptor;
pub mod registry;

use liveservice_common::protocol::stomp::{Command, StompFrame};
use thiserror::Error;

use crate::auth::jwt::VerificationError;
use crate::registry::SessionId;

pub use interceptor::ClientInboundInterceptor;
pub use registry::{HandlerRegistry, RegistryError};

/// One inbound message and the session it arrived on. `frame` is `None` for
/// payloads that carry no STOMP frame, such as heartbeats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    session_id: SessionId,
    frame: Option<StompFrame>,
}

impl Message {
    pub fn new(session_id: SessionId, frame: StompFrame) -> Self {
        Self { session_id, frame: Some(frame) }
    }

    pub fn without_frame(session_id: SessionId) -> Self {
        Self { session_id, frame: None }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn frame(&self) -> Option<&StompFrame> {
        self.frame.as_ref()
    }

    pub fn command(&self) -> Option<Command> {
        self.frame.as_ref().map(StompFrame::command)
    }

    pub fn first_native_header(&self, name: &str) -> Option<&str> {
        self.frame.as_ref().and_then(|frame| frame.first_native_header(name))
    }
}

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("invalid access token")]
    InvalidAccessToken(#[source] VerificationError),
}

/// Unit of work bound to exactly one STOMP command.
pub trait StompHandler: Send + Sync {
    fn supported_command(&self) -> Command;

    fn handle(&self, message: &Message) -> Result<(), HandlerError>;
}
