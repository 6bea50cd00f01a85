use std::sync::Arc;

use liveservice_common::protocol::stomp::{
    Command, ACCESS_TOKEN_HEADER, DESTINATION_HEADER, ID_HEADER,
};
use tracing::{debug, info, warn};

use super::{HandlerError, Message, StompHandler};
use crate::auth::jwt::TokenVerifier;
use crate::metrics;
use crate::registry::{connection::Subscription, ConnectionRegistry, PendingDeliveryQueue};

/// Authenticates the session with the `accessToken` native header and binds
/// it to the resolved user. This is the only authentication on `/live`.
pub struct ConnectHandler {
    verifier: Arc<dyn TokenVerifier>,
    connections: Arc<ConnectionRegistry>,
    pending: Arc<PendingDeliveryQueue>,
}

impl ConnectHandler {
    pub fn new(
        verifier: Arc<dyn TokenVerifier>,
        connections: Arc<ConnectionRegistry>,
        pending: Arc<PendingDeliveryQueue>,
    ) -> Self {
        Self { verifier, connections, pending }
    }
}

impl StompHandler for ConnectHandler {
    fn supported_command(&self) -> Command {
        Command::Connect
    }

    fn handle(&self, message: &Message) -> Result<(), HandlerError> {
        let Some(frame) = message.frame() else {
            return Ok(());
        };

        let token = frame.first_native_header(ACCESS_TOKEN_HEADER).unwrap_or_default();
        let user_id = self.verifier.verify(token).map_err(|error| {
            warn!(session_id = %message.session_id(), error = %error, "rejected STOMP connect");
            metrics::record_connect_rejected();
            HandlerError::InvalidAccessToken(error)
        })?;

        info!(session_id = %message.session_id(), user_id = %user_id, "STOMP session connected");
        if let Some(previous_owner) = self.connections.add(user_id, message.session_id().clone()) {
            // In-flight events still belong to the previous owner.
            let dropped = self.pending.drop_session(message.session_id());
            warn!(
                session_id = %message.session_id(),
                previous_user_id = %previous_owner,
                dropped_pending = dropped,
                "session changed owner"
            );
        }
        Ok(())
    }
}

/// Records the session's subscription so live events can be addressed to it.
pub struct SubscribeHandler {
    connections: Arc<ConnectionRegistry>,
}

impl SubscribeHandler {
    pub fn new(connections: Arc<ConnectionRegistry>) -> Self {
        Self { connections }
    }
}

impl StompHandler for SubscribeHandler {
    fn supported_command(&self) -> Command {
        Command::Subscribe
    }

    fn handle(&self, message: &Message) -> Result<(), HandlerError> {
        let Some(frame) = message.frame() else {
            return Ok(());
        };

        let (Some(id), Some(destination)) =
            (frame.first_native_header(ID_HEADER), frame.first_native_header(DESTINATION_HEADER))
        else {
            debug!(session_id = %message.session_id(), "SUBSCRIBE without id or destination ignored");
            return Ok(());
        };

        let subscription = Subscription { id: id.to_owned(), destination: destination.to_owned() };
        if !self.connections.subscribe(message.session_id(), subscription) {
            warn!(session_id = %message.session_id(), "SUBSCRIBE from unregistered session ignored");
        }
        Ok(())
    }
}

/// Unbinds the session on a client DISCONNECT.
pub struct DisconnectHandler {
    connections: Arc<ConnectionRegistry>,
}

impl DisconnectHandler {
    pub fn new(connections: Arc<ConnectionRegistry>) -> Self {
        Self { connections }
    }
}

impl StompHandler for DisconnectHandler {
    fn supported_command(&self) -> Command {
        Command::Disconnect
    }

    fn handle(&self, message: &Message) -> Result<(), HandlerError> {
        if message.frame().is_some() {
            self.connections.remove(message.session_id());
        }
        Ok(())
    }
}

/// Unbinds the session when it reports an ERROR.
pub struct ErrorHandler {
    connections: Arc<ConnectionRegistry>,
}

impl ErrorHandler {
    pub fn new(connections: Arc<ConnectionRegistry>) -> Self {
        Self { connections }
    }
}

impl StompHandler for ErrorHandler {
    fn supported_command(&self) -> Command {
        Command::Error
    }

    fn handle(&self, message: &Message) -> Result<(), HandlerError> {
        if message.frame().is_some() {
            warn!(session_id = %message.session_id(), "session reported a STOMP error");
            self.connections.remove(message.session_id());
        }
        Ok(())
    }
}

/// Settles the pending delivery named by the ACK frame's `id` header.
pub struct AcknowledgeHandler {
    pending: Arc<PendingDeliveryQueue>,
}

impl AcknowledgeHandler {
    pub fn new(pending: Arc<PendingDeliveryQueue>) -> Self {
        Self { pending }
    }
}

impl StompHandler for AcknowledgeHandler {
    fn supported_command(&self) -> Command {
        Command::Ack
    }

    fn handle(&self, message: &Message) -> Result<(), HandlerError> {
        let Some(frame) = message.frame() else {
            return Ok(());
        };

        let Some(id) = frame.first_native_header(ID_HEADER) else {
            debug!(session_id = %message.session_id(), "ACK without id header ignored");
            return Ok(());
        };

        if self.pending.remove_identified_message_with_id(id).is_some() {
            metrics::record_event_acked();
        }
        Ok(())
    }
}
