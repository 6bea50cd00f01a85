use tracing::{debug, trace};

use super::{HandlerError, HandlerRegistry, Message};

/// Routes each inbound message to the handler registered for its command.
pub struct ClientInboundInterceptor {
    handlers: HandlerRegistry,
}

impl ClientInboundInterceptor {
    pub fn new(handlers: HandlerRegistry) -> Self {
        let mut commands: Vec<&str> = handlers.commands().map(|command| command.as_str()).collect();
        commands.sort_unstable();
        debug!(?commands, "STOMP handlers registered");
        Self { handlers }
    }

    /// Runs the matching handler, if any, and hands the message back
    /// unchanged. Messages without a frame or with an unhandled command pass
    /// straight through. A handler fault is returned to the transport.
    pub fn intercept<'m>(&self, message: &'m Message) -> Result<&'m Message, HandlerError> {
        let Some(command) = message.command() else {
            return Ok(message);
        };

        match self.handlers.retrieve(command) {
            Some(handler) => handler.handle(message)?,
            None => trace!(session_id = %message.session_id(), %command, "no handler for command"),
        }
        Ok(message)
    }
}
