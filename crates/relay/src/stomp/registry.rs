use std::{collections::HashMap, sync::Arc};

use liveservice_common::protocol::stomp::Command;
use thiserror::Error;

use super::{
    handlers::{
        AcknowledgeHandler, ConnectHandler, DisconnectHandler, ErrorHandler, SubscribeHandler,
    },
    StompHandler,
};
use crate::auth::jwt::TokenVerifier;
use crate::registry::{ConnectionRegistry, PendingDeliveryQueue};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("more than one handler registered for {0}")]
    DuplicateHandler(Command),
}

/// Command → handler lookup, fixed at startup.
pub struct HandlerRegistry {
    handlers: HashMap<Command, Box<dyn StompHandler>>,
}

impl HandlerRegistry {
    /// Builds the registry from the complete handler set. Two handlers
    /// declaring the same command is a configuration error.
    pub fn new(handlers: Vec<Box<dyn StompHandler>>) -> Result<Self, RegistryError> {
        let mut by_command = HashMap::with_capacity(handlers.len());
        for handler in handlers {
            let command = handler.supported_command();
            if by_command.insert(command, handler).is_some() {
                return Err(RegistryError::DuplicateHandler(command));
            }
        }
        Ok(Self { handlers: by_command })
    }

    /// The relay's handler set: CONNECT, SUBSCRIBE, DISCONNECT, ERROR and ACK.
    pub fn with_defaults(
        verifier: Arc<dyn TokenVerifier>,
        connections: Arc<ConnectionRegistry>,
        pending: Arc<PendingDeliveryQueue>,
    ) -> Result<Self, RegistryError> {
        Self::new(vec![
            Box::new(ConnectHandler::new(verifier, Arc::clone(&connections), Arc::clone(&pending))),
            Box::new(SubscribeHandler::new(Arc::clone(&connections))),
            Box::new(DisconnectHandler::new(Arc::clone(&connections))),
            Box::new(ErrorHandler::new(connections)),
            Box::new(AcknowledgeHandler::new(pending)),
        ])
    }

    pub fn retrieve(&self, command: Command) -> Option<&dyn StompHandler> {
        self.handlers.get(&command).map(AsRef::as_ref)
    }

    pub fn commands(&self) -> impl Iterator<Item = Command> + '_ {
        self.handlers.keys().copied()
    }
}
