use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::registry::SessionId;

/// Per-session channels into the socket tasks. Payloads are encoded STOMP
/// frames, written to the socket as-is.
#[derive(Debug, Default)]
pub struct SessionOutbox {
    senders: DashMap<SessionId, mpsc::UnboundedSender<String>>,
}

impl SessionOutbox {
    pub fn register(&self, session_id: SessionId, sender: mpsc::UnboundedSender<String>) {
        self.senders.insert(session_id, sender);
    }

    pub fn unregister(&self, session_id: &SessionId) {
        self.senders.remove(session_id);
    }

    /// Queues `payload` for the session. False when the session has no open
    /// socket.
    pub fn send(&self, session_id: &SessionId, payload: String) -> bool {
        self.senders.get(session_id).is_some_and(|sender| sender.send(payload).is_ok())
    }

    pub fn len(&self) -> usize {
        self.senders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_reaches_registered_session_only() {
        let outbox = SessionOutbox::default();
        let (sender, mut receiver) = mpsc::unbounded_channel();
        outbox.register(SessionId::new("s-1"), sender);

        assert!(outbox.send(&SessionId::new("s-1"), "MESSAGE\n\n\0".into()));
        assert!(!outbox.send(&SessionId::new("s-2"), "MESSAGE\n\n\0".into()));
        assert_eq!(receiver.try_recv().ok().as_deref(), Some("MESSAGE\n\n\0"));
    }

    #[test]
    fn send_fails_after_unregister_or_closed_receiver() {
        let outbox = SessionOutbox::default();
        let (sender, receiver) = mpsc::unbounded_channel();
        outbox.register(SessionId::new("s-1"), sender);
        drop(receiver);
        assert!(!outbox.send(&SessionId::new("s-1"), "x".into()));

        let (sender, _receiver) = mpsc::unbounded_channel();
        outbox.register(SessionId::new("s-1"), sender);
        outbox.unregister(&SessionId::new("s-1"));
        assert!(outbox.is_empty());
        assert!(!outbox.send(&SessionId::new("s-1"), "x".into()));
    }
}
