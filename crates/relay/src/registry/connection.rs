use std::collections::HashSet;

use dashmap::{mapref::entry::Entry, DashMap};
use tracing::debug;

use super::{SessionId, UserId};

/// STOMP subscription a session opened with SUBSCRIBE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub id: String,
    pub destination: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SessionBinding {
    user_id: UserId,
    subscription: Option<Subscription>,
}

/// Users mapped to their live sessions, plus the reverse session → user index.
///
/// Both maps are sharded, so traffic for unrelated users never contends on a
/// common lock. Every read-modify-write of a user's session set happens under
/// that key's entry guard, and no guard on one map is held while the other is
/// touched.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    users: DashMap<UserId, HashSet<SessionId>>,
    sessions: DashMap<SessionId, SessionBinding>,
}

impl ConnectionRegistry {
    /// Binds `session_id` to `user_id`. Idempotent; a session previously bound
    /// to another user is moved, and that user is returned.
    pub fn add(&self, user_id: UserId, session_id: SessionId) -> Option<UserId> {
        let previous_owner = match self.sessions.entry(session_id.clone()) {
            Entry::Occupied(mut entry) if entry.get().user_id != user_id => {
                let binding = entry.get_mut();
                binding.subscription = None;
                Some(std::mem::replace(&mut binding.user_id, user_id.clone()))
            }
            Entry::Occupied(_) => None,
            Entry::Vacant(entry) => {
                entry.insert(SessionBinding { user_id: user_id.clone(), subscription: None });
                None
            }
        };

        self.users.entry(user_id.clone()).or_default().insert(session_id.clone());

        if let Some(previous_owner) = &previous_owner {
            self.detach(previous_owner, &session_id);
        }

        debug!(user_id = %user_id, session_id = %session_id, "session registered");
        previous_owner
    }

    /// Unbinds `session_id` from whichever user owns it. Returns that user, or
    /// `None` when the session was unknown.
    pub fn remove(&self, session_id: &SessionId) -> Option<UserId> {
        let (_, binding) = self.sessions.remove(session_id)?;
        self.detach(&binding.user_id, session_id);
        debug!(user_id = %binding.user_id, session_id = %session_id, "session unregistered");
        Some(binding.user_id)
    }

    /// Current sessions of `user_id`, empty when the user holds none.
    pub fn lookup(&self, user_id: &UserId) -> HashSet<SessionId> {
        self.users.get(user_id).map(|sessions| sessions.clone()).unwrap_or_default()
    }

    /// Records the subscription of a registered session. Returns `false` when
    /// the session is not registered.
    pub fn subscribe(&self, session_id: &SessionId, subscription: Subscription) -> bool {
        match self.sessions.get_mut(session_id) {
            Some(mut binding) => {
                binding.subscription = Some(subscription);
                true
            }
            None => false,
        }
    }

    pub fn subscription_of(&self, session_id: &SessionId) -> Option<Subscription> {
        self.sessions.get(session_id).and_then(|binding| binding.subscription.clone())
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    fn detach(&self, user_id: &UserId, session_id: &SessionId) {
        if let Entry::Occupied(mut entry) = self.users.entry(user_id.clone()) {
            entry.get_mut().remove(session_id);
            if entry.get().is_empty() {
                entry.remove();
            }
        }
    }
}
