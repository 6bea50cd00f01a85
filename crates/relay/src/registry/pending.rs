use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use liveservice_common::protocol::live_event::LiveEvent;
use tracing::debug;

use super::SessionId;

/// An event handed to the transport that the client has not acknowledged yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDelivery {
    pub event: LiveEvent,
    pub target_session: SessionId,
    pub sent_at: DateTime<Utc>,
    pub attempts: u32,
}

/// Outcome of one redelivery sweep.
#[derive(Debug, Default)]
pub struct DueDeliveries {
    /// Overdue entries to send again. Already stamped with the new attempt.
    pub resend: Vec<PendingDelivery>,
    /// Entries that used up their attempts and were evicted.
    pub expired: Vec<PendingDelivery>,
}

/// In-flight events keyed by event id.
#[derive(Debug, Default)]
pub struct PendingDeliveryQueue {
    entries: DashMap<String, PendingDelivery>,
}

impl PendingDeliveryQueue {
    pub fn enqueue(&self, event: LiveEvent, target_session: SessionId) {
        self.enqueue_at(event, target_session, Utc::now());
    }

    pub fn enqueue_at(&self, event: LiveEvent, target_session: SessionId, sent_at: DateTime<Utc>) {
        debug!(event_id = %event.id, session_id = %target_session, "delivery pending");
        self.entries.insert(
            event.id.clone(),
            PendingDelivery { event, target_session, sent_at, attempts: 1 },
        );
    }

    /// Settles the delivery for `id`. Unknown or already settled ids are a no-op.
    pub fn remove_identified_message_with_id(&self, id: &str) -> Option<PendingDelivery> {
        let removed = self.entries.remove(id).map(|(_, delivery)| delivery);
        if removed.is_none() {
            debug!(event_id = %id, "acknowledged id has no pending delivery");
        }
        removed
    }

    pub fn get(&self, id: &str) -> Option<PendingDelivery> {
        self.entries.get(id).map(|entry| entry.clone())
    }

    /// Collects entries unacknowledged for at least `ack_timeout`. Entries with
    /// attempts left are restamped for resend, the rest are evicted.
    pub fn collect_due(
        &self,
        now: DateTime<Utc>,
        ack_timeout: Duration,
        max_attempts: u32,
    ) -> DueDeliveries {
        let is_overdue = |delivery: &PendingDelivery| {
            now.signed_duration_since(delivery.sent_at)
                .to_std()
                .is_ok_and(|elapsed| elapsed >= ack_timeout)
        };

        let overdue_ids: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| is_overdue(entry.value()))
            .map(|entry| entry.key().clone())
            .collect();

        let mut due = DueDeliveries::default();
        for id in overdue_ids {
            // Re-check under the entry guard: an ACK may have landed meanwhile.
            let Entry::Occupied(mut entry) = self.entries.entry(id) else {
                continue;
            };
            if !is_overdue(entry.get()) {
                continue;
            }
            if entry.get().attempts >= max_attempts {
                due.expired.push(entry.remove());
            } else {
                let delivery = entry.get_mut();
                delivery.attempts += 1;
                delivery.sent_at = now;
                due.resend.push(delivery.clone());
            }
        }
        due
    }

    /// Evicts every entry addressed to `session_id`. Returns how many were dropped.
    pub fn drop_session(&self, session_id: &SessionId) -> usize {
        let mut dropped = 0;
        self.entries.retain(|_, delivery| {
            let keep = delivery.target_session != *session_id;
            if !keep {
                dropped += 1;
            }
            keep
        });
        dropped
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
