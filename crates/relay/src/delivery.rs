// Live event fan-out and acknowledgement-driven redelivery.
//
// `LiveEventDispatcher::publish` turns one REST request into one MESSAGE
// frame per subscribed session of each target user. Every frame is tracked
// in the pending queue until the client ACKs it; the redelivery worker
// resends overdue frames and gives up after the configured attempts.

use std::{collections::HashSet, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use liveservice_common::protocol::{
    live_event::{LiveEvent, LiveEventMessage},
    stomp::{
        encode_frame, Command, StompFrame, ACK_HEADER, CONTENT_TYPE_HEADER, DESTINATION_HEADER,
        MESSAGE_ID_HEADER, SUBSCRIPTION_HEADER,
    },
};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::RelayConfig;
use crate::metrics;
use crate::registry::{
    connection::Subscription, ConnectionRegistry, PendingDeliveryQueue, SessionId, UserId,
};
use crate::ws::outbox::SessionOutbox;

/// When and how often unacknowledged deliveries are resent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedeliveryPolicy {
    pub interval: Duration,
    pub ack_timeout: Duration,
    pub max_attempts: u32,
}

impl RedeliveryPolicy {
    pub fn from_config(config: &RelayConfig) -> Self {
        Self {
            interval: config.redelivery_interval,
            ack_timeout: config.ack_timeout,
            max_attempts: config.max_delivery_attempts,
        }
    }
}

/// Result of one redelivery sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepOutcome {
    pub resent: usize,
    pub expired: usize,
    pub orphaned: usize,
}

pub struct LiveEventDispatcher {
    connections: Arc<ConnectionRegistry>,
    pending: Arc<PendingDeliveryQueue>,
    outbox: Arc<SessionOutbox>,
}

impl LiveEventDispatcher {
    pub fn new(
        connections: Arc<ConnectionRegistry>,
        pending: Arc<PendingDeliveryQueue>,
        outbox: Arc<SessionOutbox>,
    ) -> Self {
        Self { connections, pending, outbox }
    }

    /// Sends the event to every subscribed session of each target user.
    /// Users without a session are skipped. Returns the number of frames sent.
    pub fn publish(&self, message: &LiveEventMessage) -> usize {
        metrics::record_event_published();

        let mut seen = HashSet::new();
        let mut delivered = 0;
        for user_id in message.user_ids.iter().filter(|id| seen.insert(id.as_str())) {
            let user_id = UserId::new(user_id.as_str());
            let sessions = self.connections.lookup(&user_id);
            if sessions.is_empty() {
                debug!(user_id = %user_id, event_type = message.event_type.as_str(), "user has no live session");
                continue;
            }

            for session_id in sessions {
                let Some(subscription) = self.connections.subscription_of(&session_id) else {
                    debug!(session_id = %session_id, "session has no subscription yet");
                    continue;
                };

                let event = LiveEvent::new(
                    message.event_type,
                    vec![user_id.as_str().to_owned()],
                    message.video_call_payload.clone(),
                );
                if self.deliver(event, session_id, &subscription) {
                    delivered += 1;
                }
            }
        }

        metrics::set_pending_deliveries(self.pending.len());
        info!(event_type = message.event_type.as_str(), delivered, "live event published");
        delivered
    }

    /// Resends overdue deliveries and evicts the ones out of attempts.
    pub fn sweep(&self, now: DateTime<Utc>, policy: &RedeliveryPolicy) -> SweepOutcome {
        let due = self.pending.collect_due(now, policy.ack_timeout, policy.max_attempts);
        let mut outcome = SweepOutcome { expired: due.expired.len(), ..SweepOutcome::default() };

        for delivery in due.expired {
            metrics::record_event_expired();
            warn!(
                event_id = %delivery.event.id,
                session_id = %delivery.target_session,
                attempts = delivery.attempts,
                "delivery expired unacknowledged"
            );
        }

        for delivery in due.resend {
            let sent = self
                .connections
                .subscription_of(&delivery.target_session)
                .and_then(|subscription| message_frame(&delivery.event, &subscription))
                .is_some_and(|frame| self.outbox.send(&delivery.target_session, frame));

            if sent {
                metrics::record_event_redelivered();
                debug!(event_id = %delivery.event.id, attempt = delivery.attempts, "delivery resent");
                outcome.resent += 1;
            } else {
                self.pending.remove_identified_message_with_id(&delivery.event.id);
                outcome.orphaned += 1;
            }
        }

        metrics::set_pending_deliveries(self.pending.len());
        outcome
    }

    fn deliver(&self, event: LiveEvent, session_id: SessionId, subscription: &Subscription) -> bool {
        let Some(frame) = message_frame(&event, subscription) else {
            return false;
        };

        // Tracked before the send so an immediate ACK finds the entry.
        let event_id = event.id.clone();
        self.pending.enqueue(event, session_id.clone());
        if !self.outbox.send(&session_id, frame) {
            self.pending.remove_identified_message_with_id(&event_id);
            debug!(session_id = %session_id, "session closed before delivery");
            return false;
        }

        metrics::record_event_delivered();
        true
    }
}

fn message_frame(event: &LiveEvent, subscription: &Subscription) -> Option<String> {
    let body = match serde_json::to_string(&event.body()) {
        Ok(body) => body,
        Err(error) => {
            warn!(event_id = %event.id, error = %error, "failed to encode live event body");
            return None;
        }
    };

    let frame = StompFrame::new(Command::Message)
        .with_header(DESTINATION_HEADER, subscription.destination.as_str())
        .with_header(SUBSCRIPTION_HEADER, subscription.id.as_str())
        .with_header(MESSAGE_ID_HEADER, event.id.as_str())
        .with_header(ACK_HEADER, event.id.as_str())
        .with_header(CONTENT_TYPE_HEADER, "application/json")
        .with_body(body);
    Some(encode_frame(&frame))
}

/// Spawns the periodic redelivery sweep. Runs until the runtime shuts down.
pub fn spawn_redelivery_worker(
    dispatcher: Arc<LiveEventDispatcher>,
    policy: RedeliveryPolicy,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(policy.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        interval.reset();
        loop {
            interval.tick().await;
            let outcome = dispatcher.sweep(Utc::now(), &policy);
            if outcome != SweepOutcome::default() {
                debug!(
                    resent = outcome.resent,
                    expired = outcome.expired,
                    orphaned = outcome.orphaned,
                    "redelivery sweep"
                );
            }
        }
    })
}
