//! Background polling for open conversations.
//!
//! One task per open conversation fetches the shared snapshot at a fixed
//! interval and folds it into the local [`ConversationView`].  Transient
//! fetch failures keep the last snapshot and are retried on the next tick.
//! The loop ends on shutdown or when the conversation closes.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch, Notify};
use tracing::{debug, info, warn};
use uuid::Uuid;

use helpline_shared::Ticket;

use crate::api::TicketApi;
use crate::error::ClientError;
use crate::events::ConversationEvent;
use crate::view::{ConversationView, PollOutcome};

/// Read side of the conversation API, as much as the poller needs.
#[async_trait]
pub trait TicketFeed: Send + Sync {
    async fn fetch(&self, ticket_id: Uuid) -> Result<Ticket, ClientError>;
}

#[async_trait]
impl TicketFeed for TicketApi {
    async fn fetch(&self, ticket_id: Uuid) -> Result<Ticket, ClientError> {
        self.fetch_ticket(ticket_id).await
    }
}

/// Handle returned to the caller so it can trigger an immediate poll or
/// shut the loop down.
pub struct PollerHandle {
    /// Notify to wake the loop early (e.g. right after sending a reply).
    pub wake: Arc<Notify>,
    /// Send `true` to shut down.
    pub shutdown_tx: watch::Sender<bool>,
}

/// Spawn the poll loop as a tokio task.  Returns a `JoinHandle` and a
/// [`PollerHandle`] for control.
///
/// Events describing what changed are pushed into `events`; the embedding
/// frontend decides how to render them.
pub fn spawn_poller(
    feed: Arc<dyn TicketFeed>,
    view: Arc<Mutex<ConversationView>>,
    interval: Duration,
    events: mpsc::UnboundedSender<ConversationEvent>,
) -> (tokio::task::JoinHandle<()>, PollerHandle) {
    let wake = Arc::new(Notify::new());
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    let wake_clone = wake.clone();

    let handle = tokio::spawn(async move {
        info!(interval_secs = interval.as_secs(), "Conversation poller started");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = wake_clone.notified() => {
                    debug!("Poller woken early");
                }
                res = shutdown_rx.changed() => {
                    // A dropped handle also stops the loop.
                    if res.is_err() || *shutdown_rx.borrow() {
                        info!("Conversation poller shutting down");
                        return;
                    }
                }
            }

            // Check shutdown again after wakeup.
            if *shutdown_rx.borrow() {
                return;
            }

            let ticket_id = match view.lock() {
                Ok(guard) => guard.ticket().id,
                Err(_) => {
                    warn!("Conversation view lock poisoned, stopping poller");
                    return;
                }
            };

            let fresh = match feed.fetch(ticket_id).await {
                Ok(ticket) => ticket,
                Err(e) => {
                    debug!(ticket = %ticket_id, error = %e, "Poll failed, will retry");
                    continue;
                }
            };

            let (outcome, status, closed) = match view.lock() {
                Ok(mut guard) => {
                    let outcome = guard.apply_poll(fresh);
                    (outcome, guard.ticket().status, guard.is_closed())
                }
                Err(_) => {
                    warn!("Conversation view lock poisoned, stopping poller");
                    return;
                }
            };

            if let PollOutcome::Updated {
                new_messages,
                status_changed,
            } = outcome
            {
                if new_messages > 0 {
                    let _ = events.send(ConversationEvent::MessagesUpdated { new_messages });
                }
                if status_changed {
                    let _ = events.send(ConversationEvent::StatusChanged { status });
                }
            }

            if closed {
                let _ = events.send(ConversationEvent::ConversationClosed);
                info!(ticket = %ticket_id, "Conversation closed, poller stopping");
                return;
            }
        }
    });

    (handle, PollerHandle { wake, shutdown_tx })
}
