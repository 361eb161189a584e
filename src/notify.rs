// =============================================================================
// Outbound notifications — fire-and-forget event dispatch
// =============================================================================
//
// The engines report elastic level crossings and applied stop updates to an
// external bridge. Delivery is best-effort and at-most-once: events queue on
// a bounded channel, a single worker drains it, and transport failures are
// logged and never retried. If the condition persists, the next cycle emits
// a fresh event anyway.
// =============================================================================

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

// =============================================================================
// Event payloads
// =============================================================================

/// Event body, tagged on the wire with `event_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum NotificationKind {
    #[serde(rename = "ELASTIC_UPDATE")]
    ElasticUpdate {
        base_id: String,
        profit: f64,
        level: i64,
    },
    #[serde(rename = "TRAILING_STOP_UPDATE")]
    TrailingStopUpdate {
        base_id: String,
        stop_price: f64,
        current_price: f64,
    },
}

/// One outbound event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: NotificationKind,
}

impl Notification {
    pub fn elastic_update(base_id: &str, profit: f64, level: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            kind: NotificationKind::ElasticUpdate {
                base_id: base_id.to_string(),
                profit,
                level,
            },
        }
    }

    pub fn trailing_stop_update(base_id: &str, stop_price: f64, current_price: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            kind: NotificationKind::TrailingStopUpdate {
                base_id: base_id.to_string(),
                stop_price,
                current_price,
            },
        }
    }
}

// =============================================================================
// Transport & outbox
// =============================================================================

/// Delivery seam to the external bridge. Implementations return the bridge's
/// own failure text on error.
pub trait NotificationTransport: Send + Sync {
    fn send(&self, notification: &Notification) -> Result<(), String>;
}

/// Cheap cloneable handle the engines enqueue through.
#[derive(Clone)]
pub struct NotificationOutbox {
    tx: mpsc::Sender<Notification>,
}

impl NotificationOutbox {
    /// Enqueue without blocking. A full queue drops the event with a warning
    /// — delivery is at-most-once by design.
    pub fn dispatch(&self, notification: Notification) {
        if let Err(err) = self.tx.try_send(notification) {
            warn!(%err, "notification queue full, dropping event");
        }
    }
}

/// Spawn the dispatch worker. Returns the outbox handle plus the worker task
/// so the host can await it on shutdown (it ends when the last outbox clone
/// is dropped).
pub fn spawn_dispatcher(
    transport: Arc<dyn NotificationTransport>,
    capacity: usize,
) -> (NotificationOutbox, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<Notification>(capacity.max(1));

    let handle = tokio::spawn(async move {
        while let Some(notification) = rx.recv().await {
            match transport.send(&notification) {
                Ok(()) => {
                    debug!(id = %notification.id, "notification delivered");
                }
                Err(err) => {
                    // No retry: the next cycle re-emits if still relevant.
                    warn!(id = %notification.id, %err, "notification delivery failed");
                }
            }
        }
    });

    (NotificationOutbox { tx }, handle)
}
