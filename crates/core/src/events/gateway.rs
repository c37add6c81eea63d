//! Live update gateway: per-subscriber filtered, masked event streams.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{EventBus, TriageEvent, TICKETS_UPDATED_CHANNEL};
use crate::auth::Identity;
use crate::metrics::LIVE_EVENTS_DROPPED;
use crate::ticket::{can_view, masked};

type Registry = Arc<Mutex<HashMap<u64, SessionEntry>>>;

struct SessionEntry {
    identity: Identity,
    connected_at: DateTime<Utc>,
    reader: JoinHandle<()>,
}

/// Snapshot of a connected subscriber.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: u64,
    pub user_id: String,
    pub role: String,
    pub connected_at: DateTime<Utc>,
}

/// A connected subscriber. Dropping it unsubscribes.
pub struct LiveSession {
    id: u64,
    identity: Identity,
    rx: mpsc::Receiver<TriageEvent>,
    registry: Registry,
}

impl LiveSession {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Next event visible to this subscriber, already masked.
    ///
    /// Returns `None` once the session has been disconnected or the gateway
    /// shut down.
    pub async fn recv(&mut self) -> Option<TriageEvent> {
        self.rx.recv().await
    }
}

impl Drop for LiveSession {
    fn drop(&mut self) {
        if let Some(entry) = lock(&self.registry).remove(&self.id) {
            entry.reader.abort();
            debug!(session_id = self.id, user_id = %self.identity.user_id, "Live session closed");
        }
    }
}

/// Fans bus events out to connected subscribers.
///
/// Each session owns one bus subscription and one reader task. Agents get
/// every event unmasked; customers get only their own tickets' events with
/// the customer mask applied.
pub struct LiveUpdateGateway {
    bus: Arc<EventBus>,
    channel: String,
    buffer: usize,
    sessions: Registry,
    next_id: AtomicU64,
}

impl LiveUpdateGateway {
    pub fn new(bus: Arc<EventBus>, buffer: usize) -> Self {
        Self {
            bus,
            channel: TICKETS_UPDATED_CHANNEL.to_string(),
            buffer: buffer.max(1),
            sessions: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a subscriber whose identity was established at connect time.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(&self, identity: Identity) -> LiveSession {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let bus_rx = self.bus.subscribe(&self.channel);
        let (tx, rx) = mpsc::channel(self.buffer);

        let reader = tokio::spawn(forward_events(id, identity.clone(), bus_rx, tx));

        lock(&self.sessions).insert(
            id,
            SessionEntry {
                identity: identity.clone(),
                connected_at: Utc::now(),
                reader,
            },
        );

        info!(session_id = id, user_id = %identity.user_id, role = %identity.role, "Live session opened");

        LiveSession {
            id,
            identity,
            rx,
            registry: Arc::clone(&self.sessions),
        }
    }

    /// Remove a session by id. Its `recv` then returns `None`.
    pub fn disconnect(&self, id: u64) -> bool {
        match lock(&self.sessions).remove(&id) {
            Some(entry) => {
                entry.reader.abort();
                true
            }
            None => false,
        }
    }

    /// Number of connected sessions.
    pub fn active_sessions(&self) -> usize {
        lock(&self.sessions).len()
    }

    /// Connected sessions, oldest first.
    pub fn sessions(&self) -> Vec<SessionInfo> {
        let mut sessions: Vec<SessionInfo> = lock(&self.sessions)
            .iter()
            .map(|(id, entry)| SessionInfo {
                id: *id,
                user_id: entry.identity.user_id.clone(),
                role: entry.identity.role.to_string(),
                connected_at: entry.connected_at,
            })
            .collect();
        sessions.sort_by_key(|s| s.id);
        sessions
    }

    /// Disconnect every session.
    pub fn shutdown(&self) {
        let drained: Vec<SessionEntry> = lock(&self.sessions).drain().map(|(_, e)| e).collect();
        let count = drained.len();
        for entry in drained {
            entry.reader.abort();
        }
        if count > 0 {
            info!(count, "Closed live sessions");
        }
    }
}

async fn forward_events(
    session_id: u64,
    identity: Identity,
    mut bus_rx: tokio::sync::broadcast::Receiver<TriageEvent>,
    tx: mpsc::Sender<TriageEvent>,
) {
    loop {
        match bus_rx.recv().await {
            Ok(event) => {
                if !can_view(&identity, &event.customer_id) {
                    continue;
                }
                match tx.try_send(masked(identity.role, event)) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(event)) => {
                        LIVE_EVENTS_DROPPED.with_label_values(&["full"]).inc();
                        debug!(
                            session_id,
                            ticket_id = %event.ticket_id,
                            "Live session buffer full, dropping event"
                        );
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => break,
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                LIVE_EVENTS_DROPPED
                    .with_label_values(&["lagged"])
                    .inc_by(skipped);
                warn!(session_id, skipped, "Live session lagged behind event bus");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

fn lock(registry: &Mutex<HashMap<u64, SessionEntry>>) -> MutexGuard<'_, HashMap<u64, SessionEntry>> {
    registry.lock().unwrap_or_else(|e| e.into_inner())
}
