use crate::packet::Packet;
use crate::session::{enqueue_with_timeout, ClientSession};
use bytes::Bytes;
use futures::future::join_all;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::time::Duration;
use voxmap_common::types::{Result, SessionId};
use voxmap_common::VoxmapError;
use voxmap_logger::log::log;
use voxmap_logger::severity::LogSeverity::{Debug, Warning};

const EVENT_CAPACITY: usize = 256;

pub const OVERFLOW_REASON: &str = "outbound queue overflow";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Connected {
        id: SessionId,
        peer: Option<SocketAddr>,
    },
    Disconnected {
        id: SessionId,
        reason: String,
    },
}

/// What happened to one recipient of a broadcast
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// The session's connection was already gone
    Closed,
    /// The session's queue stayed full past the send timeout; it was disconnected
    TimedOut,
}

#[derive(Debug, Default)]
pub struct BroadcastReport {
    pub deliveries: Vec<(SessionId, Delivery)>,
}

impl BroadcastReport {
    pub fn recipients(&self) -> usize {
        self.deliveries.len()
    }

    pub fn delivered(&self) -> usize {
        self.deliveries
            .iter()
            .filter(|(_, delivery)| *delivery == Delivery::Delivered)
            .count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &(SessionId, Delivery)> {
        self.deliveries
            .iter()
            .filter(|(_, delivery)| *delivery != Delivery::Delivered)
    }

    pub fn outcome_for(&self, id: SessionId) -> Option<Delivery> {
        self.deliveries
            .iter()
            .find(|(session_id, _)| *session_id == id)
            .map(|(_, delivery)| *delivery)
    }
}

/// Tracks connected sessions and delivers encoded packets to one or all of them.
///
/// Every session has a bounded outbound queue. A session that can't take a frame
/// within `send_timeout` is disconnected, so one stalled client never holds up
/// delivery to the rest.
pub struct SessionManager {
    sessions: RwLock<HashMap<SessionId, ClientSession>>,
    next_session_id: AtomicU64,
    events: broadcast::Sender<SessionEvent>,
    queue_capacity: usize,
    send_timeout: Duration,
}

impl SessionManager {
    pub fn new(queue_capacity: usize, send_timeout: Duration) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            sessions: RwLock::new(HashMap::new()),
            next_session_id: AtomicU64::new(0),
            events,
            queue_capacity,
            send_timeout,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Registers a new session and returns its id along with the receiving end of
    /// its outbound queue. Ids are never reused.
    pub async fn connect(&self, peer: Option<SocketAddr>) -> (SessionId, mpsc::Receiver<Bytes>) {
        let id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        let (session, receiver) = ClientSession::new(id, peer, self.queue_capacity);

        self.sessions.write().await.insert(id, session);
        let _ = self.events.send(SessionEvent::Connected { id, peer });

        (id, receiver)
    }

    /// Deregisters a session. Dropping its queue sender ends that session's writer.
    /// Returns false if the session was already gone.
    pub async fn disconnect(&self, id: SessionId, reason: &str) -> bool {
        let removed = self.sessions.write().await.remove(&id);
        if removed.is_none() {
            return false;
        }

        let _ = self.events.send(SessionEvent::Disconnected {
            id,
            reason: reason.to_owned(),
        });
        true
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn session_ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.sessions.read().await.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub async fn contains(&self, id: SessionId) -> bool {
        self.sessions.read().await.contains_key(&id)
    }

    /// Delivers a frame to exactly one session.
    pub async fn send(&self, id: SessionId, frame: Bytes) -> Result<()> {
        let sender = {
            let sessions = self.sessions.read().await;
            match sessions.get(&id) {
                Some(session) => session.sender(),
                None => return Err(VoxmapError::UnknownSession(id)),
            }
        };

        let result = enqueue_with_timeout(id, &sender, frame, self.send_timeout).await;
        match &result {
            Err(VoxmapError::SendTimeout(_)) => {
                self.disconnect(id, OVERFLOW_REASON).await;
            }
            Err(VoxmapError::SessionClosed(_)) => {
                self.disconnect(id, "connection closed").await;
            }
            _ => {}
        }
        result
    }

    pub async fn send_packet(&self, id: SessionId, packet: &Packet) -> Result<()> {
        self.send(id, packet.encode()).await
    }

    /// Delivers a frame to every session registered at the time of the call.
    ///
    /// Failures are per recipient and reported, never raised. Frames from
    /// consecutive broadcasts reach each session in submission order.
    pub async fn broadcast(&self, frame: Bytes) -> BroadcastReport {
        let recipients: Vec<(SessionId, mpsc::Sender<Bytes>)> = {
            let sessions = self.sessions.read().await;
            sessions
                .iter()
                .map(|(id, session)| (*id, session.sender()))
                .collect()
        };

        let mut report = BroadcastReport::default();
        let mut waiting = Vec::new();

        for (id, sender) in recipients {
            match sender.try_send(frame.clone()) {
                Ok(()) => report.deliveries.push((id, Delivery::Delivered)),
                Err(TrySendError::Closed(_)) => report.deliveries.push((id, Delivery::Closed)),
                Err(TrySendError::Full(frame)) => {
                    let limit = self.send_timeout;
                    waiting.push(async move {
                        let outcome = match enqueue_with_timeout(id, &sender, frame, limit).await {
                            Ok(()) => Delivery::Delivered,
                            Err(VoxmapError::SendTimeout(_)) => Delivery::TimedOut,
                            Err(_) => Delivery::Closed,
                        };
                        (id, outcome)
                    });
                }
            }
        }

        report.deliveries.extend(join_all(waiting).await);

        for (id, delivery) in report.deliveries.clone() {
            let reason = match delivery {
                Delivery::Delivered => continue,
                Delivery::Closed => "connection closed",
                Delivery::TimedOut => OVERFLOW_REASON,
            };
            log(
                format!("Broadcast to client {} failed: {}", id, reason),
                Warning,
            );
            self.disconnect(id, reason).await;
        }

        log(
            format!(
                "Broadcast {} bytes to {}/{} clients",
                frame.len(),
                report.delivered(),
                report.recipients()
            ),
            Debug,
        );
        report
    }

    pub async fn broadcast_packet(&self, packet: &Packet) -> BroadcastReport {
        self.broadcast(packet.encode()).await
    }
}
