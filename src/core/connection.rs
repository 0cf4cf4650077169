//! WebSocket connection management
//! Handles the identity, outbound queue and lifecycle of client connections

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::debug;
use tokio::sync::{mpsc, watch};

use crate::core::message::Envelope;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque, process-unique connection handle.
///
/// Ids are handed out in increasing order, so sorting by id yields
/// registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Receiving end of a connection's bounded outbound queue
pub type OutboundQueue = mpsc::Receiver<Arc<Envelope>>;

/// Trusted identity of a live connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    pub room_id: String,
    pub user_id: String,
    pub connected_at: Instant,
}

impl ConnectionInfo {
    /// Calculate the connection duration
    pub fn connection_duration(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

/// Represents a single live connection as seen by the hub.
///
/// Holds the only sender of the outbound queue, so dropping it (which the hub
/// does on unregister or eviction) closes the queue exactly once.
pub struct Connection {
    info: ConnectionInfo,
    sender: mpsc::Sender<Arc<Envelope>>,
}

impl Connection {
    /// Create a connection with a fresh id and a queue holding `capacity` envelopes
    pub fn open(
        room_id: impl Into<String>,
        user_id: impl Into<String>,
        capacity: usize,
    ) -> (Self, OutboundQueue) {
        let (sender, queue) = mpsc::channel(capacity);
        let info = ConnectionInfo {
            id: ConnectionId::next(),
            room_id: room_id.into(),
            user_id: user_id.into(),
            connected_at: Instant::now(),
        };
        (Self { info, sender }, queue)
    }

    pub fn info(&self) -> &ConnectionInfo {
        &self.info
    }

    pub fn id(&self) -> ConnectionId {
        self.info.id
    }

    pub fn room_id(&self) -> &str {
        &self.info.room_id
    }

    pub fn user_id(&self) -> &str {
        &self.info.user_id
    }

    /// Non-blocking push onto the outbound queue
    pub(crate) fn try_send(
        &self,
        envelope: Arc<Envelope>,
    ) -> Result<(), mpsc::error::TrySendError<Arc<Envelope>>> {
        self.sender.try_send(envelope)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection").field("info", &self.info).finish()
    }
}

/// Connection state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Connecting = 0,
    Active = 1,
    Closing = 2,
    Closed = 3,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Active,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// Shared lifecycle of one connection, joined by a single closing signal.
///
/// Whichever pump task detects a terminal condition first calls
/// [`Lifecycle::begin_closing`]; the other task observes the signal and exits.
#[derive(Debug)]
pub struct Lifecycle {
    state: AtomicU8,
    closing: watch::Sender<bool>,
}

impl Lifecycle {
    pub fn new() -> Arc<Self> {
        let (closing, _) = watch::channel(false);
        Arc::new(Self {
            state: AtomicU8::new(ConnectionState::Connecting as u8),
            closing,
        })
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Connecting -> Active. Returns false if the connection already moved on.
    pub fn activate(&self) -> bool {
        self.transition(ConnectionState::Connecting, ConnectionState::Active)
    }

    /// Enter Closing and fire the closing signal.
    ///
    /// Returns true only for the caller that performed the transition.
    pub fn begin_closing(&self) -> bool {
        let started = self.transition(ConnectionState::Active, ConnectionState::Closing)
            || self.transition(ConnectionState::Connecting, ConnectionState::Closing);
        if started {
            debug!("Connection entering closing state");
            self.closing.send_replace(true);
        }
        started
    }

    /// Final state, once both pump tasks are gone and the hub let go
    pub fn mark_closed(&self) {
        self.begin_closing();
        self.state.store(ConnectionState::Closed as u8, Ordering::Release);
    }

    pub fn is_closing(&self) -> bool {
        matches!(
            self.state(),
            ConnectionState::Closing | ConnectionState::Closed
        )
    }

    /// Subscribe to the closing signal
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.closing.subscribe()
    }

    fn transition(&self, from: ConnectionState, to: ConnectionState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Resolves once the closing signal has fired
pub async fn closing_signal(rx: &mut watch::Receiver<bool>) {
    // The sender lives inside the Lifecycle, which outlives both pump tasks
    let _ = rx.wait_for(|closing| *closing).await;
}
