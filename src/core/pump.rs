//! Per-connection I/O
//!
//! A pump runs two tasks for one WebSocket: the inbound task reads frames and
//! hands decoded envelopes to the hub, the outbound task drains the
//! connection's queue onto the socket and sends keepalive pings. Both tasks
//! share one [`Lifecycle`]; whichever sees a terminal condition first starts
//! closing and the other follows.

use std::sync::Arc;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use tokio::time::{self, Instant};
use warp::ws::{Message, WebSocket};

use crate::config::ConnectionSettings;
use crate::core::connection::{closing_signal, ConnectionInfo, Lifecycle, OutboundQueue};
use crate::core::hub::SharedHub;
use crate::core::message::Envelope;
use crate::error::{RelayError, Result};

/// Why the inbound task stopped reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadExit {
    PeerClosed,
    IdleTimeout,
    TransportError,
    FrameTooLarge,
    Shutdown,
}

/// Owns the I/O of one registered connection
pub struct Pump {
    info: ConnectionInfo,
    hub: SharedHub,
    settings: ConnectionSettings,
    lifecycle: Arc<Lifecycle>,
}

impl Pump {
    pub fn new(info: ConnectionInfo, hub: SharedHub, settings: ConnectionSettings) -> Self {
        Self {
            info,
            hub,
            settings,
            lifecycle: Lifecycle::new(),
        }
    }

    /// Run both tasks until the connection is closed.
    ///
    /// The connection must already be registered with the hub; when this
    /// returns it is unregistered and the lifecycle is `Closed`.
    pub async fn run(self, ws: WebSocket, queue: OutboundQueue) {
        let Pump {
            info,
            hub,
            settings,
            lifecycle,
        } = self;
        lifecycle.activate();

        let (ws_tx, ws_rx) = ws.split();

        let inbound = tokio::spawn(read_pump(
            ws_rx,
            info.clone(),
            Arc::clone(&hub),
            settings.clone(),
            Arc::clone(&lifecycle),
        ));
        let outbound = tokio::spawn(write_pump(
            ws_tx,
            queue,
            info.clone(),
            settings,
            Arc::clone(&lifecycle),
        ));

        let (read_result, write_result) = tokio::join!(inbound, outbound);
        if let Err(e) = read_result {
            error!("Inbound task for {} failed: {}", info.id, e);
        }
        if let Err(e) = write_result {
            error!("Outbound task for {} failed: {}", info.id, e);
        }

        // No-op when the inbound task or an eviction already did it
        hub.unregister(&info);
        lifecycle.mark_closed();

        info!(
            "Connection closed: room={}, user={}, conn={}, duration={:?}",
            info.room_id,
            info.user_id,
            info.id,
            info.connection_duration()
        );
    }
}

/// Reads frames until the peer goes away, then unregisters the connection
async fn read_pump(
    mut ws_rx: SplitStream<WebSocket>,
    info: ConnectionInfo,
    hub: SharedHub,
    settings: ConnectionSettings,
    lifecycle: Arc<Lifecycle>,
) {
    let mut closing = lifecycle.subscribe();
    let mut deadline = Instant::now() + settings.read_idle_timeout;

    let exit = loop {
        let next = tokio::select! {
            _ = closing_signal(&mut closing) => break ReadExit::Shutdown,
            next = time::timeout_at(deadline, ws_rx.next()) => next,
        };

        let msg = match next {
            Err(_) => break ReadExit::IdleTimeout,
            Ok(None) => break ReadExit::PeerClosed,
            Ok(Some(Err(e))) => {
                warn!("WebSocket read error on {}: {}", info.id, e);
                break ReadExit::TransportError;
            }
            Ok(Some(Ok(msg))) => msg,
        };

        if msg.is_pong() {
            deadline = Instant::now() + settings.read_idle_timeout;
            continue;
        }
        if msg.is_close() {
            break ReadExit::PeerClosed;
        }
        if msg.is_ping() {
            // answered by the protocol layer
            continue;
        }
        if msg.as_bytes().len() > settings.max_frame_size {
            warn!(
                "Frame of {} bytes from {} exceeds limit of {}",
                msg.as_bytes().len(),
                info.id,
                settings.max_frame_size
            );
            break ReadExit::FrameTooLarge;
        }
        if !msg.is_text() {
            warn!("Ignoring non-text frame of {} bytes from {}", msg.as_bytes().len(), info.id);
            continue;
        }

        match Envelope::from_peer(msg.as_bytes(), &info) {
            Ok(envelope) => {
                hub.broadcast(&info.room_id, envelope);
            }
            Err(e) => {
                warn!("Dropping envelope from {} ({}): {}", info.user_id, info.id, e);
            }
        }
    };

    match exit {
        ReadExit::IdleTimeout => info!("Read idle deadline passed for {}, closing", info.id),
        other => debug!("Inbound task for {} stopped: {:?}", info.id, other),
    }

    hub.unregister(&info);
    lifecycle.begin_closing();
}

/// Drains the outbound queue onto the socket and keeps the peer alive
async fn write_pump(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut queue: OutboundQueue,
    info: ConnectionInfo,
    settings: ConnectionSettings,
    lifecycle: Arc<Lifecycle>,
) {
    let mut closing = lifecycle.subscribe();
    let mut keepalive = time::interval_at(
        Instant::now() + settings.keepalive_interval,
        settings.keepalive_interval,
    );
    keepalive.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            next = queue.recv() => match next {
                Some(envelope) => {
                    if let Err(e) = write_batch(&mut ws_tx, &mut queue, envelope, &settings).await {
                        warn!("Write to {} failed: {}", info.id, e);
                        break;
                    }
                }
                None => {
                    // Queue closed by the hub: unregistered or evicted
                    debug!("Outbound queue for {} closed", info.id);
                    send_close(&mut ws_tx, &settings).await;
                    break;
                }
            },
            _ = keepalive.tick() => {
                if let Err(e) = send_with_deadline(&mut ws_tx, Message::ping(Vec::new()), &settings).await {
                    warn!("Keepalive ping to {} failed: {}", info.id, e);
                    break;
                }
            }
            _ = closing_signal(&mut closing) => {
                send_close(&mut ws_tx, &settings).await;
                break;
            }
        }
    }

    lifecycle.begin_closing();
}

/// Write one envelope plus whatever is already queued behind it, flushed once
async fn write_batch(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    queue: &mut OutboundQueue,
    first: Arc<Envelope>,
    settings: &ConnectionSettings,
) -> Result<()> {
    let mut frames = Vec::new();
    push_frame(&mut frames, &first);
    while frames.len() < settings.outbound_queue_capacity {
        match queue.try_recv() {
            Ok(envelope) => push_frame(&mut frames, &envelope),
            Err(_) => break,
        }
    }
    if frames.is_empty() {
        return Ok(());
    }

    let batch = async {
        for frame in frames {
            ws_tx.feed(frame).await?;
        }
        ws_tx.flush().await
    };
    match time::timeout(settings.write_timeout, batch).await {
        Ok(result) => result.map_err(RelayError::from),
        Err(_) => Err(RelayError::WriteTimeout),
    }
}

fn push_frame(frames: &mut Vec<Message>, envelope: &Envelope) {
    match envelope.encode() {
        Ok(text) => frames.push(Message::text(text)),
        Err(e) => error!("Failed to serialize {} envelope: {}", envelope.kind.name(), e),
    }
}

async fn send_with_deadline(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    msg: Message,
    settings: &ConnectionSettings,
) -> Result<()> {
    match time::timeout(settings.write_timeout, ws_tx.send(msg)).await {
        Ok(result) => result.map_err(RelayError::from),
        Err(_) => Err(RelayError::WriteTimeout),
    }
}

async fn send_close(ws_tx: &mut SplitSink<WebSocket, Message>, settings: &ConnectionSettings) {
    // Best effort: the peer may already be gone
    if let Err(e) = send_with_deadline(ws_tx, Message::close(), settings).await {
        debug!("Close frame not delivered: {}", e);
    }
}
