//! Room membership and fan-out
//!
//! The hub is the only owner of the room -> members map. Register, unregister
//! and broadcast all go through the same mutex, whether they come from a
//! connection pump or from the REST layer, so every broadcast sees a
//! consistent membership snapshot and two broadcasts to the same room are
//! delivered in the order they took the lock.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, info, warn};
use tokio::sync::mpsc::error::TrySendError;

use crate::core::connection::{Connection, ConnectionId, ConnectionInfo};
use crate::core::message::Envelope;

/// Members of one room, iterated in registration order
type Members = BTreeMap<ConnectionId, Connection>;

#[derive(Debug, Default)]
pub struct Hub {
    rooms: Mutex<HashMap<String, Members>>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    // Hub operations never fail; a panic while holding the lock cannot leave
    // the map half-updated, so a poisoned guard is still usable.
    fn rooms(&self) -> MutexGuard<'_, HashMap<String, Members>> {
        self.rooms.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a connection to its room, creating the room if needed.
    ///
    /// Each connection must be registered once; its id is unique so a second
    /// registration would only replace the first.
    pub fn register(&self, connection: Connection) {
        let room_id = connection.room_id().to_string();
        let user_id = connection.user_id().to_string();
        let id = connection.id();

        let mut rooms = self.rooms();
        let members = rooms.entry(room_id.clone()).or_default();
        members.insert(id, connection);

        info!(
            "Client registered: room={}, user={}, conn={}, total={}",
            room_id,
            user_id,
            id,
            members.len()
        );
    }

    /// Remove a connection from its room and close its outbound queue.
    ///
    /// Returns false when the connection was not registered (already
    /// unregistered or evicted); that case is a no-op.
    pub fn unregister(&self, info: &ConnectionInfo) -> bool {
        let mut rooms = self.rooms();
        let Some(members) = rooms.get_mut(&info.room_id) else {
            return false;
        };
        // Dropping the connection drops the queue's only sender
        let Some(connection) = members.remove(&info.id) else {
            return false;
        };
        let remaining = members.len();
        if remaining == 0 {
            rooms.remove(&info.room_id);
        }
        drop(connection);

        info!(
            "Client unregistered: room={}, user={}, conn={}, total={}",
            info.room_id, info.user_id, info.id, remaining
        );
        true
    }

    /// Deliver an envelope to every current member of a room.
    ///
    /// Never blocks: a member whose queue is full is disconnected instead.
    /// Broadcasting to an unknown room delivers to nobody. Returns the number
    /// of members that received the envelope.
    pub fn broadcast(&self, room_id: &str, envelope: Envelope) -> usize {
        let envelope = Arc::new(envelope);
        let mut rooms = self.rooms();
        let Some(members) = rooms.get_mut(room_id) else {
            debug!("Broadcast to empty room {} dropped", room_id);
            return 0;
        };

        let mut delivered = 0;
        let mut evicted = Vec::new();
        for (id, connection) in members.iter() {
            match connection.try_send(Arc::clone(&envelope)) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(
                        "Outbound queue full, disconnecting slow consumer: room={}, user={}, conn={}",
                        room_id,
                        connection.user_id(),
                        id
                    );
                    evicted.push(*id);
                }
                Err(TrySendError::Closed(_)) => {
                    debug!("Outbound queue already gone for {}, removing", id);
                    evicted.push(*id);
                }
            }
        }

        for id in evicted {
            members.remove(&id);
        }
        if members.is_empty() {
            rooms.remove(room_id);
        }

        debug!(
            "Broadcast {} to {} members of room {}",
            envelope.kind.name(),
            delivered,
            room_id
        );
        delivered
    }

    /// Number of live connections in a room
    pub fn member_count(&self, room_id: &str) -> usize {
        self.rooms().get(room_id).map_or(0, BTreeMap::len)
    }

    pub fn has_room(&self, room_id: &str) -> bool {
        self.rooms().contains_key(room_id)
    }

    pub fn is_member(&self, info: &ConnectionInfo) -> bool {
        self.rooms()
            .get(&info.room_id)
            .is_some_and(|members| members.contains_key(&info.id))
    }

    pub fn room_count(&self) -> usize {
        self.rooms().len()
    }

    pub fn connection_count(&self) -> usize {
        self.rooms().values().map(BTreeMap::len).sum()
    }
}

// Shared reference to the hub
pub type SharedHub = Arc<Hub>;

pub fn create_hub() -> SharedHub {
    Arc::new(Hub::new())
}
