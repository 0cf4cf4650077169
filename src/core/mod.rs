//! Core functionality: envelopes, connections, the hub and the pumps

pub mod connection;
pub mod hub;
pub mod message;
pub mod pump;

// Re-export main components for convenience
pub use connection::{Connection, ConnectionId, ConnectionInfo, ConnectionState, Lifecycle, OutboundQueue};
pub use hub::{create_hub, Hub, SharedHub};
pub use message::{ChatMessage, ChatPayload, Envelope, EnvelopeKind, Presence};
pub use pump::Pump;
