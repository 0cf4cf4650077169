//! Rusty Relay - a room-scoped real-time chat relay
//!
//! This library provides the message hub that tracks which live WebSocket
//! connections belong to which room, the per-connection pumps that move
//! envelopes between sockets and the hub, and the warp routes around them.

pub mod auth;
pub mod config;
pub mod constants;
pub mod core;
pub mod error;
pub mod handlers;
pub mod storage;

// Re-export main components
pub use config::*;
pub use constants::*;
