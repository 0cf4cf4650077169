//! Persistence collaborator used by the REST layer

pub mod message_store;
pub mod traits;

// Re-export the message store
pub use message_store::MemoryMessageStore;
pub use traits::{MessageRepository, SharedMessageRepository};
