//! Abstract storage interface for the persistence collaborator
//!
//! The REST layer persists a chat message through this trait before asking
//! the hub to fan it out. The hub itself never stores anything.

use async_trait::async_trait;
use std::sync::Arc;

use crate::core::message::ChatMessage;
use crate::error::Result;

#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// Durably store a message and return the stored record
    async fn create_message(&self, room_id: &str, user_id: &str, text: &str) -> Result<ChatMessage>;
}

pub type SharedMessageRepository = Arc<dyn MessageRepository>;
