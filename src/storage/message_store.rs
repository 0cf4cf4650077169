//! Simple in-memory storage for recent messages
//!
//! This implementation provides a basic circular buffer for storing
//! recent messages without persisting to disk.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::constants::DEFAULT_HISTORY_CAPACITY;
use crate::core::message::ChatMessage;
use crate::error::{RelayError, Result};
use crate::storage::traits::MessageRepository;

/// In-memory message store with a maximum capacity
pub struct MemoryMessageStore {
    messages: Mutex<VecDeque<ChatMessage>>,
    max_size: usize,
}

impl MemoryMessageStore {
    /// Create a new message store with default capacity
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }

    /// Create a message store with custom capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            messages: Mutex::new(VecDeque::with_capacity(capacity)),
            max_size: capacity.max(1),
        }
    }

    /// Get the number of stored messages
    pub fn count(&self) -> Result<usize> {
        Ok(self.messages.lock()?.len())
    }

    /// Get the number of stored messages for one room
    pub fn count_for_room(&self, room_id: &str) -> Result<usize> {
        let messages = self.messages.lock()?;
        Ok(messages.iter().filter(|m| m.room_id == room_id).count())
    }
}

impl Default for MemoryMessageStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageRepository for MemoryMessageStore {
    async fn create_message(&self, room_id: &str, user_id: &str, text: &str) -> Result<ChatMessage> {
        if room_id.is_empty() {
            return Err(RelayError::ValidationError("Room ID is required".to_string()));
        }
        if text.trim().is_empty() {
            return Err(RelayError::ValidationError(
                "message cannot be empty".to_string(),
            ));
        }

        let message = ChatMessage::new(room_id.to_string(), user_id.to_string(), text.to_string());

        let mut messages = self.messages.lock()?;
        // If at capacity, remove the oldest message
        if messages.len() >= self.max_size {
            messages.pop_front();
        }
        messages.push_back(message.clone());

        Ok(message)
    }
}
