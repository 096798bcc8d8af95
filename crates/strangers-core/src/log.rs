//! Per-session message log.
//!
//! Insertion order is the only ordering. The log is the single mutation
//! point for a conversation: relayed mutations and history replay on
//! rejoin both read from it.

use crate::error::{Error, Result};
use crate::id::MessageId;
use crate::message::{ChatOp, Message, Reaction};

#[derive(Debug, Clone, Default)]
pub struct MessageLog {
    entries: Vec<Message>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message to the tail.
    ///
    /// Returns `Ok(false)` when a message with the same id is already
    /// present; the log is left untouched in that case.
    pub fn append(&mut self, message: Message) -> Result<bool> {
        if message.id.is_empty() {
            return Err(Error::MissingMessageId);
        }
        if self.position(&message.id).is_some() {
            return Ok(false);
        }
        self.entries.push(message);
        Ok(true)
    }

    /// Replace the text of the first message with `id`.
    pub fn edit(&mut self, id: &MessageId, text: &str) -> bool {
        match self.entries.iter_mut().find(|m| &m.id == id) {
            Some(message) => {
                message.text = text.to_string();
                true
            }
            None => false,
        }
    }

    /// Remove the first message with `id`.
    pub fn delete(&mut self, id: &MessageId) -> bool {
        match self.position(id) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    /// Set or overwrite the reaction on the first message with `id`.
    pub fn react(&mut self, id: &MessageId, reaction: Reaction) -> bool {
        match self.entries.iter_mut().find(|m| &m.id == id) {
            Some(message) => {
                message.reaction = Some(reaction);
                true
            }
            None => false,
        }
    }

    /// Apply an inbound operation. Returns whether the log changed.
    pub fn apply(&mut self, op: &ChatOp) -> Result<bool> {
        match op {
            ChatOp::Send(message) => self.append(message.clone()),
            ChatOp::Edit { id, text } => Ok(self.edit(id, text)),
            ChatOp::Delete { id } => Ok(self.delete(id)),
            ChatOp::React { message_id, reaction } => Ok(self.react(message_id, reaction.clone())),
        }
    }

    pub fn get(&self, id: &MessageId) -> Option<&Message> {
        self.entries.iter().find(|m| &m.id == id)
    }

    /// All messages, oldest first.
    pub fn messages(&self) -> &[Message] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, id: &MessageId) -> Option<usize> {
        self.entries.iter().position(|m| &m.id == id)
    }
}
