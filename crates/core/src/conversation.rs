//! Conversation-related types.

use quill_model::{AssistantMessage, ModelMessage};

/// Represents a conversation.
///
/// The system prompt is not part of the conversation, it's prepended to
/// every request instead, so changing it never rewrites history.
#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub struct Conversation {
    pub(crate) messages: Vec<ModelMessage>,
}

impl Conversation {
    /// Returns the messages in this conversation.
    #[inline]
    pub fn messages(&self) -> &[ModelMessage] {
        &self.messages
    }

    /// Returns the number of messages.
    #[inline]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Returns `true` if the conversation has no messages.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Returns the most recent assistant message.
    pub fn last_assistant_message(&self) -> Option<&AssistantMessage> {
        self.messages.iter().rev().find_map(|msg| match msg {
            ModelMessage::Assistant(msg) => Some(msg),
            _ => None,
        })
    }

    #[inline]
    pub(crate) fn push(&mut self, msg: ModelMessage) {
        self.messages.push(msg);
    }

    #[inline]
    pub(crate) fn clear(&mut self) {
        self.messages.clear();
    }
}
