//! Chat transcript kept for the agent panel.

use crate::chat_stream::ChatHandler;
use chrono::{DateTime, Utc};
use formlab_core::ChatResponse;
use std::collections::VecDeque;
use uuid::Uuid;

pub const MAX_MESSAGES: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    User,
    Agent,
    System,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub id: Uuid,
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub file_name: Option<String>,
    /// Still receiving streamed content.
    pub pending: bool,
    pub failed: bool,
}

impl ChatMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            role,
            content: content.into(),
            created_at: Utc::now(),
            file_name: None,
            pending: false,
            failed: false,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn agent(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Agent, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    pub fn with_file(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }
}

#[derive(Debug, Default)]
pub struct ChatTranscript {
    messages: VecDeque<ChatMessage>,
    panel_visible: bool,
    unread: usize,
}

impl ChatTranscript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message, dropping the oldest past [`MAX_MESSAGES`].
    pub fn add_message(&mut self, message: ChatMessage) -> Uuid {
        let id = message.id;
        if message.role != MessageRole::User && !self.panel_visible {
            self.unread += 1;
        }
        self.messages.push_back(message);
        while self.messages.len() > MAX_MESSAGES {
            self.messages.pop_front();
        }
        id
    }

    /// Edit a message in place. Returns `false` if it is no longer held.
    pub fn update_message<F>(&mut self, id: Uuid, update: F) -> bool
    where
        F: FnOnce(&mut ChatMessage),
    {
        match self.messages.iter_mut().find(|m| m.id == id) {
            Some(message) => {
                update(message);
                true
            }
            None => false,
        }
    }

    pub fn message(&self, id: Uuid) -> Option<&ChatMessage> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn messages(&self) -> impl Iterator<Item = &ChatMessage> {
        self.messages.iter()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.unread = 0;
    }

    pub fn set_panel_visible(&mut self, visible: bool) {
        self.panel_visible = visible;
        if visible {
            self.unread = 0;
        }
    }

    pub fn unread_count(&self) -> usize {
        self.unread
    }
}

/// Feeds one streamed turn into a transcript.
pub struct TranscriptHandler<'a> {
    transcript: &'a mut ChatTranscript,
    reply_id: Option<Uuid>,
}

impl<'a> TranscriptHandler<'a> {
    pub fn new(transcript: &'a mut ChatTranscript) -> Self {
        Self {
            transcript,
            reply_id: None,
        }
    }

    /// Id of the agent message this turn writes into, once started.
    pub fn reply_id(&self) -> Option<Uuid> {
        self.reply_id
    }

    fn reply(&mut self) -> Uuid {
        match self.reply_id {
            Some(id) => id,
            None => {
                let mut message = ChatMessage::agent("");
                message.pending = true;
                let id = self.transcript.add_message(message);
                self.reply_id = Some(id);
                id
            }
        }
    }
}

impl ChatHandler for TranscriptHandler<'_> {
    fn on_start(&mut self) {
        self.reply();
    }

    fn on_delta(&mut self, content: &str) {
        let id = self.reply();
        self.transcript
            .update_message(id, |m| m.content.push_str(content));
    }

    fn on_done(&mut self, response: &ChatResponse) {
        let id = self.reply();
        let reply = response.reply.clone();
        self.transcript.update_message(id, |m| {
            m.content = reply;
            m.pending = false;
        });
    }

    fn on_error(&mut self, message: &str) {
        let id = self.reply();
        self.transcript.update_message(id, |m| {
            if m.content.is_empty() {
                m.content = message.to_string();
            }
            m.pending = false;
            m.failed = true;
        });
    }
}
