//! Conversation state for chat front-ends
//!
//! A [`Chat`] is an append-only message sequence. Every change is a pure
//! `&Chat -> Chat` transformation; [`ChatBook`] applies them atomically so
//! concurrent sends never lose messages.

pub mod transport;

pub use transport::{HttpTransport, QueryTransport, TransportError};

use crate::llm::{canned_reply, ReplySelector};
use crate::pipeline::{Answer, Source};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

/// Placeholder text shown while a reply is in flight
pub const LOADING_TEXT: &str = "…";

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Unknown chat: {0}")]
    UnknownChat(Uuid),

    #[error("Unknown message {message_id} in chat {chat_id}")]
    UnknownMessage { chat_id: Uuid, message_id: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Position-unique within its chat
    pub id: u64,
    pub role: Role,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn is_loading(&self) -> bool {
        self.source == Some(Source::Loading)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    pub id: Uuid,
    pub title: String,
    messages: Vec<ChatMessage>,
}

impl Chat {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            messages: Vec::new(),
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn message(&self, id: u64) -> Option<&ChatMessage> {
        self.messages.iter().find(|m| m.id == id)
    }

    fn next_id(&self) -> u64 {
        self.messages.last().map(|m| m.id + 1).unwrap_or(1)
    }

    /// New chat with one more message appended
    pub fn with_message(
        &self,
        role: Role,
        text: impl Into<String>,
        source: Option<Source>,
        mode: Option<String>,
    ) -> Chat {
        let mut next = self.clone();
        next.messages.push(ChatMessage {
            id: self.next_id(),
            role,
            text: text.into(),
            source,
            mode,
            created_at: Utc::now(),
        });
        next
    }

    /// New chat with the user question and a loading placeholder appended
    pub fn with_pending_question(&self, question: &str) -> (Chat, u64) {
        let next = self
            .with_message(Role::User, question, None, None)
            .with_message(Role::Assistant, LOADING_TEXT, Some(Source::Loading), None);
        let placeholder_id = next.next_id() - 1;
        (next, placeholder_id)
    }

    /// New chat with placeholder `message_id` replaced by `answer`
    pub fn with_resolved_reply(&self, message_id: u64, answer: &Answer) -> Result<Chat, ChatError> {
        let mut next = self.clone();
        let message = next
            .messages
            .iter_mut()
            .find(|m| m.id == message_id)
            .ok_or(ChatError::UnknownMessage {
                chat_id: self.id,
                message_id,
            })?;

        message.text = answer.answer.clone();
        message.source = Some(answer.source);
        message.mode = answer.mode.clone();
        Ok(next)
    }
}

/// All chats, behind one lock
#[derive(Default)]
pub struct ChatBook {
    chats: RwLock<HashMap<Uuid, Chat>>,
}

impl ChatBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, title: impl Into<String>) -> Chat {
        let chat = Chat::new(title);
        self.chats
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .insert(chat.id, chat.clone());
        chat
    }

    pub fn get(&self, id: Uuid) -> Option<Chat> {
        self.chats
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(&id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.chats.read().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply `f` to the current state of chat `id` and store the result.
    ///
    /// `f` runs under the write lock, so it sees every earlier update.
    pub fn update<T, F>(&self, id: Uuid, f: F) -> Result<T, ChatError>
    where
        F: FnOnce(&Chat) -> Result<(Chat, T), ChatError>,
    {
        let mut chats = self.chats.write().unwrap_or_else(|p| p.into_inner());
        let current = chats.get(&id).ok_or(ChatError::UnknownChat(id))?;
        let (next, value) = f(current)?;
        chats.insert(id, next);
        Ok(value)
    }

    /// Send `question` in chat `id` and resolve the reply.
    ///
    /// The question and a loading placeholder are appended first; the
    /// placeholder is then replaced by the pipeline answer, or by a canned
    /// reply when the transport fails.
    pub async fn send(
        &self,
        id: Uuid,
        question: &str,
        transport: &dyn QueryTransport,
        selector: &dyn ReplySelector,
    ) -> Result<ChatMessage, ChatError> {
        let placeholder_id = self.update(id, |chat| Ok(chat.with_pending_question(question)))?;
        debug!("Chat {}: awaiting reply {}", id, placeholder_id);

        let answer = match transport.ask(question).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!("Chat {}: query failed, using canned reply: {}", id, e);
                Answer::fallback(canned_reply(selector))
            }
        };

        self.update(id, |chat| {
            let next = chat.with_resolved_reply(placeholder_id, &answer)?;
            let message = next
                .message(placeholder_id)
                .cloned()
                .ok_or(ChatError::UnknownMessage {
                    chat_id: id,
                    message_id: placeholder_id,
                })?;
            Ok((next, message))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{FixedSelector, CANNED_REPLIES};
    use async_trait::async_trait;
    use std::sync::Arc;

    struct Scripted(Result<Answer, u16>);

    #[async_trait]
    impl QueryTransport for Scripted {
        async fn ask(&self, _question: &str) -> Result<Answer, TransportError> {
            self.0.clone().map_err(TransportError::Status)
        }
    }

    #[test]
    fn test_transformations_are_pure() {
        let empty = Chat::new("apples");
        let one = empty.with_message(Role::User, "hi", None, None);

        assert!(empty.messages().is_empty());
        assert_eq!(one.messages().len(), 1);
        assert_eq!(one.messages()[0].id, 1);
        assert_eq!(one.id, empty.id);
    }

    #[test]
    fn test_pending_then_resolved() {
        let (pending, placeholder) = Chat::new("t").with_pending_question("How many apples?");
        assert_eq!(pending.messages().len(), 2);
        assert!(pending.message(placeholder).unwrap().is_loading());

        let resolved = pending
            .with_resolved_reply(placeholder, &Answer::retrieved("Om has 2 apples"))
            .unwrap();
        let reply = resolved.message(placeholder).unwrap();
        assert_eq!(reply.text, "Om has 2 apples");
        assert_eq!(reply.source, Some(Source::Retrieval));
        assert!(pending.message(placeholder).unwrap().is_loading());

        assert!(matches!(
            pending.with_resolved_reply(99, &Answer::fallback("x")),
            Err(ChatError::UnknownMessage { message_id: 99, .. })
        ));
    }

    #[tokio::test]
    async fn test_send_resolves_with_answer() {
        let book = ChatBook::new();
        let chat = book.create("demo");
        let transport = Scripted(Ok(Answer::generated("Paris", "gemini")));

        let reply = book
            .send(chat.id, "capital of France?", &transport, &FixedSelector(0))
            .await
            .unwrap();

        assert_eq!(reply.text, "Paris");
        assert_eq!(reply.mode.as_deref(), Some("gemini"));
        let stored = book.get(chat.id).unwrap();
        assert_eq!(stored.messages().len(), 2);
        assert_eq!(stored.messages()[0].role, Role::User);
    }

    #[tokio::test]
    async fn test_send_non_2xx_uses_canned_reply() {
        let book = ChatBook::new();
        let chat = book.create("demo");
        let transport = Scripted(Err(503));

        let reply = book
            .send(chat.id, "anything", &transport, &FixedSelector(2))
            .await
            .unwrap();

        assert_eq!(reply.text, CANNED_REPLIES[2]);
        assert_eq!(reply.source, Some(Source::Fallback));
    }

    #[tokio::test]
    async fn test_send_to_unknown_chat() {
        let book = ChatBook::new();
        let result = book
            .send(Uuid::new_v4(), "q", &Scripted(Err(500)), &FixedSelector(0))
            .await;
        assert!(matches!(result, Err(ChatError::UnknownChat(_))));
    }

    #[tokio::test]
    async fn test_concurrent_sends_keep_every_message() {
        let book = Arc::new(ChatBook::new());
        let chat = book.create("busy");

        let mut handles = Vec::new();
        for i in 0..16 {
            let book = book.clone();
            handles.push(tokio::spawn(async move {
                let transport = Scripted(Ok(Answer::retrieved(format!("reply {}", i))));
                book.send(chat.id, &format!("question {}", i), &transport, &FixedSelector(0))
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let stored = book.get(chat.id).unwrap();
        assert_eq!(stored.messages().len(), 32);
        assert!(stored.messages().iter().all(|m| !m.is_loading()));

        let mut ids: Vec<u64> = stored.messages().iter().map(|m| m.id).collect();
        ids.dedup();
        assert_eq!(ids.len(), 32);
    }
}
