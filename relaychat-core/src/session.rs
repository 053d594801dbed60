//! Chat session controller.
//!
//! Holds what the chat view shows (current conversation, its messages, the
//! conversation list, the last stats) and runs one send at a time: create
//! the conversation if needed, save the user message, open the relay,
//! stream into a placeholder, then hand a cleanly finished reply to the
//! persistence bridge.

use std::time::Instant;

use chrono::Utc;
use relaychat_types::{ChatTurn, Conversation, Message, Role, StreamingStats};
use thiserror::Error;
use tracing::{info, warn};

use crate::bridge::{HistoryStore, PersistenceBridge};
use crate::consumer::{ChatTransport, StreamConsumer, StreamObserver};
use crate::error::{ClientError, StreamError};

/// Why a send did not produce a settled reply.
///
/// Its `Display` is deliberately generic; details go to the log.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("message is empty")]
    EmptyMessage,

    #[error("failed to send message")]
    Persistence(#[source] ClientError),

    #[error("failed to send message")]
    Transport(#[source] ClientError),

    #[error("failed to send message")]
    Stream(#[source] StreamError),
}

pub struct ChatSession<S, T> {
    bridge: PersistenceBridge<S>,
    transport: T,
    conversation_id: Option<String>,
    messages: Vec<Message>,
    conversations: Vec<Conversation>,
    stats: Option<StreamingStats>,
    streaming: bool,
}

impl<S: HistoryStore, T: ChatTransport> ChatSession<S, T> {
    pub fn new(store: S, transport: T) -> Self {
        Self {
            bridge: PersistenceBridge::new(store),
            transport,
            conversation_id: None,
            messages: Vec::new(),
            conversations: Vec::new(),
            stats: None,
            streaming: false,
        }
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn stats(&self) -> Option<&StreamingStats> {
        self.stats.as_ref()
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// Reload the conversation list. Failures are logged and leave the
    /// current list untouched.
    pub async fn load_conversations(&mut self) {
        match self.bridge.store().list_conversations().await {
            Ok(list) => self.conversations = list,
            Err(e) => warn!(error = %e, "failed to load conversations"),
        }
    }

    /// Switch to an existing conversation and load its history.
    pub async fn select_conversation(&mut self, conversation_id: &str) -> Result<(), ClientError> {
        self.conversation_id = Some(conversation_id.to_owned());
        self.stats = None;
        self.messages = self.bridge.store().list_messages(conversation_id).await?;
        Ok(())
    }

    /// Start over; the next send creates a new conversation.
    pub fn new_conversation(&mut self) {
        self.conversation_id = None;
        self.messages.clear();
        self.stats = None;
    }

    /// Send `content` and stream the reply.
    ///
    /// Returns the reply message: the persisted record, or the unconfirmed
    /// placeholder when persisting it failed. On a stream failure the
    /// placeholder stays in [`Self::messages`] with its partial text.
    pub async fn send<O>(&mut self, content: &str, observer: &mut O) -> Result<Message, SendError>
    where
        O: StreamObserver + ?Sized,
    {
        if content.trim().is_empty() {
            return Err(SendError::EmptyMessage);
        }

        let conversation_id = match &self.conversation_id {
            Some(id) => id.clone(),
            None => {
                let conversation = self
                    .bridge
                    .open_conversation(content)
                    .await
                    .map_err(SendError::Persistence)?;
                self.conversation_id = Some(conversation.id.clone());
                self.load_conversations().await;
                conversation.id
            }
        };

        let user_message = self
            .bridge
            .save_user_message(&conversation_id, content)
            .await
            .map_err(SendError::Persistence)?;
        self.messages.push(user_message);

        self.streaming = true;
        self.stats = None;
        let result = self.stream_reply(&conversation_id, observer).await;
        self.streaming = false;
        result
    }

    async fn stream_reply<O>(
        &mut self,
        conversation_id: &str,
        observer: &mut O,
    ) -> Result<Message, SendError>
    where
        O: StreamObserver + ?Sized,
    {
        let started = Instant::now();
        let history = self.history();
        let chunks = self
            .transport
            .open(&history)
            .await
            .map_err(SendError::Transport)?;

        let placeholder = Message::placeholder(conversation_id, Utc::now());
        let placeholder_id = placeholder.id.clone();
        self.messages.push(placeholder.clone());

        let mut consumer = StreamConsumer::new();
        consumer
            .start(placeholder)
            .map_err(|e| SendError::Stream(e.into()))?;

        let mut mirror = Mirror {
            placeholder_id: &placeholder_id,
            messages: &mut self.messages,
            stats: &mut self.stats,
            outer: observer,
        };
        let text = match consumer.consume(chunks, started, &mut mirror).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, %conversation_id, "reply stream failed; nothing persisted");
                return Err(SendError::Stream(e));
            }
        };

        let reply = match self.bridge.commit_reply(conversation_id, &text).await {
            Some(persisted) => {
                consumer
                    .confirm(persisted.clone())
                    .map_err(|e| SendError::Stream(e.into()))?;
                if let Some(slot) = self.messages.iter_mut().rev().find(|m| m.id == placeholder_id) {
                    *slot = persisted.clone();
                }
                persisted
            }
            None => consumer.message().cloned().unwrap_or_else(|| {
                let mut unconfirmed = Message::placeholder(conversation_id, Utc::now());
                unconfirmed.content = text.clone();
                unconfirmed
            }),
        };

        self.load_conversations().await;
        info!(
            %conversation_id,
            chars = text.chars().count(),
            persisted = !reply.is_placeholder(),
            "reply settled"
        );
        Ok(reply)
    }

    /// Prior persisted turns plus the new user message, oldest first.
    /// Unconfirmed placeholders and `system` messages are not sent.
    fn history(&self) -> Vec<ChatTurn> {
        self.messages
            .iter()
            .filter(|m| !m.is_placeholder() && m.role != Role::System)
            .map(Message::to_turn)
            .collect()
    }
}

/// Mirrors consumer updates into the session's message list and stats
/// before forwarding them.
struct Mirror<'a, O: ?Sized> {
    placeholder_id: &'a str,
    messages: &'a mut Vec<Message>,
    stats: &'a mut Option<StreamingStats>,
    outer: &'a mut O,
}

impl<O: StreamObserver + ?Sized> StreamObserver for Mirror<'_, O> {
    fn on_update(&mut self, placeholder: &Message, stats: &StreamingStats) {
        if let Some(slot) = self
            .messages
            .iter_mut()
            .rev()
            .find(|m| m.id == self.placeholder_id)
        {
            slot.content.clone_from(&placeholder.content);
        }
        *self.stats = Some(*stats);
        self.outer.on_update(placeholder, stats);
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use super::*;

    use std::sync::{Arc, Mutex};

    use bytes::Bytes;
    use futures::StreamExt;

    use crate::consumer::ByteStream;

    #[derive(Debug, Default)]
    struct Tables {
        conversations: Vec<Conversation>,
        messages: Vec<Message>,
        fail_assistant_save: bool,
        next_id: u32,
    }

    #[derive(Debug, Clone, Default)]
    struct MemoryStore(Arc<Mutex<Tables>>);

    impl MemoryStore {
        fn tables(&self) -> std::sync::MutexGuard<'_, Tables> {
            self.0.lock().unwrap()
        }
    }

    impl HistoryStore for MemoryStore {
        async fn create_conversation(&self, title: &str) -> Result<Conversation, ClientError> {
            let mut t = self.tables();
            t.next_id += 1;
            let now = Utc::now();
            let c = Conversation {
                id: format!("conv-{}", t.next_id),
                user_id: "user-1".into(),
                title: title.to_owned(),
                created_at: now,
                updated_at: now,
            };
            t.conversations.push(c.clone());
            Ok(c)
        }

        async fn save_message(
            &self,
            conversation_id: &str,
            role: Role,
            content: &str,
        ) -> Result<Message, ClientError> {
            let mut t = self.tables();
            if role == Role::Assistant && t.fail_assistant_save {
                return Err(ClientError::Status {
                    status: 500,
                    message: "internal server error".into(),
                });
            }
            t.next_id += 1;
            let m = Message {
                id: format!("msg-{}", t.next_id),
                conversation_id: conversation_id.to_owned(),
                role,
                content: content.to_owned(),
                created_at: Utc::now(),
            };
            t.messages.push(m.clone());
            Ok(m)
        }

        async fn touch_conversation(&self, conversation_id: &str) -> Result<Conversation, ClientError> {
            let mut t = self.tables();
            let c = t
                .conversations
                .iter_mut()
                .find(|c| c.id == conversation_id)
                .ok_or(ClientError::Status {
                    status: 404,
                    message: "conversation not found".into(),
                })?;
            c.updated_at = Utc::now();
            Ok(c.clone())
        }

        async fn list_conversations(&self) -> Result<Vec<Conversation>, ClientError> {
            let mut list = self.tables().conversations.clone();
            list.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
            Ok(list)
        }

        async fn list_messages(&self, conversation_id: &str) -> Result<Vec<Message>, ClientError> {
            Ok(self
                .tables()
                .messages
                .iter()
                .filter(|m| m.conversation_id == conversation_id)
                .cloned()
                .collect())
        }
    }

    /// Replays a fixed chunk script and records every history it was opened with.
    #[derive(Clone, Default)]
    struct ScriptedTransport {
        script: Arc<Mutex<Vec<Result<&'static str, u16>>>>,
        opened: Arc<Mutex<Vec<Vec<ChatTurn>>>>,
    }

    impl ScriptedTransport {
        fn with(script: Vec<Result<&'static str, u16>>) -> Self {
            Self {
                script: Arc::new(Mutex::new(script)),
                opened: Arc::default(),
            }
        }
    }

    impl ChatTransport for ScriptedTransport {
        async fn open(&self, history: &[ChatTurn]) -> Result<ByteStream, ClientError> {
            self.opened.lock().unwrap().push(history.to_vec());
            let script = std::mem::take(&mut *self.script.lock().unwrap());
            let items: Vec<Result<Bytes, ClientError>> = script
                .into_iter()
                .map(|item| match item {
                    Ok(text) => Ok(Bytes::from_static(text.as_bytes())),
                    Err(status) => Err(ClientError::Status {
                        status,
                        message: "stream aborted".into(),
                    }),
                })
                .collect();
            Ok(futures::stream::iter(items).boxed())
        }
    }

    #[derive(Default)]
    struct Screen {
        frames: Vec<String>,
    }

    impl StreamObserver for Screen {
        fn on_update(&mut self, placeholder: &Message, _stats: &StreamingStats) {
            self.frames.push(placeholder.content.clone());
        }
    }

    #[tokio::test]
    async fn first_message_creates_conversation_and_persists_reply() {
        let store = MemoryStore::default();
        let transport = ScriptedTransport::with(vec![Ok("Hel"), Ok("lo "), Ok("there")]);
        let mut session = ChatSession::new(store.clone(), transport.clone());
        let mut screen = Screen::default();

        let reply = session.send("Hi", &mut screen).await.unwrap();

        assert_eq!(screen.frames, vec!["Hel", "Hello ", "Hello there"]);
        assert_eq!(reply.content, "Hello there");
        assert!(!reply.is_placeholder());

        let t = store.tables();
        assert_eq!(t.conversations.len(), 1);
        assert_eq!(t.conversations[0].title, "Hi");
        let roles: Vec<Role> = t.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant]);
        assert_eq!(t.messages[1].content, "Hello there");
        drop(t);

        // The placeholder was replaced, not duplicated.
        assert_eq!(session.messages().len(), 2);
        assert!(session.messages().iter().all(|m| !m.is_placeholder()));
        assert_eq!(session.messages()[1], reply);
        assert_eq!(session.conversation_id(), Some("conv-1"));
        assert_eq!(session.conversations().len(), 1);
        assert_eq!(session.stats().unwrap().token_count, 3);
        assert!(!session.is_streaming());

        let opened = transport.opened.lock().unwrap();
        assert_eq!(opened[0], vec![ChatTurn::new(Role::User, "Hi")]);
    }

    #[tokio::test]
    async fn interrupted_stream_persists_nothing_and_keeps_partial_text() {
        let store = MemoryStore::default();
        let transport = ScriptedTransport::with(vec![Ok("Par"), Ok("tial"), Err(502)]);
        let mut session = ChatSession::new(store.clone(), transport);

        let err = session.send("Hi", &mut ()).await.unwrap_err();
        assert!(matches!(err, SendError::Stream(_)));
        assert_eq!(err.to_string(), "failed to send message");

        let t = store.tables();
        assert!(t.messages.iter().all(|m| m.role != Role::Assistant));
        drop(t);

        let last = session.messages().last().unwrap();
        assert!(last.is_placeholder());
        assert_eq!(last.content, "Partial");
        assert!(!session.is_streaming());
    }

    #[tokio::test]
    async fn failed_reply_save_leaves_unconfirmed_placeholder() {
        let store = MemoryStore::default();
        store.tables().fail_assistant_save = true;
        let transport = ScriptedTransport::with(vec![Ok("ok")]);
        let mut session = ChatSession::new(store.clone(), transport);

        let reply = session.send("Hi", &mut ()).await.unwrap();
        assert!(reply.is_placeholder());
        assert_eq!(reply.content, "ok");
        assert_eq!(session.messages().len(), 2);
        assert!(session.messages()[1].is_placeholder());
    }

    #[tokio::test]
    async fn follow_up_sends_persisted_history_only() {
        let store = MemoryStore::default();
        let transport = ScriptedTransport::with(vec![Ok("first answer")]);
        let mut session = ChatSession::new(store.clone(), transport.clone());
        session.send("one", &mut ()).await.unwrap();

        *transport.script.lock().unwrap() = vec![Ok("second answer")];
        session.send("two", &mut ()).await.unwrap();

        let opened = transport.opened.lock().unwrap();
        assert_eq!(
            opened[1],
            vec![
                ChatTurn::new(Role::User, "one"),
                ChatTurn::new(Role::Assistant, "first answer"),
                ChatTurn::new(Role::User, "two"),
            ]
        );
        // Title derived once, from the first message.
        assert_eq!(store.tables().conversations.len(), 1);
        assert_eq!(store.tables().conversations[0].title, "one");
    }

    #[tokio::test]
    async fn select_and_reset_conversation() {
        let store = MemoryStore::default();
        let mut session = ChatSession::new(store.clone(), ScriptedTransport::with(vec![Ok("a")]));
        session.send("q", &mut ()).await.unwrap();

        session.new_conversation();
        assert!(session.messages().is_empty());
        assert!(session.stats().is_none());
        assert_eq!(session.conversation_id(), None);

        session.select_conversation("conv-1").await.unwrap();
        assert_eq!(session.messages().len(), 2);
        assert!(session.stats().is_none());
    }

    #[tokio::test]
    async fn blank_input_is_rejected_before_any_io() {
        let store = MemoryStore::default();
        let transport = ScriptedTransport::default();
        let mut session = ChatSession::new(store.clone(), transport.clone());
        assert!(matches!(
            session.send("   ", &mut ()).await,
            Err(SendError::EmptyMessage)
        ));
        assert!(store.tables().conversations.is_empty());
        assert!(transport.opened.lock().unwrap().is_empty());
    }
}
