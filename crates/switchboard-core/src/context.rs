//! Context Manager (spec.md §4.G) — bounded, in-memory per-chat message
//! history. Two-tier locking mirrors `agent-shell::session::SessionManager`:
//! a map-level `RwLock` for lookup/insert, and a per-chat `Mutex` so
//! concurrent chats make independent progress.

use crate::types::Message;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

struct ChatContext {
    messages: VecDeque<Message>,
    max_messages: usize,
}

impl ChatContext {
    fn new(max_messages: usize) -> Self {
        Self { messages: VecDeque::new(), max_messages }
    }

    fn append(&mut self, message: Message) {
        self.messages.push_back(message);
        while self.messages.len() > self.max_messages {
            self.messages.pop_front();
        }
    }

    fn history(&self, limit: Option<usize>) -> Vec<Message> {
        match limit {
            Some(n) if n < self.messages.len() => {
                self.messages.iter().skip(self.messages.len() - n).cloned().collect()
            }
            _ => self.messages.iter().cloned().collect(),
        }
    }
}

/// Holds every chat's bounded history behind independent per-chat locks.
pub struct ContextManager {
    chats: RwLock<HashMap<String, Arc<Mutex<ChatContext>>>>,
    max_messages: usize,
}

impl ContextManager {
    pub fn new(max_messages: usize) -> Self {
        Self { chats: RwLock::new(HashMap::new()), max_messages }
    }

    async fn chat_handle(&self, chat_id: &str) -> Arc<Mutex<ChatContext>> {
        {
            let chats = self.chats.read().await;
            if let Some(handle) = chats.get(chat_id) {
                return handle.clone();
            }
        }
        let mut chats = self.chats.write().await;
        chats
            .entry(chat_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(ChatContext::new(self.max_messages))))
            .clone()
    }

    pub async fn append(&self, chat_id: &str, message: Message) {
        let handle = self.chat_handle(chat_id).await;
        let mut context = handle.lock().await;
        context.append(message);
    }

    /// History in chronological order, most recent `limit` messages if
    /// given, else the full (bounded) history.
    pub async fn history(&self, chat_id: &str, limit: Option<usize>) -> Vec<Message> {
        let handle = self.chat_handle(chat_id).await;
        let context = handle.lock().await;
        context.history(limit)
    }

    pub async fn clear(&self, chat_id: &str) {
        let mut chats = self.chats.write().await;
        chats.remove(chat_id);
    }

    /// Number of distinct chats currently tracked, for health reporting.
    pub async fn chat_count(&self) -> usize {
        self.chats.read().await.len()
    }
}
