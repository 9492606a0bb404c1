use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::model::HistoryError;
use crate::web::models::Message;

/// Identifies a history bucket. The same conversation id under a
/// different model is a separate conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConversationKey {
    pub conversation_id: String,
    pub model: String,
}

impl ConversationKey {
    pub fn new(conversation_id: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            model: model.into(),
        }
    }
}

pub trait HistoryStore: Send + Sync {
    /// Messages for `key`, oldest first. Unknown keys get an empty bucket.
    fn get(&self, key: &ConversationKey) -> Result<Vec<Message>, HistoryError>;

    /// Appends to the bucket, evicting from the front past capacity.
    fn append(&self, key: &ConversationKey, message: Message) -> Result<(), HistoryError>;

    /// Commits a user message and its reply together: either both land or
    /// neither does.
    fn append_turn(&self, key: &ConversationKey, user: Message, reply: Message) -> Result<(), HistoryError>;
}

/// Volatile store: buckets live until the process exits.
pub struct InMemoryHistory {
    capacity: usize,
    buckets: Mutex<HashMap<ConversationKey, VecDeque<Message>>>,
}

impl InMemoryHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            buckets: Mutex::new(HashMap::new()),
        }
    }
}

impl HistoryStore for InMemoryHistory {
    fn get(&self, key: &ConversationKey) -> Result<Vec<Message>, HistoryError> {
        let mut buckets = self.buckets.lock().map_err(|_| HistoryError::Poisoned)?;
        let bucket = buckets.entry(key.clone()).or_default();
        Ok(bucket.iter().cloned().collect())
    }

    fn append(&self, key: &ConversationKey, message: Message) -> Result<(), HistoryError> {
        self.push_all(key, [message])
    }

    fn append_turn(&self, key: &ConversationKey, user: Message, reply: Message) -> Result<(), HistoryError> {
        self.push_all(key, [user, reply])
    }
}

impl InMemoryHistory {
    fn push_all<I>(&self, key: &ConversationKey, messages: I) -> Result<(), HistoryError>
    where
        I: IntoIterator<Item = Message>,
    {
        let mut buckets = self.buckets.lock().map_err(|_| HistoryError::Poisoned)?;
        let bucket = buckets.entry(key.clone()).or_default();
        bucket.extend(messages);
        while bucket.len() > self.capacity {
            bucket.pop_front();
        }
        Ok(())
    }
}
