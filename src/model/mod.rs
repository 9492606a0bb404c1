pub mod client;
pub mod decode;
pub mod history;
pub mod relay;

use thiserror::Error;

pub use client::OllamaClient;
pub use history::{ConversationKey, HistoryStore, InMemoryHistory};
pub use relay::Relay;

/// Failure to complete an HTTP exchange with the model server.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("{0}")]
    Connect(String),
    #[error("{0}")]
    Timeout(String),
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    pub fn kind(&self) -> &'static str {
        match self {
            TransportError::Connect(_) => "ConnectError",
            TransportError::Timeout(_) => "Timeout",
            TransportError::Other(_) => "RequestError",
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout(e.to_string())
        } else if e.is_connect() {
            TransportError::Connect(e.to_string())
        } else {
            TransportError::Other(e.to_string())
        }
    }
}

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("history store lock poisoned")]
    Poisoned,
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("history unavailable: {0}")]
    History(#[from] HistoryError),
    #[error("{0}")]
    Internal(String),
}

pub(crate) fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
