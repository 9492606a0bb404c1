use log::{debug, info};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Mutex as TurnLock;

use crate::config::Config;
use crate::model::client::{chat_body, generate_body, OllamaClient, CHAT_PATH, GENERATE_PATH};
use crate::model::decode::{decode_chat, decode_generate};
use crate::model::history::{ConversationKey, HistoryStore};
use crate::model::RelayError;
use crate::web::models::{ChatRequest, Message};

pub const EMPTY_PROMPT_RESPONSE: &str = "[Empty prompt]";
pub const LOCAL_FALLBACK_PREFIX: &str = "(local fallback) You said: ";
pub const DEFAULT_CONVERSATION_ID: &str = "default";

/// Result of one chat turn as seen by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayOutcome {
    pub response_text: String,
    pub used_model_server: bool,
}

impl RelayOutcome {
    fn empty_prompt() -> Self {
        Self {
            response_text: EMPTY_PROMPT_RESPONSE.to_string(),
            used_model_server: false,
        }
    }

    fn local_echo(message: &str) -> Self {
        Self {
            response_text: format!("{}{}", LOCAL_FALLBACK_PREFIX, message),
            used_model_server: false,
        }
    }

    fn from_model(reply: String) -> Self {
        Self {
            response_text: reply,
            used_model_server: true,
        }
    }
}

/// Forwards chat turns to the model server, keeping a bounded history per
/// conversation and degrading from `/api/chat` to `/api/generate` to a
/// local echo.
pub struct Relay {
    client: OllamaClient,
    history: Arc<dyn HistoryStore>,
    enabled_by_default: bool,
    default_model: String,
    num_predict: u32,
    timeout: Duration,
    turn_locks: Mutex<HashMap<ConversationKey, Arc<TurnLock<()>>>>,
}

impl Relay {
    pub fn new(config: &Config, client: OllamaClient, history: Arc<dyn HistoryStore>) -> Self {
        Self {
            client,
            history,
            enabled_by_default: config.ollama_enabled,
            default_model: config.ollama_model.clone(),
            num_predict: config.num_predict,
            timeout: config.ollama_timeout,
            turn_locks: Mutex::new(HashMap::new()),
        }
    }

    pub async fn handle(&self, request: &ChatRequest) -> Result<RelayOutcome, RelayError> {
        let user_msg = request.message.trim();
        if user_msg.is_empty() {
            return Ok(RelayOutcome::empty_prompt());
        }

        let use_remote = request.use_ollama.unwrap_or(self.enabled_by_default);
        if !use_remote {
            debug!("Model server disabled for this request");
            return Ok(RelayOutcome::local_echo(user_msg));
        }

        let model = non_blank(request.model.as_deref()).unwrap_or(self.default_model.as_str());
        let conversation_id = non_blank(request.conversation_id.as_deref()).unwrap_or(DEFAULT_CONVERSATION_ID);
        let key = ConversationKey::new(conversation_id, model);

        // Turns on the same conversation run one at a time so the
        // read-then-commit below never interleaves.
        let lock = self.turn_lock(&key)?;
        let _turn = lock.lock().await;

        let mut messages = self.history.get(&key)?;
        messages.push(Message::user(user_msg));

        match self.ask_model(model, &messages).await {
            Some(reply) => {
                self.history
                    .append_turn(&key, Message::user(user_msg), Message::assistant(reply.clone()))?;
                Ok(RelayOutcome::from_model(reply))
            }
            None => {
                info!("No reply from model server for conversation {:?}; using local fallback", key.conversation_id);
                Ok(RelayOutcome::local_echo(user_msg))
            }
        }
    }

    async fn ask_model(&self, model: &str, messages: &[Message]) -> Option<String> {
        let reply = self
            .client
            .send(CHAT_PATH, &chat_body(model, messages, self.num_predict), self.timeout)
            .await;
        if reply.is_ok() {
            if let Some(text) = decode_chat(&reply.body) {
                return Some(text);
            }
            info!("[OLLAMA] empty content from {}; falling back to {}", CHAT_PATH, GENERATE_PATH);
        }

        let prompt = flatten_prompt(messages);
        let reply = self
            .client
            .send(GENERATE_PATH, &generate_body(model, &prompt, self.num_predict), self.timeout)
            .await;
        if reply.is_ok() {
            decode_generate(&reply.body)
        } else {
            None
        }
    }

    fn turn_lock(&self, key: &ConversationKey) -> Result<Arc<TurnLock<()>>, RelayError> {
        let mut locks = self
            .turn_locks
            .lock()
            .map_err(|_| RelayError::Internal("turn lock table poisoned".to_string()))?;
        Ok(locks.entry(key.clone()).or_default().clone())
    }
}

/// Renders a conversation as `Role: content` lines ending with an open
/// `Assistant:` line.
pub fn flatten_prompt(messages: &[Message]) -> String {
    let mut lines: Vec<String> = messages
        .iter()
        .map(|m| format!("{}: {}", m.role.label(), m.content))
        .collect();
    lines.push("Assistant:".to_string());
    lines.join("\n")
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}
