use anyhow::Result;
use log::{debug, info, warn};
use reqwest::{Client, Method};
use serde_json::{json, Value};
use std::time::Duration;

use crate::model::decode::{decode_chat, decode_model_names};
use crate::model::{truncate_chars, TransportError};
use crate::web::models::Message;

/// Status reported when no HTTP exchange took place at all.
pub const TRANSPORT_FAILURE_STATUS: u16 = 599;

pub const CHAT_PATH: &str = "/api/chat";
pub const GENERATE_PATH: &str = "/api/generate";
pub const TAGS_PATH: &str = "/api/tags";

const TAGS_TIMEOUT: Duration = Duration::from_secs(10);
const ERROR_DETAIL_CHARS: usize = 180;
const SNIPPET_CHARS: usize = 200;

/// Raw result of one call to the model server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportReply {
    pub status: u16,
    pub body: String,
}

impl TransportReply {
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }

    fn from_error(error: &TransportError) -> Self {
        let detail = format!("{}: {}", error.kind(), truncate_chars(&error.to_string(), ERROR_DETAIL_CHARS));
        Self {
            status: TRANSPORT_FAILURE_STATUS,
            body: json!({ "error": detail }).to_string(),
        }
    }
}

// Thin wrapper around the Ollama HTTP API
#[derive(Clone)]
pub struct OllamaClient {
    base_url: String,
    client: Client,
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        info!("Using Ollama server at: {}", base_url);

        // Idle connections are never kept, so every call dials afresh.
        let client = Client::builder().pool_max_idle_per_host(0).build()?;

        Ok(Self { base_url, client })
    }

    /// POSTs `body` as JSON to `path`. Never fails: transport problems come
    /// back as [`TRANSPORT_FAILURE_STATUS`] with a small JSON error body.
    pub async fn send(&self, path: &str, body: &Value, timeout: Duration) -> TransportReply {
        self.call(Method::POST, path, Some(body), timeout).await
    }

    pub async fn get(&self, path: &str, timeout: Duration) -> TransportReply {
        self.call(Method::GET, path, None, timeout).await
    }

    async fn call(&self, method: Method, path: &str, body: Option<&Value>, timeout: Duration) -> TransportReply {
        let url = format!("{}{}", self.base_url, path);
        match body {
            Some(body) => info!("[OLLAMA] {} {} keys={:?}", method, url, body_keys(body)),
            None => info!("[OLLAMA] {} {}", method, url),
        }

        match self.try_call(method, &url, body, timeout).await {
            Ok(reply) => {
                info!("[OLLAMA] status={} bytes={}", reply.status, reply.body.len());
                debug!("[OLLAMA] snippet={:?}", truncate_chars(&reply.body, SNIPPET_CHARS));
                reply
            }
            Err(e) => {
                warn!("[OLLAMA] {} failed: {}", url, e);
                TransportReply::from_error(&e)
            }
        }
    }

    async fn try_call(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
        timeout: Duration,
    ) -> Result<TransportReply, TransportError> {
        let mut request = self.client.request(method, url).timeout(timeout);
        if let Some(body) = body {
            request = request.json(body);
        }

        // The response (and with it the connection) is dropped on every path out.
        let response = request.send().await.map_err(TransportError::from)?;
        let status = response.status().as_u16();
        let bytes = response.bytes().await.map_err(TransportError::from)?;

        Ok(TransportReply {
            status,
            body: String::from_utf8_lossy(&bytes).into_owned(),
        })
    }

    /// Names of the models installed on the server; empty on any failure.
    pub async fn list_models(&self) -> Vec<String> {
        let reply = self.get(TAGS_PATH, TAGS_TIMEOUT).await;
        if !reply.is_ok() {
            warn!("[OLLAMA] {} unavailable (status={})", TAGS_PATH, reply.status);
            return Vec::new();
        }
        decode_model_names(&reply.body)
    }

    /// One throwaway chat call so the server loads the model before the
    /// first real request. Outcome is only logged.
    pub async fn warmup(&self, model: &str, num_predict: u32, timeout: Duration) {
        info!("[OLLAMA] warmup for model={:?}", model);
        let body = chat_body(model, &[Message::user("warmup")], num_predict);
        let reply = self.send(CHAT_PATH, &body, timeout).await;
        if reply.is_ok() && decode_chat(&reply.body).is_some() {
            info!("[OLLAMA] warmup complete for model={:?}", model);
        } else {
            warn!("[OLLAMA] warmup failed for model={:?} (status={})", model, reply.status);
        }
    }
}

pub fn chat_body(model: &str, messages: &[Message], num_predict: u32) -> Value {
    json!({
        "model": model,
        "messages": messages,
        "stream": false,
        "options": { "num_predict": num_predict }
    })
}

pub fn generate_body(model: &str, prompt: &str, num_predict: u32) -> Value {
    json!({
        "model": model,
        "prompt": prompt,
        "stream": false,
        "options": { "num_predict": num_predict }
    })
}

fn body_keys(body: &Value) -> Vec<&str> {
    body.as_object()
        .map(|map| map.keys().map(String::as_str).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn released_port_url() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        format!("http://127.0.0.1:{}", port)
    }

    #[tokio::test]
    async fn send_posts_json_and_returns_status_and_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", CHAT_PATH)
            .match_header("content-type", "application/json")
            .match_body(Matcher::PartialJson(json!({"model": "m", "stream": false})))
            .with_status(200)
            .with_body(r#"{"message":{"content":"ok"}}"#)
            .create_async()
            .await;

        let client = OllamaClient::new(server.url()).unwrap();
        let reply = client
            .send(CHAT_PATH, &chat_body("m", &[Message::user("hi")], 16), Duration::from_secs(5))
            .await;

        mock.assert_async().await;
        assert_eq!(reply.status, 200);
        assert_eq!(reply.body, r#"{"message":{"content":"ok"}}"#);
    }

    #[tokio::test]
    async fn non_success_status_is_passed_through() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", GENERATE_PATH)
            .with_status(404)
            .with_body(r#"{"error":"model not found"}"#)
            .create_async()
            .await;

        let client = OllamaClient::new(server.url()).unwrap();
        let reply = client
            .send(GENERATE_PATH, &generate_body("m", "p", 16), Duration::from_secs(5))
            .await;

        assert_eq!(reply.status, 404);
        assert!(!reply.is_ok());
    }

    #[tokio::test]
    async fn connection_refused_becomes_sentinel_reply() {
        let client = OllamaClient::new(released_port_url()).unwrap();
        let reply = client
            .send(CHAT_PATH, &json!({"model": "m"}), Duration::from_secs(2))
            .await;

        assert_eq!(reply.status, TRANSPORT_FAILURE_STATUS);
        let body: Value = serde_json::from_str(&reply.body).unwrap();
        let detail = body["error"].as_str().unwrap();
        assert!(detail.starts_with("ConnectError: "), "{detail}");
        assert!(detail.chars().count() <= "ConnectError: ".len() + ERROR_DETAIL_CHARS);
    }

    #[tokio::test]
    async fn silent_server_times_out_into_sentinel_reply() {
        // Connections are accepted by the kernel backlog but never answered.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let client = OllamaClient::new(url).unwrap();

        let reply = client
            .send(CHAT_PATH, &json!({"model": "m"}), Duration::from_millis(300))
            .await;
        drop(listener);

        assert_eq!(reply.status, TRANSPORT_FAILURE_STATUS);
        let body: Value = serde_json::from_str(&reply.body).unwrap();
        let detail = body["error"].as_str().unwrap();
        assert!(detail.starts_with("Timeout: "), "{detail}");
    }

    #[tokio::test]
    async fn list_models_reads_tag_names() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", TAGS_PATH)
            .with_status(200)
            .with_body(r#"{"models":[{"name":"llama3:8b"},{"name":"gpt-oss:20b"}]}"#)
            .create_async()
            .await;

        let client = OllamaClient::new(server.url()).unwrap();
        assert_eq!(client.list_models().await, vec!["llama3:8b", "gpt-oss:20b"]);
    }

    #[tokio::test]
    async fn list_models_is_empty_on_failure() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", TAGS_PATH)
            .with_status(500)
            .create_async()
            .await;
        let client = OllamaClient::new(server.url()).unwrap();
        assert!(client.list_models().await.is_empty());

        let unreachable = OllamaClient::new(released_port_url()).unwrap();
        assert!(unreachable.list_models().await.is_empty());
    }

    #[tokio::test]
    async fn warmup_sends_single_user_message() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", CHAT_PATH)
            .match_body(Matcher::PartialJson(json!({
                "model": "m",
                "messages": [{"role": "user", "content": "warmup"}]
            })))
            .with_status(200)
            .with_body(r#"{"message":{"content":"ready"}}"#)
            .expect(1)
            .create_async()
            .await;

        let client = OllamaClient::new(server.url()).unwrap();
        client.warmup("m", 8, Duration::from_secs(5)).await;
        mock.assert_async().await;
    }

    #[test]
    fn sentinel_body_is_valid_json_even_with_quotes() {
        let reply = TransportReply::from_error(&TransportError::Other("bad \"quote\"".to_string()));
        let body: Value = serde_json::from_str(&reply.body).unwrap();
        assert_eq!(body["error"], "RequestError: bad \"quote\"");
    }
}
