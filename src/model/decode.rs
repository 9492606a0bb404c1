use log::warn;
use serde::Deserialize;

// Every field is optional: the model server may omit any of them and a
// missing value is treated the same as an empty one.

#[derive(Debug, Default, Deserialize)]
struct ChatBody {
    #[serde(default)]
    message: Option<ChatBodyMessage>,
}

#[derive(Debug, Default, Deserialize)]
struct ChatBodyMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct GenerateBody {
    #[serde(default)]
    response: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TagsBody {
    #[serde(default)]
    models: Option<Vec<TagEntry>>,
}

#[derive(Debug, Default, Deserialize)]
struct TagEntry {
    #[serde(default)]
    name: Option<String>,
}

fn parse<'a, T: Deserialize<'a>>(raw: &'a str, what: &str) -> Option<T> {
    match serde_json::from_str(raw) {
        Ok(body) => Some(body),
        Err(e) => {
            warn!("[OLLAMA] {} parse error: {}", what, e);
            None
        }
    }
}

/// Extracts `message.content` from a `/api/chat` reply, trimmed.
pub fn decode_chat(raw: &str) -> Option<String> {
    let body: ChatBody = parse(raw, "chat")?;
    let content = body.message?.content?;
    let content = content.trim();
    if content.is_empty() {
        None
    } else {
        Some(content.to_string())
    }
}

/// Extracts `response` from a `/api/generate` reply.
pub fn decode_generate(raw: &str) -> Option<String> {
    let body: GenerateBody = parse(raw, "generate")?;
    body.response.filter(|text| !text.is_empty())
}

/// Collects the non-empty `name` of every entry under `models`.
pub fn decode_model_names(raw: &str) -> Vec<String> {
    let Some(body) = parse::<TagsBody>(raw, "tags") else {
        return Vec::new();
    };
    body.models
        .unwrap_or_default()
        .into_iter()
        .filter_map(|entry| entry.name)
        .filter(|name| !name.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_content_is_extracted_and_trimmed() {
        let raw = r#"{"model":"m","message":{"role":"assistant","content":"  hi there \n"},"done":true}"#;
        assert_eq!(decode_chat(raw).as_deref(), Some("hi there"));
    }

    #[test]
    fn chat_without_usable_text() {
        assert_eq!(decode_chat(r#"{"message":{"content":"   "}}"#), None);
        assert_eq!(decode_chat(r#"{"message":{}}"#), None);
        assert_eq!(decode_chat(r#"{"message":null}"#), None);
        assert_eq!(decode_chat(r#"{"done":true}"#), None);
        assert_eq!(decode_chat(""), None);
        assert_eq!(decode_chat("<html>bad gateway</html>"), None);
    }

    #[test]
    fn generate_response_is_returned_verbatim() {
        let raw = r#"{"model":"m","response":" Paris.","done":true}"#;
        assert_eq!(decode_generate(raw).as_deref(), Some(" Paris."));
    }

    #[test]
    fn generate_without_usable_text() {
        assert_eq!(decode_generate(r#"{"response":""}"#), None);
        assert_eq!(decode_generate(r#"{"response":null}"#), None);
        assert_eq!(decode_generate("{}"), None);
        assert_eq!(decode_generate("{not json"), None);
    }

    #[test]
    fn model_names_skip_entries_without_name() {
        let raw = r#"{"models":[{"name":"llama3:8b","size":1},{"size":2},{"name":""},{"name":"gpt-oss:20b"}]}"#;
        assert_eq!(decode_model_names(raw), vec!["llama3:8b", "gpt-oss:20b"]);
    }

    #[test]
    fn model_names_tolerate_bad_bodies() {
        assert!(decode_model_names("{}").is_empty());
        assert!(decode_model_names(r#"{"models":null}"#).is_empty());
        assert!(decode_model_names("nope").is_empty());
    }
}
