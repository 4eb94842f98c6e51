//! Image extraction from chat transcripts.
//!
//! Chat hosts hand tools an OpenAI-style message list. Images attached to
//! the latest user turn arrive as `image_url` content parts holding either
//! a base64 `data:image/...` URI or a plain `http(s)` URL. This module
//! turns those parts into [`ImageRef`]s in the order they were attached.

use serde::Deserialize;

use crate::error::CoreError;
use crate::job::ImageRef;

/// One chat turn.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: MessageContent,
}

/// Message body: plain text or a list of typed content parts.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<serde_json::Value>),
    #[default]
    Empty,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TranscriptDocument {
    Messages(Vec<ChatMessage>),
    Wrapped { messages: Vec<ChatMessage> },
}

/// Parse a transcript given either as a bare message array or as an
/// object with a `messages` field.
pub fn parse_transcript(json: &str) -> Result<Vec<ChatMessage>, CoreError> {
    let doc: TranscriptDocument = serde_json::from_str(json).map_err(|e| CoreError::Malformed {
        what: "transcript",
        reason: e.to_string(),
    })?;
    Ok(match doc {
        TranscriptDocument::Messages(messages) => messages,
        TranscriptDocument::Wrapped { messages } => messages,
    })
}

/// Collect up to `max_images` images from the most recent user message.
///
/// Parts that are not images, and `data:` URIs that fail to decode, are
/// skipped. Earlier user messages are never consulted, even when the
/// latest one carries no images.
pub fn extract_images(messages: &[ChatMessage], max_images: usize) -> Vec<ImageRef> {
    let Some(last_user) = messages.iter().rev().find(|m| m.role == "user") else {
        return Vec::new();
    };

    let MessageContent::Parts(parts) = &last_user.content else {
        return Vec::new();
    };

    parts
        .iter()
        .filter_map(image_part_url)
        .filter_map(|url| {
            if url.starts_with("data:image") {
                ImageRef::parse(url).ok()
            } else if url.starts_with("http") {
                Some(ImageRef::url(url))
            } else {
                None
            }
        })
        .take(max_images)
        .collect()
}

fn image_part_url(part: &serde_json::Value) -> Option<&str> {
    if part.get("type")?.as_str()? != "image_url" {
        return None;
    }
    part.get("image_url")?.get("url")?.as_str()
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn image_part(url: &str) -> serde_json::Value {
        serde_json::json!({"type": "image_url", "image_url": {"url": url}})
    }

    fn user(parts: Vec<serde_json::Value>) -> ChatMessage {
        ChatMessage {
            role: "user".into(),
            content: MessageContent::Parts(parts),
        }
    }

    #[test]
    fn extracts_from_latest_user_message_only() {
        let messages = vec![
            user(vec![image_part("https://old/a.png")]),
            ChatMessage {
                role: "assistant".into(),
                content: MessageContent::Text("done".into()),
            },
            user(vec![
                serde_json::json!({"type": "text", "text": "combine these"}),
                image_part("data:image/jpeg;base64,/9j/4A=="),
                image_part("https://new/b.png"),
            ]),
        ];

        let images = extract_images(&messages, 3);
        assert_eq!(images.len(), 2);
        assert_eq!(images[0].media_type(), Some("image/jpeg"));
        assert_matches!(&images[1], ImageRef::Url(u) if u == "https://new/b.png");
    }

    #[test]
    fn caps_at_max_images() {
        let parts = (0..5).map(|i| image_part(&format!("https://x/{i}.png"))).collect();
        let images = extract_images(&[user(parts)], 3);
        assert_eq!(images.len(), 3);
        assert_matches!(&images[2], ImageRef::Url(u) if u == "https://x/2.png");
    }

    #[test]
    fn skips_undecodable_and_unknown_urls() {
        let parts = vec![
            image_part("data:image/png;base64,@@@"),
            image_part("ftp://x/a.png"),
            serde_json::json!({"type": "image_url", "image_url": "not-an-object"}),
        ];
        assert!(extract_images(&[user(parts)], 3).is_empty());
    }

    #[test]
    fn no_user_message_yields_nothing() {
        let messages = vec![ChatMessage {
            role: "system".into(),
            content: MessageContent::Text("hi".into()),
        }];
        assert!(extract_images(&messages, 3).is_empty());
    }

    #[test]
    fn parses_bare_and_wrapped_transcripts() {
        let bare = r#"[{"role": "user", "content": "hello"}]"#;
        let wrapped = r#"{"messages": [{"role": "user", "content": [
            {"type": "image_url", "image_url": {"url": "https://x/a.png"}}
        ]}]}"#;

        assert_eq!(parse_transcript(bare).unwrap().len(), 1);
        let messages = parse_transcript(wrapped).unwrap();
        assert_eq!(extract_images(&messages, 3).len(), 1);
    }

    #[test]
    fn null_content_is_empty() {
        let messages = parse_transcript(r#"[{"role": "user", "content": null}]"#).unwrap();
        assert_matches!(messages[0].content, MessageContent::Empty);
    }
}
