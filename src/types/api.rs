use serde::{Deserialize, Serialize};

/// One role/content pair in the request payload sent upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// One decoded chat-completions stream record.
///
/// Every field is optional on the wire; `#[serde(default)]` makes an absent
/// `choices[0].delta.content` path decode to `None` instead of an error, so
/// heartbeat and bookkeeping records reduce to an empty delta.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamChunk {
    #[serde(default)]
    pub choices: Vec<StreamChoice>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamChoice {
    #[serde(default)]
    pub delta: StreamDelta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamDelta {
    #[serde(default)]
    pub content: Option<String>,
}

impl StreamChunk {
    /// The text fragment carried by this record, if any.
    pub fn into_delta_content(self) -> Option<String> {
        self.choices.into_iter().next().and_then(|c| c.delta.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_with_content_path() {
        let chunk: StreamChunk = serde_json::from_str(
            r#"{"id":"c-1","choices":[{"index":0,"delta":{"content":"Hi"},"finish_reason":null}]}"#,
        )
        .unwrap();
        assert_eq!(chunk.into_delta_content().as_deref(), Some("Hi"));
    }

    #[test]
    fn test_chunk_without_delta_content_is_none() {
        let chunk: StreamChunk = serde_json::from_str(
            r#"{"choices":[{"index":0,"delta":{"role":"assistant"},"finish_reason":"stop"}]}"#,
        )
        .unwrap();
        assert_eq!(chunk.into_delta_content(), None);
    }

    #[test]
    fn test_chunk_without_choices_is_none() {
        let chunk: StreamChunk = serde_json::from_str(r#"{"created":123}"#).unwrap();
        assert_eq!(chunk.into_delta_content(), None);
    }
}
