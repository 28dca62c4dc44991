use super::logging::{debug_payload_enabled, emit_debug_payload};
use crate::config::{Config, NO_LANGUAGE};
use crate::types::ChatMessage;
use crate::util::is_local_endpoint_url;
use anyhow::anyhow;
use anyhow::Result;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde_json::json;
use std::pin::Pin;
#[cfg(test)]
use std::sync::Arc;

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

const REQUEST_TEMPERATURE: f64 = 0.7;
const BASE_INSTRUCTION: &str = "You are a helpful assistant.";

/// The instruction injected ahead of the turn history. The wording is
/// configuration, not logic: the selected language only changes which
/// template is used.
pub fn system_instruction(language: &str) -> String {
    let language = language.trim();
    if language.is_empty() || language.eq_ignore_ascii_case(NO_LANGUAGE) {
        BASE_INSTRUCTION.to_string()
    } else {
        format!(
            "{BASE_INSTRUCTION} When asked for code, always provide it in the {language} language."
        )
    }
}

#[cfg(test)]
pub trait MockStreamProducer: Send + Sync {
    fn create_mock_stream(&self, messages: &[ChatMessage]) -> Result<ByteStream>;
}

#[derive(Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    api_key: Option<String>,
    api_url: String,
    model: String,
    private: bool,
    #[cfg(test)]
    mock_stream_producer: Option<Arc<dyn MockStreamProducer>>,
}

impl ChatClient {
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: config.api_key.clone(),
            api_url: config.api_url.clone(),
            model: config.model.clone(),
            private: config.private,
            #[cfg(test)]
            mock_stream_producer: None,
        }
    }

    #[cfg(test)]
    pub fn new_mock(mock_producer: Arc<dyn MockStreamProducer>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: None,
            api_url: "http://localhost:8080/openai".to_string(),
            model: "mock-model".to_string(),
            private: false,
            mock_stream_producer: Some(mock_producer),
        }
    }

    /// Open one streamed response for the given turn history. The system
    /// instruction for `language` is injected ahead of the history; the
    /// upstream wire format is newline-framed records handled by
    /// [`super::DeltaDecoder`].
    pub async fn create_stream(
        &self,
        history: &[ChatMessage],
        language: &str,
    ) -> Result<ByteStream> {
        let messages = payload_messages(history, language);

        #[cfg(test)]
        {
            if let Some(producer) = &self.mock_stream_producer {
                return producer.create_mock_stream(&messages);
            }
        }

        let payload = json!({
            "model": self.model,
            "messages": messages,
            "temperature": REQUEST_TEMPERATURE,
            "stream": true,
            "private": self.private,
        });

        let mut request = self
            .http
            .post(&self.api_url)
            .header("content-type", "application/json")
            .json(&payload);

        if debug_payload_enabled() {
            emit_debug_payload(&self.api_url, &payload);
        }

        if let Some(api_key) = &self.api_key {
            request = request.header("authorization", format!("Bearer {api_key}"));
        }

        let response = request
            .send()
            .await
            .map_err(|error| map_request_error(error, &self.api_url))?
            .error_for_status()
            .map_err(|error| map_request_error(error, &self.api_url))?;

        let request_url = self.api_url.clone();
        let stream = response
            .bytes_stream()
            .map(move |item| item.map_err(|error| map_request_error(error, &request_url)));
        Ok(Box::pin(stream))
    }
}

fn payload_messages(history: &[ChatMessage], language: &str) -> Vec<ChatMessage> {
    let mut out = Vec::with_capacity(history.len() + 1);
    out.push(ChatMessage::system(system_instruction(language)));
    out.extend(history.iter().cloned());
    out
}

fn map_request_error(error: reqwest::Error, request_url: &str) -> anyhow::Error {
    if error.is_connect() && is_local_endpoint_url(request_url) {
        return anyhow!(
            "cannot reach local API endpoint '{}': {}. Start your local server or update CHATPANE_API_URL.",
            request_url,
            error
        );
    }
    if error.is_connect() {
        return anyhow!("cannot reach API endpoint '{}': {}", request_url, error);
    }
    if error.is_timeout() {
        return anyhow!("API request to '{}' timed out: {}", request_url, error);
    }
    if let Some(status) = error.status() {
        return anyhow!(
            "API endpoint '{}' returned HTTP {}: {}",
            request_url,
            status,
            error
        );
    }
    anyhow!("API request to '{}' failed: {}", request_url, error)
}
