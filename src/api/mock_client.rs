use crate::api::client::{ByteStream, MockStreamProducer};
use crate::types::ChatMessage;
use anyhow::{anyhow, Result};
use bytes::Bytes;
use futures::stream;
use std::sync::{Arc, Mutex};

/// One scripted transport chunk. `Bytes` chunks are delivered verbatim so
/// tests control exactly where chunk boundaries fall; `Error` simulates a
/// mid-stream transport failure.
#[derive(Clone)]
pub enum MockChunk {
    Bytes(String),
    Error(String),
}

impl MockChunk {
    pub fn bytes(data: impl Into<String>) -> Self {
        Self::Bytes(data.into())
    }
}

#[derive(Clone)]
pub struct MockChatClient {
    responses: Arc<Mutex<Vec<Vec<MockChunk>>>>,
}

impl MockChatClient {
    pub fn new(responses: Vec<Vec<MockChunk>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
        }
    }

    /// A producer whose next request fails before any byte is delivered.
    pub fn failing(message: impl Into<String>) -> FailingMockClient {
        FailingMockClient {
            message: message.into(),
        }
    }
}

impl MockStreamProducer for MockChatClient {
    fn create_mock_stream(&self, _messages: &[ChatMessage]) -> Result<ByteStream> {
        let mut responses_guard = self.responses.lock().unwrap();
        if responses_guard.is_empty() {
            return Err(anyhow!("MockChatClient: no more responses configured"));
        }
        let chunks = responses_guard.remove(0);

        let items: Vec<Result<Bytes>> = chunks
            .into_iter()
            .map(|chunk| match chunk {
                MockChunk::Bytes(data) => Ok(Bytes::from(data)),
                MockChunk::Error(message) => Err(anyhow!(message)),
            })
            .collect();

        Ok(Box::pin(stream::iter(items)))
    }
}

pub struct FailingMockClient {
    message: String,
}

impl MockStreamProducer for FailingMockClient {
    fn create_mock_stream(&self, _messages: &[ChatMessage]) -> Result<ByteStream> {
        Err(anyhow!(self.message.clone()))
    }
}
