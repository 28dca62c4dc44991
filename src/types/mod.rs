mod api;

pub use api::{ChatMessage, StreamChoice, StreamChunk, StreamDelta};
