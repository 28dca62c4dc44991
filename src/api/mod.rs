pub mod client;
pub mod decode;
pub mod logging;
#[cfg(test)]
pub mod mock_client;

pub use client::{ByteStream, ChatClient};
pub use decode::DeltaDecoder;
