pub mod blocks;
pub mod session;
pub mod transcript;

pub use blocks::{parse_message, BlockId, CodeBlock, ParsedMessage};
pub use session::{ChatSession, SessionUpdate, FAILURE_MESSAGE};
pub use transcript::{Role, Transcript, Turn};
