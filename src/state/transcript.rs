use super::blocks::{parse_message, CodeBlock, ParsedMessage};
use crate::types::ChatMessage;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One user or assistant exchange unit. `content` is the raw message text
/// (fences included); `blocks` is the latest parse of that text. Only the
/// single in-progress assistant turn is ever mutated; everything before it is
/// settled history.
#[derive(Debug, Clone)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    pub blocks: Vec<CodeBlock>,
}

#[derive(Debug, Default)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// Append a settled user turn; returns its turn index.
    pub fn push_user(&mut self, content: String) -> usize {
        self.turns.push(Turn {
            role: Role::User,
            content,
            blocks: Vec::new(),
        });
        self.turns.len() - 1
    }

    /// Open the in-progress assistant turn for the streaming response;
    /// returns its turn index.
    pub fn begin_assistant(&mut self) -> usize {
        self.turns.push(Turn {
            role: Role::Assistant,
            content: String::new(),
            blocks: Vec::new(),
        });
        self.turns.len() - 1
    }

    /// Append one decoded delta to the in-progress assistant turn and
    /// re-derive the parse from the full cumulative text. Returns an owned
    /// snapshot for the rendering layer.
    pub fn apply_delta(&mut self, delta: &str) -> ParsedMessage {
        let turn_index = self.turns.len().saturating_sub(1);
        match self.turns.last_mut() {
            Some(turn) if turn.role == Role::Assistant => {
                turn.content.push_str(delta);
                let parsed = parse_message(&turn.content, turn_index);
                turn.blocks = parsed.blocks.clone();
                parsed
            }
            _ => ParsedMessage::default(),
        }
    }

    /// Replace the in-progress assistant turn's content outright (failure
    /// surfacing). Returns the snapshot of the replacement.
    pub fn replace_assistant_content(&mut self, content: String) -> ParsedMessage {
        let turn_index = self.turns.len().saturating_sub(1);
        match self.turns.last_mut() {
            Some(turn) if turn.role == Role::Assistant => {
                turn.content = content;
                let parsed = parse_message(&turn.content, turn_index);
                turn.blocks = parsed.blocks.clone();
                parsed
            }
            _ => ParsedMessage::default(),
        }
    }

    /// Drop the in-progress assistant turn (mid-stream abort). The preceding
    /// user turn stays in the history.
    pub fn abort_assistant(&mut self) {
        if matches!(self.turns.last(), Some(turn) if turn.role == Role::Assistant) {
            self.turns.pop();
        }
    }

    /// The raw content of the in-progress assistant turn.
    pub fn assistant_content(&self) -> &str {
        match self.turns.last() {
            Some(turn) if turn.role == Role::Assistant => &turn.content,
            _ => "",
        }
    }

    /// The turn history in wire shape, oldest first.
    pub fn history_for_api(&self) -> Vec<ChatMessage> {
        self.turns
            .iter()
            .map(|turn| ChatMessage {
                role: turn.role.as_str().to_string(),
                content: turn.content.clone(),
            })
            .collect()
    }
}
