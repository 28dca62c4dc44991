use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_LANGUAGE: &str = "text";

const FENCE: &str = "```";
const PLACEHOLDER_OPEN: &str = "[[block:";
const PLACEHOLDER_CLOSE: &str = "]]";

/// Stable identity of a code block: the turn it belongs to and the ordinal of
/// its opening fence within that turn. Re-parsing a longer version of the
/// same text reproduces the same ids for the blocks that were already there.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct BlockId {
    pub turn: usize,
    pub index: usize,
}

impl BlockId {
    pub fn new(turn: usize, index: usize) -> Self {
        Self { turn, index }
    }

    /// The token standing in for this block in display text. The UI resolves
    /// it back to the block via [`parse_placeholder`].
    pub fn placeholder(self) -> String {
        format!("{PLACEHOLDER_OPEN}{self}{PLACEHOLDER_CLOSE}")
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.turn, self.index)
    }
}

/// Resolve a display-text line back to the block id it stands for.
pub fn parse_placeholder(line: &str) -> Option<BlockId> {
    let inner = line
        .trim()
        .strip_prefix(PLACEHOLDER_OPEN)?
        .strip_suffix(PLACEHOLDER_CLOSE)?;
    let (turn, index) = inner.split_once('.')?;
    Some(BlockId {
        turn: turn.parse().ok()?,
        index: index.parse().ok()?,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeBlock {
    pub id: BlockId,
    pub language: String,
    pub code: String,
    pub is_open: bool,
    pub title: String,
}

/// One full parse of a message: the display text with placeholders where the
/// fenced spans sit, and the block records in order of appearance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedMessage {
    pub display_text: String,
    pub blocks: Vec<CodeBlock>,
}

impl ParsedMessage {
    /// The block still waiting for its closing fence, if any. Fences do not
    /// nest, so there is at most one.
    pub fn open_block(&self) -> Option<&CodeBlock> {
        self.blocks.iter().find(|block| block.is_open)
    }

}

struct OpenFence {
    id: BlockId,
    language: String,
    lines: Vec<String>,
}

impl OpenFence {
    fn snapshot(&self, is_open: bool) -> CodeBlock {
        let joined = self.lines.join("\n");
        let code = if is_open {
            joined
        } else {
            joined.trim().to_string()
        };
        CodeBlock {
            id: self.id,
            language: self.language.clone(),
            code,
            is_open,
            title: format!("{} #{}", self.language, self.id.index + 1),
        }
    }
}

/// Classify the full cumulative text of one turn into plain spans and fenced
/// code spans. Called again from scratch after every delta; stability of the
/// result across those re-parses comes from [`BlockId`] alone.
pub fn parse_message(text: &str, turn: usize) -> ParsedMessage {
    let mut display_lines: Vec<String> = Vec::new();
    let mut blocks: Vec<CodeBlock> = Vec::new();
    let mut open: Option<OpenFence> = None;

    for line in text.split('\n') {
        match open.as_mut() {
            None => {
                if let Some(language) = opening_fence_language(line) {
                    let id = BlockId::new(turn, blocks.len());
                    display_lines.push(id.placeholder());
                    open = Some(OpenFence {
                        id,
                        language,
                        lines: Vec::new(),
                    });
                } else {
                    display_lines.push(line.to_string());
                }
            }
            Some(fence) => {
                if is_closing_fence(line) {
                    blocks.push(fence.snapshot(false));
                    open = None;
                } else {
                    fence.lines.push(line.to_string());
                }
            }
        }
    }

    // Text ending mid-block: the block stays open and is still returned so
    // the caller can render its partial body.
    if let Some(fence) = open {
        blocks.push(fence.snapshot(true));
    }

    ParsedMessage {
        display_text: display_lines.join("\n"),
        blocks,
    }
}

/// An opening fence is the marker optionally followed by a language tag; the
/// tag needs no separating space. A bare marker opens a block in the default
/// language.
fn opening_fence_language(line: &str) -> Option<String> {
    let tag = line.trim().strip_prefix(FENCE)?;
    let tag = tag.trim();
    if tag.is_empty() {
        Some(DEFAULT_LANGUAGE.to_string())
    } else {
        Some(tag.to_string())
    }
}

/// A closing fence is exactly the marker; trailing whitespace is tolerated,
/// anything else makes the line part of the code body.
fn is_closing_fence(line: &str) -> bool {
    line.trim_end() == FENCE
}
