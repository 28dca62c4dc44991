use super::blocks::{CodeBlock, ParsedMessage};
use super::transcript::Transcript;
use crate::api::{ChatClient, DeltaDecoder};
use anyhow::{bail, Result};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Replacement content surfaced on the assistant turn when a request or
/// stream fails. Nothing is retried; the user resubmits explicitly.
pub const FAILURE_MESSAGE: &str = "Sorry, I couldn't generate a response. Please try again.";

/// Snapshot handed to the rendering layer. The read loop owns the mutable
/// transcript; the UI only ever sees these owned copies.
#[derive(Debug)]
pub enum SessionUpdate {
    Assistant {
        turn: usize,
        display_text: String,
        blocks: Vec<CodeBlock>,
    },
    Error(String),
    TurnComplete {
        turn: usize,
    },
}

pub struct ChatSession {
    client: ChatClient,
    transcript: Transcript,
    turn_in_progress: bool,
}

impl ChatSession {
    pub fn new(client: ChatClient) -> Self {
        Self {
            client,
            transcript: Transcript::new(),
            turn_in_progress: false,
        }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn turn_in_progress(&self) -> bool {
        self.turn_in_progress
    }

    /// Start a new conversation. Refused while a turn is streaming.
    pub fn clear(&mut self) -> Result<()> {
        if self.turn_in_progress {
            bail!("cannot clear the transcript while a turn is streaming");
        }
        self.transcript.clear();
        Ok(())
    }

    /// Run one full turn: append the user message, stream the assistant
    /// response, and emit a snapshot after every applied delta. At most one
    /// turn may be in flight; a re-entrant call is refused without touching
    /// the transcript.
    pub async fn run_turn(
        &mut self,
        input: String,
        language: &str,
        update_tx: &mpsc::UnboundedSender<SessionUpdate>,
        cancel: CancellationToken,
    ) -> Result<()> {
        if self.turn_in_progress {
            bail!("a turn is already streaming");
        }
        self.turn_in_progress = true;
        let result = self.stream_turn(input, language, update_tx, cancel).await;
        self.turn_in_progress = false;
        result
    }

    async fn stream_turn(
        &mut self,
        input: String,
        language: &str,
        update_tx: &mpsc::UnboundedSender<SessionUpdate>,
        cancel: CancellationToken,
    ) -> Result<()> {
        self.transcript.push_user(input);
        let history = self.transcript.history_for_api();
        let turn = self.transcript.begin_assistant();

        let mut stream = match self.client.create_stream(&history, language).await {
            Ok(stream) => stream,
            Err(error) => {
                // Failed before any byte arrived: nothing to preserve.
                let parsed = self
                    .transcript
                    .replace_assistant_content(FAILURE_MESSAGE.to_string());
                emit_assistant(update_tx, turn, parsed);
                let _ = update_tx.send(SessionUpdate::Error(error.to_string()));
                let _ = update_tx.send(SessionUpdate::TurnComplete { turn });
                return Ok(());
            }
        };

        let mut decoder = DeltaDecoder::new();
        loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    // Aborted mid-stream: stop reading and discard the
                    // partial turn without emitting anything further.
                    self.transcript.abort_assistant();
                    return Ok(());
                }
                chunk = stream.next() => chunk,
            };

            match chunk {
                Some(Ok(bytes)) => {
                    for delta in decoder.feed(&bytes) {
                        if delta.is_empty() {
                            continue;
                        }
                        let parsed = self.transcript.apply_delta(&delta);
                        emit_assistant(update_tx, turn, parsed);
                    }
                }
                Some(Err(error)) => {
                    if decoder.is_finished() {
                        // The sentinel already ended the turn; a transport
                        // hiccup after it is not an error.
                        break;
                    }
                    let parsed = self.fail_preserving_partial();
                    emit_assistant(update_tx, turn, parsed);
                    let _ = update_tx.send(SessionUpdate::Error(error.to_string()));
                    let _ = update_tx.send(SessionUpdate::TurnComplete { turn });
                    return Ok(());
                }
                None => break,
            }
        }

        for delta in decoder.finish() {
            if delta.is_empty() {
                continue;
            }
            let parsed = self.transcript.apply_delta(&delta);
            emit_assistant(update_tx, turn, parsed);
        }

        let _ = update_tx.send(SessionUpdate::TurnComplete { turn });
        Ok(())
    }

    /// Mid-stream failure policy: content already streamed stays; the fixed
    /// failure message is appended as its own paragraph.
    fn fail_preserving_partial(&mut self) -> ParsedMessage {
        let preserved = self.transcript.assistant_content().to_string();
        let content = if preserved.trim().is_empty() {
            FAILURE_MESSAGE.to_string()
        } else {
            format!("{preserved}\n\n{FAILURE_MESSAGE}")
        };
        self.transcript.replace_assistant_content(content)
    }
}

fn emit_assistant(
    update_tx: &mpsc::UnboundedSender<SessionUpdate>,
    turn: usize,
    parsed: ParsedMessage,
) {
    let _ = update_tx.send(SessionUpdate::Assistant {
        turn,
        display_text: parsed.display_text,
        blocks: parsed.blocks,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock_client::{MockChatClient, MockChunk};
    use crate::state::blocks::BlockId;
    use crate::state::transcript::Role;
    use std::sync::Arc;

    fn content_record(text: &str) -> String {
        let escaped = text.replace('\\', "\\\\").replace('\n', "\\n");
        format!("data: {{\"choices\":[{{\"index\":0,\"delta\":{{\"content\":\"{escaped}\"}}}}]}}\n")
    }

    fn session_with_chunks(rounds: Vec<Vec<MockChunk>>) -> ChatSession {
        let mock = Arc::new(MockChatClient::new(rounds));
        ChatSession::new(ChatClient::new_mock(mock))
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<SessionUpdate>) -> Vec<SessionUpdate> {
        let mut updates = Vec::new();
        while let Ok(update) = rx.try_recv() {
            updates.push(update);
        }
        updates
    }

    fn assistant_snapshots(updates: &[SessionUpdate]) -> Vec<(usize, String, Vec<CodeBlock>)> {
        updates
            .iter()
            .filter_map(|update| match update {
                SessionUpdate::Assistant {
                    turn,
                    display_text,
                    blocks,
                } => Some((*turn, display_text.clone(), blocks.clone())),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_block_keeps_identifier_from_open_to_closed() {
        let mut session = session_with_chunks(vec![vec![
            MockChunk::bytes(content_record("```js\nconsole.log(1)")),
            MockChunk::bytes(content_record("\n```")),
            MockChunk::bytes("data: [DONE]\n"),
        ]]);
        let (tx, mut rx) = mpsc::unbounded_channel();

        session
            .run_turn(
                "give me js".to_string(),
                "javascript",
                &tx,
                CancellationToken::new(),
            )
            .await
            .expect("turn should run");

        let updates = drain(&mut rx);
        let snapshots = assistant_snapshots(&updates);
        assert_eq!(snapshots.len(), 2);

        let (_, _, first_blocks) = &snapshots[0];
        assert_eq!(first_blocks.len(), 1);
        assert!(first_blocks[0].is_open);
        assert_eq!(first_blocks[0].code, "console.log(1)");

        let (_, _, second_blocks) = &snapshots[1];
        assert_eq!(second_blocks[0].id, first_blocks[0].id);
        assert_eq!(second_blocks[0].id, BlockId::new(1, 0));
        assert!(!second_blocks[0].is_open);
        assert_eq!(second_blocks[0].code, "console.log(1)");

        assert!(matches!(
            updates.last(),
            Some(SessionUpdate::TurnComplete { turn: 1 })
        ));
    }

    #[tokio::test]
    async fn test_request_failure_before_any_byte_surfaces_fixed_message() {
        let mock = Arc::new(MockChatClient::failing("HTTP 502"));
        let mut session = ChatSession::new(ChatClient::new_mock(mock));
        let (tx, mut rx) = mpsc::unbounded_channel();

        session
            .run_turn("hello".to_string(), "no language", &tx, CancellationToken::new())
            .await
            .expect("failure is surfaced, not returned");

        let updates = drain(&mut rx);
        let snapshots = assistant_snapshots(&updates);
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].1, FAILURE_MESSAGE);
        assert!(updates
            .iter()
            .any(|update| matches!(update, SessionUpdate::Error(msg) if msg.contains("502"))));
        assert_eq!(session.transcript().assistant_content(), FAILURE_MESSAGE);
    }

    #[tokio::test]
    async fn test_mid_stream_failure_preserves_partial_content() {
        let mut session = session_with_chunks(vec![vec![
            MockChunk::bytes(content_record("Here you go.")),
            MockChunk::Error("connection reset".to_string()),
        ]]);
        let (tx, mut rx) = mpsc::unbounded_channel();

        session
            .run_turn("hello".to_string(), "no language", &tx, CancellationToken::new())
            .await
            .expect("failure is surfaced, not returned");

        let updates = drain(&mut rx);
        let snapshots = assistant_snapshots(&updates);
        let (_, final_text, _) = snapshots.last().expect("final snapshot");
        assert!(final_text.starts_with("Here you go."));
        assert!(final_text.ends_with(FAILURE_MESSAGE));
    }

    #[tokio::test]
    async fn test_transport_error_after_sentinel_is_not_a_failure() {
        let mut session = session_with_chunks(vec![vec![
            MockChunk::bytes(content_record("Done.")),
            MockChunk::bytes("data: [DONE]\n"),
            MockChunk::Error("late reset".to_string()),
        ]]);
        let (tx, mut rx) = mpsc::unbounded_channel();

        session
            .run_turn("hello".to_string(), "no language", &tx, CancellationToken::new())
            .await
            .expect("turn should run");

        let updates = drain(&mut rx);
        assert!(!updates
            .iter()
            .any(|update| matches!(update, SessionUpdate::Error(_))));
        assert!(matches!(
            updates.last(),
            Some(SessionUpdate::TurnComplete { .. })
        ));
        assert_eq!(session.transcript().assistant_content(), "Done.");
    }

    #[tokio::test]
    async fn test_heartbeat_records_emit_no_snapshots() {
        let mut session = session_with_chunks(vec![vec![
            MockChunk::bytes(": keepalive\n".to_string()),
            MockChunk::bytes("data: {\"choices\":[]}\n"),
            MockChunk::bytes(content_record("hi")),
            MockChunk::bytes("data: [DONE]\n"),
        ]]);
        let (tx, mut rx) = mpsc::unbounded_channel();

        session
            .run_turn("hello".to_string(), "no language", &tx, CancellationToken::new())
            .await
            .expect("turn should run");

        let snapshots = assistant_snapshots(&drain(&mut rx));
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].1, "hi");
    }

    #[tokio::test]
    async fn test_reentrant_turn_is_refused_without_transcript_changes() {
        let mut session = session_with_chunks(vec![]);
        session.turn_in_progress = true;
        let (tx, mut rx) = mpsc::unbounded_channel();

        let result = session
            .run_turn("hello".to_string(), "no language", &tx, CancellationToken::new())
            .await;

        assert!(result.is_err());
        assert!(drain(&mut rx).is_empty());
        assert!(session.transcript().turns().is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_discards_partial_turn_silently() {
        let mut session = session_with_chunks(vec![vec![MockChunk::bytes(content_record(
            "never applied",
        ))]]);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        cancel.cancel();

        session
            .run_turn("hello".to_string(), "no language", &tx, cancel)
            .await
            .expect("cancelled turn still returns cleanly");

        assert!(drain(&mut rx).is_empty());
        let turns = session.transcript().turns();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].role, Role::User);
        assert!(!session.turn_in_progress());
    }

    #[tokio::test]
    async fn test_clear_is_refused_while_streaming() {
        let mut session = session_with_chunks(vec![]);
        session.turn_in_progress = true;
        assert!(session.clear().is_err());
        session.turn_in_progress = false;
        assert!(session.clear().is_ok());
    }
}
