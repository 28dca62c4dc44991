use super::logging::emit_decode_error;
use crate::types::StreamChunk;

const DATA_PREFIX: &str = "data: ";
const DONE_SENTINEL: &str = "[DONE]";

/// Turns the raw byte stream into an ordered sequence of text deltas.
///
/// The transport frames records one per line. The residue after the last
/// newline of a chunk is held back as raw bytes and prepended to the next
/// chunk, so no delta is ever derived from a truncated record and the decoded
/// output is byte-for-byte independent of where chunk boundaries fall, even
/// when a boundary lands inside a multi-byte character.
#[derive(Default)]
pub struct DeltaDecoder {
    buffer: Vec<u8>,
    finished: bool,
}

impl DeltaDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push one transport chunk. Returns one delta per complete line, in line
    /// order. Deltas may be empty; empty deltas are no-ops for the caller.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut deltas = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|&byte| byte == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&raw);
            self.decode_line(line.trim_end_matches(['\n', '\r']), &mut deltas);
        }
        deltas
    }

    /// Drain the held-back remainder once the transport signals end-of-stream.
    /// At that point the residue can no longer be extended, so it is decoded
    /// as one final record.
    pub fn finish(&mut self) -> Vec<String> {
        let rest = std::mem::take(&mut self.buffer);
        let line = String::from_utf8_lossy(&rest);
        let mut deltas = Vec::new();
        self.decode_line(line.trim_end_matches('\r'), &mut deltas);
        deltas
    }

    /// True once the terminal sentinel has been seen. The caller keeps
    /// draining the transport, but no further deltas are produced.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn decode_line(&mut self, line: &str, deltas: &mut Vec<String>) {
        if self.finished || line.is_empty() {
            return;
        }

        if let Some(payload) = line.strip_prefix(DATA_PREFIX) {
            if payload.trim() == DONE_SENTINEL {
                self.finished = true;
                return;
            }
            deltas.push(decode_record(payload));
        } else {
            deltas.push(decode_record(line));
        }
    }
}

/// Decode one record. A malformed record or a record without the
/// `choices[0].delta.content` path yields an empty delta; decoding never
/// aborts the stream.
fn decode_record(payload: &str) -> String {
    match serde_json::from_str::<StreamChunk>(payload) {
        Ok(chunk) => chunk.into_delta_content().unwrap_or_default(),
        Err(error) => {
            emit_decode_error(payload, &error);
            String::new()
        }
    }
}
