//! Event-oriented SSE reassembly over arbitrary upstream chunk boundaries.
//!
//! Replaces the "attempt `JSON.parse` on every candidate slice" approach
//! with a single-pass balance scanner: once a `data: ` marker is found,
//! [`scan_json_value`] walks forward exactly once, tracking brace/bracket
//! depth and string/escape state, to find where the JSON value ends.

mod scanner;

pub use scanner::scan_json_value;

use tracing::warn;

use gateway_core::ChatCompletionChunk;

/// Sink for canonical output produced while driving a stream. The HTTP
/// layer implements this to turn chunks into `data: ...\n\n` lines on the
/// wire without the pipeline needing to know about bytes or framing.
pub trait Emitter {
    fn emit_chunk(&mut self, chunk: &ChatCompletionChunk);
    fn emit_done(&mut self);
}

/// Frames accumulate raw bytes beyond this size are dropped; data loss is
/// tolerated over unbounded memory growth (spec: "safety floors").
const MAX_BUFFER_BYTES: usize = 10 * 1024 * 1024;

/// One reassembled SSE frame: an optional `event:` field and its `data:`
/// payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub event: Option<String>,
    pub data: String,
}

/// Incremental SSE reassembler. Feed raw upstream bytes via [`push`],
/// drain complete frames via [`drain_frames`].
pub struct Framer {
    text: String,
    pending_bytes: Vec<u8>,
    cursor: usize,
}

impl Default for Framer {
    fn default() -> Self {
        Self::new()
    }
}

impl Framer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            text: String::new(),
            pending_bytes: Vec::new(),
            cursor: 0,
        }
    }

    /// Append raw bytes from the upstream response, tolerating chunk
    /// boundaries that split a multi-byte UTF-8 sequence.
    pub fn push(&mut self, chunk: &[u8]) {
        self.pending_bytes.extend_from_slice(chunk);
        match std::str::from_utf8(&self.pending_bytes) {
            Ok(s) => {
                self.text.push_str(s);
                self.pending_bytes.clear();
            }
            Err(e) => {
                let valid_len = e.valid_up_to();
                if valid_len > 0 {
                    // SAFETY-free: valid_up_to() guarantees this prefix is valid UTF-8.
                    if let Ok(s) = std::str::from_utf8(&self.pending_bytes[..valid_len]) {
                        self.text.push_str(s);
                    }
                    self.pending_bytes.drain(..valid_len);
                }
            }
        }

        if self.text.len() > MAX_BUFFER_BYTES {
            warn!(buffered = self.text.len(), "sse buffer exceeded cap, dropping");
            self.text.clear();
            self.pending_bytes.clear();
            self.cursor = 0;
        }
    }

    /// Extract every complete frame currently available, leaving any
    /// trailing partial frame buffered for the next [`push`].
    pub fn drain_frames(&mut self) -> Vec<Frame> {
        let mut frames = Vec::new();
        loop {
            match self.next_frame() {
                Some(frame) => frames.push(frame),
                None => break,
            }
        }
        self.compact();
        frames
    }

    fn next_frame(&mut self) -> Option<Frame> {
        let buf = &self.text[self.cursor..];
        let marker_rel = find_line_start_marker(buf, "data: ").or_else(|| find_line_start_marker(buf, "data:"))?;
        let marker_abs = self.cursor + marker_rel;

        let prefix_len = if self.text[marker_abs..].starts_with("data: ") { 6 } else { 5 };
        let value_start = marker_abs + prefix_len;

        // The literal `[DONE]` sentinel has no JSON body; it ends at the
        // next newline (or end of buffer, if the stream has fully closed).
        let trimmed_after = self.text[value_start..].trim_start();
        if let Some(rest) = trimmed_after.strip_prefix("[DONE]") {
            if rest.starts_with('\n') || rest.is_empty() {
                let line_end = self.text[value_start..]
                    .find('\n')
                    .map_or(self.text.len(), |i| value_start + i);
                let event = preceding_event(&self.text[..marker_abs]);
                self.cursor = line_end;
                return Some(Frame {
                    event,
                    data: "[DONE]".to_string(),
                });
            }
        }

        let value = &self.text[value_start..];
        let end_rel = scan_json_value(value)?;
        let data_end = value_start + end_rel;
        let event = preceding_event(&self.text[..marker_abs]);
        self.cursor = data_end;
        Some(Frame {
            event,
            data: self.text[value_start..data_end].to_string(),
        })
    }

    /// Drop consumed bytes once a frame boundary is confirmed stable, to
    /// keep the buffer bounded for long-lived streams.
    fn compact(&mut self) {
        if self.cursor > 0 {
            self.text.drain(..self.cursor);
            self.cursor = 0;
        }
    }
}

/// Find `marker` at buffer start or immediately after a `\n`.
fn find_line_start_marker(buf: &str, marker: &str) -> Option<usize> {
    let mut search_from = 0;
    loop {
        let idx = buf[search_from..].find(marker)? + search_from;
        if idx == 0 || buf.as_bytes()[idx - 1] == b'\n' {
            return Some(idx);
        }
        search_from = idx + marker.len();
        if search_from > buf.len() {
            return None;
        }
    }
}

/// Look backwards from `before` (exclusive) for a `event: <name>` line that
/// immediately precedes the current `data:` marker, i.e. the field
/// belonging to the same SSE frame.
fn preceding_event(before: &str) -> Option<String> {
    let line = before.rsplit('\n').find(|l| !l.is_empty())?;
    line.strip_prefix("event: ").or_else(|| line.strip_prefix("event:")).map(|s| s.trim().to_string())
}
