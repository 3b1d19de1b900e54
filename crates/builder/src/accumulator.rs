//! Accumulation of marker-terminated Builder responses.
//!
//! Long responses arrive as an arbitrary number of socket reads. The
//! [`MarkerAccumulator`] collects raw bytes until [`COMPLETE_MARKER`]
//! shows up, then splits everything before the marker into records.

use crate::protocol::{COMPLETE_MARKER, FIELD_SEPARATOR};

/// One line of a marker-terminated response, split into fields.
pub type Record = Vec<String>;

/// Byte buffer that knows when a marker-terminated response is complete.
#[derive(Debug, Default)]
pub struct MarkerAccumulator {
    buffer: Vec<u8>,
    marker_at: Option<usize>,
}

impl MarkerAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk. Returns `true` once the marker has been seen.
    ///
    /// Chunks pushed after completion are ignored.
    pub fn push(&mut self, chunk: &[u8]) -> bool {
        if self.marker_at.is_some() {
            return true;
        }

        let marker = COMPLETE_MARKER.as_bytes();
        // The marker may straddle the previous chunk boundary.
        let search_from = self.buffer.len().saturating_sub(marker.len() - 1);
        self.buffer.extend_from_slice(chunk);

        self.marker_at = self.buffer[search_from..]
            .windows(marker.len())
            .position(|window| window == marker)
            .map(|offset| search_from + offset);

        self.marker_at.is_some()
    }

    pub fn is_complete(&self) -> bool {
        self.marker_at.is_some()
    }

    /// Number of bytes buffered so far.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Decode the buffered bytes before the marker into records.
    ///
    /// When the marker has not been seen, the whole buffer is treated as
    /// the response body. Invalid UTF-8 is replaced with U+FFFD.
    pub fn into_records(self) -> Vec<Record> {
        let body = match self.marker_at {
            Some(end) => &self.buffer[..end],
            None => &self.buffer[..],
        };
        split_records(&String::from_utf8_lossy(body))
    }
}

/// Split response text into records.
///
/// Lines end at `\r`, `\n` or `\r\n`; fields are separated by `|`.
/// Text after the last line break is an incomplete fragment and is
/// dropped, as are empty lines.
pub fn split_records(text: &str) -> Vec<Record> {
    let terminated = match text.rfind(['\r', '\n']) {
        Some(last_break) => &text[..last_break],
        None => return Vec::new(),
    };

    terminated
        .split(['\r', '\n'])
        .filter(|line| !line.is_empty())
        .map(|line| line.split(FIELD_SEPARATOR).map(str::to_string).collect())
        .collect()
}
