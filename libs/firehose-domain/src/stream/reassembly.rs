//! Record reassembly across chunk boundaries

use bytes::{Bytes, BytesMut};

use super::{rfind_delimiter, DELIMITER};

const MISSING_DELIMITER: &[u8] = b"}{";

/// Accumulates inflated bytes and extracts complete records
///
/// The pending buffer is append-only between drains. A drain hands out every
/// byte up to and including the last delimiter and keeps the trailing partial
/// record for the next pass, so the buffer never holds a complete boundary
/// after a drain.
///
/// The reassembler lives for one session; whatever is pending when the session
/// ends is dropped with it.
#[derive(Debug, Default)]
pub struct RecordReassembler {
    buffer: BytesMut,
    delimiter_seen: bool,
}

impl RecordReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a decoded chunk to the pending buffer
    pub fn append(&mut self, chunk: &[u8]) {
        // A delimiter may straddle the previous chunk and this one.
        let scan_from = self.buffer.len().saturating_sub(DELIMITER.len() - 1);
        self.buffer.extend_from_slice(chunk);
        if !self.delimiter_seen {
            self.delimiter_seen = super::find_delimiter(&self.buffer[scan_from..]).is_some();
        }
    }

    /// Whether at least one record boundary is buffered
    pub fn has_delimiter(&self) -> bool {
        self.delimiter_seen
    }

    /// Number of buffered bytes
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// The bytes not yet handed out
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    /// Extract every complete record buffered so far
    ///
    /// Runs the `}{` repair pass first, then splits after the last delimiter.
    /// Returns `None` when no delimiter is buffered; nothing is extracted in that
    /// case, however large the buffer has grown.
    pub fn drain(&mut self) -> Option<Bytes> {
        if !self.delimiter_seen {
            return None;
        }
        self.repair();
        let end = rfind_delimiter(&self.buffer)? + DELIMITER.len();
        self.delimiter_seen = false;
        Some(self.buffer.split_to(end).freeze())
    }

    /// Drop everything buffered
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.delimiter_seen = false;
    }

    /// Insert a delimiter between two objects the feed glued together
    fn repair(&mut self) {
        let glued = self
            .buffer
            .windows(MISSING_DELIMITER.len())
            .filter(|window| *window == MISSING_DELIMITER)
            .count();
        if glued == 0 {
            return;
        }

        let mut repaired = BytesMut::with_capacity(self.buffer.len() + glued * DELIMITER.len());
        let mut prev = None;
        for &byte in self.buffer.iter() {
            if prev == Some(b'}') && byte == b'{' {
                repaired.extend_from_slice(DELIMITER);
            }
            repaired.extend_from_slice(&[byte]);
            prev = Some(byte);
        }
        self.buffer = repaired;
    }
}
