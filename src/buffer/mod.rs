//! Rolling buffer for console output

mod ansi;

pub use ansi::{strip_ansi, AnsiStripper};

use bytes::{Buf, BytesMut};

/// When unconsumed output alone exceeds the cap, drop the oldest 1/3.
const DISCARD_RATIO: usize = 3;

/// Rolling output buffer shared by successive expect calls.
///
/// Output up to `consumed` has already been handed out by a match; the rest
/// is what the next call searches.
pub struct BufferManager {
    buffer: BytesMut,
    consumed: usize,
    max_size: usize,
    stripper: Option<AnsiStripper>,
}

impl BufferManager {
    /// Create a new buffer manager
    pub fn new(max_size: usize, strip_ansi: bool) -> Self {
        Self {
            buffer: BytesMut::with_capacity(max_size.min(64 * 1024)),
            consumed: 0,
            max_size: max_size.max(1),
            stripper: strip_ansi.then(AnsiStripper::new),
        }
    }

    /// Append newly read output
    pub fn append(&mut self, data: &[u8]) {
        let cleaned;
        let data = match self.stripper.as_mut() {
            Some(stripper) => {
                cleaned = stripper.strip(data);
                cleaned.as_slice()
            }
            None => data,
        };

        if self.buffer.len() + data.len() > self.max_size {
            self.compact(data.len());
        }
        self.buffer.extend_from_slice(data);
    }

    /// Output not yet consumed by a match
    pub fn unconsumed(&self) -> &[u8] {
        &self.buffer[self.consumed..]
    }

    /// Unconsumed output as text (lossy)
    pub fn unconsumed_text(&self) -> String {
        String::from_utf8_lossy(self.unconsumed()).into_owned()
    }

    /// Offset of the first unconsumed byte
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    /// Text between the last consumed position and `offset` (relative to
    /// the unconsumed region).
    pub fn before(&self, offset: usize) -> String {
        let end = (self.consumed + offset).min(self.buffer.len());
        String::from_utf8_lossy(&self.buffer[self.consumed..end]).into_owned()
    }

    /// Slice of the unconsumed region
    pub fn span(&self, start: usize, end: usize) -> &[u8] {
        let len = self.buffer.len();
        &self.buffer[(self.consumed + start).min(len)..(self.consumed + end).min(len)]
    }

    /// Mark output up to `offset` (relative to the unconsumed region) as consumed
    pub fn consume(&mut self, offset: usize) {
        self.consumed = (self.consumed + offset).min(self.buffer.len());
    }

    /// Consume everything that is buffered and return it as text
    pub fn drain_text(&mut self) -> String {
        let text = self.unconsumed_text();
        self.consumed = self.buffer.len();
        text
    }

    /// Get the current buffer length
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check whether nothing has been buffered
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Drop all buffered output
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.consumed = 0;
    }

    /// Make room for `incoming` bytes.
    ///
    /// Consumed output goes first. If unconsumed output alone still exceeds
    /// the cap, the oldest third of the cap is discarded.
    fn compact(&mut self, incoming: usize) {
        self.buffer.advance(self.consumed);
        self.consumed = 0;

        if self.buffer.len() + incoming > self.max_size {
            let discard = (self.max_size / DISCARD_RATIO).max(1).min(self.buffer.len());
            self.buffer.advance(discard);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_and_unconsumed() {
        let mut buffer = BufferManager::new(1024, false);
        buffer.append(b"Hello ");
        buffer.append(b"World");
        assert_eq!(buffer.unconsumed(), b"Hello World");
        assert_eq!(buffer.len(), 11);
    }

    #[test]
    fn test_consume_and_before() {
        let mut buffer = BufferManager::new(1024, false);
        buffer.append(b"show ver\r\nv2\r\nrouter#");
        assert_eq!(buffer.before(8), "show ver");
        buffer.consume(8);
        assert_eq!(buffer.unconsumed(), b"\r\nv2\r\nrouter#");
        assert_eq!(buffer.before(6), "\r\nv2\r\n");
    }

    #[test]
    fn test_consume_is_clamped() {
        let mut buffer = BufferManager::new(1024, false);
        buffer.append(b"abc");
        buffer.consume(100);
        assert!(buffer.unconsumed().is_empty());
        assert_eq!(buffer.consumed(), 3);
    }

    #[test]
    fn test_compact_drops_consumed_first() {
        let mut buffer = BufferManager::new(20, false);
        buffer.append(b"0123456789");
        buffer.consume(8);
        buffer.append(b"ABCDEFGHIJKL");
        assert_eq!(buffer.unconsumed(), b"89ABCDEFGHIJKL");
        assert_eq!(buffer.consumed(), 0);
    }

    #[test]
    fn test_compact_discards_oldest_when_full() {
        let mut buffer = BufferManager::new(30, false);
        buffer.append(&[b'A'; 25]);
        buffer.append(&[b'B'; 10]);
        assert_eq!(buffer.len(), 25);
        assert!(buffer.unconsumed().ends_with(&[b'B'; 10]));
    }

    #[test]
    fn test_strip_ansi_enabled() {
        let mut buffer = BufferManager::new(1024, true);
        buffer.append(b"Hello \x1b[31mRed\x1b[0m World");
        assert_eq!(buffer.unconsumed_text(), "Hello Red World");
    }

    #[test]
    fn test_strip_ansi_disabled() {
        let mut buffer = BufferManager::new(1024, false);
        let data = b"Hello \x1b[31mRed\x1b[0m World";
        buffer.append(data);
        assert_eq!(buffer.unconsumed(), data);
    }

    #[test]
    fn test_drain_text() {
        let mut buffer = BufferManager::new(1024, false);
        buffer.append(b"partial out");
        assert_eq!(buffer.drain_text(), "partial out");
        assert!(buffer.unconsumed().is_empty());
    }

    #[test]
    fn test_invalid_utf8_is_lossy() {
        let mut buffer = BufferManager::new(1024, false);
        buffer.append(&[0xFF, b'o', b'k']);
        assert_eq!(buffer.unconsumed_text(), "\u{FFFD}ok");
    }
}
