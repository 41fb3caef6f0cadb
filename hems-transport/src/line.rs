//! Record splitting for the dongle's text stream

use bytes::{Buf, BytesMut};

/// Accumulates raw bytes and yields complete text records
///
/// Records end at `\n`; trailing whitespace (including the `\r` of CRLF) is
/// trimmed and blank records are skipped. Bytes that are not valid UTF-8, such
/// as the binary payload echoed back after `SKSENDTO`, are replaced rather
/// than rejected.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: BytesMut,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append received bytes
    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Pop the next complete record, if one is buffered
    pub fn next_line(&mut self) -> Option<String> {
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let raw = self.buf.split_to(pos);
            self.buf.advance(1);
            let line = String::from_utf8_lossy(&raw).trim_end().to_string();
            if !line.is_empty() {
                return Some(line);
            }
        }
        None
    }

    /// Take whatever is left without a terminator (used at end of stream)
    pub fn take_remainder(&mut self) -> Option<String> {
        let raw = self.buf.split();
        let line = String::from_utf8_lossy(&raw).trim_end().to_string();
        if line.is_empty() { None } else { Some(line) }
    }

    /// Number of buffered bytes
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }
}
