//! A pre-allocated scratch buffer for the Receiver's in-flight payload, with spill-to-file
//! on overflow.
//!
//! Rationale (carried from the spec): property-change events can arrive in bursts of small
//! fragments (text) or large blocks (images); coalescing in RAM before syncing amortizes
//! syscall cost, and a bounded buffer prevents unbounded memory growth on pathological
//! streams. Grounded on 1Password-arboard's INCR-accumulation shape in
//! `platform/linux/x11.rs::read_single` (accumulate, flush on completion), generalized here
//! to a bounded buffer that flushes mid-stream instead of growing without bound.

use std::fs::File;
use std::io::{self, Write};

use crate::config::TRANSFER_BUFFER_SIZE;

pub struct TransferBuffer {
    buf: Vec<u8>,
    offset: usize,
    total_written: u64,
}

impl TransferBuffer {
    pub fn new() -> Self {
        Self { buf: vec![0u8; TRANSFER_BUFFER_SIZE], offset: 0, total_written: 0 }
    }

    /// Copies `bytes` into the buffer at the current offset, flushing to `file` first
    /// whenever the buffer would overflow.
    pub fn append(&mut self, file: &mut File, mut bytes: &[u8]) -> io::Result<()> {
        while !bytes.is_empty() {
            let space = self.buf.len() - self.offset;
            if space == 0 {
                self.flush_to(file)?;
                continue;
            }
            let take = space.min(bytes.len());
            self.buf[self.offset..self.offset + take].copy_from_slice(&bytes[..take]);
            self.offset += take;
            bytes = &bytes[take..];
        }
        Ok(())
    }

    fn flush_to(&mut self, file: &mut File) -> io::Result<()> {
        if self.offset > 0 {
            file.write_all(&self.buf[..self.offset])?;
            self.total_written += self.offset as u64;
            self.offset = 0;
        }
        Ok(())
    }

    /// Flushes any residual bytes, closes the file (by dropping the caller's handle), and
    /// returns the total byte count written across the transfer's lifetime.
    pub fn finalize(&mut self, file: &mut File) -> io::Result<u64> {
        self.flush_to(file)?;
        file.flush()?;
        Ok(self.total_written)
    }

    pub fn reset(&mut self) {
        self.offset = 0;
        self.total_written = 0;
    }
}

impl Default for TransferBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn append_and_finalize_round_trip() {
        let mut tmp = NamedTempFile::new().unwrap();
        let mut buf = TransferBuffer::new();
        buf.append(tmp.as_file_mut(), b"hello ").unwrap();
        buf.append(tmp.as_file_mut(), b"world").unwrap();
        let total = buf.finalize(tmp.as_file_mut()).unwrap();
        assert_eq!(total, 11);
        let contents = std::fs::read(tmp.path()).unwrap();
        assert_eq!(contents, b"hello world");
    }

    #[test]
    fn overflow_flushes_mid_stream() {
        let mut tmp = NamedTempFile::new().unwrap();
        let mut buf = TransferBuffer::new();
        // Force a flush by writing more than the buffer's capacity in one call.
        let chunk = vec![7u8; TRANSFER_BUFFER_SIZE + 10];
        buf.append(tmp.as_file_mut(), &chunk).unwrap();
        let total = buf.finalize(tmp.as_file_mut()).unwrap();
        assert_eq!(total, chunk.len() as u64);
    }
}
