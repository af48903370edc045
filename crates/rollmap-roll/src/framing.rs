//! Length-prefix framing wrapper (component H): prepends a 4-byte
//! little-endian length (header included) before each payload.
//!
//! The header is written *after* the payload bytes (the spec's "payload
//! first, header last" ordering for safe concurrent reads): a reader
//! scanning the mapping sees a zero header while the frame is still being
//! written and a correct, trustworthy length the instant it goes non-zero.
//! On disk the header still occupies the *lower* offset — it's the order
//! of the two writes that's inverted, not the byte layout.
//!
//! Listed as an external collaborator by the spec — its only contract with
//! the reservation engine is that it reserves the whole frame once and
//! commits it once, which is exactly what happens below.

use std::sync::atomic::{fence, Ordering};

use rollmap_core::NULL_OFFSET;

use crate::error::Result;
use crate::roll_single::SingleProcessRollingFile;

const LENGTH_PREFIX_SIZE: usize = 4;

/// Wraps a rolling file, writing each payload as `[u32 le total_len][payload]`.
pub struct FramedWriter<'a> {
    inner: &'a SingleProcessRollingFile,
}

impl<'a> FramedWriter<'a> {
    /// Wrap `inner`. Every payload passed to [`Self::write`] must leave room
    /// for the 4-byte prefix within the file's capacity.
    pub fn new(inner: &'a SingleProcessRollingFile) -> Self {
        Self { inner }
    }

    /// Write one length-prefixed frame, rolling files as needed.
    pub fn write(&self, payload: &[u8]) -> Result<i64> {
        let total_len = (LENGTH_PREFIX_SIZE + payload.len()) as u32;
        loop {
            let file = self.inner.file_for_write()?;
            let offset = file.reserve(total_len as u64)?;
            if offset == NULL_OFFSET {
                continue;
            }
            let offset = offset as u64;

            file.put_bytes(offset + LENGTH_PREFIX_SIZE as u64, payload);
            // Everything the header's non-zero value promises a reader
            // must be visible before the header write itself.
            fence(Ordering::Release);
            file.put_bytes(offset, &total_len.to_le_bytes());

            file.commit(total_len as u64);
            return Ok(offset as i64);
        }
    }
}

/// Decode a buffer of concatenated `[u32 le total_len][payload]` frames back
/// into the sequence of payloads. Stops at the first zero-length prefix
/// (still-being-written, or end of data).
pub fn decode_all(buf: &[u8]) -> Vec<&[u8]> {
    let mut frames = Vec::new();
    let mut pos = 0usize;
    while pos + LENGTH_PREFIX_SIZE <= buf.len() {
        let len_bytes: [u8; 4] = buf[pos..pos + LENGTH_PREFIX_SIZE].try_into().unwrap();
        let total_len = u32::from_le_bytes(len_bytes) as usize;
        if total_len == 0 {
            break;
        }
        let payload_start = pos + LENGTH_PREFIX_SIZE;
        let payload_end = pos + total_len;
        if payload_end > buf.len() {
            break;
        }
        frames.push(&buf[payload_start..payload_end]);
        pos = payload_end;
    }
    frames
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::RollingFileOptions;
    use crate::roll_single::default_naming;

    #[tokio::test]
    async fn framed_write_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let naming = default_naming(dir.path());
        let options = RollingFileOptions::builder(128).framed(true).build();
        let coordinator = SingleProcessRollingFile::new(naming, options, None).unwrap();
        let framed = FramedWriter::new(&coordinator);

        framed.write(b"hi").unwrap();
        framed.write(b"there").unwrap();
        coordinator.shutdown().await;

        let path = std::fs::read_dir(dir.path())
            .unwrap()
            .next()
            .unwrap()
            .unwrap()
            .path();
        let data = std::fs::read(path).unwrap();
        let decoded = decode_all(&data);
        assert_eq!(decoded, vec![b"hi".as_slice(), b"there".as_slice()]);
    }

    #[test]
    fn single_frame_layout_matches_spec_example() {
        // capacity=128, framing on, payload "hi" -> bytes `06 00 00 00 68 69`
        let total_len: u32 = (LENGTH_PREFIX_SIZE + 2) as u32;
        let mut wire = Vec::new();
        wire.extend_from_slice(&total_len.to_le_bytes());
        wire.extend_from_slice(b"hi");
        assert_eq!(wire, vec![0x06, 0x00, 0x00, 0x00, 0x68, 0x69]);
    }
}
