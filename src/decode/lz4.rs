//! Streaming expansion of LZ4-framed DBD payloads.
use std::io::{self, Read};

use lz4_flex::block;

/// Maximum decompressed size of a single LZ4 frame. Each frame of a
/// compressed DBD file expands to at most this many bytes.
pub(crate) const MAX_FRAME_LEN: usize = 1 << 16;

/// A reader that transparently expands a sequence of LZ4 frames into a
/// contiguous byte stream.
///
/// The framed format is a repetition of a 2-byte big-endian frame length `n`
/// followed by `n` bytes of LZ4-block-compressed data. End of stream is
/// reached when no further length prefix can be read in full. A frame whose
/// compressed payload is cut short, that fails to decode, or that expands
/// beyond [`MAX_FRAME_LEN`] surfaces as an [`io::ErrorKind::InvalidData`]
/// error.
pub struct Lz4FrameReader<R> {
    reader: R,
    compressed: Vec<u8>,
    frame: Box<[u8]>,
    len: usize,
    pos: usize,
    eof: bool,
}

impl<R: Read> Lz4FrameReader<R> {
    /// Creates a new [`Lz4FrameReader`] expanding frames from `reader`.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            compressed: Vec::new(),
            frame: vec![0; MAX_FRAME_LEN].into_boxed_slice(),
            len: 0,
            pos: 0,
            eof: false,
        }
    }

    /// Returns a reference to the inner reader.
    pub fn get_ref(&self) -> &R {
        &self.reader
    }

    /// Returns a mutable reference to the inner reader.
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.reader
    }

    /// Consumes the [`Lz4FrameReader`] and returns the inner reader.
    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Reads and expands the next frame into the frame buffer. Returns
    /// `Ok(false)` on a clean end of stream, including a partial length
    /// prefix.
    fn refill(&mut self) -> io::Result<bool> {
        let mut len_bytes = [0u8; 2];
        match self.reader.read_exact(&mut len_bytes) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(false),
            Err(e) => return Err(e),
        }
        let frame_len = u16::from_be_bytes(len_bytes) as usize;
        self.compressed.resize(frame_len, 0);
        self.reader.read_exact(&mut self.compressed).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                invalid_data(format!(
                    "LZ4 frame declares {frame_len} compressed bytes but the file ends early"
                ))
            } else {
                e
            }
        })?;
        self.len = block::decompress_into(&self.compressed, &mut self.frame)
            .map_err(|e| invalid_data(format!("LZ4 frame failed to decode: {e}")))?;
        self.pos = 0;
        Ok(true)
    }
}

impl<R: Read> Read for Lz4FrameReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos == self.len {
            if self.eof {
                return Ok(0);
            }
            if !self.refill()? {
                self.eof = true;
                return Ok(0);
            }
        }
        let n = buf.len().min(self.len - self.pos);
        buf[..n].copy_from_slice(&self.frame[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

fn invalid_data(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::lz4_frames;

    #[test]
    fn test_expands_multiple_frames() {
        let payload: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        let framed = lz4_frames(&payload);
        let mut reader = Lz4FrameReader::new(framed.as_slice());
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, payload);
    }

    #[test]
    fn test_partial_length_prefix_is_eof() {
        let mut framed = lz4_frames(b"glider data");
        framed.push(0x7F); // lone length byte at the tail
        let mut reader = Lz4FrameReader::new(framed.as_slice());
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"glider data");
    }

    #[test]
    fn test_truncated_frame_payload_is_invalid_data() {
        let mut framed = lz4_frames(b"glider data");
        framed.truncate(framed.len() - 2);
        let mut reader = Lz4FrameReader::new(framed.as_slice());
        let mut out = Vec::new();
        let err = reader.read_to_end(&mut out).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_garbage_frame_is_invalid_data() {
        let mut framed = vec![0x00, 0x04];
        framed.extend_from_slice(&[0xF0, 0x00, 0x00, 0x00]);
        let mut reader = Lz4FrameReader::new(framed.as_slice());
        let mut out = Vec::new();
        let err = reader.read_to_end(&mut out).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_exact_reads_across_frame_boundary() {
        let payload = b"abcdefghij".repeat(100);
        // two frames of 500 bytes each
        let mut framed = lz4_frames(&payload[..500]);
        framed.extend_from_slice(&lz4_frames(&payload[500..]));
        let mut reader = Lz4FrameReader::new(framed.as_slice());
        let mut buf = [0u8; 600];
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(&buf[..], &payload[..600]);
    }
}
