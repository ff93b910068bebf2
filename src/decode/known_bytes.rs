//! The 16-byte known-bytes block and the byte-order-aware value readers it
//! produces.
use std::io::{self, Read};

/// Length of the known-bytes block at the start of the data section.
pub(crate) const KNOWN_BYTES_LEN: usize = 16;

const INT16_PROBE: i16 = 0x1234;
const FLOAT32_PROBE: f32 = 123.456;
const FLOAT64_PROBE: f64 = 123_456_789.123_45;
const FLOAT_PROBE_TOLERANCE: f64 = 1e-3;

/// The byte-order probe consumed once per file.
///
/// The known-bytes block is the bytes `'s'` and `'a'`, an `int16` equal to
/// `0x1234`, a `float32` equal to `123.456`, and a `float64` equal to
/// `123456789.12345`. The int16 decides the byte order for every numeric read
/// that follows; the two float constants validate the decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KnownBytes {
    flip: bool,
}

impl KnownBytes {
    /// Consumes the 16-byte known-bytes block from `reader` and determines
    /// the byte order of the stream.
    ///
    /// # Errors
    /// This function returns an error if the block cannot be read in full or
    /// fails validation.
    pub fn read(reader: &mut impl Read) -> crate::Result<Self> {
        let mut block = [0u8; KNOWN_BYTES_LEN];
        reader
            .read_exact(&mut block)
            .map_err(|e| crate::error::reader_error(e, "reading known-bytes block"))?;
        Self::from_block(&block)
    }

    /// Determines the byte order from an already-read known-bytes block.
    ///
    /// # Errors
    /// This function returns an error if the tag bytes, int16, or float
    /// constants don't match their expected values under either byte order.
    pub fn from_block(block: &[u8; KNOWN_BYTES_LEN]) -> crate::Result<Self> {
        if block[0] != b's' || block[1] != b'a' {
            return Err(crate::Error::format(format!(
                "invalid known-bytes tag: expected 's' 'a', got {:#04x} {:#04x}",
                block[0], block[1]
            )));
        }
        let int_bytes = [block[2], block[3]];
        let flip = if i16::from_le_bytes(int_bytes) == INT16_PROBE {
            false
        } else if i16::from_be_bytes(int_bytes) == INT16_PROBE {
            true
        } else {
            return Err(crate::Error::format(format!(
                "invalid known-bytes int16: {:#06x}",
                u16::from_le_bytes(int_bytes)
            )));
        };
        let f32_bytes = [block[4], block[5], block[6], block[7]];
        let f32_val = if flip {
            f32::from_be_bytes(f32_bytes)
        } else {
            f32::from_le_bytes(f32_bytes)
        };
        if (f64::from(f32_val) - f64::from(FLOAT32_PROBE)).abs() > FLOAT_PROBE_TOLERANCE {
            return Err(crate::Error::format(format!(
                "invalid known-bytes float32: {f32_val}"
            )));
        }
        let mut f64_bytes = [0u8; 8];
        f64_bytes.copy_from_slice(&block[8..16]);
        let f64_val = if flip {
            f64::from_be_bytes(f64_bytes)
        } else {
            f64::from_le_bytes(f64_bytes)
        };
        if (f64_val - FLOAT64_PROBE).abs() > FLOAT_PROBE_TOLERANCE {
            return Err(crate::Error::format(format!(
                "invalid known-bytes float64: {f64_val}"
            )));
        }
        Ok(Self { flip })
    }

    /// Returns `true` when multi-byte values in this stream must be
    /// byte-reversed relative to little-endian.
    pub fn flip(&self) -> bool {
        self.flip
    }

    /// Reads a 1-byte integer value.
    ///
    /// # Errors
    /// This function returns an error if the underlying read fails.
    pub fn read8(&self, reader: &mut impl Read) -> io::Result<i8> {
        let mut buf = [0u8; 1];
        reader.read_exact(&mut buf)?;
        Ok(buf[0] as i8)
    }

    /// Reads a 2-byte integer value in the stream's byte order.
    ///
    /// # Errors
    /// This function returns an error if the underlying read fails.
    pub fn read16(&self, reader: &mut impl Read) -> io::Result<i16> {
        let mut buf = [0u8; 2];
        reader.read_exact(&mut buf)?;
        Ok(if self.flip {
            i16::from_be_bytes(buf)
        } else {
            i16::from_le_bytes(buf)
        })
    }

    /// Reads a 4-byte float value in the stream's byte order. Infinite values
    /// are normalized to NaN.
    ///
    /// # Errors
    /// This function returns an error if the underlying read fails.
    pub fn read32(&self, reader: &mut impl Read) -> io::Result<f32> {
        let mut buf = [0u8; 4];
        reader.read_exact(&mut buf)?;
        let val = if self.flip {
            f32::from_be_bytes(buf)
        } else {
            f32::from_le_bytes(buf)
        };
        Ok(if val.is_infinite() { f32::NAN } else { val })
    }

    /// Reads an 8-byte float value in the stream's byte order. Infinite
    /// values are normalized to NaN.
    ///
    /// # Errors
    /// This function returns an error if the underlying read fails.
    pub fn read64(&self, reader: &mut impl Read) -> io::Result<f64> {
        let mut buf = [0u8; 8];
        reader.read_exact(&mut buf)?;
        let val = if self.flip {
            f64::from_be_bytes(buf)
        } else {
            f64::from_le_bytes(buf)
        };
        Ok(if val.is_infinite() { f64::NAN } else { val })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::known_bytes_block;

    #[test]
    fn test_little_endian_block() {
        let block = known_bytes_block(false);
        let kb = KnownBytes::from_block(&block).unwrap();
        assert!(!kb.flip());
    }

    #[test]
    fn test_big_endian_block_flips() {
        let block = known_bytes_block(true);
        let kb = KnownBytes::from_block(&block).unwrap();
        assert!(kb.flip());
        // a float32 written big-endian decodes through the flipped reader
        let mut bytes: &[u8] = &[0x42, 0x28, 0x00, 0x00];
        assert_eq!(kb.read32(&mut bytes).unwrap(), 42.0);
    }

    #[test]
    fn test_bad_tag_is_format_error() {
        let mut block = known_bytes_block(false);
        block[0] = b'x';
        assert!(matches!(
            KnownBytes::from_block(&block),
            Err(crate::Error::Format(_))
        ));
    }

    #[test]
    fn test_bad_int16_is_format_error() {
        let mut block = known_bytes_block(false);
        block[2] = 0xAB;
        block[3] = 0xCD;
        assert!(matches!(
            KnownBytes::from_block(&block),
            Err(crate::Error::Format(_))
        ));
    }

    #[test]
    fn test_bad_float_is_format_error() {
        let mut block = known_bytes_block(false);
        block[4..8].copy_from_slice(&1.0f32.to_le_bytes());
        assert!(matches!(
            KnownBytes::from_block(&block),
            Err(crate::Error::Format(_))
        ));
    }

    #[test]
    fn test_infinities_normalize_to_nan() {
        let kb = KnownBytes::from_block(&known_bytes_block(false)).unwrap();
        let mut bytes: &[u8] = &f32::INFINITY.to_le_bytes();
        assert!(kb.read32(&mut bytes).unwrap().is_nan());
        let mut bytes: &[u8] = &f64::NEG_INFINITY.to_le_bytes();
        assert!(kb.read64(&mut bytes).unwrap().is_nan());
    }

    #[test]
    fn test_read16_flipped() {
        let kb = KnownBytes::from_block(&known_bytes_block(true)).unwrap();
        let mut bytes: &[u8] = &[0x01, 0x02];
        assert_eq!(kb.read16(&mut bytes).unwrap(), 0x0102);
    }
}
