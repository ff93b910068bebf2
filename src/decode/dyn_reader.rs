//! Runtime polymorphism over raw and LZ4-compressed DBD input.
use std::{
    fs::File,
    io::{self, BufReader},
    path::Path,
};

use super::lz4::Lz4FrameReader;

/// Whether a DBD file's payload is LZ4-compressed.
///
/// Compression is encoded in the file extension: the middle letter is `c` for
/// compressed files (`.dcd`, `.ecd`, `.scd`, `.tcd`, `.mcd`, `.ncd`, `.ccc`)
/// and `b` for raw files (`.dbd`, `.ebd`, …).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Compression {
    /// Uncompressed.
    #[default]
    None,
    /// LZ4-framed.
    Lz4,
}

impl Compression {
    /// Classifies a path by its extension.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let Some(ext) = path.as_ref().extension().and_then(|e| e.to_str()) else {
            return Self::None;
        };
        if ext.len() == 3 && ext.as_bytes()[1].eq_ignore_ascii_case(&b'c') {
            Self::Lz4
        } else {
            Self::None
        }
    }
}

/// Type for runtime polymorphism over reading raw or LZ4-compressed DBD
/// input. Implements [`std::io::Read`].
pub struct DynReader<R>(DynReaderImpl<R>)
where
    R: io::Read;

enum DynReaderImpl<R>
where
    R: io::Read,
{
    Raw(R),
    Lz4(Lz4FrameReader<R>),
}

impl<R> DynReader<R>
where
    R: io::Read,
{
    /// Creates a new [`DynReader`] from a reader with the specified
    /// `compression`.
    pub fn new(reader: R, compression: Compression) -> Self {
        match compression {
            Compression::None => Self(DynReaderImpl::Raw(reader)),
            Compression::Lz4 => Self(DynReaderImpl::Lz4(Lz4FrameReader::new(reader))),
        }
    }

    /// Returns a reference to the inner reader.
    pub fn get_ref(&self) -> &R {
        match &self.0 {
            DynReaderImpl::Raw(reader) => reader,
            DynReaderImpl::Lz4(reader) => reader.get_ref(),
        }
    }

    /// Returns a mutable reference to the inner reader.
    pub fn get_mut(&mut self) -> &mut R {
        match &mut self.0 {
            DynReaderImpl::Raw(reader) => reader,
            DynReaderImpl::Lz4(reader) => reader.get_mut(),
        }
    }
}

impl DynReader<BufReader<File>> {
    /// Creates a new [`DynReader`] from the file at `path`, classifying the
    /// compression from the path's extension.
    ///
    /// # Errors
    /// This function will return an error if it is unable to open the file.
    pub fn from_file(path: impl AsRef<Path>) -> crate::Result<Self> {
        let file = File::open(path.as_ref()).map_err(|e| {
            crate::Error::io(
                e,
                format!(
                    "opening file to decode at path '{}'",
                    path.as_ref().display()
                ),
            )
        })?;
        Ok(Self::new(
            BufReader::new(file),
            Compression::from_path(path),
        ))
    }
}

impl<R> io::Read for DynReader<R>
where
    R: io::Read,
{
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.0 {
            DynReaderImpl::Raw(reader) => reader.read(buf),
            DynReaderImpl::Lz4(reader) => reader.read(buf),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use rstest::rstest;

    use super::*;
    use crate::test_utils::lz4_frames;

    #[rstest]
    #[case::dbd("segment.dbd", Compression::None)]
    #[case::ebd("segment.EBD", Compression::None)]
    #[case::dcd("segment.dcd", Compression::Lz4)]
    #[case::ecd("segment.ecd", Compression::Lz4)]
    #[case::tcd("segment.TCD", Compression::Lz4)]
    #[case::ccc("deadbeef.ccc", Compression::Lz4)]
    #[case::cac("deadbeef.cac", Compression::None)]
    #[case::none("segment", Compression::None)]
    #[case::long("segment.dcdx", Compression::None)]
    fn test_compression_from_path(#[case] path: &str, #[case] expected: Compression) {
        assert_eq!(Compression::from_path(path), expected);
    }

    #[test]
    fn test_raw_and_compressed_agree() {
        let payload = b"sa\x34\x12 raw bytes".repeat(50);
        let framed = lz4_frames(&payload);
        let mut raw = DynReader::new(payload.as_slice(), Compression::None);
        let mut compressed = DynReader::new(framed.as_slice(), Compression::Lz4);
        let mut raw_out = Vec::new();
        raw.read_to_end(&mut raw_out).unwrap();
        let mut compressed_out = Vec::new();
        compressed.read_to_end(&mut compressed_out).unwrap();
        assert_eq!(raw_out, compressed_out);
    }
}
