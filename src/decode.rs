//! Decoding DBD files and streams: transparent LZ4 expansion, the
//! endianness probe, the record-stream decoder, and the per-file pipeline.
mod columns;
mod dyn_reader;
mod file;
mod known_bytes;
mod lz4;

pub use dyn_reader::{Compression, DynReader};
pub use file::FileDecoder;
pub use known_bytes::KnownBytes;
pub use lz4::Lz4FrameReader;

pub(crate) use columns::read_columns;
