//! A crate for reading Dinkum Binary Data (DBD) files produced by Slocum ocean
//! gliders and converting them into typed, column-oriented arrays.
//!
//! A DBD file is a self-describing binary container: an ASCII `key: value`
//! header, an optional inline sensor list, a 16-byte known-bytes block used to
//! detect byte order, and a sequence of run-length-encoded data records. This
//! crate decodes single files ([`read_single`]) as well as whole deployments
//! ([`read_many`]), unifying the sensor rosters of all files into one output
//! schema. Compressed variants (`.dcd`, `.ecd`, …, where the middle letter of
//! the extension is `c`) are expanded transparently.
//!
//! Sensor lists of *factored* files are resolved through a cache directory of
//! `{crc}.cac`/`{crc}.ccc` files; unfactored files write their sensor list
//! back to the cache so later factored segments can be read.
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(clippy::missing_errors_doc)]

pub mod column;
pub mod decode;
pub mod error;
pub mod header;
pub mod read;
pub mod sensor;
#[cfg(test)]
mod test_utils;

pub use crate::{
    column::{CellValue, RecordSet, SensorInfo, TypedColumn, FILL_INT8, FILL_INT16},
    decode::{Compression, DynReader, FileDecoder, KnownBytes, Lz4FrameReader},
    error::{Error, Result},
    header::FileHeader,
    read::{
        read_many, read_single, scan_headers, scan_rosters, FileRecordSet, HeaderScan,
        MultiRecordSet, ReadOptions, RosterScan,
    },
    sensor::{Sensor, SensorKind, SensorSet},
};
