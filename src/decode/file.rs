//! Decoding a single DBD file end to end: header, sensor roster, known
//! bytes, and data records.
use std::{
    fs,
    io::{BufRead, BufReader},
    path::Path,
};

use log::warn;

use super::{dyn_reader::DynReader, known_bytes::KnownBytes, read_columns};
use crate::column::RecordSet;
use crate::header::FileHeader;
use crate::sensor::SensorSet;

/// Column-allocation hint used when the stream length is unknown, such as for
/// compressed input.
const DEFAULT_BYTES_HINT: u64 = 1 << 20;

/// Decoder for one DBD file. Parsing is staged: the header is read on
/// construction, the sensor roster on [`read_sensors`](Self::read_sensors)
/// (or skipped), and the data section on [`decode`](Self::decode).
pub struct FileDecoder<R> {
    reader: R,
    header: FileHeader,
    bytes_hint: u64,
}

impl FileDecoder<BufReader<DynReader<BufReader<fs::File>>>> {
    /// Opens the file at `path`, transparently expanding LZ4-compressed
    /// variants, and parses its header.
    ///
    /// # Errors
    /// This function will return an error if it is unable to open the file or
    /// if the header is empty or malformed.
    pub fn from_file(path: impl AsRef<Path>) -> crate::Result<Self> {
        let bytes_hint = fs::metadata(path.as_ref())
            .map(|m| m.len())
            .unwrap_or(DEFAULT_BYTES_HINT);
        let reader = BufReader::new(DynReader::from_file(path)?);
        Self::with_bytes_hint(reader, bytes_hint)
    }
}

impl<R: BufRead> FileDecoder<R> {
    /// Creates a new [`FileDecoder`] from `reader` and parses the header.
    ///
    /// # Errors
    /// This function will return an error if the header is empty or
    /// malformed.
    pub fn new(reader: R) -> crate::Result<Self> {
        Self::with_bytes_hint(reader, DEFAULT_BYTES_HINT)
    }

    fn with_bytes_hint(mut reader: R, bytes_hint: u64) -> crate::Result<Self> {
        let header = FileHeader::read(&mut reader)?;
        Ok(Self {
            reader,
            header,
            bytes_hint,
        })
    }

    /// Returns the parsed header.
    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    /// Resolves the file's sensor roster: for factored files, from the cache
    /// directory; otherwise from the inline sensor list, writing it back to
    /// the cache when one is configured and the entry is missing.
    ///
    /// # Errors
    /// This function returns an error on a malformed sensor line, or with
    /// [`Error::CacheMiss`](crate::Error::CacheMiss) when a factored file's
    /// CRC has no cache entry (a factored file without a configured cache
    /// directory always misses).
    pub fn read_sensors(&mut self, cache_dir: Option<&Path>) -> crate::Result<SensorSet> {
        let crc = self.header.sensor_list_crc().to_owned();
        if self.header.factored() {
            let Some(dir) = cache_dir else {
                return Err(crate::Error::CacheMiss {
                    crc,
                    cache_dir: Default::default(),
                });
            };
            return SensorSet::load_cache(dir, &crc);
        }
        let sensors = SensorSet::read_inline(&mut self.reader, self.header.total_num_sensors())?;
        if let Some(dir) = cache_dir {
            // cache write-back failures shouldn't fail the parse
            if let Err(e) = sensors.dump_cache(dir, &crc) {
                warn!("failed to write sensor cache for CRC {crc}: {e}");
            }
        }
        Ok(sensors)
    }

    /// Skips the inline sensor list without parsing it, positioning the
    /// stream at the known-bytes block. Factored files store no inline list,
    /// so this is a no-op for them.
    ///
    /// # Errors
    /// This function returns an error if reading fails.
    pub fn skip_sensor_lines(&mut self) -> crate::Result<()> {
        if self.header.factored() {
            return Ok(());
        }
        let mut line = Vec::new();
        for _ in 0..self.header.total_num_sensors() {
            line.clear();
            let n = self
                .reader
                .read_until(b'\n', &mut line)
                .map_err(|e| crate::error::reader_error(e, "skipping sensor definition line"))?;
            if n == 0 {
                break;
            }
        }
        Ok(())
    }

    /// Runs the endianness probe and decodes all data records against
    /// `sensors`, which must carry assigned output indices.
    ///
    /// # Errors
    /// This function returns an error if the known-bytes block is missing or
    /// invalid, or if an LZ4 frame of a compressed file fails to decode.
    /// Truncation and stray bytes are not errors: committed records are
    /// returned.
    pub fn decode(mut self, sensors: &SensorSet, repair: bool) -> crate::Result<RecordSet> {
        let kb = KnownBytes::read(&mut self.reader)?;
        read_columns(&mut self.reader, &kb, sensors, repair, self.bytes_hint)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::test_utils::FileBuilder;

    fn all() -> HashSet<String> {
        HashSet::new()
    }

    #[test]
    fn test_inline_roster_then_decode() {
        let bytes = FileBuilder::new()
            .sensor("m_depth", 4)
            .sensor("m_pitch", 4)
            .record(&[2, 2], &[1.5f32.to_le_bytes(), 0.25f32.to_le_bytes()].concat())
            .build();
        let mut decoder = FileDecoder::new(bytes.as_slice()).unwrap();
        assert_eq!(decoder.header().sensors_per_cycle(), 2);
        let mut sensors = decoder.read_sensors(None).unwrap();
        sensors.apply_keep(&all());
        sensors.apply_criteria(&all());
        sensors.assign_output_indices();
        let set = decoder.decode(&sensors, false).unwrap();
        assert_eq!(set.n_records, 1);
        assert_eq!(set.column("m_depth").unwrap().as_f32().unwrap(), &[1.5]);
        assert_eq!(set.column("m_pitch").unwrap().as_f32().unwrap(), &[0.25]);
    }

    #[test]
    fn test_skip_sensor_lines_positions_at_known_bytes() {
        let bytes = FileBuilder::new()
            .sensor("m_depth", 2)
            .absent_sensor("m_roll", 4)
            .record(&[2], &7i16.to_le_bytes())
            .build();
        let mut decoder = FileDecoder::new(bytes.as_slice()).unwrap();
        decoder.skip_sensor_lines().unwrap();
        let mut sensors = SensorSet::default();
        sensors.push(crate::sensor::Sensor::parse("s: T 0 0 2 m_depth m").unwrap());
        sensors.apply_keep(&all());
        sensors.apply_criteria(&all());
        sensors.assign_output_indices();
        let set = decoder.decode(&sensors, false).unwrap();
        assert_eq!(set.column("m_depth").unwrap().as_i16().unwrap(), &[7]);
    }

    #[test]
    fn test_factored_without_cache_dir_is_a_miss() {
        let bytes = FileBuilder::new().factored(true).build();
        let mut decoder = FileDecoder::new(bytes.as_slice()).unwrap();
        assert!(matches!(
            decoder.read_sensors(None),
            Err(crate::Error::CacheMiss { .. })
        ));
    }
}
