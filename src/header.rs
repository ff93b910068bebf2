//! The ASCII `key: value` prologue at the start of every DBD file.
use std::collections::HashSet;
use std::io;

/// Number of header tags assumed until a `num_ascii_tags` tag says otherwise.
const DEFAULT_NUM_ASCII_TAGS: usize = 10;
/// Hard bound on header lines so non-DBD input can't run the parser away.
const MAX_HEADER_LINES: usize = 1000;

/// The parsed ASCII header of a DBD file.
///
/// The header is a sequence of `key: value` lines terminated by its own
/// declared tag count: the `num_ascii_tags` tag bounds the number of lines,
/// and the last tag acts as the sentinel after which the sensor list (or, for
/// factored files, the known-bytes block) begins. Insertion order is
/// preserved.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FileHeader {
    records: Vec<(String, String)>,
}

impl FileHeader {
    /// Reads and parses the header from `reader`, leaving the stream
    /// positioned at the first byte after the last header line.
    ///
    /// # Errors
    /// This function returns an error if reading fails or if no `key: value`
    /// line could be parsed at all (an empty or missing header).
    pub fn read(reader: &mut impl io::BufRead) -> crate::Result<Self> {
        let mut records = Vec::new();
        let mut num_tags = DEFAULT_NUM_ASCII_TAGS;
        let mut line = Vec::new();
        for _ in 0..MAX_HEADER_LINES {
            if records.len() >= num_tags {
                break;
            }
            line.clear();
            let n = reader
                .read_until(b'\n', &mut line)
                .map_err(|e| crate::error::reader_error(e, "reading header line"))?;
            if n == 0 || !line.is_ascii() {
                break;
            }
            let text = String::from_utf8_lossy(&line);
            let Some((key, value)) = text.trim().split_once(':') else {
                break;
            };
            let (key, value) = (key.trim(), value.trim());
            // A bare "s" key means we've run into the sensor list.
            if key.is_empty() || key == "s" {
                break;
            }
            if key == "num_ascii_tags" {
                if let Ok(n) = value.parse() {
                    num_tags = n;
                }
            }
            records.push((key.to_owned(), value.to_owned()));
        }
        if records.is_empty() {
            return Err(crate::Error::header("empty or missing header"));
        }
        Ok(Self { records })
    }

    /// Returns the value for `key`, if present.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.records
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Returns the value for `key` parsed as an integer, or `default` when the
    /// key is missing or unparseable.
    pub fn get_int(&self, key: &str, default: i64) -> i64 {
        self.get(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    /// Returns an iterator over all `(key, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.records.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Returns `true` if no header tags were parsed.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The mission name, or an empty string when absent.
    pub fn mission_name(&self) -> &str {
        self.get("mission_name").unwrap_or_default()
    }

    /// The file-open time string, or an empty string when absent.
    pub fn fileopen_time(&self) -> &str {
        self.get("fileopen_time").unwrap_or_default()
    }

    /// The encoding version string, or an empty string when absent.
    pub fn encoding_ver(&self) -> &str {
        self.get("encoding_ver").unwrap_or_default()
    }

    /// The full filename recorded by the glider, or an empty string when
    /// absent.
    pub fn full_filename(&self) -> &str {
        self.get("full_filename").unwrap_or_default()
    }

    /// The 8.3 filename recorded by the glider, or an empty string when
    /// absent.
    pub fn the8x3_filename(&self) -> &str {
        self.get("the8x3_filename").unwrap_or_default()
    }

    /// The original filename extension, or an empty string when absent.
    pub fn filename_extension(&self) -> &str {
        self.get("filename_extension").unwrap_or_default()
    }

    /// The CRC of the sensor list, or an empty string when absent.
    pub fn sensor_list_crc(&self) -> &str {
        self.get("sensor_list_crc").unwrap_or_default()
    }

    /// Returns `true` when the sensor list is factored out into a cache file
    /// rather than stored inline.
    pub fn factored(&self) -> bool {
        self.get("sensor_list_factored")
            .or_else(|| self.get("factored"))
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(0)
            != 0
    }

    /// The total number of sensor definition lines in the file, including
    /// unavailable (`F`) rows.
    pub fn total_num_sensors(&self) -> usize {
        self.get_int("total_num_sensors", 0).max(0) as usize
    }

    /// The number of sensors transmitted per cycle (the available sensors).
    pub fn sensors_per_cycle(&self) -> usize {
        self.get_int("sensors_per_cycle", 0).max(0) as usize
    }

    /// Returns `true` if this file's mission should be processed: the mission
    /// name must not be in `skip` and, when `keep` is non-empty, must be in
    /// `keep`. Matching is case-sensitive on the stored string.
    pub fn should_process_mission(&self, skip: &HashSet<String>, keep: &HashSet<String>) -> bool {
        let mission = self.mission_name();
        if skip.contains(mission) {
            return false;
        }
        keep.is_empty() || keep.contains(mission)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    const HEADER: &str = "dbd_label: DBD(dinkum_binary_data)file\n\
        encoding_ver: 5\n\
        num_ascii_tags: 8\n\
        the8x3_filename: 01230000\n\
        mission_name: MICRO.MI\n\
        sensors_per_cycle: 3\n\
        sensor_list_crc: DEADBEEF\n\
        sensor_list_factored: 1\n";

    fn names(items: &[&str]) -> HashSet<String> {
        items.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn test_read_stops_at_declared_tag_count() {
        let mut input = Cursor::new(format!("{HEADER}s: T 0 0 4 m_depth m\n").into_bytes());
        let header = FileHeader::read(&mut input).unwrap();
        assert_eq!(header.iter().count(), 8);
        assert_eq!(header.mission_name(), "MICRO.MI");
        assert_eq!(header.sensor_list_crc(), "DEADBEEF");
        assert_eq!(header.sensors_per_cycle(), 3);
        assert!(header.factored());
        // the sensor line is left unread
        let mut rest = String::new();
        std::io::Read::read_to_string(&mut input, &mut rest).unwrap();
        assert_eq!(rest, "s: T 0 0 4 m_depth m\n");
    }

    #[test]
    fn test_read_empty_is_an_error() {
        let mut input = &b""[..];
        assert!(matches!(
            FileHeader::read(&mut input),
            Err(crate::Error::Header(_))
        ));
    }

    #[test]
    fn test_read_binary_garbage_is_an_error() {
        let mut input = &[0xFFu8, 0x01, 0x02, b'\n'][..];
        assert!(matches!(
            FileHeader::read(&mut input),
            Err(crate::Error::Header(_))
        ));
    }

    #[test]
    fn test_mission_filters() {
        let mut input = HEADER.as_bytes();
        let header = FileHeader::read(&mut input).unwrap();
        let empty = HashSet::new();
        assert!(header.should_process_mission(&empty, &empty));
        assert!(!header.should_process_mission(&names(&["MICRO.MI"]), &empty));
        assert!(header.should_process_mission(&empty, &names(&["MICRO.MI"])));
        assert!(!header.should_process_mission(&empty, &names(&["OTHER.MI"])));
        // matching is case-sensitive
        assert!(header.should_process_mission(&names(&["micro.mi"]), &empty));
    }
}
