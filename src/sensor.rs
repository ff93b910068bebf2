//! Sensor definitions, per-file rosters, and the sensor cache.
//!
//! Sensor definition lines have the form
//! `s: <T|F> <file_index> <storage_index> <size> <name> <units>`. Only lines
//! flagged `T` (available) enter a roster: the binary data section carries
//! values for available sensors only, so admitting an `F` row would shift the
//! header-bit position of every sensor after it. Roster order is what the
//! record decoder walks when interpreting header bits.
use std::{
    collections::{HashMap, HashSet},
    fs::File,
    io::{self, BufRead, BufReader, Write},
    path::Path,
};

use log::warn;

use crate::column::SensorInfo;
use crate::decode::Lz4FrameReader;

/// Value width and interpretation of a sensor. Sensor sizes 1 and 2 decode as
/// signed integers; sizes 4 and 8 decode as floats. No other sizes are valid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SensorKind {
    /// A 1-byte signed integer.
    Int8,
    /// A 2-byte signed integer.
    Int16,
    /// A 4-byte float.
    Float32,
    /// An 8-byte float.
    Float64,
}

impl SensorKind {
    /// Classifies an encoded sensor size in bytes.
    ///
    /// # Errors
    /// This function returns an error if `size` is not one of 1, 2, 4, or 8.
    pub fn from_size(size: u8) -> crate::Result<Self> {
        match size {
            1 => Ok(Self::Int8),
            2 => Ok(Self::Int16),
            4 => Ok(Self::Float32),
            8 => Ok(Self::Float64),
            other => Err(crate::Error::format(format!(
                "unknown sensor size {other}, expected 1, 2, 4, or 8"
            ))),
        }
    }

    /// Returns the encoded width in bytes.
    pub fn size(&self) -> u8 {
        match self {
            Self::Int8 => 1,
            Self::Int16 => 2,
            Self::Float32 => 4,
            Self::Float64 => 8,
        }
    }
}

/// A single sensor from a DBD sensor list.
#[derive(Clone, Debug, PartialEq)]
pub struct Sensor {
    /// The sensor name.
    pub name: String,
    /// The sensor units.
    pub units: String,
    /// The value width and interpretation.
    pub kind: SensorKind,
    /// Whether the sensor is transmitted in this file (`T` in the sensor
    /// list). Rosters only ever contain available sensors.
    pub available: bool,
    /// The index recorded in the sensor definition line.
    pub file_index: i32,
    /// The storage index recorded in the sensor definition line; `-1` on
    /// unavailable sensors.
    pub storage_index: i32,
    /// Whether the sensor appears in the output columns.
    pub keep: bool,
    /// Whether the sensor gates record commits.
    pub criteria: bool,
    /// The dense output column index; `Some` iff the sensor is kept.
    pub output_index: Option<usize>,
}

impl Sensor {
    /// Parses a sensor definition line.
    ///
    /// # Errors
    /// This function returns an error if the line doesn't start with `s:`,
    /// has fewer than six fields after the tag, or carries an invalid
    /// availability flag, index, or size.
    pub fn parse(line: &str) -> crate::Result<Self> {
        let invalid = |what: &str| {
            crate::Error::format(format!("invalid sensor definition line ({what}): {line:?}"))
        };
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 7 || fields[0] != "s:" {
            return Err(invalid("expected `s: <T|F> <index> <index> <size> <name> <units>`"));
        }
        let available = match fields[1] {
            "T" => true,
            "F" => false,
            _ => return Err(invalid("availability flag must be T or F")),
        };
        let file_index = fields[2].parse().map_err(|_| invalid("file index"))?;
        let storage_index = fields[3].parse().map_err(|_| invalid("storage index"))?;
        let size: u8 = fields[4].parse().map_err(|_| invalid("size"))?;
        Ok(Self {
            name: fields[5].to_owned(),
            units: fields[6].to_owned(),
            kind: SensorKind::from_size(size)?,
            available,
            file_index,
            storage_index,
            keep: true,
            criteria: true,
            output_index: None,
        })
    }

    /// Returns the column metadata for this sensor.
    pub fn info(&self) -> SensorInfo {
        SensorInfo {
            name: self.name.clone(),
            units: self.units.clone(),
            size: self.kind.size(),
        }
    }
}

/// An ordered roster of the available sensors of one file.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SensorSet {
    sensors: Vec<Sensor>,
    n_lines: usize,
}

impl SensorSet {
    /// Reads up to `n_lines` inline sensor definition lines from `reader`,
    /// retaining only available sensors. Parsing stops early at the first
    /// line that is not a sensor definition.
    ///
    /// # Errors
    /// This function returns an error if reading fails or a sensor line is
    /// malformed.
    pub fn read_inline(reader: &mut impl BufRead, n_lines: usize) -> crate::Result<Self> {
        let mut set = Self::default();
        let mut line = Vec::new();
        for _ in 0..n_lines {
            line.clear();
            let n = reader
                .read_until(b'\n', &mut line)
                .map_err(|e| crate::error::reader_error(e, "reading sensor definition line"))?;
            if n == 0 {
                break;
            }
            if !line.starts_with(b"s:") {
                break;
            }
            let text = String::from_utf8_lossy(&line);
            set.push(Sensor::parse(text.trim())?);
            set.n_lines += 1;
        }
        if set.n_lines != n_lines {
            warn!(
                "expected {n_lines} sensor definition lines, found {}",
                set.n_lines
            );
        }
        Ok(set)
    }

    /// Loads a roster from the cache directory, trying `{crc}.cac` (plain
    /// text) first and `{crc}.ccc` (LZ4-compressed text) second. The CRC is
    /// lowercased for the file name lookup.
    ///
    /// # Errors
    /// This function returns [`Error::CacheMiss`](crate::Error::CacheMiss) if
    /// neither file exists, and other errors if a file exists but cannot be
    /// read or parsed.
    pub fn load_cache(cache_dir: &Path, crc: &str) -> crate::Result<Self> {
        let crc_lower = crc.to_lowercase();
        let cac = cache_dir.join(format!("{crc_lower}.cac"));
        if cac.is_file() {
            let file = File::open(&cac).map_err(|e| {
                crate::Error::io(e, format!("opening sensor cache '{}'", cac.display()))
            })?;
            return Self::read_cache_lines(BufReader::new(file));
        }
        let ccc = cache_dir.join(format!("{crc_lower}.ccc"));
        if ccc.is_file() {
            let file = File::open(&ccc).map_err(|e| {
                crate::Error::io(e, format!("opening sensor cache '{}'", ccc.display()))
            })?;
            return Self::read_cache_lines(BufReader::new(Lz4FrameReader::new(file)));
        }
        Err(crate::Error::CacheMiss {
            crc: crc.to_owned(),
            cache_dir: cache_dir.to_owned(),
        })
    }

    fn read_cache_lines(mut reader: impl BufRead) -> crate::Result<Self> {
        let mut set = Self::default();
        let mut line = Vec::new();
        loop {
            line.clear();
            let n = reader
                .read_until(b'\n', &mut line)
                .map_err(|e| crate::error::reader_error(e, "reading sensor cache line"))?;
            if n == 0 {
                break;
            }
            // tolerate the count prologue and blank lines
            if !line.starts_with(b"s:") {
                continue;
            }
            let text = String::from_utf8_lossy(&line);
            set.push(Sensor::parse(text.trim())?);
            set.n_lines += 1;
        }
        Ok(set)
    }

    /// Serializes this roster to `{crc}.cac` in the cache directory, unless a
    /// cache entry for the CRC already exists.
    ///
    /// # Errors
    /// This function returns an error if the file cannot be created or
    /// written.
    pub fn dump_cache(&self, cache_dir: &Path, crc: &str) -> crate::Result<()> {
        let crc_lower = crc.to_lowercase();
        let cac = cache_dir.join(format!("{crc_lower}.cac"));
        if cac.is_file() || cache_dir.join(format!("{crc_lower}.ccc")).is_file() {
            return Ok(());
        }
        let mut file = File::create(&cac).map_err(|e| {
            crate::Error::io(e, format!("creating sensor cache '{}'", cac.display()))
        })?;
        self.write_list(&mut file)
            .map_err(|e| crate::Error::io(e, format!("writing sensor cache '{}'", cac.display())))
    }

    fn write_list(&self, writer: &mut impl Write) -> io::Result<()> {
        writeln!(writer, "sensors_per_cycle: {}", self.sensors.len())?;
        for s in &self.sensors {
            writeln!(
                writer,
                "s: T {} {} {} {} {}",
                s.file_index,
                s.storage_index,
                s.kind.size(),
                s.name,
                s.units
            )?;
        }
        Ok(())
    }

    /// Adds `sensor` to the roster. Unavailable sensors are discarded: their
    /// values never appear in the data stream, so storing them would shift
    /// the header-bit position of every later sensor.
    pub fn push(&mut self, sensor: Sensor) {
        if sensor.available {
            self.sensors.push(sensor);
        }
    }

    /// Marks each sensor as kept iff its name is in `names`; an empty set
    /// keeps every sensor.
    pub fn apply_keep(&mut self, names: &HashSet<String>) {
        for s in &mut self.sensors {
            s.keep = names.is_empty() || names.contains(&s.name);
        }
    }

    /// Marks each sensor as a commit criterion iff its name is in `names`; an
    /// empty set makes every sensor a criterion.
    pub fn apply_criteria(&mut self, names: &HashSet<String>) {
        for s in &mut self.sensors {
            s.criteria = names.is_empty() || names.contains(&s.name);
        }
    }

    /// Assigns dense output column indices to kept sensors in roster order
    /// and clears the index of all others. Returns the number of output
    /// columns.
    pub fn assign_output_indices(&mut self) -> usize {
        let mut next = 0;
        for s in &mut self.sensors {
            s.output_index = if s.keep {
                next += 1;
                Some(next - 1)
            } else {
                None
            };
        }
        next
    }

    /// Returns the number of output columns (kept sensors).
    pub fn n_to_store(&self) -> usize {
        self.sensors.iter().filter(|s| s.keep).count()
    }

    /// Returns the number of header-bit bytes per record for this roster.
    pub fn header_bit_bytes(&self) -> usize {
        (self.sensors.len() + 3) / 4
    }

    /// Returns the number of sensors in the roster.
    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    /// Returns `true` if the roster has no sensors.
    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }

    /// Returns an iterator over the sensors in roster order.
    pub fn iter(&self) -> std::slice::Iter<'_, Sensor> {
        self.sensors.iter()
    }

    /// Returns the sensor at roster position `index`.
    pub fn get(&self, index: usize) -> Option<&Sensor> {
        self.sensors.get(index)
    }
}

/// The union of sensor rosters across a set of files, in order of first
/// appearance. Metadata (units) is adopted from the first occurrence; the
/// size must agree at every occurrence.
#[derive(Debug, Default)]
pub(crate) struct SensorUnion {
    sensors: Vec<UnionSensor>,
    by_name: HashMap<String, usize>,
}

#[derive(Debug)]
struct UnionSensor {
    name: String,
    units: String,
    kind: SensorKind,
    keep: bool,
    criteria: bool,
}

impl SensorUnion {
    /// Folds a file's roster into the union, checking size consistency.
    pub(crate) fn insert_roster(&mut self, set: &SensorSet) -> crate::Result<()> {
        for s in set.iter() {
            match self.by_name.get(&s.name) {
                Some(&i) => {
                    let existing = &self.sensors[i];
                    if existing.kind != s.kind {
                        return Err(crate::Error::format(format!(
                            "sensor {} has size {} in one file but size {} in another",
                            s.name,
                            existing.kind.size(),
                            s.kind.size()
                        )));
                    }
                }
                None => {
                    self.by_name.insert(s.name.clone(), self.sensors.len());
                    self.sensors.push(UnionSensor {
                        name: s.name.clone(),
                        units: s.units.clone(),
                        kind: s.kind,
                        keep: true,
                        criteria: true,
                    });
                }
            }
        }
        Ok(())
    }

    pub(crate) fn apply_keep(&mut self, names: &HashSet<String>) {
        for s in &mut self.sensors {
            s.keep = names.is_empty() || names.contains(&s.name);
        }
    }

    pub(crate) fn apply_criteria(&mut self, names: &HashSet<String>) {
        for s in &mut self.sensors {
            s.criteria = names.is_empty() || names.contains(&s.name);
        }
    }

    /// Returns metadata for the kept sensors, in union order.
    pub(crate) fn kept_info(&self) -> Vec<SensorInfo> {
        self.sensors
            .iter()
            .filter(|s| s.keep)
            .map(|s| SensorInfo {
                name: s.name.clone(),
                units: s.units.clone(),
                size: s.kind.size(),
            })
            .collect()
    }

    /// Returns the dense union output index for each kept sensor name.
    pub(crate) fn name_to_output(&self) -> HashMap<String, usize> {
        self.sensors
            .iter()
            .filter(|s| s.keep)
            .enumerate()
            .map(|(i, s)| (s.name.clone(), i))
            .collect()
    }
}
