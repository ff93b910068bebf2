//! The public read API: single files, multi-file unions, and header scans.
use std::{
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
};

use log::debug;

use crate::column::{RecordSet, SensorInfo, TypedColumn};
use crate::decode::FileDecoder;
use crate::header::FileHeader;
use crate::sensor::{SensorKind, SensorSet, SensorUnion};

/// Options shared by the read and scan functions.
///
/// The default keeps every sensor, treats every sensor as a commit
/// criterion, applies no mission filter, skips the first record (which
/// usually duplicates the last record of the previous segment), and leaves
/// repair mode off.
#[derive(Clone, Debug)]
pub struct ReadOptions {
    /// Directory of `{crc}.cac`/`{crc}.ccc` sensor cache files. Required to
    /// read factored files; unfactored files write their roster back here.
    pub cache_dir: Option<PathBuf>,
    /// Names of sensors to keep in the output; empty keeps all.
    pub keep: Vec<String>,
    /// Names of sensors whose presence commits a record; empty means all.
    pub criteria: Vec<String>,
    /// Missions to exclude. Matching is case-sensitive.
    pub skip_missions: Vec<String>,
    /// When non-empty, only these missions are read. Matching is
    /// case-sensitive.
    pub keep_missions: Vec<String>,
    /// Whether to drop the first record of a file (for multi-file reads,
    /// of every contributing file after the first).
    pub skip_first_record: bool,
    /// Whether to scan forward for the next record after a stray byte
    /// instead of stopping.
    pub repair: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            cache_dir: None,
            keep: Vec::new(),
            criteria: Vec::new(),
            skip_missions: Vec::new(),
            keep_missions: Vec::new(),
            skip_first_record: true,
            repair: false,
        }
    }
}

impl ReadOptions {
    /// Creates the default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the sensor cache directory and returns the options.
    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    /// Sets the sensors to keep and returns the options.
    pub fn keep(mut self, names: impl IntoIterator<Item = impl ToString>) -> Self {
        self.keep = names.into_iter().map(|n| n.to_string()).collect();
        self
    }

    /// Sets the criteria sensors and returns the options.
    pub fn criteria(mut self, names: impl IntoIterator<Item = impl ToString>) -> Self {
        self.criteria = names.into_iter().map(|n| n.to_string()).collect();
        self
    }

    /// Sets the missions to exclude and returns the options.
    pub fn skip_missions(mut self, names: impl IntoIterator<Item = impl ToString>) -> Self {
        self.skip_missions = names.into_iter().map(|n| n.to_string()).collect();
        self
    }

    /// Sets the missions to read exclusively and returns the options.
    pub fn keep_missions(mut self, names: impl IntoIterator<Item = impl ToString>) -> Self {
        self.keep_missions = names.into_iter().map(|n| n.to_string()).collect();
        self
    }

    /// Sets whether to drop each file's first record and returns the
    /// options.
    pub fn skip_first_record(mut self, skip: bool) -> Self {
        self.skip_first_record = skip;
        self
    }

    /// Sets repair mode and returns the options.
    pub fn repair(mut self, repair: bool) -> Self {
        self.repair = repair;
        self
    }
}

/// The result of reading a single DBD file.
#[derive(Debug)]
pub struct FileRecordSet {
    /// The decoded columns.
    pub records: RecordSet,
    /// The file's parsed header.
    pub header: FileHeader,
    /// The path the file was read from.
    pub path: PathBuf,
}

/// The result of reading several DBD files into one union schema.
#[derive(Debug)]
pub struct MultiRecordSet {
    /// The concatenated, union-shaped columns.
    pub records: RecordSet,
    /// The number of files whose header and roster were successfully
    /// scanned.
    pub n_files: usize,
}

/// The result of scanning rosters without decoding data.
#[derive(Debug)]
pub struct RosterScan {
    /// Union column metadata across all scanned files.
    pub sensor_info: Vec<SensorInfo>,
    /// The number of files whose header and roster were successfully
    /// scanned.
    pub n_files: usize,
}

/// Header fields of one scanned file.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct HeaderScan {
    /// The path the header was read from.
    pub path: PathBuf,
    /// The file's mission name.
    pub mission_name: String,
    /// The file's sensor-list CRC.
    pub sensor_list_crc: String,
    /// The file-open time string recorded by the glider.
    pub fileopen_time: String,
}

fn name_set(names: &[String]) -> HashSet<String> {
    names.iter().cloned().collect()
}

/// Reads a single DBD file into typed columns.
///
/// # Errors
/// This function returns an error if the file cannot be opened, its header
/// or sensor list is malformed, the known-bytes probe fails, a factored
/// file's sensor list is missing from the cache, or an LZ4 frame fails to
/// decode. Truncated or corrupt data records are not errors: all records
/// committed before the corruption are returned.
pub fn read_single(path: impl AsRef<Path>, options: &ReadOptions) -> crate::Result<FileRecordSet> {
    let path = path.as_ref();
    let mut decoder = FileDecoder::from_file(path)?;
    let mut sensors = decoder.read_sensors(options.cache_dir.as_deref())?;
    sensors.apply_keep(&name_set(&options.keep));
    sensors.apply_criteria(&name_set(&options.criteria));
    sensors.assign_output_indices();
    let header = decoder.header().clone();
    let mut records = decoder.decode(&sensors, options.repair)?;
    if options.skip_first_record {
        records.drop_first();
    }
    Ok(FileRecordSet {
        records,
        header,
        path: path.to_owned(),
    })
}

/// The accumulated state of merger pass 1: one roster per distinct
/// sensor-list CRC and the union of all their sensors.
#[derive(Default)]
struct SensorsMap {
    rosters: HashMap<String, SensorSet>,
    union: SensorUnion,
}

/// Scans one file's header and roster. Returns the file's sensor-list CRC,
/// or `None` when the file is unreadable, has no usable header, or is
/// filtered out by mission.
fn scan_file(
    path: &Path,
    options: &ReadOptions,
    skip_missions: &HashSet<String>,
    keep_missions: &HashSet<String>,
    map: &mut SensorsMap,
) -> crate::Result<Option<String>> {
    let mut decoder = match FileDecoder::from_file(path) {
        Ok(decoder) => decoder,
        Err(e @ (crate::Error::Io { .. } | crate::Error::Header(_))) => {
            debug!("skipping '{}': {e}", path.display());
            return Ok(None);
        }
        Err(e) => return Err(e),
    };
    if !decoder
        .header()
        .should_process_mission(skip_missions, keep_missions)
    {
        debug!("skipping '{}': mission filtered out", path.display());
        return Ok(None);
    }
    let crc = decoder.header().sensor_list_crc().to_owned();
    if !map.rosters.contains_key(&crc) {
        let sensors = decoder.read_sensors(options.cache_dir.as_deref())?;
        map.union.insert_roster(&sensors)?;
        map.rosters.insert(crc.clone(), sensors);
    }
    Ok(Some(crc))
}

/// Runs merger pass 1 over `paths` (already sorted): scans every header and
/// roster and builds the union. Returns the per-file `(path, crc)` list of
/// files that passed the scan.
fn scan_all(
    paths: &[PathBuf],
    options: &ReadOptions,
    map: &mut SensorsMap,
) -> crate::Result<Vec<(PathBuf, String)>> {
    let skip_missions = name_set(&options.skip_missions);
    let keep_missions = name_set(&options.keep_missions);
    let mut valid = Vec::new();
    for path in paths {
        if let Some(crc) = scan_file(path, options, &skip_missions, &keep_missions, map)? {
            valid.push((path.clone(), crc));
        }
    }
    Ok(valid)
}

fn sorted_paths<P: AsRef<Path>>(paths: &[P]) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = paths.iter().map(|p| p.as_ref().to_owned()).collect();
    paths.sort();
    paths
}

/// Reads several DBD files into one set of union-shaped columns.
///
/// Files are processed in lexicographic path order. Sensors are unified by
/// name across files; a sensor missing from some file yields fill values for
/// that file's rows. Files that cannot be opened, have no usable header, or
/// are filtered out by mission are skipped silently; all other per-file
/// errors abort the merge.
///
/// # Errors
/// This function returns an error if `paths` is empty, if a sensor's size
/// differs between files, on a sensor-cache miss, or on a decompression
/// failure or malformed sensor list in any scanned file.
pub fn read_many<P: AsRef<Path>>(
    paths: &[P],
    options: &ReadOptions,
) -> crate::Result<MultiRecordSet> {
    if paths.is_empty() {
        return Err(crate::Error::BadArgument {
            param_name: "paths".to_owned(),
            desc: "none provided".to_owned(),
        });
    }
    let paths = sorted_paths(paths);

    // pass 1: headers and rosters only
    let mut map = SensorsMap::default();
    let valid = scan_all(&paths, options, &mut map)?;

    let keep_names = name_set(&options.keep);
    let criteria_names = name_set(&options.criteria);
    map.union.apply_keep(&keep_names);
    map.union.apply_criteria(&criteria_names);
    let sensor_info = map.union.kept_info();
    let name_to_union = map.union.name_to_output();
    for roster in map.rosters.values_mut() {
        roster.apply_keep(&keep_names);
        roster.apply_criteria(&criteria_names);
        roster.assign_output_indices();
    }

    // pass 2: re-open and decode each file against its resolved roster
    let mut results: Vec<RecordSet> = Vec::new();
    for (path, crc) in &valid {
        let Some(roster) = map.rosters.get(crc) else {
            continue;
        };
        let mut decoder = match FileDecoder::from_file(path) {
            Ok(decoder) => decoder,
            Err(e @ (crate::Error::Io { .. } | crate::Error::Header(_))) => {
                debug!("skipping '{}' on re-open: {e}", path.display());
                continue;
            }
            Err(e) => return Err(e),
        };
        decoder.skip_sensor_lines()?;
        results.push(decoder.decode(roster, options.repair)?);
    }

    // The first file that contributes records keeps all of them; every
    // later contributing file drops its first record, which duplicates the
    // last record of the segment before it.
    let mut spans = Vec::with_capacity(results.len());
    let mut total = 0;
    let mut contributed = false;
    for result in &results {
        let (mut start, mut n) = (0, result.n_records);
        if options.skip_first_record && contributed && n > 0 {
            start = 1;
            n -= 1;
        }
        contributed |= result.n_records > 0;
        spans.push((start, n));
        total += n;
    }

    let mut columns = Vec::with_capacity(sensor_info.len());
    for info in &sensor_info {
        columns.push(TypedColumn::with_len(SensorKind::from_size(info.size)?, total));
    }
    let mut offset = 0;
    for (result, &(start, n)) in results.iter().zip(&spans) {
        if n == 0 {
            continue;
        }
        for (ci, info) in result.sensor_info.iter().enumerate() {
            if let Some(&ui) = name_to_union.get(&info.name) {
                columns[ui].copy_range_from(&result.columns[ci], start, offset, n);
            }
        }
        offset += n;
    }

    Ok(MultiRecordSet {
        records: RecordSet {
            columns,
            sensor_info,
            n_records: total,
        },
        n_files: valid.len(),
    })
}

/// Scans headers and sensor rosters without decoding any data, returning the
/// union column metadata the same file set would produce through
/// [`read_many`].
///
/// # Errors
/// This function returns an error under the same conditions as
/// [`read_many`]'s pass 1: a sensor-size mismatch between files, a
/// sensor-cache miss, a decompression failure, or a malformed sensor list.
pub fn scan_rosters<P: AsRef<Path>>(
    paths: &[P],
    options: &ReadOptions,
) -> crate::Result<RosterScan> {
    let paths = sorted_paths(paths);
    let mut map = SensorsMap::default();
    let valid = scan_all(&paths, options, &mut map)?;
    map.union.apply_keep(&name_set(&options.keep));
    Ok(RosterScan {
        sensor_info: map.union.kept_info(),
        n_files: valid.len(),
    })
}

/// Reads only the header of each file, applying the mission filters.
/// Unreadable files and files without a usable header are omitted.
pub fn scan_headers<P: AsRef<Path>>(paths: &[P], options: &ReadOptions) -> Vec<HeaderScan> {
    let skip_missions = name_set(&options.skip_missions);
    let keep_missions = name_set(&options.keep_missions);
    let mut scans = Vec::new();
    for path in sorted_paths(paths) {
        let decoder = match FileDecoder::from_file(&path) {
            Ok(decoder) => decoder,
            Err(e) => {
                debug!("skipping '{}': {e}", path.display());
                continue;
            }
        };
        let header = decoder.header();
        if !header.should_process_mission(&skip_missions, &keep_missions) {
            continue;
        }
        scans.push(HeaderScan {
            path,
            mission_name: header.mission_name().to_owned(),
            sensor_list_crc: header.sensor_list_crc().to_owned(),
            fileopen_time: header.fileopen_time().to_owned(),
        });
    }
    scans
}
