//! The record-stream decoder: header-bit codes, repeat/new-value semantics,
//! criteria-gated row commits, and corruption tolerance.
use std::io::{self, Read};

use log::{debug, warn};

use super::known_bytes::KnownBytes;
use crate::column::{CellValue, RecordSet, TypedColumn};
use crate::error::silence_eof_error;
use crate::sensor::{SensorKind, SensorSet};

const TAG_DATA: u8 = b'd';
const TAG_END: u8 = b'X';
/// Columns never start smaller than this many rows.
const MIN_CAPACITY: usize = 256;

/// How a failed read inside the record loop is handled.
enum ReadFailure {
    /// Corruption of the compressed container itself; always surfaced.
    Surface(crate::Error),
    /// Truncation or transient I/O trouble; the partially-read record is
    /// discarded and every committed record retained.
    Stop,
}

fn classify(err: io::Error, context: &str) -> ReadFailure {
    match silence_eof_error::<()>(err) {
        Ok(_) => {
            debug!("stream ended while {context}");
            ReadFailure::Stop
        }
        Err(e) if e.kind() == io::ErrorKind::InvalidData => {
            ReadFailure::Surface(crate::Error::decompression(e.to_string()))
        }
        Err(e) => {
            warn!("read error while {context}: {e}");
            ReadFailure::Stop
        }
    }
}

/// Decodes data records from `reader` until the end tag, end of stream, or an
/// unrecoverable stray byte, materializing one typed column per kept sensor.
///
/// `bytes_hint` is an estimate of the remaining stream length used only to
/// size the initial column allocation.
pub(crate) fn read_columns<R: Read>(
    reader: &mut R,
    kb: &KnownBytes,
    sensors: &SensorSet,
    repair: bool,
    bytes_hint: u64,
) -> crate::Result<RecordSet> {
    let header_len = sensors.header_bit_bytes();
    let mut bits = vec![0u8; header_len];

    // Kept sensors carry dense output indices in roster order, so collecting
    // them in roster order yields the column metadata in column order.
    let sensor_info: Vec<_> = sensors
        .iter()
        .filter(|s| s.keep)
        .map(|s| s.info())
        .collect();
    let kinds: Vec<SensorKind> = sensors
        .iter()
        .filter(|s| s.keep)
        .map(|s| s.kind)
        .collect();
    let out_index: Vec<Option<usize>> = sensors.iter().map(|s| s.output_index).collect();

    let init_capacity = MIN_CAPACITY.max(2 * bytes_hint as usize / (header_len + 1) + 1);
    let mut columns: Vec<TypedColumn> = kinds
        .iter()
        .map(|&kind| TypedColumn::with_len(kind, init_capacity))
        .collect();
    let mut prev: Vec<CellValue> = kinds.iter().map(|&k| TypedColumn::fill_value(k)).collect();
    // One record's writes, applied only if the record commits: a dropped row
    // must leave both the columns and the previous-value state untouched.
    let mut row_writes: Vec<(usize, CellValue, bool)> = Vec::with_capacity(columns.len());
    let mut n_rows = 0usize;
    let mut warned_reserved = false;

    'records: loop {
        let mut tag = [0u8; 1];
        match reader.read_exact(&mut tag) {
            Ok(()) => {}
            Err(e) => match classify(e, "reading record tag") {
                ReadFailure::Surface(err) => return Err(err),
                ReadFailure::Stop => break,
            },
        }
        if tag[0] == TAG_END {
            break;
        }
        if tag[0] != TAG_DATA {
            if !repair {
                debug!(
                    "stray byte {:#04x} at record {n_rows}; stopping with committed records",
                    tag[0]
                );
                break;
            }
            // Scan strictly for the next 'd'. An 'X' seen here is ordinary
            // data at an unaligned offset, not the end tag.
            loop {
                match reader.read_exact(&mut tag) {
                    Ok(()) => {}
                    Err(e) => match classify(e, "scanning for the next record tag") {
                        ReadFailure::Surface(err) => return Err(err),
                        ReadFailure::Stop => break 'records,
                    },
                }
                if tag[0] == TAG_DATA {
                    break;
                }
            }
        }

        match reader.read_exact(&mut bits) {
            Ok(()) => {}
            Err(e) => match classify(e, "reading record header bits") {
                ReadFailure::Surface(err) => return Err(err),
                ReadFailure::Stop => break,
            },
        }

        row_writes.clear();
        let mut hit_criteria = false;
        for (i, sensor) in sensors.iter().enumerate() {
            let code = (bits[i >> 2] >> (6 - ((i & 0x3) << 1))) & 0x03;
            match code {
                0 => {}
                3 => {
                    // reserved; the format doesn't define it, treat as absent
                    if !warned_reserved {
                        warn!(
                            "reserved header-bit code 3 for sensor {}; treating as absent",
                            sensor.name
                        );
                        warned_reserved = true;
                    }
                }
                1 => {
                    hit_criteria |= sensor.criteria;
                    if let Some(oi) = out_index[i] {
                        row_writes.push((oi, prev[oi], false));
                    }
                }
                2 => {
                    hit_criteria |= sensor.criteria;
                    // The value occupies the stream whether or not the sensor
                    // is kept; it must be consumed either way.
                    let value = match read_value(reader, kb, sensor.kind) {
                        Ok(value) => value,
                        Err(e) => match classify(e, "reading a sensor value") {
                            ReadFailure::Surface(err) => return Err(err),
                            ReadFailure::Stop => break 'records,
                        },
                    };
                    if let Some(oi) = out_index[i] {
                        row_writes.push((oi, value, true));
                    }
                }
                _ => unreachable!("two-bit code"),
            }
        }

        if hit_criteria {
            for &(oi, value, is_new) in &row_writes {
                let column = &mut columns[oi];
                column.grow_to(n_rows);
                column.set(n_rows, value);
                if is_new {
                    prev[oi] = value;
                }
            }
            n_rows += 1;
        }
    }

    for column in &mut columns {
        column.truncate(n_rows);
    }
    Ok(RecordSet {
        columns,
        sensor_info,
        n_records: n_rows,
    })
}

fn read_value<R: Read>(
    reader: &mut R,
    kb: &KnownBytes,
    kind: SensorKind,
) -> io::Result<CellValue> {
    Ok(match kind {
        SensorKind::Int8 => CellValue::Int8(kb.read8(reader)?),
        SensorKind::Int16 => CellValue::Int16(kb.read16(reader)?),
        SensorKind::Float32 => CellValue::Float32(kb.read32(reader)?),
        SensorKind::Float64 => CellValue::Float64(kb.read64(reader)?),
    })
}
