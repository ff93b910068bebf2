//! Typed output columns, their fill sentinels, and decoded result sets.
use crate::sensor::SensorKind;

/// Fill sentinel written to 1-byte integer columns for absent values.
pub const FILL_INT8: i8 = -127;
/// Fill sentinel written to 2-byte integer columns for absent values.
pub const FILL_INT16: i16 = -32768;

/// A single decoded sensor value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CellValue {
    /// A 1-byte integer value.
    Int8(i8),
    /// A 2-byte integer value.
    Int16(i16),
    /// A 4-byte float value.
    Float32(f32),
    /// An 8-byte float value.
    Float64(f64),
}

/// A column of decoded values for one sensor. The variant is determined by the
/// sensor's size: 1-byte sensors decode to [`TypedColumn::Int8`], 2-byte to
/// [`TypedColumn::Int16`], 4-byte to [`TypedColumn::Float32`], and 8-byte to
/// [`TypedColumn::Float64`].
#[derive(Clone, Debug, PartialEq)]
pub enum TypedColumn {
    /// A column of 1-byte integers with fill [`FILL_INT8`].
    Int8(Vec<i8>),
    /// A column of 2-byte integers with fill [`FILL_INT16`].
    Int16(Vec<i16>),
    /// A column of 4-byte floats with fill NaN.
    Float32(Vec<f32>),
    /// A column of 8-byte floats with fill NaN.
    Float64(Vec<f64>),
}

impl TypedColumn {
    /// Creates a column of `len` fill values for a sensor of the given kind.
    pub fn with_len(kind: SensorKind, len: usize) -> Self {
        match kind {
            SensorKind::Int8 => Self::Int8(vec![FILL_INT8; len]),
            SensorKind::Int16 => Self::Int16(vec![FILL_INT16; len]),
            SensorKind::Float32 => Self::Float32(vec![f32::NAN; len]),
            SensorKind::Float64 => Self::Float64(vec![f64::NAN; len]),
        }
    }

    /// Returns the fill sentinel for columns of the given kind.
    pub fn fill_value(kind: SensorKind) -> CellValue {
        match kind {
            SensorKind::Int8 => CellValue::Int8(FILL_INT8),
            SensorKind::Int16 => CellValue::Int16(FILL_INT16),
            SensorKind::Float32 => CellValue::Float32(f32::NAN),
            SensorKind::Float64 => CellValue::Float64(f64::NAN),
        }
    }

    /// Returns the kind of sensor this column stores values for.
    pub fn kind(&self) -> SensorKind {
        match self {
            Self::Int8(_) => SensorKind::Int8,
            Self::Int16(_) => SensorKind::Int16,
            Self::Float32(_) => SensorKind::Float32,
            Self::Float64(_) => SensorKind::Float64,
        }
    }

    /// Returns the number of rows in the column.
    pub fn len(&self) -> usize {
        match self {
            Self::Int8(v) => v.len(),
            Self::Int16(v) => v.len(),
            Self::Float32(v) => v.len(),
            Self::Float64(v) => v.len(),
        }
    }

    /// Returns `true` if the column has no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the rows as a slice of `i8` if this is an [`TypedColumn::Int8`]
    /// column.
    pub fn as_i8(&self) -> Option<&[i8]> {
        match self {
            Self::Int8(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the rows as a slice of `i16` if this is an
    /// [`TypedColumn::Int16`] column.
    pub fn as_i16(&self) -> Option<&[i16]> {
        match self {
            Self::Int16(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the rows as a slice of `f32` if this is a
    /// [`TypedColumn::Float32`] column.
    pub fn as_f32(&self) -> Option<&[f32]> {
        match self {
            Self::Float32(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the rows as a slice of `f64` if this is a
    /// [`TypedColumn::Float64`] column.
    pub fn as_f64(&self) -> Option<&[f64]> {
        match self {
            Self::Float64(v) => Some(v),
            _ => None,
        }
    }

    /// Grows the column by doubling until `row` is in bounds, filling new
    /// cells with the fill sentinel.
    pub(crate) fn grow_to(&mut self, row: usize) {
        fn grown_len(len: usize, row: usize) -> usize {
            let mut new_len = len.max(1);
            while new_len <= row {
                new_len *= 2;
            }
            new_len
        }
        match self {
            Self::Int8(v) => {
                let n = grown_len(v.len(), row);
                v.resize(n, FILL_INT8);
            }
            Self::Int16(v) => {
                let n = grown_len(v.len(), row);
                v.resize(n, FILL_INT16);
            }
            Self::Float32(v) => {
                let n = grown_len(v.len(), row);
                v.resize(n, f32::NAN);
            }
            Self::Float64(v) => {
                let n = grown_len(v.len(), row);
                v.resize(n, f64::NAN);
            }
        }
    }

    /// Writes `value` at `row`. The caller must have grown the column so that
    /// `row` is in bounds and must pass a value of the column's own kind.
    pub(crate) fn set(&mut self, row: usize, value: CellValue) {
        match (self, value) {
            (Self::Int8(v), CellValue::Int8(x)) => v[row] = x,
            (Self::Int16(v), CellValue::Int16(x)) => v[row] = x,
            (Self::Float32(v), CellValue::Float32(x)) => v[row] = x,
            (Self::Float64(v), CellValue::Float64(x)) => v[row] = x,
            _ => unreachable!("column and value kinds always match by construction"),
        }
    }

    /// Shortens the column to `len` rows.
    pub(crate) fn truncate(&mut self, len: usize) {
        match self {
            Self::Int8(v) => v.truncate(len),
            Self::Int16(v) => v.truncate(len),
            Self::Float32(v) => v.truncate(len),
            Self::Float64(v) => v.truncate(len),
        }
    }

    /// Removes the first `n` rows.
    pub(crate) fn drop_front(&mut self, n: usize) {
        match self {
            Self::Int8(v) => drop(v.drain(..n)),
            Self::Int16(v) => drop(v.drain(..n)),
            Self::Float32(v) => drop(v.drain(..n)),
            Self::Float64(v) => drop(v.drain(..n)),
        }
    }

    /// Copies `n` rows from `src` starting at `src_start` into this column
    /// starting at `dst_start`. Both columns must be of the same kind.
    pub(crate) fn copy_range_from(
        &mut self,
        src: &TypedColumn,
        src_start: usize,
        dst_start: usize,
        n: usize,
    ) {
        match (self, src) {
            (Self::Int8(dst), Self::Int8(src)) => {
                dst[dst_start..dst_start + n].copy_from_slice(&src[src_start..src_start + n]);
            }
            (Self::Int16(dst), Self::Int16(src)) => {
                dst[dst_start..dst_start + n].copy_from_slice(&src[src_start..src_start + n]);
            }
            (Self::Float32(dst), Self::Float32(src)) => {
                dst[dst_start..dst_start + n].copy_from_slice(&src[src_start..src_start + n]);
            }
            (Self::Float64(dst), Self::Float64(src)) => {
                dst[dst_start..dst_start + n].copy_from_slice(&src[src_start..src_start + n]);
            }
            _ => unreachable!("union columns share the source column's kind by construction"),
        }
    }
}

/// Metadata describing one output column.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SensorInfo {
    /// The sensor name.
    pub name: String,
    /// The sensor units, as recorded in the sensor list.
    pub units: String,
    /// The encoded value width in bytes: 1, 2, 4, or 8.
    pub size: u8,
}

/// The column-oriented result of decoding one or more DBD files.
///
/// All columns have `n_records` rows and `sensor_info[i]` describes
/// `columns[i]`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RecordSet {
    /// One typed column per kept sensor.
    pub columns: Vec<TypedColumn>,
    /// Metadata for each column, in column order.
    pub sensor_info: Vec<SensorInfo>,
    /// The number of committed records.
    pub n_records: usize,
}

impl RecordSet {
    /// Removes the first committed record from every column.
    pub(crate) fn drop_first(&mut self) {
        if self.n_records == 0 {
            return;
        }
        for column in &mut self.columns {
            column.drop_front(1);
        }
        self.n_records -= 1;
    }

    /// Returns the column for the sensor named `name`, if present.
    pub fn column(&self, name: &str) -> Option<&TypedColumn> {
        self.sensor_info
            .iter()
            .position(|info| info.name == name)
            .map(|i| &self.columns[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_len_prefills_sentinels() {
        let col = TypedColumn::with_len(SensorKind::Int16, 4);
        assert_eq!(col.as_i16().unwrap(), &[FILL_INT16; 4]);
        let col = TypedColumn::with_len(SensorKind::Float64, 3);
        assert!(col.as_f64().unwrap().iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_grow_to_doubles_and_fills() {
        let mut col = TypedColumn::with_len(SensorKind::Int8, 2);
        col.grow_to(2);
        assert_eq!(col.len(), 4);
        col.grow_to(9);
        assert_eq!(col.len(), 16);
        assert!(col.as_i8().unwrap().iter().all(|&v| v == FILL_INT8));
    }

    #[test]
    fn test_copy_range_from() {
        let mut dst = TypedColumn::with_len(SensorKind::Float32, 5);
        let src = TypedColumn::Float32(vec![1.0, 2.0, 3.0]);
        dst.copy_range_from(&src, 1, 2, 2);
        let rows = dst.as_f32().unwrap();
        assert!(rows[0].is_nan() && rows[1].is_nan() && rows[4].is_nan());
        assert_eq!(&rows[2..4], &[2.0, 3.0]);
    }

    #[test]
    fn test_drop_first() {
        let mut set = RecordSet {
            columns: vec![TypedColumn::Int8(vec![1, 2, 3])],
            sensor_info: vec![SensorInfo {
                name: "c_wpt".to_owned(),
                units: "enum".to_owned(),
                size: 1,
            }],
            n_records: 3,
        };
        set.drop_first();
        assert_eq!(set.n_records, 2);
        assert_eq!(set.columns[0].as_i8().unwrap(), &[2, 3]);
    }
}
