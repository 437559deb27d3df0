//! Row keys, cell values and their Arrow mapping.
//!
//! Both reader formats hand rows to the scan layer as `(RowKey, Row)` pairs.
//! The row descriptor is always an Arrow schema so legacy and compact readers
//! describe their columns the same way.

use std::{fmt, sync::Arc};

use arrow::{
    array::{Array, ArrayRef, AsArray},
    datatypes::{DataType, Float64Type, Int32Type, Int64Type, SchemaRef},
};
use crc32fast::Hasher;

use crate::reader::ReaderError;

/// Byte-ordered primary key of a row.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RowKey(Vec<u8>);

impl RowKey {
    /// Wrap raw key bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Borrow the raw key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Length of the key in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the key has no bytes.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Consume the key and return its bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl From<&str> for RowKey {
    fn from(value: &str) -> Self {
        Self(value.as_bytes().to_vec())
    }
}

impl From<&[u8]> for RowKey {
    fn from(value: &[u8]) -> Self {
        Self(value.to_vec())
    }
}

impl From<Vec<u8>> for RowKey {
    fn from(value: Vec<u8>) -> Self {
        Self(value)
    }
}

impl fmt::Debug for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(text) => f.debug_tuple("RowKey").field(&text).finish(),
            Err(_) => f.debug_tuple("RowKey").field(&self.0).finish(),
        }
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(text) => write!(f, "{text:?}"),
            Err(_) => {
                f.write_str("0x")?;
                for byte in &self.0 {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
        }
    }
}

/// A single cell value.
#[derive(Clone, Debug, PartialEq)]
pub enum Datum {
    /// Missing value.
    Null,
    /// Boolean value.
    Boolean(bool),
    /// Signed integer value; 32-bit Arrow columns widen into it.
    Int64(i64),
    /// Floating point value.
    Float64(f64),
    /// UTF-8 string value.
    Utf8(String),
    /// Opaque bytes.
    Binary(Vec<u8>),
}

impl Datum {
    /// Approximate on-disk footprint in bytes.
    pub fn occupy_size(&self) -> usize {
        1 + match self {
            Datum::Null => 0,
            Datum::Boolean(_) => 1,
            Datum::Int64(_) | Datum::Float64(_) => 8,
            Datum::Utf8(value) => value.len(),
            Datum::Binary(value) => value.len(),
        }
    }

    fn checksum_into(&self, hasher: &mut Hasher) {
        match self {
            Datum::Null => hasher.update(&[0]),
            Datum::Boolean(value) => hasher.update(&[1, *value as u8]),
            Datum::Int64(value) => {
                hasher.update(&[2]);
                hasher.update(&value.to_be_bytes());
            }
            Datum::Float64(value) => {
                hasher.update(&[3]);
                hasher.update(&value.to_bits().to_be_bytes());
            }
            Datum::Utf8(value) => {
                hasher.update(&[4]);
                hasher.update(value.as_bytes());
            }
            Datum::Binary(value) => {
                hasher.update(&[5]);
                hasher.update(value);
            }
        }
    }
}

/// An ordered list of cells described by a row descriptor.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Row {
    cells: Vec<Datum>,
}

impl Row {
    /// Build a row from its cells.
    pub fn new(cells: Vec<Datum>) -> Self {
        Self { cells }
    }

    /// Borrow all cells.
    pub fn cells(&self) -> &[Datum] {
        &self.cells
    }

    /// Cell at column `index`.
    pub fn get(&self, index: usize) -> Option<&Datum> {
        self.cells.get(index)
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether the row has no cells.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Keep only the cells named by `projection`, in projection order.
    pub fn project(&self, projection: &[usize]) -> Row {
        Row {
            cells: projection
                .iter()
                .filter_map(|index| self.cells.get(*index).cloned())
                .collect(),
        }
    }

    pub(crate) fn occupy_size(&self) -> usize {
        self.cells.iter().map(Datum::occupy_size).sum()
    }
}

impl From<Vec<Datum>> for Row {
    fn from(cells: Vec<Datum>) -> Self {
        Row::new(cells)
    }
}

/// Order-sensitive checksum over one `(key, row)` pair.
pub(crate) fn row_checksum(key: &RowKey, row: &Row) -> u64 {
    let mut hasher = Hasher::new();
    hasher.update(key.as_bytes());
    for cell in row.cells() {
        cell.checksum_into(&mut hasher);
    }
    hasher.finalize() as u64
}

/// Column types both reader formats can carry.
pub(crate) fn is_supported_type(data_type: &DataType) -> bool {
    matches!(
        data_type,
        DataType::Boolean
            | DataType::Int32
            | DataType::Int64
            | DataType::Float64
            | DataType::Utf8
            | DataType::Binary
    )
}

/// Reject schemas with columns the row mapping cannot represent.
pub(crate) fn check_schema(schema: &SchemaRef) -> Result<(), ReaderError> {
    match schema
        .fields()
        .iter()
        .find(|field| !is_supported_type(field.data_type()))
    {
        Some(field) => Err(ReaderError::UnsupportedType {
            column: field.name().clone(),
            data_type: field.data_type().clone(),
        }),
        None => Ok(()),
    }
}

/// Read the cell at `index` of an Arrow column.
pub(crate) fn datum_at(column: &ArrayRef, index: usize) -> Result<Datum, ReaderError> {
    if column.is_null(index) {
        return Ok(Datum::Null);
    }
    let datum = match column.data_type() {
        DataType::Boolean => Datum::Boolean(column.as_boolean().value(index)),
        DataType::Int32 => Datum::Int64(column.as_primitive::<Int32Type>().value(index) as i64),
        DataType::Int64 => Datum::Int64(column.as_primitive::<Int64Type>().value(index)),
        DataType::Float64 => Datum::Float64(column.as_primitive::<Float64Type>().value(index)),
        DataType::Utf8 => Datum::Utf8(column.as_string::<i32>().value(index).to_string()),
        DataType::Binary => Datum::Binary(column.as_binary::<i32>().value(index).to_vec()),
        other => {
            return Err(ReaderError::UnsupportedType {
                column: String::new(),
                data_type: other.clone(),
            })
        }
    };
    Ok(datum)
}

/// Read the key bytes at `index` of a `Utf8` or `Binary` key column.
pub(crate) fn key_at(column: &ArrayRef, index: usize) -> Option<&[u8]> {
    if column.is_null(index) {
        return None;
    }
    match column.data_type() {
        DataType::Utf8 => Some(column.as_string::<i32>().value(index).as_bytes()),
        DataType::Binary => Some(column.as_binary::<i32>().value(index)),
        _ => None,
    }
}

/// Shared handle to a row descriptor.
pub type RowDesc = SchemaRef;

pub(crate) fn project_desc(
    desc: &RowDesc,
    projection: Option<&[usize]>,
) -> Result<RowDesc, ReaderError> {
    match projection {
        None => Ok(desc.clone()),
        Some(indices) => Ok(Arc::new(desc.project(indices)?)),
    }
}
