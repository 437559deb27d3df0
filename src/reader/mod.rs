//! Storage-format readers consumed by tablets.
//!
//! A tablet only knows reader *identities*. Handles are opened through a
//! [`ReaderProvider`] the first time the tablet needs them and come back as a
//! [`StorageReader`], a closed variant over the two on-disk generations.

mod compact;
mod legacy;
mod mem;
#[cfg(feature = "parquet")]
mod parquet;

use std::{fmt, io, sync::Arc};

use arrow::{datatypes::DataType, error::ArrowError};
use thiserror::Error;

pub use self::{
    compact::{CompactReader, CompactScanner},
    legacy::{LegacyReader, LegacyScanner},
    mem::MemReaderProvider,
};
#[cfg(feature = "parquet")]
pub use self::parquet::ParquetReaderProvider;
use crate::{
    range::KeyRange,
    row::{Row, RowDesc, RowKey},
};

/// First storage format version written in the compact columnar layout.
pub const COMPACT_FORMAT_VERSION: i16 = 2;

/// Identity of an on-disk reader.
///
/// The low 8 bits carry the disk number, the rest is the file sequence.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReaderId(u64);

impl ReaderId {
    /// Compose an identity from a file sequence and a disk number.
    pub const fn new(seq: u64, disk_no: u8) -> Self {
        Self((seq << 8) | disk_no as u64)
    }

    /// Wrap a raw persisted identity.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw persisted identity.
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// File sequence number.
    pub const fn seq(self) -> u64 {
        self.0 >> 8
    }

    /// Disk the file lives on.
    pub const fn disk_no(self) -> u8 {
        (self.0 & 0xff) as u8
    }
}

impl fmt::Debug for ReaderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReaderId")
            .field("seq", &self.seq())
            .field("disk_no", &self.disk_no())
            .finish()
    }
}

impl fmt::Display for ReaderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.seq(), self.disk_no())
    }
}

/// On-disk layout generation of a reader.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormatKind {
    /// Row-oriented layout.
    Legacy,
    /// Columnar layout.
    Compact,
}

impl fmt::Display for FormatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatKind::Legacy => f.write_str("legacy"),
            FormatKind::Compact => f.write_str("compact"),
        }
    }
}

/// Shared handle to an opened reader of either format.
#[derive(Clone, Debug)]
pub enum StorageReader {
    /// Row-oriented reader.
    Legacy(Arc<LegacyReader>),
    /// Columnar reader.
    Compact(Arc<CompactReader>),
}

impl StorageReader {
    /// Identity the reader was opened from.
    pub fn id(&self) -> ReaderId {
        match self {
            StorageReader::Legacy(reader) => reader.id(),
            StorageReader::Compact(reader) => reader.id(),
        }
    }

    /// Layout generation of the reader.
    pub fn kind(&self) -> FormatKind {
        match self {
            StorageReader::Legacy(_) => FormatKind::Legacy,
            StorageReader::Compact(_) => FormatKind::Compact,
        }
    }

    /// Number of rows stored.
    pub fn row_count(&self) -> u64 {
        match self {
            StorageReader::Legacy(reader) => reader.row_count(),
            StorageReader::Compact(reader) => reader.row_count(),
        }
    }

    /// Bytes occupied by the stored rows.
    pub fn occupy_size(&self) -> u64 {
        match self {
            StorageReader::Legacy(reader) => reader.occupy_size(),
            StorageReader::Compact(reader) => reader.occupy_size(),
        }
    }

    /// Checksum over the stored rows.
    pub fn checksum(&self) -> u64 {
        match self {
            StorageReader::Legacy(reader) => reader.checksum(),
            StorageReader::Compact(reader) => reader.checksum(),
        }
    }

    /// Descriptor of the stored rows.
    pub fn row_desc(&self) -> &RowDesc {
        match self {
            StorageReader::Legacy(reader) => reader.row_desc(),
            StorageReader::Compact(reader) => reader.row_desc(),
        }
    }

    /// Point lookup.
    pub fn get(&self, key: &RowKey) -> Result<Option<Row>, ReaderError> {
        match self {
            StorageReader::Legacy(reader) => Ok(reader.get(key)),
            StorageReader::Compact(reader) => reader.get(key),
        }
    }

    /// Legacy handle, if this is a legacy reader.
    pub fn as_legacy(&self) -> Option<&Arc<LegacyReader>> {
        match self {
            StorageReader::Legacy(reader) => Some(reader),
            StorageReader::Compact(_) => None,
        }
    }

    /// Compact handle, if this is a compact reader.
    pub fn as_compact(&self) -> Option<&Arc<CompactReader>> {
        match self {
            StorageReader::Legacy(_) => None,
            StorageReader::Compact(reader) => Some(reader),
        }
    }

    /// Whether both handles point at the same opened reader.
    pub fn same_handle(&self, other: &StorageReader) -> bool {
        match (self, other) {
            (StorageReader::Legacy(a), StorageReader::Legacy(b)) => Arc::ptr_eq(a, b),
            (StorageReader::Compact(a), StorageReader::Compact(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<LegacyReader> for StorageReader {
    fn from(reader: LegacyReader) -> Self {
        StorageReader::Legacy(Arc::new(reader))
    }
}

impl From<CompactReader> for StorageReader {
    fn from(reader: CompactReader) -> Self {
        StorageReader::Compact(Arc::new(reader))
    }
}

/// Opens readers by identity.
pub trait ReaderProvider: Send + Sync {
    /// Open the reader stored under `id`.
    fn open(&self, id: &ReaderId) -> Result<StorageReader, ReaderError>;
}

/// Pull-based row iteration shared by both scanner formats.
pub trait RowIterator {
    /// Next row in key order, `None` once the range is exhausted.
    fn next_row(&mut self) -> Result<Option<(RowKey, Row)>, ReaderError>;

    /// Descriptor of the rows produced, after projection.
    fn row_desc(&self) -> &RowDesc;
}

/// Scan bounds and projection handed to a reader.
#[derive(Clone, Debug)]
pub struct ScanSpec {
    /// Keys to visit.
    pub range: KeyRange<RowKey>,
    /// Column indices to keep, all columns when `None`.
    pub projection: Option<Arc<[usize]>>,
}

impl ScanSpec {
    /// Visit `range` with every column.
    pub fn new(range: KeyRange<RowKey>) -> Self {
        Self {
            range,
            projection: None,
        }
    }

    /// Keep only `projection` columns.
    pub fn with_projection(mut self, projection: impl Into<Arc<[usize]>>) -> Self {
        self.projection = Some(projection.into());
        self
    }
}

/// Errors raised while opening or reading a storage-format reader.
#[derive(Debug, Error)]
pub enum ReaderError {
    /// No reader is stored under the identity.
    #[error("reader {0} not found")]
    NotFound(ReaderId),
    /// The reader holds data the row mapping cannot represent.
    #[error("column `{column}` has unsupported type {data_type}")]
    UnsupportedType {
        /// Offending column.
        column: String,
        /// Its Arrow type.
        data_type: DataType,
    },
    /// Stored rows violate the reader's own invariants.
    #[error("reader {id} corrupted: {reason}")]
    Corrupted {
        /// Reader identity.
        id: ReaderId,
        /// What was violated.
        reason: String,
    },
    /// Arrow failed to build or project data.
    #[error("reader arrow error: {0}")]
    Arrow(#[from] ArrowError),
    /// Parquet container could not be decoded.
    #[cfg(feature = "parquet")]
    #[error("reader parquet error: {0}")]
    Parquet(#[from] ::parquet::errors::ParquetError),
    /// Underlying file access failed.
    #[error("reader io error: {0}")]
    Io(#[from] io::Error),
}
