#![deny(missing_docs)]
//! Shard-level storage core: range tablets over two storage formats and the
//! scan dispatcher in front of them.
//!
//! A [`Tablet`] owns the reader identities of one key range at one
//! multi-version generation and opens them lazily, exactly once, through a
//! [`ReaderProvider`]. A [`TabletScan`] acquires the tablet serving a range and
//! snapshot from a [`TabletDirectory`], picks the legacy or compact scanner by
//! the tablet's storage format version and hands rows to the caller.
//!
//! ```
//! use std::sync::Arc;
//!
//! use tablet_store::{
//!     MemReaderProvider, ScanContext, ScanParam, Tablet, TabletImage, TabletOption,
//!     TabletRange, TabletScan, VersionRange,
//! };
//!
//! let image = Arc::new(TabletImage::new());
//! image
//!     .add_tablet(Tablet::new(
//!         TabletRange::whole_table(1),
//!         1,
//!         Arc::new(MemReaderProvider::new()),
//!         Arc::new(TabletOption::default()),
//!     ))
//!     .unwrap();
//!
//! let mut scan = TabletScan::new();
//! let param = ScanParam::new(TabletRange::whole_table(1), VersionRange::latest());
//! // the tablet has no readers registered, so binding a scanner fails
//! assert!(scan.open_with_context(param, &ScanContext::new(image)).is_err());
//! ```

mod observability;

#[cfg(test)]
mod test_util;

/// Persisted record codec.
pub mod serdes;

/// Tunables shared by tablets.
pub mod option;

/// Row keys, cells and row descriptors.
pub mod row;

/// Key ranges and tablet boundaries.
pub mod range;

/// Snapshot version ranges.
pub mod mvcc;

/// Legacy and compact storage-format readers.
pub mod reader;

/// The range shard and its lazily opened readers.
pub mod tablet;

/// Multi-version tablet directory.
pub mod directory;

/// Scan dispatcher.
pub mod scan;

pub use crate::{
    directory::{DirectoryError, ScanDirection, TabletDirectory, TabletHandle, TabletImage},
    mvcc::VersionRange,
    option::TabletOption,
    range::{BorderFlag, KeyRange, TabletRange},
    reader::{
        CompactReader, FormatKind, LegacyReader, MemReaderProvider, ReaderError, ReaderId,
        ReaderProvider, RowIterator, ScanSpec, StorageReader, COMPACT_FORMAT_VERSION,
    },
    row::{Datum, Row, RowDesc, RowKey},
    scan::{ScanContext, ScanError, ScanParam, ScanState, TabletScan},
    tablet::{
        CompactCacheNode, ExtendInfo, FrozenVersionRange, RangeInfo, ReaderSelector, Tablet,
        TabletError,
    },
};

#[cfg(feature = "parquet")]
pub use crate::reader::ParquetReaderProvider;
