//! Scan dispatcher: binds one tablet and one format-specific row scanner.
//!
//! A [`TabletScan`] acquires the tablet serving the requested range and
//! version, reads the tablet's storage format version and binds the legacy or
//! compact scanner accordingly. Callers then pull rows until `Ok(None)` and
//! close the scan, which hands the tablet back to the directory.

mod scanner;

use std::{fmt, sync::Arc};

use thiserror::Error;

use self::scanner::RowScanner;
use crate::{
    directory::{DirectoryError, ScanDirection, TabletDirectory, TabletHandle},
    mvcc::VersionRange,
    observability::{log_debug, log_info},
    range::TabletRange,
    reader::{ReaderError, RowIterator, ScanSpec, StorageReader},
    row::{Row, RowDesc, RowKey},
    tablet::{ReaderSelector, TabletError},
};

/// Readers a scan accepts from one tablet.
const SCAN_READER_CAPACITY: usize = 1;

/// What to scan.
#[derive(Clone, Debug)]
pub struct ScanParam {
    /// Table and key range to visit.
    pub range: TabletRange,
    /// Snapshot the scan reads.
    pub version_range: VersionRange,
    /// Column indices to keep, all columns when `None`.
    pub projection: Option<Arc<[usize]>>,
}

impl ScanParam {
    /// Scan `range` at `version_range` with every column.
    pub fn new(range: TabletRange, version_range: VersionRange) -> Self {
        Self {
            range,
            version_range,
            projection: None,
        }
    }

    /// Keep only `projection` columns.
    pub fn with_projection(mut self, projection: impl Into<Arc<[usize]>>) -> Self {
        self.projection = Some(projection.into());
        self
    }
}

/// Collaborators a scan runs against.
#[derive(Clone)]
pub struct ScanContext {
    /// Directory tablets are acquired from and released to.
    pub directory: Arc<dyn TabletDirectory>,
}

impl ScanContext {
    /// Context acquiring from `directory`.
    pub fn new(directory: Arc<dyn TabletDirectory>) -> Self {
        Self { directory }
    }
}

impl fmt::Debug for ScanContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanContext").finish_non_exhaustive()
    }
}

/// Lifecycle of a [`TabletScan`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanState {
    /// Not opened yet.
    Unopened,
    /// A tablet and a scanner are bound.
    ScannerBound,
    /// Closed; the tablet has been released.
    Closed,
}

/// Errors for `TabletScan`
#[derive(Debug, Error)]
pub enum ScanError {
    /// The scan parameters are malformed.
    #[error("invalid scan argument: {0}")]
    InvalidArgument(String),
    /// The directory produced no tablet.
    #[error("acquire of {range} at version {query_version} failed: {source}")]
    Acquire {
        /// Requested range.
        range: TabletRange,
        /// Requested version.
        query_version: i64,
        /// Directory failure.
        #[source]
        source: DirectoryError,
    },
    /// The tablet found is removed; a newer generation serves the range.
    #[error("tablet {range} version {data_version} is removed")]
    TabletNotFound {
        /// Range of the removed tablet.
        range: TabletRange,
        /// Its generation.
        data_version: i64,
    },
    /// Opening the tablet's readers failed; the scan may be retried.
    #[error("scan load error: {0}")]
    Load(#[source] TabletError),
    /// The tablet holds more readers than a scan accepts.
    #[error("scan size overflow: {0}")]
    SizeOverflow(#[source] TabletError),
    /// The call does not fit the scan's state.
    #[error("scan invalid state: {0}")]
    InvalidState(String),
    /// Reader count or format does not match the tablet's format version.
    #[error("scan setup of tablet {range} version {data_version} failed: {reason}")]
    ScanSetup {
        /// Range of the tablet.
        range: TabletRange,
        /// Its generation.
        data_version: i64,
        /// What did not match.
        reason: String,
    },
    /// The scan was not opened.
    #[error("scan not initialized")]
    NotInitialized,
    /// Handing the tablet back failed.
    #[error("scan release error: {0}")]
    Release(#[source] DirectoryError),
    /// Any other tablet failure.
    #[error("scan tablet error: {0}")]
    Tablet(#[source] TabletError),
    /// The bound scanner failed.
    #[error("scan read error: {0}")]
    Read(#[from] ReaderError),
}

impl From<TabletError> for ScanError {
    fn from(err: TabletError) -> Self {
        match err {
            err @ TabletError::Load { .. } => ScanError::Load(err),
            err @ TabletError::SizeOverflow { .. } => ScanError::SizeOverflow(err),
            err => ScanError::Tablet(err),
        }
    }
}

/// One scan session over one tablet.
#[derive(Debug)]
pub struct TabletScan {
    state: ScanState,
    param: Option<ScanParam>,
    scanner: Option<RowScanner>,
    tablet: Option<TabletHandle>,
    storage_format_version: i16,
    row_count: u64,
    last_row_key: Option<RowKey>,
}

impl Default for TabletScan {
    fn default() -> Self {
        Self::new()
    }
}

impl TabletScan {
    /// Unopened scan.
    pub fn new() -> Self {
        Self {
            state: ScanState::Unopened,
            param: None,
            scanner: None,
            tablet: None,
            storage_format_version: 0,
            row_count: 0,
            last_row_key: None,
        }
    }

    /// Acquire the tablet for `param` and bind the scanner its format needs.
    ///
    /// On failure nothing stays acquired and the scan remains unopened.
    pub fn open_with_context(
        &mut self,
        param: ScanParam,
        context: &ScanContext,
    ) -> Result<(), ScanError> {
        if self.state != ScanState::Unopened {
            return Err(ScanError::InvalidState(format!(
                "open on a scan in state {:?}",
                self.state
            )));
        }
        let query_version = param.version_range.query_version();
        if query_version < 0 {
            return Err(ScanError::InvalidArgument(format!(
                "version range {} selects query version {query_version}",
                param.version_range
            )));
        }

        let tablet = TabletHandle::acquire(
            context.directory.clone(),
            &param.range,
            ScanDirection::Forward,
            query_version,
        )
        .map_err(|source| ScanError::Acquire {
            range: param.range.clone(),
            query_version,
            source,
        })?;

        if tablet.is_removed() {
            let err = ScanError::TabletNotFound {
                range: tablet.range().clone(),
                data_version: tablet.data_version(),
            };
            log_info!(
                component = "scan",
                event = "tablet_removed",
                range = %tablet.range(),
                data_version = tablet.data_version(),
                query_version,
            );
            tablet.release().map_err(ScanError::Release)?;
            return Err(err);
        }

        let storage_format_version = tablet.storage_format_version();
        let scanner = Self::bind_scanner(&tablet, &param, storage_format_version)?;
        log_debug!(
            component = "scan",
            event = "scanner_bound",
            range = %tablet.range(),
            data_version = tablet.data_version(),
            query_version,
            storage_format_version,
            format = %scanner.kind(),
        );

        self.scanner = Some(scanner);
        self.tablet = Some(tablet);
        self.param = Some(param);
        self.storage_format_version = storage_format_version;
        self.row_count = 0;
        self.last_row_key = None;
        self.state = ScanState::ScannerBound;
        Ok(())
    }

    fn bind_scanner(
        tablet: &TabletHandle,
        param: &ScanParam,
        storage_format_version: i16,
    ) -> Result<RowScanner, ScanError> {
        let setup_error = |reason: String| ScanError::ScanSetup {
            range: tablet.range().clone(),
            data_version: tablet.data_version(),
            reason,
        };

        let readers = tablet.find_readers(
            ReaderSelector::Range(&param.range.keys),
            SCAN_READER_CAPACITY,
        )?;
        let [reader] = readers.as_slice() else {
            return Err(setup_error(format!(
                "expected {SCAN_READER_CAPACITY} reader, found {}",
                readers.len()
            )));
        };

        if let Some(projection) = &param.projection {
            let width = reader.row_desc().fields().len();
            if let Some(index) = projection.iter().find(|index| **index >= width) {
                return Err(ScanError::InvalidArgument(format!(
                    "projection index {index} out of {width} columns"
                )));
            }
        }
        let spec = ScanSpec {
            range: param.range.keys.clone(),
            projection: param.projection.clone(),
        };

        let compact = tablet.option().is_compact(storage_format_version);
        match (compact, reader) {
            (false, StorageReader::Legacy(reader)) => Ok(RowScanner::Legacy(reader.scan(spec)?)),
            (true, StorageReader::Compact(reader)) => Ok(RowScanner::Compact(reader.scan(spec)?)),
            (_, reader) => Err(setup_error(format!(
                "storage format version {storage_format_version} does not match {} reader {}",
                reader.kind(),
                reader.id()
            ))),
        }
    }

    /// Next row in key order; `Ok(None)` once the scan is exhausted.
    pub fn get_next_row(&mut self) -> Result<Option<(RowKey, Row)>, ScanError> {
        self.check_bound()?;
        let Some(scanner) = self.scanner.as_mut() else {
            return Err(ScanError::NotInitialized);
        };
        let next = scanner.next_row()?;
        if let Some((key, _)) = &next {
            self.row_count += 1;
            self.last_row_key = Some(key.clone());
        }
        Ok(next)
    }

    /// Generation of the bound tablet.
    pub fn get_tablet_data_version(&self) -> Result<i64, ScanError> {
        Ok(self.bound_tablet()?.data_version())
    }

    /// Range of the bound tablet.
    pub fn get_tablet_range(&self) -> Result<&TabletRange, ScanError> {
        Ok(self.bound_tablet()?.range())
    }

    /// Descriptor of the rows returned, after projection.
    pub fn get_row_descriptor(&self) -> Result<&RowDesc, ScanError> {
        self.check_bound()?;
        self.scanner
            .as_ref()
            .map(RowIterator::row_desc)
            .ok_or(ScanError::NotInitialized)
    }

    /// Key of the last row returned, `None` before the first row.
    pub fn get_last_row_key(&self) -> Result<Option<&RowKey>, ScanError> {
        self.check_bound()?;
        Ok(self.last_row_key.as_ref())
    }

    /// Storage format version of the bound tablet.
    pub fn storage_format_version(&self) -> Result<i16, ScanError> {
        self.check_bound()?;
        Ok(self.storage_format_version)
    }

    /// Rows returned since the scan was opened.
    pub fn row_count(&self) -> u64 {
        self.row_count
    }

    /// Parameters the scan was opened with.
    pub fn param(&self) -> Option<&ScanParam> {
        self.param.as_ref()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ScanState {
        self.state
    }

    /// Drop the scanner and release the tablet.
    ///
    /// Closing an unopened scan only marks it closed. Closing twice is an
    /// [`ScanError::InvalidState`] and does not reach the directory.
    pub fn close(&mut self) -> Result<(), ScanError> {
        match self.state {
            ScanState::Closed => Err(ScanError::InvalidState("scan already closed".into())),
            ScanState::Unopened => {
                self.state = ScanState::Closed;
                Ok(())
            }
            ScanState::ScannerBound => {
                self.state = ScanState::Closed;
                self.scanner = None;
                let Some(tablet) = self.tablet.take() else {
                    return Ok(());
                };
                log_debug!(
                    component = "scan",
                    event = "scan_closed",
                    range = %tablet.range(),
                    data_version = tablet.data_version(),
                    rows = self.row_count,
                );
                tablet.release().map_err(ScanError::Release)
            }
        }
    }

    fn check_bound(&self) -> Result<(), ScanError> {
        match self.state {
            ScanState::ScannerBound => Ok(()),
            ScanState::Unopened => Err(ScanError::NotInitialized),
            ScanState::Closed => Err(ScanError::InvalidState("scan closed".into())),
        }
    }

    fn bound_tablet(&self) -> Result<&TabletHandle, ScanError> {
        self.check_bound()?;
        self.tablet.as_ref().ok_or(ScanError::NotInitialized)
    }
}

#[cfg(test)]
mod tests {
    use std::{ops::Bound, sync::Arc};

    use super::*;
    use crate::{
        directory::TabletImage,
        option::TabletOption,
        range::KeyRange,
        reader::{MemReaderProvider, ReaderId, ReaderProvider},
        row::Datum,
        tablet::Tablet,
        test_util::{compact_reader, legacy_reader},
    };

    struct Fixture {
        image: Arc<TabletImage>,
        tablet: Arc<Tablet>,
        context: ScanContext,
    }

    fn fixture(format_version: i16, reader: StorageReader) -> Fixture {
        let provider = Arc::new(MemReaderProvider::new());
        let id = reader.id();
        provider.register(reader);
        let provider: Arc<dyn ReaderProvider> = provider;

        let tablet = Tablet::new(
            TabletRange::whole_table(1),
            1,
            provider,
            Arc::new(TabletOption::default()),
        );
        tablet.add_reader_by_id(id).unwrap();
        tablet.set_storage_format_version(format_version);

        let image = Arc::new(TabletImage::new());
        let tablet = image.add_tablet(tablet).unwrap();
        let context = ScanContext::new(image.clone());
        Fixture {
            image,
            tablet,
            context,
        }
    }

    fn whole_table() -> ScanParam {
        ScanParam::new(TabletRange::whole_table(1), VersionRange::latest())
    }

    fn drain(scan: &mut TabletScan) -> Vec<RowKey> {
        let mut keys = Vec::new();
        while let Some((key, _)) = scan.get_next_row().unwrap() {
            keys.push(key);
        }
        keys
    }

    #[test]
    fn legacy_format_scans_legacy_reader() {
        let fixture = fixture(0, legacy_reader(ReaderId::new(1, 0), &["a", "b"]).into());
        let mut scan = TabletScan::new();
        scan.open_with_context(whole_table(), &fixture.context).unwrap();

        assert_eq!(scan.state(), ScanState::ScannerBound);
        assert_eq!(fixture.tablet.ref_count(), 1);
        assert_eq!(drain(&mut scan), vec![RowKey::from("a"), RowKey::from("b")]);
        assert!(scan.get_next_row().unwrap().is_none());
        assert_eq!(scan.row_count(), 2);
        assert_eq!(scan.get_last_row_key().unwrap(), Some(&RowKey::from("b")));

        scan.close().unwrap();
        assert_eq!(fixture.tablet.ref_count(), 0);
    }

    #[test]
    fn compact_format_scans_compact_reader() {
        let fixture = fixture(2, compact_reader(ReaderId::new(1, 0), &["a", "b", "c"]).into());
        let mut scan = TabletScan::new();
        let param = ScanParam::new(
            TabletRange::new(
                1,
                KeyRange::new(Bound::Included(RowKey::from("b")), Bound::Unbounded),
            ),
            VersionRange::at(1),
        );
        scan.open_with_context(param, &fixture.context).unwrap();

        assert_eq!(scan.storage_format_version().unwrap(), 2);
        assert_eq!(scan.get_tablet_data_version().unwrap(), 1);
        assert_eq!(drain(&mut scan), vec![RowKey::from("b"), RowKey::from("c")]);
        scan.close().unwrap();
    }

    #[test]
    fn format_and_reader_mismatch_is_setup_error() {
        let fixture = fixture(2, legacy_reader(ReaderId::new(1, 0), &["a"]).into());
        let mut scan = TabletScan::new();
        assert!(matches!(
            scan.open_with_context(whole_table(), &fixture.context),
            Err(ScanError::ScanSetup { .. })
        ));
        assert_eq!(scan.state(), ScanState::Unopened);
        assert_eq!(fixture.tablet.ref_count(), 0);
    }

    #[test]
    fn tablet_without_readers_is_setup_error() {
        let image = Arc::new(TabletImage::new());
        let tablet = image
            .add_tablet(Tablet::new(
                TabletRange::whole_table(1),
                1,
                Arc::new(MemReaderProvider::new()),
                Arc::new(TabletOption::default()),
            ))
            .unwrap();
        let mut scan = TabletScan::new();

        assert!(matches!(
            scan.open_with_context(whole_table(), &ScanContext::new(image)),
            Err(ScanError::ScanSetup { .. })
        ));
        assert_eq!(tablet.ref_count(), 0);
    }

    #[test]
    fn negative_query_version_is_rejected_before_acquire() {
        let fixture = fixture(0, legacy_reader(ReaderId::new(1, 0), &["a"]).into());
        let mut scan = TabletScan::new();
        let param = ScanParam::new(TabletRange::whole_table(1), VersionRange::at(-1));

        assert!(matches!(
            scan.open_with_context(param, &fixture.context),
            Err(ScanError::InvalidArgument(_))
        ));
        assert_eq!(fixture.tablet.ref_count(), 0);
        assert!(!fixture.tablet.is_loaded());
    }

    #[test]
    fn unknown_generation_is_acquire_error() {
        let fixture = fixture(0, legacy_reader(ReaderId::new(1, 0), &["a"]).into());
        let mut scan = TabletScan::new();
        let param = ScanParam::new(TabletRange::whole_table(1), VersionRange::at(0));

        assert!(matches!(
            scan.open_with_context(param, &fixture.context),
            Err(ScanError::Acquire {
                source: DirectoryError::NotFound { .. },
                ..
            })
        ));
    }

    #[test]
    fn calls_before_open_are_not_initialized() {
        let mut scan = TabletScan::new();
        assert!(matches!(scan.get_next_row(), Err(ScanError::NotInitialized)));
        assert!(matches!(scan.get_tablet_range(), Err(ScanError::NotInitialized)));
        assert!(matches!(scan.get_row_descriptor(), Err(ScanError::NotInitialized)));
        assert!(matches!(scan.get_last_row_key(), Err(ScanError::NotInitialized)));
    }

    #[test]
    fn removed_tablet_is_not_found_and_released() {
        let fixture = fixture(0, legacy_reader(ReaderId::new(1, 0), &["a"]).into());
        fixture.tablet.set_removed(true);
        let mut scan = TabletScan::new();

        assert!(matches!(
            scan.open_with_context(whole_table(), &fixture.context),
            Err(ScanError::TabletNotFound { data_version: 1, .. })
        ));
        assert_eq!(fixture.tablet.ref_count(), 0);
        assert!(!fixture.tablet.is_loaded());
    }

    #[test]
    fn second_close_is_invalid_state() {
        let fixture = fixture(0, legacy_reader(ReaderId::new(1, 0), &["a"]).into());
        let mut scan = TabletScan::new();
        scan.open_with_context(whole_table(), &fixture.context).unwrap();

        scan.close().unwrap();
        assert!(matches!(scan.close(), Err(ScanError::InvalidState(_))));
        assert_eq!(fixture.tablet.ref_count(), 0);
        assert!(matches!(scan.get_next_row(), Err(ScanError::InvalidState(_))));
        assert!(matches!(
            scan.open_with_context(whole_table(), &fixture.context),
            Err(ScanError::InvalidState(_))
        ));
        assert_eq!(fixture.image.retired_count(), 0);
    }

    #[test]
    fn dropping_open_scan_releases_tablet() {
        let fixture = fixture(0, legacy_reader(ReaderId::new(1, 0), &["a"]).into());
        {
            let mut scan = TabletScan::new();
            scan.open_with_context(whole_table(), &fixture.context).unwrap();
            assert_eq!(fixture.tablet.ref_count(), 1);
        }
        assert_eq!(fixture.tablet.ref_count(), 0);
    }

    #[test]
    fn projection_applies_to_descriptor_and_rows() {
        let fixture = fixture(2, compact_reader(ReaderId::new(1, 0), &["a"]).into());
        let mut scan = TabletScan::new();
        scan.open_with_context(whole_table().with_projection(vec![1]), &fixture.context)
            .unwrap();

        assert_eq!(scan.get_row_descriptor().unwrap().field(0).name(), "v");
        let (_, row) = scan.get_next_row().unwrap().unwrap();
        assert_eq!(row.cells(), &[Datum::Int64(0)]);
    }

    #[test]
    fn projection_out_of_range_is_invalid_argument() {
        let fixture = fixture(0, legacy_reader(ReaderId::new(1, 0), &["a"]).into());
        let mut scan = TabletScan::new();
        assert!(matches!(
            scan.open_with_context(whole_table().with_projection(vec![5]), &fixture.context),
            Err(ScanError::InvalidArgument(_))
        ));
        assert_eq!(fixture.tablet.ref_count(), 0);
    }

    #[test]
    fn load_failure_is_retryable() {
        let provider = Arc::new(MemReaderProvider::new());
        let id = ReaderId::new(1, 0);
        let tablet = Tablet::new(
            TabletRange::whole_table(1),
            1,
            provider.clone(),
            Arc::new(TabletOption::default()),
        );
        tablet.add_reader_by_id(id).unwrap();
        let image = Arc::new(TabletImage::new());
        let tablet = image.add_tablet(tablet).unwrap();
        let context = ScanContext::new(image);

        let mut scan = TabletScan::new();
        assert!(matches!(
            scan.open_with_context(whole_table(), &context),
            Err(ScanError::Load(_))
        ));
        assert_eq!(tablet.ref_count(), 0);

        provider.register(legacy_reader(id, &["a"]));
        scan.open_with_context(whole_table(), &context).unwrap();
        assert_eq!(drain(&mut scan).len(), 1);
    }
}
