//! The tablet: one key range of a table at one multi-version generation.
//!
//! A tablet knows which readers make up its data (`reader_ids`) but only opens
//! them on first use. The open happens once, under the load lock, and the
//! handles are then shared by every scan until the tablet is dropped. Extend
//! metadata, the compaction cache and the lifecycle flags each use their own
//! synchronization so none of them waits on a reader load.

mod cache;
mod error;
pub mod meta;

use std::{
    fmt,
    io::{Read, Write},
    sync::{
        atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering},
        Arc, Mutex, PoisonError, RwLock,
    },
};

use once_cell::sync::OnceCell;

pub use self::{
    cache::{CacheNodes, CompactCacheNode, FrozenVersionRange},
    error::TabletError,
    meta::{ExtendInfo, RangeInfo},
};
use self::cache::CompactCacheList;
use crate::{
    observability::{log_debug, log_info, log_warn},
    option::TabletOption,
    range::{KeyRange, TabletRange},
    reader::{ReaderError, ReaderId, ReaderProvider, StorageReader},
    row::RowKey,
    serdes::{Decode, Encode},
};

/// What a caller intends to read; used to look up candidate readers.
#[derive(Clone, Copy, Debug)]
pub enum ReaderSelector<'a> {
    /// A key range scan.
    Range(&'a KeyRange<RowKey>),
    /// A single-key lookup.
    Key(&'a RowKey),
}

/// Range shard of a table at one generation.
pub struct Tablet {
    range: TabletRange,
    data_version: i64,
    option: Arc<TabletOption>,
    provider: Arc<dyn ReaderProvider>,

    reader_ids: RwLock<Vec<ReaderId>>,
    readers: OnceCell<Arc<[StorageReader]>>,
    load_lock: Mutex<()>,
    load_failures: AtomicU32,

    extend_info: Mutex<ExtendInfo>,
    cache: CompactCacheList,

    removed: AtomicBool,
    merged: AtomicBool,
    with_next_brother: AtomicBool,
    merge_count: AtomicU32,
    disk_no: AtomicI32,
    ref_count: AtomicU32,
}

impl Tablet {
    /// Unloaded tablet covering `range` at generation `data_version`; readers
    /// are opened through `provider`.
    pub fn new(
        range: TabletRange,
        data_version: i64,
        provider: Arc<dyn ReaderProvider>,
        option: Arc<TabletOption>,
    ) -> Self {
        let cache = CompactCacheList::new(option.cache_node_limit());
        Tablet {
            range,
            data_version,
            option,
            provider,
            reader_ids: RwLock::new(Vec::new()),
            readers: OnceCell::new(),
            load_lock: Mutex::new(()),
            load_failures: AtomicU32::new(0),
            extend_info: Mutex::new(ExtendInfo::default()),
            cache,
            removed: AtomicBool::new(false),
            merged: AtomicBool::new(false),
            with_next_brother: AtomicBool::new(false),
            merge_count: AtomicU32::new(0),
            disk_no: AtomicI32::new(0),
            ref_count: AtomicU32::new(0),
        }
    }

    /// Key range of the tablet.
    pub fn range(&self) -> &TabletRange {
        &self.range
    }

    /// Replace the key range; only possible before the tablet is shared.
    pub fn set_range(&mut self, range: TabletRange) {
        self.range = range;
    }

    /// Generation of the tablet.
    pub fn data_version(&self) -> i64 {
        self.data_version
    }

    /// Replace the generation; only possible before the tablet is shared.
    pub fn set_data_version(&mut self, data_version: i64) {
        self.data_version = data_version;
    }

    /// Options the tablet was built with.
    pub fn option(&self) -> &Arc<TabletOption> {
        &self.option
    }

    // ---- readers ------------------------------------------------------------

    /// Readers able to serve `selector`, opening them on first use.
    ///
    /// The selector does not narrow the result: every reader of the tablet is
    /// returned and scanners filter rows themselves. Fails with
    /// [`TabletError::SizeOverflow`] when more than `capacity` readers exist.
    pub fn find_readers(
        &self,
        selector: ReaderSelector<'_>,
        capacity: usize,
    ) -> Result<Vec<StorageReader>, TabletError> {
        let readers = self.load_readers()?;
        if readers.len() > capacity {
            return Err(TabletError::SizeOverflow {
                range: self.range.clone(),
                required: readers.len(),
                capacity,
            });
        }
        log_debug!(
            component = "tablet",
            event = "readers_found",
            range = %self.range,
            data_version = self.data_version,
            selector = ?selector,
            count = readers.len(),
        );
        Ok(readers.to_vec())
    }

    /// Opened reader with identity `id`.
    pub fn find_reader_by_id(&self, id: &ReaderId) -> Result<StorageReader, TabletError> {
        if !self.include(id) {
            return Err(TabletError::NotFound {
                range: self.range.clone(),
                reader: *id,
            });
        }
        self.load_readers()?
            .iter()
            .find(|reader| reader.id() == *id)
            .cloned()
            .ok_or_else(|| TabletError::NotFound {
                range: self.range.clone(),
                reader: *id,
            })
    }

    /// Whether `id` is one of the tablet's readers; never opens anything.
    pub fn include(&self, id: &ReaderId) -> bool {
        self.read_ids().contains(id)
    }

    /// Register another reader identity. Rejected once readers are opened,
    /// for duplicates, and past the configured reader cap.
    pub fn add_reader_by_id(&self, id: ReaderId) -> Result<(), TabletError> {
        let _guard = self.load_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if self.readers.get().is_some() {
            return Err(self.invalid_state("readers already materialized"));
        }

        let mut ids = self.reader_ids.write().unwrap_or_else(PoisonError::into_inner);
        if ids.contains(&id) {
            return Err(self.invalid_state(format!("reader {id} already registered")));
        }
        if ids.len() >= self.option.reader_limit() {
            return Err(self.invalid_state(format!(
                "reader limit {} reached",
                self.option.reader_limit()
            )));
        }
        ids.push(id);
        Ok(())
    }

    /// Snapshot of the registered reader identities.
    pub fn reader_ids(&self) -> Vec<ReaderId> {
        self.read_ids().clone()
    }

    /// Largest file sequence among the reader identities, 0 without readers.
    pub fn max_reader_file_seq(&self) -> u64 {
        self.read_ids()
            .iter()
            .map(|id| id.seq())
            .max()
            .unwrap_or(0)
    }

    /// Whether reader handles have been materialized.
    pub fn is_loaded(&self) -> bool {
        self.readers.get().is_some()
    }

    /// Failed load attempts so far.
    pub fn load_failures(&self) -> u32 {
        self.load_failures.load(Ordering::Relaxed)
    }

    fn read_ids(&self) -> std::sync::RwLockReadGuard<'_, Vec<ReaderId>> {
        self.reader_ids.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn load_readers(&self) -> Result<&Arc<[StorageReader]>, TabletError> {
        if let Some(readers) = self.readers.get() {
            return Ok(readers);
        }

        let _guard = self.load_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(readers) = self.readers.get() {
            return Ok(readers);
        }

        let ids = self.reader_ids();
        let mut opened = Vec::with_capacity(ids.len());
        for id in ids {
            let reader = self
                .provider
                .open(&id)
                .and_then(|reader| {
                    if reader.id() == id {
                        Ok(reader)
                    } else {
                        Err(ReaderError::Corrupted {
                            id,
                            reason: format!("provider returned reader {}", reader.id()),
                        })
                    }
                })
                .map_err(|source| {
                    let failures = self.load_failures.fetch_add(1, Ordering::Relaxed) + 1;
                    log_warn!(
                        component = "tablet",
                        event = "reader_load_failed",
                        range = %self.range,
                        data_version = self.data_version,
                        reader = %id,
                        failures,
                        error = %source,
                    );
                    TabletError::Load {
                        range: self.range.clone(),
                        data_version: self.data_version,
                        reader: id,
                        source,
                    }
                })?;
            opened.push(reader);
        }

        let readers = self.readers.get_or_init(|| opened.into());
        self.apply_extend_info(readers);
        log_debug!(
            component = "tablet",
            event = "readers_loaded",
            range = %self.range,
            data_version = self.data_version,
            count = readers.len(),
        );
        Ok(readers)
    }

    // ---- extend info ---------------------------------------------------------

    /// Recompute row count, occupied bytes and checksum from the opened
    /// readers. Does nothing before the readers are materialized.
    pub fn recompute_extend_info(&self) -> ExtendInfo {
        match self.readers.get() {
            Some(readers) => self.apply_extend_info(readers),
            None => self.extend_info(),
        }
    }

    fn apply_extend_info(&self, readers: &[StorageReader]) -> ExtendInfo {
        let (row_count, occupy_size, checksum) = readers.iter().fold(
            (0i64, 0i64, 0u64),
            |(rows, bytes, checksum), reader| {
                (
                    rows + reader.row_count() as i64,
                    bytes + reader.occupy_size() as i64,
                    checksum.wrapping_add(reader.checksum()),
                )
            },
        );
        self.update_extend_info(|info| {
            info.row_count = row_count;
            info.occupy_size = occupy_size;
            info.checksum = checksum;
        })
    }

    /// Copy of the current extend info.
    pub fn extend_info(&self) -> ExtendInfo {
        *self.lock_extend_info()
    }

    /// Replace the extend info wholesale.
    pub fn set_extend_info(&self, info: ExtendInfo) {
        *self.lock_extend_info() = info;
    }

    /// Apply `update` under the extend info lock and return the result.
    pub fn update_extend_info(&self, update: impl FnOnce(&mut ExtendInfo)) -> ExtendInfo {
        let mut info = self.lock_extend_info();
        update(&mut info);
        *info
    }

    fn lock_extend_info(&self) -> std::sync::MutexGuard<'_, ExtendInfo> {
        self.extend_info.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Rows across all readers.
    pub fn row_count(&self) -> i64 {
        self.extend_info().row_count
    }

    /// Bytes occupied across all readers.
    pub fn occupy_size(&self) -> i64 {
        self.extend_info().occupy_size
    }

    /// Combined reader checksum.
    pub fn checksum(&self) -> u64 {
        self.extend_info().checksum
    }

    /// Version of the last expiry pass.
    pub fn last_expire_version(&self) -> i64 {
        self.extend_info().last_expire_version
    }

    /// Record the version of the last expiry pass.
    pub fn set_last_expire_version(&self, version: i64) {
        self.update_extend_info(|info| info.last_expire_version = version);
    }

    /// Sequence number of the last rewrite.
    pub fn sequence_num(&self) -> i64 {
        self.extend_info().sequence_num
    }

    /// Record the sequence number of the last rewrite.
    pub fn set_sequence_num(&self, sequence_num: i64) {
        self.update_extend_info(|info| info.sequence_num = sequence_num);
    }

    /// Storage format generation of the tablet's readers.
    pub fn storage_format_version(&self) -> i16 {
        self.extend_info().storage_format_version
    }

    /// Stamp the storage format generation of the tablet's readers.
    pub fn set_storage_format_version(&self, version: i16) {
        self.update_extend_info(|info| info.storage_format_version = version);
    }

    // ---- compaction cache ----------------------------------------------------

    /// Append a compaction cache node; fails once the node cap is reached.
    pub fn add_cache_node(&self, node: CompactCacheNode) -> Result<usize, TabletError> {
        self.cache.push(Arc::new(node)).map_err(|full| {
            self.invalid_state(format!("compaction cache limit {} reached", full.limit))
        })
    }

    /// Cache nodes in append order.
    pub fn cache_nodes(&self) -> CacheNodes {
        self.cache.iter()
    }

    /// Number of cache nodes.
    pub fn cache_node_count(&self) -> usize {
        self.cache.len()
    }

    /// Major version of the newest cache node, 0 without nodes.
    pub fn cache_data_version(&self) -> i64 {
        self.cache
            .newest()
            .map(|node| node.version_range().major_version)
            .unwrap_or(0)
    }

    /// Version range of the newest cache node.
    pub fn cache_version_range(&self) -> Option<FrozenVersionRange> {
        self.cache.newest().map(|node| node.version_range())
    }

    /// Claim the cache loading gate. Returns false while another loader holds
    /// it; the caller must wait for that loader instead of spinning.
    pub fn try_begin_loading(&self) -> bool {
        self.cache.try_begin_loading()
    }

    /// Release the cache loading gate held by the caller.
    pub fn end_loading(&self) -> Result<(), TabletError> {
        if self.cache.end_loading() {
            Ok(())
        } else {
            Err(self.invalid_state("compaction cache gate is not held"))
        }
    }

    /// Whether a cache loader currently holds the gate.
    pub fn is_cache_loading(&self) -> bool {
        self.cache.is_loading()
    }

    // ---- lifecycle -----------------------------------------------------------

    /// Whether the tablet is removed in the next generation.
    pub fn is_removed(&self) -> bool {
        self.removed.load(Ordering::Acquire)
    }

    /// Mark or unmark the tablet as removed.
    pub fn set_removed(&self, removed: bool) {
        self.removed.store(removed, Ordering::Release);
    }

    /// Whether a merge completed on this tablet.
    pub fn is_merged(&self) -> bool {
        self.merged.load(Ordering::Acquire)
    }

    /// Mark or unmark the tablet as merged.
    pub fn set_merged(&self, merged: bool) {
        self.merged.store(merged, Ordering::Release);
    }

    /// Whether the range continues into the next sibling tablet.
    pub fn is_with_next_brother(&self) -> bool {
        self.with_next_brother.load(Ordering::Acquire)
    }

    /// Record whether the range continues into the next sibling tablet.
    pub fn set_with_next_brother(&self, with_next_brother: bool) {
        self.with_next_brother
            .store(with_next_brother, Ordering::Release);
    }

    /// Completed merges.
    pub fn merge_count(&self) -> u32 {
        self.merge_count.load(Ordering::Acquire)
    }

    /// Count one more completed merge.
    pub fn inc_merge_count(&self) -> u32 {
        self.merge_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Disk placement hint.
    pub fn disk_no(&self) -> i32 {
        self.disk_no.load(Ordering::Relaxed)
    }

    /// Set the disk placement hint.
    pub fn set_disk_no(&self, disk_no: i32) {
        self.disk_no.store(disk_no, Ordering::Relaxed);
    }

    /// Outstanding acquisitions.
    pub fn ref_count(&self) -> u32 {
        self.ref_count.load(Ordering::Acquire)
    }

    /// Count one acquisition; returns the new count.
    pub fn inc_ref(&self) -> u32 {
        self.ref_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Count one release; returns the new count. Never goes below zero.
    pub fn dec_ref(&self) -> Result<u32, TabletError> {
        self.ref_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                count.checked_sub(1)
            })
            .map(|previous| previous - 1)
            .map_err(|_| TabletError::RefCountUnderflow {
                range: self.range.clone(),
                data_version: self.data_version,
            })
    }

    // ---- persistence ---------------------------------------------------------

    /// Fixed-layout range record of the tablet.
    pub fn range_info(&self) -> Result<RangeInfo, TabletError> {
        let key_size = |key: &[u8]| {
            i16::try_from(key.len()).map_err(|_| {
                TabletError::Malformed(format!("row key of {} bytes is too long", key.len()))
            })
        };
        Ok(RangeInfo {
            start_key_size: key_size(self.range.start_key())?,
            end_key_size: key_size(self.range.end_key())?,
            is_removed: self.is_removed() as i8,
            is_merged: self.is_merged() as i8,
            is_with_next_brother: self.is_with_next_brother() as i8,
            border_flag: self.range.border_flag() as i8,
            table_id: self.range.table_id as i64,
        })
    }

    /// Restore range and flags from `info`; `key_stream` holds the start key
    /// followed by the end key.
    pub fn set_range_by_info(
        &mut self,
        info: &RangeInfo,
        key_stream: &[u8],
    ) -> Result<(), TabletError> {
        let (start_size, end_size) = match (
            usize::try_from(info.start_key_size),
            usize::try_from(info.end_key_size),
        ) {
            (Ok(start), Ok(end)) => (start, end),
            _ => {
                return Err(TabletError::Malformed(format!(
                    "negative key size in range info {info:?}"
                )))
            }
        };
        if key_stream.len() < start_size + end_size {
            return Err(TabletError::Malformed(format!(
                "key stream of {} bytes, range info needs {}",
                key_stream.len(),
                start_size + end_size
            )));
        }

        let (start_key, rest) = key_stream.split_at(start_size);
        self.range = TabletRange::from_parts(
            info.table_id as u64,
            info.border_flag as u8,
            start_key,
            &rest[..end_size],
        );
        self.set_removed(info.is_removed != 0);
        self.set_merged(info.is_merged != 0);
        self.set_with_next_brother(info.is_with_next_brother != 0);
        Ok(())
    }

    /// Persist the tablet record.
    pub fn encode<W: Write>(&self, writer: &mut W) -> Result<(), TabletError> {
        self.range_info()?.encode(writer)?;
        writer.write_all(self.range.start_key())?;
        writer.write_all(self.range.end_key())?;
        self.data_version.encode(writer)?;
        self.disk_no().encode(writer)?;
        (self.merge_count() as i32).encode(writer)?;

        let ids = self.reader_ids();
        (ids.len() as i32).encode(writer)?;
        for id in &ids {
            id.raw().encode(writer)?;
        }
        self.extend_info().encode(writer)?;
        Ok(())
    }

    /// Restore a tablet record written by [`Tablet::encode`]. Readers stay
    /// unopened.
    pub fn decode<R: Read>(
        reader: &mut R,
        provider: Arc<dyn ReaderProvider>,
        option: Arc<TabletOption>,
    ) -> Result<Self, TabletError> {
        let info = RangeInfo::decode(reader)?;
        let key_len = info.start_key_size.max(0) as usize + info.end_key_size.max(0) as usize;
        let mut key_stream = vec![0u8; key_len];
        reader.read_exact(&mut key_stream)?;

        let mut tablet = Tablet::new(
            TabletRange::whole_table(info.table_id as u64),
            0,
            provider,
            option,
        );
        tablet.set_range_by_info(&info, &key_stream)?;
        tablet.data_version = i64::decode(reader)?;
        tablet.set_disk_no(i32::decode(reader)?);
        let merge_count = i32::decode(reader)?;
        let merge_count = u32::try_from(merge_count).map_err(|_| {
            TabletError::Malformed(format!("negative merge count {merge_count}"))
        })?;
        tablet.merge_count.store(merge_count, Ordering::Release);

        let count = i32::decode(reader)?;
        if count < 0 || count as usize > tablet.option.reader_limit() {
            return Err(TabletError::Malformed(format!(
                "reader count {count} outside 0..={}",
                tablet.option.reader_limit()
            )));
        }
        for _ in 0..count {
            tablet.add_reader_by_id(ReaderId::from_raw(u64::decode(reader)?))?;
        }
        tablet.set_extend_info(ExtendInfo::decode(reader)?);
        Ok(tablet)
    }

    /// Log the tablet state, and each opened reader when `dump_readers` is set.
    pub fn dump(&self, dump_readers: bool) {
        let info = self.extend_info();
        log_info!(
            component = "tablet",
            event = "tablet_dump",
            range = %self.range,
            data_version = self.data_version,
            removed = self.is_removed(),
            merged = self.is_merged(),
            with_next_brother = self.is_with_next_brother(),
            merge_count = self.merge_count(),
            disk_no = self.disk_no(),
            ref_count = self.ref_count(),
            readers = ?self.reader_ids(),
            loaded = self.is_loaded(),
            cache_nodes = self.cache_node_count(),
            row_count = info.row_count,
            occupy_size = info.occupy_size,
            checksum = info.checksum,
            storage_format_version = info.storage_format_version,
        );
        if dump_readers {
            for reader in self.readers.get().iter().flat_map(|readers| readers.iter()) {
                log_info!(
                    component = "tablet",
                    event = "tablet_dump_reader",
                    range = %self.range,
                    reader = %reader.id(),
                    kind = %reader.kind(),
                    rows = reader.row_count(),
                    occupy_size = reader.occupy_size(),
                    checksum = reader.checksum(),
                );
            }
        }
    }

    fn invalid_state(&self, reason: impl Into<String>) -> TabletError {
        TabletError::InvalidState {
            range: self.range.clone(),
            reason: reason.into(),
        }
    }
}

impl fmt::Debug for Tablet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tablet")
            .field("range", &self.range)
            .field("data_version", &self.data_version)
            .field("reader_ids", &self.reader_ids())
            .field("loaded", &self.is_loaded())
            .field("removed", &self.is_removed())
            .field("merged", &self.is_merged())
            .field("ref_count", &self.ref_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io::Cursor,
        ops::Bound,
        sync::{atomic::Ordering, Arc, Barrier},
    };

    use super::*;
    use crate::{
        reader::MemReaderProvider,
        test_util::{compact_reader, legacy_reader, CountingProvider},
    };

    fn tablet_with(provider: Arc<dyn ReaderProvider>, ids: &[ReaderId]) -> Tablet {
        let option = Arc::new(TabletOption::default().max_readers_per_tablet(4));
        let tablet = Tablet::new(TabletRange::whole_table(1), 3, provider, option);
        for id in ids {
            tablet.add_reader_by_id(*id).unwrap();
        }
        tablet
    }

    fn whole() -> KeyRange<RowKey> {
        KeyRange::all()
    }

    #[test]
    fn find_readers_materializes_once() {
        let id = ReaderId::new(1, 0);
        let provider = Arc::new(CountingProvider::default());
        provider.inner.register(legacy_reader(id, &["a", "b"]));
        let tablet = tablet_with(provider.clone(), &[id]);

        let first = tablet.find_readers(ReaderSelector::Range(&whole()), 1).unwrap();
        let second = tablet
            .find_readers(ReaderSelector::Key(&RowKey::from("a")), 1)
            .unwrap();

        assert_eq!(first.len(), 1);
        assert!(first[0].same_handle(&second[0]));
        assert_eq!(provider.opens.load(Ordering::SeqCst), 1);
        assert_eq!(tablet.row_count(), 2);
    }

    #[test]
    fn concurrent_finds_open_each_reader_once() {
        let ids = [ReaderId::new(1, 0), ReaderId::new(2, 0)];
        let provider = Arc::new(CountingProvider::default());
        provider.inner.register(legacy_reader(ids[0], &["a"]));
        provider.inner.register(compact_reader(ids[1], &["b"]));
        let tablet = tablet_with(provider.clone(), &ids);

        let threads = 8;
        let barrier = Barrier::new(threads);
        std::thread::scope(|scope| {
            for _ in 0..threads {
                scope.spawn(|| {
                    barrier.wait();
                    let readers = tablet.find_readers(ReaderSelector::Range(&whole()), 2).unwrap();
                    assert_eq!(readers.len(), 2);
                });
            }
        });

        assert_eq!(provider.opens.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn load_failure_leaves_tablet_retryable() {
        let id = ReaderId::new(5, 1);
        let provider = Arc::new(MemReaderProvider::new());
        let tablet = tablet_with(provider.clone(), &[id]);

        let err = tablet
            .find_readers(ReaderSelector::Range(&whole()), 1)
            .unwrap_err();
        assert!(matches!(err, TabletError::Load { reader, .. } if reader == id));
        assert!(!tablet.is_loaded());
        assert_eq!(tablet.load_failures(), 1);

        provider.register(legacy_reader(id, &["a"]));
        assert_eq!(
            tablet
                .find_readers(ReaderSelector::Range(&whole()), 1)
                .unwrap()
                .len(),
            1
        );
        assert!(tablet.is_loaded());
    }

    #[test]
    fn provider_returning_wrong_identity_is_a_load_error() {
        let provider = Arc::new(MemReaderProvider::new());
        provider.register(legacy_reader(ReaderId::new(2, 0), &["a"]));
        let wrong = Arc::new(ForwardingProvider {
            inner: provider,
            target: ReaderId::new(2, 0),
        });
        let tablet = tablet_with(wrong, &[ReaderId::new(1, 0)]);

        assert!(matches!(
            tablet.find_readers(ReaderSelector::Range(&whole()), 1),
            Err(TabletError::Load {
                source: ReaderError::Corrupted { .. },
                ..
            })
        ));
    }

    struct ForwardingProvider {
        inner: Arc<MemReaderProvider>,
        target: ReaderId,
    }

    impl ReaderProvider for ForwardingProvider {
        fn open(&self, _id: &ReaderId) -> Result<StorageReader, ReaderError> {
            self.inner.open(&self.target)
        }
    }

    #[test]
    fn capacity_smaller_than_reader_count_overflows() {
        let ids = [ReaderId::new(1, 0), ReaderId::new(2, 0)];
        let provider = Arc::new(MemReaderProvider::new());
        provider.register(legacy_reader(ids[0], &["a"]));
        provider.register(legacy_reader(ids[1], &["b"]));
        let tablet = tablet_with(provider, &ids);

        assert!(matches!(
            tablet.find_readers(ReaderSelector::Range(&whole()), 1),
            Err(TabletError::SizeOverflow {
                required: 2,
                capacity: 1,
                ..
            })
        ));
    }

    #[test]
    fn reader_identity_lookup() {
        let id = ReaderId::new(7, 2);
        let provider = Arc::new(MemReaderProvider::new());
        provider.register(compact_reader(id, &["a"]));
        let tablet = tablet_with(provider, &[id]);

        assert!(tablet.include(&id));
        assert!(!tablet.is_loaded());
        assert_eq!(tablet.find_reader_by_id(&id).unwrap().id(), id);
        assert!(matches!(
            tablet.find_reader_by_id(&ReaderId::new(8, 2)),
            Err(TabletError::NotFound { .. })
        ));
        assert_eq!(tablet.max_reader_file_seq(), 7);
    }

    #[test]
    fn add_reader_rules() {
        let provider = Arc::new(MemReaderProvider::new());
        let option = Arc::new(TabletOption::default());
        let tablet = Tablet::new(TabletRange::whole_table(1), 1, provider.clone(), option);
        let id = ReaderId::new(1, 0);
        provider.register(legacy_reader(id, &["a"]));

        tablet.add_reader_by_id(id).unwrap();
        assert!(matches!(
            tablet.add_reader_by_id(id),
            Err(TabletError::InvalidState { .. })
        ));
        assert!(matches!(
            tablet.add_reader_by_id(ReaderId::new(2, 0)),
            Err(TabletError::InvalidState { .. })
        ));

        let bigger = tablet_with(provider, &[id]);
        bigger.find_readers(ReaderSelector::Range(&whole()), 4).unwrap();
        assert!(matches!(
            bigger.add_reader_by_id(ReaderId::new(3, 0)),
            Err(TabletError::InvalidState { .. })
        ));
    }

    #[test]
    fn extend_info_aggregates_readers() {
        let ids = [ReaderId::new(1, 0), ReaderId::new(2, 0)];
        let provider = Arc::new(MemReaderProvider::new());
        let first = StorageReader::from(legacy_reader(ids[0], &["a", "b"]));
        let second = StorageReader::from(legacy_reader(ids[1], &["c"]));
        provider.register(first.clone());
        provider.register(second.clone());
        let tablet = tablet_with(provider, &ids);

        assert_eq!(tablet.recompute_extend_info(), ExtendInfo::default());
        tablet.find_readers(ReaderSelector::Range(&whole()), 2).unwrap();

        let info = tablet.extend_info();
        assert_eq!(info.row_count, 3);
        assert_eq!(
            info.occupy_size as u64,
            first.occupy_size() + second.occupy_size()
        );
        assert_eq!(info.checksum, first.checksum().wrapping_add(second.checksum()));

        tablet.set_extend_info(ExtendInfo::default());
        assert_eq!(tablet.recompute_extend_info().row_count, 3);
    }

    #[test]
    fn extend_info_setters_keep_aggregates() {
        let tablet = tablet_with(Arc::new(MemReaderProvider::new()), &[]);
        tablet.set_storage_format_version(2);
        tablet.set_sequence_num(11);
        tablet.set_last_expire_version(4);

        assert_eq!(tablet.storage_format_version(), 2);
        assert_eq!(tablet.sequence_num(), 11);
        assert_eq!(tablet.last_expire_version(), 4);
        assert_eq!(tablet.row_count(), 0);
    }

    #[test]
    fn cache_nodes_and_gate() {
        let option = Arc::new(TabletOption::default().max_compact_cache_per_tablet(2));
        let tablet = Tablet::new(
            TabletRange::whole_table(1),
            1,
            Arc::new(MemReaderProvider::new()),
            option,
        );
        assert_eq!(tablet.cache_data_version(), 0);

        for major in [4, 5] {
            tablet
                .add_cache_node(CompactCacheNode::new(FrozenVersionRange {
                    major_version: major,
                    minor_version_start: 1,
                    minor_version_end: 3,
                }))
                .unwrap();
        }
        assert!(matches!(
            tablet.add_cache_node(CompactCacheNode::new(FrozenVersionRange::default())),
            Err(TabletError::InvalidState { .. })
        ));
        assert_eq!(tablet.cache_node_count(), 2);
        assert_eq!(tablet.cache_nodes().count(), 2);
        assert_eq!(tablet.cache_data_version(), 5);
        assert_eq!(tablet.cache_version_range().unwrap().minor_version_end, 3);

        assert!(tablet.end_loading().is_err());
        assert!(tablet.try_begin_loading());
        assert!(!tablet.try_begin_loading());
        tablet.end_loading().unwrap();
        assert!(!tablet.is_cache_loading());
    }

    #[test]
    fn ref_count_never_underflows() {
        let tablet = tablet_with(Arc::new(MemReaderProvider::new()), &[]);
        assert_eq!(tablet.inc_ref(), 1);
        assert_eq!(tablet.dec_ref().unwrap(), 0);
        assert!(matches!(
            tablet.dec_ref(),
            Err(TabletError::RefCountUnderflow { .. })
        ));
        assert_eq!(tablet.ref_count(), 0);
    }

    #[test]
    fn tablet_record_round_trip() {
        let id = ReaderId::new(12, 3);
        let provider: Arc<dyn ReaderProvider> = Arc::new(MemReaderProvider::new());
        let option = Arc::new(TabletOption::default());
        let mut tablet = Tablet::new(
            TabletRange::whole_table(1),
            0,
            provider.clone(),
            option.clone(),
        );
        tablet.set_range(TabletRange::new(
            42,
            KeyRange::new(
                Bound::Excluded(RowKey::from("apple")),
                Bound::Included(RowKey::from("melon")),
            ),
        ));
        tablet.set_data_version(8);
        tablet.add_reader_by_id(id).unwrap();
        tablet.set_merged(true);
        tablet.set_with_next_brother(true);
        tablet.inc_merge_count();
        tablet.set_disk_no(3);
        tablet.set_extend_info(ExtendInfo {
            row_count: 10,
            occupy_size: 100,
            checksum: 77,
            last_expire_version: 2,
            sequence_num: 5,
            storage_format_version: 2,
        });

        let mut buf = Vec::new();
        tablet.encode(&mut buf).unwrap();
        let decoded = Tablet::decode(&mut Cursor::new(&buf), provider, option).unwrap();

        assert_eq!(decoded.range(), tablet.range());
        assert_eq!(decoded.data_version(), 8);
        assert_eq!(decoded.reader_ids(), vec![id]);
        assert!(decoded.is_merged());
        assert!(decoded.is_with_next_brother());
        assert!(!decoded.is_removed());
        assert_eq!(decoded.merge_count(), 1);
        assert_eq!(decoded.disk_no(), 3);
        assert_eq!(decoded.extend_info(), tablet.extend_info());
        assert!(!decoded.is_loaded());
    }

    #[test]
    fn short_key_stream_is_malformed() {
        let mut tablet = tablet_with(Arc::new(MemReaderProvider::new()), &[]);
        let info = RangeInfo {
            start_key_size: 4,
            end_key_size: 4,
            ..RangeInfo::default()
        };
        assert!(matches!(
            tablet.set_range_by_info(&info, b"abc"),
            Err(TabletError::Malformed(_))
        ));
    }

    #[test]
    fn negative_merge_count_is_malformed() {
        let provider: Arc<dyn ReaderProvider> = Arc::new(MemReaderProvider::new());
        let option = Arc::new(TabletOption::default());
        let tablet = Tablet::new(TabletRange::whole_table(1), 2, provider.clone(), option.clone());

        let mut buf = Vec::new();
        tablet.encode(&mut buf).unwrap();
        // range info, two empty keys, data_version and disk_no precede it
        let at = meta::RANGE_INFO_SIZE + 8 + 4;
        buf[at..at + 4].copy_from_slice(&(-3i32).to_be_bytes());

        assert!(matches!(
            Tablet::decode(&mut Cursor::new(&buf), provider, option),
            Err(TabletError::Malformed(_))
        ));
    }
}
