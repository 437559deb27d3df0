//! In-memory compaction cache attached to a tablet.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, PoisonError, RwLock,
    },
    vec,
};

use crossbeam_skiplist::SkipMap;

use crate::row::{Row, RowKey};

/// Frozen memtable versions a cache node was built from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrozenVersionRange {
    /// Major (data) version the minor versions apply to.
    pub major_version: i64,
    /// First minor version included.
    pub minor_version_start: i64,
    /// Last minor version included.
    pub minor_version_end: i64,
}

/// Compacted rows held in memory until they are materialized on disk.
#[derive(Debug)]
pub struct CompactCacheNode {
    version_range: FrozenVersionRange,
    rows: SkipMap<RowKey, Row>,
}

impl CompactCacheNode {
    /// Empty node for `version_range`.
    pub fn new(version_range: FrozenVersionRange) -> Self {
        Self {
            version_range,
            rows: SkipMap::new(),
        }
    }

    /// Versions the node was built from.
    pub fn version_range(&self) -> FrozenVersionRange {
        self.version_range
    }

    /// Insert or replace the row under `key`.
    pub fn insert(&self, key: RowKey, row: Row) {
        self.rows.insert(key, row);
    }

    /// Point lookup.
    pub fn get(&self, key: &RowKey) -> Option<Row> {
        self.rows.get(key).map(|entry| entry.value().clone())
    }

    /// Number of cached rows.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Cached rows in key order.
    pub fn rows(&self) -> impl Iterator<Item = (RowKey, Row)> + '_ {
        self.rows
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
    }
}

/// Forward iterator over a snapshot of a tablet's cache nodes.
pub type CacheNodes = vec::IntoIter<Arc<CompactCacheNode>>;

/// Outcome of appending to a full list.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct CacheFull {
    pub(crate) limit: usize,
}

/// Append-only node sequence plus the single-loader gate.
#[derive(Debug)]
pub(crate) struct CompactCacheList {
    nodes: RwLock<Vec<Arc<CompactCacheNode>>>,
    loading: AtomicBool,
    limit: usize,
}

impl CompactCacheList {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            nodes: RwLock::new(Vec::new()),
            loading: AtomicBool::new(false),
            limit,
        }
    }

    /// Append `node`, returning the new node count.
    pub(crate) fn push(&self, node: Arc<CompactCacheNode>) -> Result<usize, CacheFull> {
        let mut nodes = self.nodes.write().unwrap_or_else(PoisonError::into_inner);
        if nodes.len() >= self.limit {
            return Err(CacheFull { limit: self.limit });
        }
        nodes.push(node);
        Ok(nodes.len())
    }

    pub(crate) fn iter(&self) -> CacheNodes {
        self.nodes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .into_iter()
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub(crate) fn newest(&self) -> Option<Arc<CompactCacheNode>> {
        self.nodes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }

    /// `idle -> loading`; false when another loader holds the gate.
    pub(crate) fn try_begin_loading(&self) -> bool {
        self.loading
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// `loading -> idle`; false when the gate was not held.
    pub(crate) fn end_loading(&self) -> bool {
        self.loading
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn is_loading(&self) -> bool {
        self.loading.load(Ordering::Acquire)
    }
}
