use crate::reader::COMPACT_FORMAT_VERSION;

/// Upper bound of reader identities a tablet may own.
pub const MAX_READERS_PER_TABLET: usize = 1;

/// Upper bound of compaction cache nodes attached to one tablet.
pub const MAX_COMPACT_CACHE_PER_TABLET: usize = 8;

/// Tunables shared by every tablet of a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabletOption {
    pub(crate) max_readers_per_tablet: usize,
    pub(crate) max_compact_cache_per_tablet: usize,
    pub(crate) compact_format_version: i16,
}

impl Default for TabletOption {
    fn default() -> Self {
        TabletOption {
            max_readers_per_tablet: MAX_READERS_PER_TABLET,
            max_compact_cache_per_tablet: MAX_COMPACT_CACHE_PER_TABLET,
            compact_format_version: COMPACT_FORMAT_VERSION,
        }
    }
}

impl TabletOption {
    /// Cap on reader identities registered through `Tablet::add_reader_by_id`.
    pub fn max_readers_per_tablet(self, max_readers_per_tablet: usize) -> Self {
        TabletOption {
            max_readers_per_tablet,
            ..self
        }
    }

    /// Cap on compaction cache nodes appended through `Tablet::add_cache_node`.
    pub fn max_compact_cache_per_tablet(self, max_compact_cache_per_tablet: usize) -> Self {
        TabletOption {
            max_compact_cache_per_tablet,
            ..self
        }
    }

    /// Storage format version from which tablets are scanned with the compact
    /// scanner.
    pub fn compact_format_version(self, compact_format_version: i16) -> Self {
        TabletOption {
            compact_format_version,
            ..self
        }
    }

    /// Configured reader identity cap.
    pub fn reader_limit(&self) -> usize {
        self.max_readers_per_tablet
    }

    /// Configured cache node cap.
    pub fn cache_node_limit(&self) -> usize {
        self.max_compact_cache_per_tablet
    }

    /// Configured compact format threshold.
    pub fn compact_threshold(&self) -> i16 {
        self.compact_format_version
    }

    /// Whether a tablet stamped with `format_version` uses the compact layout.
    pub fn is_compact(&self, format_version: i16) -> bool {
        format_version >= self.compact_format_version
    }
}
