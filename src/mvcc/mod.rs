//! Snapshot version ranges used to pick a tablet generation.

use std::{fmt, ops::Bound};

/// Version range a scan is bound to.
///
/// Only the end bound matters for generation selection; the start bound is
/// kept so callers can forward it to incremental readers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VersionRange {
    /// Oldest version of interest.
    pub start: Bound<i64>,
    /// Newest version of interest.
    pub end: Bound<i64>,
}

impl VersionRange {
    /// Range from explicit bounds.
    pub const fn new(start: Bound<i64>, end: Bound<i64>) -> Self {
        Self { start, end }
    }

    /// Range reading the newest generation.
    pub const fn latest() -> Self {
        Self::new(Bound::Unbounded, Bound::Unbounded)
    }

    /// Range reading exactly the snapshot at `version`.
    pub const fn at(version: i64) -> Self {
        Self::new(Bound::Unbounded, Bound::Included(version))
    }

    /// Snapshot version the scan reads.
    ///
    /// `i64::MAX` stands for "newest generation"; a negative result means the
    /// range selects no version at all.
    pub fn query_version(&self) -> i64 {
        match self.end {
            Bound::Unbounded => i64::MAX,
            Bound::Included(version) => version,
            Bound::Excluded(version) => version.saturating_sub(1),
        }
    }
}

impl Default for VersionRange {
    fn default() -> Self {
        Self::latest()
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.start {
            Bound::Unbounded => f.write_str("(MIN")?,
            Bound::Included(version) => write!(f, "[{version}")?,
            Bound::Excluded(version) => write!(f, "({version}")?,
        }
        f.write_str(", ")?;
        match self.end {
            Bound::Unbounded => f.write_str("MAX)"),
            Bound::Included(version) => write!(f, "{version}]"),
            Bound::Excluded(version) => write!(f, "{version})"),
        }
    }
}
