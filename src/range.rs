//! Key ranges shared by tablets, directories and scans.

use std::{cmp::Ordering, fmt, ops::Bound};

use crate::row::RowKey;

/// Row key interval with owned bounds; tablets and scans both use it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyRange<K> {
    /// Lower bound.
    pub start: Bound<K>,
    /// Upper bound.
    pub end: Bound<K>,
}

impl<K> KeyRange<K> {
    /// Every key.
    pub fn all() -> Self {
        Self {
            start: Bound::Unbounded,
            end: Bound::Unbounded,
        }
    }

    /// Range between `start` and `end`.
    pub fn new(start: Bound<K>, end: Bound<K>) -> Self {
        Self { start, end }
    }

    /// Borrowed view of the bounds suitable for ordered map range queries.
    pub(crate) fn as_borrowed_bounds(&self) -> (Bound<&K>, Bound<&K>) {
        (self.start.as_ref(), self.end.as_ref())
    }
}

impl<K: Ord> KeyRange<K> {
    /// Whether this range contains `key`.
    pub fn contains(&self, key: &K) -> bool {
        self.after_start(key) && self.before_end(key)
    }

    /// Whether `key` satisfies the start bound.
    pub(crate) fn after_start(&self, key: &K) -> bool {
        match &self.start {
            Bound::Unbounded => true,
            Bound::Included(bound) => key >= bound,
            Bound::Excluded(bound) => key > bound,
        }
    }

    /// Whether `key` satisfies the end bound.
    pub(crate) fn before_end(&self, key: &K) -> bool {
        match &self.end {
            Bound::Unbounded => true,
            Bound::Included(bound) => key <= bound,
            Bound::Excluded(bound) => key < bound,
        }
    }

    /// Whether the range can hold no key at all.
    pub fn is_empty(&self) -> bool {
        is_empty_range(&self.start, &self.end)
    }

    /// Whether this range and `other` share at least one key.
    pub fn intersects(&self, other: &KeyRange<K>) -> bool {
        let start = max_lower(&self.start, &other.start);
        let end = min_upper(&self.end, &other.end);
        !is_empty_range(start, end)
    }

    /// Whether the first key a forward scan over `scan` would visit falls
    /// inside this range.
    pub fn covers_start_of(&self, scan: &KeyRange<K>) -> bool {
        if scan.is_empty() || self.is_empty() {
            return false;
        }
        let starts_before = cmp_lower(&self.start, &scan.start) != Ordering::Greater;
        let ends_after = match (&scan.start, &self.end) {
            (_, Bound::Unbounded) => true,
            // the scan starts at the smallest key, which any non-empty range
            // with an unbounded start holds
            (Bound::Unbounded, _) => true,
            (Bound::Included(key), Bound::Included(end)) => key <= end,
            (Bound::Included(key), Bound::Excluded(end)) => key < end,
            (Bound::Excluded(key), Bound::Included(end)) => key < end,
            (Bound::Excluded(key), Bound::Excluded(end)) => key < end,
        };
        starts_before && ends_after
    }
}

impl<K: fmt::Display> fmt::Display for KeyRange<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.start {
            Bound::Unbounded => f.write_str("(MIN")?,
            Bound::Included(key) => write!(f, "[{key}")?,
            Bound::Excluded(key) => write!(f, "({key}")?,
        }
        f.write_str("; ")?;
        match &self.end {
            Bound::Unbounded => f.write_str("MAX)"),
            Bound::Included(key) => write!(f, "{key}]"),
            Bound::Excluded(key) => write!(f, "{key})"),
        }
    }
}

/// Border flag bits of the persisted range record.
pub struct BorderFlag;

impl BorderFlag {
    /// Start key is part of the range.
    pub const INCLUSIVE_START: u8 = 0x01;
    /// End key is part of the range.
    pub const INCLUSIVE_END: u8 = 0x02;
    /// Range starts at the smallest possible key.
    pub const MIN_VALUE: u8 = 0x04;
    /// Range ends at the greatest possible key.
    pub const MAX_VALUE: u8 = 0x08;
}

/// Key-space boundary of a tablet inside one table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TabletRange {
    /// Table the range belongs to.
    pub table_id: u64,
    /// Row key bounds.
    pub keys: KeyRange<RowKey>,
}

impl TabletRange {
    /// Range covering `keys` of `table_id`.
    pub fn new(table_id: u64, keys: KeyRange<RowKey>) -> Self {
        Self { table_id, keys }
    }

    /// Range covering every key of `table_id`.
    pub fn whole_table(table_id: u64) -> Self {
        Self::new(table_id, KeyRange::all())
    }

    /// Whether this range contains `key`.
    pub fn contains(&self, key: &RowKey) -> bool {
        self.keys.contains(key)
    }

    /// Whether a forward scan over `scan` starts inside this range.
    pub fn covers_start_of(&self, scan: &TabletRange) -> bool {
        self.table_id == scan.table_id && self.keys.covers_start_of(&scan.keys)
    }

    /// Encoded border flag byte of the range.
    pub fn border_flag(&self) -> u8 {
        let mut flag = 0;
        match &self.keys.start {
            Bound::Unbounded => flag |= BorderFlag::MIN_VALUE,
            Bound::Included(_) => flag |= BorderFlag::INCLUSIVE_START,
            Bound::Excluded(_) => {}
        }
        match &self.keys.end {
            Bound::Unbounded => flag |= BorderFlag::MAX_VALUE,
            Bound::Included(_) => flag |= BorderFlag::INCLUSIVE_END,
            Bound::Excluded(_) => {}
        }
        flag
    }

    /// Start key bytes, empty when unbounded.
    pub fn start_key(&self) -> &[u8] {
        bound_key(&self.keys.start)
    }

    /// End key bytes, empty when unbounded.
    pub fn end_key(&self) -> &[u8] {
        bound_key(&self.keys.end)
    }

    /// Rebuild a range from its border flag and key bytes.
    pub fn from_parts(table_id: u64, border_flag: u8, start_key: &[u8], end_key: &[u8]) -> Self {
        let start = if border_flag & BorderFlag::MIN_VALUE != 0 {
            Bound::Unbounded
        } else if border_flag & BorderFlag::INCLUSIVE_START != 0 {
            Bound::Included(RowKey::from(start_key))
        } else {
            Bound::Excluded(RowKey::from(start_key))
        };
        let end = if border_flag & BorderFlag::MAX_VALUE != 0 {
            Bound::Unbounded
        } else if border_flag & BorderFlag::INCLUSIVE_END != 0 {
            Bound::Included(RowKey::from(end_key))
        } else {
            Bound::Excluded(RowKey::from(end_key))
        };
        Self::new(table_id, KeyRange::new(start, end))
    }
}

impl fmt::Display for TabletRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "table_id={} {}", self.table_id, self.keys)
    }
}

fn bound_key(bound: &Bound<RowKey>) -> &[u8] {
    match bound {
        Bound::Unbounded => &[],
        Bound::Included(key) | Bound::Excluded(key) => key.as_bytes(),
    }
}

// as lower bounds, Included(x) sorts before Excluded(x)
fn cmp_lower<K: Ord>(a: &Bound<K>, b: &Bound<K>) -> Ordering {
    use Bound as B;
    match (a, b) {
        (B::Unbounded, B::Unbounded) => Ordering::Equal,
        (B::Unbounded, _) => Ordering::Less,
        (_, B::Unbounded) => Ordering::Greater,
        (B::Included(x), B::Included(y)) => x.cmp(y),
        (B::Included(x), B::Excluded(y)) => match x.cmp(y) {
            Ordering::Equal => Ordering::Less,
            other => other,
        },
        (B::Excluded(x), B::Included(y)) => match x.cmp(y) {
            Ordering::Equal => Ordering::Greater,
            other => other,
        },
        (B::Excluded(x), B::Excluded(y)) => x.cmp(y),
    }
}

// as upper bounds, Excluded(x) sorts before Included(x)
fn cmp_upper<K: Ord>(a: &Bound<K>, b: &Bound<K>) -> Ordering {
    use Bound as B;
    match (a, b) {
        (B::Unbounded, B::Unbounded) => Ordering::Equal,
        (B::Unbounded, _) => Ordering::Greater,
        (_, B::Unbounded) => Ordering::Less,
        (B::Included(x), B::Included(y)) => x.cmp(y),
        (B::Included(x), B::Excluded(y)) => match x.cmp(y) {
            Ordering::Equal => Ordering::Greater,
            other => other,
        },
        (B::Excluded(x), B::Included(y)) => match x.cmp(y) {
            Ordering::Equal => Ordering::Less,
            other => other,
        },
        (B::Excluded(x), B::Excluded(y)) => x.cmp(y),
    }
}

fn max_lower<'a, K: Ord>(a: &'a Bound<K>, b: &'a Bound<K>) -> &'a Bound<K> {
    if cmp_lower(a, b) == Ordering::Greater {
        a
    } else {
        b
    }
}

fn min_upper<'a, K: Ord>(a: &'a Bound<K>, b: &'a Bound<K>) -> &'a Bound<K> {
    if cmp_upper(a, b) == Ordering::Less {
        a
    } else {
        b
    }
}

fn is_empty_range<K: Ord>(start: &Bound<K>, end: &Bound<K>) -> bool {
    use Bound as B;
    match (start, end) {
        (B::Unbounded, _) | (_, B::Unbounded) => false,
        (B::Included(a), B::Included(b)) => a > b,
        (B::Included(a), B::Excluded(b)) => a >= b,
        (B::Excluded(a), B::Included(b)) => a >= b,
        (B::Excluded(a), B::Excluded(b)) => a >= b,
    }
}
