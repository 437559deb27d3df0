use std::{ops::Bound, sync::Arc};

use crossbeam_skiplist::SkipMap;

use super::{ReaderError, ReaderId, RowIterator, ScanSpec};
use crate::{
    range::KeyRange,
    row::{check_schema, project_desc, row_checksum, Row, RowDesc, RowKey},
};

/// Row-oriented reader: every row is stored whole under its key.
#[derive(Debug)]
pub struct LegacyReader {
    id: ReaderId,
    desc: RowDesc,
    rows: SkipMap<RowKey, Row>,
    occupy_size: u64,
    checksum: u64,
}

impl LegacyReader {
    /// Build a reader over `rows`, which must match `desc` and carry unique
    /// keys.
    pub fn new(
        id: ReaderId,
        desc: RowDesc,
        rows: impl IntoIterator<Item = (RowKey, Row)>,
    ) -> Result<Self, ReaderError> {
        check_schema(&desc)?;

        let width = desc.fields().len();
        let map = SkipMap::new();
        let mut occupy_size = 0u64;
        let mut checksum = 0u64;
        for (key, row) in rows {
            if row.len() != width {
                return Err(ReaderError::Corrupted {
                    id,
                    reason: format!("row {key} has {} cells, expected {width}", row.len()),
                });
            }
            if map.contains_key(&key) {
                return Err(ReaderError::Corrupted {
                    id,
                    reason: format!("duplicate row key {key}"),
                });
            }
            occupy_size += (key.len() + row.occupy_size()) as u64;
            checksum = checksum.wrapping_add(row_checksum(&key, &row));
            map.insert(key, row);
        }

        Ok(Self {
            id,
            desc,
            rows: map,
            occupy_size,
            checksum,
        })
    }

    /// Identity the reader was opened from.
    pub fn id(&self) -> ReaderId {
        self.id
    }

    /// Descriptor of the stored rows.
    pub fn row_desc(&self) -> &RowDesc {
        &self.desc
    }

    /// Number of rows stored.
    pub fn row_count(&self) -> u64 {
        self.rows.len() as u64
    }

    /// Bytes occupied by keys and cells.
    pub fn occupy_size(&self) -> u64 {
        self.occupy_size
    }

    /// Sum of per-row checksums.
    pub fn checksum(&self) -> u64 {
        self.checksum
    }

    /// Point lookup.
    pub fn get(&self, key: &RowKey) -> Option<Row> {
        self.rows.get(key).map(|entry| entry.value().clone())
    }

    /// Forward scanner over `spec`.
    pub fn scan(self: &Arc<Self>, spec: ScanSpec) -> Result<LegacyScanner, ReaderError> {
        let desc = project_desc(&self.desc, spec.projection.as_deref())?;
        let exhausted = spec.range.is_empty();
        Ok(LegacyScanner {
            reader: self.clone(),
            range: spec.range,
            projection: spec.projection,
            desc,
            cursor: None,
            exhausted,
        })
    }
}

/// Forward scanner over a [`LegacyReader`].
///
/// Each step seeks past the last returned key, so the scanner holds no borrow
/// into the reader's map.
#[derive(Debug)]
pub struct LegacyScanner {
    reader: Arc<LegacyReader>,
    range: KeyRange<RowKey>,
    projection: Option<Arc<[usize]>>,
    desc: RowDesc,
    cursor: Option<RowKey>,
    exhausted: bool,
}

impl RowIterator for LegacyScanner {
    fn next_row(&mut self) -> Result<Option<(RowKey, Row)>, ReaderError> {
        if self.exhausted {
            return Ok(None);
        }
        let lower = match &self.cursor {
            Some(last) => Bound::Excluded(last),
            None => self.range.as_borrowed_bounds().0,
        };
        let Some(entry) = self.reader.rows.lower_bound(lower) else {
            self.exhausted = true;
            return Ok(None);
        };
        if !self.range.before_end(entry.key()) {
            self.exhausted = true;
            return Ok(None);
        }

        let key = entry.key().clone();
        let row = match &self.projection {
            Some(projection) => entry.value().project(projection),
            None => entry.value().clone(),
        };
        self.cursor = Some(key.clone());
        Ok(Some((key, row)))
    }

    fn row_desc(&self) -> &RowDesc {
        &self.desc
    }
}
