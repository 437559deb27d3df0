use std::{ops::Bound, sync::Arc};

use arrow::{array::RecordBatch, datatypes::DataType};

use super::{ReaderError, ReaderId, RowIterator, ScanSpec};
use crate::{
    range::KeyRange,
    row::{check_schema, datum_at, key_at, project_desc, row_checksum, Row, RowDesc, RowKey},
};

/// Columnar reader over one Arrow record batch.
///
/// Column 0 is the row key (`Utf8` or `Binary`, non-null, strictly
/// ascending). Rows returned by the reader include the key column.
#[derive(Debug)]
pub struct CompactReader {
    id: ReaderId,
    batch: RecordBatch,
    occupy_size: u64,
    checksum: u64,
}

impl CompactReader {
    /// Wrap `batch`, validating its key column.
    pub fn new(id: ReaderId, batch: RecordBatch) -> Result<Self, ReaderError> {
        let schema = batch.schema();
        check_schema(&schema)?;
        match schema.fields().first().map(|field| field.data_type()) {
            Some(DataType::Utf8) | Some(DataType::Binary) => {}
            other => {
                return Err(ReaderError::Corrupted {
                    id,
                    reason: format!("key column must be Utf8 or Binary, found {other:?}"),
                })
            }
        }

        let keys = batch.column(0);
        let mut previous: Option<&[u8]> = None;
        for index in 0..batch.num_rows() {
            let Some(key) = key_at(keys, index) else {
                return Err(ReaderError::Corrupted {
                    id,
                    reason: format!("null row key at row {index}"),
                });
            };
            if previous.is_some_and(|previous| previous >= key) {
                return Err(ReaderError::Corrupted {
                    id,
                    reason: format!("row keys not strictly ascending at row {index}"),
                });
            }
            previous = Some(key);
        }

        let mut reader = Self {
            id,
            occupy_size: batch.get_array_memory_size() as u64,
            batch,
            checksum: 0,
        };
        let mut checksum = 0u64;
        for index in 0..reader.batch.num_rows() {
            let row = reader.row(index)?;
            checksum = checksum.wrapping_add(row_checksum(&reader.key(index), &row));
        }
        reader.checksum = checksum;
        Ok(reader)
    }

    /// Identity the reader was opened from.
    pub fn id(&self) -> ReaderId {
        self.id
    }

    /// Descriptor of the stored rows.
    pub fn row_desc(&self) -> &RowDesc {
        self.batch.schema_ref()
    }

    /// Number of rows stored.
    pub fn row_count(&self) -> u64 {
        self.batch.num_rows() as u64
    }

    /// Bytes held by the Arrow buffers.
    pub fn occupy_size(&self) -> u64 {
        self.occupy_size
    }

    /// Sum of per-row checksums.
    pub fn checksum(&self) -> u64 {
        self.checksum
    }

    /// Underlying record batch.
    pub fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    /// Point lookup.
    pub fn get(&self, key: &RowKey) -> Result<Option<Row>, ReaderError> {
        let index = self.seek(Bound::Included(key));
        if index < self.batch.num_rows() && self.key_bytes(index) == key.as_bytes() {
            self.row(index).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Forward scanner over `spec`.
    pub fn scan(self: &Arc<Self>, spec: ScanSpec) -> Result<CompactScanner, ReaderError> {
        let desc = project_desc(self.row_desc(), spec.projection.as_deref())?;
        let next = if spec.range.is_empty() {
            self.batch.num_rows()
        } else {
            self.seek(spec.range.as_borrowed_bounds().0)
        };
        Ok(CompactScanner {
            reader: self.clone(),
            range: spec.range,
            projection: spec.projection,
            desc,
            next,
        })
    }

    fn key_bytes(&self, index: usize) -> &[u8] {
        key_at(self.batch.column(0), index).unwrap_or_default()
    }

    fn key(&self, index: usize) -> RowKey {
        RowKey::from(self.key_bytes(index))
    }

    fn row(&self, index: usize) -> Result<Row, ReaderError> {
        self.batch
            .columns()
            .iter()
            .map(|column| datum_at(column, index))
            .collect::<Result<Vec<_>, _>>()
            .map(Row::new)
    }

    /// Index of the first row satisfying the lower `bound`.
    fn seek(&self, bound: Bound<&RowKey>) -> usize {
        let (mut low, mut high) = (0, self.batch.num_rows());
        while low < high {
            let mid = low + (high - low) / 2;
            let key = self.key_bytes(mid);
            let before = match bound {
                Bound::Unbounded => false,
                Bound::Included(target) => key < target.as_bytes(),
                Bound::Excluded(target) => key <= target.as_bytes(),
            };
            if before {
                low = mid + 1;
            } else {
                high = mid;
            }
        }
        low
    }
}

/// Forward scanner over a [`CompactReader`].
#[derive(Debug)]
pub struct CompactScanner {
    reader: Arc<CompactReader>,
    range: KeyRange<RowKey>,
    projection: Option<Arc<[usize]>>,
    desc: RowDesc,
    next: usize,
}

impl RowIterator for CompactScanner {
    fn next_row(&mut self) -> Result<Option<(RowKey, Row)>, ReaderError> {
        let total = self.reader.batch.num_rows();
        if self.next >= total {
            return Ok(None);
        }
        let key = self.reader.key(self.next);
        if !self.range.before_end(&key) {
            self.next = total;
            return Ok(None);
        }

        let row = self.reader.row(self.next)?;
        let row = match &self.projection {
            Some(projection) => row.project(projection),
            None => row,
        };
        self.next += 1;
        Ok(Some((key, row)))
    }

    fn row_desc(&self) -> &RowDesc {
        &self.desc
    }
}
