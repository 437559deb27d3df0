//! Test-only builders for readers and providers.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use arrow::{
    array::{ArrayRef, Int64Array, RecordBatch, StringArray},
    datatypes::{DataType, Field, Schema},
};

use crate::{
    reader::{
        CompactReader, LegacyReader, MemReaderProvider, ReaderError, ReaderId, ReaderProvider,
        StorageReader,
    },
    row::{Datum, Row, RowDesc, RowKey},
};

/// `(id Utf8, v Int64)`, the key column first.
pub(crate) fn sample_desc() -> RowDesc {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("v", DataType::Int64, false),
    ]))
}

pub(crate) fn sample_row(key: &str, value: i64) -> Row {
    Row::new(vec![Datum::Utf8(key.to_string()), Datum::Int64(value)])
}

/// Legacy reader whose row `i` is `(keys[i], i)`.
pub(crate) fn legacy_reader(id: ReaderId, keys: &[&str]) -> LegacyReader {
    LegacyReader::new(
        id,
        sample_desc(),
        keys.iter()
            .enumerate()
            .map(|(i, key)| (RowKey::from(*key), sample_row(key, i as i64))),
    )
    .unwrap()
}

/// Batch whose row `i` is `(keys[i], i)`; `keys` must be ascending.
pub(crate) fn sample_batch(keys: &[&str]) -> RecordBatch {
    RecordBatch::try_new(
        sample_desc(),
        vec![
            Arc::new(StringArray::from(keys.to_vec())) as ArrayRef,
            Arc::new(Int64Array::from_iter_values(0..keys.len() as i64)) as ArrayRef,
        ],
    )
    .unwrap()
}

/// Compact reader holding the same rows as [`legacy_reader`] for `keys`.
pub(crate) fn compact_reader(id: ReaderId, keys: &[&str]) -> CompactReader {
    CompactReader::new(id, sample_batch(keys)).unwrap()
}

/// Provider that counts how often readers are opened.
#[derive(Debug, Default)]
pub(crate) struct CountingProvider {
    pub(crate) inner: MemReaderProvider,
    pub(crate) opens: AtomicUsize,
}

impl ReaderProvider for CountingProvider {
    fn open(&self, id: &ReaderId) -> Result<StorageReader, ReaderError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.inner.open(id)
    }
}
