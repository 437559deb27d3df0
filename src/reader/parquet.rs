use std::{
    fs::{self, File},
    io,
    path::{Path, PathBuf},
};

use ::parquet::arrow::{arrow_reader::ParquetRecordBatchReaderBuilder, ArrowWriter};
use arrow::{array::RecordBatch, compute::concat_batches};

use super::{CompactReader, ReaderError, ReaderId, ReaderProvider, StorageReader};
use crate::observability::log_debug;

/// Opens compact readers from Parquet files under a root directory.
///
/// The file for identity `id` is `<root>/<raw id as 16 hex digits>.parquet`.
#[derive(Debug, Clone)]
pub struct ParquetReaderProvider {
    root: PathBuf,
}

impl ParquetReaderProvider {
    /// Provider reading files below `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of the reader files.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the file backing `id`.
    pub fn path(&self, id: &ReaderId) -> PathBuf {
        self.root.join(format!("{:016x}.parquet", id.raw()))
    }

    /// Persist `batch` as the compact reader `id`.
    ///
    /// The batch is validated the same way opening it would be, so a file is
    /// never written that could not be read back.
    pub fn write(&self, id: &ReaderId, batch: &RecordBatch) -> Result<(), ReaderError> {
        CompactReader::new(*id, batch.clone())?;

        fs::create_dir_all(&self.root)?;
        let file = File::create(self.path(id))?;
        let mut writer = ArrowWriter::try_new(file, batch.schema(), None)?;
        writer.write(batch)?;
        writer.close()?;
        Ok(())
    }
}

impl ReaderProvider for ParquetReaderProvider {
    fn open(&self, id: &ReaderId) -> Result<StorageReader, ReaderError> {
        let path = self.path(id);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(ReaderError::NotFound(*id))
            }
            Err(err) => return Err(err.into()),
        };

        let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
        let schema = builder.schema().clone();
        let batches = builder.build()?.collect::<Result<Vec<_>, _>>()?;
        let batch = concat_batches(&schema, &batches)?;

        log_debug!(
            component = "reader",
            event = "parquet_reader_opened",
            reader = %id,
            path = %path.display(),
            rows = batch.num_rows(),
        );
        Ok(CompactReader::new(*id, batch)?.into())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::test_util::sample_batch;

    #[test]
    fn written_batches_open_as_compact_readers() {
        let temp_dir = TempDir::new().unwrap();
        let provider = ParquetReaderProvider::new(temp_dir.path());
        let id = ReaderId::new(3, 1);

        provider.write(&id, &sample_batch(&["a", "b", "c"])).unwrap();
        let reader = provider.open(&id).unwrap();

        let compact = reader.as_compact().unwrap();
        assert_eq!(compact.row_count(), 3);
        assert_eq!(compact.id(), id);
        assert!(provider.path(&id).exists());
    }

    #[test]
    fn missing_file_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let provider = ParquetReaderProvider::new(temp_dir.path());
        let id = ReaderId::new(4, 0);

        assert!(matches!(provider.open(&id), Err(ReaderError::NotFound(missing)) if missing == id));
    }
}
