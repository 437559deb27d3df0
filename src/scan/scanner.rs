use crate::{
    reader::{CompactScanner, FormatKind, LegacyScanner, ReaderError, RowIterator},
    row::{Row, RowDesc, RowKey},
};

/// Scanner bound by a `TabletScan`, one variant per storage format.
#[derive(Debug)]
pub(crate) enum RowScanner {
    Legacy(LegacyScanner),
    Compact(CompactScanner),
}

impl RowScanner {
    pub(crate) fn kind(&self) -> FormatKind {
        match self {
            RowScanner::Legacy(_) => FormatKind::Legacy,
            RowScanner::Compact(_) => FormatKind::Compact,
        }
    }
}

impl RowIterator for RowScanner {
    fn next_row(&mut self) -> Result<Option<(RowKey, Row)>, ReaderError> {
        match self {
            RowScanner::Legacy(scanner) => scanner.next_row(),
            RowScanner::Compact(scanner) => scanner.next_row(),
        }
    }

    fn row_desc(&self) -> &RowDesc {
        match self {
            RowScanner::Legacy(scanner) => scanner.row_desc(),
            RowScanner::Compact(scanner) => scanner.row_desc(),
        }
    }
}
