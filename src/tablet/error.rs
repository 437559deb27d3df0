use std::io;

use thiserror::Error;

use crate::{
    range::TabletRange,
    reader::{ReaderError, ReaderId},
};

/// Errors for `Tablet`
#[derive(Debug, Error)]
pub enum TabletError {
    /// A reader could not be opened; the tablet stays unloaded and a later
    /// call retries.
    #[error("tablet {range} version {data_version}: load of reader {reader} failed: {source}")]
    Load {
        /// Range of the tablet.
        range: TabletRange,
        /// Generation of the tablet.
        data_version: i64,
        /// Reader that failed to open.
        reader: ReaderId,
        /// Provider failure.
        #[source]
        source: ReaderError,
    },
    /// The caller's output capacity is smaller than the reader count.
    #[error("tablet {range} holds {required} readers, caller capacity is {capacity}")]
    SizeOverflow {
        /// Range of the tablet.
        range: TabletRange,
        /// Readers available.
        required: usize,
        /// Readers the caller can accept.
        capacity: usize,
    },
    /// The call is not allowed in the tablet's current state.
    #[error("tablet {range} invalid state: {reason}")]
    InvalidState {
        /// Range of the tablet.
        range: TabletRange,
        /// What was violated.
        reason: String,
    },
    /// The reader identity is not part of the tablet.
    #[error("reader {reader} not found in tablet {range}")]
    NotFound {
        /// Range of the tablet.
        range: TabletRange,
        /// Requested identity.
        reader: ReaderId,
    },
    /// More releases than acquisitions.
    #[error("tablet {range} version {data_version}: reference count underflow")]
    RefCountUnderflow {
        /// Range of the tablet.
        range: TabletRange,
        /// Generation of the tablet.
        data_version: i64,
    },
    /// A persisted tablet record could not be read or written.
    #[error("tablet record io error: {0}")]
    Io(#[from] io::Error),
    /// A persisted tablet record is inconsistent.
    #[error("tablet record malformed: {0}")]
    Malformed(String),
}
