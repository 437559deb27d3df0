//! Multi-version tablet directory contract and the scoped acquisition guard.

mod image;

use std::{fmt, ops::Deref, sync::Arc};

use thiserror::Error;

pub use self::image::TabletImage;
use crate::{
    observability::log_error,
    range::TabletRange,
    tablet::{Tablet, TabletError},
};

/// Direction a scan walks its range.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ScanDirection {
    /// Ascending key order.
    #[default]
    Forward,
}

/// Resolves a key range and query version to the live tablet serving it.
///
/// Every tablet returned by [`acquire`](TabletDirectory::acquire) has been
/// counted once and must be handed back to
/// [`release`](TabletDirectory::release) exactly once. [`TabletHandle`] does
/// that bookkeeping.
pub trait TabletDirectory: Send + Sync {
    /// Tablet of the newest generation not above `query_version` whose range
    /// holds the start of `range`.
    fn acquire(
        &self,
        range: &TabletRange,
        direction: ScanDirection,
        query_version: i64,
    ) -> Result<Arc<Tablet>, DirectoryError>;

    /// Give back one acquisition of `tablet`.
    fn release(&self, tablet: &Arc<Tablet>) -> Result<(), DirectoryError>;
}

/// Errors for `TabletDirectory`
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// No generation or no tablet serves the request.
    #[error("no tablet for {range} at version {query_version}")]
    NotFound {
        /// Requested range.
        range: TabletRange,
        /// Requested version.
        query_version: i64,
    },
    /// A tablet with the same range already exists in the generation.
    #[error("tablet {range} already registered at version {data_version}")]
    Duplicate {
        /// Range of the rejected tablet.
        range: TabletRange,
        /// Its generation.
        data_version: i64,
    },
    /// The tablet rejected the reference change.
    #[error("directory tablet error: {0}")]
    Tablet(#[from] TabletError),
}

/// A counted acquisition of a tablet, released when the handle goes away.
pub struct TabletHandle {
    tablet: Arc<Tablet>,
    directory: Arc<dyn TabletDirectory>,
    released: bool,
}

impl TabletHandle {
    /// Acquire through `directory`; the tablet is released when the handle is
    /// dropped or explicitly [`release`](TabletHandle::release)d.
    pub fn acquire(
        directory: Arc<dyn TabletDirectory>,
        range: &TabletRange,
        direction: ScanDirection,
        query_version: i64,
    ) -> Result<Self, DirectoryError> {
        let tablet = directory.acquire(range, direction, query_version)?;
        Ok(Self {
            tablet,
            directory,
            released: false,
        })
    }

    /// The acquired tablet.
    pub fn tablet(&self) -> &Arc<Tablet> {
        &self.tablet
    }

    /// Release now and surface the directory's answer.
    pub fn release(mut self) -> Result<(), DirectoryError> {
        self.released = true;
        self.directory.release(&self.tablet)
    }
}

impl Deref for TabletHandle {
    type Target = Tablet;

    fn deref(&self) -> &Tablet {
        &self.tablet
    }
}

impl Drop for TabletHandle {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(err) = self.directory.release(&self.tablet) {
            log_error!(
                component = "directory",
                event = "tablet_release_failed",
                range = %self.tablet.range(),
                data_version = self.tablet.data_version(),
                error = %err,
            );
        }
    }
}

impl fmt::Debug for TabletHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TabletHandle")
            .field("tablet", &self.tablet)
            .field("released", &self.released)
            .finish()
    }
}
