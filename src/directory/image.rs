use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, PoisonError, RwLock},
};

use super::{DirectoryError, ScanDirection, TabletDirectory};
use crate::{
    observability::{log_debug, log_info},
    range::TabletRange,
    tablet::Tablet,
};

/// In-memory multi-version directory.
///
/// Generations are keyed by data version. Dropping a generation unlinks its
/// tablets at once; tablets still held by scans are parked as retired and
/// reclaimed by the release that brings their count to zero.
#[derive(Debug, Default)]
pub struct TabletImage {
    generations: RwLock<BTreeMap<i64, Vec<Arc<Tablet>>>>,
    retired: Mutex<Vec<Arc<Tablet>>>,
}

impl TabletImage {
    /// Empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `tablet` in the generation of its data version.
    pub fn add_tablet(&self, tablet: Tablet) -> Result<Arc<Tablet>, DirectoryError> {
        let mut generations = self
            .generations
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let generation = generations.entry(tablet.data_version()).or_default();
        if generation
            .iter()
            .any(|existing| existing.range() == tablet.range())
        {
            return Err(DirectoryError::Duplicate {
                range: tablet.range().clone(),
                data_version: tablet.data_version(),
            });
        }

        let tablet = Arc::new(tablet);
        generation.push(tablet.clone());
        log_debug!(
            component = "directory",
            event = "tablet_added",
            range = %tablet.range(),
            data_version = tablet.data_version(),
        );
        Ok(tablet)
    }

    /// Unlink every tablet of generation `data_version`, returning how many
    /// were unlinked. Tablets still referenced are kept until released.
    pub fn drop_version(&self, data_version: i64) -> usize {
        let Some(tablets) = self
            .generations
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&data_version)
        else {
            return 0;
        };

        let unlinked = tablets.len();
        let mut retired = self.retired.lock().unwrap_or_else(PoisonError::into_inner);
        retired.extend(tablets.into_iter().filter(|tablet| tablet.ref_count() > 0));
        log_info!(
            component = "directory",
            event = "generation_dropped",
            data_version,
            unlinked,
            retired = retired.len(),
        );
        unlinked
    }

    /// Data versions currently linked, ascending.
    pub fn versions(&self) -> Vec<i64> {
        self.generations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect()
    }

    /// Newest linked data version.
    pub fn latest_version(&self) -> Option<i64> {
        self.generations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .next_back()
            .copied()
    }

    /// Unlinked tablets still waiting for their last release.
    pub fn retired_count(&self) -> usize {
        self.retired
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn reclaim(&self) {
        let mut retired = self.retired.lock().unwrap_or_else(PoisonError::into_inner);
        retired.retain(|tablet| {
            if tablet.ref_count() > 0 {
                return true;
            }
            log_debug!(
                component = "directory",
                event = "tablet_reclaimed",
                range = %tablet.range(),
                data_version = tablet.data_version(),
            );
            false
        });
    }
}

impl TabletDirectory for TabletImage {
    fn acquire(
        &self,
        range: &TabletRange,
        direction: ScanDirection,
        query_version: i64,
    ) -> Result<Arc<Tablet>, DirectoryError> {
        let not_found = || DirectoryError::NotFound {
            range: range.clone(),
            query_version,
        };

        let generations = self
            .generations
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let (_, tablets) = generations
            .range(..=query_version)
            .next_back()
            .ok_or_else(not_found)?;
        let tablet = match direction {
            ScanDirection::Forward => tablets
                .iter()
                .find(|tablet| tablet.range().covers_start_of(range))
                .ok_or_else(not_found)?,
        };

        // counted while the generation is still linked
        tablet.inc_ref();
        Ok(tablet.clone())
    }

    fn release(&self, tablet: &Arc<Tablet>) -> Result<(), DirectoryError> {
        if tablet.dec_ref()? == 0 {
            self.reclaim();
        }
        Ok(())
    }
}
