use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info, warn};

use crate::error::SinkError;
use crate::model::JobOffer;
use crate::store::OfferStore;

/// Destination for the offers a run collects.
pub trait ResultSink: Send + Sync {
    /// Dedup keys the destination already holds; seeds each run.
    fn known_links(&self) -> Result<HashSet<String>, SinkError>;

    /// Writes `offers`, returning how many were actually written.
    fn write(&self, offers: &[JobOffer]) -> Result<usize, SinkError>;
}

/// Persists into an [`OfferStore`]. A link that appeared in the store after
/// the run was seeded (another run got there first) is skipped, not counted.
pub struct StoreSink {
    store: Arc<dyn OfferStore>,
}

impl StoreSink {
    pub fn new(store: Arc<dyn OfferStore>) -> Self {
        StoreSink { store }
    }
}

impl ResultSink for StoreSink {
    fn known_links(&self) -> Result<HashSet<String>, SinkError> {
        Ok(self.store.existing_apply_links()?)
    }

    fn write(&self, offers: &[JobOffer]) -> Result<usize, SinkError> {
        let written = self.store.insert_new(offers)?;
        if written < offers.len() {
            debug!("{} offers were already stored", offers.len() - written);
        }
        Ok(written)
    }
}

/// Exports to a CSV file (`job_title,company,location,salary,tags,apply_link,source`).
pub struct CsvSink {
    path: PathBuf,
}

impl CsvSink {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        CsvSink { path: path.as_ref().to_path_buf() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ResultSink for CsvSink {
    fn known_links(&self) -> Result<HashSet<String>, SinkError> {
        Ok(HashSet::new())
    }

    fn write(&self, offers: &[JobOffer]) -> Result<usize, SinkError> {
        if offers.is_empty() {
            warn!("No offers to export, {:?} not written", self.path);
            return Ok(0);
        }
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        let mut csv_writer = csv::WriterBuilder::new().from_writer(file);
        for offer in offers {
            csv_writer.serialize(offer)?;
        }
        csv_writer.flush()?;

        info!("Saved {} offers to {:?}", offers.len(), self.path);
        Ok(offers.len())
    }
}
