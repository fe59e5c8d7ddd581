use std::any::Any;
use std::collections::{BTreeMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, error, info, warn};
use serde::Serialize;

use crate::delay_manager;
use crate::error::{OrchestrationError, RegistryError, SourceError, ValidationError};
use crate::fetcher::SessionFactory;
use crate::model::{JobOffer, RunRecord, RunStatus, SearchQuery};
use crate::registry::RunRegistry;
use crate::sink::ResultSink;
use crate::sources::SourceAdapter;

/// What `execute_run` did with the run it was handed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// This call ran the run to the given terminal status.
    Executed(RunStatus),
    /// Someone else already claimed the run; it was left alone.
    Skipped(RunStatus),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SiteInfo {
    pub id: String,
    pub name: String,
    pub requires_auth: bool,
    pub credentials_configured: bool,
}

struct RunReport {
    written: usize,
    errors: Vec<String>,
}

/// Fans a run out over its sources, one after another, dedups what comes
/// back and hands the survivors to the sink.
///
/// Cheap to clone; clones share the same registry and sink.
#[derive(Clone)]
pub struct RunCoordinator {
    adapters: Arc<BTreeMap<String, Arc<dyn SourceAdapter>>>,
    registry: Arc<RunRegistry>,
    sink: Arc<dyn ResultSink>,
    sessions: Arc<dyn SessionFactory>,
    inter_source_delay: Duration,
}

impl RunCoordinator {
    pub fn new(
        adapters: Vec<Arc<dyn SourceAdapter>>,
        registry: Arc<RunRegistry>,
        sink: Arc<dyn ResultSink>,
        sessions: Arc<dyn SessionFactory>,
        inter_source_delay: Duration,
    ) -> Self {
        let adapters = adapters
            .into_iter()
            .map(|adapter| (adapter.id().to_string(), adapter))
            .collect();
        RunCoordinator {
            adapters: Arc::new(adapters),
            registry,
            sink,
            sessions,
            inter_source_delay,
        }
    }

    pub fn registry(&self) -> &Arc<RunRegistry> {
        &self.registry
    }

    pub fn sites(&self) -> Vec<SiteInfo> {
        self.adapters
            .values()
            .map(|adapter| {
                let config = adapter.config();
                SiteInfo {
                    id: adapter.id().to_string(),
                    name: config.name.clone(),
                    requires_auth: config.requires_auth,
                    credentials_configured: config.credentials.is_some(),
                }
            })
            .collect()
    }

    /// Normalises source names (trimmed, lower-cased, first occurrence kept)
    /// and rejects empty or unknown selections.
    pub fn validate_sources<S: AsRef<str>>(&self, sources: &[S]) -> Result<Vec<String>, ValidationError> {
        let mut seen = HashSet::new();
        let normalized: Vec<String> = sources
            .iter()
            .map(|s| s.as_ref().trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .filter(|s| seen.insert(s.clone()))
            .collect();

        if normalized.is_empty() {
            return Err(ValidationError::EmptySourceList);
        }
        let unknown: Vec<String> = normalized
            .iter()
            .filter(|s| !self.adapters.contains_key(s.as_str()))
            .cloned()
            .collect();
        if !unknown.is_empty() {
            return Err(ValidationError::InvalidSource(unknown));
        }
        Ok(normalized)
    }

    /// Validates and records a `pending` run without executing it.
    pub fn prepare_run<S: AsRef<str>>(&self, sources: &[S], keyword: &str, location: &str) -> Result<String, ValidationError> {
        let sources = self.validate_sources(sources)?;
        let record = self.registry.create(sources, &SearchQuery::new(keyword, location));
        Ok(record.id)
    }

    /// Records a run and executes it on a background thread. Returns the run
    /// id immediately; progress is observable through the registry.
    pub fn start_run<S: AsRef<str>>(&self, sources: &[S], keyword: &str, location: &str) -> Result<String, ValidationError> {
        let run_id = self.prepare_run(sources, keyword, location)?;

        let worker = self.clone();
        let id = run_id.clone();
        let spawned = thread::Builder::new()
            .name(format!("run-{}", &run_id[..8.min(run_id.len())]))
            .spawn(move || {
                if let Err(e) = worker.execute_run(&id) {
                    error!("Run {} could not be executed: {}", id, e);
                }
            });

        if let Err(e) = spawned {
            error!("Failed to spawn worker for run {}: {}", run_id, e);
            if let Ok(true) = self.registry.try_begin(&run_id) {
                let _ = self.registry.fail(&run_id, format!("worker unavailable: {}", e));
            }
        }
        Ok(run_id)
    }

    /// Runs a `pending` run to completion on the calling thread. A run that is
    /// already running or finished is left untouched.
    pub fn execute_run(&self, run_id: &str) -> Result<ExecutionOutcome, RegistryError> {
        if !self.registry.try_begin(run_id)? {
            let status = self.registry.get(run_id)?.status;
            info!("Run {} is already {}, not executing again", run_id, status.as_str());
            return Ok(ExecutionOutcome::Skipped(status));
        }

        let record = self.registry.get(run_id)?;
        // A panic outside the adapters (sink, dedup) must still settle the run.
        match panic::catch_unwind(AssertUnwindSafe(|| self.collect(&record))) {
            Ok(Ok(report)) => self.registry.complete(run_id, report.written, &report.errors)?,
            Ok(Err(e)) => {
                error!("Run {} failed: {}", run_id, e);
                self.registry.fail(run_id, e.to_string())?;
            }
            Err(payload) => {
                let message = panic_message(payload);
                error!("Run {} panicked: {}", run_id, message);
                self.registry.fail(run_id, format!("run panicked: {}", message))?;
            }
        }
        Ok(ExecutionOutcome::Executed(self.registry.get(run_id)?.status))
    }

    pub fn get_run(&self, run_id: &str) -> Result<RunRecord, RegistryError> {
        self.registry.get(run_id)
    }

    pub fn list_runs(&self, limit: usize) -> Vec<RunRecord> {
        self.registry.list_recent(limit)
    }

    /// Asks a run to stop before its next source. Offers already collected
    /// are still written. Returns `false` if the run has already finished.
    pub fn cancel_run(&self, run_id: &str) -> Result<bool, RegistryError> {
        let accepted = self.registry.request_cancel(run_id)?;
        if accepted {
            info!("Cancellation requested for run {}", run_id);
        }
        Ok(accepted)
    }

    fn collect(&self, record: &RunRecord) -> Result<RunReport, OrchestrationError> {
        let mut seen = self.sink.known_links()?;
        debug!("Run {} seeded with {} known links", record.id, seen.len());

        let query = SearchQuery::new(record.keyword.as_str(), record.location.as_str());
        let mut survivors: Vec<JobOffer> = Vec::new();
        let mut errors = Vec::new();

        for (i, source_id) in record.sources.iter().enumerate() {
            let is_cancelled = || self.registry.is_cancel_requested(&record.id);
            let interrupted = i > 0 && !delay_manager::inter_source_delay(self.inter_source_delay, is_cancelled);
            if interrupted || is_cancelled() {
                warn!("Run {} cancelled before {}", record.id, source_id);
                errors.push(format!("cancelled before {}", source_id));
                break;
            }

            match self.run_source(source_id, &query) {
                Ok(offers) => {
                    let found = offers.len();
                    let before = survivors.len();
                    for offer in offers {
                        if seen.insert(offer.apply_link.clone()) {
                            survivors.push(offer);
                        } else {
                            debug!("Duplicate offer dropped: {}", offer.apply_link);
                        }
                    }
                    info!("[{}] {} offers, {} new", source_id, found, survivors.len() - before);
                }
                Err(e) => {
                    error!("[{}] {}", source_id, e);
                    errors.push(format!("{}: {}", source_id, e));
                }
            }
        }

        let written = self.sink.write(&survivors)?;
        Ok(RunReport { written, errors })
    }

    fn run_source(&self, source_id: &str, query: &SearchQuery) -> Result<Vec<JobOffer>, SourceError> {
        let adapter = self
            .adapters
            .get(source_id)
            .ok_or_else(|| SourceError::UnknownSource(source_id.to_string()))?;
        let session = self
            .sessions
            .open_session()
            .map_err(|e| SourceError::Session(e.to_string()))?;

        panic::catch_unwind(AssertUnwindSafe(|| adapter.run(session.as_ref(), query)))
            .unwrap_or_else(|payload| Err(SourceError::Panicked(panic_message(payload))))
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
