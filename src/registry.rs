use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use log::{error, info, warn};
use uuid::Uuid;

use crate::error::{RegistryError, StoreError};
use crate::model::{RunRecord, RunStatus, SearchQuery};
use crate::store::{read_json, write_json_atomically};

const INTERRUPTED: &str = "interrupted by restart";

type Runs = HashMap<String, RunRecord>;

/// Record of every run and its status transitions.
///
/// The public surface is read-only; transitions happen only through the
/// crate-internal methods the coordinator calls. Each transition is checked
/// against the current status under the lock, so a record moves
/// `pending -> running -> completed|failed` at most once.
///
/// A registry built with [`RunRegistry::open`] also rewrites its JSON file
/// after every change. The in-memory map stays authoritative: a failed write
/// is logged and the next change writes the full history again.
#[derive(Default)]
pub struct RunRegistry {
    runs: Mutex<Runs>,
    path: Option<PathBuf>,
}

impl RunRegistry {
    /// In-memory only.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the run history at `path`, starting empty when there is none.
    /// Runs left pending or running by a previous process are marked failed.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let records: Vec<RunRecord> = read_json(&path)?.unwrap_or_default();
        let now = Utc::now();
        let mut interrupted = 0;
        let runs: Runs = records
            .into_iter()
            .map(|mut record| {
                if !record.status.is_terminal() {
                    record.status = RunStatus::Failed;
                    record.error_summary = Some(INTERRUPTED.to_string());
                    record.completed_at = Some(now);
                    interrupted += 1;
                }
                (record.id.clone(), record)
            })
            .collect();
        if interrupted > 0 {
            warn!("{} runs in {:?} were interrupted by a restart", interrupted, path);
        }
        info!("Opened run history {:?} with {} runs.", path, runs.len());
        write_json_atomically(&path, &sorted(&runs))?;
        Ok(RunRegistry { runs: Mutex::new(runs), path: Some(path) })
    }

    fn lock(&self) -> MutexGuard<'_, Runs> {
        self.runs.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn persist(&self, runs: &Runs) {
        if let Some(path) = &self.path {
            if let Err(e) = write_json_atomically(path, &sorted(runs)) {
                error!("Failed to save run history {:?}: {}", path, e);
            }
        }
    }

    pub fn get(&self, id: &str) -> Result<RunRecord, RegistryError> {
        self.lock()
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::RunNotFound(id.to_string()))
    }

    /// Up to `limit` records, newest first.
    pub fn list_recent(&self, limit: usize) -> Vec<RunRecord> {
        let mut records = sorted(&self.lock());
        records.reverse();
        records.truncate(limit);
        records
    }

    pub(crate) fn create(&self, sources: Vec<String>, query: &SearchQuery) -> RunRecord {
        let record = RunRecord {
            id: Uuid::new_v4().to_string(),
            keyword: query.keyword.clone(),
            location: query.location.clone(),
            sources,
            status: RunStatus::Pending,
            offers_found: 0,
            started_at: Utc::now(),
            completed_at: None,
            error_summary: None,
            cancel_requested: false,
        };
        let mut guard = self.lock();
        guard.insert(record.id.clone(), record.clone());
        self.persist(&guard);
        drop(guard);
        info!("Run {} created for sources [{}]", record.id, record.sources.join(", "));
        record
    }

    /// Atomic `pending -> running`. Returns `false` when the run was already
    /// claimed or finished.
    pub(crate) fn try_begin(&self, id: &str) -> Result<bool, RegistryError> {
        let mut guard = self.lock();
        let record = guard
            .get_mut(id)
            .ok_or_else(|| RegistryError::RunNotFound(id.to_string()))?;
        if record.status != RunStatus::Pending {
            return Ok(false);
        }
        record.status = RunStatus::Running;
        info!("Run {} is running", id);
        self.persist(&guard);
        Ok(true)
    }

    pub(crate) fn complete(&self, id: &str, offers_found: usize, errors: &[String]) -> Result<(), RegistryError> {
        let summary = if errors.is_empty() { None } else { Some(errors.join("; ")) };
        self.finish(id, RunStatus::Completed, offers_found, summary)
    }

    pub(crate) fn fail(&self, id: &str, error: String) -> Result<(), RegistryError> {
        self.finish(id, RunStatus::Failed, 0, Some(error))
    }

    fn finish(
        &self,
        id: &str,
        status: RunStatus,
        offers_found: usize,
        error_summary: Option<String>,
    ) -> Result<(), RegistryError> {
        let mut guard = self.lock();
        let record = guard
            .get_mut(id)
            .ok_or_else(|| RegistryError::RunNotFound(id.to_string()))?;
        if record.status != RunStatus::Running {
            warn!("Ignoring {} for run {} in status {}", status.as_str(), id, record.status.as_str());
            return Ok(());
        }
        record.status = status;
        record.offers_found = offers_found;
        record.error_summary = error_summary;
        record.completed_at = Some(Utc::now());
        info!("Run {} {} with {} offers", id, status.as_str(), offers_found);
        self.persist(&guard);
        Ok(())
    }

    /// Flags a run for cooperative cancellation. Returns `false` if it has
    /// already finished.
    pub(crate) fn request_cancel(&self, id: &str) -> Result<bool, RegistryError> {
        let mut guard = self.lock();
        let record = guard
            .get_mut(id)
            .ok_or_else(|| RegistryError::RunNotFound(id.to_string()))?;
        if record.status.is_terminal() {
            return Ok(false);
        }
        record.cancel_requested = true;
        self.persist(&guard);
        Ok(true)
    }

    pub(crate) fn is_cancel_requested(&self, id: &str) -> bool {
        self.lock()
            .get(id)
            .map(|r| r.cancel_requested)
            .unwrap_or(false)
    }
}

/// Oldest first, ties broken by id.
fn sorted(runs: &Runs) -> Vec<RunRecord> {
    let mut records: Vec<RunRecord> = runs.values().cloned().collect();
    records.sort_by(|a, b| a.started_at.cmp(&b.started_at).then_with(|| b.id.cmp(&a.id)));
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn registry_with_run() -> (RunRegistry, String) {
        let registry = RunRegistry::new();
        let record = registry.create(vec!["remoteok".into()], &SearchQuery::new("rust", ""));
        (registry, record.id)
    }

    #[test]
    fn new_runs_are_pending_without_completion_time() {
        let (registry, id) = registry_with_run();
        let record = registry.get(&id).unwrap();
        assert_eq!(record.status, RunStatus::Pending);
        assert!(record.completed_at.is_none());
        assert_eq!(record.keyword, "rust");
    }

    #[test]
    fn unknown_run_is_not_found() {
        let registry = RunRegistry::new();
        assert_eq!(registry.get("nope"), Err(RegistryError::RunNotFound("nope".into())));
        assert!(registry.try_begin("nope").is_err());
    }

    #[test]
    fn begin_is_claimed_once() {
        let (registry, id) = registry_with_run();
        assert!(registry.try_begin(&id).unwrap());
        assert!(!registry.try_begin(&id).unwrap());
    }

    #[test]
    fn concurrent_begin_has_a_single_winner() {
        let (registry, id) = registry_with_run();
        let registry = Arc::new(registry);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let id = id.clone();
                thread::spawn(move || registry.try_begin(&id).unwrap())
            })
            .collect();
        let winners = handles.into_iter().map(|h| h.join().unwrap()).filter(|won| *won).count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn terminal_state_is_write_once() {
        let (registry, id) = registry_with_run();
        registry.try_begin(&id).unwrap();
        registry.complete(&id, 3, &["indeed: HTTP 403".into()]).unwrap();
        registry.fail(&id, "late failure".into()).unwrap();

        let record = registry.get(&id).unwrap();
        assert_eq!(record.status, RunStatus::Completed);
        assert_eq!(record.offers_found, 3);
        assert_eq!(record.error_summary.as_deref(), Some("indeed: HTTP 403"));
        assert!(record.completed_at.is_some());
    }

    #[test]
    fn pending_run_cannot_finish_directly() {
        let (registry, id) = registry_with_run();
        registry.complete(&id, 1, &[]).unwrap();
        assert_eq!(registry.get(&id).unwrap().status, RunStatus::Pending);
    }

    #[test]
    fn recent_runs_are_newest_first() {
        let registry = RunRegistry::new();
        let first = registry.create(vec!["remoteok".into()], &SearchQuery::default());
        thread::sleep(std::time::Duration::from_millis(5));
        let second = registry.create(vec!["indeed".into()], &SearchQuery::default());

        let recent = registry.list_recent(10);
        assert_eq!(recent[0].id, second.id);
        assert_eq!(recent[1].id, first.id);
        assert_eq!(registry.list_recent(1).len(), 1);
    }

    #[test]
    fn finished_runs_ignore_cancellation() {
        let (registry, id) = registry_with_run();
        assert!(registry.request_cancel(&id).unwrap());
        assert!(registry.is_cancel_requested(&id));
        registry.try_begin(&id).unwrap();
        registry.complete(&id, 0, &[]).unwrap();
        assert!(!registry.request_cancel(&id).unwrap());
    }

    #[test]
    fn reopened_history_marks_unfinished_runs_interrupted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runs.json");

        let registry = RunRegistry::open(&path).unwrap();
        let done = registry.create(vec!["remoteok".into()], &SearchQuery::new("rust", ""));
        registry.try_begin(&done.id).unwrap();
        registry.complete(&done.id, 4, &[]).unwrap();
        let running = registry.create(vec!["indeed".into()], &SearchQuery::default());
        registry.try_begin(&running.id).unwrap();
        let pending = registry.create(vec!["linkedin".into()], &SearchQuery::default());
        drop(registry);

        let reopened = RunRegistry::open(&path).unwrap();
        assert_eq!(reopened.list_recent(10).len(), 3);

        let done = reopened.get(&done.id).unwrap();
        assert_eq!(done.status, RunStatus::Completed);
        assert_eq!(done.offers_found, 4);
        assert_eq!(done.keyword, "rust");
        assert!(done.error_summary.is_none());

        for id in [&running.id, &pending.id] {
            let record = reopened.get(id).unwrap();
            assert_eq!(record.status, RunStatus::Failed);
            assert_eq!(record.error_summary.as_deref(), Some("interrupted by restart"));
            assert!(record.completed_at.is_some());
        }

        // The interrupted state is itself persisted.
        drop(reopened);
        let again = RunRegistry::open(&path).unwrap();
        assert_eq!(again.get(&pending.id).unwrap().status, RunStatus::Failed);
    }

    #[test]
    fn failed_history_write_keeps_the_run_in_memory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runs.json");
        let registry = RunRegistry::open(&path).unwrap();

        let blocker = dir.path().join("runs.json.tmp");
        std::fs::create_dir(&blocker).unwrap();
        let record = registry.create(vec!["remoteok".into()], &SearchQuery::default());
        assert_eq!(registry.get(&record.id).unwrap().status, RunStatus::Pending);

        std::fs::remove_dir(&blocker).unwrap();
        assert!(registry.try_begin(&record.id).unwrap());
        drop(registry);
        let reopened = RunRegistry::open(&path).unwrap();
        assert_eq!(reopened.get(&record.id).unwrap().error_summary.as_deref(), Some("interrupted by restart"));
    }

    #[test]
    fn missing_history_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let registry = RunRegistry::open(dir.path().join("absent.json")).unwrap();
        assert!(registry.list_recent(10).is_empty());
    }
}
