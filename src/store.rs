use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use log::{error, info};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::model::{JobOffer, StoredOffer};

/// Keyed offer storage. `apply_link` is unique across the whole store.
pub trait OfferStore: Send + Sync {
    /// Inserts `offer` unless its link is already stored. Returns whether a
    /// row was written.
    fn upsert_if_absent(&self, offer: &JobOffer) -> Result<bool, StoreError>;

    /// Inserts every offer whose link is not stored yet, returning how many
    /// rows were written.
    fn insert_new(&self, offers: &[JobOffer]) -> Result<usize, StoreError> {
        let mut written = 0;
        for offer in offers {
            if self.upsert_if_absent(offer)? {
                written += 1;
            }
        }
        Ok(written)
    }

    fn existing_apply_links(&self) -> Result<HashSet<String>, StoreError>;

    /// Newest first, filtered, paged.
    fn list(&self, filter: &OfferFilter, limit: usize, offset: usize) -> Result<OfferPage, StoreError>;

    fn get(&self, id: u64) -> Result<StoredOffer, StoreError>;

    fn delete(&self, id: u64) -> Result<(), StoreError>;

    /// Removes everything, returning how many offers were dropped.
    fn clear(&self) -> Result<usize, StoreError>;

    fn all(&self) -> Result<Vec<StoredOffer>, StoreError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OfferFilter {
    /// Exact source display name.
    pub source: Option<String>,
    /// Case-insensitive match against title, company or tags.
    pub search_text: Option<String>,
}

impl OfferFilter {
    pub fn matches(&self, stored: &StoredOffer) -> bool {
        let offer = &stored.offer;
        if let Some(source) = self.source.as_deref().filter(|s| !s.is_empty()) {
            if offer.source() != source {
                return false;
            }
        }
        if let Some(text) = self.search_text.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let needle = text.to_lowercase();
            let hit = offer.title.to_lowercase().contains(&needle)
                || offer.company.to_lowercase().contains(&needle)
                || offer.tags_text().to_lowercase().contains(&needle);
            if !hit {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OfferPage {
    pub offers: Vec<StoredOffer>,
    pub total: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreState {
    next_id: u64,
    offers: Vec<StoredOffer>,
    #[serde(skip)]
    links: HashSet<String>,
}

impl StoreState {
    fn reindex(&mut self) {
        self.links = self.offers.iter().map(|o| o.offer.apply_link.clone()).collect();
        let max_id = self.offers.iter().map(|o| o.id).max().unwrap_or(0);
        self.next_id = self.next_id.max(max_id);
    }

    fn insert(&mut self, offer: &JobOffer) -> bool {
        if !self.links.insert(offer.apply_link.clone()) {
            return false;
        }
        self.next_id += 1;
        self.offers.push(StoredOffer {
            id: self.next_id,
            offer: offer.clone(),
            created_at: Utc::now(),
        });
        true
    }

    fn list(&self, filter: &OfferFilter, limit: usize, offset: usize) -> OfferPage {
        let mut matching: Vec<&StoredOffer> = self.offers.iter().filter(|o| filter.matches(o)).collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        OfferPage {
            total: matching.len(),
            offers: matching.into_iter().skip(offset).take(limit).cloned().collect(),
        }
    }

    fn get(&self, id: u64) -> Result<StoredOffer, StoreError> {
        self.offers
            .iter()
            .find(|o| o.id == id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    fn delete(&mut self, id: u64) -> Result<(), StoreError> {
        let pos = self.offers.iter().position(|o| o.id == id).ok_or(StoreError::NotFound(id))?;
        let removed = self.offers.remove(pos);
        self.links.remove(&removed.offer.apply_link);
        Ok(())
    }

    fn clear(&mut self) -> usize {
        let count = self.offers.len();
        self.offers.clear();
        self.links.clear();
        count
    }
}

fn lock(state: &Mutex<StoreState>) -> MutexGuard<'_, StoreState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

/// Process-local store, used by tests and one-shot runs.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OfferStore for MemoryStore {
    fn upsert_if_absent(&self, offer: &JobOffer) -> Result<bool, StoreError> {
        Ok(lock(&self.state).insert(offer))
    }

    fn existing_apply_links(&self) -> Result<HashSet<String>, StoreError> {
        Ok(lock(&self.state).links.clone())
    }

    fn list(&self, filter: &OfferFilter, limit: usize, offset: usize) -> Result<OfferPage, StoreError> {
        Ok(lock(&self.state).list(filter, limit, offset))
    }

    fn get(&self, id: u64) -> Result<StoredOffer, StoreError> {
        lock(&self.state).get(id)
    }

    fn delete(&self, id: u64) -> Result<(), StoreError> {
        lock(&self.state).delete(id)
    }

    fn clear(&self) -> Result<usize, StoreError> {
        Ok(lock(&self.state).clear())
    }

    fn all(&self) -> Result<Vec<StoredOffer>, StoreError> {
        Ok(lock(&self.state).offers.clone())
    }
}

/// Store persisted as one JSON document, rewritten after every change (once
/// per batch for [`OfferStore::insert_new`]). Changes are made on a copy of
/// the state, which replaces the live state only once it is on disk.
pub struct JsonFileStore {
    path: PathBuf,
    state: Mutex<StoreState>,
}

impl JsonFileStore {
    /// Opens `path`, starting empty when the file does not exist yet.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let mut state: StoreState = read_json(&path)?.unwrap_or_else(|| {
            info!("No store file at {:?}. Starting fresh.", path);
            StoreState::default()
        });
        state.reindex();
        info!("Opened store {:?} with {} offers.", path, state.offers.len());
        Ok(JsonFileStore { path, state: Mutex::new(state) })
    }

    fn save(&self, state: &StoreState) -> Result<(), StoreError> {
        write_json_atomically(&self.path, state)
    }
}

/// Reads a JSON document. `None` when the file is missing or blank.
pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    let mut content = String::new();
    match File::open(path) {
        Ok(mut file) => file.read_to_string(&mut content)?,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if content.trim().is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(&content)?))
}

/// Writes `value` to a sibling `.json.tmp` file, syncs it and renames it over
/// `path`, so readers see either the old document or the new one.
pub(crate) fn write_json_atomically<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let json = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&tmp)?;
    file.write_all(json.as_bytes())?;
    file.sync_all()?;
    fs::rename(&tmp, path).map_err(|e| {
        error!("Failed to replace {:?}: {}", path, e);
        StoreError::Io(e)
    })
}

impl JsonFileStore {
    /// Persists `next` and makes it the live state. On failure the live state
    /// is left as it was.
    fn commit(&self, live: &mut StoreState, next: StoreState) -> Result<(), StoreError> {
        self.save(&next)?;
        *live = next;
        Ok(())
    }
}

impl OfferStore for JsonFileStore {
    fn upsert_if_absent(&self, offer: &JobOffer) -> Result<bool, StoreError> {
        Ok(self.insert_new(std::slice::from_ref(offer))? == 1)
    }

    fn insert_new(&self, offers: &[JobOffer]) -> Result<usize, StoreError> {
        let mut state = lock(&self.state);
        let mut next = state.clone();
        let written = offers.iter().filter(|offer| next.insert(offer)).count();
        if written > 0 {
            self.commit(&mut state, next)?;
        }
        Ok(written)
    }

    fn existing_apply_links(&self) -> Result<HashSet<String>, StoreError> {
        Ok(lock(&self.state).links.clone())
    }

    fn list(&self, filter: &OfferFilter, limit: usize, offset: usize) -> Result<OfferPage, StoreError> {
        Ok(lock(&self.state).list(filter, limit, offset))
    }

    fn get(&self, id: u64) -> Result<StoredOffer, StoreError> {
        lock(&self.state).get(id)
    }

    fn delete(&self, id: u64) -> Result<(), StoreError> {
        let mut state = lock(&self.state);
        let mut next = state.clone();
        next.delete(id)?;
        self.commit(&mut state, next)
    }

    fn clear(&self) -> Result<usize, StoreError> {
        let mut state = lock(&self.state);
        let mut next = state.clone();
        let count = next.clear();
        self.commit(&mut state, next)?;
        Ok(count)
    }

    fn all(&self) -> Result<Vec<StoredOffer>, StoreError> {
        Ok(lock(&self.state).offers.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offer(title: &str, link: &str, tags: &[&str]) -> JobOffer {
        let mut offer = JobOffer::new(title, link).company("Acme").tags(tags.iter().copied());
        offer.tag_source("RemoteOK");
        offer
    }

    #[test]
    fn duplicate_links_are_stored_once() {
        let store = MemoryStore::new();
        assert!(store.upsert_if_absent(&offer("A", "https://x.test/1", &[])).unwrap());
        assert!(!store.upsert_if_absent(&offer("A again", "https://x.test/1", &[])).unwrap());
        assert!(store.upsert_if_absent(&offer("B", "https://x.test/2", &[])).unwrap());
        assert_eq!(store.all().unwrap().len(), 2);
        assert_eq!(store.existing_apply_links().unwrap().len(), 2);
    }

    #[test]
    fn links_compare_case_sensitively() {
        let store = MemoryStore::new();
        assert!(store.upsert_if_absent(&offer("A", "https://x.test/Job", &[])).unwrap());
        assert!(store.upsert_if_absent(&offer("A", "https://x.test/job", &[])).unwrap());
    }

    #[test]
    fn list_filters_and_pages() {
        let store = MemoryStore::new();
        store.upsert_if_absent(&offer("Rust Dev", "https://x.test/1", &["backend"])).unwrap();
        store.upsert_if_absent(&offer("Designer", "https://x.test/2", &["figma"])).unwrap();
        store.upsert_if_absent(&offer("Go Dev", "https://x.test/3", &["Backend"])).unwrap();

        let filter = OfferFilter { source: None, search_text: Some("BACKEND".into()) };
        let page = store.list(&filter, 1, 0).unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.offers.len(), 1);
        assert_eq!(page.offers[0].offer.title, "Go Dev", "newest first");

        let second = store.list(&filter, 1, 1).unwrap();
        assert_eq!(second.offers[0].offer.title, "Rust Dev");

        let other_source = OfferFilter { source: Some("Indeed".into()), search_text: None };
        assert_eq!(store.list(&other_source, 10, 0).unwrap().total, 0);
    }

    #[test]
    fn delete_and_clear() {
        let store = MemoryStore::new();
        store.upsert_if_absent(&offer("A", "https://x.test/1", &[])).unwrap();
        store.upsert_if_absent(&offer("B", "https://x.test/2", &[])).unwrap();
        let id = store.all().unwrap()[0].id;

        store.delete(id).unwrap();
        assert!(matches!(store.delete(id), Err(StoreError::NotFound(_))));
        assert!(store.upsert_if_absent(&offer("A", "https://x.test/1", &[])).unwrap(), "deleted link can return");
        assert_eq!(store.clear().unwrap(), 2);
        assert!(store.existing_apply_links().unwrap().is_empty());
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.json");
        {
            let store = JsonFileStore::open(&path).unwrap();
            store.upsert_if_absent(&offer("A", "https://x.test/1", &["rust", "go"])).unwrap();
            store.upsert_if_absent(&offer("B", "https://x.test/2", &[])).unwrap();
        }
        let reopened = JsonFileStore::open(&path).unwrap();
        assert_eq!(reopened.all().unwrap().len(), 2);
        assert!(!reopened.upsert_if_absent(&offer("A", "https://x.test/1", &[])).unwrap());
        assert!(reopened.upsert_if_absent(&offer("C", "https://x.test/3", &[])).unwrap());

        let stored = reopened.all().unwrap();
        assert_eq!(stored.iter().map(|o| o.id).max(), Some(3));
        assert_eq!(stored[0].offer.tags_text(), "rust, go");
        assert_eq!(stored[0].offer.source(), "RemoteOK");
    }

    #[test]
    fn failed_save_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.json");
        let store = JsonFileStore::open(&path).unwrap();
        store.upsert_if_absent(&offer("A", "https://x.test/1", &[])).unwrap();

        // A directory where the temp file goes makes every save fail.
        let blocker = dir.path().join("jobs.json.tmp");
        fs::create_dir(&blocker).unwrap();
        assert!(store.upsert_if_absent(&offer("B", "https://x.test/2", &[])).is_err());
        assert!(store.insert_new(&[offer("C", "https://x.test/3", &[])]).is_err());
        let id = store.all().unwrap()[0].id;
        assert!(store.delete(id).is_err());
        assert!(store.clear().is_err());

        assert_eq!(store.all().unwrap().len(), 1);
        assert_eq!(store.existing_apply_links().unwrap(), HashSet::from(["https://x.test/1".to_string()]));

        fs::remove_dir(&blocker).unwrap();
        assert!(store.upsert_if_absent(&offer("B", "https://x.test/2", &[])).unwrap());
        let reopened = JsonFileStore::open(&path).unwrap();
        let stored = reopened.all().unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[1].id, 2);
    }

    #[test]
    fn batch_insert_skips_known_and_repeated_links() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.json");
        let store = JsonFileStore::open(&path).unwrap();
        store.upsert_if_absent(&offer("A", "https://x.test/1", &[])).unwrap();

        let batch = [
            offer("A", "https://x.test/1", &[]),
            offer("B", "https://x.test/2", &[]),
            offer("B twice", "https://x.test/2", &[]),
            offer("C", "https://x.test/3", &[]),
        ];
        assert_eq!(store.insert_new(&batch).unwrap(), 2);
        assert_eq!(store.insert_new(&batch).unwrap(), 0);
        assert_eq!(JsonFileStore::open(&path).unwrap().all().unwrap().len(), 3);
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(JsonFileStore::open(&path), Err(StoreError::Serde(_))));
    }
}
