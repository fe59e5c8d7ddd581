//! Frequency views over stored offers.

use std::collections::HashMap;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::model::StoredOffer;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Count {
    pub name: String,
    pub count: usize,
}

/// Counts values in first-seen order. With case folding, `Python` and
/// `python` share one entry displayed as whichever spelling came first.
#[derive(Debug, Default)]
pub struct Counter {
    fold_case: bool,
    entries: Vec<Count>,
    index: HashMap<String, usize>,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn case_insensitive() -> Self {
        Counter { fold_case: true, ..Self::default() }
    }

    fn key(&self, value: &str) -> String {
        if self.fold_case {
            value.to_lowercase()
        } else {
            value.to_string()
        }
    }

    pub fn add(&mut self, value: &str) {
        let key = self.key(value);
        match self.index.get(&key) {
            Some(&i) => self.entries[i].count += 1,
            None => {
                self.index.insert(key, self.entries.len());
                self.entries.push(Count { name: value.to_string(), count: 1 });
            }
        }
    }

    /// Splits comma-joined tag text, trimming and ignoring empty segments.
    pub fn add_joined(&mut self, joined: &str) {
        for tag in joined.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            self.add(tag);
        }
    }

    pub fn get(&self, value: &str) -> usize {
        self.index
            .get(&self.key(value))
            .map(|&i| self.entries[i].count)
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Highest counts first; ties keep first-seen order.
    pub fn top(&self, k: usize) -> Vec<Count> {
        let mut sorted = self.entries.clone();
        sorted.sort_by(|a, b| b.count.cmp(&a.count));
        sorted.truncate(k);
        sorted
    }
}

/// Serialized with the breakdown's own key in each entry, e.g.
/// `{"source": "RemoteOK", "count": 3}` or `{"tag": "rust", "count": 2}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OfferStats {
    pub total_jobs: usize,
    #[serde(serialize_with = "source_counts")]
    pub by_source: Vec<Count>,
    #[serde(serialize_with = "company_counts")]
    pub by_company: Vec<Count>,
    #[serde(serialize_with = "location_counts")]
    pub by_location: Vec<Count>,
    #[serde(serialize_with = "tag_counts")]
    pub top_tags: Vec<Count>,
}

struct Keyed<'a> {
    key: &'static str,
    count: &'a Count,
}

impl Serialize for Keyed<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry(self.key, &self.count.name)?;
        map.serialize_entry("count", &self.count.count)?;
        map.end()
    }
}

fn keyed<S: Serializer>(key: &'static str, counts: &[Count], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(counts.iter().map(|count| Keyed { key, count }))
}

fn source_counts<S: Serializer>(counts: &[Count], serializer: S) -> Result<S::Ok, S::Error> {
    keyed("source", counts, serializer)
}

fn company_counts<S: Serializer>(counts: &[Count], serializer: S) -> Result<S::Ok, S::Error> {
    keyed("company", counts, serializer)
}

fn location_counts<S: Serializer>(counts: &[Count], serializer: S) -> Result<S::Ok, S::Error> {
    keyed("location", counts, serializer)
}

fn tag_counts<S: Serializer>(counts: &[Count], serializer: S) -> Result<S::Ok, S::Error> {
    keyed("tag", counts, serializer)
}

impl OfferStats {
    pub fn from_offers(offers: &[StoredOffer]) -> Self {
        let mut sources = Counter::new();
        let mut companies = Counter::new();
        let mut locations = Counter::new();
        let mut tags = Counter::case_insensitive();

        for stored in offers {
            let offer = &stored.offer;
            sources.add(offer.source());
            companies.add(&offer.company);
            locations.add(&offer.location);
            tags.add_joined(&offer.tags_text());
        }

        OfferStats {
            total_jobs: offers.len(),
            by_source: sources.top(usize::MAX),
            by_company: companies.top(10),
            by_location: locations.top(10),
            top_tags: tags.top(15),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::JobOffer;
    use chrono::Utc;

    #[test]
    fn tag_counts_fold_case_and_trim() {
        let mut tags = Counter::case_insensitive();
        for joined in ["Python, react", "python , Go", ""] {
            tags.add_joined(joined);
        }
        assert_eq!(tags.len(), 3);
        assert_eq!(tags.get("Python"), 2);
        assert_eq!(tags.get("react"), 1);
        assert_eq!(tags.get("Go"), 1);
        assert_eq!(
            tags.top(10),
            vec![
                Count { name: "Python".into(), count: 2 },
                Count { name: "react".into(), count: 1 },
                Count { name: "Go".into(), count: 1 },
            ]
        );
    }

    #[test]
    fn ties_keep_first_seen_order() {
        let mut counter = Counter::new();
        for v in ["b", "a", "c", "a", "c"] {
            counter.add(v);
        }
        let names: Vec<String> = counter.top(3).into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["a", "c", "b"]);
        assert_eq!(counter.top(1).len(), 1);
    }

    #[test]
    fn stats_over_stored_offers() {
        let stored: Vec<StoredOffer> = [("Acme", "rust, go"), ("Acme", "Rust"), ("Beta", "")]
            .iter()
            .enumerate()
            .map(|(i, (company, tags))| {
                let mut offer = JobOffer::new("Dev", format!("https://x.test/{}", i))
                    .company(*company)
                    .tags(tags.split(','));
                offer.tag_source("RemoteOK");
                StoredOffer { id: i as u64 + 1, offer, created_at: Utc::now() }
            })
            .collect();

        let stats = OfferStats::from_offers(&stored);
        assert_eq!(stats.total_jobs, 3);
        assert_eq!(stats.by_source, vec![Count { name: "RemoteOK".into(), count: 3 }]);
        assert_eq!(stats.by_company[0], Count { name: "Acme".into(), count: 2 });
        assert_eq!(stats.by_location[0], Count { name: "unknown".into(), count: 3 });
        assert_eq!(stats.top_tags[0], Count { name: "rust".into(), count: 2 });
    }

    #[test]
    fn stats_json_names_each_breakdown() {
        let mut offer = JobOffer::new("Dev", "https://x.test/1").company("Acme").location("Madrid").tags(["rust"]);
        offer.tag_source("Indeed");
        let stored = vec![StoredOffer { id: 1, offer, created_at: Utc::now() }];

        let json = serde_json::to_value(OfferStats::from_offers(&stored)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "total_jobs": 1,
                "by_source": [{ "source": "Indeed", "count": 1 }],
                "by_company": [{ "company": "Acme", "count": 1 }],
                "by_location": [{ "location": "Madrid", "count": 1 }],
                "top_tags": [{ "tag": "rust", "count": 1 }],
            })
        );
    }
}
