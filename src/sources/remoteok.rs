//! RemoteOK: public JSON feed, no markup involved.

use log::warn;
use serde_json::Value;
use url::Url;

use crate::config::SiteConfig;
use crate::error::ParseError;
use crate::heuristics::normalize_link;
use crate::model::{JobOffer, SearchQuery, UNKNOWN};
use super::SourceAdapter;

pub const API_URL: &str = "https://remoteok.com/api";
const MAX_OFFERS: usize = 50;

/// One feed item, read field by field. A field that is missing or of an
/// unexpected type falls back to its default instead of dropping the item.
#[derive(Debug, Default, PartialEq)]
struct FeedEntry {
    position: String,
    company: String,
    tags: Vec<String>,
    slug: String,
    url: String,
    location: Option<String>,
    salary_min: Option<u64>,
    salary_max: Option<u64>,
}

impl FeedEntry {
    fn from_value(value: &Value) -> Self {
        FeedEntry {
            position: text(value, "position"),
            company: text(value, "company"),
            tags: tags(value),
            slug: text(value, "slug"),
            url: text(value, "url"),
            location: Some(text(value, "location")).filter(|l| !l.is_empty()),
            salary_min: amount(value, "salary_min"),
            salary_max: amount(value, "salary_max"),
        }
    }
}

fn text(value: &Value, key: &str) -> String {
    value.get(key).and_then(Value::as_str).unwrap_or("").trim().to_string()
}

/// Accepts numbers and numeric strings (`"50000"`).
fn amount(value: &Value, key: &str) -> Option<u64> {
    match value.get(key)? {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().filter(|f| *f > 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Array of strings, or a comma-joined string; anything else is no tags.
fn tags(value: &Value) -> Vec<String> {
    match value.get("tags") {
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).map(str::to_string).collect(),
        Some(Value::String(joined)) => joined.split(',').map(str::to_string).collect(),
        _ => Vec::new(),
    }
}

pub struct RemoteOkAdapter {
    config: SiteConfig,
}

impl RemoteOkAdapter {
    pub fn new(config: SiteConfig) -> Self {
        RemoteOkAdapter { config }
    }

    fn to_offer(&self, base: &Url, entry: FeedEntry) -> Result<JobOffer, ParseError> {
        let title = entry.position.trim();
        if title.is_empty() {
            return Err(ParseError::MissingTitle);
        }

        let raw_link = if entry.slug.trim().is_empty() {
            entry.url.clone()
        } else {
            format!("{}/{}", self.config.base_url.trim_end_matches('/'), entry.slug.trim())
        };
        let link = normalize_link(base, &raw_link, false)
            .ok_or_else(|| ParseError::MissingLink(title.to_string()))?;

        let location = entry
            .location
            .filter(|l| !l.trim().is_empty())
            .unwrap_or_else(|| "Remote".to_string());

        Ok(JobOffer::new(title, link)
            .company(entry.company)
            .location(location)
            .salary(salary_range(entry.salary_min, entry.salary_max))
            .tags(entry.tags))
    }
}

impl SourceAdapter for RemoteOkAdapter {
    fn id(&self) -> &str {
        "remoteok"
    }

    fn config(&self) -> &SiteConfig {
        &self.config
    }

    /// The feed has no server-side search; keyword filtering happens locally.
    fn build_search_url(&self, _query: &SearchQuery) -> String {
        API_URL.to_string()
    }

    fn extract_listings(&self, body: &str, query: &SearchQuery) -> Vec<JobOffer> {
        let entries: Vec<Value> = match serde_json::from_str(body) {
            Ok(v) => v,
            Err(e) => {
                warn!("[{}] {}", self.config.name, ParseError::InvalidFeed(e.to_string()));
                return Vec::new();
            }
        };
        let base = match Url::parse(&self.config.base_url) {
            Ok(u) => u,
            Err(e) => {
                warn!("[{}] Invalid base URL {}: {}", self.config.name, self.config.base_url, e);
                return Vec::new();
            }
        };
        let keyword = query.keyword.to_lowercase();

        let mut offers = Vec::new();
        for value in entries {
            // Leading metadata entry carries the API's legal notice.
            if value.get("legal").is_some() {
                continue;
            }
            let offer = match self.to_offer(&base, FeedEntry::from_value(&value)) {
                Ok(o) => o,
                Err(e) => {
                    warn!("[{}] Skipping feed entry: {}", self.config.name, e);
                    continue;
                }
            };
            if !keyword.is_empty() {
                let searchable = format!("{} {} {}", offer.title, offer.company, offer.tags_text()).to_lowercase();
                if !searchable.contains(&keyword) {
                    continue;
                }
            }
            offers.push(offer);
            if offers.len() == MAX_OFFERS {
                break;
            }
        }
        offers
    }
}

/// `$60,000 - $80,000`, `$60,000+`, or the sentinel. Zero counts as absent.
fn salary_range(min: Option<u64>, max: Option<u64>) -> String {
    match (min.filter(|v| *v > 0), max.filter(|v| *v > 0)) {
        (Some(lo), Some(hi)) => format!("${} - ${}", group_thousands(lo), group_thousands(hi)),
        (Some(lo), None) => format!("${}+", group_thousands(lo)),
        _ => UNKNOWN.to_string(),
    }
}

fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::testing::StubFetcher;

    const FEED: &str = r#"[
        {"legal": "API Terms of Service: please link back"},
        {"position": "Senior Rust Engineer", "company": "Ferrous", "tags": ["rust", "backend"],
         "slug": "remote-senior-rust-engineer-ferrous-1001", "location": "Europe",
         "salary_min": 90000, "salary_max": 120000},
        {"position": "Frontend Developer", "company": "Pixel", "tags": ["react", "typescript"],
         "url": "https://remoteok.com/remote-jobs/1002", "salary_min": 50000},
        {"position": "Support Specialist", "company": "Helpful", "tags": [],
         "slug": "remote-support-specialist-helpful-1003", "location": ""}
    ]"#;

    fn adapter() -> RemoteOkAdapter {
        RemoteOkAdapter::new(SiteConfig::new("RemoteOK", "https://remoteok.com", false))
    }

    #[test]
    fn skips_metadata_and_maps_fields() {
        let offers = adapter().extract_listings(FEED, &SearchQuery::default());
        assert_eq!(offers.len(), 3);

        let rust = &offers[0];
        assert_eq!(rust.title, "Senior Rust Engineer");
        assert_eq!(rust.company, "Ferrous");
        assert_eq!(rust.location, "Europe");
        assert_eq!(rust.salary, "$90,000 - $120,000");
        assert_eq!(rust.tags_text(), "rust, backend");
        assert_eq!(rust.apply_link, "https://remoteok.com/remote-senior-rust-engineer-ferrous-1001");

        assert_eq!(offers[1].salary, "$50,000+");
        assert_eq!(offers[1].apply_link, "https://remoteok.com/remote-jobs/1002");
        assert_eq!(offers[2].salary, UNKNOWN);
        assert_eq!(offers[2].location, "Remote");
    }

    #[test]
    fn keyword_filter_matches_title_company_and_tags() {
        let only_react = adapter().extract_listings(FEED, &SearchQuery::new("REACT", ""));
        assert_eq!(only_react.len(), 1);
        assert_eq!(only_react[0].title, "Frontend Developer");

        let by_company = adapter().extract_listings(FEED, &SearchQuery::new("ferrous", ""));
        assert_eq!(by_company.len(), 1);
    }

    #[test]
    fn output_is_capped() {
        let entries: Vec<String> = (0..80)
            .map(|i| format!(r#"{{"position": "Job {i}", "slug": "job-{i}"}}"#))
            .collect();
        let feed = format!("[{}]", entries.join(","));
        assert_eq!(adapter().extract_listings(&feed, &SearchQuery::default()).len(), MAX_OFFERS);
    }

    #[test]
    fn broken_feed_yields_nothing() {
        assert!(adapter().extract_listings("<html>blocked</html>", &SearchQuery::default()).is_empty());
        let partial = r#"[{"position": ""}, {"position": "No link"}, {"position": 42}]"#;
        assert!(adapter().extract_listings(partial, &SearchQuery::default()).is_empty());
    }

    #[test]
    fn odd_field_types_fall_back_per_field() {
        let feed = r#"[
            {"legal": "terms"},
            {"position": "Rust Dev", "company": "Ferrous", "slug": "rust-dev-1", "salary_min": "50000",
             "salary_max": {"amount": 1}, "location": null},
            {"position": "Go Dev", "company": null, "slug": "go-dev-2", "tags": null, "location": 7},
            {"position": "Ops", "slug": "ops-3", "tags": "linux, k8s"}
        ]"#;
        let offers = adapter().extract_listings(feed, &SearchQuery::default());
        assert_eq!(offers.len(), 3);

        assert_eq!(offers[0].salary, "$50,000+");
        assert_eq!(offers[0].location, "Remote");
        assert_eq!(offers[1].title, "Go Dev");
        assert_eq!(offers[1].company, UNKNOWN);
        assert!(offers[1].tags.is_empty());
        assert_eq!(offers[1].location, "Remote");
        assert_eq!(offers[2].tags_text(), "linux, k8s");
    }

    #[test]
    fn run_tags_offers_with_display_name() {
        let fetcher = StubFetcher::default().page(API_URL, API_URL, FEED);
        let offers = adapter().run(&fetcher, &SearchQuery::new("rust", "")).unwrap();
        assert_eq!(offers.len(), 1);
        assert_eq!(offers[0].source(), "RemoteOK");
    }

    #[test]
    fn thousands_grouping() {
        assert_eq!(group_thousands(7), "7");
        assert_eq!(group_thousands(1000), "1,000");
        assert_eq!(group_thousands(1234567), "1,234,567");
    }
}
