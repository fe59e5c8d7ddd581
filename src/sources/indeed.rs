//! Indeed: open search, country-specific hosts, four known card layouts.

use log::{info, warn};
use scraper::ElementRef;
use url::Url;

use crate::config::SiteConfig;
use crate::error::ParseError;
use crate::heuristics::{element_text, normalize_link, SelectorChain};
use crate::model::{JobOffer, SearchQuery};
use super::{extract_cards, with_query, SourceAdapter};

const CARDS: &[&str] = &[
    "div.job_seen_beacon",
    "div.jobsearch-SerpJobCard",
    "[data-jk]",
    "td.resultContent",
];
const TITLE: &[&str] = &["h2.jobTitle", "a.jobtitle", "[data-testid='jobTitle']", "span[title]"];
const LINK: &[&str] = &["a.jcs-JobTitle", "a[href]"];
const COMPANY: &[&str] = &[
    "span.companyName",
    "span[data-testid='company-name']",
    "a.companyName",
];
const LOCATION: &[&str] = &[
    "div.companyLocation",
    "span.location",
    "div[data-testid='text-location']",
];
const SALARY: &[&str] = &[
    "div.salary-snippet-container",
    "span.salaryText",
    "div[data-testid='attribute_snippet_testid']",
];
const TAGS: &[&str] = &["div.attribute_snippet"];

pub struct IndeedAdapter {
    config: SiteConfig,
}

impl IndeedAdapter {
    /// Rewrites the base URL for the supported country hosts; anything else
    /// keeps the configured (US) host.
    pub fn new(mut config: SiteConfig, country: &str) -> Self {
        let host = match country.trim().to_lowercase().as_str() {
            "es" => Some("https://es.indeed.com"),
            "mx" => Some("https://mx.indeed.com"),
            "ar" => Some("https://ar.indeed.com"),
            _ => None,
        };
        if let Some(host) = host {
            info!("[{}] Using country host {}", config.name, host);
            config.base_url = host.to_string();
        }
        IndeedAdapter { config }
    }
}

/// Title text, preferring the inner span the heading usually wraps.
fn title_text(titles: &SelectorChain, inner: &SelectorChain, card: ElementRef<'_>) -> Option<String> {
    let heading = titles.first_in(card)?;
    inner
        .text_in(heading)
        .or_else(|| Some(element_text(heading)))
        .filter(|t| !t.is_empty())
}

impl SourceAdapter for IndeedAdapter {
    fn id(&self) -> &str {
        "indeed"
    }

    fn config(&self) -> &SiteConfig {
        &self.config
    }

    fn build_search_url(&self, query: &SearchQuery) -> String {
        with_query(
            &format!("{}/jobs", self.config.base_url.trim_end_matches('/')),
            &[("q", query.keyword.as_str()), ("l", query.location.as_str()), ("sort", "date")],
        )
    }

    fn extract_listings(&self, body: &str, _query: &SearchQuery) -> Vec<JobOffer> {
        let base = match Url::parse(&self.config.base_url) {
            Ok(u) => u,
            Err(e) => {
                warn!("[{}] Invalid base URL: {}", self.config.name, e);
                return Vec::new();
            }
        };
        let titles = SelectorChain::parse(TITLE);
        let inner = SelectorChain::parse(&["span"]);
        let link = SelectorChain::parse(LINK);
        let company = SelectorChain::parse(COMPANY);
        let location = SelectorChain::parse(LOCATION);
        let salary = SelectorChain::parse(SALARY);
        let tags = SelectorChain::parse(TAGS);

        extract_cards(&self.config.name, body, &SelectorChain::parse(CARDS), |card| {
            let title = title_text(&titles, &inner, card).ok_or(ParseError::MissingTitle)?;
            let apply_link = link
                .first_in(card)
                .and_then(|a| a.value().attr("href"))
                .and_then(|href| normalize_link(&base, href, false))
                .ok_or_else(|| ParseError::MissingLink(title.clone()))?;
            let attributes: Vec<String> = tags.all_in(card).into_iter().map(element_text).collect();

            Ok(JobOffer::new(title, apply_link)
                .company(company.text_in(card).unwrap_or_default())
                .location(location.text_in(card).unwrap_or_default())
                .salary(salary.text_in(card).unwrap_or_default())
                .tags(attributes))
        })
    }
}
