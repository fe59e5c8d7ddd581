//! InfoJobs: session login, then one of three known result-card layouts.

use log::{info, warn};
use scraper::ElementRef;
use url::Url;

use crate::config::{Credentials, SiteConfig};
use crate::error::{ParseError, SourceError};
use crate::fetcher::Fetcher;
use crate::heuristics::{element_text, normalize_link, SelectorChain};
use crate::model::{JobOffer, SearchQuery};
use super::{extract_cards, with_query, SourceAdapter};

pub const LOGIN_URL: &str = "https://www.infojobs.net/candidate/access/login.xhtml";
pub const SEARCH_URL: &str = "https://www.infojobs.net/jobsearch/search-results/list.xhtml";

const CARDS: &[&str] = &[
    "div.ij-OfferCardContent",
    "li.ij-OfferCard",
    "[data-testid='offer-card']",
];
const TITLE: &[&str] = &[
    "a.ij-OfferCardContent-description-title-link",
    "h2.ij-OfferCardContent-description-title",
    "[data-testid='offer-title']",
    "a[data-test='offer-title']",
];
const LINK: &[&str] = &["a.ij-OfferCardContent-description-title-link", "a[data-test='offer-title']", "a[href]"];
const COMPANY: &[&str] = &[
    "a.ij-OfferCardContent-description-subtitle-link",
    "[data-testid='offer-company']",
    "span.ij-OfferCardContent-description-subtitle",
];
const LOCATION: &[&str] = &[
    "span.ij-OfferCardContent-description-list-item-truncate",
    "[data-testid='offer-location']",
];
const SALARY: &[&str] = &["span.ij-OfferCardContent-description-salary"];
const TAGS: &[&str] = &["span.ij-OfferCardContent-description-tag"];

pub struct InfoJobsAdapter {
    config: SiteConfig,
}

impl InfoJobsAdapter {
    pub fn new(config: SiteConfig) -> Self {
        InfoJobsAdapter { config }
    }

    fn auth_error(&self, reason: impl Into<String>) -> SourceError {
        SourceError::Authentication { site: self.config.name.clone(), reason: reason.into() }
    }
}

struct Fields {
    title: SelectorChain,
    link: SelectorChain,
    company: SelectorChain,
    location: SelectorChain,
    salary: SelectorChain,
    tags: SelectorChain,
}

impl Fields {
    fn parse() -> Self {
        Fields {
            title: SelectorChain::parse(TITLE),
            link: SelectorChain::parse(LINK),
            company: SelectorChain::parse(COMPANY),
            location: SelectorChain::parse(LOCATION),
            salary: SelectorChain::parse(SALARY),
            tags: SelectorChain::parse(TAGS),
        }
    }

    fn offer(&self, base: &Url, card: ElementRef<'_>) -> Result<JobOffer, ParseError> {
        let title = self.title.text_in(card).ok_or(ParseError::MissingTitle)?;
        let link = self
            .link
            .first_in(card)
            .and_then(|a| a.value().attr("href"))
            .and_then(|href| normalize_link(base, href, false))
            .ok_or_else(|| ParseError::MissingLink(title.clone()))?;

        let tags: Vec<String> = self.tags.all_in(card).into_iter().map(element_text).collect();

        Ok(JobOffer::new(title, link)
            .company(self.company.text_in(card).unwrap_or_default())
            .location(self.location.text_in(card).unwrap_or_default())
            .salary(self.salary.text_in(card).unwrap_or_default())
            .tags(tags))
    }
}

impl SourceAdapter for InfoJobsAdapter {
    fn id(&self) -> &str {
        "infojobs"
    }

    fn config(&self) -> &SiteConfig {
        &self.config
    }

    /// The site often answers automated logins with a captcha. When success
    /// cannot be confirmed the search still proceeds, since some result pages
    /// are served without a session.
    fn login(&self, session: &dyn Fetcher, credentials: &Credentials) -> Result<(), SourceError> {
        session
            .get(LOGIN_URL)
            .map_err(|e| self.auth_error(format!("login page unavailable: {}", e)))?;

        let response = session
            .post_form(
                LOGIN_URL,
                &[("j_username", credentials.username.as_str()), ("j_password", credentials.password.as_str())],
            )
            .map_err(|e| self.auth_error(format!("login request failed: {}", e)))?;

        if response.body.to_lowercase().contains("logout") || response.url.contains("mi-cv") {
            info!("[{}] Authenticated", self.config.name);
        } else {
            warn!("[{}] Login could not be confirmed (possible captcha), continuing anyway", self.config.name);
        }
        Ok(())
    }

    fn build_search_url(&self, query: &SearchQuery) -> String {
        with_query(SEARCH_URL, &[("q", query.keyword.as_str()), ("provinceIds", query.location.as_str())])
    }

    fn extract_listings(&self, body: &str, _query: &SearchQuery) -> Vec<JobOffer> {
        let base = match Url::parse(&self.config.base_url) {
            Ok(u) => u,
            Err(e) => {
                warn!("[{}] Invalid base URL: {}", self.config.name, e);
                return Vec::new();
            }
        };
        let fields = Fields::parse();
        extract_cards(&self.config.name, body, &SelectorChain::parse(CARDS), |card| fields.offer(&base, card))
    }
}
