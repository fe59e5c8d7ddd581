//! LinkedIn Jobs: CSRF-protected login and frequently renamed card classes.

use log::{info, warn};
use scraper::{Html, Selector};
use url::Url;

use crate::config::{Credentials, SiteConfig};
use crate::error::{ParseError, SourceError};
use crate::fetcher::Fetcher;
use crate::heuristics::{normalize_link, SelectorChain};
use crate::model::{JobOffer, SearchQuery};
use super::{extract_cards, with_query, SourceAdapter};

pub const LOGIN_URL: &str = "https://www.linkedin.com/login";
pub const SESSION_URL: &str = "https://www.linkedin.com/uas/login-submit";
pub const JOBS_URL: &str = "https://www.linkedin.com/jobs/search";

const CARDS: &[&str] = &["div.base-card", "li.jobs-search-results__list-item", "[data-job-id]"];
const TITLE: &[&str] = &[
    "h3.base-search-card__title",
    "a.job-card-list__title",
    "[class*='job-title']",
];
const COMPANY: &[&str] = &[
    "h4.base-search-card__subtitle",
    "a.job-card-container__company-name",
    "[class*='company-name']",
];
const LOCATION: &[&str] = &[
    "span.job-search-card__location",
    "li.job-card-container__metadata-item",
    "[class*='location']",
];
const LINK: &[&str] = &["a.base-card__full-link", "a[href]"];

pub struct LinkedInAdapter {
    config: SiteConfig,
}

impl LinkedInAdapter {
    pub fn new(config: SiteConfig) -> Self {
        LinkedInAdapter { config }
    }

    fn auth_error(&self, reason: impl Into<String>) -> SourceError {
        SourceError::Authentication { site: self.config.name.clone(), reason: reason.into() }
    }
}

/// Hidden `loginCsrfParam` value of the login form, if present.
fn csrf_token(login_page: &str) -> Option<String> {
    let doc = Html::parse_document(login_page);
    let selector = Selector::parse("input[name='loginCsrfParam']").ok()?;
    doc.select(&selector)
        .next()
        .and_then(|input| input.value().attr("value"))
        .map(str::to_string)
}

impl SourceAdapter for LinkedInAdapter {
    fn id(&self) -> &str {
        "linkedin"
    }

    fn config(&self) -> &SiteConfig {
        &self.config
    }

    /// Only a redirect into the feed or network pages counts as success.
    fn login(&self, session: &dyn Fetcher, credentials: &Credentials) -> Result<(), SourceError> {
        let login_page = session
            .get(LOGIN_URL)
            .map_err(|e| self.auth_error(format!("login page unavailable: {}", e)))?;

        let token = csrf_token(&login_page.body).unwrap_or_else(|| {
            warn!("[{}] No CSRF token on login page, trying without it", self.config.name);
            String::new()
        });

        let response = session
            .post_form(
                SESSION_URL,
                &[
                    ("session_key", credentials.username.as_str()),
                    ("session_password", credentials.password.as_str()),
                    ("loginCsrfParam", token.as_str()),
                ],
            )
            .map_err(|e| self.auth_error(format!("login request failed: {}", e)))?;

        if response.url.contains("feed") || response.url.contains("mynetwork") {
            info!("[{}] Authenticated", self.config.name);
            return Ok(());
        }
        if response.url.contains("challenge") || response.url.contains("checkpoint") {
            return Err(self.auth_error("additional verification required, log in manually once"));
        }
        Err(self.auth_error("could not confirm login"))
    }

    fn build_search_url(&self, query: &SearchQuery) -> String {
        with_query(
            JOBS_URL,
            &[
                ("keywords", query.keyword.as_str()),
                ("location", query.location.as_str()),
                ("f_TPR", "r604800"),
                ("sortBy", "R"),
            ],
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
        let title = SelectorChain::parse(TITLE);
        let company = SelectorChain::parse(COMPANY);
        let location = SelectorChain::parse(LOCATION);
        let link = SelectorChain::parse(LINK);

        let offers = extract_cards(&self.config.name, body, &SelectorChain::parse(CARDS), |card| {
            let job_title = title.text_in(card).ok_or(ParseError::MissingTitle)?;
            // Absolute links carry tracking parameters.
            let apply_link = link
                .first_in(card)
                .and_then(|a| a.value().attr("href"))
                .and_then(|href| normalize_link(&base, href, true))
                .ok_or_else(|| ParseError::MissingLink(job_title.clone()))?;

            Ok(JobOffer::new(job_title, apply_link)
                .company(company.text_in(card).unwrap_or_default())
                .location(location.text_in(card).unwrap_or_default()))
        });

        if offers.is_empty() {
            warn!("[{}] No offers found, the site may be blocking automated access", self.config.name);
        }
        offers
    }
}
