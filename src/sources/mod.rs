//! Per-site extraction adapters.
//!
//! Every site implements [`SourceAdapter`]; the coordinator only ever sees the
//! trait. An adapter run is `authenticate -> build_search_url -> fetch ->
//! extract_listings -> tag source`, and any failure along the way is returned
//! as a [`SourceError`] that costs this source only.

pub mod indeed;
pub mod infojobs;
pub mod linkedin;
pub mod remoteok;
pub mod tecnoempleo;

use std::sync::Arc;

use log::{info, warn};
use scraper::{ElementRef, Html};

use crate::config::{AppConfig, Credentials, SiteConfig};
use crate::error::{ParseError, SourceError};
use crate::fetcher::Fetcher;
use crate::heuristics::SelectorChain;
use crate::model::{JobOffer, SearchQuery};

pub use indeed::IndeedAdapter;
pub use infojobs::InfoJobsAdapter;
pub use linkedin::LinkedInAdapter;
pub use remoteok::RemoteOkAdapter;
pub use tecnoempleo::TecnoempleoAdapter;

pub trait SourceAdapter: Send + Sync {
    /// Identifier callers select the source by (e.g. `"remoteok"`).
    fn id(&self) -> &str;

    fn config(&self) -> &SiteConfig;

    /// Display name, stamped on every offer this adapter produces.
    fn name(&self) -> &str {
        &self.config().name
    }

    /// No-op for open sites. Otherwise requires credentials and delegates to
    /// [`SourceAdapter::login`].
    fn authenticate(&self, session: &dyn Fetcher) -> Result<(), SourceError> {
        let config = self.config();
        if !config.requires_auth {
            return Ok(());
        }
        let credentials = config.credentials.as_ref().ok_or_else(|| SourceError::Authentication {
            site: config.name.clone(),
            reason: format!(
                "credentials required, set {id}_USERNAME and {id}_PASSWORD",
                id = self.id().to_uppercase()
            ),
        })?;
        self.login(session, credentials)
    }

    /// Site-specific login exchange.
    fn login(&self, _session: &dyn Fetcher, _credentials: &Credentials) -> Result<(), SourceError> {
        Ok(())
    }

    fn build_search_url(&self, query: &SearchQuery) -> String;

    /// Turns a raw response body into offers. Never fails as a whole: broken
    /// nodes are skipped and a page with nothing recognisable yields nothing.
    fn extract_listings(&self, body: &str, query: &SearchQuery) -> Vec<JobOffer>;

    fn run(&self, session: &dyn Fetcher, query: &SearchQuery) -> Result<Vec<JobOffer>, SourceError> {
        info!("[{}] Starting scrape...", self.name());

        if let Err(e) = self.authenticate(session) {
            warn!("[{}] {}", self.name(), e);
            return Err(e);
        }

        let url = self.build_search_url(query);
        info!("[{}] URL: {}", self.name(), url);

        let page = session.get(&url)?;
        let mut offers = self.extract_listings(&page.body, query);
        for offer in &mut offers {
            offer.tag_source(self.name());
        }

        info!("[{}] Found {} offers", self.name(), offers.len());
        Ok(offers)
    }
}

/// All built-in adapters, in a stable order.
pub fn default_adapters(config: &AppConfig) -> Vec<Arc<dyn SourceAdapter>> {
    let site = |id: &str| config.site_config(id).cloned();
    let mut adapters: Vec<Arc<dyn SourceAdapter>> = Vec::new();

    if let Some(c) = site("remoteok") {
        adapters.push(Arc::new(RemoteOkAdapter::new(c)));
    }
    if let Some(c) = site("infojobs") {
        adapters.push(Arc::new(InfoJobsAdapter::new(c)));
    }
    if let Some(c) = site("linkedin") {
        adapters.push(Arc::new(LinkedInAdapter::new(c)));
    }
    if let Some(c) = site("indeed") {
        adapters.push(Arc::new(IndeedAdapter::new(c, &config.indeed_country)));
    }
    if let Some(c) = site("tecnoempleo") {
        adapters.push(Arc::new(TecnoempleoAdapter::new(c)));
    }
    adapters
}

/// `base?k=v&...` with percent-encoded values; empty values are left out.
pub(crate) fn with_query(base: &str, params: &[(&str, &str)]) -> String {
    let query: Vec<String> = params
        .iter()
        .filter(|(_, value)| !value.trim().is_empty())
        .map(|(key, value)| format!("{}={}", key, urlencoding::encode(value.trim())))
        .collect();
    if query.is_empty() {
        base.to_string()
    } else {
        format!("{}?{}", base, query.join("&"))
    }
}

/// Runs the card chain over `body` and converts each card, skipping the ones
/// that fail with a warning.
pub(crate) fn extract_cards<F>(site: &str, body: &str, cards: &SelectorChain, mut convert: F) -> Vec<JobOffer>
where
    F: FnMut(ElementRef<'_>) -> Result<JobOffer, ParseError>,
{
    let doc = Html::parse_document(body);
    let nodes = cards.candidates(&doc);
    if nodes.is_empty() {
        warn!("[{}] No offer cards found in page", site);
        return Vec::new();
    }

    let mut offers = Vec::with_capacity(nodes.len());
    for node in nodes {
        match convert(node) {
            Ok(offer) => offers.push(offer),
            Err(e) => warn!("[{}] Skipping offer card: {}", site, e),
        }
    }
    offers
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_omits_empty_values() {
        assert_eq!(with_query("https://x.test/s", &[("q", ""), ("l", " ")]), "https://x.test/s");
        assert_eq!(
            with_query("https://x.test/s", &[("q", "rust dev"), ("l", ""), ("sort", "date")]),
            "https://x.test/s?q=rust%20dev&sort=date"
        );
    }

    #[test]
    fn every_builtin_adapter_builds_a_url_without_input() {
        let config = AppConfig::from_lookup(|_| None);
        let empty = SearchQuery::default();
        for adapter in default_adapters(&config) {
            let url = adapter.build_search_url(&empty);
            assert!(url::Url::parse(&url).is_ok(), "{} produced {}", adapter.id(), url);
        }
    }

    #[test]
    fn builtin_ids_are_unique() {
        let config = AppConfig::from_lookup(|_| None);
        let mut ids: Vec<String> = default_adapters(&config).iter().map(|a| a.id().to_string()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids, vec!["indeed", "infojobs", "linkedin", "remoteok", "tecnoempleo"]);
    }
}
