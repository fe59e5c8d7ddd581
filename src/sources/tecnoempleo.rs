//! Tecnoempleo: result markup is too unstable for structural selectors, so
//! offers are harvested from the page's hyperlinks instead.

use log::warn;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::config::SiteConfig;
use crate::error::ParseError;
use crate::heuristics::{element_text, harvest_links, normalize_link, HarvestRules, HarvestedLink};
use crate::model::{JobOffer, SearchQuery};
use super::{with_query, SourceAdapter};

pub const SEARCH_URL: &str = "https://www.tecnoempleo.com/busqueda-empleo.php";
const SITE_PREFIX: &str = "https://www.tecnoempleo.com";
const MAX_OFFERS: usize = 30;

/// Navigation, assets, static pages and pagination.
const DENY_FRAGMENTS: &[&str] = &[
    "assets", "graficos", "acceso", "registro", "newcand",
    "newemp", "accemp", "trabajo/", "empleo-publico",
    "tecnocalculadora", "servicios", ".php", ".css", ".js",
    "pagina=", "second-window", "aws-trabajo", "ofertas-trabajo/",
];
/// Title keywords that name a location, most specific first.
const LOCATIONS: &[&str] = &[
    "madrid", "barcelona", "valencia", "sevilla", "bilbao",
    "malaga", "zaragoza", "remote", "remoto", "teletrabajo",
];
/// Company profile pages end in `-trabajo`.
const COMPANY_SUFFIX: &str = "-trabajo";

pub struct TecnoempleoAdapter {
    config: SiteConfig,
    location_pattern: Regex,
}

impl TecnoempleoAdapter {
    pub fn new(config: SiteConfig) -> Self {
        TecnoempleoAdapter {
            config,
            location_pattern: Regex::new(&format!(r"(?i)\b({})\b", LOCATIONS.join("|"))).unwrap(),
        }
    }

    /// Site path of an href, for both absolute and root-relative forms.
    fn site_path(href: &str) -> Option<&str> {
        if let Some(path) = href.strip_prefix(SITE_PREFIX) {
            Some(path)
        } else if href.starts_with('/') && !href.starts_with("//") {
            Some(href)
        } else {
            None
        }
    }

    /// Offer pages look like `/title-of-the-position-city-123456`.
    fn looks_like_offer(href: &str) -> bool {
        match Self::site_path(href) {
            Some(path) => path.contains('-') && path.chars().count() > 15,
            None => false,
        }
    }

    /// A city beats a remote marker wherever each appears in the title.
    fn location_of(&self, title: &str) -> String {
        let found: Vec<String> = self
            .location_pattern
            .find_iter(title)
            .map(|m| m.as_str().to_lowercase())
            .collect();
        LOCATIONS
            .iter()
            .copied()
            .find(|loc| found.iter().any(|f| f.as_str() == *loc))
            .map(capitalize)
            .unwrap_or_else(|| "España".to_string())
    }

    fn to_offer(&self, base: &Url, company_links: &Selector, link: &HarvestedLink<'_>) -> Result<JobOffer, ParseError> {
        if link.text.is_empty() {
            return Err(ParseError::MissingTitle);
        }
        let apply_link = normalize_link(base, &link.href, false)
            .ok_or_else(|| ParseError::MissingLink(link.text.clone()))?;

        Ok(JobOffer::new(link.text.clone(), apply_link)
            .company(nearby_company(link.element, company_links).unwrap_or_default())
            .location(self.location_of(&link.text))
            .tags(["IT/Tech"]))
    }
}

/// Company name from a sibling profile link inside the anchor's parent.
fn nearby_company(anchor: ElementRef<'_>, company_links: &Selector) -> Option<String> {
    let parent = anchor.parent().and_then(ElementRef::wrap)?;
    parent
        .select(company_links)
        .filter(|a| *a != anchor)
        .map(element_text)
        .find(|text| !text.is_empty())
}

fn capitalize(word: &str) -> String {
    let lower = word.to_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

impl SourceAdapter for TecnoempleoAdapter {
    fn id(&self) -> &str {
        "tecnoempleo"
    }

    fn config(&self) -> &SiteConfig {
        &self.config
    }

    fn build_search_url(&self, query: &SearchQuery) -> String {
        with_query(SEARCH_URL, &[("te", query.keyword.as_str()), ("pr", query.location.as_str())])
    }

    fn extract_listings(&self, body: &str, _query: &SearchQuery) -> Vec<JobOffer> {
        let base = match Url::parse(&self.config.base_url) {
            Ok(u) => u,
            Err(e) => {
                warn!("[{}] Invalid base URL: {}", self.config.name, e);
                return Vec::new();
            }
        };
        let company_links = match Selector::parse("a[href*='-trabajo']") {
            Ok(s) => s,
            Err(_) => return Vec::new(),
        };

        let doc = Html::parse_document(body);
        let rules = HarvestRules {
            title_len: 15..=80,
            deny_fragments: DENY_FRAGMENTS,
            deny_suffix: Some(COMPANY_SUFFIX),
            limit: MAX_OFFERS,
        };

        harvest_links(&doc, &rules, Self::looks_like_offer)
            .iter()
            .filter_map(|link| match self.to_offer(&base, &company_links, link) {
                Ok(offer) => Some(offer),
                Err(e) => {
                    warn!("[{}] Skipping link {}: {}", self.config.name, link.href, e);
                    None
                }
            })
            .collect()
    }
}
