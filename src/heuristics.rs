//! Markup extraction helpers shared by the HTML-backed adapters.
//!
//! Sites serve one of several known layouts at any given time, so every
//! lookup is an ordered chain of candidate selectors: the first selector that
//! matches anything wins, later ones are never consulted.

use std::collections::HashSet;
use std::ops::RangeInclusive;

use log::{debug, warn};
use scraper::{ElementRef, Html, Selector};
use url::Url;

/// Evaluates `attempts` in order and returns the index and output of the first
/// one producing at least one item. Later attempts are not evaluated.
pub fn first_non_empty<T, I, F>(attempts: I) -> Option<(usize, Vec<T>)>
where
    I: IntoIterator<Item = F>,
    F: FnOnce() -> Vec<T>,
{
    attempts
        .into_iter()
        .enumerate()
        .map(|(i, attempt)| (i, attempt()))
        .find(|(_, found)| !found.is_empty())
}

/// Ordered list of CSS selectors tried one after another.
pub struct SelectorChain {
    selectors: Vec<(&'static str, Selector)>,
}

impl SelectorChain {
    /// Patterns that fail to parse are logged and left out of the chain.
    pub fn parse(patterns: &[&'static str]) -> Self {
        let selectors = patterns
            .iter()
            .filter_map(|&pattern| match Selector::parse(pattern) {
                Ok(selector) => Some((pattern, selector)),
                Err(e) => {
                    warn!("Skipping invalid selector '{}': {:?}", pattern, e);
                    None
                }
            })
            .collect();
        SelectorChain { selectors }
    }

    pub fn len(&self) -> usize {
        self.selectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selectors.is_empty()
    }

    /// Candidate nodes of the first selector that matches anywhere in `doc`.
    pub fn candidates<'a>(&self, doc: &'a Html) -> Vec<ElementRef<'a>> {
        let attempts = self
            .selectors
            .iter()
            .map(|(_, selector)| move || doc.select(selector).collect::<Vec<_>>());
        match first_non_empty(attempts) {
            Some((index, nodes)) => {
                debug!("Layout selector '{}' matched {} nodes", self.selectors[index].0, nodes.len());
                nodes
            }
            None => Vec::new(),
        }
    }

    /// Every node matched by the first selector that matches inside `scope`.
    pub fn all_in<'a>(&self, scope: ElementRef<'a>) -> Vec<ElementRef<'a>> {
        let attempts = self
            .selectors
            .iter()
            .map(|(_, selector)| move || scope.select(selector).collect::<Vec<_>>());
        first_non_empty(attempts).map(|(_, nodes)| nodes).unwrap_or_default()
    }

    /// First element inside `scope` matched by the earliest selector that matches.
    pub fn first_in<'a>(&self, scope: ElementRef<'a>) -> Option<ElementRef<'a>> {
        self.selectors
            .iter()
            .find_map(|(_, selector)| scope.select(selector).next())
    }

    /// First non-empty text inside `scope`, walking the chain in order.
    pub fn text_in(&self, scope: ElementRef<'_>) -> Option<String> {
        self.selectors.iter().find_map(|(_, selector)| {
            scope
                .select(selector)
                .map(element_text)
                .find(|text| !text.is_empty())
        })
    }
}

/// Visible text of an element with runs of whitespace collapsed.
pub fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Resolves `href` against `base`. Absolute links pass through unchanged,
/// minus their query string when `strip_query` is set. Anything that does not
/// end up as an absolute http(s) URL is rejected.
pub fn normalize_link(base: &Url, href: &str, strip_query: bool) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
        return None;
    }

    if href.starts_with("http://") || href.starts_with("https://") {
        Url::parse(href).ok()?;
        let link = if strip_query {
            href.split(['?', '#']).next().unwrap_or(href)
        } else {
            href
        };
        return Some(link.to_string());
    }

    let joined = base.join(href).ok()?;
    if joined.scheme() != "http" && joined.scheme() != "https" {
        return None;
    }
    Some(joined.to_string())
}

/// Filters for heuristic link harvesting on pages without usable structure.
pub struct HarvestRules<'r> {
    /// Anchor text length, in characters, that plausibly is a job title.
    pub title_len: RangeInclusive<usize>,
    /// Lower-cased href fragments that mark navigation, assets or static pages.
    pub deny_fragments: &'r [&'r str],
    /// Path suffix of pages that are not offers (e.g. company profiles).
    pub deny_suffix: Option<&'r str>,
    pub limit: usize,
}

pub struct HarvestedLink<'a> {
    pub element: ElementRef<'a>,
    pub href: String,
    pub text: String,
}

/// Scans every hyperlink on the page and keeps those passing `rules` and
/// `accept`, without repeating an href, up to `rules.limit`.
pub fn harvest_links<'a, F>(doc: &'a Html, rules: &HarvestRules<'_>, accept: F) -> Vec<HarvestedLink<'a>>
where
    F: Fn(&str) -> bool,
{
    let anchors = match Selector::parse("a[href]") {
        Ok(selector) => selector,
        Err(_) => return Vec::new(),
    };

    let mut seen = HashSet::new();
    let mut harvested = Vec::new();

    for element in doc.select(&anchors) {
        if harvested.len() >= rules.limit {
            break;
        }
        let href = match element.value().attr("href") {
            Some(h) => h.trim(),
            None => continue,
        };
        let text = element_text(element);
        if !rules.title_len.contains(&text.chars().count()) {
            continue;
        }
        if seen.contains(href) {
            continue;
        }
        let lowered = href.to_lowercase();
        if rules.deny_fragments.iter().any(|fragment| lowered.contains(fragment)) {
            continue;
        }
        if let Some(suffix) = rules.deny_suffix {
            if href.trim_end_matches('/').ends_with(suffix) {
                continue;
            }
        }
        if !accept(href) {
            continue;
        }
        seen.insert(href.to_string());
        harvested.push(HarvestedLink { element, href: href.to_string(), text });
    }
    harvested
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_LAYOUTS: &str = r#"
        <html><body>
          <ul>
            <li class="card"><h2>First offer</h2></li>
            <li class="card"><h2>Second offer</h2></li>
          </ul>
          <div class="other"><h2>Not an offer</h2></div>
        </body></html>"#;

    #[test]
    fn first_non_empty_skips_empty_attempts() {
        let attempts: Vec<Box<dyn FnOnce() -> Vec<u8>>> = vec![
            Box::new(|| vec![]),
            Box::new(|| vec![1, 2]),
            Box::new(|| panic!("third attempt must not run")),
        ];
        let (index, found) = first_non_empty(attempts).unwrap();
        assert_eq!(index, 1);
        assert_eq!(found, vec![1, 2]);
    }

    #[test]
    fn chain_falls_through_to_second_selector() {
        let doc = Html::parse_document(TWO_LAYOUTS);
        let chain = SelectorChain::parse(&["div.job_seen_beacon", "li.card", "div.other"]);
        let nodes = chain.candidates(&doc);
        assert_eq!(nodes.len(), 2);
        assert_eq!(element_text(nodes[0]), "First offer");
    }

    #[test]
    fn chain_with_no_match_yields_nothing() {
        let doc = Html::parse_document(TWO_LAYOUTS);
        let chain = SelectorChain::parse(&["section.none", "article"]);
        assert!(chain.candidates(&doc).is_empty());
    }

    #[test]
    fn invalid_selectors_are_dropped() {
        let chain = SelectorChain::parse(&["li.card", "[[broken"]);
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn text_in_skips_empty_matches() {
        let doc = Html::parse_fragment(r#"<div id="c"><span class="a">  </span><em>  Acme
            Corp </em></div>"#);
        let scope = doc.root_element();
        let chain = SelectorChain::parse(&["span.a", "em"]);
        assert_eq!(chain.text_in(scope).as_deref(), Some("Acme Corp"));
    }

    #[test]
    fn relative_links_resolve_against_base() {
        let base = Url::parse("https://example.com").unwrap();
        assert_eq!(
            normalize_link(&base, "/jobs/123", false).as_deref(),
            Some("https://example.com/jobs/123")
        );
    }

    #[test]
    fn absolute_links_pass_through() {
        let base = Url::parse("https://example.com").unwrap();
        assert_eq!(
            normalize_link(&base, "https://other.org/view/9?trk=abc", false).as_deref(),
            Some("https://other.org/view/9?trk=abc")
        );
        assert_eq!(
            normalize_link(&base, "https://other.org/view/9?trk=abc", true).as_deref(),
            Some("https://other.org/view/9")
        );
    }

    #[test]
    fn unusable_links_are_rejected() {
        let base = Url::parse("https://example.com").unwrap();
        assert_eq!(normalize_link(&base, "", false), None);
        assert_eq!(normalize_link(&base, "#top", false), None);
        assert_eq!(normalize_link(&base, "javascript:void(0)", false), None);
        assert_eq!(normalize_link(&base, "mailto:hr@example.com", false), None);
    }

    #[test]
    fn harvesting_applies_length_deny_list_and_dedup() {
        let doc = Html::parse_document(r#"
            <a href="/senior-rust-developer-madrid-1">Senior Rust Developer Madrid</a>
            <a href="/senior-rust-developer-madrid-1">Senior Rust Developer Madrid</a>
            <a href="/short-1">Short</a>
            <a href="/assets/brochure-engineering.pdf">Download the engineering brochure</a>
            <a href="/acme-consulting-trabajo/">Acme Consulting job listings</a>
            <a href="/data-engineer-remote-2">Data Engineer (Remote, Spain)</a>
        "#);
        let rules = HarvestRules {
            title_len: 15..=80,
            deny_fragments: &["assets"],
            deny_suffix: Some("-trabajo"),
            limit: 30,
        };
        let links = harvest_links(&doc, &rules, |_| true);
        let hrefs: Vec<&str> = links.iter().map(|l| l.href.as_str()).collect();
        assert_eq!(hrefs, vec!["/senior-rust-developer-madrid-1", "/data-engineer-remote-2"]);
    }

    #[test]
    fn harvesting_stops_at_limit() {
        let body: String = (0..10)
            .map(|i| format!(r#"<a href="/offer-number-{i}">Interesting offer number {i}</a>"#))
            .collect();
        let doc = Html::parse_document(&body);
        let rules = HarvestRules { title_len: 15..=80, deny_fragments: &[], deny_suffix: None, limit: 3 };
        assert_eq!(harvest_links(&doc, &rules, |_| true).len(), 3);
    }
}
