use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use std::time::Duration;
use log::{debug, warn};
use crate::error::FetchError;

/// Body of a response together with where it ended up after redirects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub url: String,
    pub status: u16,
    pub body: String,
}

/// One HTTP session. Implementations carry cookies between calls so a login
/// followed by a search sees the same session.
pub trait Fetcher {
    /// GET `url`; any non-success status is an error.
    fn get(&self, url: &str) -> Result<Page, FetchError>;

    /// POST a urlencoded form. Returns the final page whatever its status, so
    /// callers can inspect login redirects.
    fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<Page, FetchError>;
}

/// Opens a fresh session per source run.
pub trait SessionFactory: Send + Sync {
    fn open_session(&self) -> Result<Box<dyn Fetcher>, FetchError>;
}

impl<F> SessionFactory for F
where
    F: Fn() -> Result<Box<dyn Fetcher>, FetchError> + Send + Sync,
{
    fn open_session(&self) -> Result<Box<dyn Fetcher>, FetchError> {
        self()
    }
}

const USER_AGENTS: [&str; 4] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:121.0) Gecko/20100101 Firefox/121.0",
];

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,application/json;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("es-ES,es;q=0.9,en;q=0.8"));

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .cookie_store(true)
            .build()
            .map_err(|e| FetchError::Transport {
                url: String::new(),
                message: e.to_string(),
            })?;

        Ok(HttpFetcher { client })
    }

    fn random_user_agent(&self) -> &'static str {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        USER_AGENTS[rng.gen_range(0..USER_AGENTS.len())]
    }

    fn read(url: &str, resp: Response) -> Result<Page, FetchError> {
        let status = resp.status().as_u16();
        let final_url = resp.url().to_string();
        let body = resp.text().map_err(|e| classify(url, e))?;
        Ok(Page { url: final_url, status, body })
    }
}

impl Fetcher for HttpFetcher {
    fn get(&self, url: &str) -> Result<Page, FetchError> {
        debug!("GET {}", url);
        let resp = self.client
            .get(url)
            .header(USER_AGENT, self.random_user_agent())
            .send()
            .map_err(|e| classify(url, e))?;

        let status = resp.status();
        if !status.is_success() {
            warn!("HTTP {} from {}", status.as_u16(), url);
            return Err(FetchError::Http { url: url.to_string(), status: status.as_u16() });
        }
        Self::read(url, resp)
    }

    fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<Page, FetchError> {
        debug!("POST {}", url);
        let resp = self.client
            .post(url)
            .header(USER_AGENT, self.random_user_agent())
            .form(form)
            .send()
            .map_err(|e| classify(url, e))?;
        Self::read(url, resp)
    }
}

fn classify(url: &str, err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout { url: url.to_string() }
    } else if let Some(status) = err.status() {
        FetchError::Http { url: url.to_string(), status: status.as_u16() }
    } else {
        FetchError::Transport { url: url.to_string(), message: err.to_string() }
    }
}

/// Session factory backed by real HTTP with a fixed per-request timeout.
pub struct HttpSessionFactory {
    timeout: Duration,
}

impl HttpSessionFactory {
    pub fn new(timeout: Duration) -> Self {
        HttpSessionFactory { timeout }
    }
}

impl SessionFactory for HttpSessionFactory {
    fn open_session(&self) -> Result<Box<dyn Fetcher>, FetchError> {
        Ok(Box::new(HttpFetcher::new(self.timeout)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_agent_comes_from_rotation() {
        let fetcher = HttpFetcher::new(Duration::from_secs(1)).unwrap();
        for _ in 0..10 {
            assert!(USER_AGENTS.contains(&fetcher.random_user_agent()));
        }
    }

    #[test]
    fn refused_connection_is_a_transport_error() {
        let fetcher = HttpFetcher::new(Duration::from_secs(2)).unwrap();
        match fetcher.get("http://127.0.0.1:9/jobs") {
            Err(FetchError::Transport { url, .. }) => assert_eq!(url, "http://127.0.0.1:9/jobs"),
            Err(FetchError::Timeout { .. }) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn closures_act_as_session_factories() {
        let factory = || -> Result<Box<dyn Fetcher>, FetchError> {
            Err(FetchError::Transport { url: String::new(), message: "offline".into() })
        };
        assert!(factory.open_session().is_err());
    }
}
