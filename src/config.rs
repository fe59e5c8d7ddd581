use std::collections::BTreeMap;
use std::env;
use std::time::Duration;

use log::{info, warn};

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_SOURCE_DELAY_SECS: u64 = 2;
pub const DEFAULT_STORE_PATH: &str = "jobfy_jobs.json";
pub const DEFAULT_RUNS_PATH: &str = "jobfy_runs.json";
pub const DEFAULT_BIND: &str = "0.0.0.0:8000";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Static per-site settings. Loaded once, shared read-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteConfig {
    pub name: String,
    pub base_url: String,
    pub requires_auth: bool,
    pub credentials: Option<Credentials>,
}

impl SiteConfig {
    pub fn new(name: &str, base_url: &str, requires_auth: bool) -> Self {
        SiteConfig {
            name: name.to_string(),
            base_url: base_url.to_string(),
            requires_auth,
            credentials: None,
        }
    }

    pub fn with_credentials(mut self, credentials: Option<Credentials>) -> Self {
        self.credentials = credentials;
        self
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub sites: BTreeMap<String, SiteConfig>,
    pub request_timeout: Duration,
    pub source_delay: Duration,
    pub indeed_country: String,
    pub store_path: String,
    /// Run history for the server; the CLI keeps runs in memory.
    pub runs_path: String,
    pub bind: String,
}

impl AppConfig {
    /// Reads `.env` (if any) and the process environment.
    pub fn from_env() -> Self {
        match dotenvy::dotenv() {
            Ok(path) => info!("Loaded environment from {}", path.display()),
            Err(_) => info!("No .env file found, using process environment only."),
        }
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let credentials = |site: &str| -> Option<Credentials> {
            let username = lookup(&format!("{}_USERNAME", site.to_uppercase()))?;
            let password = lookup(&format!("{}_PASSWORD", site.to_uppercase()))?;
            if username.is_empty() || password.is_empty() {
                return None;
            }
            Some(Credentials { username, password })
        };

        let mut sites = BTreeMap::new();
        sites.insert(
            "remoteok".to_string(),
            SiteConfig::new("RemoteOK", "https://remoteok.com", false),
        );
        sites.insert(
            "infojobs".to_string(),
            SiteConfig::new("InfoJobs", "https://www.infojobs.net", true)
                .with_credentials(credentials("infojobs")),
        );
        sites.insert(
            "linkedin".to_string(),
            SiteConfig::new("LinkedIn", "https://www.linkedin.com", true)
                .with_credentials(credentials("linkedin")),
        );
        sites.insert(
            "indeed".to_string(),
            SiteConfig::new("Indeed", "https://www.indeed.com", false),
        );
        sites.insert(
            "tecnoempleo".to_string(),
            SiteConfig::new("Tecnoempleo", "https://www.tecnoempleo.com", false),
        );

        let secs = |key: &str, default: u64| -> Duration {
            let value = match lookup(key) {
                Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                    warn!("Ignoring non-numeric {}={:?}, using {}", key, raw, default);
                    default
                }),
                None => default,
            };
            Duration::from_secs(value)
        };

        AppConfig {
            sites,
            request_timeout: secs("JOBFY_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS),
            source_delay: secs("JOBFY_SOURCE_DELAY_SECS", DEFAULT_SOURCE_DELAY_SECS),
            indeed_country: lookup("JOBFY_INDEED_COUNTRY").unwrap_or_else(|| "es".to_string()),
            store_path: lookup("JOBFY_STORE_PATH").unwrap_or_else(|| DEFAULT_STORE_PATH.to_string()),
            runs_path: lookup("JOBFY_RUNS_PATH").unwrap_or_else(|| DEFAULT_RUNS_PATH.to_string()),
            bind: lookup("JOBFY_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string()),
        }
    }

    pub fn site_config(&self, source_id: &str) -> Option<&SiteConfig> {
        self.sites.get(source_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_environment() {
        let config = AppConfig::from_lookup(|_| None);
        assert_eq!(config.sites.len(), 5);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.source_delay, Duration::from_secs(2));
        assert_eq!(config.indeed_country, "es");
        assert_eq!(config.runs_path, DEFAULT_RUNS_PATH);
        assert!(config.site_config("infojobs").unwrap().requires_auth);
        assert!(config.site_config("infojobs").unwrap().credentials.is_none());
        assert!(!config.site_config("remoteok").unwrap().requires_auth);
    }

    #[test]
    fn credentials_need_both_halves() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("INFOJOBS_USERNAME", "me@example.com"),
            ("INFOJOBS_PASSWORD", "secret"),
            ("LINKEDIN_USERNAME", "me@example.com"),
        ]));
        let infojobs = config.site_config("infojobs").unwrap();
        assert_eq!(infojobs.credentials.as_ref().unwrap().password, "secret");
        assert!(config.site_config("linkedin").unwrap().credentials.is_none());
    }

    #[test]
    fn bad_numbers_fall_back_to_defaults() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("JOBFY_SOURCE_DELAY_SECS", "soon"),
            ("JOBFY_REQUEST_TIMEOUT_SECS", "5"),
        ]));
        assert_eq!(config.source_delay, Duration::from_secs(2));
        assert_eq!(config.request_timeout, Duration::from_secs(5));
    }
}
