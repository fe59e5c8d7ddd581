use thiserror::Error;

/// Failure of a single HTTP exchange.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("timeout while fetching {url}")]
    Timeout { url: String },
    #[error("HTTP {status} from {url}")]
    Http { url: String, status: u16 },
    #[error("transport error for {url}: {message}")]
    Transport { url: String, message: String },
}

/// Everything an adapter run may signal. None of these fail the whole run.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("authentication failed for {site}: {reason}")]
    Authentication { site: String, reason: String },
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("could not open HTTP session: {0}")]
    Session(String),
    #[error("adapter panicked: {0}")]
    Panicked(String),
    #[error("no adapter registered for '{0}'")]
    UnknownSource(String),
}

/// Failure to turn one candidate node (or a whole feed) into an offer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("no title found")]
    MissingTitle,
    #[error("no usable link for '{0}'")]
    MissingLink(String),
    #[error("invalid feed: {0}")]
    InvalidFeed(String),
}

/// Bad caller input to `start_run`; the run is never created.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("no sources specified")]
    EmptySourceList,
    #[error("invalid sources: {}", .0.join(", "))]
    InvalidSource(Vec<String>),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("run {0} not found")]
    RunNotFound(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("offer {0} not found")]
    NotFound(u64),
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("export I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Coordinator-level failure outside the per-source loop. Fatal to the run.
#[derive(Debug, Error)]
pub enum OrchestrationError {
    #[error("result sink unavailable: {0}")]
    Sink(#[from] SinkError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Errors surfaced synchronously through the core-exposed API.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Store(#[from] StoreError),
}
