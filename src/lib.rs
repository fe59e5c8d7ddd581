pub mod aggregate;
pub mod config;
pub mod coordinator;
pub mod delay_manager;
pub mod error;
pub mod fetcher;
pub mod heuristics;
pub mod logger;
pub mod model;
pub mod registry;
pub mod sink;
pub mod sources;
pub mod store;

// Exporting types for convenience
pub use aggregate::OfferStats;
pub use config::AppConfig;
pub use coordinator::{ExecutionOutcome, RunCoordinator, SiteInfo};
pub use error::{ScrapeError, SourceError, ValidationError};
pub use fetcher::{Fetcher, HttpSessionFactory, Page, SessionFactory};
pub use model::{JobOffer, RunRecord, RunStatus, SearchQuery, StoredOffer};
pub use registry::RunRegistry;
pub use sink::{CsvSink, ResultSink, StoreSink};
pub use sources::SourceAdapter;
pub use store::{JsonFileStore, MemoryStore, OfferFilter, OfferStore};
