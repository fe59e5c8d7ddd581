use jobfy_scraper_lib::aggregate::Counter;
use jobfy_scraper_lib::error::SinkError;
use jobfy_scraper_lib::{
    logger, AppConfig, CsvSink, HttpSessionFactory, JobOffer, JsonFileStore, ResultSink, RunCoordinator,
    RunRegistry, StoreSink,
};

use chrono::Local;
use clap::Parser;
use log::{info, warn, LevelFilter};
use std::collections::HashSet;
use std::error::Error;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

const OUTPUT_DIR: &str = "output";
const PREVIEW_LEN: usize = 5;

#[derive(Parser, Debug)]
#[command(name = "jobfy")]
#[command(about = "Multi-site job offer scraper")]
#[command(after_help = "Sites that need a login read INFOJOBS_USERNAME/INFOJOBS_PASSWORD and \
LINKEDIN_USERNAME/LINKEDIN_PASSWORD from the environment or a .env file.")]
struct Cli {
    /// Search term (e.g. "python developer")
    #[arg(short, long, default_value = "")]
    keyword: String,

    /// Location (e.g. "Madrid", "Remote")
    #[arg(short, long, default_value = "")]
    location: String,

    /// Comma-separated sites to scrape
    #[arg(short, long, value_delimiter = ',', default_value = "remoteok")]
    sites: Vec<String>,

    /// Scrape every available site
    #[arg(short, long)]
    all: bool,

    /// Custom CSV file name (written under output/)
    #[arg(short, long)]
    output: Option<String>,

    /// List available sites and exit
    #[arg(long)]
    list_sites: bool,

    /// Show site configuration status and exit
    #[arg(long)]
    status: bool,

    /// Save into the offer store instead of exporting CSV
    #[arg(long)]
    persist: bool,

    /// Debug-level logging
    #[arg(short, long)]
    verbose: bool,
}

/// Forwards to the real sink and keeps a copy for the summary.
struct RecordingSink {
    inner: Box<dyn ResultSink>,
    offers: Mutex<Vec<JobOffer>>,
}

impl RecordingSink {
    fn new(inner: Box<dyn ResultSink>) -> Self {
        RecordingSink { inner, offers: Mutex::new(Vec::new()) }
    }

    fn take(&self) -> Vec<JobOffer> {
        std::mem::take(&mut *self.offers.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

impl ResultSink for RecordingSink {
    fn known_links(&self) -> Result<HashSet<String>, SinkError> {
        self.inner.known_links()
    }

    fn write(&self, offers: &[JobOffer]) -> Result<usize, SinkError> {
        let written = self.inner.write(offers)?;
        self.offers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend_from_slice(offers);
        Ok(written)
    }
}

fn csv_path(output: Option<&str>, keyword: &str) -> PathBuf {
    let filename = match output {
        Some(name) if name.ends_with(".csv") => name.to_string(),
        Some(name) => format!("{}.csv", name),
        None => {
            let slug: String = if keyword.is_empty() {
                "all".to_string()
            } else {
                keyword.replace(' ', "_").chars().take(20).collect()
            };
            format!("jobs_{}_{}.csv", slug, Local::now().format("%Y%m%d_%H%M%S"))
        }
    };
    PathBuf::from(OUTPUT_DIR).join(filename)
}

fn print_site_status(coordinator: &RunCoordinator) {
    println!("\nConfigured sites:");
    println!("{}", "-".repeat(50));
    for site in coordinator.sites() {
        let status = match (site.requires_auth, site.credentials_configured) {
            (false, _) => "OK",
            (true, true) => "OK (credentials configured)",
            (true, false) => "PENDING (credentials required)",
        };
        println!("  {:15} {:8} - {}", site.name, if site.requires_auth { "[auth]" } else { "" }, status);
    }
    println!("{}", "-".repeat(50));
}

fn print_summary(offers: &[JobOffer]) {
    println!("\n{}", "=".repeat(60));
    println!("SEARCH SUMMARY");
    println!("{}", "=".repeat(60));
    println!("\nTotal offers found: {}", offers.len());

    let mut by_source = Counter::new();
    for offer in offers {
        by_source.add(offer.source());
    }
    println!("\nBy site:");
    for entry in by_source.top(usize::MAX) {
        println!("  - {}: {} offers", entry.name, entry.count);
    }

    if offers.is_empty() {
        return;
    }
    println!("\n{}", "-".repeat(60));
    println!("First offers:");
    println!("{}", "-".repeat(60));
    for (i, offer) in offers.iter().take(PREVIEW_LEN).enumerate() {
        println!("\n{}. {}", i + 1, offer.title);
        println!("   Company:  {}", offer.company);
        println!("   Location: {}", offer.location);
        if offer.salary != jobfy_scraper_lib::model::UNKNOWN {
            println!("   Salary:   {}", offer.salary);
        }
        println!("   Source:   {}", offer.source());
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    if cli.verbose {
        logger::init_with(LevelFilter::Debug);
    } else {
        logger::init();
    }
    let config = AppConfig::from_env();

    let csv_target = csv_path(cli.output.as_deref(), &cli.keyword);
    let inner: Box<dyn ResultSink> = if cli.persist {
        Box::new(StoreSink::new(Arc::new(JsonFileStore::open(&config.store_path)?)))
    } else {
        Box::new(CsvSink::new(&csv_target))
    };
    let sink = Arc::new(RecordingSink::new(inner));

    let coordinator = RunCoordinator::new(
        jobfy_scraper_lib::sources::default_adapters(&config),
        Arc::new(RunRegistry::new()),
        sink.clone(),
        Arc::new(HttpSessionFactory::new(config.request_timeout)),
        config.source_delay,
    );

    if cli.list_sites {
        println!("\nAvailable sites:");
        for site in coordinator.sites() {
            let auth = if site.requires_auth { " (login required)" } else { "" };
            println!("  - {}{}", site.id, auth);
        }
        return Ok(());
    }
    if cli.status {
        print_site_status(&coordinator);
        return Ok(());
    }

    let known: Vec<String> = coordinator.sites().into_iter().map(|s| s.id).collect();
    let requested: Vec<String> = if cli.all {
        known.clone()
    } else {
        cli.sites.iter().map(|s| s.trim().to_lowercase()).filter(|s| !s.is_empty()).collect()
    };
    let (sites, unknown): (Vec<String>, Vec<String>) = requested.into_iter().partition(|s| known.contains(s));
    for site in &unknown {
        warn!("Site '{}' not recognised, skipping", site);
    }
    if sites.is_empty() {
        return Err("no valid sites to scrape".into());
    }

    info!("Sites selected: {}", sites.join(", "));
    if !cli.keyword.is_empty() {
        info!("Keyword: '{}'", cli.keyword);
    }
    if !cli.location.is_empty() {
        info!("Location: '{}'", cli.location);
    }
    print_site_status(&coordinator);

    let run_id = coordinator.prepare_run(&sites[..], &cli.keyword, &cli.location)?;
    coordinator.execute_run(&run_id)?;
    let record = coordinator.get_run(&run_id)?;

    let offers = sink.take();
    if let Some(summary) = &record.error_summary {
        warn!("Run {} finished {} with issues: {}", record.id, record.status.as_str(), summary);
    }

    if offers.is_empty() {
        warn!("No job offers found");
    } else {
        print_summary(&offers);
        if cli.persist {
            println!("\nStored {} new offers in {}", record.offers_found, config.store_path);
        } else {
            println!("\nFile saved: {}", csv_target.display());
        }
    }

    info!("Scraping completed.");
    Ok(())
}
