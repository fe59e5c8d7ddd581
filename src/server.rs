use actix_cors::Cors;
use actix_web::{delete, get, post, web, App, HttpResponse, HttpServer, Responder};
use log::error;
use serde::Deserialize;
use std::sync::Arc;

use jobfy_scraper_lib::error::{RegistryError, ScrapeError, StoreError};
use jobfy_scraper_lib::{
    logger, AppConfig, HttpSessionFactory, JsonFileStore, OfferFilter, OfferStats, OfferStore, RunCoordinator,
    RunRegistry, StoreSink,
};

const DEFAULT_PAGE_SIZE: usize = 100;
const MAX_PAGE_SIZE: usize = 500;
const DEFAULT_LOG_LIMIT: usize = 10;

struct AppState {
    coordinator: RunCoordinator,
    store: Arc<dyn OfferStore>,
}

/// Maps core errors onto status codes: bad input 400, missing 404, anything else 500.
fn error_response(e: impl Into<ScrapeError>) -> HttpResponse {
    let e = e.into();
    let body = serde_json::json!({ "detail": e.to_string() });
    match e {
        ScrapeError::Validation(_) => HttpResponse::BadRequest().json(body),
        ScrapeError::Registry(RegistryError::RunNotFound(_)) | ScrapeError::Store(StoreError::NotFound(_)) => {
            HttpResponse::NotFound().json(body)
        }
        ScrapeError::Store(other) => {
            error!("Store error: {}", other);
            HttpResponse::InternalServerError().json(body)
        }
    }
}

#[get("/api/health")]
async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

#[derive(Deserialize)]
struct JobsQuery {
    source: Option<String>,
    search: Option<String>,
    limit: Option<usize>,
    offset: Option<usize>,
}

#[get("/api/jobs")]
async fn list_jobs(query: web::Query<JobsQuery>, data: web::Data<AppState>) -> impl Responder {
    let query = query.into_inner();
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE);
    if !(1..=MAX_PAGE_SIZE).contains(&limit) {
        return HttpResponse::BadRequest()
            .json(serde_json::json!({ "detail": format!("limit must be between 1 and {}", MAX_PAGE_SIZE) }));
    }
    let offset = query.offset.unwrap_or(0);
    let filter = OfferFilter { source: query.source, search_text: query.search };

    match data.store.list(&filter, limit, offset) {
        Ok(page) => HttpResponse::Ok().json(serde_json::json!({
            "jobs": page.offers,
            "total": page.total,
            "limit": limit,
            "offset": offset,
        })),
        Err(e) => error_response(e),
    }
}

#[get("/api/jobs/{job_id}")]
async fn get_job(path: web::Path<u64>, data: web::Data<AppState>) -> impl Responder {
    match data.store.get(path.into_inner()) {
        Ok(job) => HttpResponse::Ok().json(job),
        Err(e) => error_response(e),
    }
}

#[delete("/api/jobs/{job_id}")]
async fn delete_job(path: web::Path<u64>, data: web::Data<AppState>) -> impl Responder {
    let job_id = path.into_inner();
    match data.store.delete(job_id) {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({ "message": "Job deleted", "id": job_id })),
        Err(e) => error_response(e),
    }
}

#[delete("/api/jobs")]
async fn clear_jobs(data: web::Data<AppState>) -> impl Responder {
    match data.store.clear() {
        Ok(count) => HttpResponse::Ok().json(serde_json::json!({ "message": format!("Deleted {} jobs", count), "deleted": count })),
        Err(e) => error_response(e),
    }
}

#[get("/api/stats")]
async fn get_stats(data: web::Data<AppState>) -> impl Responder {
    match data.store.all() {
        Ok(offers) => HttpResponse::Ok().json(OfferStats::from_offers(&offers)),
        Err(e) => error_response(e),
    }
}

#[get("/api/sites")]
async fn list_sites(data: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({ "sites": data.coordinator.sites() }))
}

#[derive(Deserialize)]
struct ScrapeQuery {
    #[serde(default = "default_sites")]
    sites: String,
    #[serde(default)]
    keyword: String,
    #[serde(default)]
    location: String,
}

fn default_sites() -> String {
    "remoteok".to_string()
}

#[post("/api/scrape")]
async fn start_scrape(query: web::Query<ScrapeQuery>, data: web::Data<AppState>) -> impl Responder {
    let sites: Vec<&str> = query.sites.split(',').collect();
    match data.coordinator.start_run(&sites[..], &query.keyword, &query.location) {
        Ok(run_id) => {
            let record = data.coordinator.get_run(&run_id).ok();
            HttpResponse::Ok().json(serde_json::json!({
                "message": "Scraping started",
                "run_id": run_id,
                "sites": record.map(|r| r.sources).unwrap_or_default(),
                "keyword": query.keyword,
                "location": query.location,
            }))
        }
        Err(e) => error_response(e),
    }
}

#[derive(Deserialize)]
struct LogsQuery {
    limit: Option<usize>,
}

#[get("/api/scrape/logs")]
async fn list_runs(query: web::Query<LogsQuery>, data: web::Data<AppState>) -> impl Responder {
    let limit = query.limit.unwrap_or(DEFAULT_LOG_LIMIT);
    HttpResponse::Ok().json(serde_json::json!({ "logs": data.coordinator.list_runs(limit) }))
}

#[get("/api/scrape/logs/{run_id}")]
async fn get_run(path: web::Path<String>, data: web::Data<AppState>) -> impl Responder {
    match data.coordinator.get_run(&path.into_inner()) {
        Ok(record) => HttpResponse::Ok().json(record),
        Err(e) => error_response(e),
    }
}

#[post("/api/scrape/logs/{run_id}/cancel")]
async fn cancel_run(path: web::Path<String>, data: web::Data<AppState>) -> impl Responder {
    let run_id = path.into_inner();
    match data.coordinator.cancel_run(&run_id) {
        Ok(accepted) => HttpResponse::Ok().json(serde_json::json!({ "run_id": run_id, "cancel_requested": accepted })),
        Err(e) => error_response(e),
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    logger::init();
    let config = AppConfig::from_env();

    let store: Arc<dyn OfferStore> = match JsonFileStore::open(&config.store_path) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!("Cannot open offer store {}: {}", config.store_path, e);
            return Err(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()));
        }
    };

    let registry = match RunRegistry::open(&config.runs_path) {
        Ok(registry) => Arc::new(registry),
        Err(e) => {
            error!("Cannot open run history {}: {}", config.runs_path, e);
            return Err(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()));
        }
    };

    let coordinator = RunCoordinator::new(
        jobfy_scraper_lib::sources::default_adapters(&config),
        registry,
        Arc::new(StoreSink::new(store.clone())),
        Arc::new(HttpSessionFactory::new(config.request_timeout)),
        config.source_delay,
    );
    let state = web::Data::new(AppState { coordinator, store });

    log::info!("Starting Web Server at http://{}", config.bind);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header();

        App::new()
            .wrap(cors)
            .app_data(state.clone())
            .service(health_check)
            .service(list_jobs)
            .service(clear_jobs)
            .service(get_job)
            .service(delete_job)
            .service(get_stats)
            .service(list_sites)
            .service(start_scrape)
            .service(list_runs)
            .service(get_run)
            .service(cancel_run)
    })
    .bind(config.bind.as_str())?
    .run()
    .await
}
