// Backend API server for the portfolio site's live widgets:
// GitHub projects + OpenSky live flights + BITRE on-time performance.
//
// Endpoints consumed by the statically-hosted portfolio page:
// - GitHub repos:    https://api.github.com/users/{user}/repos
// - OpenSky states:  https://opensky-network.org/api/states/all?lamin=..
// - BITRE OTP:       local snapshot / data.gov.au datastore / raw CSV
//
// Everything is fetched per request and normalized on the way through;
// nothing is cached or persisted.

use actix_cors::Cors;
use actix_web::{App, HttpResponse, HttpServer, middleware, web};
use reqwest::Client;
use serde::{Deserialize, Serialize};

mod bitre;
mod fallback;
mod geo;
mod github;
mod months;
mod opensky;
mod tabular;

use bitre::{BitreConfig, BitreService};
use fallback::FetchError;
use github::{GithubConfig, GithubService};
use opensky::{OpenSkyConfig, OpenSkyService};

const DEFAULT_FLIGHT_LIMIT: usize = 30;
const MAX_FLIGHT_LIMIT: usize = 100;

#[derive(Clone)]
struct AppState {
    github: GithubService,
    opensky: OpenSkyService,
    bitre: BitreService,
}

#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    error: Option<String>,
    timestamp: i64,
    source: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn success(data: T, source: &str) -> Self {
        ApiResponse {
            success: true,
            data: Some(data),
            error: None,
            timestamp: chrono::Utc::now().timestamp(),
            source: Some(source.to_string()),
        }
    }

    fn error(message: String) -> Self {
        ApiResponse {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().timestamp(),
            source: None,
        }
    }
}

/// Map a fetch failure onto the status the page should see: 429 keeps the
/// rate-limit hint visible, 404 marks a missing resource, everything else
/// is an upstream problem.
fn error_response(context: &str, err: &FetchError) -> HttpResponse {
    eprintln!("⚠️  {} failed: {}", context, err);
    let body = ApiResponse::<()>::error(err.to_string());
    match err {
        FetchError::RateLimited { .. } => HttpResponse::TooManyRequests().json(body),
        _ if err.is_not_found() => HttpResponse::NotFound().json(body),
        _ => HttpResponse::BadGateway().json(body),
    }
}

// ============================================================================
// API Endpoints
// ============================================================================

async fn get_projects(state: web::Data<AppState>) -> HttpResponse {
    match state.github.fetch_repos().await {
        Ok(repos) => {
            println!("📦 Projects requested: {} repositories", repos.len());
            HttpResponse::Ok().json(ApiResponse::success(repos, "GitHub"))
        }
        Err(e) => error_response("GitHub repo listing", &e),
    }
}

async fn get_project_detail(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> HttpResponse {
    let name = path.into_inner();
    match state.github.fetch_repo(&name).await {
        Ok(repo) => {
            println!("📦 Project retrieved: {}/{}", state.github.user(), repo.name);
            HttpResponse::Ok().json(ApiResponse::success(repo, "GitHub"))
        }
        Err(e) => error_response("GitHub repo detail", &e),
    }
}

#[derive(Deserialize)]
struct FlightsQuery {
    limit: Option<usize>,
}

async fn get_flights(
    state: web::Data<AppState>,
    query: web::Query<FlightsQuery>,
) -> HttpResponse {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_FLIGHT_LIMIT)
        .clamp(1, MAX_FLIGHT_LIMIT);
    match state.opensky.fetch_ranked(limit).await {
        Ok(flights) => {
            println!("✈️  Flights requested: {} ranked (limit {})", flights.len(), limit);
            HttpResponse::Ok().json(ApiResponse::success(flights, "OpenSky"))
        }
        Err(e) => error_response("OpenSky states", &e),
    }
}

async fn get_flights_count(state: web::Data<AppState>) -> HttpResponse {
    match state.opensky.fetch_count().await {
        Ok(count) => {
            println!("✈️  Flight count requested: {} in box", count);
            HttpResponse::Ok().json(ApiResponse::success(
                serde_json::json!({ "count": count }),
                "OpenSky",
            ))
        }
        Err(e) => error_response("OpenSky count", &e),
    }
}

async fn get_delays(state: web::Data<AppState>) -> HttpResponse {
    match state.bitre.fetch_summary().await {
        Ok(summary) => {
            println!("🛬 Delays requested: {} months", summary.months.len());
            HttpResponse::Ok().json(ApiResponse::success(summary, "BITRE"))
        }
        Err(e) => error_response("BITRE summary", &e),
    }
}

async fn get_delay_month(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> HttpResponse {
    let wanted = path.into_inner();
    match state.bitre.fetch_summary().await {
        Ok(summary) => {
            let key = if wanted == "latest" {
                summary.months.last().map(|m| m.key.clone())
            } else {
                Some(wanted.clone())
            };
            match key.and_then(|k| summary.by_month.get(&k).map(|v| (k.clone(), v.clone()))) {
                Some((key, records)) => {
                    println!("🛬 Delay month retrieved: {} ({} airlines)", key, records.len());
                    HttpResponse::Ok().json(ApiResponse::success(
                        serde_json::json!({ "month": key, "items": records }),
                        "BITRE",
                    ))
                }
                None => HttpResponse::NotFound().json(ApiResponse::<()>::error(format!(
                    "Month '{}' not found",
                    wanted
                ))),
            }
        }
        Err(e) => error_response("BITRE month", &e),
    }
}

async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "Portfolio Live Data API",
        "version": env!("CARGO_PKG_VERSION"),
        "sources": ["GitHub", "OpenSky", "BITRE"],
        "timestamp": chrono::Utc::now().timestamp(),
    }))
}

// ============================================================================
// Server Setup
// ============================================================================

async fn run_server(port: u16, github_config: GithubConfig) -> std::io::Result<()> {
    let client = Client::builder()
        .build()
        .map_err(|e| std::io::Error::other(format!("Failed to create HTTP client: {}", e)))?;

    let app_state = AppState {
        github: GithubService::new(client.clone(), github_config),
        opensky: OpenSkyService::new(client.clone(), OpenSkyConfig::default()),
        bitre: BitreService::new(client, BitreConfig::default()),
    };

    println!("🌐 Server running on: http://0.0.0.0:{}", port);
    println!("\n📍 Available Routes:");
    println!("   GET  /health                 - Health check");
    println!("   GET  /api/projects           - GitHub repositories");
    println!("   GET  /api/projects/:name     - Repository detail");
    println!("   GET  /api/flights            - Live flights ranked by distance to SYD");
    println!("   GET  /api/flights/count      - Live flight count in the Sydney box");
    println!("   GET  /api/delays             - Monthly lateness by airline (SYD departures)");
    println!("   GET  /api/delays/:month      - One month (YYYY-MM, or 'latest')\n");

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .route("/health", web::get().to(health_check))
            .service(
                web::scope("/api")
                    .route("/projects", web::get().to(get_projects))
                    .route("/projects/{name}", web::get().to(get_project_detail))
                    .route("/flights", web::get().to(get_flights))
                    .route("/flights/count", web::get().to(get_flights_count))
                    .route("/delays", web::get().to(get_delays))
                    .route("/delays/{month}", web::get().to(get_delay_month)),
            )
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}

fn main() -> std::io::Result<()> {
    println!("\n╔════════════════════════════════════════════════════════════╗");
    println!("║   🚀 Portfolio Live Data API                               ║");
    println!("║      GitHub · OpenSky · BITRE                              ║");
    println!("╚════════════════════════════════════════════════════════════╝\n");

    let port = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);

    let mut github_config = GithubConfig::default();
    if let Ok(user) = std::env::var("GITHUB_USER") {
        github_config.user = user;
    }
    println!("📡 Serving live data for GitHub user: {}", github_config.user);

    actix_web::rt::System::new().block_on(run_server(port, github_config))
}
