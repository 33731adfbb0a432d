use axum::{
    Json, Router,
    extract::{Query, Request, State, rejection::JsonRejection},
    handler::HandlerWithoutStateExt,
    http::{HeaderMap, HeaderValue, Method, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{any, get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::engine::{RandomCounter, ReconciliationEngine, RekapResponse};
use crate::error::{RekapError, RekapResult};
use crate::model::{PendingCostItem, RekapRequest};
use crate::repository::SheetItemRepository;
use crate::sheets::{GoogleSheetsClient, SheetsClient};
use crate::token::{ServiceAccountTokenProvider, StaticTokenProvider, TokenProvider};

const DEFAULT_SHEET_RANGE: &str = "A:Z";
const ALLOW_METHODS: &str = "GET, POST, PUT, OPTIONS";
const ALLOW_HEADERS: &str = "Content-Type, Authorization, x-app-version";

pub struct AppState {
    pub engine: ReconciliationEngine,
    pub sheets: Arc<dyn SheetsClient>,
    pub version: String,
}

#[derive(Deserialize)]
struct SheetQuery {
    #[serde(rename = "sheetName")]
    sheet_name: Option<String>,
    range: Option<String>,
}

#[derive(Serialize)]
struct SheetResponse {
    success: bool,
    data: Vec<Vec<String>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckCostResponse {
    success: bool,
    zero_hpp_items: Vec<PendingCostItem>,
    total: usize,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: String,
}

/// Wire the production collaborators described by `config`
pub fn build_state(config: &Config) -> RekapResult<AppState> {
    let http = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()
        .map_err(|e| RekapError::Config(format!("failed to create HTTP client: {}", e)))?;

    let tokens: Arc<dyn TokenProvider> = match &config.access_token {
        Some(token) => Arc::new(StaticTokenProvider::new(token.clone())),
        None => Arc::new(ServiceAccountTokenProvider::new(
            config.service_account.clone(),
            http.clone(),
        )),
    };

    let sheets: Arc<dyn SheetsClient> = Arc::new(GoogleSheetsClient::new(
        http,
        config.sheets_api_base.clone(),
        config.spreadsheet_id.clone(),
        tokens,
    ));
    let repository = Arc::new(SheetItemRepository::new(
        sheets.clone(),
        config.sheets.clone(),
    ));
    let engine = ReconciliationEngine::new(repository, Arc::new(RandomCounter));

    Ok(AppState {
        engine,
        sheets,
        version: config.version.clone(),
    })
}

/// Build the full router: API routes, static fallback, CORS and tracing
pub fn router(state: Arc<AppState>, public_dir: impl AsRef<Path>) -> Router {
    let assets = ServeDir::new(public_dir).not_found_service(asset_not_found.into_service());
    let static_files = Router::new()
        .fallback_service(assets)
        .layer(SetResponseHeaderLayer::if_not_present(
            header::CACHE_CONTROL,
            HeaderValue::from_static("public, max-age=3600"),
        ));

    Router::new()
        .route("/api/rekap", post(submit_rekap).fallback(api_not_found))
        .route("/api/sheets", get(get_sheet_data).fallback(api_not_found))
        .route("/api/check-hpp", get(check_hpp).fallback(api_not_found))
        .route("/api/health", any(health))
        .route("/api/", any(api_not_found))
        .route("/api/*rest", any(api_not_found))
        .with_state(state)
        .merge(static_files)
        .layer(middleware::from_fn(cors))
        .layer(TraceLayer::new_for_http())
}

pub async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let state = Arc::new(build_state(&config)?);
    let app = router(state, &config.public_dir);

    let listener = TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(
        addr = %config.bind_addr,
        version = %config.version,
        public_dir = %config.public_dir.display(),
        "rekap server listening"
    );
    axum::serve(listener, app).await?;

    Ok(())
}

fn cors_headers(headers: &mut HeaderMap) {
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOW_METHODS),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(ALLOW_HEADERS),
    );
}

/// Answer every OPTIONS request directly and stamp CORS headers on API responses
async fn cors(request: Request, next: Next) -> Response {
    if request.method() == Method::OPTIONS {
        let mut response = StatusCode::OK.into_response();
        cors_headers(response.headers_mut());
        return response;
    }

    let is_api = request.uri().path().starts_with("/api/");
    let mut response = next.run(request).await;
    if is_api {
        cors_headers(response.headers_mut());
    }
    response
}

async fn submit_rekap(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RekapRequest>, JsonRejection>,
) -> RekapResult<Json<RekapResponse>> {
    let Json(payload) = payload.map_err(|e| RekapError::Validation(e.body_text()))?;
    let outcome = state.engine.submit(&payload).await?;
    Ok(Json(outcome.into()))
}

async fn get_sheet_data(
    Query(params): Query<SheetQuery>,
    State(state): State<Arc<AppState>>,
) -> RekapResult<Json<SheetResponse>> {
    let sheet_name = params
        .sheet_name
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| RekapError::Validation("Parameter sheetName is required".to_string()))?;
    let range = params
        .range
        .filter(|r| !r.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_SHEET_RANGE.to_string());

    let data = state.sheets.read(&sheet_name, &range).await?;
    Ok(Json(SheetResponse {
        success: true,
        data,
    }))
}

async fn check_hpp(State(state): State<Arc<AppState>>) -> RekapResult<Json<CheckCostResponse>> {
    let items = state.engine.zero_cost_items().await?;
    Ok(Json(CheckCostResponse {
        success: true,
        total: items.len(),
        zero_hpp_items: items,
    }))
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: state.version.clone(),
    })
}

async fn api_not_found() -> (StatusCode, Json<Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "Endpoint not found" })),
    )
}

async fn asset_not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Not Found")
}
