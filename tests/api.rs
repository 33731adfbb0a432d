use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use serde_json::{Value, json};
use tower::ServiceExt;

use rekap_so::app::{AppState, router};
use rekap_so::config::SheetNames;
use rekap_so::engine::{ReconciliationEngine, StockCounter};
use rekap_so::logging;
use rekap_so::model::Item;
use rekap_so::repository::SheetItemRepository;
use rekap_so::sheets::{MemorySheets, SheetCall, SheetsClient};

/// Deterministic counts so record values can be asserted
struct FixedCounter {
    stock: i64,
    variance: i64,
}

impl StockCounter for FixedCounter {
    fn stock_quantity(&self, _item: &Item) -> i64 {
        self.stock
    }

    fn variance_quantity(&self, _item: &Item) -> i64 {
        self.variance
    }
}

fn master(rows: Vec<Vec<&str>>) -> Arc<MemorySheets> {
    let mut sheet = vec![vec!["PLU", "DESCP", "C1", "TAG", "HPP"]];
    sheet.extend(rows);
    Arc::new(MemorySheets::new().with_sheet("MS", sheet))
}

fn app_with(sheets: Arc<MemorySheets>, variance: i64, public_dir: &std::path::Path) -> Router {
    logging::init_test();
    let client: Arc<dyn SheetsClient> = sheets;
    let repository = Arc::new(SheetItemRepository::new(
        client.clone(),
        SheetNames::default(),
    ));
    let engine = ReconciliationEngine::new(
        repository,
        Arc::new(FixedCounter {
            stock: 10,
            variance,
        }),
    );
    let state = Arc::new(AppState {
        engine,
        sheets: client,
        version: "test-1".to_string(),
    });
    router(state, public_dir)
}

fn app(sheets: Arc<MemorySheets>) -> Router {
    app_with(sheets, 2, std::path::Path::new("does-not-exist"))
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, headers, body.to_vec())
}

async fn send_json(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let (status, _, body) = send(app, request).await;
    (status, serde_json::from_slice(&body).unwrap())
}

fn post_rekap(body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/api/rekap")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn missing_fields_are_rejected_without_writes() {
    let sheets = master(vec![vec!["A1", "Widget", "Food", "X", "5"]]);
    let (status, body) = send_json(
        app(sheets.clone()),
        post_rekap(json!({ "type": "so", "tanggal": "2024-01-01", "shift": "1" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], json!(false));
    assert!(body["error"].as_str().unwrap().contains("required"));
    assert_eq!(sheets.write_count(), 0);
}

#[tokio::test]
async fn malformed_body_is_a_validation_error() {
    let sheets = master(vec![vec!["A1", "Widget", "Food", "X", "5"]]);
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/rekap")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let (status, body) = send_json(app(sheets.clone()), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], json!(false));
    assert_eq!(sheets.write_count(), 0);
}

#[tokio::test]
async fn costed_item_produces_one_stock_record() {
    let sheets = master(vec![vec!["A1", "Widget", "Food", "X", "5"]]);
    let (status, body) = send_json(
        app(sheets.clone()),
        post_rekap(json!({
            "type": "so",
            "tanggal": "2024-01-01",
            "shift": "1",
            "operator": "Ana"
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["message"], json!("Rekap so created successfully"));
    assert_eq!(body["data"]["rekapSO"]["totalRecords"], json!(1));
    assert!(body["data"].get("rekapRekonsiliasi").is_none());

    let rows = sheets.rows("RekapSo");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0][0], "ID_REKAP");
    assert_eq!(rows[0].len(), 11);
    let record = &rows[1];
    assert!(record[0].starts_with("REKAP_A1_2024-01-01_"));
    assert_eq!(record[1], "2024-01-01");
    assert_eq!(record[2], "Ana");
    assert_eq!(record[3], "A1");
    assert_eq!(record[7], "10");
    assert_eq!(record[8], "2");
    assert_eq!(record[9], "10.0");
    assert_eq!(record.len(), 11);
    assert!(sheets.rows("RekapRekonsiliasi").is_empty());
}

#[tokio::test]
async fn zero_cost_item_is_reported_pending() {
    let sheets = master(vec![vec!["A1", "Widget", "Food", "X", "0"]]);
    let (status, body) = send_json(
        app(sheets.clone()),
        post_rekap(json!({
            "type": "so",
            "tanggal": "2024-01-01",
            "shift": "1",
            "operator": "Ana"
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(false));
    assert_eq!(
        body["needHppInput"],
        json!([{ "plu": "A1", "descp": "Widget", "hpp": 0 }])
    );
    assert_eq!(sheets.write_count(), 0);
}

#[tokio::test]
async fn supplied_costs_are_backfilled_even_when_others_stay_pending() {
    let sheets = master(vec![
        vec!["A1", "Widget", "Food", "X", "0"],
        vec!["B2", "Gadget", "Tools", "Y", "0"],
    ]);
    let (_, body) = send_json(
        app(sheets.clone()),
        post_rekap(json!({
            "type": "both",
            "tanggal": "2024-01-01",
            "shift": "2",
            "operator": "Budi",
            "hppValues": { "A1": 12.5 }
        })),
    )
    .await;

    assert_eq!(body["success"], json!(false));
    assert_eq!(body["needHppInput"][0]["plu"], json!("B2"));
    assert_eq!(body["needHppInput"].as_array().unwrap().len(), 1);

    assert_eq!(sheets.rows("MS")[1][4], "12.5");
    assert!(sheets.calls().iter().any(|c| matches!(
        c,
        SheetCall::Update { sheet, range } if sheet == "MS" && range == "E2"
    )));
    assert!(
        !sheets
            .calls()
            .iter()
            .any(|c| matches!(c, SheetCall::Append { .. }))
    );
}

#[tokio::test]
async fn both_sets_share_counts_and_negative_variance_values() {
    let sheets = master(vec![vec!["A1", "Widget", "Food", "X", "2.5"]]);
    let (_, body) = send_json(
        app_with(sheets.clone(), -3, std::path::Path::new("does-not-exist")),
        post_rekap(json!({
            "type": "both",
            "tanggal": "2024-01-01",
            "shift": "1",
            "operator": "Ana"
        })),
    )
    .await;

    assert_eq!(body["success"], json!(true));
    assert_eq!(body["data"]["rekapSO"]["totalRecords"], json!(1));
    assert_eq!(body["data"]["rekapRekonsiliasi"]["totalRecords"], json!(1));

    let stock = sheets.rows("RekapSo");
    let reconciliation = sheets.rows("RekapRekonsiliasi");
    assert_eq!(stock[1][8], "-3");
    assert_eq!(stock[1][9], "-7.5");
    assert_eq!(reconciliation[0].len(), 10);
    assert_eq!(reconciliation[1].len(), 10);
    assert_eq!(reconciliation[1][7], stock[1][7]);
    assert_eq!(reconciliation[1][9], "-7.5");
}

#[tokio::test]
async fn header_is_written_once_across_submissions() {
    let sheets = master(vec![vec!["A1", "Widget", "Food", "X", "5"]]);
    let body = json!({
        "type": "so",
        "tanggal": "2024-01-01",
        "shift": "1",
        "operator": "Ana"
    });

    send_json(app(sheets.clone()), post_rekap(body.clone())).await;
    send_json(app(sheets.clone()), post_rekap(body)).await;

    let rows = sheets.rows("RekapSo");
    assert_eq!(rows.len(), 3);
    assert_eq!(rows.iter().filter(|r| r[0] == "ID_REKAP").count(), 1);
}

#[tokio::test]
async fn check_hpp_lists_zero_cost_items() {
    let sheets = master(vec![
        vec!["A1", "Widget", "Food", "X", "5"],
        vec!["B2", "Gadget", "Tools", "Y", ""],
    ]);
    let (status, body) = send_json(app(sheets), get("/api/check-hpp")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["total"], json!(1));
    assert_eq!(body["zeroHppItems"][0]["plu"], json!("B2"));
}

#[tokio::test]
async fn sheet_data_requires_sheet_name() {
    let sheets = master(vec![vec!["A1", "Widget", "Food", "X", "5"]]);
    let (status, body) = send_json(app(sheets.clone()), get("/api/sheets")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("Parameter sheetName is required"));

    let (status, body) = send_json(app(sheets), get("/api/sheets?sheetName=MS&range=A:H")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][1][0], json!("A1"));
}

#[tokio::test]
async fn upstream_failure_is_a_server_error() {
    let sheets = master(vec![vec!["A1", "Widget", "Food", "X", "5"]]);
    sheets.fail_with(403, "The caller does not have permission");

    let (status, body) = send_json(app(sheets), get("/api/check-hpp")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], json!(false));
    assert!(body["error"].as_str().unwrap().contains("403"));
}

#[tokio::test]
async fn health_reports_version() {
    let sheets = master(Vec::new());
    sheets.fail_with(503, "The service is currently unavailable");
    let (status, headers, body) = send(app(sheets.clone()), get("/api/health")).await;
    let body: Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok", "version": "test-1" }));
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    assert!(sheets.calls().is_empty());
}

#[tokio::test]
async fn empty_master_is_data_unavailable() {
    let rekap = json!({
        "type": "both",
        "tanggal": "2024-01-01",
        "shift": "1",
        "operator": "Ana"
    });

    let header_only = master(Vec::new());
    let (status, body) = send_json(app(header_only.clone()), post_rekap(rekap.clone())).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["error"], json!("No items found in master sheet"));
    assert_eq!(header_only.write_count(), 0);

    let blank = Arc::new(MemorySheets::new().with_sheet("MS", Vec::new()));
    let (status, body) = send_json(app(blank.clone()), post_rekap(rekap)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["error"], json!("No data found in sheet MS"));
    assert_eq!(blank.write_count(), 0);
}

#[tokio::test]
async fn options_requests_short_circuit_with_cors() {
    let sheets = master(Vec::new());
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/api/rekap")
        .body(Body::empty())
        .unwrap();
    let (status, headers, _) = send(app(sheets.clone()), request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    assert_eq!(
        headers[header::ACCESS_CONTROL_ALLOW_METHODS],
        "GET, POST, PUT, OPTIONS"
    );
    assert!(sheets.calls().is_empty());
}

#[tokio::test]
async fn unknown_api_paths_are_not_found() {
    let sheets = master(Vec::new());
    for request in [
        get("/api/unknown"),
        get("/api/"),
        get("/api/rekap"),
    ] {
        let (status, body) = send_json(app(sheets.clone()), request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({ "error": "Endpoint not found" }));
    }
}

#[tokio::test]
async fn static_assets_are_served_with_cache_header() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("index.html"), "<h1>rekap</h1>").unwrap();
    let sheets = master(Vec::new());

    let (status, headers, body) = send(app_with(sheets.clone(), 0, dir.path()), get("/")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"<h1>rekap</h1>");
    assert_eq!(headers[header::CACHE_CONTROL], "public, max-age=3600");
    assert!(headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());

    let (status, _, body) = send(app_with(sheets, 0, dir.path()), get("/missing.js")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, b"Not Found");
}
