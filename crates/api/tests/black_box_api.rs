use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, SecondsFormat, Utc};
use reqwest::StatusCode;
use serde_json::json;

use warehouse_api::app::{AppServices, build_app};
use warehouse_infra::store::InMemoryStore;
use warehouse_infra::{ReplenishmentRunner, ReplenishmentRunnerConfig};

// Demo data ids: region Sochi=1 with storage 1, Moscow=2 with storages 2 and 3, Kazan=3 empty.
// Products: Laptop=1, Monitor=2 (Electronics), Office chair=3 (Furniture).
const LAPTOP: i64 = 1;
const CHAIR: i64 = 3;
const SOCHI_CENTRAL: i64 = 1;
const MOSCOW_NORTH: i64 = 2;

struct TestServer {
    base_url: String,
    client: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        let store = Arc::new(InMemoryStore::with_demo_data().expect("demo data"));
        let services = AppServices::new(
            store,
            Duration::from_secs(5),
            ReplenishmentRunner::new(ReplenishmentRunnerConfig::default()),
        );

        // Same router as prod, bound to an ephemeral port.
        let app = build_app(Arc::new(services));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            client: reqwest::Client::new(),
            handle,
        }
    }

    async fn post(&self, path: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
        let res = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = res.status();
        (status, res.json().await.unwrap())
    }

    async fn get(&self, path: &str) -> (StatusCode, serde_json::Value) {
        let res = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await
            .unwrap();
        let status = res.status();
        (status, res.json().await.unwrap())
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[tokio::test]
async fn health_is_ok() {
    let srv = TestServer::spawn().await;
    let res = srv
        .client
        .get(format!("{}/health", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn increase_then_decrease_reports_running_total() {
    let srv = TestServer::spawn().await;

    let (status, body) = srv
        .post(
            "/stock/increase",
            json!({ "product_id": LAPTOP, "storage_id": SOCHI_CENTRAL, "amount": 25 }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["new_count"], 25);
    assert_eq!(body["kind"], "LOADING");
    assert_eq!(
        body["message"],
        "Total count of product with id='1' on storage with id='1': 25"
    );

    let (status, body) = srv
        .post(
            "/stock/decrease",
            json!({ "product_id": LAPTOP, "storage_id": SOCHI_CENTRAL, "amount": 10 }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["new_count"], 15);
}

#[tokio::test]
async fn stock_errors_map_to_status_codes() {
    let srv = TestServer::spawn().await;
    srv.post(
        "/stock/increase",
        json!({ "product_id": LAPTOP, "storage_id": SOCHI_CENTRAL, "amount": 25 }),
    )
    .await;

    let (status, body) = srv
        .post(
            "/stock/decrease",
            json!({ "product_id": LAPTOP, "storage_id": SOCHI_CENTRAL, "amount": 30 }),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "insufficient_stock");
    let msg = body["message"].as_str().unwrap();
    assert!(msg.contains("30") && msg.contains("25"), "{msg}");

    let (status, body) = srv
        .post(
            "/stock/decrease",
            json!({ "product_id": CHAIR, "storage_id": SOCHI_CENTRAL, "amount": 1 }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    let (status, body) = srv
        .post(
            "/stock/increase",
            json!({ "product_id": 404, "storage_id": SOCHI_CENTRAL, "amount": 1 }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Product with id='404' not found");

    let (status, body) = srv
        .post(
            "/stock/increase",
            json!({ "product_id": LAPTOP, "storage_id": SOCHI_CENTRAL, "amount": 0 }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_amount");

    let (status, body) = srv
        .post(
            "/stock/increase",
            json!({ "product_id": LAPTOP, "storage_id": SOCHI_CENTRAL }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_amount");
}

#[tokio::test]
async fn resolve_storages_by_region_and_kind() {
    let srv = TestServer::spawn().await;

    let (status, body) = srv
        .post(
            "/storages/resolve",
            json!({ "product_id": LAPTOP, "region": "Moscow", "amount": 5, "kind": "LOADING" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<_> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["Moscow North", "Moscow South"]);

    srv.post(
        "/stock/increase",
        json!({ "product_id": LAPTOP, "storage_id": MOSCOW_NORTH, "amount": 80 }),
    )
    .await;
    let (status, body) = srv
        .post(
            "/storages/resolve",
            json!({ "product_id": LAPTOP, "region": "Moscow", "amount": 80, "kind": "shipment" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["id"], MOSCOW_NORTH);
    assert_eq!(body[0]["region"], "Moscow");

    let (status, body) = srv
        .post(
            "/storages/resolve",
            json!({ "product_id": LAPTOP, "region": "Moscow", "amount": 81, "kind": "SHIPMENT" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.as_array().unwrap().is_empty());

    let (status, body) = srv
        .post(
            "/storages/resolve",
            json!({ "product_id": LAPTOP, "region": "Kazan", "amount": 1, "kind": "LOADING" }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(
        body["message"],
        "Storage is missing in region Kazan. LOADING is not possible."
    );

    let (status, body) = srv
        .post(
            "/storages/resolve",
            json!({ "product_id": LAPTOP, "region": "Moscow", "amount": 1, "kind": "TRANSFER" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_kind");
}

#[tokio::test]
async fn list_products_in_storage_with_category_filter() {
    let srv = TestServer::spawn().await;
    for (product, amount) in [(LAPTOP, 2), (CHAIR, 3)] {
        srv.post(
            "/stock/increase",
            json!({ "product_id": product, "storage_id": SOCHI_CENTRAL, "amount": amount }),
        )
        .await;
    }

    let (status, body) = srv.get("/storages/1/products").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);

    let (status, body) = srv.get("/storages/1/products?category=Furniture").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["name"], "Office chair");
    assert_eq!(body[0]["count"], 3);

    let (status, body) = srv.get("/storages/1/products?category=Toys").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Category with name='Toys' not found");

    let (status, _) = srv.get("/storages/99/products").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn manual_run_persists_notices_visible_in_report() {
    let srv = TestServer::spawn().await;
    let started = Utc::now() - ChronoDuration::seconds(1);
    for (path, amount) in [("/stock/increase", 80), ("/stock/decrease", 20)] {
        let (status, _) = srv
            .post(
                path,
                json!({ "product_id": LAPTOP, "storage_id": SOCHI_CENTRAL, "amount": amount }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = srv.post("/analysis/run", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");
    assert_eq!(body["operations_read"], 2);
    assert_eq!(body["pairs_considered"], 1);
    assert_eq!(body["notices"][0]["direction"], "DECREASE");
    assert_eq!(body["notices"][0]["operation"], "LOADING");

    let res = srv
        .client
        .get(format!("{}/analysis/notices", srv.base_url))
        .query(&[
            ("from", started.to_rfc3339_opts(SecondsFormat::Millis, true)),
            (
                "to",
                (Utc::now() + ChronoDuration::seconds(1)).to_rfc3339_opts(SecondsFormat::Millis, true),
            ),
        ])
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let report: serde_json::Value = res.json().await.unwrap();
    let notices = report["notices"].as_array().unwrap();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0]["product_id"], LAPTOP);
    assert_eq!(notices[0]["storage_id"], SOCHI_CENTRAL);
}

#[tokio::test]
async fn notice_report_rejects_inverted_range() {
    let srv = TestServer::spawn().await;
    let now = Utc::now();
    let res = srv
        .client
        .get(format!("{}/analysis/notices", srv.base_url))
        .query(&[
            ("from", now.to_rfc3339_opts(SecondsFormat::Secs, true)),
            (
                "to",
                (now - ChronoDuration::hours(1)).to_rfc3339_opts(SecondsFormat::Secs, true),
            ),
        ])
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "invalid_range");
}
