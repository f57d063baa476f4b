//! Integration tests for the API server.

use std::sync::OnceLock;
use std::time::Duration;

use api::config::Config;
use api::{SagaService, create_app};
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use messaging::Topic;
use metrics_exporter_prometheus::PrometheusHandle;
use projections::InMemorySagaLog;
use serde_json::{Value, json};
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

async fn setup() -> (Router, SagaService) {
    let config = Config {
        channel_retry_backoff_ms: 1,
        ..Config::default()
    };
    let service = SagaService::start(&config, InMemorySagaLog::new())
        .await
        .unwrap();
    let app = create_app(service.state(), get_metrics_handle());
    (app, service)
}

async fn body_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

async fn get(app: &Router, uri: &str) -> axum::response::Response {
    app.clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn place_order(app: &Router, products: Value) -> Value {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/orders")
                .header("content-type", "application/json")
                .body(Body::from(
                    serde_json::to_string(&json!({ "products": products })).unwrap(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    body_json(response).await
}

/// Polls `/events` until the saga for the order has been recorded.
async fn wait_for_outcome(app: &Router, order_id: &str) -> Value {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let response = get(app, &format!("/events?order_id={order_id}")).await;
            if response.status() == StatusCode::OK {
                return body_json(response).await;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("saga outcome was not recorded")
}

#[tokio::test]
async fn test_health_check() {
    let (app, _service) = setup().await;

    let response = get(&app, "/health").await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["read_model"], "InMemorySagaLog");
    assert_eq!(json["saga_log_entries"], 0);
}

#[tokio::test]
async fn test_place_order_succeeds() {
    let (app, service) = setup().await;

    let placed = place_order(
        &app,
        json!([
            { "product_code": "COMIC_BOOKS", "quantity": 2, "unit_value": 1500 },
            { "product_code": "MUSIC", "quantity": 1, "unit_value": 999 }
        ]),
    )
    .await;
    let order_id = placed["order_id"].as_str().unwrap();
    assert!(placed["transaction_id"].as_str().is_some());

    let outcome = wait_for_outcome(&app, order_id).await;

    assert_eq!(outcome["status"], "SUCCESS");
    assert_eq!(outcome["source"], "ORCHESTRATOR");
    assert_eq!(outcome["transaction_id"], placed["transaction_id"]);
    assert_eq!(outcome["history"].as_array().unwrap().len(), 5);
    assert_eq!(outcome["payload"]["total_amount"], 3999);
    assert_eq!(outcome["payload"]["total_items"], 3);
    assert_eq!(service.inventory().available("COMIC_BOOKS").await, Some(8));
}

#[tokio::test]
async fn test_out_of_stock_order_fails_with_full_trail() {
    let (app, service) = setup().await;

    let placed = place_order(
        &app,
        json!([{ "product_code": "BOOKS", "quantity": 11, "unit_value": 1000 }]),
    )
    .await;
    let order_id = placed["order_id"].as_str().unwrap();

    let outcome = wait_for_outcome(&app, order_id).await;

    assert_eq!(outcome["status"], "FAIL");
    let history = outcome["history"].as_array().unwrap();
    assert_eq!(history.len(), 7);
    assert_eq!(history[3]["source"], "INVENTORY_SERVICE");
    assert_eq!(history[3]["status"], "ROLLBACK_PENDING");
    assert_eq!(history[6]["status"], "FAIL");
    assert_eq!(service.inventory().available("BOOKS").await, Some(10));
}

#[tokio::test]
async fn test_oversized_quantity_fails_at_payment() {
    let (app, service) = setup().await;

    let placed = place_order(
        &app,
        json!([
            { "product_code": "BOOKS", "quantity": 4294967295u32, "unit_value": 1 },
            { "product_code": "MUSIC", "quantity": 1, "unit_value": 1 }
        ]),
    )
    .await;
    let order_id = placed["order_id"].as_str().unwrap();

    let outcome = wait_for_outcome(&app, order_id).await;

    assert_eq!(outcome["status"], "FAIL");
    let history = outcome["history"].as_array().unwrap();
    assert_eq!(history.len(), 5);
    assert_eq!(history[2]["source"], "PAYMENT_SERVICE");
    assert_eq!(history[2]["status"], "ROLLBACK_PENDING");
    assert!(
        history[2]["message"]
            .as_str()
            .unwrap()
            .starts_with("Fail to realize payment:")
    );
    assert_eq!(service.inventory().available("BOOKS").await, Some(10));
}

#[tokio::test]
async fn test_find_by_transaction_id() {
    let (app, _service) = setup().await;

    let placed = place_order(
        &app,
        json!([{ "product_code": "MOVIES", "quantity": 1, "unit_value": 500 }]),
    )
    .await;
    let order_id = placed["order_id"].as_str().unwrap();
    let transaction_id = placed["transaction_id"].as_str().unwrap();
    wait_for_outcome(&app, order_id).await;

    let response = get(&app, &format!("/events?transaction_id={transaction_id}")).await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["order_id"], order_id);
}

#[tokio::test]
async fn test_events_requires_a_filter() {
    let (app, _service) = setup().await;

    let response = get(&app, "/events").await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert!(json["error"].as_str().unwrap().contains("must be informed"));
}

#[tokio::test]
async fn test_events_rejects_invalid_order_id() {
    let (app, _service) = setup().await;

    let response = get(&app, "/events?order_id=not-a-uuid").await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_events_unknown_order_is_not_found() {
    let (app, _service) = setup().await;

    let response = get(&app, &format!("/events?order_id={}", uuid::Uuid::new_v4())).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = get(&app, "/events?transaction_id=0_missing").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_all_events_newest_first() {
    let (app, service) = setup().await;

    let first = place_order(
        &app,
        json!([{ "product_code": "MUSIC", "quantity": 1, "unit_value": 100 }]),
    )
    .await;
    wait_for_outcome(&app, first["order_id"].as_str().unwrap()).await;
    let second = place_order(
        &app,
        json!([{ "product_code": "VIDEO_GAMES", "quantity": 1, "unit_value": 100 }]),
    )
    .await;
    wait_for_outcome(&app, second["order_id"].as_str().unwrap()).await;

    let response = get(&app, "/events/all").await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let all = json.as_array().unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0]["order_id"], second["order_id"]);
    assert_eq!(all[0]["status"], "FAIL");
    assert_eq!(all[1]["order_id"], first["order_id"]);
    assert_eq!(service.channel().published_count(Topic::NotifyEnding).await, 2);
    assert!(
        service
            .channel()
            .published(Topic::NotifyEnding)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn test_place_order_rejects_malformed_body() {
    let (app, _service) = setup().await;

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/orders")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"items": []}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (app, _service) = setup().await;

    let response = get(&app, "/metrics").await;

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap();
    assert!(content_type.starts_with("text/plain"));
}
