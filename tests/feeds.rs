use astacala_map::feeds::{FeedClient, FeedKind, FeedTarget, RetryPolicy};
use astacala_map::models::Source;
use astacala_map::normalize::StaticPoint;
use astacala_map::store::PointStore;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

async fn serve(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn iss_body() -> serde_json::Value {
    json!({ "data": [
        { "id": 1, "lat": -6.5, "long": 106.8, "nama_potensi_karst": "Leuwi Hejo" },
        { "id": 2, "lat": "-6.61", "long": "106.92", "nama_potensi_karst": "Gua Garunggang" },
        { "id": 3, "lat": -6.5 }
    ]})
}

async fn flaky(State(calls): State<Arc<AtomicUsize>>) -> impl IntoResponse {
    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
        (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "error": "warming up" })))
    } else {
        (StatusCode::OK, Json(iss_body()))
    }
}

async fn once_then_down(State(calls): State<Arc<AtomicUsize>>) -> impl IntoResponse {
    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
        (StatusCode::OK, Json(iss_body()))
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({})))
    }
}

async fn upstream() -> (String, Arc<AtomicUsize>, Arc<AtomicUsize>) {
    let flaky_calls = Arc::new(AtomicUsize::new(0));
    let down_calls = Arc::new(AtomicUsize::new(0));
    let app = Router::new()
        .route("/items/caving_data_iss", get(|| async { Json(iss_body()) }))
        .route("/items/broken", get(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
        .route("/items/not_json", get(|| async { "<html>maintenance</html>" }))
        .route("/items/flaky", get(flaky).with_state(flaky_calls.clone()))
        .route("/items/once", get(once_then_down).with_state(down_calls.clone()));
    (serve(app).await, flaky_calls, down_calls)
}

fn client(attempts: u32) -> FeedClient {
    FeedClient::new(
        reqwest::Client::new(),
        RetryPolicy {
            attempts,
            timeout: Duration::from_secs(5),
            backoff: Duration::from_millis(1),
        },
    )
}

fn target(kind: FeedKind, base: &str, path: &str) -> FeedTarget {
    FeedTarget {
        kind,
        url: format!("{}{}", base, path),
    }
}

fn parang() -> StaticPoint {
    StaticPoint {
        id: None,
        name: "Gunung Parang".into(),
        description: None,
        coordinates: "-6.7462, 107.3456".into(),
        division: "pendaki".into(),
        kota: Some("Purwakarta".into()),
        provinsi: None,
    }
}

#[tokio::test]
async fn failing_feeds_do_not_block_the_others() {
    let (base, _, _) = upstream().await;
    let targets = [
        target(FeedKind::IssCaves, &base, "/items/caving_data_iss"),
        target(FeedKind::AstacalaCaves, &base, "/items/broken"),
        target(FeedKind::AstacalaClimbing, &base, "/items/not_json"),
    ];
    let (points, report) = client(2).load_all(&targets, &[parang()]).await;

    assert_eq!(points.len(), 3);
    assert!(points.find("iss_data:2").is_some());
    assert!(points.iter().any(|p| p.source == Source::Static));
    assert_eq!(report.feeds.len(), 4);
    assert!(report.any_ok());
    let failed: Vec<_> = report.feeds.iter().filter(|f| !f.ok).map(|f| f.feed.as_str()).collect();
    assert_eq!(failed, ["astacala_caves", "astacala_climbing"]);
    assert!(report.feeds.iter().all(|f| f.ok || f.error.is_some()));
}

#[tokio::test]
async fn transient_errors_are_retried() {
    let (base, calls, _) = upstream().await;
    let points = client(3)
        .load_feed(&target(FeedKind::IssCaves, &base, "/items/flaky"))
        .await
        .unwrap();
    assert_eq!(points.len(), 2);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn gives_up_after_the_last_attempt() {
    let (base, _, _) = upstream().await;
    let err = client(2)
        .fetch_json(&format!("{}/items/broken", base))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("500"));
}

#[tokio::test]
async fn store_keeps_previous_points_when_every_feed_fails() {
    let (base, _, down) = upstream().await;
    let store = PointStore::new(
        client(1),
        vec![target(FeedKind::IssCaves, &base, "/items/once")],
        Vec::new(),
    );
    assert!(store.refresh().await);
    assert_eq!(store.snapshot().await.points.len(), 2);

    assert!(!store.refresh().await);
    let snapshot = store.snapshot().await;
    assert_eq!(snapshot.points.len(), 2);
    assert!(!snapshot.report.unwrap().any_ok());
    assert_eq!(down.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn static_points_alone_count_as_healthy() {
    let store = PointStore::new(client(1), Vec::new(), vec![parang()]);
    assert!(store.refresh().await);
    assert_eq!(store.snapshot().await.points.len(), 1);
}
