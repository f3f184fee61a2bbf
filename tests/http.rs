use std::sync::Arc;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use tower::util::ServiceExt;

use cangjiedict::dict::MappingTable;
use cangjiedict::handlers::{AppState, router};

fn make_state() -> AppState {
    let mapping = "見,目,ILV\n一,一,MC\n水,水,E\n".as_bytes();
    let tempdir = tempfile::tempdir().unwrap();
    let path = tempdir.path().join("mapping.csv");
    std::fs::write(&path, mapping).unwrap();
    let table = MappingTable::load_from_file(&path).unwrap();
    AppState {
        table: Arc::clone(&table),
        disable_cache: false,
    }
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let body_bytes = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
    serde_json::from_slice(&body_bytes).unwrap()
}

#[tokio::test]
async fn healthz_ok() {
    let app = router(make_state());
    let response = app
        .oneshot(
            Request::builder()
                .uri("/healthz")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn lookup_returns_rows_in_reverse_input_order() {
    let app = router(make_state());
    // text=見一
    let response = app
        .oneshot(
            Request::builder()
                .uri("/v1/lookup?text=%E8%A6%8B%E4%B8%80")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["total"], 2);
    let rows = body["rows"].as_array().unwrap();
    assert_eq!(rows[0]["character"], "一");
    assert_eq!(rows[0]["radical"], "一");
    assert_eq!(rows[0]["key"], "MC");
    assert_eq!(rows[1]["character"], "見");
    assert_eq!(rows[1]["key"], "ILV");
}

#[tokio::test]
async fn lookup_without_text_is_an_empty_result() {
    let app = router(make_state());
    let response = app
        .oneshot(
            Request::builder()
                .uri("/v1/lookup")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["total"], 0);
    assert!(body["rows"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn lookup_with_empty_text_is_an_empty_result() {
    let app = router(make_state());
    let response = app
        .oneshot(
            Request::builder()
                .uri("/v1/lookup?text=")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["total"], 0);
}

#[tokio::test]
async fn lookup_skips_characters_without_an_entry() {
    let app = router(make_state());
    // text=見x一 — "x" has no table entry
    let response = app
        .oneshot(
            Request::builder()
                .uri("/v1/lookup?text=%E8%A6%8Bx%E4%B8%80")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["total"], 2);
    let rows = body["rows"].as_array().unwrap();
    assert_eq!(rows[0]["character"], "一");
    assert_eq!(rows[1]["character"], "見");
}

#[tokio::test]
async fn lookup_with_no_matches_is_ok_and_empty() {
    let app = router(make_state());
    let response = app
        .oneshot(
            Request::builder()
                .uri("/v1/lookup?text=xyz")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["total"], 0);
}

#[tokio::test]
async fn lookup_rejects_oversized_text() {
    let app = router(make_state());
    let long = "x".repeat(513);
    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/v1/lookup?text={long}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert!(
        body["error"]
            .as_str()
            .unwrap_or_default()
            .contains("at most")
    );
}

#[tokio::test]
async fn frontend_serves_html() {
    let app = router(make_state());
    let response = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("text/html"));
    let body_bytes = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
    let page = String::from_utf8(body_bytes.to_vec()).unwrap();
    assert!(page.contains("倉頡字典"));
}
