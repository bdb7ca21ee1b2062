//! Drives the router in-process with a substitute scorer.

use anyhow::Result;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use inference_gateway::http::{router, AppState, HttpOptions};
use inference_gateway::model::Scorer;
use inference_gateway::{ImageTensor, CLASS_LABELS};
use serde_json::Value;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tower::ServiceExt;

const BOUNDARY: &str = "posture-test-boundary";

/// Mean pixel intensity drives the "Good Posture" probability.
struct MeanScorer { calls: AtomicUsize }

impl Scorer for MeanScorer {
    fn predict(&self, tensor: &ImageTensor) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let a = tensor.as_array();
        let mean = a.iter().sum::<f32>() / a.len() as f32;
        Ok(vec![1.0 - mean * 0.9, mean * 0.9])
    }
}

struct BrokenScorer;

impl Scorer for BrokenScorer {
    fn predict(&self, _tensor: &ImageTensor) -> Result<Vec<f32>> { Err(anyhow::anyhow!("tensor shape mismatch")) }
}

fn app_with(scorer: Arc<dyn Scorer>, static_dir: std::path::PathBuf) -> Router {
    router(AppState::new(scorer), &HttpOptions { static_dir, max_upload_bytes: 1024 * 1024 })
}

fn test_app() -> (Router, Arc<MeanScorer>) {
    let scorer = Arc::new(MeanScorer { calls: AtomicUsize::new(0) });
    (app_with(scorer.clone(), "does-not-exist".into()), scorer)
}

fn white_png() -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(RgbImage::from_pixel(1, 1, Rgb([255, 255, 255]))).write_to(&mut buf, ImageFormat::Png).unwrap();
    buf.into_inner()
}

fn multipart(field: &str, data: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"frame.png\"\r\nContent-Type: application/octet-stream\r\n\r\n").as_bytes());
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    Request::post("/predict")
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(Body::from(body))
        .unwrap()
}

async fn send(app: Router, req: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let headers = resp.headers().clone();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, headers, bytes.to_vec())
}

fn json(bytes: &[u8]) -> Value { serde_json::from_slice(bytes).unwrap() }

#[tokio::test]
async fn ping_returns_pong() {
    let (app, _) = test_app();
    let (status, _, body) = send(app, Request::get("/ping").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"pong");
}

#[tokio::test]
async fn preflight_is_empty_204_with_cors() {
    let (app, scorer) = test_app();
    let req = Request::builder()
        .method(Method::OPTIONS)
        .uri("/predict")
        .header(header::ORIGIN, "https://example.github.io")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(Body::from("not multipart at all"))
        .unwrap();
    let (status, headers, body) = send(app, req).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(body.is_empty());
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    assert!(headers[header::ACCESS_CONTROL_ALLOW_METHODS].to_str().unwrap().contains("POST"));
    assert_eq!(scorer.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn missing_image_field_is_400() {
    let (app, scorer) = test_app();
    let (status, _, body) = send(app, multipart("photo", &white_png())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json(&body), serde_json::json!({"error": "No image provided"}));
    assert_eq!(scorer.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn non_multipart_body_is_missing_image() {
    let (app, _) = test_app();
    let req = Request::post("/predict").header(header::CONTENT_TYPE, "application/json").body(Body::from("{}")).unwrap();
    let (status, _, body) = send(app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json(&body)["error"], "No image provided");

    let (app, _) = test_app();
    let (status, _, body) = send(app, Request::post("/predict").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json(&body)["error"], "No image provided");
}

#[tokio::test]
async fn undecodable_image_is_400() {
    let (app, scorer) = test_app();
    let (status, _, body) = send(app, multipart("image", b"GIF89a but not really")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json(&body)["error"], "Invalid image");

    let (app, _) = test_app();
    let (status, _, _) = send(app, multipart("image", b"")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(scorer.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn white_pixel_prediction_contract() {
    let (app, _) = test_app();
    let (status, headers, body) = send(app, multipart("image", &white_png())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    let v = json(&body);
    let class = v["class"].as_u64().unwrap() as usize;
    let confidence = v["confidence"].as_f64().unwrap();
    assert!(class < CLASS_LABELS.len());
    assert!((0.0..=1.0).contains(&confidence));
    assert_eq!(v["label"], CLASS_LABELS[class]);
    assert_eq!(class, 1);
    assert_eq!(confidence, 0.9);
}

#[tokio::test]
async fn identical_payloads_give_identical_bytes() {
    let png = white_png();
    let (app, _) = test_app();
    let (_, _, first) = send(app.clone(), multipart("image", &png)).await;
    let (_, _, second) = send(app, multipart("image", &png)).await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn scorer_failure_is_500() {
    let app = app_with(Arc::new(BrokenScorer), "does-not-exist".into());
    let (status, _, body) = send(app, multipart("image", &white_png())).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json(&body)["error"], "Inference failed");
}

#[tokio::test]
async fn index_is_served_from_static_dir() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("index.html"), "<h1>posture</h1>").unwrap();
    std::fs::write(dir.path().join("app.js"), "console.log('hi')").unwrap();
    let app = app_with(Arc::new(MeanScorer { calls: AtomicUsize::new(0) }), dir.path().to_path_buf());
    let (status, _, body) = send(app.clone(), Request::get("/").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"<h1>posture</h1>");
    let (status, _, _) = send(app, Request::get("/app.js").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn health_routes_are_mounted() {
    let (app, _) = test_app();
    let (status, _, body) = send(app, Request::get("/live").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["live"], true);
}
