use std::io::Cursor;
use std::sync::Arc;

use actix_web::dev::{Service, ServiceResponse};
use actix_web::http::header;
use actix_web::http::StatusCode;
use actix_web::{test, web, App};
use image::{ImageFormat, RgbImage};
use serde_json::Value;

use hardhat::api;
use hardhat::{BackendRegistry, Engine, EngineSettings, InMemoryDetectionStore, StubBackend};

fn engine_with(settings: EngineSettings) -> Arc<Engine> {
    let mut registry = BackendRegistry::new();
    registry.register(StubBackend::new());
    Arc::new(Engine::new(
        registry,
        Box::new(InMemoryDetectionStore::new()),
        settings,
    ))
}

fn engine() -> Arc<Engine> {
    engine_with(EngineSettings::default())
}

/// Engine with no detector backend, for the 503 paths.
fn engine_without_backend() -> Arc<Engine> {
    Arc::new(Engine::new(
        BackendRegistry::new(),
        Box::new(InMemoryDetectionStore::new()),
        EngineSettings::default(),
    ))
}

async fn create_app(
    engine: Arc<Engine>,
) -> impl Service<actix_http::Request, Response = ServiceResponse, Error = actix_web::Error> {
    test::init_service(
        App::new()
            .app_data(web::Data::from(engine))
            .service(api::routes()),
    )
    .await
}

fn jpeg(shade: u8) -> Vec<u8> {
    let img = RgbImage::from_pixel(32, 32, image::Rgb([shade, shade, shade]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Jpeg).unwrap();
    out.into_inner()
}

/// Builds a multipart/form-data body by hand. Each part is
/// (field name, filename, optional content type, bytes).
fn multipart(parts: &[(&str, &str, Option<&str>, &[u8])]) -> (String, Vec<u8>) {
    let boundary = "hardhat-test-boundary";
    let mut body = Vec::new();
    for (name, filename, content_type, data) in parts {
        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n")
                .as_bytes(),
        );
        if let Some(ct) = content_type {
            body.extend_from_slice(format!("Content-Type: {ct}\r\n").as_bytes());
        }
        body.extend_from_slice(b"\r\n");
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    (format!("multipart/form-data; boundary={boundary}"), body)
}

async fn post_upload<S>(
    app: &S,
    uri: &str,
    parts: &[(&str, &str, Option<&str>, &[u8])],
) -> ServiceResponse
where
    S: Service<actix_http::Request, Response = ServiceResponse, Error = actix_web::Error>,
{
    let (content_type, body) = multipart(parts);
    let req = test::TestRequest::post()
        .uri(uri)
        .insert_header((header::CONTENT_TYPE, content_type))
        .set_payload(body)
        .to_request();
    test::call_service(app, req).await
}

#[actix_web::test]
async fn root_lists_endpoints() {
    let app = create_app(engine()).await;
    let req = test::TestRequest::get().uri("/").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "Hardhat PPE Detection API");
    assert!(body["endpoints"]["/predict"].is_string());
    assert!(body["endpoints"]["/predict-video"].is_string());
}

#[actix_web::test]
async fn predict_returns_detections_and_persists_record() {
    let app = create_app(engine()).await;
    let image = jpeg(100);
    let resp = post_upload(
        &app,
        "/predict",
        &[("file", "site.jpg", Some("image/jpeg"), &image)],
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], true);
    let request_id = body["request_id"].as_str().unwrap().to_string();
    assert!(request_id.starts_with("req_"));
    assert_eq!(body["metadata"]["filename"], "site.jpg");
    assert_eq!(body["metadata"]["width"], 32);
    assert_eq!(
        body["detections_count"].as_u64().unwrap(),
        body["detections"].as_array().unwrap().len() as u64
    );
    // Compliance was not requested, so it must be null, not absent.
    assert!(body["compliance"].is_null());
    assert_eq!(body["confidence_threshold"], 0.25);
    assert_eq!(body["metrics"]["request_id"], request_id.as_str());

    let req = test::TestRequest::get()
        .uri("/recent-detections")
        .to_request();
    let resp = test::call_service(&app, req).await;
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["records"][0]["request_id"], request_id.as_str());
    assert_eq!(body["records"][0]["endpoint"], "predict");
}

#[actix_web::test]
async fn predict_honors_compliance_flag() {
    let app = create_app(engine()).await;
    let image = jpeg(100);
    let resp = post_upload(
        &app,
        "/predict?check_compliance_flag=true",
        &[("file", "site.jpg", Some("image/jpeg"), &image)],
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = test::read_body_json(resp).await;
    assert!(body["compliance"].is_object());
    assert!(body["compliance"]["is_compliant"].is_boolean());
    assert!(body["compliance"]["details"]["total_persons"].is_u64());
}

#[actix_web::test]
async fn predict_rejects_out_of_range_threshold() {
    let app = create_app(engine()).await;
    let image = jpeg(100);
    let resp = post_upload(
        &app,
        "/predict?conf_threshold=1.5",
        &[("file", "site.jpg", Some("image/jpeg"), &image)],
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["detail"], "conf_threshold must be between 0.0 and 1.0");
}

#[actix_web::test]
async fn predict_rejects_non_image_content_type() {
    let app = create_app(engine()).await;
    let resp = post_upload(
        &app,
        "/predict",
        &[("file", "notes.txt", Some("text/plain"), b"scaffolding notes")],
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["detail"], "File must be an image");
}

#[actix_web::test]
async fn predict_accepts_upload_without_content_type() {
    let app = create_app(engine()).await;
    let image = jpeg(100);
    let resp = post_upload(&app, "/predict", &[("file", "site.jpg", None, &image)]).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_web::test]
async fn predict_without_file_is_rejected() {
    let app = create_app(engine()).await;
    let resp = post_upload(&app, "/predict", &[]).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["detail"], "No file provided");
}

#[actix_web::test]
async fn predict_without_backend_is_unavailable() {
    let app = create_app(engine_without_backend()).await;
    let image = jpeg(100);
    let resp = post_upload(
        &app,
        "/predict",
        &[("file", "site.jpg", Some("image/jpeg"), &image)],
    )
    .await;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["detail"], "Model not loaded");
}

#[actix_web::test]
async fn predict_image_returns_annotated_jpeg() {
    let app = create_app(engine()).await;
    let image = jpeg(100);
    let resp = post_upload(
        &app,
        "/predict-image",
        &[("file", "site.jpg", Some("image/jpeg"), &image)],
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get(header::CONTENT_TYPE).unwrap(),
        "image/jpeg"
    );

    let body = test::read_body(resp).await;
    assert_eq!(&body[..2], &[0xFF, 0xD8]);
}

#[actix_web::test]
async fn batch_counts_non_image_files_as_failed() {
    let app = create_app(engine()).await;
    let good = jpeg(100);
    let resp = post_upload(
        &app,
        "/predict-batch",
        &[
            ("files", "a.jpg", Some("image/jpeg"), &good),
            ("files", "notes.txt", Some("text/plain"), b"not an image"),
        ],
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["total_images"], 2);
    assert_eq!(body["processed_images"], 1);
    assert_eq!(body["failed_images"], 1);
    assert_eq!(body["results"].as_array().unwrap().len(), 1);
    assert_eq!(body["results"][0]["metadata"]["filename"], "a.jpg");
}

#[actix_web::test]
async fn batch_rejects_empty_payload() {
    let app = create_app(engine()).await;
    let resp = post_upload(&app, "/predict-batch", &[]).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["detail"], "No files provided");
}

#[actix_web::test]
async fn batch_rejects_more_files_than_configured() {
    let settings = EngineSettings {
        max_batch_files: 2,
        ..EngineSettings::default()
    };
    let app = create_app(engine_with(settings)).await;
    let image = jpeg(100);
    let resp = post_upload(
        &app,
        "/predict-batch",
        &[
            ("files", "a.jpg", Some("image/jpeg"), &image),
            ("files", "b.jpg", Some("image/jpeg"), &image),
            ("files", "c.jpg", Some("image/jpeg"), &image),
        ],
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["detail"], "Maximum 2 images allowed per batch");
}

#[actix_web::test]
async fn check_compliance_always_evaluates() {
    let app = create_app(engine()).await;
    let image = jpeg(100);
    // This endpoint has no content-type guard, so an odd type still works.
    let resp = post_upload(
        &app,
        "/check-compliance",
        &[("file", "site.bin", Some("application/octet-stream"), &image)],
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["filename"], "site.bin");
    assert!(body["compliance"]["is_compliant"].is_boolean());
    assert!(body["processing_time_ms"].is_number());
}

#[actix_web::test]
async fn video_processes_sampled_frames() {
    let app = create_app(engine()).await;
    let mut clip = Vec::new();
    for shade in [40u8, 120, 200] {
        clip.extend_from_slice(&jpeg(shade));
    }
    let resp = post_upload(
        &app,
        "/predict-video?sample_rate=2",
        &[("file", "clip.mjpeg", Some("video/x-motion-jpeg"), &clip)],
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["filename"], "clip.mjpeg");
    assert_eq!(body["metadata"]["total_frames"], 3);
    assert_eq!(body["metadata"]["sample_rate"], 2);
    // Frames 0 and 2 survive the sampling.
    assert_eq!(body["processed_frames"], 2);
    assert!(body["overall_summary"]["total_detections"].is_u64());
    assert!(body["compliance_rate"].is_number());
}

#[actix_web::test]
async fn video_validates_sampling_params() {
    let app = create_app(engine()).await;
    let clip = jpeg(40);

    let resp = post_upload(
        &app,
        "/predict-video?sample_rate=0",
        &[("file", "clip.mjpeg", Some("video/x-motion-jpeg"), &clip)],
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["detail"], "sample_rate must be at least 1");

    let resp = post_upload(
        &app,
        "/predict-video?max_frames=0",
        &[("file", "clip.mjpeg", Some("video/x-motion-jpeg"), &clip)],
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["detail"], "max_frames must be at least 1");
}

#[actix_web::test]
async fn video_rejects_image_content_type() {
    let app = create_app(engine()).await;
    let clip = jpeg(40);
    let resp = post_upload(
        &app,
        "/predict-video",
        &[("file", "still.jpg", Some("image/jpeg"), &clip)],
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["detail"], "File must be a video");
}

#[actix_web::test]
async fn analytics_covers_stored_records() {
    let app = create_app(engine()).await;
    let image = jpeg(100);
    let resp = post_upload(
        &app,
        "/predict?check_compliance_flag=true",
        &[("file", "site.jpg", Some("image/jpeg"), &image)],
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let req = test::TestRequest::get()
        .uri("/analytics?days=30")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["total_requests"], 1);
    assert_eq!(body["date_range"]["days"], "30");
    assert_eq!(body["compliance_statistics"]["total_checks"], 1);
}

#[actix_web::test]
async fn analytics_validates_window() {
    let app = create_app(engine()).await;
    for uri in ["/analytics?days=0", "/analytics?days=366"] {
        let req = test::TestRequest::get().uri(uri).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["detail"], "days must be between 1 and 365");
    }
}

#[actix_web::test]
async fn recent_filters_by_endpoint_and_validates_limit() {
    let app = create_app(engine()).await;
    let image = jpeg(100);
    post_upload(
        &app,
        "/predict",
        &[("file", "one.jpg", Some("image/jpeg"), &image)],
    )
    .await;
    post_upload(
        &app,
        "/check-compliance",
        &[("file", "two.jpg", Some("image/jpeg"), &image)],
    )
    .await;

    let req = test::TestRequest::get()
        .uri("/recent-detections?endpoint=check-compliance")
        .to_request();
    let resp = test::call_service(&app, req).await;
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["records"][0]["filename"], "two.jpg");
    assert!(body["records"][0]["is_compliant"].is_boolean());

    let req = test::TestRequest::get()
        .uri("/recent-detections?limit=101")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["detail"], "limit must be between 1 and 100");
}

#[actix_web::test]
async fn health_reports_backend_and_store() {
    let app = create_app(engine()).await;
    let req = test::TestRequest::get().uri("/health").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["model_loaded"], true);
    assert_eq!(body["database"], "connected");

    let app = create_app(engine_without_backend()).await;
    let req = test::TestRequest::get().uri("/health").to_request();
    let resp = test::call_service(&app, req).await;
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["model_loaded"], false);
}

#[actix_web::test]
async fn model_info_lists_classes() {
    let app = create_app(engine()).await;
    let req = test::TestRequest::get().uri("/model-info").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["backend"], "stub");
    assert_eq!(body["kind"], "synthetic");
    assert_eq!(body["num_classes"], 3);
    assert_eq!(body["classes"]["0"], "person");
    assert_eq!(body["classes"]["2"], "safety-vest");
    assert_eq!(body["available_backends"][0], "stub");
}

#[actix_web::test]
async fn unknown_route_answers_in_error_shape() {
    let app = create_app(engine()).await;
    let req = test::TestRequest::get().uri("/nope").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["detail"], "Not Found");
}
