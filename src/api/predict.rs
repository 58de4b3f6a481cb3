//! Image and video inference endpoints.
//!
//! Detection and persistence are synchronous, so every engine call runs
//! on the blocking pool via [`run_blocking`].

use std::time::Instant;

use actix_multipart::Multipart;
use actix_web::{post, web, HttpResponse};
use serde::Deserialize;

use super::error::ApiError;
use super::model::{
    BatchPredictionResponse, ComplianceCheckResponse, PredictionResponse, VideoProcessingResponse,
};
use super::{collect_uploads, ensure_backend, run_blocking, single_upload, validate_conf_threshold};
use crate::Engine;

fn default_conf_threshold() -> f32 {
    0.25
}

fn default_sample_rate() -> u32 {
    1
}

fn default_max_frames() -> u32 {
    300
}

#[derive(Debug, Deserialize)]
pub(super) struct PredictParams {
    #[serde(default = "default_conf_threshold")]
    conf_threshold: f32,
    #[serde(default)]
    check_compliance_flag: bool,
}

#[derive(Debug, Deserialize)]
pub(super) struct ComplianceParams {
    #[serde(default = "default_conf_threshold")]
    conf_threshold: f32,
}

#[derive(Debug, Deserialize)]
pub(super) struct VideoParams {
    #[serde(default = "default_conf_threshold")]
    conf_threshold: f32,
    #[serde(default = "default_sample_rate")]
    sample_rate: u32,
    #[serde(default = "default_max_frames")]
    max_frames: u32,
}

#[post("/predict")]
pub(super) async fn predict(
    engine: web::Data<Engine>,
    params: web::Query<PredictParams>,
    mut payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    validate_conf_threshold(params.conf_threshold)?;
    ensure_backend(&engine)?;
    let upload = single_upload(&mut payload).await?;
    if !upload.claims_image() {
        return Err(ApiError::bad_request("File must be an image"));
    }

    let PredictParams {
        conf_threshold,
        check_compliance_flag,
    } = params.into_inner();
    let run = run_blocking(move || {
        engine.predict(
            &upload.data,
            &upload.filename,
            conf_threshold,
            check_compliance_flag,
            "predict",
        )
    })
    .await?
    .map_err(|e| ApiError::internal(format!("Error processing image: {e}")))?;
    Ok(HttpResponse::Ok().json(PredictionResponse::from_run(run, conf_threshold)))
}

#[post("/predict-image")]
pub(super) async fn predict_image(
    engine: web::Data<Engine>,
    params: web::Query<ComplianceParams>,
    mut payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    validate_conf_threshold(params.conf_threshold)?;
    ensure_backend(&engine)?;
    let upload = single_upload(&mut payload).await?;
    if !upload.claims_image() {
        return Err(ApiError::bad_request("File must be an image"));
    }

    let conf_threshold = params.conf_threshold;
    let jpeg = run_blocking(move || engine.annotate_image(&upload.data, conf_threshold))
        .await?
        .map_err(|e| ApiError::internal(format!("Error processing image: {e}")))?;
    Ok(HttpResponse::Ok().content_type("image/jpeg").body(jpeg))
}

#[post("/predict-batch")]
pub(super) async fn predict_batch(
    engine: web::Data<Engine>,
    params: web::Query<PredictParams>,
    mut payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    validate_conf_threshold(params.conf_threshold)?;
    ensure_backend(&engine)?;
    let uploads = collect_uploads(&mut payload).await?;
    if uploads.is_empty() {
        return Err(ApiError::bad_request("No files provided"));
    }
    let max_files = engine.settings().max_batch_files;
    if uploads.len() > max_files {
        return Err(ApiError::bad_request(format!(
            "Maximum {max_files} images allowed per batch"
        )));
    }

    let PredictParams {
        conf_threshold,
        check_compliance_flag,
    } = params.into_inner();
    // Per-file failures are counted, not fatal; each success is persisted
    // under its own request id.
    let body = run_blocking(move || {
        let request_id = crate::generate_request_id();
        let start = Instant::now();
        let total_images = uploads.len() as u32;
        let mut results = Vec::new();
        let mut failed_images = 0u32;

        for upload in uploads {
            if !upload.claims_image() {
                failed_images += 1;
                continue;
            }
            match engine.predict(
                &upload.data,
                &upload.filename,
                conf_threshold,
                check_compliance_flag,
                "predict-batch",
            ) {
                Ok(run) => results.push(PredictionResponse::from_run(run, conf_threshold)),
                Err(e) => {
                    log::warn!("batch image {} failed: {e:#}", upload.filename);
                    failed_images += 1;
                }
            }
        }

        let total_ms = start.elapsed().as_secs_f64() * 1000.0;
        BatchPredictionResponse::new(request_id, total_images, failed_images, results, total_ms)
    })
    .await?;
    Ok(HttpResponse::Ok().json(body))
}

#[post("/check-compliance")]
pub(super) async fn check_compliance(
    engine: web::Data<Engine>,
    params: web::Query<ComplianceParams>,
    mut payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    validate_conf_threshold(params.conf_threshold)?;
    ensure_backend(&engine)?;
    // No content-type guard on this endpoint.
    let upload = single_upload(&mut payload).await?;

    let conf_threshold = params.conf_threshold;
    let run = run_blocking(move || {
        engine.predict(
            &upload.data,
            &upload.filename,
            conf_threshold,
            true,
            "check-compliance",
        )
    })
    .await?
    .map_err(|e| ApiError::internal(format!("Error checking compliance: {e}")))?;
    let body = ComplianceCheckResponse::from_run(run)
        .ok_or_else(|| ApiError::internal("compliance evaluation missing"))?;
    Ok(HttpResponse::Ok().json(body))
}

#[post("/predict-video")]
pub(super) async fn predict_video(
    engine: web::Data<Engine>,
    params: web::Query<VideoParams>,
    mut payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    validate_conf_threshold(params.conf_threshold)?;
    if params.sample_rate < 1 {
        return Err(ApiError::bad_request("sample_rate must be at least 1"));
    }
    if params.max_frames < 1 {
        return Err(ApiError::bad_request("max_frames must be at least 1"));
    }
    ensure_backend(&engine)?;
    let upload = single_upload(&mut payload).await?;
    if !upload.claims_video() {
        return Err(ApiError::bad_request("File must be a video"));
    }

    let VideoParams {
        conf_threshold,
        sample_rate,
        max_frames,
    } = params.into_inner();
    let filename = upload.filename.clone();
    let run = run_blocking(move || {
        engine.process_video(
            &upload.data,
            &upload.filename,
            conf_threshold,
            sample_rate,
            max_frames,
        )
    })
    .await?
    .map_err(|e| ApiError::internal(format!("Error processing video: {e}")))?;
    Ok(HttpResponse::Ok().json(VideoProcessingResponse::from_run(
        run,
        filename,
        sample_rate,
    )))
}
