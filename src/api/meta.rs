//! Service metadata: root listing, health probe, detector info.

use std::collections::BTreeMap;

use actix_web::{get, web, HttpResponse, Responder};
use chrono::Utc;

use super::error::ApiError;
use super::model::{HealthResponse, ModelInfoResponse};
use super::run_blocking;
use crate::Engine;

#[get("/")]
pub(super) async fn root() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "message": "Hardhat PPE Detection API",
        "version": env!("CARGO_PKG_VERSION"),
        "features": [
            "Single image prediction with compliance check",
            "Batch image processing",
            "MJPEG clip frame-by-frame analysis",
            "Safety compliance verification",
            "Analytics and reporting",
            "Database storage for historical data"
        ],
        "endpoints": {
            "/predict": "POST - Upload image for PPE detection",
            "/predict-image": "POST - Upload image and get annotated image",
            "/predict-batch": "POST - Process multiple images at once",
            "/check-compliance": "POST - Verify PPE compliance for an image",
            "/predict-video": "POST - Process MJPEG clip",
            "/analytics": "GET - Get detection analytics and statistics",
            "/recent-detections": "GET - Get recent detection records",
            "/health": "GET - API health check",
            "/model-info": "GET - Detector backend information"
        }
    }))
}

#[get("/health")]
pub(super) async fn health(engine: web::Data<Engine>) -> Result<HttpResponse, ApiError> {
    let (model_loaded, database) = run_blocking(move || {
        let database = if engine.store_healthy() {
            "connected"
        } else {
            "disconnected"
        };
        (engine.backend_ready(), database)
    })
    .await?;
    Ok(HttpResponse::Ok().json(HealthResponse {
        status: "healthy".into(),
        timestamp: Utc::now(),
        model_loaded,
        database: database.into(),
    }))
}

#[get("/model-info")]
pub(super) async fn model_info(engine: web::Data<Engine>) -> Result<HttpResponse, ApiError> {
    let info = engine
        .backend_info()
        .map_err(|_| ApiError::ServiceUnavailable("Model not loaded".into()))?;
    let classes: BTreeMap<u32, String> = info
        .classes
        .iter()
        .map(|class| (class.id(), class.name().to_string()))
        .collect();
    Ok(HttpResponse::Ok().json(ModelInfoResponse {
        backend: info.name.to_string(),
        kind: info.kind.to_string(),
        num_classes: classes.len(),
        classes,
        available_backends: engine.backend_names(),
    }))
}

/// Catch-all so unknown paths answer in the same `{"detail": ...}` shape.
pub(super) async fn not_found() -> Result<HttpResponse, ApiError> {
    Err(ApiError::NotFound("Not Found".into()))
}
