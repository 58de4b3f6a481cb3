//! History and analytics endpoints.

use actix_web::{get, web, HttpResponse};
use serde::Deserialize;

use super::error::ApiError;
use super::model::{RecentRecord, RecentRecordsResponse};
use super::run_blocking;
use crate::Engine;

fn default_days() -> u32 {
    7
}

fn default_limit() -> u32 {
    10
}

#[derive(Debug, Deserialize)]
pub(super) struct AnalyticsParams {
    #[serde(default = "default_days")]
    days: u32,
    #[serde(default)]
    endpoint: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct RecentParams {
    #[serde(default = "default_limit")]
    limit: u32,
    #[serde(default)]
    endpoint: Option<String>,
}

#[get("/analytics")]
pub(super) async fn analytics(
    engine: web::Data<Engine>,
    params: web::Query<AnalyticsParams>,
) -> Result<HttpResponse, ApiError> {
    if !(1..=365).contains(&params.days) {
        return Err(ApiError::bad_request("days must be between 1 and 365"));
    }

    let AnalyticsParams { days, endpoint } = params.into_inner();
    let report = run_blocking(move || engine.analytics(days, endpoint.as_deref()))
        .await?
        .map_err(|e| ApiError::internal(format!("Error retrieving analytics: {e}")))?;
    Ok(HttpResponse::Ok().json(report))
}

#[get("/recent-detections")]
pub(super) async fn recent_detections(
    engine: web::Data<Engine>,
    params: web::Query<RecentParams>,
) -> Result<HttpResponse, ApiError> {
    if !(1..=100).contains(&params.limit) {
        return Err(ApiError::bad_request("limit must be between 1 and 100"));
    }

    let RecentParams { limit, endpoint } = params.into_inner();
    let records = run_blocking(move || engine.recent(limit, endpoint.as_deref()))
        .await?
        .map_err(|e| ApiError::internal(format!("Error retrieving records: {e}")))?;
    let records: Vec<RecentRecord> = records.into_iter().map(RecentRecord::from).collect();
    Ok(HttpResponse::Ok().json(RecentRecordsResponse {
        success: true,
        total: records.len() as u32,
        records,
    }))
}
