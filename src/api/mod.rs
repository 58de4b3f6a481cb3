//! HTTP surface of the detection service.
//!
//! Handlers stay thin: validate parameters, drain the multipart payload,
//! call into [`Engine`](crate::Engine) and shape the response with the
//! types in [`model`]. Failures render as `{"detail": "..."}` bodies
//! through [`ApiError`].

pub mod error;
pub mod model;

mod meta;
mod predict;
mod reports;

use std::sync::Arc;

use actix_multipart::Multipart;
use actix_web::dev::Server;
use actix_web::middleware::Logger;
use actix_web::{web, App, HttpServer, Scope};
use futures::StreamExt;

pub use error::ApiError;

use crate::Engine;

/// One file pulled out of a multipart request.
pub(crate) struct Upload {
    pub filename: String,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

impl Upload {
    /// Content-type guard for image endpoints. A part that carries no
    /// content type passes; only an explicit non-image type is rejected.
    pub fn claims_image(&self) -> bool {
        match &self.content_type {
            Some(ct) => ct.starts_with("image/"),
            None => true,
        }
    }

    /// Same guard for the video endpoint.
    pub fn claims_video(&self) -> bool {
        match &self.content_type {
            Some(ct) => ct.starts_with("video/"),
            None => true,
        }
    }
}

/// Drains every file part of a multipart payload into memory, keeping the
/// order the client sent them in.
pub(crate) async fn collect_uploads(payload: &mut Multipart) -> Result<Vec<Upload>, ApiError> {
    let mut uploads = Vec::new();
    while let Some(item) = payload.next().await {
        let mut field =
            item.map_err(|e| ApiError::bad_request(format!("Invalid multipart payload: {e}")))?;
        let filename = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .unwrap_or("upload")
            .to_string();
        let content_type = field.content_type().map(|m| m.essence_str().to_string());
        let mut data = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk
                .map_err(|e| ApiError::bad_request(format!("Invalid multipart payload: {e}")))?;
            data.extend_from_slice(&chunk);
        }
        uploads.push(Upload {
            filename,
            content_type,
            data,
        });
    }
    Ok(uploads)
}

/// Pulls exactly one upload out of the payload.
pub(crate) async fn single_upload(payload: &mut Multipart) -> Result<Upload, ApiError> {
    collect_uploads(payload)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::bad_request("No file provided"))
}

pub(crate) fn validate_conf_threshold(value: f32) -> Result<(), ApiError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ApiError::bad_request(
            "conf_threshold must be between 0.0 and 1.0",
        ))
    }
}

/// 503 unless a detector backend is registered.
pub(crate) fn ensure_backend(engine: &Engine) -> Result<(), ApiError> {
    if engine.backend_ready() {
        Ok(())
    } else {
        Err(ApiError::ServiceUnavailable("Model not loaded".into()))
    }
}

/// Runs detection and store work on the blocking pool so handler tasks
/// stay responsive.
pub(crate) async fn run_blocking<T, F>(work: F) -> Result<T, ApiError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    web::block(work)
        .await
        .map_err(|_| ApiError::internal("blocking worker pool is gone"))
}

/// Mounts every endpoint on the service root.
pub fn routes() -> Scope {
    web::scope("")
        .service(meta::root)
        .service(meta::health)
        .service(meta::model_info)
        .service(predict::predict)
        .service(predict::predict_image)
        .service(predict::predict_batch)
        .service(predict::check_compliance)
        .service(predict::predict_video)
        .service(reports::analytics)
        .service(reports::recent_detections)
        .default_service(web::route().to(meta::not_found))
}

/// Creates and binds the HTTP server.
pub fn http_server(engine: Arc<Engine>, addr: &str) -> Result<Server, std::io::Error> {
    Ok(HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(web::Data::from(engine.clone()))
            .service(routes())
    })
    .bind(addr)?
    .run())
}
