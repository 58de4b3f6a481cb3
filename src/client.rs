//! Blocking HTTP client for the service, used by the `hardhat` CLI.
//!
//! One method per endpoint, decoding into the shared payload types from
//! [`api::model`](crate::api::model). Server-side failures surface as the
//! `detail` string the service put in the body, prefixed with the status.

use std::io::Read;
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::{Client, Response};
use serde::de::DeserializeOwned;

use crate::api::model::{
    BatchPredictionResponse, ComplianceCheckResponse, HealthResponse, ModelInfoResponse,
    PredictionResponse, RecentRecordsResponse, VideoProcessingResponse,
};
use crate::config::ClientConfig;
use crate::video;

/// Cap on buffered camera bytes while waiting for a complete frame.
const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

pub struct ApiClient {
    http: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("build http client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(cfg: &ClientConfig) -> Result<Self> {
        Self::new(&cfg.api_url, Duration::from_secs(cfg.timeout_secs))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn health(&self) -> Result<HealthResponse> {
        let response = self
            .http
            .get(self.url("/health"))
            .send()
            .context("request /health")?;
        decode(response)
    }

    pub fn model_info(&self) -> Result<ModelInfoResponse> {
        let response = self
            .http
            .get(self.url("/model-info"))
            .send()
            .context("request /model-info")?;
        decode(response)
    }

    pub fn predict(
        &self,
        image: &Path,
        conf_threshold: f32,
        check_compliance: bool,
    ) -> Result<PredictionResponse> {
        self.send_predict(file_part(image)?, conf_threshold, check_compliance)
    }

    /// Prediction from in-memory JPEG bytes, as produced by a camera poll.
    pub fn predict_frame(
        &self,
        frame: Vec<u8>,
        filename: &str,
        conf_threshold: f32,
        check_compliance: bool,
    ) -> Result<PredictionResponse> {
        let part = Part::bytes(frame)
            .file_name(filename.to_string())
            .mime_str("image/jpeg")
            .context("set part content type")?;
        self.send_predict(part, conf_threshold, check_compliance)
    }

    fn send_predict(
        &self,
        part: Part,
        conf_threshold: f32,
        check_compliance: bool,
    ) -> Result<PredictionResponse> {
        let form = Form::new().part("file", part);
        let response = self
            .http
            .post(self.url("/predict"))
            .query(&[
                ("conf_threshold", conf_threshold.to_string()),
                ("check_compliance_flag", check_compliance.to_string()),
            ])
            .multipart(form)
            .send()
            .context("request /predict")?;
        decode(response)
    }

    /// Returns the annotated JPEG bytes.
    pub fn annotate(&self, image: &Path, conf_threshold: f32) -> Result<Vec<u8>> {
        let form = Form::new().part("file", file_part(image)?);
        let response = self
            .http
            .post(self.url("/predict-image"))
            .query(&[("conf_threshold", conf_threshold.to_string())])
            .multipart(form)
            .send()
            .context("request /predict-image")?;
        if !response.status().is_success() {
            return Err(api_error(response));
        }
        Ok(response.bytes().context("read annotated image")?.to_vec())
    }

    pub fn predict_batch(
        &self,
        images: &[std::path::PathBuf],
        conf_threshold: f32,
        check_compliance: bool,
    ) -> Result<BatchPredictionResponse> {
        let mut form = Form::new();
        for image in images {
            form = form.part("files", file_part(image)?);
        }
        let response = self
            .http
            .post(self.url("/predict-batch"))
            .query(&[
                ("conf_threshold", conf_threshold.to_string()),
                ("check_compliance_flag", check_compliance.to_string()),
            ])
            .multipart(form)
            .send()
            .context("request /predict-batch")?;
        decode(response)
    }

    pub fn check_compliance(
        &self,
        image: &Path,
        conf_threshold: f32,
    ) -> Result<ComplianceCheckResponse> {
        let form = Form::new().part("file", file_part(image)?);
        let response = self
            .http
            .post(self.url("/check-compliance"))
            .query(&[("conf_threshold", conf_threshold.to_string())])
            .multipart(form)
            .send()
            .context("request /check-compliance")?;
        decode(response)
    }

    pub fn predict_video(
        &self,
        clip: &Path,
        conf_threshold: f32,
        sample_rate: u32,
        max_frames: u32,
    ) -> Result<VideoProcessingResponse> {
        let form = Form::new().part("file", file_part(clip)?);
        let response = self
            .http
            .post(self.url("/predict-video"))
            .query(&[
                ("conf_threshold", conf_threshold.to_string()),
                ("sample_rate", sample_rate.to_string()),
                ("max_frames", max_frames.to_string()),
            ])
            .multipart(form)
            .send()
            .context("request /predict-video")?;
        decode(response)
    }

    /// Analytics payload as raw JSON: empty windows serialize sections as
    /// `{}`, so there is no single typed shape to decode into.
    pub fn analytics(&self, days: u32, endpoint: Option<&str>) -> Result<serde_json::Value> {
        let mut query = vec![("days", days.to_string())];
        if let Some(endpoint) = endpoint {
            query.push(("endpoint", endpoint.to_string()));
        }
        let response = self
            .http
            .get(self.url("/analytics"))
            .query(&query)
            .send()
            .context("request /analytics")?;
        decode(response)
    }

    pub fn recent(&self, limit: u32, endpoint: Option<&str>) -> Result<RecentRecordsResponse> {
        let mut query = vec![("limit", limit.to_string())];
        if let Some(endpoint) = endpoint {
            query.push(("endpoint", endpoint.to_string()));
        }
        let response = self
            .http
            .get(self.url("/recent-detections"))
            .query(&query)
            .send()
            .context("request /recent-detections")?;
        decode(response)
    }
}

/// Fetches one frame from an HTTP camera. MJPEG streams yield their first
/// complete frame without waiting for the stream to end; plain JPEG
/// endpoints yield the whole body.
pub fn fetch_camera_frame(http: &Client, url: &str) -> Result<Vec<u8>> {
    let mut response = http.get(url).send().with_context(|| format!("fetch {url}"))?;
    if !response.status().is_success() {
        return Err(api_error(response));
    }

    let mut buffer = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        let read = response.read(&mut chunk).context("read camera stream")?;
        if read == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..read]);
        if let Some(frame) = video::first_frame(&buffer) {
            return Ok(frame.to_vec());
        }
        if buffer.len() > MAX_FRAME_BYTES {
            return Err(anyhow!("no JPEG frame in the first {MAX_FRAME_BYTES} bytes"));
        }
    }
    match video::first_frame(&buffer) {
        Some(frame) => Ok(frame.to_vec()),
        None => Err(anyhow!("camera response contained no JPEG frame")),
    }
}

fn file_part(path: &Path) -> Result<Part> {
    let bytes = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("upload")
        .to_string();
    let mut part = Part::bytes(bytes).file_name(filename);
    if let Some(mime) = guess_mime(path) {
        part = part.mime_str(mime).context("set part content type")?;
    }
    Ok(part)
}

/// Content type from the file extension. Unknown extensions send no type,
/// which the service accepts.
fn guess_mime(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let mime = match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "webp" => "image/webp",
        "mjpeg" | "mjpg" => "video/x-motion-jpeg",
        "mp4" => "video/mp4",
        "avi" => "video/x-msvideo",
        "mov" => "video/quicktime",
        _ => return None,
    };
    Some(mime)
}

fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    if response.status().is_success() {
        response.json().context("decode response body")
    } else {
        Err(api_error(response))
    }
}

fn api_error(response: Response) -> anyhow::Error {
    let status = response.status();
    let body = response.text().unwrap_or_default();
    let detail = detail_from_body(&body).unwrap_or(body);
    anyhow!("server returned {}: {}", status.as_u16(), detail)
}

fn detail_from_body(body: &str) -> Option<String> {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()?
        .get("detail")?
        .as_str()
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = ApiClient::new("http://localhost:8001/", Duration::from_secs(5)).unwrap();
        assert_eq!(client.url("/health"), "http://localhost:8001/health");
    }

    #[test]
    fn mime_guessing_covers_common_extensions() {
        assert_eq!(guess_mime(Path::new("a.JPG")), Some("image/jpeg"));
        assert_eq!(guess_mime(Path::new("b.png")), Some("image/png"));
        assert_eq!(guess_mime(Path::new("c.mjpeg")), Some("video/x-motion-jpeg"));
        assert_eq!(guess_mime(Path::new("d.bin")), None);
        assert_eq!(guess_mime(Path::new("noext")), None);
    }

    #[test]
    fn detail_extraction_falls_back_to_raw_body() {
        assert_eq!(
            detail_from_body("{\"detail\": \"File must be an image\"}").as_deref(),
            Some("File must be an image")
        );
        assert_eq!(detail_from_body("plain text"), None);
        assert_eq!(detail_from_body("{\"other\": 1}"), None);
    }
}
