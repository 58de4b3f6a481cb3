//! Hardhat — PPE compliance monitoring service and tooling.
//!
//! The crate implements a small detection pipeline for construction-site
//! safety monitoring: uploaded images and MJPEG clips are run through a
//! pluggable detector backend, the detections are paired into a PPE
//! compliance verdict, and every processed request is recorded in SQLite
//! for analytics and review.
//!
//! # Module Structure
//!
//! - `detect`: detection types, the `DetectorBackend` trait, registry and
//!   the bundled non-ML backends
//! - `compliance`: proximity-pairing compliance evaluation
//! - `media` / `video`: image decode+annotation, MJPEG clip splitting
//! - `store`: detection/video record persistence (SQLite or in-memory)
//! - `analytics`: report aggregation over stored records
//! - `api`: the actix-web HTTP surface
//! - `client` / `gallery`: operator-side API bindings and local result
//!   cache used by the `hardhat` CLI

use std::sync::Mutex;
use std::time::Instant;

use anyhow::{anyhow, Result};
use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use rand::RngCore;

pub mod analytics;
pub mod api;
pub mod client;
pub mod compliance;
pub mod config;
pub mod detect;
pub mod gallery;
pub mod media;
pub mod store;
pub mod video;

pub use compliance::{ComplianceDetails, ComplianceReport, DEFAULT_PAIRING_DISTANCE_PX};
pub use detect::{
    BackendInfo, BackendRegistry, BoundingBox, Detection, DetectionSummary, DetectorBackend,
    HiVisBackend, PpeClass, StubBackend,
};
pub use media::{ImageMetadata, LoadedImage};
pub use store::{
    DetectionRecord, DetectionStore, InMemoryDetectionStore, SqliteDetectionStore, VideoRecord,
};
pub use video::{FrameDetections, VideoAnalysis};

/// Round to 2 decimals, the wire precision for coordinates, areas and
/// derived rates.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Round to 3 decimals, the wire precision for confidences.
pub fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Fixed-width RFC 3339 timestamp, also used as the stored text form.
pub fn rfc3339_micros(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Request identifier: `req_` plus 12 lowercase hex chars.
pub fn generate_request_id() -> String {
    let mut bytes = [0u8; 6];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("req_{}", hex::encode(bytes))
}

// -------------------- Engine --------------------

/// Tunables shared by the image and video pipelines.
#[derive(Clone, Debug)]
pub struct EngineSettings {
    /// Max center distance (px) at which loose PPE still pairs with a person.
    pub pairing_distance_px: f64,
    /// Assumed frame rate for MJPEG clips, which carry none themselves.
    pub mjpeg_fps: f64,
    /// Upper bound on files per batch request.
    pub max_batch_files: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            pairing_distance_px: DEFAULT_PAIRING_DISTANCE_PX,
            mjpeg_fps: 30.0,
            max_batch_files: 50,
        }
    }
}

/// Outcome of processing one image.
#[derive(Clone, Debug)]
pub struct ImageAnalysis {
    pub metadata: ImageMetadata,
    pub detections: Vec<Detection>,
    pub summary: DetectionSummary,
    pub compliance: Option<ComplianceReport>,
    pub processing_time_ms: f64,
}

/// A persisted image prediction.
#[derive(Clone, Debug)]
pub struct PredictionRun {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
    pub analysis: ImageAnalysis,
}

/// A persisted video analysis.
#[derive(Clone, Debug)]
pub struct VideoRun {
    pub request_id: String,
    pub analysis: VideoAnalysis,
    pub processing_time_seconds: f64,
}

/// Core of the service: detector registry, record store and tunables.
/// Handlers and the CLI daemon share one instance behind `Arc`.
pub struct Engine {
    registry: BackendRegistry,
    store: Mutex<Box<dyn DetectionStore>>,
    settings: EngineSettings,
}

impl Engine {
    pub fn new(
        registry: BackendRegistry,
        store: Box<dyn DetectionStore>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            registry,
            store: Mutex::new(store),
            settings,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// True when a detector backend is registered.
    pub fn backend_ready(&self) -> bool {
        self.registry.default_backend().is_some()
    }

    pub fn backend_info(&self) -> Result<BackendInfo> {
        self.registry.default_info()
    }

    pub fn backend_names(&self) -> Vec<String> {
        self.registry.list()
    }

    /// True when the record store answers a probe query.
    pub fn store_healthy(&self) -> bool {
        match self.store.lock() {
            Ok(mut store) => store.ping().is_ok(),
            Err(_) => false,
        }
    }

    /// Decode, detect and optionally evaluate compliance. Does not persist.
    pub fn analyze_image(
        &self,
        bytes: &[u8],
        filename: &str,
        conf_threshold: f32,
        check_compliance: bool,
    ) -> Result<ImageAnalysis> {
        let start = Instant::now();
        let image = LoadedImage::from_bytes(bytes)?;
        let detections = self.registry.detect(
            image.pixels(),
            image.width(),
            image.height(),
            conf_threshold,
        )?;
        let summary = DetectionSummary::tally(&detections);
        let compliance = if check_compliance {
            Some(compliance::evaluate(
                &detections,
                self.settings.pairing_distance_px,
            ))
        } else {
            None
        };

        Ok(ImageAnalysis {
            metadata: image.metadata(filename),
            detections,
            summary,
            compliance,
            processing_time_ms: start.elapsed().as_secs_f64() * 1000.0,
        })
    }

    /// Analyze one image and persist the record under a fresh request id.
    pub fn predict(
        &self,
        bytes: &[u8],
        filename: &str,
        conf_threshold: f32,
        check_compliance: bool,
        endpoint: &str,
    ) -> Result<PredictionRun> {
        let request_id = generate_request_id();
        let analysis = self.analyze_image(bytes, filename, conf_threshold, check_compliance)?;
        let timestamp = Utc::now();

        let record = DetectionRecord {
            request_id: request_id.clone(),
            filename: filename.to_string(),
            timestamp,
            image_width: analysis.metadata.width,
            image_height: analysis.metadata.height,
            image_size_kb: analysis.metadata.size_kb,
            total_detections: analysis.detections.len() as u32,
            person_count: analysis.summary.person,
            helmet_count: analysis.summary.helmet,
            vest_count: analysis.summary.safety_vest,
            confidence_threshold: conf_threshold,
            processing_time_ms: analysis.processing_time_ms,
            is_compliant: analysis.compliance.as_ref().map(|c| c.is_compliant),
            compliance_message: analysis.compliance.as_ref().map(|c| c.message.clone()),
            detections: analysis.detections.clone(),
            endpoint: endpoint.to_string(),
        };
        self.locked_store()?.save_detection(&record)?;

        Ok(PredictionRun {
            request_id,
            timestamp,
            analysis,
        })
    }

    /// Detect and return the annotated JPEG. Nothing is persisted.
    pub fn annotate_image(&self, bytes: &[u8], conf_threshold: f32) -> Result<Vec<u8>> {
        let image = LoadedImage::from_bytes(bytes)?;
        let detections = self.registry.detect(
            image.pixels(),
            image.width(),
            image.height(),
            conf_threshold,
        )?;
        media::annotate(&image, &detections)
    }

    /// Split an MJPEG clip, analyse sampled frames and persist the video
    /// record. `sample_rate` keeps every Nth frame; processing stops after
    /// `max_frames` analysed frames or at the first undecodable one.
    pub fn process_video(
        &self,
        bytes: &[u8],
        filename: &str,
        conf_threshold: f32,
        sample_rate: u32,
        max_frames: u32,
    ) -> Result<VideoRun> {
        let start = Instant::now();
        let request_id = generate_request_id();
        let sample_rate = sample_rate.max(1);
        let fps = self.settings.mjpeg_fps;

        let frames = video::split_frames(bytes);
        let total_frames = frames.len() as u32;

        let mut processed: Vec<FrameDetections> = Vec::new();
        for (frame_number, frame) in frames.iter().enumerate() {
            if processed.len() >= max_frames as usize {
                break;
            }
            if frame_number as u32 % sample_rate != 0 {
                continue;
            }
            let image = match LoadedImage::from_bytes(frame) {
                Ok(image) => image,
                Err(err) => {
                    log::warn!("clip truncated at frame {}: {:#}", frame_number, err);
                    break;
                }
            };
            let detections = self.registry.detect(
                image.pixels(),
                image.width(),
                image.height(),
                conf_threshold,
            )?;
            let report =
                compliance::evaluate(&detections, self.settings.pairing_distance_px);
            processed.push(FrameDetections::new(
                frame_number as u32,
                fps,
                detections,
                report.is_compliant,
            ));
        }

        let analysis = VideoAnalysis::from_frames(total_frames, fps, processed);
        let processing_time_seconds = start.elapsed().as_secs_f64();

        let record = VideoRecord {
            request_id: request_id.clone(),
            filename: filename.to_string(),
            timestamp: Utc::now(),
            total_frames: analysis.total_frames,
            fps: analysis.fps,
            duration_seconds: analysis.duration_seconds,
            frames_processed: analysis.processed_frames,
            total_detections: analysis.total_detections,
            avg_person_count: analysis.avg_person_count,
            avg_helmet_count: analysis.avg_helmet_count,
            avg_vest_count: analysis.avg_vest_count,
            compliant_frames: analysis.compliant_frames,
            non_compliant_frames: analysis.non_compliant_frames,
            compliance_rate: analysis.compliance_rate,
            processing_time_seconds,
            confidence_threshold: conf_threshold,
            sample_rate,
        };
        self.locked_store()?.save_video(&record)?;

        Ok(VideoRun {
            request_id,
            analysis,
            processing_time_seconds,
        })
    }

    /// Analytics over the trailing `days` window.
    pub fn analytics(
        &self,
        days: u32,
        endpoint: Option<&str>,
    ) -> Result<analytics::AnalyticsReport> {
        let end = Utc::now();
        let start = end - TimeDelta::days(i64::from(days));
        let records = self.locked_store()?.detections_since(start, endpoint)?;
        Ok(analytics::build_report(&records, days, start, end))
    }

    pub fn recent(&self, limit: u32, endpoint: Option<&str>) -> Result<Vec<DetectionRecord>> {
        self.locked_store()?.recent_detections(limit, endpoint)
    }

    fn locked_store(&self) -> Result<std::sync::MutexGuard<'_, Box<dyn DetectionStore>>> {
        self.store
            .lock()
            .map_err(|_| anyhow!("record store lock poisoned"))
    }
}
