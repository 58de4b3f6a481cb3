//! Wire payloads shared by the HTTP handlers and the CLI client.
//!
//! Domain results carry raw floating-point values; the builders here apply
//! the response rounding (two decimals on totals and rates) so every caller
//! sees identical JSON.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::compliance::ComplianceReport;
use crate::detect::{Detection, DetectionSummary};
use crate::media::ImageMetadata;
use crate::round2;
use crate::store::DetectionRecord;
use crate::video::FrameDetections;
use crate::{PredictionRun, VideoRun};

/// Per-frame detail is capped in video responses; aggregates still cover
/// every processed frame.
pub const FRAME_DETAIL_LIMIT: usize = 50;

// -------------------- Prediction --------------------

/// Timing block attached to single-image responses.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProcessingMetrics {
    pub processing_time_ms: f64,
    pub timestamp: DateTime<Utc>,
    pub request_id: String,
}

/// Response body for `/predict` and each entry of a batch result.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub success: bool,
    pub request_id: String,
    pub metadata: ImageMetadata,
    pub detections_count: u32,
    pub detections: Vec<Detection>,
    pub summary: DetectionSummary,
    pub confidence_threshold: f32,
    pub metrics: ProcessingMetrics,
    /// `null` unless compliance checking was requested.
    pub compliance: Option<ComplianceReport>,
}

impl PredictionResponse {
    pub fn from_run(run: PredictionRun, confidence_threshold: f32) -> Self {
        let PredictionRun {
            request_id,
            timestamp,
            analysis,
        } = run;
        Self {
            success: true,
            request_id: request_id.clone(),
            metadata: analysis.metadata,
            detections_count: analysis.detections.len() as u32,
            detections: analysis.detections,
            summary: analysis.summary,
            confidence_threshold,
            metrics: ProcessingMetrics {
                processing_time_ms: analysis.processing_time_ms,
                timestamp,
                request_id,
            },
            compliance: analysis.compliance,
        }
    }
}

/// Response body for `/predict-batch`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchPredictionResponse {
    pub success: bool,
    pub request_id: String,
    pub total_images: u32,
    pub processed_images: u32,
    pub failed_images: u32,
    pub results: Vec<PredictionResponse>,
    pub total_processing_time_ms: f64,
    pub average_time_per_image_ms: f64,
}

impl BatchPredictionResponse {
    /// Assembles the batch envelope. Averages cover successful images only;
    /// a batch where everything failed reports an average of zero.
    pub fn new(
        request_id: String,
        total_images: u32,
        failed_images: u32,
        results: Vec<PredictionResponse>,
        total_processing_time_ms: f64,
    ) -> Self {
        let processed_images = results.len() as u32;
        let average = if processed_images > 0 {
            total_processing_time_ms / f64::from(processed_images)
        } else {
            0.0
        };
        Self {
            success: true,
            request_id,
            total_images,
            processed_images,
            failed_images,
            results,
            total_processing_time_ms: round2(total_processing_time_ms),
            average_time_per_image_ms: round2(average),
        }
    }
}

/// Reduced response body for `/check-compliance`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ComplianceCheckResponse {
    pub success: bool,
    pub request_id: String,
    pub filename: String,
    pub summary: DetectionSummary,
    pub compliance: ComplianceReport,
    pub processing_time_ms: f64,
}

impl ComplianceCheckResponse {
    /// Returns `None` when the run skipped the compliance evaluation.
    pub fn from_run(run: PredictionRun) -> Option<Self> {
        let compliance = run.analysis.compliance?;
        Some(Self {
            success: true,
            request_id: run.request_id,
            filename: run.analysis.metadata.filename,
            summary: run.analysis.summary,
            compliance,
            processing_time_ms: run.analysis.processing_time_ms,
        })
    }
}

// -------------------- Video --------------------

/// Source-clip properties echoed back with a video response.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub total_frames: u32,
    pub fps: f64,
    pub duration_seconds: f64,
    pub sample_rate: u32,
}

/// Whole-clip aggregates across every processed frame.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VideoOverallSummary {
    pub total_detections: u32,
    pub avg_person_count: f64,
    pub avg_helmet_count: f64,
    pub avg_vest_count: f64,
    pub compliant_frames: u32,
    pub non_compliant_frames: u32,
}

/// Response body for `/predict-video`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VideoProcessingResponse {
    pub success: bool,
    pub request_id: String,
    pub filename: String,
    pub metadata: VideoMetadata,
    pub total_frames: u32,
    pub processed_frames: u32,
    pub frame_detections: Vec<FrameDetections>,
    pub overall_summary: VideoOverallSummary,
    pub compliance_rate: f64,
    pub processing_time_seconds: f64,
}

impl VideoProcessingResponse {
    pub fn from_run(run: VideoRun, filename: String, sample_rate: u32) -> Self {
        let VideoRun {
            request_id,
            analysis,
            processing_time_seconds,
        } = run;
        let mut frame_detections = analysis.frames;
        frame_detections.truncate(FRAME_DETAIL_LIMIT);
        Self {
            success: true,
            request_id,
            filename,
            metadata: VideoMetadata {
                total_frames: analysis.total_frames,
                fps: analysis.fps,
                duration_seconds: round2(analysis.duration_seconds),
                sample_rate,
            },
            total_frames: analysis.total_frames,
            processed_frames: analysis.processed_frames,
            frame_detections,
            overall_summary: VideoOverallSummary {
                total_detections: analysis.total_detections,
                avg_person_count: round2(analysis.avg_person_count),
                avg_helmet_count: round2(analysis.avg_helmet_count),
                avg_vest_count: round2(analysis.avg_vest_count),
                compliant_frames: analysis.compliant_frames,
                non_compliant_frames: analysis.non_compliant_frames,
            },
            compliance_rate: round2(analysis.compliance_rate),
            processing_time_seconds: round2(processing_time_seconds),
        }
    }
}

// -------------------- History and status --------------------

/// One row of `/recent-detections`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RecentRecord {
    pub request_id: String,
    pub filename: String,
    pub timestamp: DateTime<Utc>,
    pub endpoint: String,
    pub detections_count: u32,
    pub summary: DetectionSummary,
    pub is_compliant: Option<bool>,
    pub processing_time_ms: f64,
}

impl From<DetectionRecord> for RecentRecord {
    fn from(record: DetectionRecord) -> Self {
        Self {
            request_id: record.request_id,
            filename: record.filename,
            timestamp: record.timestamp,
            endpoint: record.endpoint,
            detections_count: record.total_detections,
            summary: DetectionSummary {
                person: record.person_count,
                helmet: record.helmet_count,
                safety_vest: record.vest_count,
            },
            is_compliant: record.is_compliant,
            processing_time_ms: record.processing_time_ms,
        }
    }
}

/// Response body for `/recent-detections`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RecentRecordsResponse {
    pub success: bool,
    pub total: u32,
    pub records: Vec<RecentRecord>,
}

/// Response body for `/health`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub model_loaded: bool,
    pub database: String,
}

/// Response body for `/model-info`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelInfoResponse {
    pub backend: String,
    pub kind: String,
    pub classes: BTreeMap<u32, String>,
    pub num_classes: usize,
    pub available_backends: Vec<String>,
}
