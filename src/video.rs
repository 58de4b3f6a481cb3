//! MJPEG clip handling.
//!
//! Uploaded clips are treated as a concatenated JPEG stream. Frames are
//! split on SOI/EOI markers, then sampled and analysed one by one.

use serde::{Deserialize, Serialize};

use crate::detect::{Detection, DetectionSummary};
use crate::round2;

const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];

fn jpeg_bounds(buffer: &[u8]) -> Option<(usize, usize)> {
    let start = buffer.windows(2).position(|w| w == SOI)?;
    let rel = buffer[start + 2..].windows(2).position(|w| w == EOI)?;
    Some((start, start + 2 + rel + 2))
}

/// First complete JPEG frame in a byte stream, if one has arrived yet.
pub fn first_frame(bytes: &[u8]) -> Option<&[u8]> {
    jpeg_bounds(bytes).map(|(start, end)| &bytes[start..end])
}

/// Split a byte stream into JPEG frames. Bytes between frames are skipped;
/// a trailing partial frame is dropped.
pub fn split_frames(bytes: &[u8]) -> Vec<&[u8]> {
    let mut frames = Vec::new();
    let mut offset = 0;
    while offset < bytes.len() {
        match jpeg_bounds(&bytes[offset..]) {
            Some((start, end)) => {
                frames.push(&bytes[offset + start..offset + end]);
                offset += end;
            }
            None => break,
        }
    }
    frames
}

/// Per-frame analysis included in video responses.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FrameDetections {
    pub frame_number: u32,
    pub timestamp_seconds: f64,
    pub detections: Vec<Detection>,
    pub summary: DetectionSummary,
    pub is_compliant: bool,
}

impl FrameDetections {
    pub fn new(frame_number: u32, fps: f64, detections: Vec<Detection>, is_compliant: bool) -> Self {
        let timestamp_seconds = if fps > 0.0 {
            round2(f64::from(frame_number) / fps)
        } else {
            0.0
        };
        Self {
            frame_number,
            timestamp_seconds,
            summary: DetectionSummary::tally(&detections),
            detections,
            is_compliant,
        }
    }
}

/// Aggregated result of analysing one clip.
#[derive(Clone, Debug)]
pub struct VideoAnalysis {
    pub total_frames: u32,
    pub fps: f64,
    pub duration_seconds: f64,
    pub processed_frames: u32,
    pub frames: Vec<FrameDetections>,
    pub total_detections: u32,
    pub avg_person_count: f64,
    pub avg_helmet_count: f64,
    pub avg_vest_count: f64,
    pub compliant_frames: u32,
    pub non_compliant_frames: u32,
    pub compliance_rate: f64,
}

impl VideoAnalysis {
    pub fn from_frames(total_frames: u32, fps: f64, frames: Vec<FrameDetections>) -> Self {
        let processed = frames.len() as u32;
        let mut total_detections = 0u32;
        let mut person_sum = 0u64;
        let mut helmet_sum = 0u64;
        let mut vest_sum = 0u64;
        let mut compliant_frames = 0u32;

        for frame in &frames {
            total_detections += frame.detections.len() as u32;
            person_sum += u64::from(frame.summary.person);
            helmet_sum += u64::from(frame.summary.helmet);
            vest_sum += u64::from(frame.summary.safety_vest);
            if frame.is_compliant {
                compliant_frames += 1;
            }
        }

        let avg = |sum: u64| {
            if processed > 0 {
                sum as f64 / f64::from(processed)
            } else {
                0.0
            }
        };
        let compliance_rate = if processed > 0 {
            f64::from(compliant_frames) / f64::from(processed) * 100.0
        } else {
            0.0
        };
        let duration_seconds = if fps > 0.0 {
            f64::from(total_frames) / fps
        } else {
            0.0
        };

        Self {
            total_frames,
            fps,
            duration_seconds,
            processed_frames: processed,
            non_compliant_frames: processed - compliant_frames,
            compliant_frames,
            total_detections,
            avg_person_count: avg(person_sum),
            avg_helmet_count: avg(helmet_sum),
            avg_vest_count: avg(vest_sum),
            compliance_rate,
            frames,
        }
    }
}
