use anyhow::Result;
use sha2::{Digest, Sha256};

use crate::detect::backend::{BackendInfo, DetectorBackend};
use crate::detect::result::{BoundingBox, Detection, PpeClass};

/// Stub backend for testing. Derives a deterministic synthetic scene from a
/// hash of the frame pixels: zero to three persons, each with or without a
/// helmet and vest box overlapping it.
pub struct StubBackend {
    frames_seen: u64,
}

fn frac(byte: u8) -> f64 {
    f64::from(byte) / 255.0
}

impl StubBackend {
    pub fn new() -> Self {
        Self { frames_seen: 0 }
    }

    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn info(&self) -> BackendInfo {
        BackendInfo {
            name: self.name(),
            kind: "synthetic",
            classes: PpeClass::ALL.to_vec(),
        }
    }

    fn detect(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
        conf_threshold: f32,
    ) -> Result<Vec<Detection>> {
        self.frames_seen += 1;

        let digest: [u8; 32] = Sha256::digest(pixels).into();
        let person_count = usize::from(digest[0] % 4);

        let w = f64::from(width.max(1));
        let h = f64::from(height.max(1));

        let mut detections = Vec::new();
        for i in 0..person_count {
            // Eight digest bytes drive each synthetic person.
            let b = &digest[1 + i * 8..9 + i * 8];

            let pw = w * (0.12 + frac(b[1]) * 0.10);
            let ph = h * (0.30 + frac(b[2]) * 0.15);
            let x1 = frac(b[0]) * (w - pw);
            let y1 = frac(b[3]) * (h - ph);
            let person_box = BoundingBox::new(x1, y1, x1 + pw, y1 + ph);

            let person_conf = 0.55 + frac(b[4]) as f32 * 0.40;
            if person_conf >= conf_threshold {
                detections.push(Detection::new(PpeClass::Person, person_conf, person_box));
            }

            // Helmet cap on the top edge of the person box, three in four
            // persons wear one.
            if b[5] % 4 != 0 {
                let hw = pw * 0.6;
                let hx1 = x1 + (pw - hw) / 2.0;
                let helmet_box = BoundingBox::new(hx1, y1, hx1 + hw, y1 + ph * 0.2);
                let helmet_conf = 0.40 + frac(b[5]) as f32 * 0.55;
                if helmet_conf >= conf_threshold {
                    detections.push(Detection::new(PpeClass::Helmet, helmet_conf, helmet_box));
                }
            }

            // Vest over the torso, again three in four.
            if b[6] % 4 != 0 {
                let vw = pw * 0.8;
                let vx1 = x1 + (pw - vw) / 2.0;
                let vy1 = y1 + ph * 0.25;
                let vest_box = BoundingBox::new(vx1, vy1, vx1 + vw, vy1 + ph * 0.35);
                let vest_conf = 0.40 + frac(b[6]) as f32 * 0.55;
                if vest_conf >= conf_threshold {
                    detections.push(Detection::new(PpeClass::SafetyVest, vest_conf, vest_box));
                }
            }
        }

        Ok(detections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_is_deterministic_per_frame() {
        let mut a = StubBackend::new();
        let mut b = StubBackend::new();

        let r1 = a.detect(b"frame-alpha", 640, 480, 0.25).unwrap();
        let r2 = b.detect(b"frame-alpha", 640, 480, 0.25).unwrap();
        assert_eq!(
            serde_json::to_string(&r1).unwrap(),
            serde_json::to_string(&r2).unwrap()
        );
    }

    #[test]
    fn stub_honors_confidence_threshold() {
        let mut backend = StubBackend::new();
        let all = backend.detect(b"frame-beta", 640, 480, 0.0).unwrap();
        let strict = backend.detect(b"frame-beta", 640, 480, 0.9).unwrap();
        assert!(strict.len() <= all.len());
        for det in &strict {
            assert!(det.confidence >= 0.9);
        }
    }

    #[test]
    fn stub_boxes_stay_inside_frame() {
        let mut backend = StubBackend::new();
        for seed in 0u8..16 {
            let detections = backend.detect(&[seed; 64], 320, 240, 0.0).unwrap();
            for det in detections {
                assert!(det.bounding_box.x1 >= 0.0);
                assert!(det.bounding_box.y1 >= 0.0);
                assert!(det.bounding_box.x2 <= 320.0);
                assert!(det.bounding_box.y2 <= 240.0);
            }
        }
    }

    #[test]
    fn stub_gear_overlaps_its_person() {
        let mut backend = StubBackend::new();
        // Sweep seeds until a frame with at least one person shows up.
        for seed in 0u8..32 {
            let detections = backend.detect(&[seed; 128], 640, 480, 0.0).unwrap();
            let persons: Vec<_> = detections
                .iter()
                .filter(|d| d.class() == PpeClass::Person)
                .collect();
            for det in &detections {
                if det.class() == PpeClass::Person {
                    continue;
                }
                assert!(
                    persons
                        .iter()
                        .any(|p| p.bounding_box.intersects(&det.bounding_box)),
                    "gear box must overlap a person box"
                );
            }
        }
    }
}
