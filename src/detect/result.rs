use serde::{Deserialize, Serialize};

use crate::{round2, round3};

/// Detection classes the service reports.
///
/// Wire names and ids are fixed: `person` (0), `helmet` (1),
/// `safety-vest` (2).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PpeClass {
    #[serde(rename = "person")]
    Person,
    #[serde(rename = "helmet")]
    Helmet,
    #[serde(rename = "safety-vest")]
    SafetyVest,
}

impl PpeClass {
    pub const ALL: [PpeClass; 3] = [PpeClass::Person, PpeClass::Helmet, PpeClass::SafetyVest];

    pub fn id(self) -> u32 {
        match self {
            PpeClass::Person => 0,
            PpeClass::Helmet => 1,
            PpeClass::SafetyVest => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PpeClass::Person => "person",
            PpeClass::Helmet => "helmet",
            PpeClass::SafetyVest => "safety-vest",
        }
    }
}

impl std::fmt::Display for PpeClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Axis-aligned bounding box in pixel coordinates.
///
/// `(x1, y1)` is the top-left corner, `(x2, y2)` the bottom-right.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl BoundingBox {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f64 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f64 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    pub fn center(&self) -> (f64, f64) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    /// True when the two boxes share any area.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        !(self.x2 < other.x1 || self.x1 > other.x2 || self.y2 < other.y1 || self.y1 > other.y2)
    }

    /// Euclidean distance between box centers.
    pub fn center_distance(&self, other: &BoundingBox) -> f64 {
        let (cx1, cy1) = self.center();
        let (cx2, cy2) = other.center();
        ((cx1 - cx2).powi(2) + (cy1 - cy2).powi(2)).sqrt()
    }

    fn rounded(self) -> Self {
        Self {
            x1: round2(self.x1),
            y1: round2(self.y1),
            x2: round2(self.x2),
            y2: round2(self.y2),
        }
    }
}

/// A single detected object.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Detection {
    pub class_id: u32,
    pub class_name: PpeClass,
    pub confidence: f32,
    pub bounding_box: BoundingBox,
    pub area: f64,
}

impl Detection {
    /// Build a detection from raw backend output, applying the wire
    /// rounding (2 decimals for coordinates/area, 3 for confidence).
    pub fn new(class: PpeClass, confidence: f32, bounding_box: BoundingBox) -> Self {
        let bounding_box = bounding_box.rounded();
        Self {
            class_id: class.id(),
            class_name: class,
            confidence: round3(f64::from(confidence)) as f32,
            bounding_box,
            area: round2(bounding_box.area()),
        }
    }

    pub fn class(&self) -> PpeClass {
        self.class_name
    }
}

/// Per-class detection counts for one image or frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionSummary {
    #[serde(default)]
    pub person: u32,
    #[serde(default)]
    pub helmet: u32,
    #[serde(rename = "safety-vest", default)]
    pub safety_vest: u32,
}

impl DetectionSummary {
    pub fn tally(detections: &[Detection]) -> Self {
        let mut summary = Self::default();
        for detection in detections {
            summary.bump(detection.class());
        }
        summary
    }

    pub fn bump(&mut self, class: PpeClass) {
        match class {
            PpeClass::Person => self.person += 1,
            PpeClass::Helmet => self.helmet += 1,
            PpeClass::SafetyVest => self.safety_vest += 1,
        }
    }

    pub fn count(&self, class: PpeClass) -> u32 {
        match class {
            PpeClass::Person => self.person,
            PpeClass::Helmet => self.helmet,
            PpeClass::SafetyVest => self.safety_vest,
        }
    }

    pub fn total(&self) -> u32 {
        self.person + self.helmet + self.safety_vest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn box_math() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 20.0);
        assert_eq!(a.width(), 10.0);
        assert_eq!(a.height(), 20.0);
        assert_eq!(a.area(), 200.0);
        assert_eq!(a.center(), (5.0, 10.0));
    }

    #[test]
    fn overlap_and_distance() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let touching = BoundingBox::new(10.0, 0.0, 20.0, 10.0);
        let apart = BoundingBox::new(30.0, 0.0, 40.0, 10.0);

        assert!(a.intersects(&touching));
        assert!(!a.intersects(&apart));
        assert_eq!(a.center_distance(&apart), 30.0);
    }

    #[test]
    fn detection_applies_wire_rounding() {
        let d = Detection::new(
            PpeClass::Helmet,
            0.123_456,
            BoundingBox::new(1.004, 2.005, 3.006, 4.007),
        );
        assert_eq!(d.class_id, 1);
        assert_eq!(d.bounding_box.x1, 1.0);
        assert_eq!(d.bounding_box.y2, 4.01);
        assert!((f64::from(d.confidence) - 0.123).abs() < 1e-6);
    }

    #[test]
    fn summary_serializes_vest_with_dash() {
        let mut summary = DetectionSummary::default();
        summary.bump(PpeClass::SafetyVest);
        let json = serde_json::to_value(summary).unwrap();
        assert_eq!(json["safety-vest"], 1);
        assert_eq!(json["person"], 0);
    }
}
