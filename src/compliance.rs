//! PPE compliance evaluation over a set of detections.
//!
//! Gear is attributed to a person when the bounding boxes overlap or
//! their centers are within a pairing distance of each other.

use serde::{Deserialize, Serialize};

use crate::detect::{Detection, PpeClass};

/// Default pairing distance between box centers, in pixels.
pub const DEFAULT_PAIRING_DISTANCE_PX: f64 = 50.0;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceDetails {
    pub total_persons: u32,
    pub persons_with_helmet: u32,
    pub persons_with_vest: u32,
    pub fully_compliant: u32,
    pub total_helmets: u32,
    pub total_vests: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ComplianceReport {
    pub is_compliant: bool,
    pub message: String,
    pub details: ComplianceDetails,
    pub violations: Vec<String>,
    pub warnings: Vec<String>,
}

fn paired(person: &Detection, gear: &Detection, pairing_distance_px: f64) -> bool {
    let p = &person.bounding_box;
    let g = &gear.bounding_box;
    p.intersects(g) || p.center_distance(g) < pairing_distance_px
}

/// Evaluate PPE compliance for one frame's detections.
pub fn evaluate(detections: &[Detection], pairing_distance_px: f64) -> ComplianceReport {
    let persons: Vec<&Detection> = detections
        .iter()
        .filter(|d| d.class() == PpeClass::Person)
        .collect();
    let helmets: Vec<&Detection> = detections
        .iter()
        .filter(|d| d.class() == PpeClass::Helmet)
        .collect();
    let vests: Vec<&Detection> = detections
        .iter()
        .filter(|d| d.class() == PpeClass::SafetyVest)
        .collect();

    let mut details = ComplianceDetails {
        total_helmets: helmets.len() as u32,
        total_vests: vests.len() as u32,
        ..ComplianceDetails::default()
    };

    if persons.is_empty() {
        return ComplianceReport {
            is_compliant: true,
            message: "No persons detected".to_string(),
            details,
            violations: vec![],
            warnings: vec![],
        };
    }

    details.total_persons = persons.len() as u32;

    let mut violations = Vec::new();
    for (i, person) in persons.iter().enumerate() {
        let n = i + 1;
        let has_helmet = helmets
            .iter()
            .any(|h| paired(person, h, pairing_distance_px));
        let has_vest = vests.iter().any(|v| paired(person, v, pairing_distance_px));

        if has_helmet {
            details.persons_with_helmet += 1;
        } else {
            violations.push(format!("Person #{} is not wearing a helmet", n));
        }

        if has_vest {
            details.persons_with_vest += 1;
        } else {
            violations.push(format!("Person #{} is not wearing a safety vest", n));
        }

        if has_helmet && has_vest {
            details.fully_compliant += 1;
        }
    }

    let is_compliant = violations.is_empty();
    let message = if is_compliant {
        format!("All {} person(s) are wearing required PPE", persons.len())
    } else {
        format!("{} PPE violation(s) detected", violations.len())
    };

    let mut warnings = Vec::new();
    if helmets.len() > persons.len() {
        warnings.push(format!(
            "Extra helmets detected ({} helmets for {} persons)",
            helmets.len(),
            persons.len()
        ));
    }
    if vests.len() > persons.len() {
        warnings.push(format!(
            "Extra vests detected ({} vests for {} persons)",
            vests.len(),
            persons.len()
        ));
    }

    ComplianceReport {
        is_compliant,
        message,
        details,
        violations,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;

    fn det(class: PpeClass, x1: f64, y1: f64, x2: f64, y2: f64) -> Detection {
        Detection::new(class, 0.9, BoundingBox::new(x1, y1, x2, y2))
    }

    #[test]
    fn empty_scene_is_compliant() {
        let report = evaluate(&[], DEFAULT_PAIRING_DISTANCE_PX);
        assert!(report.is_compliant);
        assert_eq!(report.message, "No persons detected");
        assert_eq!(report.details.total_persons, 0);
    }

    #[test]
    fn unattended_gear_still_counts_in_details() {
        let detections = vec![det(PpeClass::Helmet, 0.0, 0.0, 20.0, 20.0)];
        let report = evaluate(&detections, DEFAULT_PAIRING_DISTANCE_PX);
        assert!(report.is_compliant);
        assert_eq!(report.details.total_helmets, 1);
        assert_eq!(report.details.total_vests, 0);
    }

    #[test]
    fn fully_equipped_person_is_compliant() {
        let detections = vec![
            det(PpeClass::Person, 100.0, 100.0, 200.0, 400.0),
            det(PpeClass::Helmet, 120.0, 100.0, 180.0, 140.0),
            det(PpeClass::SafetyVest, 110.0, 180.0, 190.0, 280.0),
        ];
        let report = evaluate(&detections, DEFAULT_PAIRING_DISTANCE_PX);
        assert!(report.is_compliant);
        assert_eq!(report.message, "All 1 person(s) are wearing required PPE");
        assert_eq!(report.details.fully_compliant, 1);
        assert!(report.violations.is_empty());
    }

    #[test]
    fn missing_vest_reports_one_violation() {
        let detections = vec![
            det(PpeClass::Person, 100.0, 100.0, 200.0, 400.0),
            det(PpeClass::Helmet, 120.0, 100.0, 180.0, 140.0),
        ];
        let report = evaluate(&detections, DEFAULT_PAIRING_DISTANCE_PX);
        assert!(!report.is_compliant);
        assert_eq!(report.message, "1 PPE violation(s) detected");
        assert_eq!(
            report.violations,
            vec!["Person #1 is not wearing a safety vest".to_string()]
        );
        assert_eq!(report.details.persons_with_helmet, 1);
        assert_eq!(report.details.persons_with_vest, 0);
    }

    #[test]
    fn nearby_gear_pairs_by_center_distance() {
        // Helmet box floats above the person without overlap; centers are
        // 45 px apart, inside the 50 px pairing distance.
        let person = det(PpeClass::Person, 100.0, 100.0, 140.0, 160.0);
        let near = det(PpeClass::Helmet, 110.0, 75.0, 130.0, 95.0);
        let report = evaluate(
            &[person.clone(), near],
            DEFAULT_PAIRING_DISTANCE_PX,
        );
        assert_eq!(report.details.persons_with_helmet, 1);

        let far = det(PpeClass::Helmet, 110.0, 10.0, 130.0, 30.0);
        let report = evaluate(&[person, far], DEFAULT_PAIRING_DISTANCE_PX);
        assert_eq!(report.details.persons_with_helmet, 0);
        assert_eq!(
            report.violations,
            vec![
                "Person #1 is not wearing a helmet".to_string(),
                "Person #1 is not wearing a safety vest".to_string(),
            ]
        );
    }

    #[test]
    fn surplus_gear_raises_warnings() {
        let detections = vec![
            det(PpeClass::Person, 100.0, 100.0, 200.0, 400.0),
            det(PpeClass::Helmet, 120.0, 100.0, 180.0, 140.0),
            det(PpeClass::Helmet, 400.0, 100.0, 460.0, 140.0),
            det(PpeClass::SafetyVest, 110.0, 180.0, 190.0, 280.0),
        ];
        let report = evaluate(&detections, DEFAULT_PAIRING_DISTANCE_PX);
        assert!(report.is_compliant);
        assert_eq!(
            report.warnings,
            vec!["Extra helmets detected (2 helmets for 1 persons)".to_string()]
        );
    }
}
