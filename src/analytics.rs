//! Aggregation of stored detection records into the analytics report.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use crate::round2;
use crate::store::DetectionRecord;

#[derive(Clone, Debug, Serialize)]
pub struct DateRange {
    pub start: String,
    pub end: String,
    /// Stringly typed for wire compatibility.
    pub days: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct AnalyticsSummary {
    pub total_detections: u64,
    pub total_persons: u64,
    pub total_helmets: u64,
    pub total_vests: u64,
    pub avg_detections_per_request: f64,
}

#[derive(Clone, Debug, Serialize)]
pub struct ComplianceStatistics {
    pub total_checks: u64,
    pub compliant: u64,
    pub non_compliant: u64,
    pub compliance_rate_percent: f64,
}

#[derive(Clone, Debug, Serialize)]
pub struct ViolationCount {
    pub violation: String,
    pub count: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct DailyTrend {
    pub date: String,
    pub requests: u64,
    pub detections: u64,
    pub persons: u64,
    pub helmets: u64,
    pub vests: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct PerformanceMetrics {
    pub avg_processing_time_ms: f64,
    pub min_processing_time_ms: f64,
    pub max_processing_time_ms: f64,
}

/// The `/analytics` payload. Section fields are `None` for an empty
/// window and serialize as `{}` rather than `null`.
#[derive(Clone, Debug, Serialize)]
pub struct AnalyticsReport {
    pub total_requests: u64,
    pub date_range: DateRange,
    #[serde(serialize_with = "empty_object_when_none")]
    pub summary: Option<AnalyticsSummary>,
    #[serde(serialize_with = "empty_object_when_none")]
    pub compliance_statistics: Option<ComplianceStatistics>,
    pub top_violations: Vec<ViolationCount>,
    pub detection_trends: Vec<DailyTrend>,
    #[serde(serialize_with = "empty_object_when_none")]
    pub performance_metrics: Option<PerformanceMetrics>,
}

fn empty_object_when_none<T, S>(value: &Option<T>, serializer: S) -> Result<S::Ok, S::Error>
where
    T: Serialize,
    S: Serializer,
{
    match value {
        Some(inner) => inner.serialize(serializer),
        None => serde_json::Map::new().serialize(serializer),
    }
}

/// Build the report for records already filtered to the requested window.
pub fn build_report(
    records: &[DetectionRecord],
    days: u32,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> AnalyticsReport {
    let date_range = DateRange {
        start: crate::rfc3339_micros(&start),
        end: crate::rfc3339_micros(&end),
        days: days.to_string(),
    };

    if records.is_empty() {
        return AnalyticsReport {
            total_requests: 0,
            date_range,
            summary: None,
            compliance_statistics: None,
            top_violations: vec![],
            detection_trends: vec![],
            performance_metrics: None,
        };
    }

    let total_requests = records.len() as u64;
    let total_detections: u64 = records.iter().map(|r| u64::from(r.total_detections)).sum();
    let total_persons: u64 = records.iter().map(|r| u64::from(r.person_count)).sum();
    let total_helmets: u64 = records.iter().map(|r| u64::from(r.helmet_count)).sum();
    let total_vests: u64 = records.iter().map(|r| u64::from(r.vest_count)).sum();

    let summary = AnalyticsSummary {
        total_detections,
        total_persons,
        total_helmets,
        total_vests,
        avg_detections_per_request: round2(total_detections as f64 / total_requests as f64),
    };

    let checked: Vec<&DetectionRecord> = records
        .iter()
        .filter(|r| r.is_compliant.is_some())
        .collect();
    let compliant = checked
        .iter()
        .filter(|r| r.is_compliant == Some(true))
        .count() as u64;
    let total_checks = checked.len() as u64;
    let compliance_rate = if total_checks > 0 {
        compliant as f64 / total_checks as f64 * 100.0
    } else {
        0.0
    };
    let compliance_statistics = ComplianceStatistics {
        total_checks,
        compliant,
        non_compliant: total_checks - compliant,
        compliance_rate_percent: round2(compliance_rate),
    };

    // First-seen order, stable sort by count, top five.
    let mut violations: Vec<ViolationCount> = Vec::new();
    for record in records {
        if record.is_compliant == Some(true) {
            continue;
        }
        if let Some(message) = &record.compliance_message {
            match violations.iter_mut().find(|v| v.violation == *message) {
                Some(entry) => entry.count += 1,
                None => violations.push(ViolationCount {
                    violation: message.clone(),
                    count: 1,
                }),
            }
        }
    }
    violations.sort_by(|a, b| b.count.cmp(&a.count));
    violations.truncate(5);

    let mut daily: BTreeMap<String, DailyTrend> = BTreeMap::new();
    for record in records {
        let date = record.timestamp.date_naive().to_string();
        let entry = daily.entry(date.clone()).or_insert_with(|| DailyTrend {
            date,
            requests: 0,
            detections: 0,
            persons: 0,
            helmets: 0,
            vests: 0,
        });
        entry.requests += 1;
        entry.detections += u64::from(record.total_detections);
        entry.persons += u64::from(record.person_count);
        entry.helmets += u64::from(record.helmet_count);
        entry.vests += u64::from(record.vest_count);
    }
    let detection_trends: Vec<DailyTrend> = daily.into_values().collect();

    let times: Vec<f64> = records.iter().map(|r| r.processing_time_ms).collect();
    let performance_metrics = PerformanceMetrics {
        avg_processing_time_ms: round2(times.iter().sum::<f64>() / times.len() as f64),
        min_processing_time_ms: round2(times.iter().copied().fold(f64::INFINITY, f64::min)),
        max_processing_time_ms: round2(times.iter().copied().fold(f64::NEG_INFINITY, f64::max)),
    };

    AnalyticsReport {
        total_requests,
        date_range,
        summary: Some(summary),
        compliance_statistics: Some(compliance_statistics),
        top_violations: violations,
        detection_trends,
        performance_metrics: Some(performance_metrics),
    }
}
