use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::detect::Detection;
use crate::rfc3339_micros;

/// One processed image, as persisted and reported by the service.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub request_id: String,
    pub filename: String,
    pub timestamp: DateTime<Utc>,
    pub image_width: u32,
    pub image_height: u32,
    pub image_size_kb: f64,
    pub total_detections: u32,
    pub person_count: u32,
    pub helmet_count: u32,
    pub vest_count: u32,
    pub confidence_threshold: f32,
    pub processing_time_ms: f64,
    pub is_compliant: Option<bool>,
    pub compliance_message: Option<String>,
    pub detections: Vec<Detection>,
    pub endpoint: String,
}

/// One processed video clip. Write-only today; kept for offline review.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VideoRecord {
    pub request_id: String,
    pub filename: String,
    pub timestamp: DateTime<Utc>,
    pub total_frames: u32,
    pub fps: f64,
    pub duration_seconds: f64,
    pub frames_processed: u32,
    pub total_detections: u32,
    pub avg_person_count: f64,
    pub avg_helmet_count: f64,
    pub avg_vest_count: f64,
    pub compliant_frames: u32,
    pub non_compliant_frames: u32,
    pub compliance_rate: f64,
    pub processing_time_seconds: f64,
    pub confidence_threshold: f32,
    pub sample_rate: u32,
}

pub trait DetectionStore: Send {
    fn save_detection(&mut self, record: &DetectionRecord) -> Result<()>;

    fn save_video(&mut self, record: &VideoRecord) -> Result<()>;

    /// Newest records first, optionally filtered by endpoint.
    fn recent_detections(
        &mut self,
        limit: u32,
        endpoint: Option<&str>,
    ) -> Result<Vec<DetectionRecord>>;

    /// All records with `timestamp >= start`, oldest first.
    fn detections_since(
        &mut self,
        start: DateTime<Utc>,
        endpoint: Option<&str>,
    ) -> Result<Vec<DetectionRecord>>;

    /// Cheap connectivity probe for the health endpoint.
    fn ping(&mut self) -> Result<()>;
}

fn decode_ts(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("parse stored timestamp '{}'", raw))?
        .with_timezone(&Utc))
}

pub struct SqliteDetectionStore {
    conn: Connection,
}

impl SqliteDetectionStore {
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        let mut store = Self { conn };
        store.ensure_schema()?;
        Ok(store)
    }

    fn ensure_schema(&mut self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;

            CREATE TABLE IF NOT EXISTS detection_records (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              request_id TEXT NOT NULL UNIQUE,
              filename TEXT NOT NULL,
              timestamp TEXT NOT NULL,
              image_width INTEGER NOT NULL,
              image_height INTEGER NOT NULL,
              image_size_kb REAL NOT NULL,
              total_detections INTEGER NOT NULL,
              person_count INTEGER NOT NULL,
              helmet_count INTEGER NOT NULL,
              vest_count INTEGER NOT NULL,
              confidence_threshold REAL NOT NULL,
              processing_time_ms REAL NOT NULL,
              is_compliant INTEGER,
              compliance_message TEXT,
              detections_json TEXT NOT NULL,
              endpoint TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS video_processing_records (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              request_id TEXT NOT NULL UNIQUE,
              filename TEXT NOT NULL,
              timestamp TEXT NOT NULL,
              total_frames INTEGER NOT NULL,
              fps REAL NOT NULL,
              duration_seconds REAL NOT NULL,
              frames_processed INTEGER NOT NULL,
              total_detections INTEGER NOT NULL,
              avg_person_count REAL NOT NULL,
              avg_helmet_count REAL NOT NULL,
              avg_vest_count REAL NOT NULL,
              compliant_frames INTEGER NOT NULL,
              non_compliant_frames INTEGER NOT NULL,
              compliance_rate REAL NOT NULL,
              processing_time_seconds REAL NOT NULL,
              confidence_threshold REAL NOT NULL,
              sample_rate INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_detections_timestamp ON detection_records(timestamp);
            CREATE INDEX IF NOT EXISTS idx_detections_endpoint ON detection_records(endpoint);
            "#,
        )?;
        Ok(())
    }

    fn rows_to_records(mut rows: rusqlite::Rows<'_>) -> Result<Vec<DetectionRecord>> {
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let timestamp: String = row.get(2)?;
            let is_compliant: Option<i64> = row.get(13)?;
            let detections_json: String = row.get(15)?;
            out.push(DetectionRecord {
                request_id: row.get(0)?,
                filename: row.get(1)?,
                timestamp: decode_ts(&timestamp)?,
                image_width: row.get(3)?,
                image_height: row.get(4)?,
                image_size_kb: row.get(5)?,
                total_detections: row.get(6)?,
                person_count: row.get(7)?,
                helmet_count: row.get(8)?,
                vest_count: row.get(9)?,
                confidence_threshold: row.get(10)?,
                processing_time_ms: row.get(11)?,
                is_compliant: is_compliant.map(|v| v != 0),
                compliance_message: row.get(14)?,
                detections: serde_json::from_str(&detections_json)
                    .context("parse stored detections")?,
                endpoint: row.get(16)?,
            });
        }
        Ok(out)
    }
}

const RECORD_COLUMNS: &str = "request_id, filename, timestamp, image_width, image_height, \
     image_size_kb, total_detections, person_count, helmet_count, vest_count, \
     confidence_threshold, processing_time_ms, is_compliant, compliance_message, \
     detections_json, endpoint";

impl DetectionStore for SqliteDetectionStore {
    fn save_detection(&mut self, record: &DetectionRecord) -> Result<()> {
        let detections_json = serde_json::to_string(&record.detections)?;
        self.conn.execute(
            r#"
            INSERT INTO detection_records(
              request_id, filename, timestamp, image_width, image_height, image_size_kb,
              total_detections, person_count, helmet_count, vest_count,
              confidence_threshold, processing_time_ms, is_compliant, compliance_message,
              detections_json, endpoint)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
            "#,
            params![
                record.request_id,
                record.filename,
                rfc3339_micros(&record.timestamp),
                record.image_width,
                record.image_height,
                record.image_size_kb,
                record.total_detections,
                record.person_count,
                record.helmet_count,
                record.vest_count,
                record.confidence_threshold,
                record.processing_time_ms,
                record.is_compliant.map(i64::from),
                record.compliance_message,
                detections_json,
                record.endpoint,
            ],
        )?;
        Ok(())
    }

    fn save_video(&mut self, record: &VideoRecord) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO video_processing_records(
              request_id, filename, timestamp, total_frames, fps, duration_seconds,
              frames_processed, total_detections, avg_person_count, avg_helmet_count,
              avg_vest_count, compliant_frames, non_compliant_frames, compliance_rate,
              processing_time_seconds, confidence_threshold, sample_rate)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
            "#,
            params![
                record.request_id,
                record.filename,
                rfc3339_micros(&record.timestamp),
                record.total_frames,
                record.fps,
                record.duration_seconds,
                record.frames_processed,
                record.total_detections,
                record.avg_person_count,
                record.avg_helmet_count,
                record.avg_vest_count,
                record.compliant_frames,
                record.non_compliant_frames,
                record.compliance_rate,
                record.processing_time_seconds,
                record.confidence_threshold,
                record.sample_rate,
            ],
        )?;
        Ok(())
    }

    fn recent_detections(
        &mut self,
        limit: u32,
        endpoint: Option<&str>,
    ) -> Result<Vec<DetectionRecord>> {
        match endpoint {
            Some(endpoint) => {
                let sql = format!(
                    "SELECT {} FROM detection_records WHERE endpoint = ?1 \
                     ORDER BY timestamp DESC, id DESC LIMIT ?2",
                    RECORD_COLUMNS
                );
                let mut stmt = self.conn.prepare(&sql)?;
                let rows = stmt.query(params![endpoint, limit])?;
                Self::rows_to_records(rows)
            }
            None => {
                let sql = format!(
                    "SELECT {} FROM detection_records ORDER BY timestamp DESC, id DESC LIMIT ?1",
                    RECORD_COLUMNS
                );
                let mut stmt = self.conn.prepare(&sql)?;
                let rows = stmt.query(params![limit])?;
                Self::rows_to_records(rows)
            }
        }
    }

    fn detections_since(
        &mut self,
        start: DateTime<Utc>,
        endpoint: Option<&str>,
    ) -> Result<Vec<DetectionRecord>> {
        let start = rfc3339_micros(&start);
        match endpoint {
            Some(endpoint) => {
                let sql = format!(
                    "SELECT {} FROM detection_records WHERE timestamp >= ?1 AND endpoint = ?2 \
                     ORDER BY id ASC",
                    RECORD_COLUMNS
                );
                let mut stmt = self.conn.prepare(&sql)?;
                let rows = stmt.query(params![start, endpoint])?;
                Self::rows_to_records(rows)
            }
            None => {
                let sql = format!(
                    "SELECT {} FROM detection_records WHERE timestamp >= ?1 ORDER BY id ASC",
                    RECORD_COLUMNS
                );
                let mut stmt = self.conn.prepare(&sql)?;
                let rows = stmt.query(params![start])?;
                Self::rows_to_records(rows)
            }
        }
    }

    fn ping(&mut self) -> Result<()> {
        self.conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryDetectionStore {
    detections: Vec<DetectionRecord>,
    videos: Vec<VideoRecord>,
}

impl InMemoryDetectionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DetectionStore for InMemoryDetectionStore {
    fn save_detection(&mut self, record: &DetectionRecord) -> Result<()> {
        if self
            .detections
            .iter()
            .any(|r| r.request_id == record.request_id)
        {
            return Err(anyhow::anyhow!(
                "duplicate request id '{}'",
                record.request_id
            ));
        }
        self.detections.push(record.clone());
        Ok(())
    }

    fn save_video(&mut self, record: &VideoRecord) -> Result<()> {
        self.videos.push(record.clone());
        Ok(())
    }

    fn recent_detections(
        &mut self,
        limit: u32,
        endpoint: Option<&str>,
    ) -> Result<Vec<DetectionRecord>> {
        let mut records: Vec<DetectionRecord> = self
            .detections
            .iter()
            .filter(|r| endpoint.map_or(true, |e| r.endpoint == e))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        records.truncate(limit as usize);
        Ok(records)
    }

    fn detections_since(
        &mut self,
        start: DateTime<Utc>,
        endpoint: Option<&str>,
    ) -> Result<Vec<DetectionRecord>> {
        Ok(self
            .detections
            .iter()
            .filter(|r| r.timestamp >= start)
            .filter(|r| endpoint.map_or(true, |e| r.endpoint == e))
            .cloned()
            .collect())
    }

    fn ping(&mut self) -> Result<()> {
        Ok(())
    }
}
