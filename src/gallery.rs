//! Local gallery of saved results.
//!
//! Results the operator keeps land under one root: annotated JPEGs in
//! `images/`, the records themselves in `index.json`. The index is always
//! rewritten atomically so a crash never leaves it half-written.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::model::{ComplianceCheckResponse, PredictionResponse};
use crate::detect::DetectionSummary;

const INDEX_FILE: &str = "index.json";
const IMAGES_DIR: &str = "images";

/// One saved result. `response` keeps the full payload verbatim for
/// later viewing.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GalleryRecord {
    pub id: String,
    pub saved_at: DateTime<Utc>,
    pub filename: String,
    pub endpoint: String,
    pub detections_count: u32,
    pub summary: DetectionSummary,
    pub is_compliant: Option<bool>,
    pub processing_time_ms: f64,
    /// Annotated JPEG location, relative to the gallery root.
    pub annotated_image: Option<String>,
    pub response: serde_json::Value,
}

impl GalleryRecord {
    pub fn from_prediction(response: &PredictionResponse, endpoint: &str) -> Result<Self> {
        Ok(Self {
            id: response.request_id.clone(),
            saved_at: Utc::now(),
            filename: response.metadata.filename.clone(),
            endpoint: endpoint.to_string(),
            detections_count: response.detections_count,
            summary: response.summary,
            is_compliant: response.compliance.as_ref().map(|c| c.is_compliant),
            processing_time_ms: response.metrics.processing_time_ms,
            annotated_image: None,
            response: serde_json::to_value(response).context("encode prediction payload")?,
        })
    }

    pub fn from_compliance(response: &ComplianceCheckResponse) -> Result<Self> {
        Ok(Self {
            id: response.request_id.clone(),
            saved_at: Utc::now(),
            filename: response.filename.clone(),
            endpoint: "check-compliance".to_string(),
            detections_count: response.summary.total(),
            summary: response.summary,
            is_compliant: Some(response.compliance.is_compliant),
            processing_time_ms: response.processing_time_ms,
            annotated_image: None,
            response: serde_json::to_value(response).context("encode compliance payload")?,
        })
    }
}

/// Record predicates for `gallery list`. Unset fields match everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct GalleryFilter<'a> {
    pub endpoint: Option<&'a str>,
    pub compliant: Option<bool>,
    pub min_detections: Option<u32>,
}

impl GalleryFilter<'_> {
    fn matches(&self, record: &GalleryRecord) -> bool {
        if let Some(endpoint) = self.endpoint {
            if record.endpoint != endpoint {
                return false;
            }
        }
        if let Some(compliant) = self.compliant {
            if record.is_compliant != Some(compliant) {
                return false;
            }
        }
        if let Some(min) = self.min_detections {
            if record.detections_count < min {
                return false;
            }
        }
        true
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GallerySort {
    #[default]
    Newest,
    Oldest,
    MostDetections,
    Filename,
}

pub struct Gallery {
    root: PathBuf,
}

impl Gallery {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(root.join(IMAGES_DIR))
            .with_context(|| format!("create gallery at {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Saves one record. When `annotated` is given the image lands under
    /// `images/<id>.jpg` and the record points at it.
    pub fn save(&self, mut record: GalleryRecord, annotated: Option<&[u8]>) -> Result<()> {
        let id = sanitize_id(&record.id)?;
        let mut records = self.load_index()?;
        if records.iter().any(|r| r.id == record.id) {
            return Err(anyhow!("gallery already holds record {}", record.id));
        }
        if let Some(bytes) = annotated {
            let relative = format!("{IMAGES_DIR}/{id}.jpg");
            write_atomic(&self.root.join(&relative), bytes)?;
            record.annotated_image = Some(relative);
        }
        records.push(record);
        self.store_index(&records)
    }

    pub fn list(
        &self,
        filter: &GalleryFilter<'_>,
        sort: GallerySort,
    ) -> Result<Vec<GalleryRecord>> {
        let mut records: Vec<GalleryRecord> = self
            .load_index()?
            .into_iter()
            .filter(|record| filter.matches(record))
            .collect();
        match sort {
            GallerySort::Newest => records.sort_by(|a, b| b.saved_at.cmp(&a.saved_at)),
            GallerySort::Oldest => records.sort_by(|a, b| a.saved_at.cmp(&b.saved_at)),
            GallerySort::MostDetections => {
                records.sort_by(|a, b| b.detections_count.cmp(&a.detections_count))
            }
            GallerySort::Filename => records.sort_by(|a, b| a.filename.cmp(&b.filename)),
        }
        Ok(records)
    }

    pub fn get(&self, id: &str) -> Result<Option<GalleryRecord>> {
        Ok(self.load_index()?.into_iter().find(|r| r.id == id))
    }

    /// Removes one record and its image. Returns false when the id is
    /// unknown. An image file that is already gone is not an error.
    pub fn remove(&self, id: &str) -> Result<bool> {
        let mut records = self.load_index()?;
        let before = records.len();
        let mut image = None;
        records.retain(|record| {
            if record.id == id {
                image = record.annotated_image.clone();
                false
            } else {
                true
            }
        });
        if records.len() == before {
            return Ok(false);
        }
        self.store_index(&records)?;
        if let Some(relative) = image {
            remove_image(&self.root.join(relative))?;
        }
        Ok(true)
    }

    /// Empties the gallery, returning how many records were dropped.
    pub fn clear(&self) -> Result<usize> {
        let records = self.load_index()?;
        for record in &records {
            if let Some(relative) = &record.annotated_image {
                remove_image(&self.root.join(relative))?;
            }
        }
        self.store_index(&[])?;
        Ok(records.len())
    }

    fn index_path(&self) -> PathBuf {
        self.root.join(INDEX_FILE)
    }

    fn load_index(&self) -> Result<Vec<GalleryRecord>> {
        let path = self.index_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("decode {}", path.display()))
    }

    fn store_index(&self, records: &[GalleryRecord]) -> Result<()> {
        let encoded = serde_json::to_vec_pretty(records).context("encode gallery index")?;
        write_atomic(&self.index_path(), &encoded)
    }
}

fn sanitize_id(id: &str) -> Result<&str> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("gallery record id cannot be empty"));
    }
    if !trimmed
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(anyhow!("gallery record id must be [A-Za-z0-9_-] only"));
    }
    Ok(trimmed)
}

fn remove_image(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(anyhow!("remove {}: {}", path.display(), e)),
    }
}

fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let tmp_path = path.with_extension("tmp");
    {
        let mut file = File::create(&tmp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
    }
    fs::rename(tmp_path, path)?;
    Ok(())
}
