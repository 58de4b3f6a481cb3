use anyhow::Result;

use crate::detect::backend::{BackendInfo, DetectorBackend};
use crate::detect::result::{BoundingBox, Detection, PpeClass};

const GRID: usize = 8;
const CELL_RATIO: f64 = 0.35;

/// Heuristic backend that sweeps frames for high-visibility safety colours.
///
/// It cannot find persons. Marked grid cells are grouped into vertical
/// bands; a small band in the top third of the frame is reported as a
/// helmet, anything else as a safety vest.
#[derive(Default)]
pub struct HiVisBackend;

impl HiVisBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

fn is_hi_vis(r: u8, g: u8, b: u8) -> bool {
    let yellow = r >= 170 && g >= 170 && b <= 110;
    let orange = r >= 190 && (80..=170).contains(&g) && b <= 100;
    yellow || orange
}

impl DetectorBackend for HiVisBackend {
    fn name(&self) -> &'static str {
        "hivis"
    }

    fn info(&self) -> BackendInfo {
        BackendInfo {
            name: self.name(),
            kind: "heuristic",
            classes: vec![PpeClass::Helmet, PpeClass::SafetyVest],
        }
    }

    fn detect(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
        conf_threshold: f32,
    ) -> Result<Vec<Detection>> {
        let w = width as usize;
        let h = height as usize;
        if pixels.len() < w * h * 3 {
            anyhow::bail!(
                "pixel buffer too short: {} bytes for {}x{} rgb",
                pixels.len(),
                width,
                height
            );
        }
        if w < GRID || h < GRID {
            return Ok(vec![]);
        }

        let cell_w = w / GRID;
        let cell_h = h / GRID;

        let mut hits = [[0u32; GRID]; GRID];
        let mut totals = [[0u32; GRID]; GRID];
        for y in 0..h {
            let row = (y / cell_h).min(GRID - 1);
            for x in 0..w {
                let col = (x / cell_w).min(GRID - 1);
                let idx = (y * w + x) * 3;
                totals[row][col] += 1;
                if is_hi_vis(pixels[idx], pixels[idx + 1], pixels[idx + 2]) {
                    hits[row][col] += 1;
                }
            }
        }

        let marked = |row: usize, col: usize| -> bool {
            totals[row][col] > 0
                && f64::from(hits[row][col]) / f64::from(totals[row][col]) >= CELL_RATIO
        };
        let row_has_mark = |row: usize| (0..GRID).any(|col| marked(row, col));

        // Group contiguous marked rows into bands, one detection each.
        let mut detections = Vec::new();
        let mut row = 0;
        while row < GRID {
            if !row_has_mark(row) {
                row += 1;
                continue;
            }
            let band_start = row;
            while row < GRID && row_has_mark(row) {
                row += 1;
            }
            let band_end = row;

            let mut col_min = GRID;
            let mut col_max = 0;
            let mut hit_sum = 0u32;
            let mut total_sum = 0u32;
            for r in band_start..band_end {
                for c in 0..GRID {
                    if marked(r, c) {
                        col_min = col_min.min(c);
                        col_max = col_max.max(c);
                        hit_sum += hits[r][c];
                        total_sum += totals[r][c];
                    }
                }
            }
            let bbox = BoundingBox::new(
                (col_min * cell_w) as f64,
                (band_start * cell_h) as f64,
                ((col_max + 1) * cell_w) as f64,
                (band_end * cell_h) as f64,
            );
            let density = f64::from(hit_sum) / f64::from(total_sum.max(1));
            let confidence = (0.40 + density * 0.55).min(0.95) as f32;

            let small = bbox.area() <= (w * h) as f64 * 0.08;
            let high = bbox.center().1 < h as f64 / 3.0;
            let class = if small && high {
                PpeClass::Helmet
            } else {
                PpeClass::SafetyVest
            };

            if confidence >= conf_threshold {
                detections.push(Detection::new(class, confidence, bbox));
            }
        }

        Ok(detections)
    }
}
