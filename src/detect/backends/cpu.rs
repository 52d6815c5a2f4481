use anyhow::{anyhow, Result};

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{BoundingBox, Detection};
use crate::frame::Frame;

const DEFAULT_CELL_SIZE: u32 = 8;
const DEFAULT_LUMA_THRESHOLD: u8 = 160;
const DEFAULT_MIN_CELLS: usize = 2;

/// CPU backend that reports bright regions as objects.
///
/// The frame is divided into square cells; a cell is lit when its mean luma is
/// at or above the threshold. Lit cells are grouped into 4-connected blobs and
/// each blob large enough becomes one detection. Good enough for lamps, LEDs,
/// and the synthetic source; use a model backend for real objects.
pub struct BrightBlobBackend {
    cell_size: u32,
    luma_threshold: u8,
    min_cells: usize,
}

impl BrightBlobBackend {
    pub fn new() -> Self {
        Self {
            cell_size: DEFAULT_CELL_SIZE,
            luma_threshold: DEFAULT_LUMA_THRESHOLD,
            min_cells: DEFAULT_MIN_CELLS,
        }
    }

    pub fn with_cell_size(mut self, cell_size: u32) -> Result<Self> {
        if cell_size == 0 {
            return Err(anyhow!("cell size must be > 0"));
        }
        self.cell_size = cell_size;
        Ok(self)
    }

    /// Mean luma per cell, row-major, with the grid dimensions.
    fn cell_luma(&self, frame: &Frame) -> (Vec<u8>, usize, usize) {
        let cols = frame.width.div_ceil(self.cell_size) as usize;
        let rows = frame.height.div_ceil(self.cell_size) as usize;
        let mut sums = vec![0u64; cols * rows];
        let mut counts = vec![0u64; cols * rows];

        for (i, px) in frame.pixels().chunks_exact(3).enumerate() {
            let x = (i % frame.width as usize) as u32 / self.cell_size;
            let y = (i / frame.width as usize) as u32 / self.cell_size;
            let cell = y as usize * cols + x as usize;
            sums[cell] += luma(px[0], px[1], px[2]) as u64;
            counts[cell] += 1;
        }

        let means = sums
            .iter()
            .zip(&counts)
            .map(|(sum, count)| if *count == 0 { 0 } else { (sum / count) as u8 })
            .collect();
        (means, cols, rows)
    }
}

impl Default for BrightBlobBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorBackend for BrightBlobBackend {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let (means, cols, rows) = self.cell_luma(frame);
        let mut visited = vec![false; means.len()];
        let mut detections = Vec::new();
        let mut stack = Vec::new();

        for start in 0..means.len() {
            if visited[start] || means[start] < self.luma_threshold {
                continue;
            }

            let (mut min_c, mut min_r) = (usize::MAX, usize::MAX);
            let (mut max_c, mut max_r) = (0usize, 0usize);
            let mut cells = 0usize;
            let mut luma_sum = 0u64;

            visited[start] = true;
            stack.push(start);
            while let Some(cell) = stack.pop() {
                let (c, r) = (cell % cols, cell / cols);
                min_c = min_c.min(c);
                min_r = min_r.min(r);
                max_c = max_c.max(c);
                max_r = max_r.max(r);
                cells += 1;
                luma_sum += means[cell] as u64;

                let mut visit = |n: usize| {
                    if !visited[n] && means[n] >= self.luma_threshold {
                        visited[n] = true;
                        stack.push(n);
                    }
                };
                if c > 0 {
                    visit(cell - 1);
                }
                if c + 1 < cols {
                    visit(cell + 1);
                }
                if r > 0 {
                    visit(cell - cols);
                }
                if r + 1 < rows {
                    visit(cell + cols);
                }
            }

            if cells < self.min_cells {
                continue;
            }

            let size = self.cell_size;
            let bbox = BoundingBox::new(
                min_c as u32 * size,
                min_r as u32 * size,
                (max_c - min_c + 1) as u32 * size,
                (max_r - min_r + 1) as u32 * size,
            )
            .clamp_to(frame.width, frame.height);
            let score = (luma_sum as f32 / cells as f32) / 255.0;
            detections.push(Detection::new(bbox, score, "bright_blob"));
        }

        Ok(detections)
    }
}

/// Rec. 601 luma, integer approximation.
fn luma(r: u8, g: u8, b: u8) -> u8 {
    ((r as u32 * 299 + g as u32 * 587 + b as u32 * 114) / 1000) as u8
}
