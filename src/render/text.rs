use anyhow::{Context, Result};
use fontdue::{Font, FontSettings, Metrics};
use std::collections::HashMap;
use std::path::Path;

use super::tessellate::TextRun;

/// CPU text compositor for axis labels and panel titles.
pub struct TextOverlay {
    font: Font,
    glyphs: HashMap<(char, u32), (Metrics, Vec<u8>)>,
}

impl TextOverlay {
    pub fn from_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).with_context(|| format!("failed to read font {}", path.display()))?;
        Self::from_bytes(&bytes).with_context(|| format!("failed to parse font {}", path.display()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let font = Font::from_bytes(bytes, FontSettings::default()).map_err(anyhow::Error::msg)?;
        Ok(Self {
            font,
            glyphs: HashMap::new(),
        })
    }

    pub fn composite_all(&mut self, pixels: &mut [u8], width: u32, height: u32, runs: &[TextRun]) {
        for run in runs {
            self.composite(pixels, width, height, run);
        }
    }

    /// Draw one run with its top-left corner at `(run.x, run.y)`.
    pub fn composite(&mut self, pixels: &mut [u8], width: u32, height: u32, run: &TextRun) {
        let size = run.size;
        let mut cursor_x = run.x.round() as i32;
        for ch in run.text.chars() {
            let font = &self.font;
            let (metrics, bitmap) = self
                .glyphs
                .entry((ch, size.to_bits()))
                .or_insert_with(|| font.rasterize(ch, size));
            let glyph_y = run.y.round() as i32 + size as i32 - metrics.height as i32 - metrics.ymin;

            for gy in 0..metrics.height {
                for gx in 0..metrics.width {
                    let coverage = bitmap[gy * metrics.width + gx];
                    if coverage == 0 {
                        continue;
                    }
                    let px = cursor_x + metrics.xmin + gx as i32;
                    let py = glyph_y + gy as i32;
                    if px < 0 || py < 0 || px >= width as i32 || py >= height as i32 {
                        continue;
                    }
                    let idx = ((py as u32 * width + px as u32) * 4) as usize;
                    if let Some(dst) = pixels.get_mut(idx..idx + 4) {
                        blend(dst, run.color, coverage);
                    }
                }
            }

            cursor_x += metrics.advance_width.round() as i32;
        }
    }
}

fn blend(dst: &mut [u8], color: [u8; 4], coverage: u8) {
    let a = coverage as f32 / 255.0 * (color[3] as f32 / 255.0);
    let inv = 1.0 - a;
    for c in 0..3 {
        dst[c] = (color[c] as f32 * a + dst[c] as f32 * inv).round() as u8;
    }
    dst[3] = 255;
}
