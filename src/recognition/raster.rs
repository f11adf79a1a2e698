use std::io::Cursor;

use image::{GrayImage, ImageFormat, Luma};

use crate::geometry::merge_bounds;
use crate::models::{Bounds, Stroke};

use super::error::RecognitionError;
use super::remote::Rasterizer;

const INK: Luma<u8> = Luma([0]);
const PAPER: Luma<u8> = Luma([255]);

/// Renders strokes as black polylines on white, scaled to a fixed height.
#[derive(Debug, Clone)]
pub struct InkRasterizer {
    pub target_height: u32,
    pub padding: u32,
    pub line_width: u32,
    /// Upper bound on output width
    pub max_width: u32,
}

impl Default for InkRasterizer {
    fn default() -> Self {
        Self {
            target_height: 128,
            padding: 16,
            line_width: 3,
            max_width: 2048,
        }
    }
}

impl InkRasterizer {
    pub fn render(&self, strokes: &[Stroke], bounds: Option<&Bounds>) -> Result<GrayImage, RecognitionError> {
        let boxes: Vec<Bounds> = strokes.iter().map(Stroke::bounds).collect();
        let area = match bounds {
            Some(bounds) => *bounds,
            None => merge_bounds(&boxes)
                .ok_or_else(|| RecognitionError::Render("no strokes to rasterize".into()))?,
        };

        let inner_height = self.target_height.saturating_sub(2 * self.padding).max(1) as f64;
        let scale = inner_height / area.height.max(1.0);
        let width = ((area.width * scale).ceil() as u32 + 2 * self.padding).clamp(1, self.max_width);
        let height = self.target_height.max(1);
        let mut image = GrayImage::from_pixel(width, height, PAPER);

        let project = |x: f64, y: f64| {
            (
                (x - area.min_x) * scale + self.padding as f64,
                (y - area.min_y) * scale + self.padding as f64,
            )
        };

        let mut drawn = 0;
        for stroke in strokes {
            let points = stroke.points();
            if let [only] = points {
                let (x, y) = project(only.x, only.y);
                self.stamp(&mut image, x, y);
                drawn += 1;
                continue;
            }
            for segment in points.windows(2) {
                let from = project(segment[0].x, segment[0].y);
                let to = project(segment[1].x, segment[1].y);
                self.draw_segment(&mut image, from, to);
                drawn += 1;
            }
        }

        if drawn == 0 {
            return Err(RecognitionError::Render("strokes contain no points".into()));
        }
        Ok(image)
    }

    fn draw_segment(&self, image: &mut GrayImage, from: (f64, f64), to: (f64, f64)) {
        let length = (to.0 - from.0).hypot(to.1 - from.1);
        let steps = length.ceil().max(1.0) as usize;
        for step in 0..=steps {
            let f = step as f64 / steps as f64;
            self.stamp(image, from.0 + (to.0 - from.0) * f, from.1 + (to.1 - from.1) * f);
        }
    }

    fn stamp(&self, image: &mut GrayImage, x: f64, y: f64) {
        let radius = (self.line_width / 2) as i64;
        let (cx, cy) = (x.round() as i64, y.round() as i64);
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                let (px, py) = (cx + dx, cy + dy);
                if px >= 0 && py >= 0 && (px as u32) < image.width() && (py as u32) < image.height() {
                    image.put_pixel(px as u32, py as u32, INK);
                }
            }
        }
    }
}

impl Rasterizer for InkRasterizer {
    fn rasterize(&self, strokes: &[Stroke], bounds: Option<&Bounds>) -> Result<Vec<u8>, RecognitionError> {
        let image = self.render(strokes, bounds)?;
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .map_err(|err| RecognitionError::Render(format!("png encoding failed: {err}")))?;
        Ok(bytes)
    }
}
