use image::{GrayImage, Luma};
use imageproc::drawing::draw_filled_circle_mut;

const PAINT: Luma<u8> = Luma([255u8]);

/// Freehand alpha overlay restricting where the filtered image shows.
///
/// The surface is a raster at the native image resolution; strokes are
/// stamped as round dabs (round caps and joins fall out of the stamping)
/// and are not individually undoable — only [`MaskLayer::clear`] is.
/// All stroke coordinates are native image pixels; callers invert the
/// viewport transform before handing points in, so zoom and pan never
/// distort stored paint.
#[derive(Debug, Clone)]
pub struct MaskLayer {
    surface: GrayImage,
    brush_radius: f32,
    last_point: Option<(f32, f32)>,
    painted: bool,
}

impl MaskLayer {
    /// Blank mask covering an image of the given native dimensions.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            surface: GrayImage::new(width, height),
            brush_radius: 24.0,
            last_point: None,
            painted: false,
        }
    }

    /// Brush radius in native image pixels.
    pub fn set_brush_radius(&mut self, radius: f32) {
        self.brush_radius = radius.max(1.0);
    }

    pub fn brush_radius(&self) -> f32 {
        self.brush_radius
    }

    /// True once any dab has been stamped since the last clear.
    pub fn has_paint(&self) -> bool {
        self.painted
    }

    pub fn begin_stroke(&mut self, point: (f32, f32)) {
        self.stamp(point);
        self.last_point = Some(point);
    }

    /// Extends the active stroke, interpolating dabs between the previous
    /// sample and `point` so fast drags leave no gaps.
    pub fn extend_stroke(&mut self, point: (f32, f32)) {
        let Some(prev) = self.last_point else {
            self.begin_stroke(point);
            return;
        };

        let dx = point.0 - prev.0;
        let dy = point.1 - prev.1;
        let dist = (dx * dx + dy * dy).sqrt();
        let spacing = (self.brush_radius * 0.5).max(0.5);
        if dist > 0.0 {
            let steps = (dist / spacing).ceil() as u32;
            for i in 1..=steps {
                let t = i as f32 / steps as f32;
                self.stamp((prev.0 + dx * t, prev.1 + dy * t));
            }
        }
        self.last_point = Some(point);
    }

    pub fn end_stroke(&mut self) {
        self.last_point = None;
    }

    /// Blanks the surface; the preview drops its mask reference when this
    /// leaves the layer without paint.
    pub fn clear(&mut self) {
        for px in self.surface.pixels_mut() {
            *px = Luma([0]);
        }
        self.last_point = None;
        self.painted = false;
    }

    /// Mask value at a native pixel, 0 outside the surface.
    pub fn value_at(&self, x: u32, y: u32) -> u8 {
        if x < self.surface.width() && y < self.surface.height() {
            self.surface.get_pixel(x, y)[0]
        } else {
            0
        }
    }

    pub fn surface(&self) -> &GrayImage {
        &self.surface
    }

    /// Encodes the raster as a PNG usable as a standalone visibility mask.
    pub fn to_png_bytes(&self) -> anyhow::Result<Vec<u8>> {
        let mut bytes = Vec::new();
        image::DynamicImage::ImageLuma8(self.surface.clone())
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)?;
        Ok(bytes)
    }

    fn stamp(&mut self, point: (f32, f32)) {
        let x = point.0.round() as i32;
        let y = point.1.round() as i32;
        let r = self.brush_radius.round().max(1.0) as i32;
        draw_filled_circle_mut(&mut self.surface, (x, y), r, PAINT);
        self.painted = true;
    }
}
