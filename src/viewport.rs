pub const MIN_SCALE: f32 = 1.0;
pub const MAX_SCALE: f32 = 5.0;
/// Multiplier applied per scroll/zoom step.
pub const ZOOM_STEP: f32 = 1.1;

/// Zoom and pan state for the editor preview.
///
/// Purely a presentation concern: exported pixels never see this transform.
/// `pan` is the top-left corner of the displayed image in container
/// coordinates; `base` is the fit-to-container display size at scale 1.
#[derive(Debug, Clone)]
pub struct ViewportTransform {
    scale: f32,
    pan: (f32, f32),
    container: (f32, f32),
    base: (f32, f32),
    image: (f32, f32),
}

impl ViewportTransform {
    pub fn new() -> Self {
        Self {
            scale: MIN_SCALE,
            pan: (0.0, 0.0),
            container: (0.0, 0.0),
            base: (0.0, 0.0),
            image: (0.0, 0.0),
        }
    }

    /// Updates container and native image dimensions, recomputing the
    /// fit-to-container base size. Pan is re-clamped against the new bounds.
    pub fn set_layout(
        &mut self,
        container_w: f32,
        container_h: f32,
        image_w: f32,
        image_h: f32,
    ) {
        let first_layout = self.base == (0.0, 0.0);
        self.container = (container_w, container_h);
        self.image = (image_w, image_h);
        if image_w > 0.0 && image_h > 0.0 && container_w > 0.0 && container_h > 0.0 {
            let fit = (container_w / image_w).min(container_h / image_h);
            self.base = (image_w * fit, image_h * fit);
        } else {
            self.base = (0.0, 0.0);
        }
        if first_layout {
            self.reset();
        } else {
            self.clamp_pan();
        }
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn pan(&self) -> (f32, f32) {
        self.pan
    }

    /// Displayed image size at the current scale.
    pub fn display_size(&self) -> (f32, f32) {
        (self.base.0 * self.scale, self.base.1 * self.scale)
    }

    /// Scale 1, image centered in the container.
    pub fn reset(&mut self) {
        self.scale = MIN_SCALE;
        self.pan = (
            (self.container.0 - self.base.0) / 2.0,
            (self.container.1 - self.base.1) / 2.0,
        );
        self.clamp_pan();
    }

    /// One zoom step toward (`zoom_in`) or away from the pivot, which stays
    /// fixed over the same image pixel.
    pub fn zoom_at(&mut self, pivot: (f32, f32), zoom_in: bool) {
        let factor = if zoom_in { ZOOM_STEP } else { 1.0 / ZOOM_STEP };
        self.scale_about(self.scale * factor, pivot);
    }

    /// Two-finger zoom: `ratio` of current to previous inter-finger
    /// distance, pivoting on the touch midpoint.
    pub fn pinch(&mut self, ratio: f32, midpoint: (f32, f32)) {
        if ratio.is_finite() && ratio > 0.0 {
            self.scale_about(self.scale * ratio, midpoint);
        }
    }

    pub fn pan_by(&mut self, dx: f32, dy: f32) {
        self.pan.0 += dx;
        self.pan.1 += dy;
        self.clamp_pan();
    }

    /// Container-space point to native image pixel coordinates.
    pub fn screen_to_image(&self, point: (f32, f32)) -> (f32, f32) {
        let (dw, dh) = self.display_size();
        if dw <= 0.0 || dh <= 0.0 {
            return (0.0, 0.0);
        }
        (
            (point.0 - self.pan.0) * self.image.0 / dw,
            (point.1 - self.pan.1) * self.image.1 / dh,
        )
    }

    /// Native image pixel coordinates to container space.
    pub fn image_to_screen(&self, point: (f32, f32)) -> (f32, f32) {
        let (dw, dh) = self.display_size();
        if self.image.0 <= 0.0 || self.image.1 <= 0.0 {
            return (0.0, 0.0);
        }
        (
            point.0 * dw / self.image.0 + self.pan.0,
            point.1 * dh / self.image.1 + self.pan.1,
        )
    }

    /// Native image pixels covered by one container pixel; used to keep the
    /// painted brush width constant in image space across zoom levels.
    pub fn image_pixels_per_screen_pixel(&self) -> f32 {
        let (dw, _) = self.display_size();
        if dw <= 0.0 {
            return 1.0;
        }
        self.image.0 / dw
    }

    fn scale_about(&mut self, new_scale: f32, pivot: (f32, f32)) {
        let new_scale = new_scale.clamp(MIN_SCALE, MAX_SCALE);
        let ratio = new_scale / self.scale;
        // Keep the image pixel under the pivot stationary.
        self.pan.0 = pivot.0 - (pivot.0 - self.pan.0) * ratio;
        self.pan.1 = pivot.1 - (pivot.1 - self.pan.1) * ratio;
        self.scale = new_scale;
        self.clamp_pan();
    }

    /// Per-axis clamp: the displayed image rectangle must always overlap
    /// the container rectangle.
    fn clamp_pan(&mut self) {
        let (dw, dh) = self.display_size();
        let lo_x = (self.container.0 - dw).min(0.0);
        let hi_x = (self.container.0 - dw).max(0.0);
        let lo_y = (self.container.1 - dh).min(0.0);
        let hi_y = (self.container.1 - dh).max(0.0);
        self.pan.0 = self.pan.0.clamp(lo_x, hi_x);
        self.pan.1 = self.pan.1.clamp(lo_y, hi_y);
    }
}

impl Default for ViewportTransform {
    fn default() -> Self {
        Self::new()
    }
}
