use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use image::DynamicImage;

use crate::compositor::{self, ExportArtifact, ExportFormat};
use crate::error::{StudioError, StudioResult};
use crate::filter_chain::{Adjustment, FilterChain, Preset};
use crate::history::EditHistory;
use crate::mask::MaskLayer;
use crate::viewport::ViewportTransform;

/// Default on-screen brush diameter for mask painting.
const DEFAULT_BRUSH_SCREEN_PX: f32 = 48.0;

/// An image owned by the active session: the encoded payload plus its
/// decoded raster. Replaced wholesale on upload or when a generation
/// result is promoted to the new input.
#[derive(Clone)]
pub struct UploadedImage {
    bytes: Vec<u8>,
    mime: String,
    image: DynamicImage,
}

impl UploadedImage {
    /// Validates and decodes picked/received bytes. A non-image payload is
    /// rejected without leaving any partial state behind.
    pub fn from_bytes(bytes: Vec<u8>) -> StudioResult<Self> {
        let format = image::guess_format(&bytes)
            .map_err(|_| StudioError::invalid_input("unrecognized image format"))?;
        let image = image::load_from_memory(&bytes)
            .map_err(|err| StudioError::invalid_input(format!("corrupt image: {err}")))?;
        Ok(Self {
            bytes,
            mime: format.to_mime_type().to_string(),
            image,
        })
    }

    /// Wraps an in-memory raster (toolkit effects, mask exports) by
    /// encoding it as PNG.
    pub fn from_dynamic(image: DynamicImage) -> StudioResult<Self> {
        let mut bytes = Vec::new();
        image
            .write_to(
                &mut std::io::Cursor::new(&mut bytes),
                image::ImageFormat::Png,
            )
            .map_err(|err| StudioError::Other(err.into()))?;
        Ok(Self {
            bytes,
            mime: "image/png".to_string(),
            image,
        })
    }

    /// Decodes a backend response carried as a base64 payload.
    pub fn from_base64(payload: &str) -> StudioResult<Self> {
        let bytes = B64
            .decode(payload.trim())
            .map_err(|_| StudioError::invalid_input("invalid base64 image payload"))?;
        Self::from_bytes(bytes)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn base64_payload(&self) -> String {
        B64.encode(&self.bytes)
    }

    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime, self.base64_payload())
    }
}

/// One open editing session: the document image plus all mutable editor
/// state, constructed on modal-open and dropped on close. Every invariant
/// (history cursor, preset exclusivity, mask coordinates) is enforced here
/// rather than at UI call sites.
pub struct EditorSession {
    image: UploadedImage,
    chain: FilterChain,
    history: EditHistory,
    mask: MaskLayer,
    viewport: ViewportTransform,
    brush_screen_px: f32,
}

impl EditorSession {
    pub fn open(image: UploadedImage) -> Self {
        let mask = MaskLayer::new(image.width(), image.height());
        Self {
            image,
            chain: FilterChain::new(),
            history: EditHistory::new(),
            mask,
            viewport: ViewportTransform::new(),
            brush_screen_px: DEFAULT_BRUSH_SCREEN_PX,
        }
    }

    pub fn image(&self) -> &UploadedImage {
        &self.image
    }

    pub fn chain(&self) -> &FilterChain {
        &self.chain
    }

    pub fn descriptor(&self) -> String {
        self.chain.descriptor()
    }

    pub fn history(&self) -> &EditHistory {
        &self.history
    }

    pub fn apply_adjustment(&mut self, adjustment: Adjustment, value: f32) {
        let descriptor = self.chain.apply_adjustment(adjustment, value);
        self.history.record(descriptor);
    }

    pub fn toggle_preset(&mut self, preset: Preset) {
        let descriptor = self.chain.toggle(preset);
        self.history.record(descriptor);
    }

    /// Clears the preset but keeps slider values.
    pub fn reset_filters(&mut self) {
        let descriptor = self.chain.reset();
        self.history.record(descriptor);
    }

    /// Clears filters, mask, and viewport back to the opened state.
    pub fn reset_all(&mut self) {
        let descriptor = self.chain.clear();
        self.history.record(descriptor);
        self.mask.clear();
        self.viewport.reset();
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn undo(&mut self) -> bool {
        let Some(descriptor) = self.history.undo() else {
            return false;
        };
        // Snapshots are our own serializations, so this cannot fail in
        // practice; fall back to an empty chain rather than panic.
        self.chain = FilterChain::parse(descriptor).unwrap_or_default();
        true
    }

    pub fn redo(&mut self) -> bool {
        let Some(descriptor) = self.history.redo() else {
            return false;
        };
        self.chain = FilterChain::parse(descriptor).unwrap_or_default();
        true
    }

    pub fn viewport(&self) -> &ViewportTransform {
        &self.viewport
    }

    pub fn viewport_mut(&mut self) -> &mut ViewportTransform {
        &mut self.viewport
    }

    pub fn set_brush_screen_px(&mut self, px: f32) {
        self.brush_screen_px = px.clamp(4.0, 200.0);
    }

    pub fn brush_screen_px(&self) -> f32 {
        self.brush_screen_px
    }

    pub fn mask(&self) -> &MaskLayer {
        &self.mask
    }

    pub fn has_mask(&self) -> bool {
        self.mask.has_paint()
    }

    /// Starts a mask stroke from a container-space point. The point is
    /// inverted through the viewport so the stroke is stored in native
    /// image coordinates, and the brush radius is converted so its painted
    /// width is independent of the current zoom.
    pub fn begin_mask_stroke(&mut self, screen: (f32, f32)) {
        self.sync_brush_radius();
        let point = self.viewport.screen_to_image(screen);
        self.mask.begin_stroke(point);
    }

    pub fn extend_mask_stroke(&mut self, screen: (f32, f32)) {
        let point = self.viewport.screen_to_image(screen);
        self.mask.extend_stroke(point);
    }

    pub fn end_mask_stroke(&mut self) {
        self.mask.end_stroke();
    }

    pub fn clear_mask(&mut self) {
        self.mask.clear();
    }

    /// Full-quality render of the current state at native resolution.
    pub fn render(&self) -> image::RgbaImage {
        compositor::render(self.image.image(), &self.chain, self.active_mask())
    }

    /// Encodes a downloadable artifact; never mutates session state.
    pub fn export(&self, format: ExportFormat) -> anyhow::Result<ExportArtifact> {
        compositor::export(self.image.image(), &self.chain, self.active_mask(), format)
    }

    fn active_mask(&self) -> Option<&MaskLayer> {
        self.mask.has_paint().then_some(&self.mask)
    }

    fn sync_brush_radius(&mut self) {
        let radius =
            self.brush_screen_px * 0.5 * self.viewport.image_pixels_per_screen_pixel();
        self.mask.set_brush_radius(radius);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgba};

    fn test_image(width: u32, height: u32) -> UploadedImage {
        let img = DynamicImage::ImageRgba8(ImageBuffer::from_pixel(
            width,
            height,
            Rgba([100, 100, 100, 255]),
        ));
        UploadedImage::from_dynamic(img).unwrap()
    }

    #[test]
    fn rejects_non_image_uploads_without_partial_state() {
        let err = UploadedImage::from_bytes(b"definitely not an image".to_vec());
        assert!(matches!(err, Err(StudioError::InvalidInput(_))));
    }

    #[test]
    fn data_url_embeds_mime_and_base64() {
        let img = test_image(2, 2);
        let url = img.data_url();
        assert!(url.starts_with("data:image/png;base64,"));
        let payload = url.split(',').nth(1).unwrap();
        let round = UploadedImage::from_base64(payload).unwrap();
        assert_eq!((round.width(), round.height()), (2, 2));
    }

    #[test]
    fn adjustments_record_history_snapshots() {
        let mut session = EditorSession::open(test_image(4, 4));
        session.apply_adjustment(Adjustment::Brightness, 1.2);
        session.toggle_preset(Preset::Sepia);
        assert_eq!(session.history().len(), 3);
        assert_eq!(session.descriptor(), "brightness(1.20) sepia(0.8)");
    }

    #[test]
    fn undo_restores_the_previous_chain_state() {
        let mut session = EditorSession::open(test_image(4, 4));
        session.apply_adjustment(Adjustment::Brightness, 1.2);
        session.apply_adjustment(Adjustment::Contrast, 0.9);

        assert!(session.undo());
        assert_eq!(session.descriptor(), "brightness(1.20)");
        assert_eq!(session.chain().value(Adjustment::Contrast), 1.0);

        assert!(session.redo());
        assert_eq!(session.descriptor(), "brightness(1.20) contrast(0.90)");
        assert!(!session.redo());
    }

    #[test]
    fn end_to_end_edit_then_export() {
        // open 400x300 -> brightness -> +contrast -> undo -> export png
        let mut session = EditorSession::open(test_image(400, 300));
        session.apply_adjustment(Adjustment::Brightness, 1.2);
        session.apply_adjustment(Adjustment::Contrast, 0.9);
        session.undo();
        assert_eq!(session.descriptor(), "brightness(1.20)");

        let artifact = session.export(ExportFormat::Png).unwrap();
        let decoded = image::load_from_memory(&artifact.bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (400, 300));
        assert_eq!(decoded.to_rgba8().get_pixel(10, 10)[0], 120);
        assert!(artifact.filename.ends_with(".png"));
    }

    #[test]
    fn export_ignores_viewport_zoom() {
        let mut session = EditorSession::open(test_image(200, 100));
        session
            .viewport_mut()
            .set_layout(400.0, 200.0, 200.0, 100.0);
        session.viewport_mut().pinch(3.0, (0.0, 0.0));

        let artifact = session.export(ExportFormat::Png).unwrap();
        let decoded = image::load_from_memory(&artifact.bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (200, 100));
    }

    #[test]
    fn mask_strokes_are_stored_in_image_space() {
        let mut session = EditorSession::open(test_image(200, 100));
        // Container shows the image doubled: 400x200.
        session
            .viewport_mut()
            .set_layout(400.0, 200.0, 200.0, 100.0);
        session.begin_mask_stroke((100.0, 50.0));
        session.end_mask_stroke();

        // Screen (100, 50) is image (50, 25) at the 2x display scale.
        assert_eq!(session.mask().value_at(50, 25), 255);
        assert!(session.has_mask());

        session.clear_mask();
        assert!(!session.has_mask());
    }

    #[test]
    fn reset_all_returns_to_the_opened_state() {
        let mut session = EditorSession::open(test_image(4, 4));
        session.apply_adjustment(Adjustment::Saturate, 1.8);
        session.toggle_preset(Preset::Pop);
        session.begin_mask_stroke((1.0, 1.0));
        session.end_mask_stroke();

        session.reset_all();
        assert_eq!(session.descriptor(), "none");
        assert!(!session.has_mask());
        // reset_all is itself an edit, so it can be undone.
        assert!(session.can_undo());
    }
}
