use chrono::NaiveDate;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, RgbaImage};
use rayon::prelude::*;

use crate::filter_chain::{Adjustment, FilterChain, Preset};
use crate::mask::MaskLayer;

/// JPEG export quality, matching the preview's ~0.9 encoder setting.
const JPEG_QUALITY: u8 = 90;

// Rec. 709 luma weights, as used by the CSS filter-effects matrices.
const LUMA_R: f32 = 0.2126;
const LUMA_G: f32 = 0.7152;
const LUMA_B: f32 = 0.0722;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ExportFormat {
    Png,
    Jpeg,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Png => "png",
            ExportFormat::Jpeg => "jpg",
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            ExportFormat::Png => "image/png",
            ExportFormat::Jpeg => "image/jpeg",
        }
    }
}

/// A finished export: encoded bytes plus the dated download filename.
pub struct ExportArtifact {
    pub filename: String,
    pub mime: &'static str,
    pub bytes: Vec<u8>,
}

/// Renders the final raster at the image's native resolution.
///
/// The viewport transform is deliberately absent here: exports always
/// operate on the untransformed image. With a painted mask the filtered
/// raster is blended over the unfiltered base using the mask value as
/// per-pixel alpha; without one it replaces the base outright.
pub fn render(
    original: &DynamicImage,
    chain: &FilterChain,
    mask: Option<&MaskLayer>,
) -> RgbaImage {
    let base = original.to_rgba8();
    if chain.is_empty() {
        return base;
    }

    let filtered = apply_chain(base.clone(), chain);
    match mask {
        Some(mask) if mask.has_paint() => composite_masked(base, filtered, mask),
        _ => filtered,
    }
}

/// Renders and encodes a downloadable artifact. Pure read of the inputs.
pub fn export(
    original: &DynamicImage,
    chain: &FilterChain,
    mask: Option<&MaskLayer>,
    format: ExportFormat,
) -> anyhow::Result<ExportArtifact> {
    let raster = render(original, chain, mask);
    let mut bytes = Vec::new();
    let writer = std::io::Cursor::new(&mut bytes);
    match format {
        ExportFormat::Png => {
            let encoder = PngEncoder::new(writer);
            DynamicImage::ImageRgba8(raster).write_with_encoder(encoder)?;
        }
        ExportFormat::Jpeg => {
            let encoder = JpegEncoder::new_with_quality(writer, JPEG_QUALITY);
            // JPEG has no alpha channel.
            DynamicImage::ImageRgba8(raster)
                .to_rgb8()
                .write_with_encoder(encoder)?;
        }
    }
    Ok(ExportArtifact {
        filename: export_filename(chrono::Local::now().date_naive(), format),
        mime: format.mime(),
        bytes,
    })
}

/// `ImageSpark_YY-MM-DD.<ext>`; same-day exports collide by design and the
/// destination's last write wins.
pub fn export_filename(date: NaiveDate, format: ExportFormat) -> String {
    format!(
        "ImageSpark_{}.{}",
        date.format("%y-%m-%d"),
        format.extension()
    )
}

/// Applies the chain's filter functions per pixel with CSS filter-effects
/// semantics: sliders first, then the preset's color transform, then any
/// preset blur.
fn apply_chain(mut rgba: RgbaImage, chain: &FilterChain) -> RgbaImage {
    let brightness = chain.value(Adjustment::Brightness);
    let contrast = chain.value(Adjustment::Contrast);
    let saturate = chain.value(Adjustment::Saturate);
    let preset = chain.preset();

    rgba.par_chunks_exact_mut(4).for_each(|px| {
        let mut r = px[0] as f32 / 255.0;
        let mut g = px[1] as f32 / 255.0;
        let mut b = px[2] as f32 / 255.0;

        r *= brightness;
        g *= brightness;
        b *= brightness;

        r = (r - 0.5) * contrast + 0.5;
        g = (g - 0.5) * contrast + 0.5;
        b = (b - 0.5) * contrast + 0.5;

        let luma = LUMA_R * r + LUMA_G * g + LUMA_B * b;
        r = luma + (r - luma) * saturate;
        g = luma + (g - luma) * saturate;
        b = luma + (b - luma) * saturate;

        match preset {
            Some(Preset::Grayscale) => {
                let luma = LUMA_R * r + LUMA_G * g + LUMA_B * b;
                r = luma;
                g = luma;
                b = luma;
            }
            Some(Preset::Sepia) => (r, g, b) = sepia(r, g, b, 0.8),
            Some(Preset::Invert) => {
                r = 1.0 - r;
                g = 1.0 - g;
                b = 1.0 - b;
            }
            Some(Preset::Pop) => (r, g, b) = hue_rotate(r, g, b, 180.0),
            Some(Preset::Soften) | None => {}
        }

        px[0] = (r.clamp(0.0, 1.0) * 255.0).round() as u8;
        px[1] = (g.clamp(0.0, 1.0) * 255.0).round() as u8;
        px[2] = (b.clamp(0.0, 1.0) * 255.0).round() as u8;
    });

    if chain.preset() == Some(Preset::Soften) {
        rgba = image::imageops::blur(&rgba, 2.0);
    }
    rgba
}

fn sepia(r: f32, g: f32, b: f32, amount: f32) -> (f32, f32, f32) {
    let sr = 0.393 * r + 0.769 * g + 0.189 * b;
    let sg = 0.349 * r + 0.686 * g + 0.168 * b;
    let sb = 0.272 * r + 0.534 * g + 0.131 * b;
    (
        r + (sr - r) * amount,
        g + (sg - g) * amount,
        b + (sb - b) * amount,
    )
}

fn hue_rotate(r: f32, g: f32, b: f32, degrees: f32) -> (f32, f32, f32) {
    let (sin, cos) = degrees.to_radians().sin_cos();
    (
        (LUMA_R + cos * (1.0 - LUMA_R) - sin * LUMA_R) * r
            + (LUMA_G - cos * LUMA_G - sin * LUMA_G) * g
            + (LUMA_B - cos * LUMA_B + sin * (1.0 - LUMA_B)) * b,
        (LUMA_R - cos * LUMA_R + sin * 0.143) * r
            + (LUMA_G + cos * (1.0 - LUMA_G) + sin * 0.140) * g
            + (LUMA_B - cos * LUMA_B - sin * 0.283) * b,
        (LUMA_R - cos * LUMA_R - sin * (1.0 - LUMA_R)) * r
            + (LUMA_G - cos * LUMA_G + sin * LUMA_G) * g
            + (LUMA_B + cos * (1.0 - LUMA_B) + sin * LUMA_B) * b,
    )
}

fn composite_masked(base: RgbaImage, filtered: RgbaImage, mask: &MaskLayer) -> RgbaImage {
    let width = base.width();
    let mut out = base;
    out.par_chunks_exact_mut(4)
        .zip(filtered.par_chunks_exact(4))
        .enumerate()
        .for_each(|(i, (dst, src))| {
            let x = (i as u32) % width;
            let y = (i as u32) / width;
            let alpha = mask.value_at(x, y) as f32 / 255.0;
            if alpha <= 0.0 {
                return;
            }
            for c in 0..3 {
                let b = dst[c] as f32;
                let f = src[c] as f32;
                dst[c] = (b + (f - b) * alpha).round() as u8;
            }
        });
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgba};

    fn flat(width: u32, height: u32, rgb: [u8; 3]) -> DynamicImage {
        DynamicImage::ImageRgba8(ImageBuffer::from_pixel(
            width,
            height,
            Rgba([rgb[0], rgb[1], rgb[2], 255]),
        ))
    }

    #[test]
    fn empty_chain_renders_the_original_untouched() {
        let img = flat(8, 8, [10, 120, 240]);
        let out = render(&img, &FilterChain::new(), None);
        assert_eq!(out.get_pixel(3, 3).0, [10, 120, 240, 255]);
    }

    #[test]
    fn brightness_scales_channels() {
        let img = flat(4, 4, [100, 100, 100]);
        let mut chain = FilterChain::new();
        chain.apply_adjustment(Adjustment::Brightness, 1.5);
        let out = render(&img, &chain, None);
        assert_eq!(out.get_pixel(0, 0)[0], 150);
    }

    #[test]
    fn saturate_zero_desaturates_to_luma() {
        let img = flat(2, 2, [255, 0, 0]);
        let mut chain = FilterChain::new();
        chain.apply_adjustment(Adjustment::Saturate, 0.0);
        let out = render(&img, &chain, None);
        let px = out.get_pixel(0, 0);
        assert_eq!(px[0], px[1]);
        assert_eq!(px[1], px[2]);
    }

    #[test]
    fn grayscale_preset_equalizes_channels() {
        let img = flat(2, 2, [200, 40, 90]);
        let mut chain = FilterChain::new();
        chain.toggle(Preset::Grayscale);
        let out = render(&img, &chain, None);
        let px = out.get_pixel(1, 1);
        assert_eq!(px[0], px[1]);
        assert_eq!(px[1], px[2]);
    }

    #[test]
    fn invert_preset_flips_channels() {
        let img = flat(2, 2, [0, 255, 100]);
        let mut chain = FilterChain::new();
        chain.toggle(Preset::Invert);
        let out = render(&img, &chain, None);
        assert_eq!(out.get_pixel(0, 0).0, [255, 0, 155, 255]);
    }

    #[test]
    fn mask_restricts_the_filtered_region() {
        let img = flat(40, 40, [100, 100, 100]);
        let mut chain = FilterChain::new();
        chain.apply_adjustment(Adjustment::Brightness, 2.0);

        let mut mask = MaskLayer::new(40, 40);
        mask.set_brush_radius(4.0);
        mask.begin_stroke((10.0, 10.0));
        mask.end_stroke();

        let out = render(&img, &chain, Some(&mask));
        // Painted area shows the filtered pixels, unpainted keeps the base.
        assert_eq!(out.get_pixel(10, 10)[0], 200);
        assert_eq!(out.get_pixel(35, 35)[0], 100);
    }

    #[test]
    fn blank_mask_means_full_filter_replacement() {
        let img = flat(8, 8, [100, 100, 100]);
        let mut chain = FilterChain::new();
        chain.apply_adjustment(Adjustment::Brightness, 2.0);
        let mask = MaskLayer::new(8, 8);
        let out = render(&img, &chain, Some(&mask));
        assert_eq!(out.get_pixel(7, 7)[0], 200);
    }

    #[test]
    fn export_is_native_resolution_png() {
        let img = flat(400, 300, [100, 100, 100]);
        let mut chain = FilterChain::new();
        chain.apply_adjustment(Adjustment::Brightness, 1.2);

        let artifact = export(&img, &chain, None, ExportFormat::Png).unwrap();
        assert!(artifact.filename.starts_with("ImageSpark_"));
        assert!(artifact.filename.ends_with(".png"));
        assert_eq!(artifact.mime, "image/png");

        let decoded = image::load_from_memory(&artifact.bytes).unwrap();
        assert_eq!(decoded.width(), 400);
        assert_eq!(decoded.height(), 300);
        // PNG round-trip is lossless, so the brightened value is exact.
        assert_eq!(decoded.to_rgba8().get_pixel(200, 150)[0], 120);
    }

    #[test]
    fn export_filename_uses_the_dated_pattern() {
        let date = NaiveDate::from_ymd_opt(2026, 8, 29).unwrap();
        assert_eq!(
            export_filename(date, ExportFormat::Png),
            "ImageSpark_26-08-29.png"
        );
        assert_eq!(
            export_filename(date, ExportFormat::Jpeg),
            "ImageSpark_26-08-29.jpg"
        );
    }

    #[test]
    fn jpeg_export_decodes_at_native_size() {
        let img = flat(64, 48, [30, 60, 90]);
        let artifact = export(&img, &FilterChain::new(), None, ExportFormat::Jpeg).unwrap();
        let decoded = image::load_from_memory(&artifact.bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 48));
    }
}
