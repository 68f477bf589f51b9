use std::sync::mpsc;
use std::time::{Duration, Instant};

use crate::compositor::{self, ExportFormat};
use crate::filter_chain::{Adjustment, Preset};
use crate::session::{EditorSession, UploadedImage};

const DEBOUNCE: Duration = Duration::from_millis(150);

enum BgResult {
    Rendered {
        revision: u64,
        data: Vec<u8>,
        width: usize,
        height: usize,
    },
}

/// What the pointer does on the canvas.
#[derive(Clone, Copy, PartialEq, Eq)]
enum PointerMode {
    View,
    Paint,
}

/// The editing modal: owns one [`EditorSession`] for the lifetime of the
/// window and re-renders the composited preview on a debounced background
/// thread whenever the session changes.
pub struct EditorModal {
    session: EditorSession,
    mode: PointerMode,
    texture: Option<egui::TextureHandle>,
    /// Render needed but not yet kicked off.
    needs_render: bool,
    /// Set while a slider is moving; cleared once debounce elapses.
    last_change: Option<Instant>,
    rendering: bool,
    /// Bumped on every edit so stale background renders are dropped.
    revision: u64,
    /// A single-pointer drag (pan or paint) is in progress.
    dragging: bool,
    /// A two-finger pinch is in progress; entering it cancels the drag.
    pinching: bool,
    status: String,
    tx: mpsc::SyncSender<BgResult>,
    rx: mpsc::Receiver<BgResult>,
}

impl EditorModal {
    pub fn new(image: UploadedImage) -> Self {
        let (tx, rx) = mpsc::sync_channel(4);
        Self {
            session: EditorSession::open(image),
            mode: PointerMode::View,
            texture: None,
            needs_render: true,
            last_change: None,
            rendering: false,
            revision: 0,
            dragging: false,
            pinching: false,
            status: String::new(),
            tx,
            rx,
        }
    }

    /// Current document, for "use as new input" on close.
    pub fn image(&self) -> &UploadedImage {
        self.session.image()
    }

    fn mark_edited(&mut self, debounced: bool) {
        self.revision += 1;
        self.needs_render = true;
        self.last_change = debounced.then(Instant::now);
    }

    fn trigger_render(&mut self, ctx: &egui::Context) {
        if self.rendering {
            return;
        }
        self.rendering = true;
        self.needs_render = false;
        self.last_change = None;

        let revision = self.revision;
        let image = self.session.image().image().clone();
        let chain = self.session.chain().clone();
        let mask = self.session.has_mask().then(|| self.session.mask().clone());
        let tx = self.tx.clone();
        let ctx2 = ctx.clone();
        std::thread::spawn(move || {
            let rgba = compositor::render(&image, &chain, mask.as_ref());
            let width = rgba.width() as usize;
            let height = rgba.height() as usize;
            let _ = tx.send(BgResult::Rendered {
                revision,
                data: rgba.into_raw(),
                width,
                height,
            });
            ctx2.request_repaint();
        });
    }

    fn drain(&mut self, ctx: &egui::Context) {
        while let Ok(msg) = self.rx.try_recv() {
            match msg {
                BgResult::Rendered {
                    revision,
                    data,
                    width,
                    height,
                } => {
                    self.rendering = false;
                    if revision != self.revision {
                        // Superseded by a newer edit.
                        self.needs_render = true;
                        continue;
                    }
                    let img = egui::ColorImage::from_rgba_unmultiplied([width, height], &data);
                    self.texture =
                        Some(ctx.load_texture("editor_preview", img, egui::TextureOptions::LINEAR));
                }
            }
        }
    }

    /// Shows the modal window; returns `false` once it has been closed.
    pub fn show(&mut self, ctx: &egui::Context) -> bool {
        self.drain(ctx);

        if self.needs_render && !self.rendering {
            let debounce_done = self
                .last_change
                .map(|t| t.elapsed() >= DEBOUNCE)
                .unwrap_or(true);
            if debounce_done {
                self.trigger_render(ctx);
            } else {
                ctx.request_repaint_after(DEBOUNCE);
            }
        }

        let mut open = true;
        egui::Window::new("Edit Image")
            .open(&mut open)
            .default_size([900.0, 620.0])
            .show(ctx, |ui| {
                ui.horizontal_top(|ui| {
                    let canvas_size = egui::vec2(
                        (ui.available_width() - 300.0).max(240.0),
                        ui.available_height().max(240.0),
                    );
                    self.show_canvas(ui, canvas_size);
                    ui.separator();
                    ui.vertical(|ui| self.show_controls(ui));
                });
            });
        open
    }

    fn show_canvas(&mut self, ui: &mut egui::Ui, size: egui::Vec2) {
        let (rect, response) = ui.allocate_exact_size(size, egui::Sense::click_and_drag());
        let image = self.session.image();
        let (img_w, img_h) = (image.width() as f32, image.height() as f32);
        self.session
            .viewport_mut()
            .set_layout(rect.width(), rect.height(), img_w, img_h);

        let painter = ui.painter_at(rect);
        painter.rect_filled(rect, 0.0, egui::Color32::from_gray(24));

        if let Some(ref tex) = self.texture {
            let (pan_x, pan_y) = self.session.viewport().pan();
            let (dw, dh) = self.session.viewport().display_size();
            let image_rect = egui::Rect::from_min_size(
                rect.min + egui::vec2(pan_x, pan_y),
                egui::vec2(dw, dh),
            );
            painter.image(
                tex.id(),
                image_rect,
                egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
                egui::Color32::WHITE,
            );
        } else {
            ui.put(rect, egui::Spinner::new());
        }

        // Two-finger pinch takes priority and cancels any in-progress
        // single-pointer pan or paint stroke.
        let multi_touch = ui.input(|i| i.multi_touch());
        if let Some(touch) = multi_touch {
            if !self.pinching {
                self.pinching = true;
                if self.dragging {
                    self.session.end_mask_stroke();
                    self.dragging = false;
                }
            }
            let midpoint = (touch.start_pos.x - rect.min.x, touch.start_pos.y - rect.min.y);
            if (touch.zoom_delta - 1.0).abs() > f32::EPSILON {
                self.session.viewport_mut().pinch(touch.zoom_delta, midpoint);
            }
        } else {
            if self.pinching {
                // Returning to single-touch: the next drag starts fresh.
                self.pinching = false;
                self.dragging = false;
            }

            if let Some(pos) = response.hover_pos() {
                let pivot = (pos.x - rect.min.x, pos.y - rect.min.y);
                let zoom = ui.input(|i| i.zoom_delta());
                if (zoom - 1.0).abs() > f32::EPSILON {
                    self.session.viewport_mut().pinch(zoom, pivot);
                }
            }

            match self.mode {
                PointerMode::View => {
                    if response.dragged() {
                        let delta = response.drag_delta();
                        self.session.viewport_mut().pan_by(delta.x, delta.y);
                    }
                }
                PointerMode::Paint => {
                    if let Some(pos) = response.interact_pointer_pos() {
                        let point = (pos.x - rect.min.x, pos.y - rect.min.y);
                        if response.drag_started() {
                            self.session.begin_mask_stroke(point);
                            self.dragging = true;
                        } else if response.dragged() && self.dragging {
                            self.session.extend_mask_stroke(point);
                        }
                    }
                    if response.drag_stopped() && self.dragging {
                        self.session.end_mask_stroke();
                        self.dragging = false;
                        self.mark_edited(false);
                    }
                    // Brush outline under the cursor.
                    if let Some(pos) = response.hover_pos() {
                        painter.circle_stroke(
                            pos,
                            self.session.brush_screen_px() * 0.5,
                            egui::Stroke::new(1.0, egui::Color32::WHITE),
                        );
                    }
                }
            }
        }
    }

    fn show_controls(&mut self, ui: &mut egui::Ui) {
        ui.label(egui::RichText::new("Adjustments").strong());
        ui.add_space(4.0);
        for adjustment in Adjustment::ALL {
            let mut value = self.session.chain().value(adjustment);
            ui.horizontal(|ui| {
                ui.label(adjustment.name());
                let resp = ui.add(
                    egui::Slider::new(&mut value, 0.0_f32..=2.0_f32)
                        .fixed_decimals(2)
                        .clamping(egui::SliderClamping::Always),
                );
                if resp.changed() {
                    self.session.apply_adjustment(adjustment, value);
                    self.mark_edited(true);
                }
            });
        }

        ui.add_space(8.0);
        ui.label(egui::RichText::new("Filters").strong());
        ui.add_space(4.0);
        ui.horizontal_wrapped(|ui| {
            for preset in Preset::ALL {
                let active = self.session.chain().preset() == Some(preset);
                if ui.selectable_label(active, preset.label()).clicked() {
                    self.session.toggle_preset(preset);
                    self.mark_edited(false);
                }
            }
        });
        ui.horizontal(|ui| {
            if ui.small_button("Reset filters").clicked() {
                self.session.reset_filters();
                self.mark_edited(false);
            }
            if ui.small_button("Reset all").clicked() {
                self.session.reset_all();
                self.mode = PointerMode::View;
                self.mark_edited(false);
            }
        });

        ui.add_space(8.0);
        ui.horizontal(|ui| {
            if ui
                .add_enabled(self.session.can_undo(), egui::Button::new("⟲ Undo"))
                .clicked()
                && self.session.undo()
            {
                self.mark_edited(false);
            }
            if ui
                .add_enabled(self.session.can_redo(), egui::Button::new("⟳ Redo"))
                .clicked()
                && self.session.redo()
            {
                self.mark_edited(false);
            }
        });

        ui.add_space(8.0);
        ui.separator();
        ui.label(egui::RichText::new("Mask").strong());
        ui.add_space(4.0);
        ui.horizontal(|ui| {
            let painting = self.mode == PointerMode::Paint;
            if ui.selectable_label(painting, "🖌 Paint").clicked() {
                self.mode = if painting {
                    PointerMode::View
                } else {
                    PointerMode::Paint
                };
            }
            if ui
                .add_enabled(self.session.has_mask(), egui::Button::new("Clear"))
                .clicked()
            {
                self.session.clear_mask();
                self.mark_edited(false);
            }
        });
        ui.horizontal(|ui| {
            ui.label("Brush");
            let mut brush = self.session.brush_screen_px();
            let resp = ui.add(
                egui::Slider::new(&mut brush, 4.0_f32..=200.0_f32)
                    .suffix("px")
                    .clamping(egui::SliderClamping::Always),
            );
            if resp.changed() {
                self.session.set_brush_screen_px(brush);
            }
        });

        ui.add_space(8.0);
        ui.separator();
        ui.label(egui::RichText::new("View").strong());
        ui.add_space(4.0);
        ui.horizontal(|ui| {
            ui.label(format!("{:.0}%", self.session.viewport().scale() * 100.0));
            if ui.small_button("Fit").clicked() {
                self.session.viewport_mut().reset();
            }
        });

        ui.add_space(8.0);
        ui.separator();
        ui.label(egui::RichText::new("Export").strong());
        ui.add_space(4.0);
        ui.horizontal(|ui| {
            if ui.button("PNG").clicked() {
                self.export(ExportFormat::Png);
            }
            if ui.button("JPEG").clicked() {
                self.export(ExportFormat::Jpeg);
            }
        });
        if !self.status.is_empty() {
            ui.add_space(4.0);
            ui.label(egui::RichText::new(&self.status).weak());
        }
    }

    fn export(&mut self, format: ExportFormat) {
        let artifact = match self.session.export(format) {
            Ok(artifact) => artifact,
            Err(err) => {
                self.status = format!("Export failed: {err}");
                return;
            }
        };
        let Some(path) = rfd::FileDialog::new()
            .set_file_name(&artifact.filename)
            .save_file()
        else {
            self.status = "Export cancelled".to_string();
            return;
        };
        match std::fs::write(&path, &artifact.bytes) {
            Ok(()) => self.status = format!("Saved {}", path.display()),
            Err(err) => self.status = format!("Export failed: {err}"),
        }
    }
}
