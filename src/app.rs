use std::sync::Arc;
use std::sync::mpsc;

use crate::config::AppConfig;
use crate::editor_ui::EditorModal;
use crate::generate::{GenerationBackend, HttpBackend, SlotOutcome, spawn_batch};
use crate::session::UploadedImage;
use crate::store::{GenerationRecord, Store};

/// Variation counts offered per generate action.
const VARIATION_CHOICES: [usize; 3] = [1, 2, 4];

enum Slot {
    Pending,
    Done {
        image: Arc<UploadedImage>,
        texture: egui::TextureHandle,
    },
    Failed(String),
}

impl Slot {
    fn settled(&self) -> bool {
        !matches!(self, Slot::Pending)
    }
}

pub struct ImageSparkApp {
    config: AppConfig,
    store: Store,
    backend: Option<Arc<dyn GenerationBackend>>,
    login_input: String,
    prompt: String,
    variations: usize,
    source: Option<Arc<UploadedImage>>,
    source_tex: Option<egui::TextureHandle>,
    style: Option<Arc<UploadedImage>>,
    slots: Vec<Slot>,
    batch_rx: Option<mpsc::Receiver<SlotOutcome>>,
    editor: Option<EditorModal>,
    notice: String,
}

impl ImageSparkApp {
    pub fn new(cc: &eframe::CreationContext<'_>, config: AppConfig) -> Self {
        apply_theme(&cc.egui_ctx, config.dark_mode());
        let (endpoint, api_key) = config.backend_settings();
        let backend = match HttpBackend::new(endpoint, api_key) {
            Ok(backend) => Some(Arc::new(backend) as Arc<dyn GenerationBackend>),
            Err(err) => {
                tracing::error!(%err, "failed to construct generation backend");
                None
            }
        };
        Self {
            login_input: config.username.clone().unwrap_or_default(),
            config,
            store: Store::open(),
            backend,
            prompt: String::new(),
            variations: 2,
            source: None,
            source_tex: None,
            style: None,
            slots: Vec::new(),
            batch_rx: None,
            editor: None,
            notice: String::new(),
        }
    }

    fn username(&self) -> Option<&str> {
        self.config.username.as_deref().filter(|u| !u.is_empty())
    }

    fn pick_image(&mut self, ctx: &egui::Context, as_style: bool) {
        let Some(path) = rfd::FileDialog::new()
            .add_filter("Images", &["png", "jpg", "jpeg", "webp", "bmp", "gif"])
            .pick_file()
        else {
            return;
        };
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) => {
                self.notice = format!("Could not read file: {err}");
                return;
            }
        };
        // Invalid input leaves the current document untouched.
        match UploadedImage::from_bytes(bytes) {
            Ok(image) => {
                let image = Arc::new(image);
                if as_style {
                    self.style = Some(image);
                } else {
                    self.source_tex = Some(upload_texture(ctx, "source_preview", &image));
                    self.source = Some(image);
                }
                self.notice.clear();
            }
            Err(err) => self.notice = err.to_string(),
        }
    }

    fn start_generation(&mut self, ctx: &egui::Context) {
        let Some(user) = self.username().map(str::to_string) else {
            self.notice = "Log in first".to_string();
            return;
        };
        let Some(source) = self.source.clone() else {
            self.notice = "Upload an image first".to_string();
            return;
        };
        let Some(backend) = self.backend.clone() else {
            self.notice = "Generation backend unavailable".to_string();
            return;
        };
        if self.batch_rx.is_some() {
            return;
        }
        // Quota gate: checked before any request goes out.
        if self.store.remaining(&user) == 0 {
            self.notice = "Daily generation quota exhausted".to_string();
            return;
        }

        // One charge per batch, regardless of per-slot outcomes.
        self.store.record_use(&user);
        self.store.push_history(
            &user,
            GenerationRecord {
                prompt: self.prompt.clone(),
                created_at: chrono::Local::now().to_rfc3339(),
                variations: self.variations as u32,
            },
        );

        self.slots = (0..self.variations).map(|_| Slot::Pending).collect();
        let ctx2 = ctx.clone();
        self.batch_rx = Some(spawn_batch(
            backend,
            source,
            self.style.clone(),
            self.prompt.clone(),
            self.variations,
            move || ctx2.request_repaint(),
        ));
        self.notice.clear();
    }

    fn poll_batch(&mut self, ctx: &egui::Context) {
        let Some(rx) = self.batch_rx.take() else {
            return;
        };
        while let Ok(outcome) = rx.try_recv() {
            let Some(slot) = self.slots.get_mut(outcome.slot) else {
                continue;
            };
            *slot = match outcome.result {
                Ok(image) => {
                    let image = Arc::new(image);
                    let name = format!("result_{}", outcome.slot);
                    Slot::Done {
                        texture: upload_texture(ctx, &name, &image),
                        image,
                    }
                }
                Err(err) => Slot::Failed(err.to_string()),
            };
        }
        if !self.slots.iter().all(Slot::settled) {
            self.batch_rx = Some(rx);
        }
    }

    fn show_login(&mut self, ctx: &egui::Context) {
        egui::Window::new("Welcome to ImageSpark")
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                ui.label("Pick a username to continue");
                let field = ui.text_edit_singleline(&mut self.login_input);
                let submitted =
                    field.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
                if (ui.button("Continue").clicked() || submitted)
                    && !self.login_input.trim().is_empty()
                {
                    self.config.username = Some(self.login_input.trim().to_string());
                    self.config.save();
                }
            });
    }

    fn show_compose_panel(&mut self, ctx: &egui::Context) {
        egui::SidePanel::left("compose_panel")
            .min_width(280.0)
            .show(ctx, |ui| {
                ui.add_space(6.0);
                ui.label(egui::RichText::new("Source").strong());
                if ui.button("📁 Upload image").clicked() {
                    self.pick_image(ctx, false);
                }
                if let Some(ref tex) = self.source_tex {
                    let size = tex.size_vec2();
                    let scale = (ui.available_width() / size.x).min(180.0 / size.y);
                    ui.image((tex.id(), size * scale));
                }
                ui.horizontal(|ui| {
                    if ui.small_button("Style image…").clicked() {
                        self.pick_image(ctx, true);
                    }
                    if self.style.is_some() {
                        ui.weak("set");
                        if ui.small_button("✕").clicked() {
                            self.style = None;
                        }
                    }
                });

                ui.add_space(8.0);
                ui.label(egui::RichText::new("Prompt").strong());
                ui.add(
                    egui::TextEdit::multiline(&mut self.prompt)
                        .desired_rows(3)
                        .desired_width(ui.available_width()),
                );

                ui.horizontal(|ui| {
                    ui.label("Variations");
                    for count in VARIATION_CHOICES {
                        ui.selectable_value(&mut self.variations, count, count.to_string());
                    }
                });

                ui.add_space(8.0);
                let busy = self.batch_rx.is_some();
                let label = if busy { "Generating…" } else { "✨ Generate" };
                if ui
                    .add_enabled(!busy, egui::Button::new(label))
                    .clicked()
                {
                    self.start_generation(ctx);
                }
                if let Some(user) = self.username() {
                    ui.weak(format!(
                        "{} generation(s) left today",
                        self.store.remaining(user)
                    ));
                }

                if !self.notice.is_empty() {
                    ui.add_space(6.0);
                    ui.colored_label(egui::Color32::LIGHT_RED, &self.notice);
                }

                ui.add_space(10.0);
                ui.separator();
                ui.label(egui::RichText::new("Recent").strong());
                if let Some(user) = self.username().map(str::to_string) {
                    egui::ScrollArea::vertical()
                        .id_salt("recent_scroll")
                        .auto_shrink([false, true])
                        .show(ui, |ui| {
                            for record in self.store.recent(&user) {
                                ui.horizontal(|ui| {
                                    ui.weak(format!("×{}", record.variations));
                                    ui.label(truncate(&record.prompt, 42));
                                });
                            }
                        });
                }
            });
    }

    fn show_results(&mut self, ctx: &egui::Context) {
        let mut open_editor: Option<Arc<UploadedImage>> = None;
        let mut use_as_input: Option<Arc<UploadedImage>> = None;

        egui::CentralPanel::default().show(ctx, |ui| {
            if self.slots.is_empty() {
                ui.centered_and_justified(|ui| {
                    ui.weak("Upload an image and describe the edit you want");
                });
                return;
            }
            egui::ScrollArea::vertical()
                .id_salt("results_scroll")
                .show(ui, |ui| {
                    ui.horizontal_wrapped(|ui| {
                        for slot in &self.slots {
                            ui.group(|ui| {
                                ui.set_width(260.0);
                                match slot {
                                    Slot::Pending => {
                                        ui.add_sized([260.0, 200.0], egui::Spinner::new());
                                    }
                                    Slot::Failed(message) => {
                                        ui.add_sized(
                                            [260.0, 200.0],
                                            egui::Label::new(
                                                egui::RichText::new(format!("⚠ {message}"))
                                                    .color(egui::Color32::LIGHT_RED),
                                            ),
                                        );
                                    }
                                    Slot::Done { image, texture } => {
                                        let size = texture.size_vec2();
                                        let scale = (260.0 / size.x).min(200.0 / size.y);
                                        ui.vertical(|ui| {
                                            ui.image((texture.id(), size * scale));
                                            ui.horizontal(|ui| {
                                                if ui.small_button("Edit").clicked() {
                                                    open_editor = Some(Arc::clone(image));
                                                }
                                                if ui.small_button("Use as input").clicked() {
                                                    use_as_input = Some(Arc::clone(image));
                                                }
                                            });
                                        });
                                    }
                                }
                            });
                        }
                    });
                });
        });

        if let Some(image) = open_editor {
            self.editor = Some(EditorModal::new((*image).clone()));
        }
        if let Some(image) = use_as_input {
            self.source_tex = Some(upload_texture(ctx, "source_preview", &image));
            self.source = Some(image);
        }
    }
}

impl eframe::App for ImageSparkApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if let Some(rect) = ctx.input(|i| i.viewport().inner_rect) {
            self.config.window_width = Some(rect.width());
            self.config.window_height = Some(rect.height());
        }

        self.poll_batch(ctx);

        egui::TopBottomPanel::top("main_menu").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.label(egui::RichText::new("ImageSpark").strong());
                ui.separator();
                if let Some(user) = self.username().map(str::to_string) {
                    ui.weak(user);
                }
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    let label = if self.config.dark_mode() { "☀" } else { "🌙" };
                    if ui.button(label).clicked() {
                        let dark = !self.config.dark_mode();
                        self.config.theme =
                            Some(if dark { "dark" } else { "light" }.to_string());
                        apply_theme(ctx, dark);
                        self.config.save();
                    }
                });
            });
        });

        if self.username().is_none() {
            egui::CentralPanel::default().show(ctx, |_ui| {});
            self.show_login(ctx);
            return;
        }

        self.show_compose_panel(ctx);
        self.show_results(ctx);

        // Only one editor session is open at a time.
        if let Some(mut editor) = self.editor.take() {
            if editor.show(ctx) {
                self.editor = Some(editor);
            }
        }
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        self.config.save();
    }
}

fn apply_theme(ctx: &egui::Context, dark: bool) {
    ctx.set_visuals(if dark {
        egui::Visuals::dark()
    } else {
        egui::Visuals::light()
    });
}

fn upload_texture(
    ctx: &egui::Context,
    name: &str,
    image: &UploadedImage,
) -> egui::TextureHandle {
    let rgba = image.image().to_rgba8();
    let size = [rgba.width() as usize, rgba.height() as usize];
    let color = egui::ColorImage::from_rgba_unmultiplied(size, rgba.as_raw());
    ctx.load_texture(name, color, egui::TextureOptions::LINEAR)
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    format!("{cut}…")
}

#[cfg(test)]
mod tests {
    use super::truncate;

    #[test]
    fn truncate_keeps_short_prompts_intact() {
        assert_eq!(truncate("sunset", 10), "sunset");
    }

    #[test]
    fn truncate_appends_an_ellipsis() {
        let out = truncate("a very long prompt about mountains", 10);
        assert_eq!(out.chars().count(), 10);
        assert!(out.ends_with('…'));
    }
}
