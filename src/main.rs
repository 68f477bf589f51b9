mod app;
mod compositor;
mod config;
mod editor_ui;
mod error;
mod filter_chain;
mod generate;
mod history;
mod mask;
mod session;
mod store;
mod viewport;

use app::ImageSparkApp;
use config::AppConfig;

fn main() -> eframe::Result {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = AppConfig::load();
    let width = config.window_width.unwrap_or(1200.0);
    let height = config.window_height.unwrap_or(800.0);

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("ImageSpark")
            .with_app_id("imagespark")
            .with_inner_size([width, height]),
        ..Default::default()
    };

    eframe::run_native(
        "imagespark",
        native_options,
        Box::new(|cc| Ok(Box::new(ImageSparkApp::new(cc, config)))),
    )
}
