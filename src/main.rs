use std::sync::Arc;

use anyhow::{anyhow, Context};
use clap::Parser;

use attentiontracking::app::AttentionApp;
use attentiontracking::args::Args;
use attentiontracking::config::AppConfig;
use attentiontracking::controller::{ModeController, RecordingSettings};
use attentiontracking::face_detection::model_scrfd::ScrfdModel;
use attentiontracking::handoff::FrameSlot;
use attentiontracking::overlay::{load_font, OverlayRenderer};
use attentiontracking::webcam::OpenpnpCamera;

fn main() -> anyhow::Result<()> {
    // Log to stderr, `RUST_LOG=debug` for more.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = AppConfig::load(&args.config)?.apply_args(&args);

    let detector = ScrfdModel::new(&config.detector).context("loading face detector")?;
    let camera = OpenpnpCamera::open(&config.camera).context("opening camera")?;

    let slot = FrameSlot::new();
    let mut controller = ModeController::new(
        Box::new(camera),
        Arc::new(detector),
        slot.clone(),
        RecordingSettings::from(&config.recording),
    );
    controller.start_preview()?;

    let renderer = OverlayRenderer::new(load_font(config.ui.font_path.as_deref()), config.ui.font_size);
    let refresh_interval = config.ui.refresh_interval();

    let native_options = eframe::NativeOptions {
        initial_window_size: Some(egui::vec2(960.0, 600.0)),
        ..Default::default()
    };

    eframe::run_native(
        &config.ui.window_title,
        native_options,
        Box::new(move |cc| {
            let _re_ui = re_ui::ReUi::load_and_apply(&cc.egui_ctx);
            Box::new(AttentionApp::new(cc, controller, slot, renderer, refresh_interval))
        }),
    )
    .map_err(|err| anyhow!("viewer failed: {err}"))
}
