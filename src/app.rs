use std::time::Duration;

use chrono::{DateTime, Local};

use crate::controller::{Mode, ModeController};
use crate::frame::Overlay;
use crate::handoff::FrameSlot;
use crate::overlay::OverlayRenderer;

pub struct AttentionApp {
    controller: ModeController,
    slot: FrameSlot,
    renderer: OverlayRenderer,
    texture: Option<egui::TextureHandle>,
    last_overlay: Option<Overlay>,
    last_state: Option<&'static str>,
    last_captured: Option<DateTime<Local>>,
    status: Option<String>,
    refresh_interval: Duration,
}

impl AttentionApp {
    pub fn new(
        _cc: &eframe::CreationContext<'_>,
        controller: ModeController,
        slot: FrameSlot,
        renderer: OverlayRenderer,
        refresh_interval: Duration,
    ) -> Self {
        Self {
            controller,
            slot,
            renderer,
            texture: None,
            last_overlay: None,
            last_state: None,
            last_captured: None,
            status: None,
            refresh_interval,
        }
    }

    fn pull_frame(&mut self, ctx: &egui::Context) {
        let Some(annotated) = self.slot.try_consume() else {
            return;
        };

        let image = self.renderer.render(&annotated);
        let size = [image.width() as usize, image.height() as usize];
        let color_image = egui::ColorImage::from_rgb(size, image.as_raw());

        match &mut self.texture {
            Some(texture) => texture.set(color_image, egui::TextureOptions::default()),
            None => {
                self.texture =
                    Some(ctx.load_texture("camera", color_image, egui::TextureOptions::default()))
            }
        }

        self.last_state = Some(annotated.classification.state.label());
        self.last_captured = Some(annotated.frame.captured_at());
        self.last_overlay = Some(annotated.overlay);
    }

    fn record_pressed(&mut self) {
        match self.controller.toggle_recording() {
            Ok(mode) => {
                self.status = None;
                log::info!("operator switched to {mode:?}");
            }
            Err(err) => self.status = Some(err.to_string()),
        }
    }

    fn resume_pressed(&mut self) {
        if let Err(err) = self.controller.start_preview() {
            self.status = Some(err.to_string());
        }
    }
}

impl eframe::App for AttentionApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if let Some(err) = self.controller.poll() {
            self.status = Some(err.to_string());
        }
        self.pull_frame(ctx);

        let mode = self.controller.mode();
        let has_source = self.controller.has_frame_source();

        egui::TopBottomPanel::bottom("controls").show(ctx, |ui| {
            ui.add_space(6.0);
            ui.add_enabled_ui(has_source, |ui| {
                let label = if mode == Mode::Record {
                    "Stop Recording"
                } else {
                    "Start Recording"
                };
                let button = egui::Button::new(label);
                if ui.add_sized([ui.available_width(), 32.0], button).clicked() {
                    self.record_pressed();
                }

                if mode == Mode::Idle {
                    let button = egui::Button::new("Resume Preview");
                    if ui.add_sized([ui.available_width(), 24.0], button).clicked() {
                        self.resume_pressed();
                    }
                }
            });
            ui.add_space(6.0);
        });

        egui::SidePanel::left("side_panel").show(ctx, |ui| {
            ui.label(format!("Mode: {mode:?}"));

            // text the renderer could not burn into the frame
            if !self.renderer.has_font() || mode != Mode::Preview {
                if let Some(overlay) = &self.last_overlay {
                    ui.label(format!("FPS: {}", overlay.fps_text));
                }
                if let Some(state) = self.last_state {
                    ui.label(state);
                }
            }

            if let Some(at) = self.last_captured {
                ui.label(format!("Last frame {}", at.format("%H:%M:%S%.3f")));
            }

            if let Some(path) = self.controller.session_path() {
                ui.label(format!("Recording to {}", path.display()));
            }

            if let Some(status) = &self.status {
                ui.separator();
                ui.colored_label(egui::Color32::RED, status);
            }
        });

        egui::CentralPanel::default().show(ctx, |ui| match &self.texture {
            Some(texture) => {
                // fit the frame to the panel width
                let size = texture.size_vec2();
                let width = ui.available_width();
                let height = width * size.y / size.x.max(1.0);
                ui.image(texture, egui::Vec2::new(width, height));
            }
            None => {
                ui.label("Waiting for camera...");
            }
        });

        ctx.request_repaint_after(self.refresh_interval);
    }

    fn on_close_event(&mut self) -> bool {
        for err in self.controller.release() {
            log::warn!("{err}");
        }
        let stats = self.slot.stats();
        log::debug!(
            "viewer closed: {} frames published, {} replaced before display",
            stats.published,
            stats.dropped
        );
        true
    }
}
