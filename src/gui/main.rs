#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

use std::path::PathBuf;
use std::thread::JoinHandle;

use eframe::egui;
use tokio::sync::mpsc::error::TryRecvError;

use geotitle::config::Config;
use geotitle::editor::{self, Advance, EditorSession};
use geotitle::exif::GpsCoordinate;
use geotitle::pipeline::{BatchPipeline, FileOutcome, FileReport};
use geotitle::status::{status_channel, CancelFlag, StatusEvent, StatusReceiver, StatusSender};

fn main() -> eframe::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let viewport = egui::ViewportBuilder::default()
        .with_inner_size([900.0, 640.0])
        .with_min_inner_size([640.0, 420.0]);

    let options = eframe::NativeOptions {
        viewport,
        ..Default::default()
    };

    eframe::run_native(
        "geotitle",
        options,
        Box::new(|cc| Ok(Box::new(App::new(cc)))),
    )
}

// ── Background batch run ────────────────────────────────────────────

/// A batch run on its own thread with a current-thread tokio runtime.
struct BatchRun {
    rx: StatusReceiver,
    cancel: CancelFlag,
    handle: Option<JoinHandle<()>>,
}

impl BatchRun {
    fn start(config: Config, folder: PathBuf) -> Self {
        let (tx, rx) = status_channel();
        let cancel = CancelFlag::new();
        let worker_cancel = cancel.clone();

        let handle = std::thread::spawn(move || {
            let rt = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    send_abort(&tx, format!("Failed to start runtime: {e}"));
                    return;
                }
            };

            rt.block_on(async {
                match BatchPipeline::from_config(&config) {
                    // Errors are already reported through the channel.
                    Ok(pipeline) => {
                        let _ = pipeline.run(&folder, &tx, &worker_cancel).await;
                    }
                    Err(e) => send_abort(&tx, format!("{e:#}")),
                }
            });
        });

        Self {
            rx,
            cancel,
            handle: Some(handle),
        }
    }

    fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Batch worker panicked");
            }
        }
    }
}

fn send_abort(tx: &StatusSender, message: String) {
    log::error!("{message}");
    let _ = tx.send(StatusEvent::Aborted(message));
}

// ── Editor state ────────────────────────────────────────────────────

struct LoadedImage {
    file_name: String,
    position: usize,
    total: usize,
    coordinate: Option<GpsCoordinate>,
    texture: egui::TextureHandle,
}

struct EditorState {
    session: EditorSession,
    current: Option<LoadedImage>,
    lat: String,
    lon: String,
}

enum EditorAction {
    Load,
    Save,
    Skip,
    OpenMap,
}

// ── Tabs ────────────────────────────────────────────────────────────

#[derive(PartialEq, Clone, Copy)]
enum Tab {
    Batch,
    Editor,
}

// ── Main application state ──────────────────────────────────────────

struct App {
    config: Config,
    tab: Tab,
    folder: String,
    run: Option<BatchRun>,
    status: String,
    reports: Vec<FileReport>,
    editor: Option<EditorState>,
    editor_status: String,
    /// Shown when a run is requested without an API key.
    key_prompt: bool,
    key_input: String,
}

impl App {
    fn new(_cc: &eframe::CreationContext<'_>) -> Self {
        let mut config = match Config::load(None) {
            Ok(c) => c,
            Err(e) => {
                log::error!("{e:#}");
                Config::default()
            }
        };
        config.apply_env();
        let folder = config.image_path.clone().unwrap_or_default();

        Self {
            config,
            tab: Tab::Batch,
            folder,
            run: None,
            status: "Ready — choose a folder".into(),
            reports: Vec::new(),
            editor: None,
            editor_status: String::new(),
            key_prompt: false,
            key_input: String::new(),
        }
    }

    fn running(&self) -> bool {
        self.run.is_some()
    }

    fn browse(&mut self) {
        if let Some(dir) = rfd::FileDialog::new().pick_folder() {
            self.folder = dir.display().to_string();
        }
    }

    fn start_batch(&mut self) {
        if self.running() {
            return;
        }
        if self.folder.trim().is_empty() {
            self.status = "Choose a folder first".into();
            return;
        }
        if !self.config.has_api_key() {
            self.key_prompt = true;
            return;
        }

        self.reports.clear();
        self.status = "Processing images...".into();
        self.run = Some(BatchRun::start(
            self.config.clone(),
            PathBuf::from(self.folder.trim()),
        ));
    }

    fn cancel_batch(&mut self) {
        if let Some(run) = &self.run {
            run.cancel.cancel();
            self.status = "Cancelling...".into();
        }
    }

    fn poll_status(&mut self) {
        let Some(run) = &mut self.run else {
            return;
        };

        let mut finished = false;
        loop {
            match run.rx.try_recv() {
                Ok(StatusEvent::Progress(msg)) => self.status = msg,
                Ok(StatusEvent::File(report)) => self.reports.push(report),
                Ok(StatusEvent::Finished(summary)) => {
                    self.status = if summary.cancelled {
                        format!("Cancelled — {} processed", summary.processed)
                    } else {
                        format!(
                            "Done — {} processed, {} skipped, {} failed",
                            summary.processed, summary.skipped, summary.failed
                        )
                    };
                    finished = true;
                }
                Ok(StatusEvent::Aborted(msg)) => {
                    self.status = format!("Error: {msg}");
                    finished = true;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    finished = true;
                    break;
                }
            }
        }

        if finished {
            if let Some(mut run) = self.run.take() {
                run.stop();
            }
        }
    }

    fn save_api_key(&mut self) {
        let key = self.key_input.trim().to_string();
        if key.is_empty() {
            return;
        }
        self.config.openai.api_key = key;
        self.key_input.clear();
        self.key_prompt = false;

        if let Err(e) = self.config.save(None) {
            self.status = format!("Failed to save config: {e:#}");
            return;
        }
        self.start_batch();
    }
}

impl Drop for App {
    fn drop(&mut self) {
        if let Some(mut run) = self.run.take() {
            run.stop();
        }
    }
}

impl eframe::App for App {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll_status();

        // Request repaint while processing so we pick up messages
        if self.running() {
            ctx.request_repaint();
        }

        // ── Top bar ─────────────────────────────────────────────────
        egui::TopBottomPanel::top("top_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.heading("geotitle");
                ui.separator();

                if ui.selectable_label(self.tab == Tab::Batch, "📷 Batch").clicked() {
                    self.tab = Tab::Batch;
                }
                if ui.selectable_label(self.tab == Tab::Editor, "📍 GPS Editor").clicked() {
                    self.tab = Tab::Editor;
                }

                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if self.running() {
                        ui.spinner();
                    }
                });
            });
            ui.add_space(2.0);
            ui.horizontal(|ui| {
                ui.label("Folder:");
                ui.add_enabled(
                    !self.running(),
                    egui::TextEdit::singleline(&mut self.folder).desired_width(480.0),
                );
                if ui.add_enabled(!self.running(), egui::Button::new("📁 Browse")).clicked() {
                    self.browse();
                }
            });
            ui.add_space(4.0);
        });

        match self.tab {
            Tab::Batch => self.show_batch_tab(ctx),
            Tab::Editor => self.show_editor_tab(ctx),
        }

        if self.key_prompt {
            self.show_key_prompt(ctx);
        }
    }
}

// ── Batch tab ───────────────────────────────────────────────────────

impl App {
    fn show_batch_tab(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::bottom("batch_toolbar").show(ctx, |ui| {
            ui.add_space(4.0);
            ui.horizontal(|ui| {
                if ui.add_enabled(!self.running(), egui::Button::new("▶ Start")).clicked() {
                    self.start_batch();
                }
                if ui.add_enabled(self.running(), egui::Button::new("⏹ Cancel")).clicked() {
                    self.cancel_batch();
                }
                ui.separator();
                ui.label(&self.status);
            });
            ui.add_space(4.0);
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            if self.reports.is_empty() {
                ui.centered_and_justified(|ui| {
                    ui.label(
                        egui::RichText::new("Reports appear here as files are processed")
                            .size(16.0)
                            .color(egui::Color32::GRAY),
                    );
                });
                return;
            }

            egui::ScrollArea::vertical()
                .auto_shrink([false, false])
                .stick_to_bottom(true)
                .show(ui, |ui| {
                    egui::Grid::new("report_grid")
                        .num_columns(3)
                        .spacing([12.0, 4.0])
                        .striped(true)
                        .show(ui, |ui| {
                            for report in &self.reports {
                                Self::report_row(ui, report);
                            }
                        });
                });
        });
    }

    fn report_row(ui: &mut egui::Ui, report: &FileReport) {
        let (icon, color) = match report.outcome {
            FileOutcome::Processed => ("✅", egui::Color32::from_rgb(50, 180, 50)),
            FileOutcome::Skipped => ("⏭", egui::Color32::GRAY),
            FileOutcome::Failed => ("❌", egui::Color32::from_rgb(220, 50, 50)),
            FileOutcome::Cancelled => ("⏹", egui::Color32::GRAY),
        };
        ui.colored_label(color, icon);
        ui.label(&report.original);

        let detail = match report.outcome {
            FileOutcome::Processed => {
                let mut s = format!("→ {}", report.new_name.as_deref().unwrap_or("?"));
                if let Some(coord) = report.coordinate {
                    s.push_str(&format!("  ({coord})"));
                }
                s
            }
            FileOutcome::Skipped => "already processed".to_string(),
            FileOutcome::Failed => report.error.clone().unwrap_or_default(),
            FileOutcome::Cancelled => "cancelled".to_string(),
        };
        ui.label(detail);
        ui.end_row();
    }

    fn show_key_prompt(&mut self, ctx: &egui::Context) {
        let mut open = true;
        let mut save = false;
        egui::Window::new("OpenAI API key")
            .collapsible(false)
            .resizable(false)
            .open(&mut open)
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                ui.label("An OpenAI API key is needed to generate titles.");
                ui.label(
                    egui::RichText::new("It is saved to config.json next to the program.")
                        .small()
                        .color(egui::Color32::GRAY),
                );
                ui.add_space(6.0);
                let resp = ui.add(
                    egui::TextEdit::singleline(&mut self.key_input)
                        .password(true)
                        .hint_text("sk-...")
                        .desired_width(320.0),
                );
                let entered = resp.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
                ui.add_space(6.0);
                if ui.button("Save and start").clicked() || entered {
                    save = true;
                }
            });

        if save {
            self.save_api_key();
        } else if !open {
            self.key_prompt = false;
            self.key_input.clear();
        }
    }
}

// ── GPS editor tab ──────────────────────────────────────────────────

impl App {
    fn show_editor_tab(&mut self, ctx: &egui::Context) {
        let mut action = None;

        egui::TopBottomPanel::bottom("editor_toolbar").show(ctx, |ui| {
            ui.add_space(4.0);
            ui.horizontal(|ui| {
                if ui.button("📂 Load Folder").clicked() {
                    action = Some(EditorAction::Load);
                }
                ui.separator();
                let has_image = self.editor.as_ref().is_some_and(|e| e.current.is_some());
                // Skip stays usable on a file that failed to decode.
                let has_files = self.editor.as_ref().is_some_and(|e| !e.session.is_empty());
                if ui.add_enabled(has_image, egui::Button::new("💾 Save & Next")).clicked() {
                    action = Some(EditorAction::Save);
                }
                if ui.add_enabled(has_files, egui::Button::new("⏭ Skip")).clicked() {
                    action = Some(EditorAction::Skip);
                }
                if ui.add_enabled(has_image, egui::Button::new("🗺 Open Map")).clicked() {
                    action = Some(EditorAction::OpenMap);
                }
                ui.separator();
                ui.label(&self.editor_status);
            });
            ui.add_space(4.0);
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            let Some(state) = self.editor.as_mut() else {
                ui.centered_and_justified(|ui| {
                    ui.label(
                        egui::RichText::new("Load a folder to edit GPS coordinates")
                            .size(18.0)
                            .color(egui::Color32::GRAY),
                    );
                });
                return;
            };
            let Some(current) = &state.current else {
                if let Some(path) = state.session.current_path() {
                    ui.heading(format!(
                        "{} ({}/{})",
                        path.file_name().unwrap_or_default().to_string_lossy(),
                        state.session.index() + 1,
                        state.session.files().len()
                    ));
                    ui.label(
                        egui::RichText::new("This image could not be opened. Skip to continue.")
                            .color(egui::Color32::LIGHT_RED),
                    );
                }
                return;
            };

            ui.heading(format!(
                "{} ({}/{})",
                current.file_name, current.position, current.total
            ));
            ui.add_space(6.0);
            ui.horizontal(|ui| {
                let size = current.texture.size_vec2();
                ui.image(egui::load::SizedTexture::new(current.texture.id(), size));

                ui.vertical(|ui| {
                    match current.coordinate {
                        Some(c) => ui.label(format!("Current GPS: {c}")),
                        None => ui.label(
                            egui::RichText::new("No GPS data").color(egui::Color32::GRAY),
                        ),
                    };
                    ui.add_space(8.0);

                    egui::Grid::new("gps_fields")
                        .num_columns(2)
                        .spacing([8.0, 6.0])
                        .show(ui, |ui| {
                            ui.label("Latitude:");
                            ui.text_edit_singleline(&mut state.lat);
                            ui.end_row();
                            ui.label("Longitude:");
                            let resp = ui.text_edit_singleline(&mut state.lon);
                            if resp.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter)) {
                                action = Some(EditorAction::Save);
                            }
                            ui.end_row();
                        });
                });
            });
        });

        if let Some(action) = action {
            self.handle_editor_action(ctx, action);
        }
    }

    fn handle_editor_action(&mut self, ctx: &egui::Context, action: EditorAction) {
        if let EditorAction::Load = action {
            match EditorSession::load_folder(self.folder.trim().as_ref()) {
                Ok(session) => {
                    self.editor = Some(EditorState {
                        session,
                        current: None,
                        lat: String::new(),
                        lon: String::new(),
                    });
                    self.load_editor_image(ctx);
                }
                Err(e) => {
                    self.editor = None;
                    self.editor_status = format!("Failed to load folder: {e:#}");
                }
            }
            return;
        }

        let Some(state) = self.editor.as_mut() else {
            return;
        };
        match action {
            EditorAction::Load => {}
            EditorAction::Save => match state.session.save_current_and_advance(&state.lat, &state.lon) {
                Ok(Advance::Next(_)) => self.load_editor_image(ctx),
                Ok(Advance::EndOfList) => {
                    self.load_editor_image(ctx);
                    self.editor_status = "Saved. All images have been processed.".into();
                }
                Err(e) => self.editor_status = e.to_string(),
            },
            EditorAction::Skip => match state.session.skip() {
                Advance::Next(_) => self.load_editor_image(ctx),
                Advance::EndOfList => {
                    self.editor_status = "All images have been processed.".into();
                }
            },
            EditorAction::OpenMap => match editor::parse_coordinate(&state.lat, &state.lon) {
                Ok(coord) => ctx.open_url(egui::OpenUrl::new_tab(editor::map_url(&coord))),
                Err(e) => self.editor_status = e.to_string(),
            },
        }
    }

    /// Decode the session's current image into a texture and fill the fields.
    fn load_editor_image(&mut self, ctx: &egui::Context) {
        let Some(state) = self.editor.as_mut() else {
            return;
        };

        match state.session.load_current() {
            Ok(Some(image)) => {
                let size = [
                    image.thumbnail.width() as usize,
                    image.thumbnail.height() as usize,
                ];
                let color_image =
                    egui::ColorImage::from_rgba_unmultiplied(size, image.thumbnail.as_raw());
                let texture = ctx.load_texture(
                    image.path.to_string_lossy(),
                    color_image,
                    egui::TextureOptions::LINEAR,
                );

                let (lat, lon) = match image.coordinate {
                    Some(c) => (format!("{:.6}", c.latitude()), format!("{:.6}", c.longitude())),
                    None => (String::new(), String::new()),
                };
                state.lat = lat;
                state.lon = lon;
                self.editor_status = format!("Editing {}", image.file_name);
                state.current = Some(LoadedImage {
                    file_name: image.file_name,
                    position: image.position,
                    total: image.total,
                    coordinate: image.coordinate,
                    texture,
                });
            }
            Ok(None) => {
                state.current = None;
                self.editor_status = "No JPEG images in this folder".into();
            }
            Err(e) => {
                log::warn!("{e:#}");
                state.current = None;
                state.lat.clear();
                state.lon.clear();
                self.editor_status = format!("Failed to load image: {e:#}");
            }
        }
    }
}
