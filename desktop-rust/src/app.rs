use std::collections::{HashMap, HashSet};
use std::sync::mpsc::Receiver;
use std::time::Duration;

use card_scan::config::Config;
use card_scan::session::ScanSession;
use card_scan_common::{
    display_text, field_at, format_confidence, render_overlay, Field, FieldDetail, JobId, JobStatus, JobView,
};
use eframe::egui::{self, Color32, RichText};
use eframe::egui::{FontData, FontDefinitions, FontFamily};

use crate::io::{Backend, ImageData, UiMessage};
use crate::model::{field_crop_paths, progress_fraction, AppState, NO_FIELDS_MESSAGE};

const BOX_COLOR: Color32 = Color32::from_rgb(80, 200, 120);
const SELECTED_BOX_COLOR: Color32 = Color32::from_rgb(246, 196, 69);
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp"];
const FIELD_THUMB_HEIGHT: f32 = 28.0;

pub struct DesktopApp {
    state: AppState,
    status: String,
    // session は backend のランタイムより先にDropする
    session: Option<ScanSession>,
    backend: Option<Backend>,
    rx: Option<Receiver<UiMessage>>,
    submitting: bool,
    textures: HashMap<String, egui::TextureHandle>,
    image_inflight: HashSet<String>,
    image_failed: HashSet<String>,
    pending_images: Vec<ImageData>,
}

impl DesktopApp {
    pub fn new(ctx: egui::Context) -> Self {
        let mut status = String::new();
        let config = Config::load().unwrap_or_else(|err| {
            status = format!("Config error, using defaults: {err}");
            Config::default()
        });

        let mut app = Self {
            state: AppState::default(),
            status,
            session: None,
            backend: None,
            rx: None,
            submitting: false,
            textures: HashMap::new(),
            image_inflight: HashSet::new(),
            image_failed: HashSet::new(),
            pending_images: Vec::new(),
        };

        match Backend::new(&config, ctx) {
            Ok((backend, rx)) => {
                app.session = Some(ScanSession::new(backend.api(), config.poll_interval()));
                backend.refresh_history();
                app.backend = Some(backend);
                app.rx = Some(rx);
            }
            Err(err) => app.status = format!("Backend unavailable: {err:#}"),
        }
        app
    }

    fn upload(&mut self) {
        let Some(backend) = &self.backend else {
            return;
        };
        let Some(path) = rfd::FileDialog::new()
            .add_filter("Images", IMAGE_EXTENSIONS)
            .pick_file()
        else {
            return;
        };
        self.submitting = true;
        self.status = format!("Uploading {}...", path.display());
        backend.submit(path);
    }

    fn track_input(&mut self) {
        match self.state.job_input.parse::<JobId>() {
            Ok(id) => self.track_job(id),
            Err(_) => self.status = format!("Invalid job id: {}", self.state.job_input.trim()),
        }
    }

    fn track_job(&mut self, id: JobId) {
        let (Some(backend), Some(session)) = (&self.backend, &mut self.session) else {
            return;
        };
        if session.job_id() == Some(id) && self.state.tracking == Some(id) {
            return;
        }
        {
            // ポーラーはバックグラウンドのランタイム上で動かす
            let _guard = backend.runtime().enter();
            session.track(id);
        }
        self.state.start_tracking(id);
        self.state.job_input = id.to_string();
        self.status = format!("Tracking scan #{id}");
    }

    fn request_image(&mut self, path: &str) {
        if path.is_empty()
            || self.textures.contains_key(path)
            || self.image_inflight.contains(path)
            || self.image_failed.contains(path)
        {
            return;
        }
        let Some(backend) = &self.backend else {
            return;
        };
        self.image_inflight.insert(path.to_string());
        backend.load_image(path.to_string());
    }

    fn process_pending_images(&mut self, ctx: &egui::Context) {
        let pending = std::mem::take(&mut self.pending_images);
        for msg in pending {
            if msg.size[0] == 0 || msg.size[1] == 0 {
                self.image_failed.insert(msg.path);
                continue;
            }
            let color_image = egui::ColorImage::from_rgba_unmultiplied(msg.size, &msg.pixels);
            let texture = ctx.load_texture(&msg.path, color_image, egui::TextureOptions::default());

            if self.state.card_image() == Some(msg.path.as_str()) {
                self.state.feed_natural_width(&msg.path, msg.size[0] as f64);
            }
            self.textures.insert(msg.path, texture);
        }
    }

    fn poll_messages(&mut self) {
        let mut messages = Vec::new();
        if let Some(rx) = &self.rx {
            while let Ok(msg) = rx.try_recv() {
                messages.push(msg);
            }
        }

        for msg in messages {
            match msg {
                UiMessage::Submitted(Ok(job)) => {
                    self.submitting = false;
                    self.track_job(job.id);
                    self.status = format!("Scan #{} accepted ({})", job.id, job.filename);
                    self.refresh_history();
                }
                UiMessage::Submitted(Err(err)) => {
                    // 追跡中のジョブには触れない
                    self.submitting = false;
                    self.status = format!("Upload failed: {err}");
                }
                UiMessage::History(Ok(jobs)) => self.state.history = jobs,
                UiMessage::History(Err(err)) => self.status = format!("History failed: {err}"),
                UiMessage::Deleted { id, result: Ok(()) } => {
                    self.state.remove_from_history(id);
                    if self.state.tracking == Some(id) {
                        if let Some(session) = &mut self.session {
                            session.teardown();
                        }
                        self.state.stop_tracking();
                    }
                    self.status = format!("Deleted scan #{id}");
                }
                UiMessage::Deleted { id, result: Err(err) } => {
                    self.status = format!("Delete #{id} failed: {err}");
                }
                UiMessage::Image(image) => {
                    self.image_inflight.remove(&image.path);
                    self.pending_images.push(image);
                }
            }
        }
    }

    /// ポーラーから届いた統合状態を反映する（待たない）
    fn poll_tracking(&mut self) {
        let Some(poller) = self.session.as_mut().and_then(|s| s.poller()) else {
            return;
        };
        let mut views = Vec::new();
        while let Some(view) = poller.try_next() {
            views.push(view);
        }
        for view in views {
            self.apply_view(view);
        }
    }

    fn apply_view(&mut self, view: JobView) {
        let became_terminal = view.is_terminal() && !self.state.view.is_terminal();
        self.state.view = view;
        if !became_terminal {
            return;
        }

        if let Some(path) = self.state.card_image().map(str::to_string) {
            let cached_width = self.textures.get(&path).map(|t| t.size()[0] as f64);
            self.state.show_card(&path, cached_width);
            self.request_image(&path);
        }
        if let Some(job) = &self.state.view.record {
            self.status = format!("Scan #{} {}", job.id, job.status);
        }
        self.refresh_history();
    }

    fn refresh_history(&self) {
        if let Some(backend) = &self.backend {
            backend.refresh_history();
        }
    }

    fn is_polling(&mut self) -> bool {
        self.session
            .as_mut()
            .and_then(|s| s.poller())
            .map(|p| p.is_running())
            .unwrap_or(false)
    }

    fn render_tracking(&mut self, ui: &mut egui::Ui) {
        let Some(id) = self.state.tracking else {
            ui.label("Upload a card image or enter a job id to start.");
            return;
        };

        ui.heading(format!("Scan #{id}"));
        let view = &self.state.view;
        let label = format!("{:.0}% {}", view.percent, view.display_label());
        ui.add(egui::ProgressBar::new(progress_fraction(view)).text(label));
        ui.add_space(8.0);

        let status = view.status;
        match status {
            Some(JobStatus::Completed) => self.render_results(ui),
            Some(JobStatus::Failed) => {
                let message = self
                    .state
                    .view
                    .record
                    .as_ref()
                    .and_then(|r| r.error_message.clone())
                    .unwrap_or_else(|| "Processing failed".to_string());
                ui.label(RichText::new(message).color(Color32::from_rgb(230, 90, 90)));
            }
            None => {
                ui.spinner();
            }
            Some(_) => {}
        }
    }

    fn render_results(&mut self, ui: &mut egui::Ui) {
        let fields: Vec<Field> = self
            .state
            .view
            .record
            .as_ref()
            .map(|r| r.fields.clone())
            .unwrap_or_default();

        ui.horizontal_top(|ui| {
            let image_width = (ui.available_width() * 0.65).max(120.0);
            ui.allocate_ui(egui::vec2(image_width, ui.available_height()), |ui| {
                self.render_card_image(ui, &fields);
            });
            ui.separator();
            ui.vertical(|ui| {
                ui.label(RichText::new(format!("Fields ({})", fields.len())).strong());
                if fields.is_empty() {
                    ui.label(RichText::new(NO_FIELDS_MESSAGE).weak());
                    return;
                }
                for path in field_crop_paths(&fields) {
                    self.request_image(path);
                }
                egui::ScrollArea::vertical().id_source("fields").show(ui, |ui| {
                    for field in &fields {
                        let selected = self.state.inspector.is_selected(field.id);
                        let text = format!("{}  {}", display_text(field), format_confidence(field.confidence));
                        ui.horizontal(|ui| {
                            let crop = field.image_path.as_deref().and_then(|p| self.textures.get(p));
                            if let Some(texture) = crop {
                                ui.add(egui::Image::new(texture).max_height(FIELD_THUMB_HEIGHT));
                            }
                            if ui.selectable_label(selected, text).clicked() {
                                self.state.inspector.select(field.clone());
                            }
                        });
                    }
                });
            });
        });
    }

    fn render_card_image(&mut self, ui: &mut egui::Ui, fields: &[Field]) {
        let Some(path) = self.state.card_image().map(str::to_string) else {
            ui.label("No card image");
            return;
        };
        let Some(texture) = self.textures.get(&path).cloned() else {
            if self.image_failed.contains(&path) {
                ui.label("Card image unavailable");
            } else {
                self.request_image(&path);
                ui.spinner();
            }
            return;
        };

        let natural = texture.size_vec2();
        if self.state.scale.natural_width().is_none() {
            self.state.feed_natural_width(&path, natural.x as f64);
        }
        // ビューポート幅の変化を倍率へ反映（元画像より拡大しない）
        let rendered_width = ui.available_width().min(natural.x).max(1.0);
        if self.state.scale.rendered_width() != Some(rendered_width as f64) {
            self.state.scale.on_resize(rendered_width as f64);
        }
        let scale = self.state.scale.current();
        let size = egui::vec2(rendered_width, natural.y * rendered_width / natural.x);

        let response = ui.add(
            egui::Image::new(&texture)
                .fit_to_exact_size(size)
                .sense(egui::Sense::click()),
        );
        let origin = response.rect.min;
        let boxes = render_overlay(fields, scale);

        let painter = ui.painter_at(response.rect);
        for overlay in &boxes {
            let r = overlay.rect;
            let rect = egui::Rect::from_min_size(
                origin + egui::vec2(r.left as f32, r.top as f32),
                egui::vec2(r.width as f32, r.height as f32),
            );
            let color = if self.state.inspector.is_selected(overlay.field_id) {
                SELECTED_BOX_COLOR
            } else {
                BOX_COLOR
            };
            painter.rect_stroke(rect, 0.0, egui::Stroke::new(2.0, color));
        }

        if response.clicked() {
            if let Some(pos) = response.interact_pointer_pos() {
                let local = pos - origin;
                match field_at(fields, &boxes, local.x as f64, local.y as f64) {
                    Some(field) => {
                        self.state.inspector.select(field.clone());
                    }
                    // 枠の外（背景）をクリックしたら閉じる
                    None => {
                        self.state.inspector.dismiss();
                    }
                }
            }
        }
    }

    fn render_history(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.heading("History");
            if ui.small_button("Refresh").clicked() {
                self.refresh_history();
            }
        });
        ui.label(format!("{} scans", self.state.history.len()));
        ui.separator();

        let mut track = None;
        egui::ScrollArea::vertical()
            .auto_shrink([false, false])
            .show(ui, |ui| {
                for job in &self.state.history {
                    ui.horizontal(|ui| {
                        let selected = self.state.tracking == Some(job.id);
                        let text = format!("#{} {} {}", job.id, job.status, job.filename);
                        if ui.selectable_label(selected, text).clicked() {
                            track = Some(job.id);
                        }
                        if ui.small_button("Delete").clicked() {
                            self.state.pending_delete = Some(job.id);
                        }
                    });
                }
            });

        if let Some(id) = track {
            self.track_job(id);
        }
    }

    fn render_inspector(&mut self, ctx: &egui::Context) {
        let Some(field) = self.state.inspector.selected() else {
            return;
        };
        let detail = FieldDetail::from_field(field);
        let crop = detail.image_path.clone();

        let mut open = true;
        let mut close_clicked = false;
        let textures = &self.textures;
        let failed = &self.image_failed;
        egui::Window::new("Field Detail")
            .collapsible(false)
            .resizable(false)
            .open(&mut open)
            .show(ctx, |ui| {
                egui::Grid::new("field_detail").num_columns(2).show(ui, |ui| {
                    ui.label(RichText::new("Text").strong());
                    ui.label(&detail.text);
                    ui.end_row();
                    ui.label(RichText::new("Confidence").strong());
                    ui.label(&detail.confidence);
                    ui.end_row();
                    ui.label(RichText::new("Position").strong());
                    ui.label(&detail.position);
                    ui.end_row();
                });

                if let Some(path) = &crop {
                    ui.separator();
                    match textures.get(path) {
                        Some(texture) => {
                            ui.add(egui::Image::new(texture).max_width(320.0));
                        }
                        None if failed.contains(path) => {
                            ui.label("Image unavailable");
                        }
                        None => {
                            ui.spinner();
                        }
                    }
                }

                ui.add_space(6.0);
                if ui.button("Close").clicked() {
                    close_clicked = true;
                }
            });

        if !open || close_clicked {
            self.state.inspector.dismiss();
        } else if let Some(path) = crop {
            self.request_image(&path);
        }
    }

    fn render_delete_confirm(&mut self, ctx: &egui::Context) {
        let Some(id) = self.state.pending_delete else {
            return;
        };
        let mut decision = None;
        egui::Window::new("Delete Scan")
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, egui::vec2(0.0, 0.0))
            .show(ctx, |ui| {
                ui.label(format!("Delete scan #{id}? This cannot be undone."));
                ui.horizontal(|ui| {
                    if ui.button("Delete").clicked() {
                        decision = Some(true);
                    }
                    if ui.button("Cancel").clicked() {
                        decision = Some(false);
                    }
                });
            });

        match decision {
            Some(true) => {
                self.state.pending_delete = None;
                if let Some(backend) = &self.backend {
                    backend.delete(id);
                }
            }
            Some(false) => self.state.pending_delete = None,
            None => {}
        }
    }
}

pub fn configure_fonts(ctx: &egui::Context) {
    let mut fonts = FontDefinitions::default();
    let candidates = [
        r"C:\Windows\Fonts\meiryo.ttc",
        r"C:\Windows\Fonts\msgothic.ttc",
        "/System/Library/Fonts/Supplemental/Arial Unicode.ttf",
        "/usr/share/fonts/truetype/noto/NotoSansCJK-Regular.ttc",
        "/usr/share/fonts/opentype/noto/NotoSansCJK-Regular.ttc",
    ];

    for path in candidates {
        if let Ok(data) = std::fs::read(path) {
            fonts.font_data.insert("cjk_fallback".to_string(), FontData::from_owned(data));
            fonts.families
                .entry(FontFamily::Proportional)
                .or_default()
                .push("cjk_fallback".to_string());
            ctx.set_fonts(fonts);
            return;
        }
    }
}

impl eframe::App for DesktopApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll_messages();
        self.poll_tracking();
        self.process_pending_images(ctx);

        if self.is_polling() || self.submitting || !self.image_inflight.is_empty() {
            ctx.request_repaint_after(Duration::from_millis(100));
        }
        if ctx.input(|i| i.key_pressed(egui::Key::Escape)) {
            self.state.inspector.dismiss();
        }

        egui::TopBottomPanel::top("top").show(ctx, |ui| {
            egui::menu::bar(ui, |ui| {
                let ready = self.backend.is_some();
                if ui
                    .add_enabled(ready && !self.submitting, egui::Button::new("Upload Card"))
                    .clicked()
                {
                    self.upload();
                }

                ui.separator();
                ui.label("Job");
                let input = ui.add(egui::TextEdit::singleline(&mut self.state.job_input).desired_width(80.0));
                let entered = input.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
                if ui.add_enabled(ready, egui::Button::new("Track")).clicked() || (ready && entered) {
                    self.track_input();
                }

                ui.separator();
                if !self.status.is_empty() {
                    ui.label(RichText::new(&self.status).color(Color32::from_gray(170)));
                }
            });
        });

        egui::SidePanel::left("history").resizable(true).show(ctx, |ui| {
            self.render_history(ui);
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            egui::ScrollArea::vertical().show(ui, |ui| {
                self.render_tracking(ui);
            });
        });

        self.render_inspector(ctx);
        self.render_delete_confirm(ctx);
    }
}
