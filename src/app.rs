use std::path::PathBuf;
use std::time::Instant;

use egui::{Color32, Key, RichText, Sense, Stroke};

use crate::audio::{MAX_RATE, MIN_RATE};
use crate::audio_io;
use crate::session::{PlayerState, Session};

const BG: Color32 = Color32::from_rgb(16, 16, 18);
const WAVE: Color32 = Color32::from_rgb(80, 200, 255);
const LOOP_FILL: Color32 = Color32::from_rgba_premultiplied(20, 60, 30, 60);
const START_COL: Color32 = Color32::from_rgb(80, 240, 160);
const END_COL: Color32 = Color32::from_rgb(255, 110, 90);
const CLICK_COL: Color32 = Color32::from_rgb(255, 210, 60);

pub struct AbWaveApp {
    session: Session,
    rate: f32,
    volume: f32,
}

impl AbWaveApp {
    pub fn new(mut session: Session, open_file: Option<PathBuf>) -> Self {
        if let Some(path) = open_file {
            session.load_file(path);
        }
        let rate = session.playback().playback_rate;
        let volume = session.playback().volume;
        Self {
            session,
            rate,
            volume,
        }
    }

    fn handle_dropped_files(&mut self, ctx: &egui::Context) {
        let dropped = ctx.input(|i| i.raw.dropped_files.clone());
        // Only the last supported file matters; each load supersedes the previous one.
        let path = dropped
            .into_iter()
            .filter_map(|f| f.path)
            .filter(|p| audio_io::is_supported_audio_path(p))
            .last();
        if let Some(path) = path {
            self.session.load_file(path);
        }
    }

    fn handle_shortcuts(&mut self, ctx: &egui::Context) {
        if ctx.wants_keyboard_input() {
            return;
        }
        if ctx.input(|i| i.key_pressed(Key::Space)) {
            self.session.toggle_play_pause();
        }
        if ctx.input(|i| i.key_pressed(Key::S)) {
            self.session.commit_start();
        }
        if ctx.input(|i| i.key_pressed(Key::E)) {
            self.session.commit_end();
        }
        if ctx.input(|i| i.key_pressed(Key::Escape)) {
            self.session.clear_markers();
        }
        if ctx.input(|i| i.key_pressed(Key::Home)) {
            self.session.jump_to_start();
        }
    }

    fn top_bar(&mut self, ui: &mut egui::Ui) {
        ui.horizontal_wrapped(|ui| {
            let has_asset = self.session.asset().is_some();
            let playing = self.session.state() == PlayerState::Playing;
            let label = if playing { "Pause" } else { "Play" };
            if ui
                .add_enabled(has_asset, egui::Button::new(label))
                .clicked()
            {
                self.session.toggle_play_pause();
            }
            if ui.add_enabled(has_asset, egui::Button::new("|<")).clicked() {
                self.session.jump_to_start();
            }
            ui.separator();
            if ui.button("Set Start").clicked() {
                self.session.commit_start();
            }
            if ui.button("Set End").clicked() {
                self.session.commit_end();
            }
            if ui.button("Clear").clicked() {
                self.session.clear_markers();
            }
            ui.separator();
            ui.label("Speed");
            if ui
                .add(egui::Slider::new(&mut self.rate, MIN_RATE..=MAX_RATE).fixed_decimals(2))
                .changed()
            {
                self.session.set_playback_rate(self.rate);
            }
            ui.label("Vol");
            if ui
                .add(egui::Slider::new(&mut self.volume, 0.0..=1.0).fixed_decimals(2))
                .changed()
            {
                self.session.set_volume(self.volume);
            }
            ui.separator();
            ui.monospace(format!(
                "{} / {}",
                format_time(self.session.playback().current_time),
                format_time(self.session.duration())
            ));
            if self.session.is_loading() {
                ui.spinner();
            }
        });
        ui.horizontal(|ui| {
            let markers = self.session.markers();
            let fmt = |t: Option<f64>| t.map(format_time).unwrap_or_else(|| "--".to_string());
            ui.label(format!(
                "A {}  B {}  click {}",
                fmt(markers.start()),
                fmt(markers.end()),
                fmt(markers.clicked_time())
            ));
            if markers.is_looping() {
                ui.label(RichText::new("LOOP").color(START_COL).strong());
            }
            if let Some(err) = self.session.last_error() {
                ui.label(RichText::new(err).color(Color32::LIGHT_RED));
            }
        });
    }

    fn waveform(&mut self, ui: &mut egui::Ui) {
        let size = egui::vec2(ui.available_width(), ui.available_height().max(120.0));
        let (resp, painter) = ui.allocate_painter(size, Sense::click_and_drag());
        let rect = resp.rect;
        painter.rect_filled(rect, 0.0, BG);

        let Some(asset) = self.session.asset() else {
            painter.text(
                rect.center(),
                egui::Align2::CENTER_CENTER,
                "Drop an audio file here",
                egui::FontId::proportional(18.0),
                Color32::GRAY,
            );
            return;
        };
        let duration = asset.duration();
        let x_of = |t: f64| {
            let frac = if duration > 0.0 { (t / duration) as f32 } else { 0.0 };
            rect.left() + frac.clamp(0.0, 1.0) * rect.width()
        };
        let vline = |x: f32, col: Color32, width: f32| {
            painter.line_segment(
                [egui::pos2(x, rect.top()), egui::pos2(x, rect.bottom())],
                Stroke::new(width, col),
            );
        };

        let markers = *self.session.markers();
        if let Some((a, b)) = markers.region() {
            let band = egui::Rect::from_x_y_ranges(x_of(a)..=x_of(b), rect.y_range());
            painter.rect_filled(band, 0.0, LOOP_FILL);
        }

        let envelope = self.session.envelope();
        if envelope.asset_id == asset.id && !envelope.is_empty() {
            let n = envelope.len() as f32;
            let mid = rect.center().y;
            let half = rect.height() * 0.45;
            for (i, peak) in envelope.peaks.iter().enumerate() {
                let x = rect.left() + (i as f32 + 0.5) / n * rect.width();
                let h = (peak * half).max(0.5);
                painter.line_segment(
                    [egui::pos2(x, mid - h), egui::pos2(x, mid + h)],
                    Stroke::new(1.0, WAVE),
                );
            }
        } else {
            painter.line_segment(
                [
                    egui::pos2(rect.left(), rect.center().y),
                    egui::pos2(rect.right(), rect.center().y),
                ],
                Stroke::new(1.0, Color32::from_rgb(45, 45, 50)),
            );
        }

        if let Some(t) = markers.start() {
            vline(x_of(t), START_COL, 2.0);
        }
        if let Some(t) = markers.end() {
            vline(x_of(t), END_COL, 2.0);
        }
        if let Some(t) = markers.clicked_time() {
            vline(x_of(t), CLICK_COL, 1.0);
        }
        vline(x_of(self.session.playback().current_time), Color32::WHITE, 1.5);

        if let Some(pos) = resp.interact_pointer_pos() {
            if resp.clicked() || resp.dragged() {
                let frac = ((pos.x - rect.left()) / rect.width().max(1.0)).clamp(0.0, 1.0);
                let t = frac as f64 * duration;
                self.session.set_clicked_time(t);
                if resp.clicked() {
                    self.session.seek(t);
                }
            }
        }
    }
}

fn format_time(secs: f64) -> String {
    let secs = secs.max(0.0);
    let m = (secs / 60.0).floor() as u64;
    let s = secs - (m as f64) * 60.0;
    format!("{m}:{s:05.2}")
}

impl eframe::App for AbWaveApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.session.update(Instant::now());
        self.handle_dropped_files(ctx);
        self.handle_shortcuts(ctx);

        egui::TopBottomPanel::top("transport").show(ctx, |ui| self.top_bar(ui));
        egui::CentralPanel::default().show(ctx, |ui| self.waveform(ui));

        if self.session.state() == PlayerState::Playing || self.session.is_loading() {
            ctx.request_repaint_after(self.session.tick_interval());
        } else if self.session.is_envelope_pending() {
            ctx.request_repaint_after(self.session.tick_interval() * 3);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::format_time;

    #[test]
    fn time_label_format() {
        assert_eq!(format_time(0.0), "0:00.00");
        assert_eq!(format_time(65.5), "1:05.50");
        assert_eq!(format_time(-3.0), "0:00.00");
    }
}
