// ============================================================================
// FastBlur demo app — an image view with a blur-radius slider
// ============================================================================
//
// Thin UI glue around the library: dragging the slider submits a task to the
// shared scheduler for this view's consumer id, and results come back over a
// channel onto the UI thread. Dragging fast floods the queue on purpose —
// the scheduler coalesces everything but the newest request.

use std::sync::{Arc, mpsc};

use eframe::egui;
use egui::{ColorImage, TextureHandle, TextureOptions};
use image::{Rgba, RgbaImage};

use fastblur::{Bitmap, BlurScheduler, BlurTask, BlurWorker, ConsumerId, PixelSize};

/// Slider range of the demo, in blur-radius units.
const MAX_BLUR_RADIUS: f32 = 17.0;

pub struct FastBlurApp {
    scheduler: BlurScheduler,
    worker: Arc<BlurWorker>,
    consumer: ConsumerId,
    radius: f32,

    /// Results arrive here from the scheduler's worker thread.
    results: mpsc::Receiver<Arc<Bitmap>>,
    results_tx: mpsc::Sender<Arc<Bitmap>>,

    texture: Option<TextureHandle>,
    /// On-screen size of the image area, in points; used as the blur target.
    view_size: egui::Vec2,
    status: String,
}

impl FastBlurApp {
    pub fn new(cc: &eframe::CreationContext<'_>) -> Self {
        let (results_tx, results) = mpsc::channel();
        let source = Arc::new(Bitmap::new(sample_image()));
        let mut app = Self {
            scheduler: BlurScheduler::new(),
            worker: Arc::new(BlurWorker::new(Arc::clone(&source))),
            consumer: ConsumerId::next(),
            radius: 0.0,
            results,
            results_tx,
            texture: None,
            view_size: egui::Vec2::ZERO,
            status: "built-in demo image".to_string(),
        };
        app.texture = Some(upload_texture(&cc.egui_ctx, &source));
        app
    }

    /// Swap in a new source image: show it sharp immediately and re-apply
    /// the current blur radius.
    fn set_source(&mut self, ctx: &egui::Context, pixels: RgbaImage, label: String) {
        let source = Arc::new(Bitmap::new(pixels));
        self.worker = Arc::new(BlurWorker::new(Arc::clone(&source)));
        self.texture = Some(upload_texture(ctx, &source));
        self.status = label;
        if self.radius > 0.0 {
            self.submit_blur(ctx);
        }
    }

    /// Submit a blur task for the current radius. Always fire-and-forget:
    /// the scheduler keeps only the newest pending request per consumer.
    fn submit_blur(&mut self, ctx: &egui::Context) {
        let target = if self.view_size == egui::Vec2::ZERO {
            // No layout yet — fall back to the full window size.
            let screen = ctx.screen_rect().size();
            PixelSize::from_points(screen.x, screen.y, ctx.pixels_per_point())
        } else {
            PixelSize::from_points(self.view_size.x, self.view_size.y, ctx.pixels_per_point())
        };

        let tx = self.results_tx.clone();
        let repaint = ctx.clone();
        self.scheduler.submit(BlurTask::for_worker(
            &self.worker,
            Some(self.consumer),
            target,
            self.radius,
            move |result| {
                if let Some(image) = result {
                    let _ = tx.send(image);
                }
                repaint.request_repaint();
            },
        ));
    }

    fn open_image(&mut self, ctx: &egui::Context) {
        let Some(path) = rfd::FileDialog::new()
            .add_filter("Images", &["png", "jpg", "jpeg", "webp", "bmp"])
            .pick_file()
        else {
            return;
        };
        match image::open(&path) {
            Ok(decoded) => {
                let label = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string());
                self.set_source(ctx, decoded.into_rgba8(), label);
            }
            Err(e) => {
                fastblur::log_err!("demo: could not open {}: {}", path.display(), e);
                self.status = format!("could not open {}: {}", path.display(), e);
            }
        }
    }
}

impl eframe::App for FastBlurApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // Drain everything the worker delivered since the last frame and
        // show only the newest image.
        let mut latest = None;
        while let Ok(image) = self.results.try_recv() {
            latest = Some(image);
        }
        if let Some(image) = latest {
            self.texture = Some(upload_texture(ctx, &image));
        }

        egui::TopBottomPanel::bottom("controls").show(ctx, |ui| {
            ui.add_space(4.0);
            ui.horizontal(|ui| {
                if ui.button("Open…").clicked() {
                    self.open_image(ctx);
                }
                let slider =
                    egui::Slider::new(&mut self.radius, 0.0..=MAX_BLUR_RADIUS).text("blur radius");
                if ui.add(slider).changed() {
                    self.submit_blur(ctx);
                }
                ui.label(&self.status);
            });
            ui.add_space(4.0);
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            self.view_size = ui.available_size();
            if let Some(texture) = &self.texture {
                ui.centered_and_justified(|ui| {
                    ui.add(
                        egui::Image::new((texture.id(), texture.size_vec2()))
                            .max_size(ui.available_size()),
                    );
                });
            }
        });
    }
}

/// Upload a bitmap as an egui texture.
fn upload_texture(ctx: &egui::Context, bitmap: &Bitmap) -> TextureHandle {
    let size = [bitmap.width() as usize, bitmap.height() as usize];
    let pixels = ColorImage::from_rgba_unmultiplied(size, bitmap.pixels().as_raw());
    ctx.load_texture("fastblur-view", pixels, TextureOptions::LINEAR)
}

/// Built-in source so the demo works without any file on disk: a color
/// gradient with sharp rings, which makes the blur radius easy to judge.
fn sample_image() -> RgbaImage {
    let (w, h) = (640u32, 480u32);
    RgbaImage::from_fn(w, h, |x, y| {
        let dx = x as f32 - w as f32 / 2.0;
        let dy = y as f32 - h as f32 / 2.0;
        let dist = (dx * dx + dy * dy).sqrt();
        if (dist / 40.0) as u32 % 2 == 0 {
            Rgba([250, 250, 250, 255])
        } else {
            let r = (x * 255 / w) as u8;
            let b = (y * 255 / h) as u8;
            Rgba([r, 60, b, 255])
        }
    })
}
