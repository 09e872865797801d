// ============================================================================
// FastBlur CLI — headless batch blurring via command-line arguments
// ============================================================================
//
// Usage examples:
//   fastblur --input photo.png --radius 10 --output blurred.png
//   fastblur -i photo.jpg -r 5 -r 12 --output-dir out/
//   fastblur -i "shots/*.png" -r 8 --size 400x300 --output-dir processed/
//
// No GUI is opened in CLI mode. Blurring runs synchronously on the current
// thread through a BlurWorker, so several radii against the same input pay
// the downscale cost only once.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use image::RgbaImage;

use fastblur::{Bitmap, BlurWorker, PixelSize};

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// FastBlur headless image blurrer.
///
/// Blur image files at one or more radii without opening the GUI.
#[derive(Parser, Debug)]
#[command(
    name = "fastblur",
    about = "FastBlur headless batch blurrer",
    long_about = "Blur image files at one or more radii without opening the GUI.\n\
                  Several radii against the same input share one scaled source.\n\n\
                  Example:\n  \
                  fastblur --input photo.png --radius 10 --output blurred.png\n  \
                  fastblur -i \"shots/*.jpg\" -r 5 -r 12 --size 400x300 --output-dir out/"
)]
pub struct CliArgs {
    /// Input file(s). Glob patterns accepted (e.g. "*.png", "shots/*.jpg").
    #[arg(short, long, required = true, num_args = 1..)]
    pub input: Vec<String>,

    /// Blur radius. May be given several times to render a radius sweep;
    /// the expensive downscale runs once per input, not once per radius.
    #[arg(short, long, num_args = 1.., default_values_t = [10.0])]
    pub radius: Vec<f32>,

    /// Target render size in pixels as WxH (e.g. 400x300). The source is
    /// downscaled to cover this size before blurring. Defaults to the
    /// input's own dimensions (no downscale).
    #[arg(short, long, value_name = "WxH")]
    pub size: Option<String>,

    /// Output file path. Only valid for a single input and a single radius.
    /// For batch runs use --output-dir instead.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output directory for batch runs. Files are written as
    /// "<stem>_r<radius>.<ext>" with the input's stem.
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Print per-file timing information.
    #[arg(short, long)]
    pub verbose: bool,
}

impl CliArgs {
    /// Returns `true` when any CLI-mode flag is present in the real process
    /// arguments. Used by `main()` to route before creating a window.
    pub fn is_cli_mode() -> bool {
        std::env::args().any(|a| a == "--input" || a == "-i")
    }
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run all CLI processing and return an OS exit code.
/// `0` = all files succeeded, `1` = one or more files failed.
pub fn run(args: CliArgs) -> i32 {
    let inputs = resolve_inputs(&args.input);
    if inputs.is_empty() {
        eprintln!("error: no input files matched the given pattern(s).");
        return 1;
    }

    // A single explicit output path cannot serve a batch.
    let variants = inputs.len() * args.radius.len();
    if variants > 1 && args.output.is_some() && args.output_dir.is_none() {
        eprintln!(
            "error: {} output images would be produced but --output names a single file.\n\
             Use --output-dir to specify a destination directory.",
            variants
        );
        return 1;
    }

    let size = match args.size.as_deref().map(parse_size).transpose() {
        Ok(size) => size,
        Err(e) => {
            eprintln!("error: {}", e);
            return 1;
        }
    };

    if let Some(dir) = &args.output_dir {
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!("error: could not create output directory '{}': {}", dir.display(), e);
            return 1;
        }
    }

    let total = inputs.len();
    let multi = total > 1;
    let mut any_failure = false;

    for (idx, input_path) in inputs.iter().enumerate() {
        if multi || args.verbose {
            println!("[{}/{}] {}", idx + 1, total, input_path.display());
        }

        let file_start = Instant::now();
        match run_one(input_path, &args, size) {
            Ok(outputs) => {
                if args.verbose || multi {
                    for out in &outputs {
                        println!("  → {}", out.display());
                    }
                    println!("  ({:.0}ms)", file_start.elapsed().as_secs_f64() * 1000.0);
                }
            }
            Err(e) => {
                eprintln!("  error: {}", e);
                any_failure = true;
            }
        }
    }

    if any_failure { 1 } else { 0 }
}

// ============================================================================
// Per-file processing pipeline
// ============================================================================

fn run_one(
    input: &Path,
    args: &CliArgs,
    size: Option<PixelSize>,
) -> Result<Vec<PathBuf>, String> {
    // -- Step 1: Load ----------------------------------------------------
    let decoded = image::open(input)
        .map_err(|e| format!("load failed: {}", e))?
        .into_rgba8();
    let source = Arc::new(Bitmap::new(decoded));
    let target = size.unwrap_or_else(|| PixelSize::new(source.width(), source.height()));

    // One worker per input: the radius sweep reuses its scaled source.
    let worker = BlurWorker::new(Arc::clone(&source));

    // -- Step 2: Blur and save every radius ------------------------------
    let mut written = Vec::new();
    for &radius in &args.radius {
        let blurred = worker.blur(radius, target);
        let out_path = build_output_path(
            input,
            radius,
            args.output.as_deref(),
            args.output_dir.as_deref(),
        )
        .ok_or_else(|| format!("cannot determine output path for '{}'", input.display()))?;

        write_image(blurred.pixels(), &out_path)
            .map_err(|e| format!("save failed for '{}': {}", out_path.display(), e))?;
        written.push(out_path);
    }

    Ok(written)
}

/// Encode and write. JPEG cannot carry an alpha channel, so those outputs
/// are flattened to RGB first.
fn write_image(pixels: &RgbaImage, path: &Path) -> Result<(), String> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    if ext == "jpg" || ext == "jpeg" {
        let rgb = image::DynamicImage::ImageRgba8(pixels.clone()).into_rgb8();
        rgb.save(path).map_err(|e| e.to_string())
    } else {
        pixels.save(path).map_err(|e| e.to_string())
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Expand glob patterns and literal paths into a deduplicated, ordered list.
fn resolve_inputs(patterns: &[String]) -> Vec<PathBuf> {
    let mut result: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        let as_path = Path::new(pattern);

        if as_path.exists() {
            if !result.iter().any(|p| p.as_path() == as_path) {
                result.push(as_path.to_path_buf());
            }
            continue;
        }

        match glob::glob(pattern) {
            Ok(entries) => {
                let mut matched = false;
                for entry in entries.flatten() {
                    if !result.contains(&entry) {
                        result.push(entry);
                    }
                    matched = true;
                }
                if !matched {
                    eprintln!("warning: pattern '{}' matched no files.", pattern);
                }
            }
            Err(e) => {
                eprintln!("warning: invalid glob '{}': {}", pattern, e);
            }
        }
    }

    result
}

/// Parse a "WxH" size argument.
fn parse_size(value: &str) -> Result<PixelSize, String> {
    let (w, h) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("invalid --size '{}': expected WxH, e.g. 400x300", value))?;
    let width: u32 = w
        .trim()
        .parse()
        .map_err(|_| format!("invalid --size width '{}'", w))?;
    let height: u32 = h
        .trim()
        .parse()
        .map_err(|_| format!("invalid --size height '{}'", h))?;
    if width == 0 || height == 0 {
        return Err(format!("--size must be non-zero, got {}x{}", width, height));
    }
    Ok(PixelSize::new(width, height))
}

/// Compute the output path for one input/radius pair.
///
/// Priority:
/// 1. `--output` (explicit path, single-variant runs only)
/// 2. `--output-dir` (derives "<stem>_r<radius>.<ext>")
/// 3. Fallback: next to the input with the "_r<radius>" stem suffix
fn build_output_path(
    input: &Path,
    radius: f32,
    output: Option<&Path>,
    output_dir: Option<&Path>,
) -> Option<PathBuf> {
    if let Some(out) = output {
        if output_dir.is_none() {
            return Some(out.to_path_buf());
        }
    }

    let stem = input.file_stem()?.to_string_lossy().into_owned();
    // Keep the input's format when we can encode it; everything else
    // (e.g. webp, which the image crate only decodes) falls back to PNG.
    let ext = match input
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .as_deref()
    {
        Some(ext @ ("png" | "jpg" | "jpeg" | "bmp")) => ext.to_string(),
        _ => "png".to_string(),
    };
    let name = format!("{}_r{}.{}", stem, radius, ext);

    if let Some(dir) = output_dir {
        return Some(dir.join(name));
    }

    let parent = input.parent().unwrap_or(Path::new("."));
    Some(parent.join(name))
}
