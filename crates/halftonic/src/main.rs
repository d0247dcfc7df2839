//! halftonic: apply an effect stack to an image file and export the result.
//!
//! Decodes the image, optionally fits it inside `--max-size`, runs the
//! enabled stages in the requested order and prints per-stage
//! diagnostics. The final canvas can be written as PNG and as SVG; the
//! SVG reuses the exact dots or cells the raster render drew.
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin halftonic -- [OPTIONS] <IMAGE_PATH>
//! halftonic photo.jpg --enable halftone --svg out.svg --png out.png
//! halftonic photo.jpg --settings look.json --order halftone,glitch --runs 5
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use clap::{ArgAction, Parser, ValueEnum};
use halftonic_export::{ExportRequest, SvgMetadata, encode_png, to_svg};
use halftonic_pipeline::diagnostics::{Clock, PipelineDiagnostics};
use halftonic_pipeline::{
    Dimensions, EffectSettings, EffectsOrder, RenderOutput, ResampleFilter, RgbaImage, StageId,
    decode_rgba, fit_to_canvas, render_with_diagnostics,
};
use tracing_subscriber::EnvFilter;

/// Raster image effects with faithful SVG export.
///
/// Runs the effect pipeline on a given image and prints per-stage timing
/// and count diagnostics.
#[derive(Parser)]
#[command(name = "halftonic", version)]
struct Cli {
    /// Path to the input image (PNG, JPEG, BMP, WebP).
    image_path: PathBuf,

    /// Effect settings as a JSON file.
    #[arg(long, conflicts_with = "settings_json")]
    settings: Option<PathBuf>,

    /// Effect settings as a JSON string.
    #[arg(long)]
    settings_json: Option<String>,

    /// Comma-separated stage order. Unlisted stages keep their default
    /// relative order after the listed ones.
    #[arg(long)]
    order: Option<EffectsOrder>,

    /// Stages to switch on, comma-separated.
    #[arg(long, value_delimiter = ',')]
    enable: Vec<StageId>,

    /// Stages to switch off, comma-separated.
    #[arg(long, value_delimiter = ',')]
    disable: Vec<StageId>,

    /// Seed for every stochastic stage.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Fit the image inside a square of this many pixels before rendering.
    #[arg(long, value_parser = clap::builder::RangedU64ValueParser::<u32>::new().range(1..))]
    max_size: Option<u32>,

    /// Resampling filter used by `--max-size`.
    #[arg(long, value_enum, default_value_t = Filter::Triangle)]
    filter: Filter,

    /// Write the final canvas as PNG.
    #[arg(long)]
    png: Option<PathBuf>,

    /// Write the final canvas as SVG.
    #[arg(long)]
    svg: Option<PathBuf>,

    /// Number of runs for averaging.
    #[arg(
        long,
        default_value_t = 1,
        value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..)
    )]
    runs: usize,

    /// Output diagnostics as JSON instead of human-readable report.
    #[arg(long)]
    json: bool,

    /// More log output (`-v` debug, `-vv` trace). `RUST_LOG` wins.
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

/// Resampling filter selection.
#[derive(Clone, Copy, ValueEnum)]
enum Filter {
    /// Nearest-neighbor (fastest, blocky).
    Nearest,
    /// Bilinear interpolation (fast, decent quality).
    Triangle,
    /// Bicubic Catmull-Rom (moderate, good quality).
    CatmullRom,
    /// Gaussian (moderate, smooth).
    Gaussian,
    /// Lanczos with 3 lobes (slowest, sharpest).
    Lanczos3,
}

impl From<Filter> for ResampleFilter {
    fn from(filter: Filter) -> Self {
        match filter {
            Filter::Nearest => Self::Nearest,
            Filter::Triangle => Self::Triangle,
            Filter::CatmullRom => Self::CatmullRom,
            Filter::Gaussian => Self::Gaussian,
            Filter::Lanczos3 => Self::Lanczos3,
        }
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Build [`EffectSettings`] from CLI arguments.
///
/// Starts from `--settings` or `--settings-json` (defaults otherwise),
/// then applies `--enable` and `--disable`.
fn settings_from_cli(cli: &Cli) -> Result<EffectSettings, String> {
    let mut settings = if let Some(ref path) = cli.settings {
        let json = std::fs::read_to_string(path)
            .map_err(|e| format!("Error reading {}: {e}", path.display()))?;
        EffectSettings::from_json(&json)
            .map_err(|e| format!("Error parsing {}: {e}", path.display()))?
    } else if let Some(ref json) = cli.settings_json {
        EffectSettings::from_json(json).map_err(|e| format!("Error parsing --settings-json: {e}"))?
    } else {
        EffectSettings::default()
    };

    for &stage in &cli.enable {
        settings.set_enabled(stage, true);
    }
    for &stage in &cli.disable {
        settings.set_enabled(stage, false);
    }
    Ok(settings)
}

fn load_source(cli: &Cli) -> Result<RgbaImage, String> {
    let bytes = std::fs::read(&cli.image_path)
        .map_err(|e| format!("Error reading {}: {e}", cli.image_path.display()))?;
    eprintln!(
        "Image: {} ({} bytes)",
        cli.image_path.display(),
        bytes.len(),
    );
    let image = decode_rgba(&bytes).map_err(|e| format!("Error decoding image: {e}"))?;

    let Some(max) = cli.max_size else {
        return Ok(image);
    };
    let bounds = Dimensions {
        width: max,
        height: max,
    };
    let (fitted, resized) = fit_to_canvas(&image, bounds, cli.filter.into());
    if resized {
        tracing::info!(
            from = ?Dimensions::of(&image),
            to = ?Dimensions::of(&fitted),
            "image fitted to canvas"
        );
    }
    Ok(fitted)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let settings = match settings_from_cli(&cli) {
        Ok(s) => s,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };
    let order = cli.order.clone().unwrap_or_default();

    let source = match load_source(&cli) {
        Ok(image) => image,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let enabled = settings.enabled_stages(order.stages());
    eprintln!("Canvas: {}x{}", source.width(), source.height());
    eprintln!("Order: {order}");
    eprintln!(
        "Enabled: {}",
        if enabled.is_empty() {
            "(none)".to_owned()
        } else {
            enabled.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
        }
    );
    eprintln!("Seed: {}", cli.seed);
    eprintln!("Runs: {}", cli.runs);
    eprintln!();

    let mut all_diagnostics = Vec::with_capacity(cli.runs);

    for run in 0..cli.runs {
        if cli.runs > 1 {
            eprintln!("--- Run {}/{} ---", run + 1, cli.runs);
        }

        let (output, diagnostics) =
            render_with_diagnostics(&source, &settings, &order, cli.seed, &StdClock);

        if cli.json {
            match serde_json::to_string_pretty(&diagnostics) {
                Ok(json) => println!("{json}"),
                Err(e) => {
                    eprintln!("Error serializing diagnostics: {e}");
                    return ExitCode::FAILURE;
                }
            }
        } else {
            println!("{}", diagnostics.report());
        }

        // Write outputs on the first run only.
        if run == 0
            && let Err(msg) = write_outputs(&cli, &output, &settings)
        {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }

        all_diagnostics.push(diagnostics);

        if cli.runs > 1 {
            eprintln!();
        }
    }

    if cli.runs > 1 {
        print_multi_run_summary(&all_diagnostics);
    }

    ExitCode::SUCCESS
}

fn write_outputs(
    cli: &Cli,
    output: &RenderOutput,
    settings: &EffectSettings,
) -> Result<(), String> {
    if let Some(ref png_path) = cli.png {
        let png = encode_png(&output.image).map_err(|e| e.to_string())?;
        write_file(png_path, &png, "PNG")?;
    }

    if let Some(ref svg_path) = cli.svg {
        let title = cli
            .image_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("halftonic");
        let description = if output.applied.is_empty() {
            "no effects".to_owned()
        } else {
            output
                .applied
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" > ")
        };
        let created = utc_timestamp(SystemTime::now());
        let settings_json = settings.to_json();
        let request = ExportRequest::from_render(output, settings, cli.seed).with_metadata(
            SvgMetadata {
                title: Some(title),
                description: Some(&description),
                created: Some(&created),
                settings_json: Some(&settings_json),
            },
        );
        let svg = to_svg(&request).map_err(|e| e.to_string())?;
        eprintln!("SVG export: {} ({} shapes)", svg.mode, svg.primitives);
        write_file(svg_path, svg.document.as_bytes(), "SVG")?;
    }
    Ok(())
}

fn write_file(path: &Path, bytes: &[u8], kind: &str) -> Result<(), String> {
    std::fs::write(path, bytes)
        .map_err(|e| format!("Error writing {kind} to {}: {e}", path.display()))?;
    eprintln!(
        "{kind} written to {} ({} bytes)",
        path.display(),
        bytes.len(),
    );
    Ok(())
}

/// ISO 8601 UTC timestamp with second precision.
fn utc_timestamp(now: SystemTime) -> String {
    let secs = now.duration_since(UNIX_EPOCH).map_or(0, |d| d.as_secs());
    let days = i64::try_from(secs / 86_400).unwrap_or(0);
    let rem = secs % 86_400;
    let (year, month, day) = civil_from_days(days);
    format!(
        "{year:04}-{month:02}-{day:02}T{:02}:{:02}:{:02}Z",
        rem / 3600,
        rem % 3600 / 60,
        rem % 60,
    )
}

/// Gregorian date of a day count since 1970-01-01.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
const fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe + era * 400 + if month <= 2 { 1 } else { 0 };
    (year, month as u32, day as u32)
}

/// [`Clock`] implementation backed by [`std::time::Instant`].
struct StdClock;

impl Clock for StdClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn elapsed(&self, since: &Instant) -> Duration {
        since.elapsed()
    }
}

/// Print aggregated statistics across multiple runs.
#[allow(clippy::cast_precision_loss)]
fn print_multi_run_summary(all_diagnostics: &[PipelineDiagnostics]) {
    println!();
    println!(
        "Summary ({} runs)\n{}",
        all_diagnostics.len(),
        "=".repeat(60),
    );

    if all_diagnostics.is_empty() {
        println!("Warning: no diagnostics to summarize");
        return;
    }

    let durations: Vec<f64> = all_diagnostics
        .iter()
        .map(|d| d.total_duration.as_secs_f64() * 1000.0)
        .collect();

    let min = durations.iter().copied().reduce(f64::min).unwrap_or(0.0);
    let max = durations.iter().copied().reduce(f64::max).unwrap_or(0.0);
    let mean = durations.iter().sum::<f64>() / durations.len() as f64;

    println!("Total duration: min={min:.3}ms  mean={mean:.3}ms  max={max:.3}ms");

    println!();
    println!("{:<24} {:>12}", "Stage", "Mean (ms)");
    println!("{}", "-".repeat(40));

    for stage in StageId::ALL {
        let stage_durations: Vec<f64> = all_diagnostics
            .iter()
            .filter_map(|d| d.stage_duration(stage))
            .map(|dur| dur.as_secs_f64() * 1000.0)
            .collect();

        if stage_durations.is_empty() {
            continue;
        }

        let stage_mean = stage_durations.iter().sum::<f64>() / stage_durations.len() as f64;
        println!("{:<24} {stage_mean:>10.3}ms", stage.name());
    }
}
