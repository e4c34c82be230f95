//! pagescan - Main entry point
//!
//! Captures an on-screen reader page by page and transcribes the captured
//! frames into one ordered text file.

use pagescan::{
    windows, ArrowKeyAdvancer, CaptureSession, Config, FrameStore, HashAlgorithm, Mode,
    PageDirection, PerceptualDetector, PipelineController, Region, ScreenFrameSource,
    SessionOptions, TargetSelector, TranscriptionJob, VisionOcr,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Command-line arguments, applied on top of the config file
#[derive(Debug, Default)]
struct CliArgs {
    config_path: Option<PathBuf>,
    list_windows: bool,
    window_id: Option<u32>,
    app_name: Option<String>,
    region: Option<String>,
    pages: Option<u32>,
    delay: Option<f64>,
    countdown: Option<u64>,
    direction: Option<PageDirection>,
    crop_top: Option<u32>,
    crop_bottom: Option<u32>,
    languages: Option<Vec<String>>,
    invert: bool,
    output: Option<PathBuf>,
    frames_dir: Option<PathBuf>,
    skip_ocr: bool,
    ocr_only: bool,
}

/// Parse command line arguments
fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut cli = CliArgs::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-v" => {
                println!("pagescan v{}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--list-windows" => {
                cli.list_windows = true;
            }
            "--app" => {
                i += 1;
                if i < args.len() {
                    cli.app_name = Some(args[i].clone());
                }
            }
            "--window-id" => {
                i += 1;
                if i < args.len() {
                    cli.window_id = args[i].parse().ok();
                    if cli.window_id.is_none() {
                        eprintln!("Invalid window id: {}", args[i]);
                        std::process::exit(1);
                    }
                }
            }
            "--region" => {
                i += 1;
                if i < args.len() {
                    cli.region = Some(args[i].clone());
                }
            }
            "--pages" => {
                i += 1;
                if i < args.len() {
                    cli.pages = args[i].parse().ok();
                    if cli.pages.is_none() {
                        eprintln!("Invalid page count: {}", args[i]);
                        std::process::exit(1);
                    }
                }
            }
            "--delay" => {
                i += 1;
                if i < args.len() {
                    cli.delay = args[i].parse().ok();
                }
            }
            "--countdown" => {
                i += 1;
                if i < args.len() {
                    cli.countdown = args[i].parse().ok();
                }
            }
            "--direction" => {
                i += 1;
                if i < args.len() {
                    cli.direction = PageDirection::parse(&args[i]);
                    if cli.direction.is_none() {
                        eprintln!("Direction must be 'left' or 'right', got: {}", args[i]);
                        std::process::exit(1);
                    }
                }
            }
            "--crop-top" => {
                i += 1;
                if i < args.len() {
                    cli.crop_top = args[i].parse().ok();
                }
            }
            "--crop-bottom" => {
                i += 1;
                if i < args.len() {
                    cli.crop_bottom = args[i].parse().ok();
                }
            }
            "--lang" => {
                i += 1;
                if i < args.len() {
                    cli.languages =
                        Some(args[i].split(',').map(|s| s.trim().to_string()).collect());
                }
            }
            "--invert" => {
                cli.invert = true;
            }
            "--output" | "-o" => {
                i += 1;
                if i < args.len() {
                    cli.output = Some(PathBuf::from(&args[i]));
                }
            }
            "--dir" => {
                i += 1;
                if i < args.len() {
                    cli.frames_dir = Some(PathBuf::from(&args[i]));
                }
            }
            "--skip-ocr" => {
                cli.skip_ocr = true;
            }
            "--ocr-only" => {
                cli.ocr_only = true;
            }
            "--config" | "-c" => {
                i += 1;
                if i < args.len() {
                    cli.config_path = Some(PathBuf::from(&args[i]));
                }
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                eprintln!("Use --help for usage information.");
                std::process::exit(1);
            }
        }
        i += 1;
    }

    cli
}

fn print_help() {
    println!(
        r#"pagescan - Automated page capture and OCR for on-screen e-book readers

USAGE:
    pagescan [OPTIONS]

TARGET:
    --list-windows          List capture-eligible windows and exit
    --app <NAME>            Target the first window whose app name contains NAME
    --window-id <ID>        Target an explicit window id (see --list-windows)
    --region <X,Y,W,H>      Capture a fixed screen region instead of the window

CAPTURE:
    --pages <N>             Capture exactly N pages (default: auto-stop when
                            page-turning stops changing the screen)
    --delay <SECS>          Settling delay between page turns (default: 1.5)
    --countdown <SECS>      Pre-start countdown (default: 5)
    --direction <DIR>       Page-turn key: left (vertical Japanese text) or
                            right (horizontal text) (default: left)
    --crop-top <PX>         Crop pixels from the top of every frame
    --crop-bottom <PX>      Crop pixels from the bottom of every frame

OCR:
    --lang <LANGS>          Comma-separated language hints (default: ja,en)
    --invert                Also try a dark-mode-inverted pass per page

MODES:
    --skip-ocr              Capture only; transcribe later with --ocr-only
    --ocr-only              Transcribe an existing frames directory

OUTPUT:
    -o, --output <PATH>     Output text file (default: output.txt)
    --dir <PATH>            Frames directory (default: screenshots/)

OTHER:
    -c, --config <PATH>     Path to configuration file
    -h, --help              Show this help message
    -v, --version           Show version

PERMISSIONS REQUIRED:
    - Screen Recording: System Settings > Privacy & Security > Screen Recording
    - Accessibility:    System Settings > Privacy & Security > Accessibility

EXAMPLES:
    pagescan --list-windows                      # Pick a target
    pagescan --app Safari                        # Whole book, auto-stop
    pagescan --app Kindle --pages 100            # Exactly 100 pages
    pagescan --app Kindle --skip-ocr             # Capture now, OCR later
    pagescan --ocr-only --dir screenshots        # OCR a previous capture
    pagescan --app Safari --region 200,100,1200,800
"#
    );
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = parse_args();

    if cli.list_windows {
        let windows = windows::list_windows();
        if windows.is_empty() {
            println!("No capture-eligible windows found.");
        }
        for w in &windows {
            println!(
                "{:>8}  pid {:>6}  {:>5}x{:<5}  {}",
                w.id, w.pid, w.bounds.width, w.bounds.height,
                w.label()
            );
        }
        return Ok(());
    }

    let mut config = match &cli.config_path {
        Some(path) => Config::load_from_path(path.clone()),
        None => Config::load(),
    };

    // CLI flags override config-file values
    if cli.pages.is_some() {
        config.capture.pages = cli.pages;
    }
    if let Some(delay) = cli.delay {
        config.capture.delay_seconds = delay;
    }
    if let Some(countdown) = cli.countdown {
        config.capture.countdown_seconds = countdown;
    }
    if let Some(direction) = cli.direction {
        config.capture.direction = direction;
    }
    if let Some(crop_top) = cli.crop_top {
        config.capture.crop_top = crop_top;
    }
    if let Some(crop_bottom) = cli.crop_bottom {
        config.capture.crop_bottom = crop_bottom;
    }
    if let Some(languages) = cli.languages.clone() {
        config.ocr.languages = languages;
    }
    if cli.invert {
        config.ocr.invert_fallback = true;
    }
    if let Some(output) = cli.output.clone() {
        config.output.text_path = output;
    }
    if let Some(dir) = cli.frames_dir.clone() {
        config.output.frames_dir = dir;
    }

    let mode = if cli.ocr_only {
        Mode::OcrOnly
    } else if cli.skip_ocr {
        Mode::CaptureOnly
    } else {
        Mode::Full
    };

    let store = FrameStore::open(&config.output.frames_dir)?;

    let engine = match &config.ocr.binary_path {
        Some(path) => VisionOcr::with_path(PathBuf::from(path), config.ocr.invert_fallback),
        None => VisionOcr::new(config.ocr.invert_fallback),
    };
    let job = TranscriptionJob::new(engine, config.ocr.languages.clone(), config.ocr.parallelism);

    let session = if mode == Mode::OcrOnly {
        None
    } else {
        let selector = if let Some(id) = cli.window_id {
            TargetSelector::WindowId(id)
        } else if let Some(name) = cli.app_name.clone() {
            TargetSelector::AppName(name)
        } else {
            eprintln!("Select a target with --app or --window-id (see --list-windows).");
            std::process::exit(1);
        };

        let region = match &cli.region {
            Some(raw) => Some(Region::parse(raw)?),
            None => None,
        };
        let target = windows::resolve_target(&selector, region)?;
        info!(
            "Target: {} (window {}, pid {})",
            target.app_name, target.window_id, target.pid
        );

        // Leftover frames from a previous run would break index contiguity
        store.clear()?;

        let algorithm = HashAlgorithm::parse(&config.detector.hash_algorithm).unwrap_or_else(|| {
            warn!(
                "Unknown hash algorithm '{}', using mean",
                config.detector.hash_algorithm
            );
            HashAlgorithm::Mean
        });
        let detector = PerceptualDetector::new(algorithm, config.detector.hash_threshold);

        let abort = Arc::new(AtomicBool::new(false));
        let flag = abort.clone();
        ctrlc::set_handler(move || {
            eprintln!("\nStop requested; finishing the current page...");
            flag.store(true, Ordering::SeqCst);
        })?;

        let options = SessionOptions {
            pages: config.capture.pages,
            delay: Duration::from_secs_f64(config.capture.delay_seconds.max(0.0)),
            countdown_seconds: config.capture.countdown_seconds,
            crop_top: config.capture.crop_top,
            crop_bottom: config.capture.crop_bottom,
            max_duplicate_run: config.detector.max_duplicate_run.max(1),
        };

        Some(CaptureSession::new(
            ScreenFrameSource::new(),
            ArrowKeyAdvancer::new(config.capture.direction),
            detector,
            store.clone(),
            target,
            options,
            abort,
        ))
    };

    let controller = PipelineController::new(
        mode,
        session,
        job,
        store,
        config.output.text_path.clone(),
    );
    let report = controller.run().await?;

    if let Some(pages) = report.pages_captured {
        info!("Captured {} pages to {:?}", pages, config.output.frames_dir);
    }
    if let (Some(pages), Some(output)) = (report.pages_transcribed, &report.output) {
        info!("Transcribed {} pages to {:?}", pages, output);
    }

    Ok(())
}
