//! Minimap Navigator
//!
//! Command line front end: runs the navigation loop, reads coordinates and
//! manages step icons.

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use image::GrayImage;
use tracing::{error, info, warn};

use minimap_navigator::capture::{ScreenCaptureBackend, ScreenRegion};
use minimap_navigator::navigation::{
    load_config, platform_input, save_config, Collaborators, IconService, LoopMode,
    NavigationConfig, Navigator, TracingSink,
};
use minimap_navigator::ocr::{locate_tesseract, OcrEngine, OcrRequest, TesseractEngine};
use minimap_navigator::{logging, paths, Coordinate};

/// How long `run` waits for the worker after Enter.
const STOP_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Parser, Debug)]
#[command(
    name = "minimap-navigator",
    version,
    about = "Clicks through minimap waypoints and verifies arrival by reading coordinates"
)]
struct Cli {
    /// Config file (default: config.json next to the executable)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start navigating; press Enter to stop
    Run(RunArgs),
    /// Capture the coordinate region once and print the reading
    #[command(name = "read-coords")]
    ReadCoords(ReadCoordsArgs),
    /// Detect a step icon on the minimap once
    Locate {
        step_id: u32,
    },
    /// Capture a screen rectangle as a step's icon and save the config
    #[command(name = "capture-icon")]
    CaptureIcon(CaptureIconArgs),
    /// Delete icon files no step refers to
    #[command(name = "cleanup-icons")]
    CleanupIcons,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Stop after one successful pass
    #[arg(long)]
    single_pass: bool,
}

#[derive(Args, Debug)]
struct ReadCoordsArgs {
    /// Expected position as X,Y,Z; enables the fuzzy fallback
    #[arg(long, value_parser = parse_coordinate)]
    expected: Option<Coordinate>,
}

#[derive(Args, Debug)]
struct CaptureIconArgs {
    step_id: u32,
    x1: i32,
    y1: i32,
    x2: i32,
    y2: i32,
}

/// Stands in when no Tesseract install was found, so navigation without
/// validation still works.
struct MissingTesseract(String);

impl OcrEngine for MissingTesseract {
    fn recognize(&self, _img: &GrayImage, _request: &OcrRequest) -> Result<String> {
        Err(anyhow!("Tesseract is not available: {}", self.0))
    }
}

fn main() {
    if let Err(err) = run() {
        error!("{:#}", err);
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    paths::ensure_directories().context("Failed to create output directories")?;
    let _guard = logging::init(&paths::get_logs_dir(), "info");

    let config_path = cli.config.unwrap_or_else(paths::get_config_path);
    let config = load_config(&config_path);

    match cli.command {
        Commands::Run(args) => command_run(config, args),
        Commands::ReadCoords(args) => command_read_coords(config, args),
        Commands::Locate { step_id } => command_locate(config, step_id),
        Commands::CaptureIcon(args) => command_capture_icon(config, &config_path, args),
        Commands::CleanupIcons => command_cleanup_icons(config),
    }
}

fn build_navigator(config: NavigationConfig) -> Result<Navigator> {
    let ocr: Arc<dyn OcrEngine> = match locate_tesseract(config.ocr.tesseract_path.as_deref()) {
        Ok(tesseract) => Arc::new(TesseractEngine::new(tesseract)),
        Err(e) => {
            warn!("Coordinate OCR unavailable: {:#}", e);
            Arc::new(MissingTesseract(format!("{:#}", e)))
        }
    };

    let collaborators = Collaborators {
        capture: Arc::new(ScreenCaptureBackend::new()),
        input: platform_input(),
        ocr,
        events: Arc::new(TracingSink),
    };
    Navigator::new(config, collaborators, IconService::new(paths::get_icons_dir()))
}

fn command_run(mut config: NavigationConfig, args: RunArgs) -> Result<()> {
    if args.single_pass {
        config.loop_mode = LoopMode::SinglePass;
    }
    let navigator = build_navigator(config)?;
    navigator.start()?;
    println!("Navigating. Press Enter to stop.");

    let (enter_tx, enter_rx) = mpsc::channel();
    thread::spawn(move || {
        let mut line = String::new();
        if matches!(std::io::stdin().lock().read_line(&mut line), Ok(n) if n > 0) {
            let _ = enter_tx.send(());
        }
    });

    while navigator.is_navigating() {
        match enter_rx.recv_timeout(Duration::from_millis(200)) {
            Ok(()) => break,
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            // stdin closed, run until the navigator ends on its own
            Err(mpsc::RecvTimeoutError::Disconnected) => navigator.wait(),
        }
    }

    if navigator.is_navigating() {
        info!("Stopping navigation...");
        if !navigator.stop(STOP_TIMEOUT) {
            return Err(anyhow!("Navigation thread did not stop in time"));
        }
    }
    println!("Navigation stopped");
    Ok(())
}

fn command_read_coords(config: NavigationConfig, args: ReadCoordsArgs) -> Result<()> {
    let navigator = build_navigator(config)?;
    match navigator.read_coordinates(args.expected.as_ref())? {
        Some(reading) => println!("{} (strategy: {})", reading.coordinate, reading.strategy),
        None => println!("No coordinate could be read"),
    }
    Ok(())
}

fn command_locate(config: NavigationConfig, step_id: u32) -> Result<()> {
    let navigator = build_navigator(config)?;
    println!("{}", navigator.preview(step_id)?);
    Ok(())
}

fn command_capture_icon(
    config: NavigationConfig,
    config_path: &Path,
    args: CaptureIconArgs,
) -> Result<()> {
    let navigator = build_navigator(config)?;
    let region = ScreenRegion::new(args.x1, args.y1, args.x2, args.y2);
    let path = navigator.capture_icon(args.step_id, &region)?;
    save_config(&navigator.to_config(), config_path)?;
    println!("Saved icon for step {} to {}", args.step_id, path.display());
    Ok(())
}

fn command_cleanup_icons(config: NavigationConfig) -> Result<()> {
    let navigator = build_navigator(config)?;
    let removed = navigator.cleanup_unused_icons()?;
    for path in &removed {
        println!("Removed {}", path.display());
    }
    println!("{} unused icon(s) removed", removed.len());
    Ok(())
}

fn parse_coordinate(s: &str) -> Result<Coordinate, String> {
    let parts = s
        .split(',')
        .map(|p| p.trim().parse::<i32>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("invalid coordinate '{}': {}", s, e))?;
    match parts[..] {
        [x, y, z] => Ok(Coordinate::new(x, y, z)),
        _ => Err(format!("expected X,Y,Z but got '{}'", s)),
    }
}
