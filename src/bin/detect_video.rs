//! detect_video - annotate video files with object detections.
//!
//! Resolves the input set (a file, a directory, or the configured input
//! directory), runs the configured detector over every frame sampled by
//! `video.frame_skip` and writes `detected_<stem>` copies with boxes and labels.

use anyhow::{Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use video_detect::config::DEFAULT_CONFIG_PATH;
use video_detect::{backend_from_config, resolve_inputs, DetectConfig, ErrorKind, VideoProcessor};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(
    name = "detect_video",
    version,
    about = "Run object detection over video files and write annotated copies"
)]
struct Args {
    /// Input video file or directory (defaults to video.input_path)
    #[arg(long, value_name = "PATH")]
    input: Option<PathBuf>,

    /// Output file for a single input, output directory for several
    #[arg(long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Detection confidence threshold, overrides the config file
    #[arg(long, value_name = "FLOAT")]
    confidence: Option<f32>,

    /// Config file (TOML, or JSON with a .json extension)
    #[arg(long, env = "DETECT_CONFIG", default_value = DEFAULT_CONFIG_PATH, value_name = "PATH")]
    config: PathBuf,

    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = ui::Ui::from_args(Some(&args.ui), is_tty, !stdout_is_tty);

    let config = {
        let _stage = ui.stage("Load configuration");
        let mut config = DetectConfig::load(&args.config)
            .with_context(|| format!("loading {}", args.config.display()))?;
        if let Some(confidence) = args.confidence {
            config = config.with_confidence(confidence)?;
        }
        Arc::new(config)
    };

    let detector = {
        let _stage = ui.stage("Load detector");
        backend_from_config(&config)?
    };

    let inputs = match resolve_inputs(args.input.as_deref(), &config.video.input_path) {
        Ok(inputs) => inputs,
        Err(err) if err.kind() == ErrorKind::InputResolution => {
            println!("{err}");
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    };

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = Arc::clone(&cancel);
        ctrlc::set_handler(move || {
            log::warn!("interrupt received, stopping after the current frame");
            cancel.store(true, Ordering::SeqCst);
        })
        .context("error setting Ctrl-C handler")?;
    }

    print_banner("OBJECT DETECTION");
    println!("Device:     {}", config.device);
    println!("Model:      {}", config.detection.model.display());
    println!("Confidence: {}", config.detection.confidence);
    println!("Frame skip: {}", config.video.frame_skip);
    println!("Videos:     {}", inputs.len());

    let mut processor = VideoProcessor::new(Arc::clone(&config), detector).with_cancel_flag(cancel);
    let mut progress = ui.frame_progress();
    let report = processor.process_batch(&inputs, args.output.as_deref(), &mut progress);

    print_banner("Detection completed!");
    println!(
        "Processed {} of {} video(s)",
        report.succeeded.len(),
        inputs.len()
    );
    for (path, err) in &report.failed {
        println!("Failed: {} ({})", path.display(), err);
    }
    if report.interrupted() {
        log::warn!("run interrupted; partial output left on disk");
    }
    Ok(())
}

fn print_banner(title: &str) {
    println!("\n{}", "=".repeat(50));
    println!("{title}");
    println!("{}", "=".repeat(50));
}
