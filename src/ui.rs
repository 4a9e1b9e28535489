use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::path::Path;
use std::time::{Duration, Instant};

use video_detect::{Error, ProcessSummary, ProgressObserver, VideoProperties};

/// Frames between plain-mode reports when the container gives no frame count.
const UNBOUNDED_REPORT_EVERY: u64 = 250;

#[derive(Clone, Copy, Debug)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

#[derive(Clone, Debug)]
pub struct Ui {
    mode: UiMode,
    is_tty: bool,
    disable_pretty: bool,
}

impl Ui {
    pub fn new(mode: UiMode, is_tty: bool, disable_pretty: bool) -> Self {
        Self {
            mode,
            is_tty,
            disable_pretty,
        }
    }

    pub fn from_args(ui_flag: Option<&str>, is_tty: bool, disable_pretty: bool) -> Self {
        let mode = match ui_flag {
            Some("plain") => UiMode::Plain,
            Some("pretty") => UiMode::Pretty,
            _ => UiMode::Auto,
        };
        Self::new(mode, is_tty, disable_pretty)
    }

    fn use_pretty(&self) -> bool {
        self.is_tty
            && match self.mode {
                UiMode::Pretty => true,
                UiMode::Auto => !self.disable_pretty,
                UiMode::Plain => false,
            }
    }

    pub fn stage(&self, name: &str) -> StageGuard {
        if self.use_pretty() {
            let spinner = ProgressBar::new_spinner();
            spinner.set_draw_target(ProgressDrawTarget::stderr());
            spinner.enable_steady_tick(Duration::from_millis(120));
            let style = ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            spinner.set_style(style);
            spinner.set_message(format!("{name}…"));
            StageGuard::new(name.to_string(), Some(spinner))
        } else {
            eprintln!("==> {}", name);
            StageGuard::new(name.to_string(), None)
        }
    }

    /// Per-file frame progress plus the console summary.
    pub fn frame_progress(&self) -> FrameProgress {
        FrameProgress {
            pretty: self.use_pretty(),
            bar: None,
            total: 0,
            next_decile: 1,
            started: Instant::now(),
        }
    }
}

pub struct StageGuard {
    name: String,
    start: Instant,
    spinner: Option<ProgressBar>,
}

impl StageGuard {
    fn new(name: String, spinner: Option<ProgressBar>) -> Self {
        Self {
            name,
            start: Instant::now(),
            spinner,
        }
    }
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        let message = format!("✔ {} ({})", self.name, format_duration(elapsed));
        if let Some(spinner) = &self.spinner {
            spinner.finish_with_message(message);
        } else {
            eprintln!("{message}");
        }
    }
}

/// Bounded bar when the frame count is known, spinner counter otherwise.
/// Plain mode prints roughly every 10% instead of drawing.
pub struct FrameProgress {
    pretty: bool,
    bar: Option<ProgressBar>,
    total: u64,
    next_decile: u64,
    started: Instant,
}

impl FrameProgress {
    fn new_bar(&self, label: &str) -> ProgressBar {
        let (bar, template) = if self.total > 0 {
            (
                ProgressBar::new(self.total),
                "{msg} [{bar:40}] {pos}/{len} frames ({elapsed_precise}, eta {eta})",
            )
        } else {
            (
                ProgressBar::new_spinner(),
                "{spinner} {msg} {pos} frames ({elapsed_precise})",
            )
        };
        bar.set_draw_target(ProgressDrawTarget::stderr());
        let style = ProgressStyle::with_template(template)
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);
        bar.set_message(label.to_string());
        if self.total == 0 {
            bar.enable_steady_tick(Duration::from_millis(120));
        }
        bar
    }
}

impl ProgressObserver for FrameProgress {
    fn on_start(&mut self, input: &Path, _output: &Path, properties: &VideoProperties) {
        self.total = properties.frame_count;
        self.next_decile = 1;
        self.started = Instant::now();
        let label = display_name(input);
        if self.pretty {
            self.bar = Some(self.new_bar(&label));
        } else if self.total > 0 {
            eprintln!("==> Processing {} ({} frames)", label, self.total);
        } else {
            eprintln!("==> Processing {} (frame count unknown)", label);
        }
    }

    fn on_frame(&mut self, index: u64, _annotated: bool, _detections: usize) {
        let done = index + 1;
        if let Some(bar) = &self.bar {
            bar.set_position(done);
            return;
        }
        if self.total > 0 {
            while self.next_decile <= 10 && done * 10 >= self.next_decile * self.total {
                eprintln!("    {:>3}% ({}/{})", self.next_decile * 10, done, self.total);
                self.next_decile += 1;
            }
        } else if done % UNBOUNDED_REPORT_EVERY == 0 {
            eprintln!("    {} frames", done);
        }
    }

    fn on_finish(&mut self, summary: &ProcessSummary) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
        let props = &summary.properties;
        println!("\n{}", "=".repeat(50));
        println!("PROCESSING SUMMARY");
        println!("{}", "=".repeat(50));
        println!("Input:      {}", summary.input.display());
        println!("Output:     {}", summary.output.display());
        println!("Resolution: {}x{}", props.width, props.height);
        println!("FPS:        {}", props.frame_rate);
        println!("Frames:     {}", summary.frames_written);
        println!("Annotated:  {}", summary.frames_annotated);
        println!("Detections: {}", summary.detections);
        println!("Elapsed:    {}", format_duration(self.started.elapsed()));
        println!("{}", "=".repeat(50));
    }

    fn on_error(&mut self, input: &Path, error: &Error) {
        if let Some(bar) = self.bar.take() {
            bar.abandon();
        }
        eprintln!("Error processing {}: {}", input.display(), error);
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}
