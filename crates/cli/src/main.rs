use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::PathBuf;
use std::process;
use std::time::{Duration, Instant};

use clap::Parser;

use facepose_core::session::tracker_config::TrackerConfig;
use facepose_core::session::tracking_session::TrackingSession;
use facepose_core::tracking::domain::capture_source::CameraSelector;
use facepose_core::tracking::domain::feature_subscriber::TrackingEvent;
use facepose_core::tracking::infrastructure::channel_subscriber::ChannelSubscriber;
use facepose_core::tracking::infrastructure::replay_landmark_detector::ReplayLandmarkDetector;
use facepose_core::tracking::infrastructure::timed_capture_source::TimedCaptureSource;

/// Streams head pose and eye openness from recorded face landmarks.
#[derive(Parser)]
#[command(name = "facepose")]
struct Cli {
    /// JSON-lines landmark recording: one face per line as [[x, y, z], ...],
    /// [] for no face, or {"error": "..."}.
    recording: PathBuf,

    /// Capture rate in frames per second.
    #[arg(long, default_value = "30")]
    fps: f64,

    /// Simulated detector latency in milliseconds.
    #[arg(long, default_value = "20")]
    latency_ms: u64,

    /// Stop after this many milliseconds (runs until interrupted if omitted).
    #[arg(long)]
    duration_ms: Option<u64>,

    /// Config file (defaults to the user config directory).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Report raw-position yaw instead of the front-camera mirrored value.
    #[arg(long)]
    no_mirror: bool,

    /// Camera to bind: front or back.
    #[arg(long)]
    camera: Option<String>,

    /// Synthetic frame width.
    #[arg(long, default_value = "320")]
    width: u32,

    /// Synthetic frame height.
    #[arg(long, default_value = "240")]
    height: u32,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    validate(&cli)?;

    let mut config = match &cli.config {
        Some(path) => TrackerConfig::load_from(path)?,
        None => TrackerConfig::load()?,
    };
    if cli.no_mirror {
        config.mirror = false;
    }
    if let Some(camera) = &cli.camera {
        config.camera = parse_camera(camera)?;
    }

    let detector = ReplayLandmarkDetector::from_jsonl(
        BufReader::new(File::open(&cli.recording)?),
        Duration::from_millis(cli.latency_ms),
    )?;
    let capture = TimedCaptureSource::new(cli.width, cli.height, cli.fps);
    let counters = capture.counters();

    let session = TrackingSession::new(config, Box::new(capture), Box::new(detector))?;
    let (subscriber, events) = ChannelSubscriber::new();
    session.subscribe(Box::new(subscriber));
    if !session.is_active() {
        session.start()?;
    }

    let deadline = cli
        .duration_ms
        .map(|ms| Instant::now() + Duration::from_millis(ms));
    let stdout = io::stdout();
    let mut out = stdout.lock();

    loop {
        let timeout = match deadline {
            Some(deadline) => match deadline.checked_duration_since(Instant::now()) {
                Some(remaining) => remaining,
                None => break,
            },
            None => Duration::from_secs(1),
        };
        match events.recv_timeout(timeout) {
            Ok(TrackingEvent::Feature(feature)) => writeln!(out, "{}", feature.to_json()?)?,
            Ok(TrackingEvent::Error(e)) => log::warn!("{e}"),
            Err(e) if e.is_disconnected() || deadline.is_some() => break,
            Err(_) => {}
        }
    }

    session.unsubscribe();
    if let Some(summary) = session.stats().summary_string() {
        log::info!("{summary}");
    }
    drop(session);

    log::info!(
        "Captured {} frames, {} buffers outstanding",
        counters.emitted(),
        counters.outstanding()
    );
    Ok(())
}

fn validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if !cli.fps.is_finite() || cli.fps <= 0.0 {
        return Err("--fps must be a positive finite number".into());
    }
    if cli.width == 0 || cli.height == 0 {
        return Err("--width and --height must be non-zero".into());
    }
    Ok(())
}

fn parse_camera(name: &str) -> Result<CameraSelector, Box<dyn std::error::Error>> {
    match name {
        "front" => Ok(CameraSelector::Front),
        "back" => Ok(CameraSelector::Back),
        other => Err(format!("unknown camera {other:?}, expected front or back").into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::parse_from(["facepose", "recording.jsonl"].iter().chain(args))
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(validate(&parse(&[])).is_ok());
    }

    #[test]
    fn test_rejects_non_positive_or_infinite_fps() {
        assert!(validate(&parse(&["--fps", "0"])).is_err());
        assert!(validate(&parse(&["--fps", "inf"])).is_err());
        assert!(validate(&parse(&["--fps", "NaN"])).is_err());
    }

    #[test]
    fn test_rejects_empty_frame_size() {
        assert!(validate(&parse(&["--width", "0"])).is_err());
    }

    #[test]
    fn test_parse_camera() {
        assert_eq!(parse_camera("back").unwrap(), CameraSelector::Back);
        assert!(parse_camera("side").is_err());
    }
}
