//! Headless recording: renders a module without a window, as fast as the
//! capture writer allows, and hands the frames to the movie encoder.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use modules::ModuleRegistry;
use serde::Serialize;
use session::{
    EncodeStatus, FfmpegEncoder, FrameCaptureRecorder, ModuleSession, SessionConfig,
    TickOutcome, WindowSessionManager,
};

use crate::cli::RecordArgs;
use crate::paths::AppPaths;
use crate::run::load_preferences;

#[derive(Debug, Serialize)]
struct RecordingReport {
    module: String,
    directory: PathBuf,
    frames: u64,
    dropped: u64,
    render_errors: u64,
    frame_rate: u32,
    images_kept: bool,
    movie: Option<PathBuf>,
    encode: EncodeStatus,
}

pub fn record(paths: &AppPaths, args: RecordArgs) -> Result<()> {
    let prefs = load_preferences(paths)?;
    let registry = ModuleRegistry::builtin();
    let identity = registry.identity(&args.module)?;

    let mut config = SessionConfig::from_preferences(&prefs);
    if let Some(size) = args.size {
        config.size = size;
    }
    if let Some(fps) = args.fps {
        config.recording.frame_rate_override = Some(fps);
    }
    let mut assemble = config.recording.assemble_movie && !args.no_movie;
    if assemble && !FfmpegEncoder::new().is_available() {
        tracing::warn!("ffmpeg was not found on PATH; keeping the image sequence without a movie");
        assemble = false;
    }
    let delete = assemble && config.recording.delete_source_images && !args.keep_images;

    let windows = WindowSessionManager::headless(config.size);
    let mut session = ModuleSession::new(
        identity,
        config,
        windows,
        FrameCaptureRecorder::with_defaults(),
    );
    session
        .load(&registry)
        .with_context(|| format!("failed to load module `{}`", args.module))?;
    let start = Instant::now();
    session.start_at(start)?;
    let directory = session.start_recording(args.output.clone())?;

    let frame_rate = session.capture_frame_rate();
    let step = Duration::from_secs(1) / frame_rate.max(1);
    tracing::info!(
        module = %session.title(),
        frames = args.frames,
        directory = %directory.display(),
        frame_rate,
        "recording headless"
    );

    for index in 0..args.frames {
        session.flush_capture()?;
        let now = start + step * u32::try_from(index).unwrap_or(u32::MAX);
        if let TickOutcome::RenderFailed { frame, error } = session.advance_frame(now)? {
            tracing::warn!(frame, "{error}");
        }
    }
    session.flush_capture()?;

    let summary = session.stop_recording_with(assemble, delete)?;
    let encode = if summary.movie.is_some() {
        session.wait_for_encode()
    } else {
        EncodeStatus::Idle
    };
    let report = RecordingReport {
        module: session.title().to_string(),
        directory: summary.directory,
        frames: summary.frames,
        dropped: summary.dropped,
        render_errors: session.render_errors(),
        frame_rate,
        images_kept: !delete,
        movie: summary.movie,
        encode,
    };
    session.close()?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    if let EncodeStatus::Failed(reason) = &report.encode {
        anyhow::bail!("movie assembly failed: {reason}");
    }
    Ok(())
}

fn print_report(report: &RecordingReport) {
    println!("Recorded {} frames of {}", report.frames, report.module);
    if report.dropped > 0 {
        println!("  dropped:  {}", report.dropped);
    }
    if report.render_errors > 0 {
        println!("  failed:   {} draws", report.render_errors);
    }
    if report.images_kept {
        println!("  images:   {}", report.directory.display());
    }
    match &report.encode {
        EncodeStatus::Completed(movie) => {
            println!("  movie:    {} ({} fps)", movie.display(), report.frame_rate)
        }
        EncodeStatus::Failed(reason) => println!("  movie:    failed ({reason})"),
        EncodeStatus::Cancelled => println!("  movie:    cancelled"),
        EncodeStatus::Idle | EncodeStatus::Running => {}
    }
}
