use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use image::Rgba;
use session::{
    CancelToken, DisplayInfo, DisplayMode, DrawContext, EncodeError, EncodeRequest, EncodeStatus,
    FrameCaptureRecorder, FrameInterval, ModuleIdentity, ModuleSession, MovieEncoder, Plugin,
    PluginLoadError, PluginLoader, PngFrameSink, RenderError, RunState, SessionConfig,
    SessionError, SurfaceSize, TickOutcome, WindowSessionManager,
};
use tempfile::tempdir;

const WINDOW: SurfaceSize = SurfaceSize {
    width: 32,
    height: 24,
};

#[derive(Debug, Clone, Copy, PartialEq)]
enum Behaviour {
    Paint,
    FailEvery(u64),
    PanicOn(u64),
    LeakFocus,
    Configurable,
}

struct TestPlugin {
    behaviour: Behaviour,
    interval: FrameInterval,
    teardowns: Arc<AtomicU32>,
    configured: Arc<AtomicU32>,
}

impl Plugin for TestPlugin {
    fn configure(&mut self, _size: SurfaceSize) {
        self.configured.fetch_add(1, Ordering::SeqCst);
    }

    fn draw(&mut self, ctx: &mut DrawContext<'_>) -> Result<(), RenderError> {
        let frame = ctx.frame_index();
        match self.behaviour {
            Behaviour::FailEvery(n) if frame % n == n - 1 => {
                return Err(RenderError::failed(format!("frame {frame} refused")));
            }
            Behaviour::PanicOn(n) if frame == n => panic!("module crashed on frame {frame}"),
            Behaviour::LeakFocus => ctx.lock_focus(),
            _ => {}
        }
        let shade = (frame % 255) as u8;
        for pixel in ctx.canvas_mut().pixels_mut() {
            *pixel = Rgba([shade, 0, 255 - shade, 255]);
        }
        Ok(())
    }

    fn preferred_frame_interval(&self) -> FrameInterval {
        self.interval
    }

    fn has_configuration_ui(&self) -> bool {
        self.behaviour == Behaviour::Configurable
    }

    fn teardown(&mut self) {
        self.teardowns.fetch_add(1, Ordering::SeqCst);
    }
}

struct TestLoader {
    behaviour: Behaviour,
    interval: FrameInterval,
    refuse: bool,
    teardowns: Arc<AtomicU32>,
    configured: Arc<AtomicU32>,
}

impl TestLoader {
    fn new(behaviour: Behaviour) -> Self {
        Self {
            behaviour,
            interval: FrameInterval::from_millis(33),
            refuse: false,
            teardowns: Arc::default(),
            configured: Arc::default(),
        }
    }

    fn refusing() -> Self {
        Self {
            refuse: true,
            ..Self::new(Behaviour::Paint)
        }
    }
}

impl PluginLoader for TestLoader {
    fn load(
        &self,
        identity: &ModuleIdentity,
        _size: SurfaceSize,
        _preview: bool,
    ) -> Result<Box<dyn Plugin>, PluginLoadError> {
        if self.refuse {
            return Err(PluginLoadError::Failed {
                module: identity.title.clone(),
                reason: "missing entry point".to_string(),
            });
        }
        Ok(Box::new(TestPlugin {
            behaviour: self.behaviour,
            interval: self.interval,
            teardowns: Arc::clone(&self.teardowns),
            configured: Arc::clone(&self.configured),
        }))
    }
}

/// Writes a placeholder movie once it has seen every frame file.
struct FakeEncoder;

impl MovieEncoder for FakeEncoder {
    fn encode(&self, request: &EncodeRequest, _cancel: &CancelToken) -> Result<PathBuf, EncodeError> {
        let frames = fs::read_dir(&request.source_directory)?.count();
        if frames == 0 {
            return Err(EncodeError::NoFrames(request.source_directory.clone()));
        }
        fs::write(&request.output, format!("{frames} frames at {} fps", request.frame_rate))?;
        Ok(request.output.clone())
    }
}

/// Never finishes on its own.
struct BlockingEncoder;

impl MovieEncoder for BlockingEncoder {
    fn encode(&self, request: &EncodeRequest, cancel: &CancelToken) -> Result<PathBuf, EncodeError> {
        while !cancel.is_cancelled() {
            assert!(request.source_directory.exists());
            thread::sleep(Duration::from_millis(5));
        }
        Err(EncodeError::Cancelled)
    }
}

fn session_with(windows: &WindowSessionManager, encoder: Arc<dyn MovieEncoder>) -> ModuleSession {
    ModuleSession::new(
        ModuleIdentity::new("Test Pattern", "builtin/test-pattern"),
        SessionConfig::default().with_size(WINDOW),
        windows.clone(),
        FrameCaptureRecorder::new(Arc::new(PngFrameSink), encoder),
    )
}

fn running(loader: &TestLoader, windows: &WindowSessionManager, start: Instant) -> ModuleSession {
    let mut session = session_with(windows, Arc::new(FakeEncoder));
    session.load(loader).expect("load");
    session.start_at(start).expect("start");
    session
}

fn frame_files(directory: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(directory)
        .expect("read recording directory")
        .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn steady_ticks_converge_on_the_module_rate() {
    let windows = WindowSessionManager::headless(WINDOW);
    let loader = TestLoader::new(Behaviour::Paint);
    let start = Instant::now();
    let mut session = running(&loader, &windows, start);

    let period = Duration::from_millis(33);
    let mut last = start;
    for step in 0..31u32 {
        last = start + period * step;
        let outcome = session.tick(last).expect("tick");
        assert_eq!(outcome, TickOutcome::Rendered { frame: u64::from(step) });
    }

    assert_eq!(session.frame_count(), 31);
    let fps = session.current_fps_at(last);
    assert!((29.0..=31.5).contains(&fps), "fps was {fps}");
    assert_eq!(session.capture_frame_rate(), 30);
    assert_eq!(session.next_deadline(), Some(last + period));
}

#[test]
fn ticks_between_deadlines_stay_idle() {
    let windows = WindowSessionManager::headless(WINDOW);
    let loader = TestLoader::new(Behaviour::Paint);
    let start = Instant::now();
    let mut session = running(&loader, &windows, start);

    assert!(matches!(session.tick(start), Ok(TickOutcome::Rendered { frame: 0 })));
    assert_eq!(session.tick(start + Duration::from_millis(10)).unwrap(), TickOutcome::Idle);
    assert_eq!(session.tick(start + Duration::from_millis(32)).unwrap(), TickOutcome::Idle);
    assert!(matches!(
        session.tick(start + Duration::from_millis(33)),
        Ok(TickOutcome::Rendered { frame: 1 })
    ));
    assert_eq!(session.frame_count(), 2);
}

#[test]
fn pausing_freezes_the_frame_count() {
    let windows = WindowSessionManager::headless(WINDOW);
    let loader = TestLoader::new(Behaviour::Paint);
    let start = Instant::now();
    let mut session = running(&loader, &windows, start);
    let period = Duration::from_millis(33);

    for step in 0..5u32 {
        session.tick(start + period * step).unwrap();
    }
    assert_eq!(session.frame_count(), 5);

    let paused_at = start + period * 5;
    assert_eq!(session.toggle_pause_at(paused_at).unwrap(), RunState::Paused);
    assert_eq!(session.window_title(), "Test Pattern (Paused)");
    assert_eq!(session.next_deadline(), None);
    for step in 5..20u32 {
        assert_eq!(session.tick(start + period * step).unwrap(), TickOutcome::Skipped);
    }
    assert_eq!(session.frame_count(), 5);

    let resumed_at = start + period * 20;
    assert_eq!(session.toggle_pause_at(resumed_at).unwrap(), RunState::Running);
    assert!(matches!(session.tick(resumed_at), Ok(TickOutcome::Rendered { frame: 5 })));
    assert_eq!(session.window_title(), "Test Pattern");
}

#[test]
fn recording_assembles_a_movie_and_removes_the_images() {
    let tmp = tempdir().unwrap();
    let windows = WindowSessionManager::headless(WINDOW);
    let loader = TestLoader::new(Behaviour::Paint);
    let start = Instant::now();
    let mut session = running(&loader, &windows, start);
    let period = Duration::from_millis(33);

    let directory = tmp.path().join("Test Pattern take 1");
    let started = session.start_recording(Some(directory.clone())).unwrap();
    assert_eq!(started, directory);
    assert!(session.is_recording());
    assert_eq!(session.window_title(), "Test Pattern (Recording)");
    assert!(matches!(
        session.start_recording(None),
        Err(SessionError::RecordingAlreadyActive)
    ));

    for step in 0..10u32 {
        session.flush_capture().unwrap();
        session.tick(start + period * step).unwrap();
    }
    session.flush_capture().unwrap();
    let names = frame_files(&directory);
    assert_eq!(names.len(), 10);
    assert_eq!(names.first().map(String::as_str), Some("frame_000000.png"));
    assert_eq!(names.last().map(String::as_str), Some("frame_000009.png"));

    let summary = session.stop_recording_with(true, true).unwrap();
    assert_eq!(summary.frames, 10);
    assert_eq!(summary.dropped, 0);
    let movie = tmp.path().join("Test Pattern take 1.mov");
    assert_eq!(summary.movie.as_deref(), Some(movie.as_path()));
    assert!(!session.is_recording());

    assert_eq!(session.wait_for_encode(), EncodeStatus::Completed(movie.clone()));
    assert!(movie.exists());
    assert!(!directory.exists());
    assert_eq!(fs::read_to_string(&movie).unwrap(), "10 frames at 30 fps");
}

#[test]
fn stop_without_recording_is_an_error() {
    let windows = WindowSessionManager::headless(WINDOW);
    let loader = TestLoader::new(Behaviour::Paint);
    let mut session = running(&loader, &windows, Instant::now());
    assert!(matches!(
        session.stop_recording_with(false, false),
        Err(SessionError::NotRecording)
    ));
}

#[test]
fn closing_cancels_a_pending_encode_before_deleting_images() {
    let tmp = tempdir().unwrap();
    let windows = WindowSessionManager::headless(WINDOW);
    let loader = TestLoader::new(Behaviour::Paint);
    let start = Instant::now();
    let mut session = session_with(&windows, Arc::new(BlockingEncoder));
    session.load(&loader).unwrap();
    session.start_at(start).unwrap();

    let directory = tmp.path().join("blocked");
    session.start_recording(Some(directory.clone())).unwrap();
    for step in 0..3u32 {
        session.flush_capture().unwrap();
        session.tick(start + Duration::from_millis(33) * step).unwrap();
    }
    session.stop_recording_with(true, true).unwrap();

    assert_eq!(session.encode_status(), EncodeStatus::Running);
    assert!(directory.exists());
    assert!(matches!(
        session.start_recording(None),
        Err(SessionError::Capture(_))
    ));

    session.close().unwrap();
    assert_eq!(session.encode_status(), EncodeStatus::Cancelled);
    assert!(!directory.exists());
    assert!(!tmp.path().join("blocked.mov").exists());
}

#[test]
fn closing_mid_recording_keeps_the_images() {
    let tmp = tempdir().unwrap();
    let windows = WindowSessionManager::headless(WINDOW);
    let loader = TestLoader::new(Behaviour::Paint);
    let start = Instant::now();
    let mut session = running(&loader, &windows, start);

    let directory = tmp.path().join("interrupted");
    session.start_recording(Some(directory.clone())).unwrap();
    for step in 0..4u32 {
        session.flush_capture().unwrap();
        session.tick(start + Duration::from_millis(33) * step).unwrap();
    }
    session.close().unwrap();

    assert_eq!(frame_files(&directory).len(), 4);
    assert!(!tmp.path().join("interrupted.mov").exists());
}

#[test]
fn display_mode_round_trip_keeps_progress() {
    let tmp = tempdir().unwrap();
    let display = SurfaceSize::new(64, 48);
    let windows = WindowSessionManager::new(vec![DisplayInfo::new("main", (0, 0), display)], WINDOW);
    let loader = TestLoader::new(Behaviour::Paint);
    let start = Instant::now();
    let mut session = running(&loader, &windows, start);
    let period = Duration::from_millis(33);

    session.start_recording(Some(tmp.path().join("roundtrip"))).unwrap();
    for step in 0..6u32 {
        session.flush_capture().unwrap();
        session.tick(start + period * step).unwrap();
    }

    let switched_at = start + period * 6;
    let fullscreen = session
        .change_display_mode_at(DisplayMode::Fullscreen, switched_at)
        .unwrap();
    assert_eq!(fullscreen.size(), display);
    assert_eq!(session.surface_size(), display);
    assert_eq!(session.mode(), DisplayMode::Fullscreen);
    assert_eq!(session.run_state(), RunState::Running);
    assert_eq!(session.frame_count(), 6);
    assert!(session.is_recording());
    assert_eq!(windows.active_count(), 1);

    assert!(matches!(session.tick(switched_at), Ok(TickOutcome::Rendered { frame: 6 })));
    session.flush_capture().unwrap();
    let stored = image::open(tmp.path().join("roundtrip").join("frame_000006.png")).unwrap();
    assert_eq!((stored.width(), stored.height()), (WINDOW.width, WINDOW.height));

    let windowed = session
        .change_display_mode_at(DisplayMode::Windowed, switched_at + period)
        .unwrap();
    assert_eq!(windowed.size(), WINDOW);
    assert_eq!(session.surface_size(), WINDOW);
    assert_eq!(session.frame_count(), 7);
    assert!(session.is_recording());
    assert_eq!(windows.active_count(), 1);
}

#[test]
fn paused_session_stays_paused_across_display_changes() {
    let windows = WindowSessionManager::headless(WINDOW);
    let loader = TestLoader::new(Behaviour::Paint);
    let start = Instant::now();
    let mut session = running(&loader, &windows, start);
    session.toggle_pause_at(start).unwrap();

    session.change_display_mode(DisplayMode::Preview).unwrap();
    assert_eq!(session.run_state(), RunState::Paused);
    let container = session.container().unwrap();
    assert!(container.click_through);
    assert!(!container.decorations);
}

#[test]
fn unbalanced_module_is_reported_once() {
    let windows = WindowSessionManager::headless(WINDOW);
    let loader = TestLoader::new(Behaviour::LeakFocus);
    let start = Instant::now();
    let mut session = running(&loader, &windows, start);
    for step in 0..3u32 {
        session.tick(start + Duration::from_millis(33) * step).unwrap();
    }
    assert_eq!(session.telemetry_at(start).leak_warnings, 0);

    session.close().unwrap();
    let warning = session.leak_warning().expect("leak warning");
    assert_eq!(warning.software, 3);
    assert_eq!(warning.accelerated, 0);
    assert_eq!(session.telemetry_at(start).leak_warnings, 1);
    assert_eq!(loader.teardowns.load(Ordering::SeqCst), 1);
}

#[test]
fn failing_draws_do_not_stop_the_session() {
    let windows = WindowSessionManager::headless(WINDOW);
    let loader = TestLoader::new(Behaviour::FailEvery(3));
    let start = Instant::now();
    let mut session = running(&loader, &windows, start);

    let mut failures = 0;
    for step in 0..9u32 {
        if let TickOutcome::RenderFailed { .. } = session.tick(start + Duration::from_millis(33) * step).unwrap() {
            failures += 1;
        }
    }
    assert_eq!(failures, 3);
    assert_eq!(session.render_errors(), 3);
    assert_eq!(session.frame_count(), 9);
    assert_eq!(session.run_state(), RunState::Running);
}

#[test]
fn panicking_draw_is_contained() {
    let windows = WindowSessionManager::headless(WINDOW);
    let loader = TestLoader::new(Behaviour::PanicOn(1));
    let start = Instant::now();
    let mut session = running(&loader, &windows, start);
    let period = Duration::from_millis(33);

    session.tick(start).unwrap();
    match session.tick(start + period).unwrap() {
        TickOutcome::RenderFailed {
            frame: 1,
            error: RenderError::Panicked(message),
        } => assert!(message.contains("crashed on frame 1")),
        other => panic!("unexpected outcome {other:?}"),
    }
    assert!(matches!(
        session.tick(start + period * 2),
        Ok(TickOutcome::Rendered { frame: 2 })
    ));
    assert_eq!(session.run_state(), RunState::Running);
}

#[test]
fn failed_load_leaves_nothing_behind() {
    let windows = WindowSessionManager::headless(WINDOW);
    let mut session = session_with(&windows, Arc::new(FakeEncoder));

    let err = session.load(&TestLoader::refusing()).unwrap_err();
    assert!(matches!(err, SessionError::PluginLoad(_)));
    assert_eq!(session.run_state(), RunState::Uninitialized);
    assert_eq!(windows.active_count(), 0);
    assert!(session.container().is_none());
    assert!(matches!(
        session.start(),
        Err(SessionError::InvalidState { operation: "start", .. })
    ));
}

#[test]
fn closed_session_rejects_everything() {
    let windows = WindowSessionManager::headless(WINDOW);
    let loader = TestLoader::new(Behaviour::Paint);
    let start = Instant::now();
    let mut session = running(&loader, &windows, start);
    let id = session.id();

    session.close().unwrap();
    assert!(session.is_closed());
    assert_eq!(windows.active_count(), 0);
    assert!(matches!(session.tick(start), Err(SessionError::Closed(closed)) if closed == id));
    assert!(matches!(session.start(), Err(SessionError::Closed(_))));
    assert!(matches!(session.close(), Err(SessionError::Closed(_))));
    assert!(matches!(
        session.change_display_mode(DisplayMode::Fullscreen),
        Err(SessionError::Closed(_))
    ));
    assert_eq!(loader.teardowns.load(Ordering::SeqCst), 1);
}

#[test]
fn configuration_ui_is_only_offered_when_present() {
    let windows = WindowSessionManager::headless(WINDOW);
    let plain = TestLoader::new(Behaviour::Paint);
    let mut session = running(&plain, &windows, Instant::now());
    assert!(matches!(
        session.show_configuration(),
        Err(SessionError::ConfigurationUnavailable(title)) if title == "Test Pattern"
    ));

    let configurable = TestLoader::new(Behaviour::Configurable);
    let mut session = running(&configurable, &windows, Instant::now());
    session.show_configuration().unwrap();
}

#[test]
fn stop_and_restart() {
    let windows = WindowSessionManager::headless(WINDOW);
    let loader = TestLoader::new(Behaviour::Paint);
    let start = Instant::now();
    let mut session = running(&loader, &windows, start);
    session.tick(start).unwrap();

    session.stop().unwrap();
    session.stop().unwrap();
    assert_eq!(session.run_state(), RunState::Stopped);
    assert_eq!(session.tick(start + Duration::from_secs(1)).unwrap(), TickOutcome::Skipped);
    assert!(matches!(
        session.toggle_pause(),
        Err(SessionError::InvalidState { .. })
    ));

    let later = start + Duration::from_secs(2);
    session.start_at(later).unwrap();
    assert!(matches!(session.tick(later), Ok(TickOutcome::Rendered { frame: 1 })));
}

#[test]
fn stopping_finishes_the_recording_with_the_session_options() {
    let tmp = tempdir().unwrap();
    let windows = WindowSessionManager::headless(WINDOW);
    let loader = TestLoader::new(Behaviour::Paint);
    let start = Instant::now();
    let mut config = SessionConfig::default().with_size(WINDOW);
    config.recording.assemble_movie = true;
    config.recording.delete_source_images = true;
    let mut session = ModuleSession::new(
        ModuleIdentity::new("Test Pattern", "builtin/test-pattern"),
        config,
        windows.clone(),
        FrameCaptureRecorder::new(Arc::new(PngFrameSink), Arc::new(FakeEncoder)),
    );
    session.load(&loader).unwrap();
    session.start_at(start).unwrap();

    let directory = tmp.path().join("stopped");
    session.start_recording(Some(directory.clone())).unwrap();
    for step in 0..3u32 {
        session.flush_capture().unwrap();
        session.tick(start + Duration::from_millis(33) * step).unwrap();
    }
    session.stop().unwrap();

    assert!(!session.is_recording());
    assert_eq!(session.run_state(), RunState::Stopped);
    assert_eq!(session.window_title(), "Test Pattern");
    let movie = tmp.path().join("stopped.mov");
    assert_eq!(session.wait_for_encode(), EncodeStatus::Completed(movie.clone()));
    assert!(movie.exists());
    assert!(!directory.exists());
    assert_eq!(fs::read_to_string(&movie).unwrap(), "3 frames at 30 fps");
}

#[test]
fn telemetry_serializes_for_the_cli() {
    let windows = WindowSessionManager::headless(WINDOW);
    let loader = TestLoader::new(Behaviour::Paint);
    let start = Instant::now();
    let mut session = running(&loader, &windows, start);
    session.tick(start).unwrap();

    let telemetry = session.telemetry_at(start);
    let json = serde_json::to_value(&telemetry).unwrap();
    assert_eq!(json["title"], "Test Pattern");
    assert_eq!(json["mode"], "windowed");
    assert_eq!(json["run_state"], "running");
    assert_eq!(json["frame_count"], 1);
    assert_eq!(json["encode"]["state"], "idle");
}

#[test]
fn saved_window_tracks_the_windowed_geometry() {
    let windows = WindowSessionManager::headless(WINDOW);
    let loader = TestLoader::new(Behaviour::Paint);
    let mut session = running(&loader, &windows, Instant::now());
    session.set_transparent(true).unwrap();

    let saved = session.saved_window().unwrap();
    assert_eq!(saved.module, "Test Pattern");
    assert_eq!(saved.mode, DisplayMode::Windowed);
    assert_eq!(saved.rect.size(), WINDOW);
    assert_eq!(saved.layer, "normal");
    assert!(saved.transparent);

    session.close().unwrap();
    assert!(session.saved_window().is_none());
}
