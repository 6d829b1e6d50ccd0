use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::Local;
use image::RgbaImage;
use preferences::Preferences;
use scheduler::{AnimationClock, FrameInterval};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::capture::{FrameCaptureRecorder, OfferOutcome, RecordingSummary};
use crate::display::{
    ContainerId, ContainerRequest, ContainerState, DisplayError, WindowSessionManager,
};
use crate::encode::EncodeStatus;
use crate::error::SessionError;
use crate::guard::{ResourceLeakWarning, SurfaceAccounting};
use crate::plugin::{ModuleIdentity, PluginHandle, PluginLoader, RenderError};
use crate::types::{ContentRect, DisplayMode, RunState, SessionId, SurfaceSize, WindowLayer};

/// Movie frame rate used when neither preferences nor the module name one.
pub const DEFAULT_CAPTURE_FRAME_RATE: u32 = 30;

/// What to do with a recording when it stops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingOptions {
    pub assemble_movie: bool,
    pub delete_source_images: bool,
    /// Movie frame rate that replaces the module's own rate.
    pub frame_rate_override: Option<u32>,
    /// Parent of the per-recording image directories.
    pub images_directory: PathBuf,
}

impl Default for RecordingOptions {
    fn default() -> Self {
        Self::from_preferences(&preferences::RecordingPreferences::default())
    }
}

impl RecordingOptions {
    pub fn from_preferences(prefs: &preferences::RecordingPreferences) -> Self {
        Self {
            assemble_movie: prefs.create_movie,
            delete_source_images: prefs.create_movie && prefs.delete_source_images,
            frame_rate_override: prefs.frame_rate_override(),
            images_directory: prefs
                .images_directory
                .clone()
                .unwrap_or_else(|| std::env::temp_dir().join("SaverLab Recordings")),
        }
    }
}

/// How a session should be shown and recorded. Built from [`Preferences`]
/// and then adjusted by the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub mode: DisplayMode,
    pub size: SurfaceSize,
    /// Explicit windowed geometry; overrides `size` when set.
    pub rect: Option<ContentRect>,
    /// Display used for full-screen containers.
    pub display: usize,
    pub layer: Option<WindowLayer>,
    pub transparent: Option<bool>,
    pub click_through: Option<bool>,
    pub recording: RecordingOptions,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from_preferences(&Preferences::default())
    }
}

impl SessionConfig {
    pub fn from_preferences(prefs: &Preferences) -> Self {
        Self {
            mode: DisplayMode::Windowed,
            size: prefs.default_window_size.into(),
            rect: None,
            display: 0,
            layer: None,
            transparent: None,
            click_through: None,
            recording: RecordingOptions::from_preferences(&prefs.recording),
        }
    }

    pub fn with_mode(mut self, mode: DisplayMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_size(mut self, size: SurfaceSize) -> Self {
        self.size = size;
        self
    }
}

/// Result of a single [`ModuleSession::tick`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Running, but no frame is due yet.
    Idle,
    Rendered { frame: u64 },
    /// The module's draw failed; the session keeps running.
    RenderFailed { frame: u64, error: RenderError },
    /// Not running (paused, stopped or still initializing).
    Skipped,
}

/// Read-only snapshot of a session for hosts and the CLI.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionTelemetry {
    pub id: SessionId,
    pub title: String,
    pub mode: DisplayMode,
    pub run_state: RunState,
    pub frame_count: u64,
    pub current_fps: f32,
    /// `None` when the module runs unlimited.
    pub target_fps: Option<f32>,
    pub recording: bool,
    pub captured_frames: u64,
    pub dropped_frames: u64,
    pub render_errors: u64,
    pub capture_failures: u64,
    pub leak_warnings: u32,
    pub surface_size: SurfaceSize,
    pub encode: EncodeStatus,
}

/// A window worth restoring on the next launch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedWindow {
    pub module: String,
    pub mode: DisplayMode,
    pub rect: ContentRect,
    /// Stored as a token so unknown layers degrade to `normal` on load.
    pub layer: String,
    #[serde(default)]
    pub transparent: bool,
    #[serde(default)]
    pub click_through: bool,
}

impl SavedWindow {
    pub fn layer(&self) -> WindowLayer {
        WindowLayer::from_token_or_normal(&self.layer)
    }
}

/// One loaded module and everything needed to animate, show and record it.
///
/// All methods run on the caller's thread. Ticks never overlap because every
/// state change goes through `&mut self`.
pub struct ModuleSession {
    id: SessionId,
    identity: ModuleIdentity,
    config: SessionConfig,
    state: RunState,
    mode: DisplayMode,
    plugin: Option<PluginHandle>,
    container: Option<ContainerState>,
    windowed_rect: Option<ContentRect>,
    windows: WindowSessionManager,
    clock: AnimationClock,
    accounting: SurfaceAccounting,
    recorder: FrameCaptureRecorder,
    canvas: RgbaImage,
    has_frame: bool,
    frame_count: u64,
    render_errors: u64,
    leak_warning: Option<ResourceLeakWarning>,
    leak_warnings: u32,
    elapsed: Duration,
    last_frame_at: Option<Instant>,
}

impl ModuleSession {
    pub fn new(
        identity: ModuleIdentity,
        config: SessionConfig,
        windows: WindowSessionManager,
        recorder: FrameCaptureRecorder,
    ) -> Self {
        let mode = config.mode;
        let windowed_rect = config.rect;
        Self {
            id: SessionId::next(),
            identity,
            config,
            state: RunState::Uninitialized,
            mode,
            plugin: None,
            container: None,
            windowed_rect,
            windows,
            clock: AnimationClock::new(FrameInterval::Unlimited),
            accounting: SurfaceAccounting::new(),
            recorder,
            canvas: RgbaImage::new(1, 1),
            has_frame: false,
            frame_count: 0,
            render_errors: 0,
            leak_warning: None,
            leak_warnings: 0,
            elapsed: Duration::ZERO,
            last_frame_at: None,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn identity(&self) -> &ModuleIdentity {
        &self.identity
    }

    pub fn title(&self) -> &str {
        &self.identity.title
    }

    pub fn run_state(&self) -> RunState {
        self.state
    }

    pub fn mode(&self) -> DisplayMode {
        self.mode
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn render_errors(&self) -> u64 {
        self.render_errors
    }

    pub fn target_fps(&self) -> Option<f32> {
        self.clock.target_fps()
    }

    pub fn current_fps(&self) -> f32 {
        self.current_fps_at(Instant::now())
    }

    pub fn current_fps_at(&self, now: Instant) -> f32 {
        self.clock.current_fps(now)
    }

    pub fn is_recording(&self) -> bool {
        self.recorder.is_recording()
    }

    pub fn recording_directory(&self) -> Option<&Path> {
        self.recorder.recording_directory()
    }

    pub fn surface_size(&self) -> SurfaceSize {
        SurfaceSize::new(self.canvas.width(), self.canvas.height())
    }

    /// Latest snapshot of the session's container, if it holds one.
    pub fn container(&self) -> Option<ContainerState> {
        let id = self.container.as_ref()?.id;
        self.windows.get(id)
    }

    /// The most recent successfully drawn frame.
    pub fn latest_frame(&self) -> Option<&RgbaImage> {
        self.has_frame.then_some(&self.canvas)
    }

    pub fn leak_warning(&self) -> Option<&ResourceLeakWarning> {
        self.leak_warning.as_ref()
    }

    /// `"<title>"`, with ` (Paused)` and ` (Recording)` appended as they apply.
    pub fn window_title(&self) -> String {
        let mut title = self.identity.title.clone();
        if self.state == RunState::Paused {
            title.push_str(" (Paused)");
        }
        if self.recorder.is_recording() {
            title.push_str(" (Recording)");
        }
        title
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        match self.state {
            RunState::Running => self.clock.next_deadline(),
            _ => None,
        }
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.state == RunState::Closing {
            Err(SessionError::Closed(self.id))
        } else {
            Ok(())
        }
    }

    fn invalid(&self, operation: &'static str) -> SessionError {
        SessionError::InvalidState {
            operation,
            state: self.state,
        }
    }

    fn container_request(&self) -> ContainerRequest {
        let rect = self
            .windowed_rect
            .unwrap_or_else(|| ContentRect::sized(self.config.size));
        ContainerRequest {
            title: self.window_title(),
            rect: Some(rect),
            display: self.config.display,
            layer: self.config.layer,
            transparent: self
                .container
                .as_ref()
                .map(|container| container.transparent)
                .or(self.config.transparent),
            click_through: self.config.click_through,
        }
    }

    fn refresh_title(&mut self) {
        let title = self.window_title();
        if let Some(container) = self.container.as_mut() {
            if let Ok(state) = self.windows.set_title(container.id, &title) {
                *container = state;
            }
        }
    }

    /// Instantiates the module and acquires its container. A failed load
    /// leaves the session `Uninitialized` and holding no container.
    pub fn load(&mut self, loader: &dyn PluginLoader) -> Result<(), SessionError> {
        self.ensure_open()?;
        if self.state != RunState::Uninitialized {
            return Err(self.invalid("load"));
        }

        let requested = self.windowed_rect.map_or(self.config.size, |rect| rect.size());
        let plugin = loader
            .load(&self.identity, requested.non_zero(), self.mode.is_preview())
            .map_err(|err| {
                warn!(session = %self.id, module = %self.identity.title, "module failed to load: {err}");
                err
            })?;
        let mut handle = PluginHandle::new(self.identity.clone(), plugin, requested);

        let container = self.windows.acquire(self.mode, self.container_request());
        handle.configure(container.size());
        let size = handle.size();
        self.canvas = RgbaImage::new(size.width, size.height);
        self.clock = AnimationClock::new(handle.preferred_frame_interval());
        info!(
            session = %self.id,
            module = %self.identity.title,
            mode = %self.mode,
            %size,
            interval = %self.clock.interval(),
            "module loaded"
        );
        self.plugin = Some(handle);
        self.container = Some(container);
        self.state = RunState::Initializing;
        Ok(())
    }

    pub fn start(&mut self) -> Result<(), SessionError> {
        self.start_at(Instant::now())
    }

    /// Arms the clock. From `Running` or `Paused` this does nothing.
    pub fn start_at(&mut self, now: Instant) -> Result<(), SessionError> {
        self.ensure_open()?;
        match self.state {
            RunState::Initializing | RunState::Stopped => {
                self.clock.arm(now);
                self.last_frame_at = None;
                self.state = RunState::Running;
                self.refresh_title();
                info!(session = %self.id, "session running");
                Ok(())
            }
            RunState::Running | RunState::Paused => Ok(()),
            _ => Err(self.invalid("start")),
        }
    }

    pub fn toggle_pause(&mut self) -> Result<RunState, SessionError> {
        self.toggle_pause_at(Instant::now())
    }

    pub fn toggle_pause_at(&mut self, now: Instant) -> Result<RunState, SessionError> {
        self.ensure_open()?;
        match self.state {
            RunState::Running => {
                self.clock.pause();
                self.last_frame_at = None;
                self.state = RunState::Paused;
            }
            RunState::Paused => {
                self.clock.resume(now);
                self.state = RunState::Running;
            }
            _ => return Err(self.invalid("toggle pause")),
        }
        debug!(session = %self.id, state = %self.state, "pause toggled");
        self.refresh_title();
        Ok(self.state)
    }

    /// Stops ticking. An active recording ends as if `stop_recording` had been
    /// called with the session's recording options.
    pub fn stop(&mut self) -> Result<(), SessionError> {
        self.ensure_open()?;
        match self.state {
            RunState::Running | RunState::Paused => {
                self.clock.disarm();
                self.last_frame_at = None;
                if self.recorder.is_recording() {
                    if let Err(err) = self.stop_recording() {
                        warn!(session = %self.id, "recording did not stop cleanly: {err}");
                    }
                }
                self.state = RunState::Stopped;
                self.refresh_title();
                info!(session = %self.id, frames = self.frame_count, "session stopped");
                Ok(())
            }
            RunState::Stopped => Ok(()),
            _ => Err(self.invalid("stop")),
        }
    }

    /// Tears the session down. Recording stops without assembling a movie, a
    /// pending encode is cancelled and awaited, then the module and its
    /// container are released. Any later call returns `SessionError::Closed`.
    pub fn close(&mut self) -> Result<(), SessionError> {
        self.ensure_open()?;
        self.clock.disarm();

        if self.recorder.is_recording() {
            let rate = self.capture_frame_rate();
            if let Err(err) = self.recorder.stop_recording(false, false, rate) {
                warn!(session = %self.id, "recording did not stop cleanly: {err}");
            }
        }
        if let Some(status) = self.recorder.cancel_if_pending() {
            debug!(session = %self.id, ?status, "pending encode settled");
        }

        if let Some(warning) = self.accounting.teardown() {
            self.leak_warnings += 1;
            self.leak_warning = Some(warning);
        }
        if let Some(mut plugin) = self.plugin.take() {
            plugin.release();
        }
        if let Some(container) = self.container.take() {
            self.windows.release(container.id);
        }

        self.state = RunState::Closing;
        self.has_frame = false;
        info!(session = %self.id, module = %self.identity.title, frames = self.frame_count, "session closed");
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.state == RunState::Closing
    }

    /// Moves the module to a container for `mode`, keeping frame count, FPS
    /// history, recording and run state.
    pub fn change_display_mode(&mut self, mode: DisplayMode) -> Result<ContainerState, SessionError> {
        self.change_display_mode_at(mode, Instant::now())
    }

    pub fn change_display_mode_at(
        &mut self,
        mode: DisplayMode,
        now: Instant,
    ) -> Result<ContainerState, SessionError> {
        self.ensure_open()?;
        if !self.state.is_active() {
            return Err(self.invalid("change display mode"));
        }
        let current = self.container.clone().ok_or_else(|| self.invalid("change display mode"))?;
        if mode == self.mode {
            return Ok(current);
        }

        let previous = self.state;
        if previous == RunState::Running {
            self.clock.pause();
        }
        if self.mode == DisplayMode::Windowed {
            self.windowed_rect = self.windows.get(current.id).map(|state| state.rect);
        }

        let replacement = self.windows.acquire(mode, self.container_request());
        self.windows.release(current.id);
        let size = replacement.size();
        if let Some(plugin) = self.plugin.as_mut() {
            plugin.configure(size);
            let size = plugin.size();
            self.canvas = RgbaImage::new(size.width, size.height);
            self.has_frame = false;
        }
        info!(session = %self.id, from = %self.mode, to = %mode, %size, "display mode changed");
        self.mode = mode;
        self.container = Some(replacement.clone());

        if previous == RunState::Running {
            self.last_frame_at = None;
            self.clock.resume(now);
        }
        self.state = previous;
        Ok(replacement)
    }

    /// Resizes the module's drawing surface, usually after the host window
    /// was resized.
    pub fn resize(&mut self, size: SurfaceSize) -> Result<(), SessionError> {
        self.ensure_open()?;
        let Some(plugin) = self.plugin.as_mut() else {
            return Err(self.invalid("resize"));
        };
        plugin.configure(size);
        let size = plugin.size();
        if size != self.surface_size() {
            self.canvas = RgbaImage::new(size.width, size.height);
            self.has_frame = false;
        }
        if let Some(container) = self.container.as_mut() {
            let rect = ContentRect {
                width: size.width,
                height: size.height,
                ..container.rect
            };
            if let Ok(state) = self.windows.set_rect(container.id, rect) {
                *container = state;
            }
        }
        Ok(())
    }

    /// Draws the next frame if the clock says one is due.
    pub fn tick(&mut self, now: Instant) -> Result<TickOutcome, SessionError> {
        self.ensure_open()?;
        if self.state != RunState::Running {
            return Ok(TickOutcome::Skipped);
        }
        if let Some(err) = self.recorder.poll() {
            debug!(session = %self.id, "capture aborted while idle: {err}");
        }
        if !self.clock.ready_for_frame(now) {
            return Ok(TickOutcome::Idle);
        }
        self.advance_frame(now)
    }

    /// Draws one frame through a [`crate::DrawSurfaceGuard`], counts it and,
    /// while recording, offers it to the capture recorder. A failing or
    /// panicking draw is reported in the outcome and does not stop the session.
    pub fn advance_frame(&mut self, now: Instant) -> Result<TickOutcome, SessionError> {
        self.ensure_open()?;
        if self.state != RunState::Running {
            return Err(self.invalid("advance frame"));
        }
        let Some(plugin) = self.plugin.as_mut() else {
            return Err(self.invalid("advance frame"));
        };

        if let Some(previous) = self.last_frame_at {
            self.elapsed += now.saturating_duration_since(previous);
        }
        self.last_frame_at = Some(now);

        let frame = self.frame_count;
        let result = {
            let mut guard = self.accounting.enter();
            let mut ctx = guard.context(&mut self.canvas, frame, self.elapsed);
            catch_unwind(AssertUnwindSafe(|| plugin.draw(&mut ctx)))
                .unwrap_or_else(|payload| Err(RenderError::Panicked(panic_message(payload))))
        };
        self.frame_count += 1;
        self.clock.mark_rendered(now);

        match result {
            Ok(()) => {
                self.has_frame = true;
                if self.recorder.is_recording() {
                    match self.recorder.offer_frame(&self.canvas) {
                        OfferOutcome::Aborted(err) => {
                            warn!(session = %self.id, frame, "recording aborted: {err}");
                            self.refresh_title();
                        }
                        OfferOutcome::Dropped => {
                            debug!(session = %self.id, frame, "capture busy; frame not recorded");
                        }
                        OfferOutcome::Queued { .. } | OfferOutcome::Inactive => {}
                    }
                }
                Ok(TickOutcome::Rendered { frame })
            }
            Err(error) => {
                self.render_errors += 1;
                warn!(session = %self.id, frame, "{error}");
                Ok(TickOutcome::RenderFailed { frame, error })
            }
        }
    }

    pub fn show_configuration(&mut self) -> Result<(), SessionError> {
        self.ensure_open()?;
        let Some(plugin) = self.plugin.as_mut() else {
            return Err(self.invalid("show configuration"));
        };
        if !plugin.has_configuration_ui() {
            return Err(SessionError::ConfigurationUnavailable(
                self.identity.title.clone(),
            ));
        }
        plugin.show_configuration_ui();
        Ok(())
    }

    fn update_container<F>(&mut self, operation: &'static str, apply: F) -> Result<(), SessionError>
    where
        F: FnOnce(&WindowSessionManager, ContainerId) -> Result<ContainerState, DisplayError>,
    {
        self.ensure_open()?;
        let id = match self.container.as_ref() {
            Some(container) => container.id,
            None => return Err(self.invalid(operation)),
        };
        let state = apply(&self.windows, id)?;
        self.container = Some(state);
        Ok(())
    }

    pub fn set_transparent(&mut self, transparent: bool) -> Result<(), SessionError> {
        self.config.transparent = Some(transparent);
        self.update_container("set transparency", |windows, id| {
            windows.set_transparent(id, transparent)
        })
    }

    pub fn set_click_through(&mut self, enabled: bool) -> Result<(), SessionError> {
        self.config.click_through = Some(enabled);
        self.update_container("set click-through", |windows, id| {
            windows.set_click_through(id, enabled)
        })
    }

    pub fn set_layer(&mut self, layer: WindowLayer) -> Result<(), SessionError> {
        self.config.layer = Some(layer);
        self.update_container("set layer", |windows, id| windows.set_layer(id, layer))
    }

    /// Directory a recording started now would use by default.
    pub fn default_recording_directory(&self) -> PathBuf {
        let title: String = self
            .identity
            .title
            .chars()
            .map(|c| if matches!(c, '/' | '\\' | ':') { '-' } else { c })
            .collect();
        let stamp = Local::now().format("%Y-%m-%d %H.%M.%S");
        self.config
            .recording
            .images_directory
            .join(format!("{title} {stamp}"))
    }

    /// Starts capturing frames into `directory`, or into a fresh timestamped
    /// directory under the configured images directory.
    pub fn start_recording(&mut self, directory: Option<PathBuf>) -> Result<PathBuf, SessionError> {
        self.ensure_open()?;
        if !self.state.is_active() {
            return Err(self.invalid("start recording"));
        }
        if self.recorder.is_recording() {
            return Err(SessionError::RecordingAlreadyActive);
        }
        let directory = directory.unwrap_or_else(|| self.default_recording_directory());
        self.recorder.start_recording(&directory)?;
        info!(session = %self.id, directory = %directory.display(), "recording frames");
        self.refresh_title();
        Ok(directory)
    }

    /// Stops recording using the session's recording options.
    pub fn stop_recording(&mut self) -> Result<RecordingSummary, SessionError> {
        let options = self.config.recording.clone();
        self.stop_recording_with(options.assemble_movie, options.delete_source_images)
    }

    pub fn stop_recording_with(
        &mut self,
        assemble_movie: bool,
        delete_source_images: bool,
    ) -> Result<RecordingSummary, SessionError> {
        self.ensure_open()?;
        let rate = self.capture_frame_rate();
        let summary = self
            .recorder
            .stop_recording(assemble_movie, delete_source_images, rate);
        self.refresh_title();
        Ok(summary?)
    }

    /// Frame rate handed to the movie encoder.
    pub fn capture_frame_rate(&self) -> u32 {
        self.config
            .recording
            .frame_rate_override
            .or_else(|| {
                self.clock
                    .target_fps()
                    .filter(|fps| *fps >= 1.0)
                    .map(|fps| fps.round() as u32)
            })
            .unwrap_or(DEFAULT_CAPTURE_FRAME_RATE)
    }

    /// Waits for the in-flight frame write. Headless drivers call this between
    /// ticks so no frame is dropped.
    pub fn flush_capture(&mut self) -> Result<(), SessionError> {
        self.recorder.flush()?;
        Ok(())
    }

    pub fn encode_status(&mut self) -> EncodeStatus {
        self.recorder.encode_status()
    }

    pub fn wait_for_encode(&mut self) -> EncodeStatus {
        self.recorder.wait_for_encode()
    }

    pub fn telemetry(&mut self) -> SessionTelemetry {
        self.telemetry_at(Instant::now())
    }

    pub fn telemetry_at(&mut self, now: Instant) -> SessionTelemetry {
        SessionTelemetry {
            id: self.id,
            title: self.identity.title.clone(),
            mode: self.mode,
            run_state: self.state,
            frame_count: self.frame_count,
            current_fps: self.clock.current_fps(now),
            target_fps: self.clock.target_fps(),
            recording: self.recorder.is_recording(),
            captured_frames: self.recorder.captured_frames(),
            dropped_frames: self.recorder.dropped_frames(),
            render_errors: self.render_errors,
            capture_failures: self.recorder.write_failures(),
            leak_warnings: self.leak_warnings,
            surface_size: self.surface_size(),
            encode: self.recorder.encode_status(),
        }
    }

    /// Snapshot for restore-on-startup. `None` once the container is gone.
    pub fn saved_window(&self) -> Option<SavedWindow> {
        let container = self.container()?;
        let rect = match self.mode {
            DisplayMode::Windowed => container.rect,
            _ => self.windowed_rect.unwrap_or(container.rect),
        };
        Some(SavedWindow {
            module: self.identity.title.clone(),
            mode: self.mode,
            rect,
            layer: container.layer.token().to_string(),
            transparent: container.transparent,
            click_through: container.click_through,
        })
    }
}

impl Drop for ModuleSession {
    fn drop(&mut self) {
        if !self.is_closed() {
            let _ = self.close();
        }
    }
}

impl std::fmt::Debug for ModuleSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleSession")
            .field("id", &self.id)
            .field("module", &self.identity.title)
            .field("state", &self.state)
            .field("mode", &self.mode)
            .field("frame_count", &self.frame_count)
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
