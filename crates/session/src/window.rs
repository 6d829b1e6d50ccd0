//! Interactive host: runs sessions on the winit event loop and presents their
//! frames through [`FramePresenter`].
//!
//! Every session lives on the event-loop thread. Each iteration ticks the
//! sessions that are due, applies container changes queued by the
//! [`WindowSessionManager`], and sleeps until the earliest next deadline.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use tracing::{debug, error, info, warn};
use winit::dpi::{PhysicalPosition, PhysicalSize};
use winit::event::{ElementState, Event, KeyEvent, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoopBuilder, EventLoopProxy, EventLoopWindowTarget};
use winit::keyboard::{Key, NamedKey};
use winit::monitor::MonitorHandle;
use winit::window::{Fullscreen, Window, WindowBuilder, WindowId, WindowLevel};

use crate::capture::FrameCaptureRecorder;
use crate::display::{ContainerEvent, ContainerId, ContainerState, DisplayInfo, WindowSessionManager};
use crate::error::SessionError;
use crate::gpu::FramePresenter;
use crate::plugin::{ModuleIdentity, PluginLoader};
use crate::session::{ModuleSession, SavedWindow, SessionConfig, TickOutcome};
use crate::types::{ContentRect, DisplayMode, RunState, SurfaceSize, WindowLayer};

/// One module the host should open at startup.
#[derive(Debug, Clone)]
pub struct HostedModule {
    pub identity: ModuleIdentity,
    pub config: SessionConfig,
    /// Start recording into this directory as soon as the session runs.
    pub record_to: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct HostConfig {
    pub modules: Vec<HostedModule>,
    pub default_size: SurfaceSize,
    /// How often window titles show a fresh FPS reading.
    pub info_refresh_interval: Duration,
}

/// Requests delivered to the event loop from other threads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCommand {
    Shutdown,
}

/// Cross-thread handle to a running host.
#[derive(Debug, Clone)]
pub struct HostHandle {
    proxy: EventLoopProxy<HostCommand>,
}

impl HostHandle {
    pub fn shutdown(&self) -> Result<()> {
        self.proxy
            .send_event(HostCommand::Shutdown)
            .map_err(|err| anyhow!("host already exited: {err}"))
    }
}

struct HostedWindow {
    window: Arc<Window>,
    presenter: Option<FramePresenter>,
}

struct HostState {
    windows: WindowSessionManager,
    sessions: Vec<ModuleSession>,
    hosted: BTreeMap<ContainerId, HostedWindow>,
    monitors: Vec<MonitorHandle>,
    info_refresh: Duration,
    next_info: Instant,
    saved: Vec<SavedWindow>,
}

/// Runs the interactive host on the calling thread until every session has
/// closed or a [`HostCommand::Shutdown`] arrives. Returns the windows that
/// were still open, for restore-on-startup.
pub fn run_host<F>(config: HostConfig, loader: &dyn PluginLoader, on_ready: F) -> Result<Vec<SavedWindow>>
where
    F: FnOnce(HostHandle),
{
    let event_loop = EventLoopBuilder::<HostCommand>::with_user_event()
        .build()
        .map_err(|err| anyhow!("failed to create event loop: {err}"))?;

    let monitors: Vec<MonitorHandle> = event_loop.available_monitors().collect();
    let displays = monitors
        .iter()
        .enumerate()
        .map(|(index, monitor)| {
            let size = monitor.size();
            let position = monitor.position();
            DisplayInfo::new(
                monitor.name().unwrap_or_else(|| format!("display-{index}")),
                (position.x, position.y),
                SurfaceSize::new(size.width, size.height),
            )
        })
        .collect();
    let windows = WindowSessionManager::new(displays, config.default_size).with_event_log();

    let mut sessions = Vec::new();
    for module in config.modules {
        let mut session = ModuleSession::new(
            module.identity.clone(),
            module.config,
            windows.clone(),
            FrameCaptureRecorder::with_defaults(),
        );
        if let Err(err) = session.load(loader) {
            error!(module = %module.identity.title, "skipping module: {err}");
            continue;
        }
        if let Err(err) = session.start() {
            error!(module = %module.identity.title, "failed to start module: {err}");
            continue;
        }
        if let Some(directory) = module.record_to {
            if let Err(err) = session.start_recording(Some(directory)) {
                warn!(module = %module.identity.title, "could not start recording: {err}");
            }
        }
        sessions.push(session);
    }
    if sessions.is_empty() {
        return Err(anyhow!("no module could be loaded"));
    }

    let mut state = HostState {
        windows,
        sessions,
        hosted: BTreeMap::new(),
        monitors,
        info_refresh: config.info_refresh_interval.max(Duration::from_millis(100)),
        next_info: Instant::now(),
        saved: Vec::new(),
    };
    state.apply_container_events(&event_loop);
    info!(sessions = state.sessions.len(), "host running");

    on_ready(HostHandle {
        proxy: event_loop.create_proxy(),
    });

    event_loop
        .run(|event, elwt| state.handle_event(event, elwt))
        .map_err(|err| anyhow!("event loop failed: {err}"))?;

    Ok(state.saved)
}

impl HostState {
    fn handle_event(&mut self, event: Event<HostCommand>, elwt: &EventLoopWindowTarget<HostCommand>) {
        match event {
            Event::UserEvent(HostCommand::Shutdown) => {
                info!("shutdown requested");
                elwt.exit();
            }
            Event::WindowEvent { window_id, event } => {
                self.handle_window_event(window_id, event);
                self.apply_container_events(elwt);
                if self.sessions.is_empty() {
                    elwt.exit();
                }
            }
            Event::AboutToWait => {
                let now = Instant::now();
                self.tick_sessions(now);
                self.apply_container_events(elwt);
                self.refresh_info(now);
                match self.sessions.iter().filter_map(ModuleSession::next_deadline).min() {
                    Some(deadline) => elwt.set_control_flow(ControlFlow::WaitUntil(deadline)),
                    None => elwt.set_control_flow(ControlFlow::Wait),
                }
            }
            Event::LoopExiting => self.shutdown(),
            _ => {}
        }
    }

    fn session_index(&self, window_id: WindowId) -> Option<usize> {
        let container = self
            .hosted
            .iter()
            .find(|(_, hosted)| hosted.window.id() == window_id)
            .map(|(id, _)| *id)?;
        self.sessions
            .iter()
            .position(|session| session.container().map(|state| state.id) == Some(container))
    }

    fn handle_window_event(&mut self, window_id: WindowId, event: WindowEvent) {
        let Some(index) = self.session_index(window_id) else {
            return;
        };
        match event {
            WindowEvent::CloseRequested | WindowEvent::Destroyed => self.close_session(index),
            WindowEvent::Resized(size) => {
                if let Err(err) = self.sessions[index].resize(SurfaceSize::new(size.width, size.height)) {
                    debug!("ignoring resize: {err}");
                }
                if let Some(container) = self.sessions[index].container() {
                    if let Some(hosted) = self.hosted.get_mut(&container.id) {
                        if let Some(presenter) = hosted.presenter.as_mut() {
                            presenter.resize(size);
                        }
                    }
                }
            }
            WindowEvent::Moved(_) if self.sessions[index].mode() == DisplayMode::Windowed => {
                if let Some(container) = self.sessions[index].container() {
                    let rect = self
                        .hosted
                        .get(&container.id)
                        .and_then(|hosted| ContentRect::from_window(&hosted.window));
                    if let Some(rect) = rect {
                        let _ = self.windows.set_rect(container.id, rect);
                    }
                }
            }
            WindowEvent::RedrawRequested => self.present(index),
            WindowEvent::KeyboardInput { event, .. } => self.handle_key(index, &event),
            _ => {}
        }
    }

    fn handle_key(&mut self, index: usize, event: &KeyEvent) {
        if event.state != ElementState::Pressed || event.repeat {
            return;
        }
        let Some(action) = KeyAction::from_key(&event.logical_key) else {
            return;
        };
        if action == KeyAction::Close {
            self.close_session(index);
            return;
        }

        let session = &mut self.sessions[index];
        let result = match action {
            KeyAction::TogglePause => session.toggle_pause().map(|_| ()),
            KeyAction::ToggleFullscreen => {
                let target = if session.mode() == DisplayMode::Fullscreen {
                    DisplayMode::Windowed
                } else {
                    DisplayMode::Fullscreen
                };
                session.change_display_mode(target).map(|_| ())
            }
            KeyAction::ToggleRecording if session.is_recording() => {
                session.stop_recording().map(|summary| {
                    info!(frames = summary.frames, dropped = summary.dropped, "recording saved");
                })
            }
            KeyAction::ToggleRecording => session.start_recording(None).map(|_| ()),
            KeyAction::ShowConfiguration => session.show_configuration(),
            KeyAction::Close => Ok(()),
        };
        match result {
            Ok(()) => {}
            Err(SessionError::ConfigurationUnavailable(module)) => {
                info!(%module, "module has no configuration options");
            }
            Err(err) => warn!("{err}"),
        }
    }

    fn close_session(&mut self, index: usize) {
        let mut session = self.sessions.remove(index);
        if let Err(err) = session.close() {
            debug!("{err}");
        }
    }

    fn tick_sessions(&mut self, now: Instant) {
        for index in 0..self.sessions.len() {
            let outcome = self.sessions[index].tick(now);
            match outcome {
                Ok(TickOutcome::Rendered { .. }) => {
                    let session = &self.sessions[index];
                    if let Some(container) = session.container() {
                        if let Some(hosted) = self.hosted.get(&container.id) {
                            hosted.window.request_redraw();
                        }
                    }
                }
                Ok(_) => {}
                Err(err) => debug!("tick skipped: {err}"),
            }
        }
    }

    fn present(&mut self, index: usize) {
        let Some(container) = self.sessions[index].container() else {
            return;
        };
        let Some(hosted) = self.hosted.get_mut(&container.id) else {
            return;
        };
        let (Some(presenter), Some(frame)) = (hosted.presenter.as_mut(), self.sessions[index].latest_frame())
        else {
            return;
        };
        if let Err(err) = presenter.present(frame) {
            warn!("failed to present frame: {err:?}");
        }
    }

    fn refresh_info(&mut self, now: Instant) {
        if now < self.next_info {
            return;
        }
        self.next_info = now + self.info_refresh;
        for session in &self.sessions {
            let fps = session.current_fps_at(now);
            if let Some(container) = session.container() {
                if let Some(hosted) = self.hosted.get(&container.id) {
                    let title = match session.run_state() {
                        RunState::Running => format!("{} ({fps:.1} fps)", session.window_title()),
                        _ => session.window_title(),
                    };
                    hosted.window.set_title(&title);
                }
            }
            debug!(
                session = %session.id(),
                frames = session.frame_count(),
                fps,
                target = ?session.target_fps(),
                "session telemetry"
            );
        }
    }

    fn apply_container_events(&mut self, elwt: &EventLoopWindowTarget<HostCommand>) {
        for event in self.windows.drain_events() {
            match event {
                ContainerEvent::Created(state) => match self.build_window(&state, elwt) {
                    Ok(hosted) => {
                        self.hosted.insert(state.id, hosted);
                    }
                    Err(err) => error!(container = %state.id, "failed to open window: {err:?}"),
                },
                ContainerEvent::Updated(state) => {
                    if let Some(hosted) = self.hosted.get_mut(&state.id) {
                        apply_state(hosted, &state);
                    }
                }
                ContainerEvent::Released(id) => {
                    if self.hosted.remove(&id).is_some() {
                        debug!(container = %id, "window closed");
                    }
                }
            }
        }
    }

    fn build_window(
        &self,
        state: &ContainerState,
        elwt: &EventLoopWindowTarget<HostCommand>,
    ) -> Result<HostedWindow> {
        let mut builder = WindowBuilder::new()
            .with_title(state.title.clone())
            .with_decorations(state.decorations)
            .with_transparent(state.transparent)
            .with_window_level(window_level(state.layer));
        builder = match state.mode {
            DisplayMode::Fullscreen => {
                let monitor = state
                    .display
                    .and_then(|index| self.monitors.get(index).cloned());
                builder.with_fullscreen(Some(Fullscreen::Borderless(monitor)))
            }
            DisplayMode::Windowed | DisplayMode::Preview => builder
                .with_inner_size(PhysicalSize::new(state.rect.width, state.rect.height))
                .with_position(PhysicalPosition::new(state.rect.x, state.rect.y)),
        };
        let window = Arc::new(
            builder
                .build(elwt)
                .map_err(|err| anyhow!("failed to create window: {err}"))?,
        );
        if state.click_through {
            if let Err(err) = window.set_cursor_hittest(false) {
                warn!("click-through unsupported on this platform: {err}");
            }
        }

        let presenter = match FramePresenter::new(window.clone(), state.transparent) {
            Ok(presenter) => Some(presenter),
            Err(err) => {
                error!("failed to initialise frame presenter: {err:?}");
                None
            }
        };
        info!(container = %state.id, mode = %state.mode, layer = %state.layer, "window opened");
        Ok(HostedWindow { window, presenter })
    }

    fn shutdown(&mut self) {
        self.saved = self
            .sessions
            .iter()
            .filter_map(ModuleSession::saved_window)
            .collect();
        for mut session in self.sessions.drain(..) {
            if let Err(err) = session.close() {
                debug!("{err}");
            }
        }
        self.windows.drain_events();
        self.hosted.clear();
        info!(saved = self.saved.len(), "host stopped");
    }
}

fn apply_state(hosted: &mut HostedWindow, state: &ContainerState) {
    let window = &hosted.window;
    window.set_title(&state.title);
    window.set_window_level(window_level(state.layer));
    window.set_transparent(state.transparent);
    if let Err(err) = window.set_cursor_hittest(!state.click_through) {
        warn!("click-through unsupported on this platform: {err}");
    }
    if let Some(presenter) = hosted.presenter.as_mut() {
        presenter.set_transparent(state.transparent);
    }
}

/// In-window key bindings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyAction {
    TogglePause,
    ToggleFullscreen,
    ToggleRecording,
    ShowConfiguration,
    Close,
}

impl KeyAction {
    fn from_key(key: &Key) -> Option<Self> {
        match key {
            Key::Named(NamedKey::Space) => Some(Self::TogglePause),
            Key::Named(NamedKey::Escape) => Some(Self::Close),
            Key::Character(value) => match value.to_ascii_lowercase().as_str() {
                " " => Some(Self::TogglePause),
                "f" => Some(Self::ToggleFullscreen),
                "r" => Some(Self::ToggleRecording),
                "c" => Some(Self::ShowConfiguration),
                "q" => Some(Self::Close),
                _ => None,
            },
            _ => None,
        }
    }
}

/// Desktop sits below normal windows; floating and screen-saver layers stay on top.
pub(crate) fn window_level(layer: WindowLayer) -> WindowLevel {
    match layer {
        WindowLayer::Desktop => WindowLevel::AlwaysOnBottom,
        WindowLayer::Normal => WindowLevel::Normal,
        WindowLayer::Floating | WindowLayer::ScreenSaver => WindowLevel::AlwaysOnTop,
    }
}

impl ContentRect {
    pub(crate) fn from_window(window: &Window) -> Option<Self> {
        let position = window.outer_position().ok()?;
        let size = window.inner_size();
        Some(Self::new(position.x, position.y, size.width, size.height))
    }
}
