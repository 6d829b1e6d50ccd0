//! Plugin-session engine for SaverLab.
//!
//! A [`ModuleSession`] owns one loaded module and drives it through its
//! lifecycle. The pieces it composes are, leaf first:
//!
//! ```text
//!   AnimationClock ──tick──▶ ModuleSession::advance_frame
//!                                 │
//!                                 ├─▶ DrawSurfaceGuard ─▶ Plugin::draw(DrawContext)
//!                                 ├─▶ FrameCaptureRecorder ─▶ writer thread ─▶ frame_NNNNNN.png
//!                                 │                         └─▶ EncodeJob ─▶ MovieEncoder
//!                                 └─▶ WindowSessionManager (container bookkeeping)
//! ```
//!
//! Sessions are cooperative: an external driver calls [`ModuleSession::tick`]
//! and sleeps until [`ModuleSession::next_deadline`]. [`run_host`] is that
//! driver for interactive use, presenting frames through winit and wgpu.

mod capture;
mod display;
mod encode;
mod error;
mod gpu;
mod guard;
mod plugin;
mod session;
mod types;
mod window;

pub use capture::{
    frame_file_name, movie_path_for, CaptureError, FrameCaptureRecorder, FrameSink, OfferOutcome,
    PngFrameSink, RecordingSummary, FRAME_PATTERN,
};
pub use display::{
    ContainerEvent, ContainerId, ContainerRequest, ContainerState, DisplayError, DisplayInfo,
    WindowSessionManager,
};
pub use encode::{
    CancelToken, EncodeError, EncodeJob, EncodeRequest, EncodeStatus, FfmpegEncoder, MovieEncoder,
};
pub use error::SessionError;
pub use guard::{DrawContext, DrawSurfaceGuard, ResourceLeakWarning, SurfaceAccounting, SurfaceKind};
pub use plugin::{
    ModuleIdentity, Plugin, PluginFactory, PluginHandle, PluginLoadError, PluginLoader,
    RenderError,
};
pub use scheduler::FrameInterval;
pub use session::{
    ModuleSession, RecordingOptions, SavedWindow, SessionConfig, SessionTelemetry, TickOutcome,
    DEFAULT_CAPTURE_FRAME_RATE,
};
pub use types::{
    ContentRect, DisplayMode, ParseTokenError, RunState, SessionId, SurfaceSize, WindowLayer,
};
pub use window::{run_host, HostCommand, HostConfig, HostHandle, HostedModule};
