use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier for a [`crate::ModuleSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SessionId(u64);

impl SessionId {
    pub fn next() -> Self {
        Self(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where a session's output is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    Windowed,
    Fullscreen,
    /// Borderless overlay used when a module is embedded in a preview pane.
    Preview,
}

impl DisplayMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Windowed => "windowed",
            Self::Fullscreen => "fullscreen",
            Self::Preview => "preview",
        }
    }

    pub fn is_preview(&self) -> bool {
        matches!(self, Self::Preview)
    }
}

impl fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DisplayMode {
    type Err = ParseTokenError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "windowed" | "window" => Ok(Self::Windowed),
            "fullscreen" | "full-screen" => Ok(Self::Fullscreen),
            "preview" => Ok(Self::Preview),
            _ => Err(ParseTokenError {
                kind: "display mode",
                token: value.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Uninitialized,
    Initializing,
    Running,
    Paused,
    Stopped,
    Closing,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Initializing => "initializing",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
            Self::Closing => "closing",
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running | Self::Paused)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pixel dimensions of a plugin's drawing surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SurfaceSize {
    pub width: u32,
    pub height: u32,
}

impl SurfaceSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Clamps both dimensions to at least one pixel.
    pub fn non_zero(self) -> Self {
        Self::new(self.width.max(1), self.height.max(1))
    }
}

impl From<preferences::WindowSize> for SurfaceSize {
    fn from(size: preferences::WindowSize) -> Self {
        Self::new(size.width, size.height)
    }
}

impl fmt::Display for SurfaceSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Container geometry in desktop coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl ContentRect {
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn sized(size: SurfaceSize) -> Self {
        Self::new(0, 0, size.width, size.height)
    }

    pub fn size(&self) -> SurfaceSize {
        SurfaceSize::new(self.width, self.height)
    }
}

/// Stacking level of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum WindowLayer {
    /// Behind ordinary windows, like a desktop picture.
    Desktop,
    #[default]
    Normal,
    Floating,
    ScreenSaver,
}

impl WindowLayer {
    pub const ALL: [WindowLayer; 4] = [
        WindowLayer::Desktop,
        WindowLayer::Normal,
        WindowLayer::Floating,
        WindowLayer::ScreenSaver,
    ];

    pub fn token(&self) -> &'static str {
        match self {
            Self::Desktop => "desktop",
            Self::Normal => "normal",
            Self::Floating => "floating",
            Self::ScreenSaver => "screensaver",
        }
    }

    /// Parses a persisted token, falling back to `Normal` for anything unknown.
    pub fn from_token_or_normal(token: &str) -> Self {
        token.parse().unwrap_or_else(|err: ParseTokenError| {
            tracing::warn!(%err, "falling back to normal window layer");
            Self::Normal
        })
    }
}

impl fmt::Display for WindowLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for WindowLayer {
    type Err = ParseTokenError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|layer| layer.token().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| ParseTokenError {
                kind: "window layer",
                token: value.to_string(),
            })
    }
}

impl TryFrom<String> for WindowLayer {
    type Error = ParseTokenError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<WindowLayer> for String {
    fn from(layer: WindowLayer) -> Self {
        layer.token().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} `{token}`")]
pub struct ParseTokenError {
    kind: &'static str,
    token: String,
}
