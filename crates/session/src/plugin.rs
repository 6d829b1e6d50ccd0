//! The contract between the host and an animation module.
//!
//! Modules are never looked up by concrete type. A [`PluginLoader`] turns a
//! [`ModuleIdentity`] into a boxed [`Plugin`], and the session only ever talks
//! to that trait object through a [`PluginHandle`].

use std::fmt;
use std::path::PathBuf;

use scheduler::FrameInterval;
use serde::{Deserialize, Serialize};

use crate::guard::DrawContext;
use crate::types::SurfaceSize;

/// Names a module independently of how it is loaded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModuleIdentity {
    pub title: String,
    pub source: PathBuf,
}

impl ModuleIdentity {
    pub fn new(title: impl Into<String>, source: impl Into<PathBuf>) -> Self {
        Self {
            title: title.into(),
            source: source.into(),
        }
    }
}

impl fmt::Display for ModuleIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.title, self.source.display())
    }
}

/// A loaded animation module.
///
/// Implementations are driven from a single thread and are never re-entered.
pub trait Plugin {
    /// Called once after loading and again whenever the surface is resized.
    fn configure(&mut self, size: SurfaceSize);

    /// Renders one frame into the context's canvas.
    fn draw(&mut self, ctx: &mut DrawContext<'_>) -> Result<(), RenderError>;

    fn preferred_frame_interval(&self) -> FrameInterval;

    fn has_configuration_ui(&self) -> bool {
        false
    }

    fn show_configuration_ui(&mut self) {}

    /// Last call the module receives before it is dropped.
    fn teardown(&mut self) {}
}

/// Produces a plugin instance for a module at the given size. `preview` is set
/// when the module will run inside a preview container.
pub type PluginFactory =
    fn(&ModuleIdentity, SurfaceSize, bool) -> Result<Box<dyn Plugin>, PluginLoadError>;

/// Resolves module identities to plugin instances.
pub trait PluginLoader {
    fn load(
        &self,
        identity: &ModuleIdentity,
        size: SurfaceSize,
        preview: bool,
    ) -> Result<Box<dyn Plugin>, PluginLoadError>;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum PluginLoadError {
    #[error("no module named `{0}` is available")]
    UnknownModule(String),
    #[error("failed to load module `{module}`: {reason}")]
    Failed { module: String, reason: String },
}

/// A single frame's draw failure. Never fatal to the session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    #[error("draw failed: {0}")]
    Failed(String),
    #[error("draw panicked: {0}")]
    Panicked(String),
}

impl RenderError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Owned reference to one plugin instance plus the attributes the host caches
/// about it.
pub struct PluginHandle {
    identity: ModuleIdentity,
    plugin: Box<dyn Plugin>,
    size: SurfaceSize,
    released: bool,
}

impl PluginHandle {
    pub fn new(identity: ModuleIdentity, mut plugin: Box<dyn Plugin>, size: SurfaceSize) -> Self {
        let size = size.non_zero();
        plugin.configure(size);
        Self {
            identity,
            plugin,
            size,
            released: false,
        }
    }

    pub fn identity(&self) -> &ModuleIdentity {
        &self.identity
    }

    pub fn size(&self) -> SurfaceSize {
        self.size
    }

    pub fn preferred_frame_interval(&self) -> FrameInterval {
        self.plugin.preferred_frame_interval()
    }

    pub fn has_configuration_ui(&self) -> bool {
        self.plugin.has_configuration_ui()
    }

    pub fn show_configuration_ui(&mut self) {
        self.plugin.show_configuration_ui();
    }

    pub fn configure(&mut self, size: SurfaceSize) {
        let size = size.non_zero();
        if size != self.size {
            self.size = size;
            self.plugin.configure(size);
        }
    }

    pub fn draw(&mut self, ctx: &mut DrawContext<'_>) -> Result<(), RenderError> {
        self.plugin.draw(ctx)
    }

    /// Tears the plugin down. Safe to call more than once.
    pub fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.plugin.teardown();
            tracing::debug!(module = %self.identity.title, "plugin released");
        }
    }
}

impl fmt::Debug for PluginHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginHandle")
            .field("identity", &self.identity)
            .field("size", &self.size)
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}

impl Drop for PluginHandle {
    fn drop(&mut self) {
        self.release();
    }
}
