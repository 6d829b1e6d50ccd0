//! Accounting for the drawing resources a plugin takes during `draw()`.
//!
//! A host may run several sessions against a small pool of accelerated
//! contexts, so an acquisition a plugin forgets to release must be noticed and
//! reset rather than left to starve the next session.

use std::fmt;
use std::time::Duration;

use image::RgbaImage;

use crate::types::SurfaceSize;

/// The nested resources a plugin can hold while drawing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurfaceKind {
    /// A locked software drawing context.
    Software,
    /// A hardware-accelerated context.
    Accelerated,
}

impl fmt::Display for SurfaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Software => "software",
            Self::Accelerated => "accelerated",
        })
    }
}

/// Outstanding acquisitions that teardown had to force back to zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("module left drawing resources unbalanced (software: {software}, accelerated: {accelerated}, open draws: {draw_depth})")]
pub struct ResourceLeakWarning {
    pub software: u32,
    pub accelerated: u32,
    pub draw_depth: u32,
}

impl ResourceLeakWarning {
    pub fn kinds(&self) -> Vec<SurfaceKind> {
        let mut kinds = Vec::new();
        if self.software > 0 {
            kinds.push(SurfaceKind::Software);
        }
        if self.accelerated > 0 {
            kinds.push(SurfaceKind::Accelerated);
        }
        kinds
    }
}

/// Per-session acquisition counters.
#[derive(Debug, Default)]
pub struct SurfaceAccounting {
    draw_depth: u32,
    software: u32,
    accelerated: u32,
    clamped_releases: u64,
}

impl SurfaceAccounting {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn outstanding(&self, kind: SurfaceKind) -> u32 {
        match kind {
            SurfaceKind::Software => self.software,
            SurfaceKind::Accelerated => self.accelerated,
        }
    }

    pub fn draw_depth(&self) -> u32 {
        self.draw_depth
    }

    pub fn is_balanced(&self) -> bool {
        self.draw_depth == 0 && self.software == 0 && self.accelerated == 0
    }

    pub fn clamped_releases(&self) -> u64 {
        self.clamped_releases
    }

    /// Opens a draw scope. The returned guard closes it on every exit path.
    pub fn enter(&mut self) -> DrawSurfaceGuard<'_> {
        self.draw_depth += 1;
        let baseline = (self.software, self.accelerated);
        DrawSurfaceGuard {
            accounting: self,
            baseline,
        }
    }

    fn acquire(&mut self, kind: SurfaceKind) {
        let counter = self.counter_mut(kind);
        *counter = counter.saturating_add(1);
    }

    fn release(&mut self, kind: SurfaceKind) {
        if self.outstanding(kind) == 0 {
            self.clamped_releases += 1;
            tracing::debug!(%kind, "ignoring release of a drawing resource that was never acquired");
            return;
        }
        *self.counter_mut(kind) -= 1;
    }

    fn counter_mut(&mut self, kind: SurfaceKind) -> &mut u32 {
        match kind {
            SurfaceKind::Software => &mut self.software,
            SurfaceKind::Accelerated => &mut self.accelerated,
        }
    }

    /// Checks the counters at session teardown. Anything still held is reset
    /// to zero and reported in a single warning.
    pub fn teardown(&mut self) -> Option<ResourceLeakWarning> {
        if self.is_balanced() {
            return None;
        }
        let warning = ResourceLeakWarning {
            software: self.software,
            accelerated: self.accelerated,
            draw_depth: self.draw_depth,
        };
        self.software = 0;
        self.accelerated = 0;
        self.draw_depth = 0;
        tracing::warn!(
            software = warning.software,
            accelerated = warning.accelerated,
            draw_depth = warning.draw_depth,
            kinds = ?warning.kinds(),
            "resetting drawing resources left unbalanced by module"
        );
        Some(warning)
    }
}

/// Scope around a single `draw()` call.
pub struct DrawSurfaceGuard<'a> {
    accounting: &'a mut SurfaceAccounting,
    baseline: (u32, u32),
}

impl<'a> DrawSurfaceGuard<'a> {
    /// Builds the context handed to the plugin for this draw.
    pub fn context<'g>(
        &'g mut self,
        canvas: &'g mut RgbaImage,
        frame_index: u64,
        elapsed: Duration,
    ) -> DrawContext<'g> {
        DrawContext {
            canvas,
            accounting: &mut *self.accounting,
            frame_index,
            elapsed,
        }
    }
}

impl Drop for DrawSurfaceGuard<'_> {
    fn drop(&mut self) {
        self.accounting.draw_depth = self.accounting.draw_depth.saturating_sub(1);
        let now = (self.accounting.software, self.accounting.accelerated);
        if now != self.baseline {
            tracing::debug!(
                software = now.0,
                accelerated = now.1,
                "module returned from draw with drawing resources still held"
            );
        }
    }
}

/// What a plugin sees during `draw()`.
pub struct DrawContext<'a> {
    canvas: &'a mut RgbaImage,
    accounting: &'a mut SurfaceAccounting,
    frame_index: u64,
    elapsed: Duration,
}

impl DrawContext<'_> {
    pub fn canvas(&self) -> &RgbaImage {
        &*self.canvas
    }

    pub fn canvas_mut(&mut self) -> &mut RgbaImage {
        &mut *self.canvas
    }

    pub fn size(&self) -> SurfaceSize {
        SurfaceSize::new(self.canvas.width(), self.canvas.height())
    }

    /// Index of the frame being drawn, starting at zero.
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Time since the session started running, excluding paused spans.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn lock_focus(&mut self) {
        self.accounting.acquire(SurfaceKind::Software);
    }

    pub fn unlock_focus(&mut self) {
        self.accounting.release(SurfaceKind::Software);
    }

    pub fn acquire_accelerated(&mut self) {
        self.accounting.acquire(SurfaceKind::Accelerated);
    }

    pub fn release_accelerated(&mut self) {
        self.accounting.release(SurfaceKind::Accelerated);
    }
}
