//! Display containers handed out to sessions.
//!
//! The manager only keeps the books: geometry, layer, transparency,
//! click-through and title for every live container. Platform work is left to
//! whoever drains [`ContainerEvent`]s, which is the winit host in interactive
//! runs and nobody at all in headless ones.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tracing::{debug, warn};

use crate::types::{ContentRect, DisplayMode, SurfaceSize, WindowLayer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ContainerId(u64);

impl ContainerId {
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "container-{}", self.0)
    }
}

/// A physical output that can host a full-screen container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayInfo {
    pub name: String,
    pub origin: (i32, i32),
    pub size: SurfaceSize,
}

impl DisplayInfo {
    pub fn new(name: impl Into<String>, origin: (i32, i32), size: SurfaceSize) -> Self {
        Self {
            name: name.into(),
            origin,
            size,
        }
    }

    pub fn rect(&self) -> ContentRect {
        ContentRect::new(self.origin.0, self.origin.1, self.size.width, self.size.height)
    }
}

/// Caller-supplied overrides for a new container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerRequest {
    pub title: String,
    /// Windowed geometry. Defaults to the manager's default size at the origin.
    pub rect: Option<ContentRect>,
    /// Full-screen target. Unknown indices fall back to the first display.
    pub display: usize,
    pub layer: Option<WindowLayer>,
    pub transparent: Option<bool>,
    pub click_through: Option<bool>,
}

impl ContainerRequest {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

/// Everything the manager knows about one live container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerState {
    pub id: ContainerId,
    pub mode: DisplayMode,
    pub rect: ContentRect,
    pub display: Option<usize>,
    pub layer: WindowLayer,
    pub transparent: bool,
    pub click_through: bool,
    pub decorations: bool,
    pub title: String,
}

impl ContainerState {
    pub fn size(&self) -> SurfaceSize {
        self.rect.size()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerEvent {
    Created(ContainerState),
    Updated(ContainerState),
    Released(ContainerId),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DisplayError {
    #[error("{0} is not an active container")]
    UnknownContainer(ContainerId),
}

#[derive(Debug)]
struct Registry {
    displays: Vec<DisplayInfo>,
    default_size: SurfaceSize,
    next_id: u64,
    containers: BTreeMap<ContainerId, ContainerState>,
    emit_events: bool,
    events: Vec<ContainerEvent>,
}

impl Registry {
    fn push(&mut self, event: ContainerEvent) {
        if self.emit_events {
            self.events.push(event);
        }
    }
}

/// Shared handle to the container registry. Cloning is cheap.
#[derive(Debug, Clone)]
pub struct WindowSessionManager {
    inner: Arc<Mutex<Registry>>,
}

impl WindowSessionManager {
    pub fn new(displays: Vec<DisplayInfo>, default_size: SurfaceSize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Registry {
                displays,
                default_size: default_size.non_zero(),
                next_id: 1,
                containers: BTreeMap::new(),
                emit_events: false,
                events: Vec::new(),
            })),
        }
    }

    /// A manager with one virtual display matching `default_size`.
    pub fn headless(default_size: SurfaceSize) -> Self {
        Self::new(
            vec![DisplayInfo::new("virtual", (0, 0), default_size.non_zero())],
            default_size,
        )
    }

    /// Starts queueing [`ContainerEvent`]s for a host to apply.
    pub fn with_event_log(self) -> Self {
        self.lock().emit_events = true;
        self
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn displays(&self) -> Vec<DisplayInfo> {
        self.lock().displays.clone()
    }

    pub fn set_displays(&self, displays: Vec<DisplayInfo>) {
        self.lock().displays = displays;
    }

    pub fn default_size(&self) -> SurfaceSize {
        self.lock().default_size
    }

    pub fn acquire(&self, mode: DisplayMode, request: ContainerRequest) -> ContainerState {
        let mut registry = self.lock();
        let id = ContainerId(registry.next_id);
        registry.next_id += 1;

        let windowed_rect = request
            .rect
            .unwrap_or_else(|| ContentRect::sized(registry.default_size));
        let (rect, display, decorations, defaults) = match mode {
            DisplayMode::Windowed => (windowed_rect, None, true, (WindowLayer::Normal, false)),
            DisplayMode::Fullscreen => {
                let index = if request.display < registry.displays.len() {
                    request.display
                } else {
                    if request.display != 0 {
                        warn!(requested = request.display, "unknown display; using the first one");
                    }
                    0
                };
                let rect = registry
                    .displays
                    .get(index)
                    .map(DisplayInfo::rect)
                    .unwrap_or_else(|| ContentRect::sized(registry.default_size));
                (rect, Some(index), false, (WindowLayer::ScreenSaver, false))
            }
            DisplayMode::Preview => (windowed_rect, None, false, (WindowLayer::Floating, true)),
        };

        let state = ContainerState {
            id,
            mode,
            rect: ContentRect {
                width: rect.width.max(1),
                height: rect.height.max(1),
                ..rect
            },
            display,
            layer: request.layer.unwrap_or(defaults.0),
            transparent: request.transparent.unwrap_or(false),
            click_through: request.click_through.unwrap_or(defaults.1),
            decorations,
            title: request.title,
        };
        debug!(container = %id, %mode, size = %state.size(), "container acquired");
        registry.containers.insert(id, state.clone());
        registry.push(ContainerEvent::Created(state.clone()));
        state
    }

    /// Releases a container. Unknown or already-released ids are ignored.
    pub fn release(&self, id: ContainerId) {
        let mut registry = self.lock();
        if registry.containers.remove(&id).is_some() {
            debug!(container = %id, "container released");
            registry.push(ContainerEvent::Released(id));
        } else {
            debug!(container = %id, "ignoring release of unknown container");
        }
    }

    pub fn get(&self, id: ContainerId) -> Option<ContainerState> {
        self.lock().containers.get(&id).cloned()
    }

    pub fn active_count(&self) -> usize {
        self.lock().containers.len()
    }

    fn update<F>(&self, id: ContainerId, apply: F) -> Result<ContainerState, DisplayError>
    where
        F: FnOnce(&mut ContainerState) -> bool,
    {
        let mut registry = self.lock();
        let state = registry
            .containers
            .get_mut(&id)
            .ok_or(DisplayError::UnknownContainer(id))?;
        let changed = apply(state);
        let snapshot = state.clone();
        if changed {
            registry.push(ContainerEvent::Updated(snapshot.clone()));
        }
        Ok(snapshot)
    }

    pub fn set_layer(&self, id: ContainerId, layer: WindowLayer) -> Result<ContainerState, DisplayError> {
        self.update(id, |state| replace(&mut state.layer, layer))
    }

    pub fn set_transparent(&self, id: ContainerId, transparent: bool) -> Result<ContainerState, DisplayError> {
        self.update(id, |state| replace(&mut state.transparent, transparent))
    }

    pub fn set_click_through(&self, id: ContainerId, enabled: bool) -> Result<ContainerState, DisplayError> {
        self.update(id, |state| replace(&mut state.click_through, enabled))
    }

    pub fn set_title(&self, id: ContainerId, title: &str) -> Result<ContainerState, DisplayError> {
        self.update(id, |state| {
            if state.title == title {
                false
            } else {
                state.title = title.to_string();
                true
            }
        })
    }

    /// Records geometry reported by the platform (moves and resizes).
    pub fn set_rect(&self, id: ContainerId, rect: ContentRect) -> Result<ContainerState, DisplayError> {
        self.update(id, |state| replace(&mut state.rect, rect))
    }

    pub fn drain_events(&self) -> Vec<ContainerEvent> {
        std::mem::take(&mut self.lock().events)
    }
}

fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        false
    } else {
        *slot = value;
        true
    }
}
