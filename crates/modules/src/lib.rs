//! Built-in animation modules and the registry that hands them to sessions.
//!
//! `ModuleRegistry` is the `PluginLoader` the host and CLI load through. It is
//! a table of factories keyed by title, so adding a module means adding one
//! `ModuleEntry` to `ModuleRegistry::builtin`.
//!
//! Types:
//!
//! - `ModuleEntry` describes one module: display title, stable slug, summary,
//!   and the factory that instantiates it.
//! - `ModuleListing` is the serialisable view used by `saverlab list --json`.
//! - `ModuleRegistry` owns the entries and resolves names to identities.
//!
//! Lookup accepts the title (case-insensitive), the slug, or the identity
//! source path `builtin/<slug>`.

mod boxes;
mod plasma;
mod starfield;

pub use boxes::BouncingBoxes;
pub use plasma::Plasma;
pub use starfield::Starfield;

use std::path::Path;

use serde::Serialize;
use session::{ModuleIdentity, Plugin, PluginFactory, PluginLoadError, PluginLoader, SurfaceSize};
use tracing::debug;

/// Prefix of the identity source for modules compiled into the binary.
pub const BUILTIN_SOURCE: &str = "builtin";

#[derive(Clone)]
pub struct ModuleEntry {
    pub title: &'static str,
    pub slug: &'static str,
    pub summary: &'static str,
    pub factory: PluginFactory,
}

impl ModuleEntry {
    pub fn identity(&self) -> ModuleIdentity {
        ModuleIdentity::new(self.title, Path::new(BUILTIN_SOURCE).join(self.slug))
    }

    fn matches(&self, name: &str) -> bool {
        let name = name.trim();
        self.title.eq_ignore_ascii_case(name)
            || self.slug == name
            || Path::new(name) == Path::new(BUILTIN_SOURCE).join(self.slug)
    }
}

impl std::fmt::Debug for ModuleEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleEntry")
            .field("title", &self.title)
            .field("slug", &self.slug)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleListing {
    pub title: String,
    pub slug: String,
    pub source: String,
    pub summary: String,
}

#[derive(Debug, Clone, Default)]
pub struct ModuleRegistry {
    entries: Vec<ModuleEntry>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builtin() -> Self {
        Self::new()
            .with(ModuleEntry {
                title: "Plasma",
                slug: "plasma",
                summary: "Sine plasma at 30 fps; the configuration key cycles palettes",
                factory: plasma::create,
            })
            .with(ModuleEntry {
                title: "Starfield",
                slug: "starfield",
                summary: "Stars streaming towards the viewer at 60 fps",
                factory: starfield::create,
            })
            .with(ModuleEntry {
                title: "Bouncing Boxes",
                slug: "bouncing-boxes",
                summary: "Boxes bouncing off the edges, unlimited frame rate",
                factory: boxes::create,
            })
    }

    /// Adds an entry. An entry with the same title replaces the earlier one.
    pub fn with(mut self, entry: ModuleEntry) -> Self {
        self.entries.retain(|existing| existing.title != entry.title);
        self.entries.push(entry);
        self
    }

    pub fn list(&self) -> &[ModuleEntry] {
        &self.entries
    }

    pub fn listings(&self) -> Vec<ModuleListing> {
        self.entries
            .iter()
            .map(|entry| ModuleListing {
                title: entry.title.to_string(),
                slug: entry.slug.to_string(),
                source: entry.identity().source.display().to_string(),
                summary: entry.summary.to_string(),
            })
            .collect()
    }

    pub fn find(&self, name: &str) -> Option<&ModuleEntry> {
        self.entries.iter().find(|entry| entry.matches(name))
    }

    pub fn identity(&self, name: &str) -> Result<ModuleIdentity, PluginLoadError> {
        self.find(name)
            .map(ModuleEntry::identity)
            .ok_or_else(|| PluginLoadError::UnknownModule(name.to_string()))
    }
}

impl PluginLoader for ModuleRegistry {
    fn load(
        &self,
        identity: &ModuleIdentity,
        size: SurfaceSize,
        preview: bool,
    ) -> Result<Box<dyn Plugin>, PluginLoadError> {
        let entry = self
            .find(&identity.title)
            .ok_or_else(|| PluginLoadError::UnknownModule(identity.title.clone()))?;
        debug!(module = entry.title, %size, preview, "instantiating built-in module");
        (entry.factory)(identity, size, preview)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_modules_are_listed_in_order() {
        let registry = ModuleRegistry::builtin();
        let titles: Vec<&str> = registry.list().iter().map(|entry| entry.title).collect();
        assert_eq!(titles, ["Plasma", "Starfield", "Bouncing Boxes"]);
    }

    #[test]
    fn lookup_by_title_slug_or_source() {
        let registry = ModuleRegistry::builtin();
        assert_eq!(registry.find("plasma").map(|e| e.title), Some("Plasma"));
        assert_eq!(registry.find("BOUNCING BOXES").map(|e| e.slug), Some("bouncing-boxes"));
        assert_eq!(
            registry.find("builtin/starfield").map(|e| e.title),
            Some("Starfield")
        );
        assert!(registry.find("fireworks").is_none());
    }

    #[test]
    fn identity_carries_builtin_source() {
        let registry = ModuleRegistry::builtin();
        let identity = registry.identity("starfield").unwrap();
        assert_eq!(identity.title, "Starfield");
        assert_eq!(identity.source, Path::new("builtin").join("starfield"));
        assert!(matches!(
            registry.identity("nope"),
            Err(PluginLoadError::UnknownModule(name)) if name == "nope"
        ));
    }

    #[test]
    fn loads_every_builtin_module() {
        let registry = ModuleRegistry::builtin();
        for entry in registry.list() {
            let plugin = registry
                .load(&entry.identity(), SurfaceSize::new(64, 48), false)
                .unwrap();
            let _ = plugin.preferred_frame_interval();
        }
    }

    #[test]
    fn unknown_identity_fails_to_load() {
        let registry = ModuleRegistry::builtin();
        let identity = ModuleIdentity::new("Ghost", "builtin/ghost");
        assert!(matches!(
            registry.load(&identity, SurfaceSize::new(8, 8), false),
            Err(PluginLoadError::UnknownModule(_))
        ));
    }

    #[test]
    fn later_entries_replace_earlier_ones() {
        let registry = ModuleRegistry::builtin().with(ModuleEntry {
            title: "Plasma",
            slug: "plasma-v2",
            summary: "replacement",
            factory: plasma::create,
        });
        assert_eq!(registry.list().len(), 3);
        assert_eq!(registry.find("Plasma").map(|e| e.slug), Some("plasma-v2"));
    }

    #[test]
    fn listings_serialise() {
        let listings = ModuleRegistry::builtin().listings();
        assert_eq!(listings[0].source, Path::new("builtin").join("plasma").display().to_string());
    }
}
