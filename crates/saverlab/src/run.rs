use std::thread;

use anyhow::{bail, Context, Result};
use modules::ModuleRegistry;
use preferences::{FilePreferenceStore, PreferenceStore, Preferences};
use session::{
    run_host, DisplayMode, HostConfig, HostedModule, SavedWindow, SessionConfig, WindowLayer,
};
use tracing_subscriber::EnvFilter;

use crate::cli::RunArgs;
use crate::paths::AppPaths;
use crate::state::AppState;

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

pub fn load_preferences(paths: &AppPaths) -> Result<Preferences> {
    let store = FilePreferenceStore::new(paths.preferences_file());
    let prefs = store
        .load()
        .with_context(|| format!("failed to load preferences from {}", store.path().display()))?;
    prefs.validate().context("preferences file is invalid")?;
    Ok(prefs)
}

pub fn run(paths: &AppPaths, args: RunArgs) -> Result<()> {
    let prefs = load_preferences(paths)?;
    let registry = ModuleRegistry::builtin();
    let state_file = paths.state_file();
    let mut state = AppState::load_or_default(&state_file)?;
    tracing::debug!(
        config = %paths.config_dir().display(),
        data = %paths.data_dir().display(),
        saved_windows = state.saved_windows.len(),
        restore = prefs.restore_windows_on_startup,
        "resolved saverlab paths"
    );

    let modules = hosted_modules(&args, &prefs, &registry, &state)?;
    let config = HostConfig {
        modules,
        default_size: prefs.default_window_size.into(),
        info_refresh_interval: prefs.info_refresh_interval,
    };

    let duration = args.duration;
    let saved = run_host(config, &registry, |handle| {
        let Some(duration) = duration else {
            return;
        };
        let spawned = thread::Builder::new()
            .name("saverlab-timer".into())
            .spawn(move || {
                thread::sleep(duration);
                if let Err(err) = handle.shutdown() {
                    tracing::debug!("{err}");
                }
            });
        if let Err(err) = spawned {
            tracing::warn!("failed to start --duration timer: {err}");
        }
    })?;

    if prefs.restore_windows_on_startup {
        state.saved_windows = saved;
        state.persist(&state_file)?;
        tracing::info!(windows = state.saved_windows.len(), "saved windows for next launch");
    }
    Ok(())
}

fn hosted_modules(
    args: &RunArgs,
    prefs: &Preferences,
    registry: &ModuleRegistry,
    state: &AppState,
) -> Result<Vec<HostedModule>> {
    if args.modules.is_empty() {
        if prefs.restore_windows_on_startup && !state.saved_windows.is_empty() {
            let restored = restore_saved(prefs, registry, &state.saved_windows);
            if restored.is_empty() {
                bail!("none of the saved windows name a known module");
            }
            tracing::info!(windows = restored.len(), "restoring saved windows");
            return Ok(restored);
        }
        bail!("no module given; `saverlab list` shows what is available");
    }

    let multiple = args.modules.len() > 1;
    args.modules
        .iter()
        .map(|name| -> Result<HostedModule> {
            let identity = registry.identity(name)?;
            let record_to = args.record.as_ref().map(|dir| {
                if multiple {
                    dir.join(&identity.title)
                } else {
                    dir.clone()
                }
            });
            Ok(HostedModule {
                config: session_config(args, prefs),
                identity,
                record_to,
            })
        })
        .collect()
}

fn session_config(args: &RunArgs, prefs: &Preferences) -> SessionConfig {
    let mut config = SessionConfig::from_preferences(prefs);
    if let Some(display) = args.fullscreen {
        config.mode = DisplayMode::Fullscreen;
        config.display = display;
    } else if args.preview {
        config.mode = DisplayMode::Preview;
    }
    if let Some(size) = args.size {
        config.size = size;
    }
    config.layer = args.layer;
    config.transparent = args.transparent.then_some(true);
    config.click_through = args.click_through.then_some(true);
    config
}

fn restore_saved(
    prefs: &Preferences,
    registry: &ModuleRegistry,
    saved: &[SavedWindow],
) -> Vec<HostedModule> {
    saved
        .iter()
        .filter_map(|window| {
            let identity = match registry.identity(&window.module) {
                Ok(identity) => identity,
                Err(err) => {
                    tracing::warn!("skipping saved window: {err}");
                    return None;
                }
            };
            let mut config = SessionConfig::from_preferences(prefs).with_mode(window.mode);
            config.rect = Some(window.rect);
            config.size = window.rect.size();
            let layer = window.layer();
            config.layer = (layer != WindowLayer::Normal).then_some(layer);
            config.transparent = Some(window.transparent);
            config.click_through = Some(window.click_through);
            Some(HostedModule {
                identity,
                config,
                record_to: None,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use clap::Parser;
    use session::ContentRect;

    use super::*;
    use crate::cli::{Cli, Command};

    fn run_args(argv: &[&str]) -> RunArgs {
        let mut full = vec!["saverlab", "run"];
        full.extend_from_slice(argv);
        match Cli::try_parse_from(full).unwrap().command {
            Command::Run(args) => args,
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn flags_become_session_config() {
        let args = run_args(&["plasma", "--fullscreen", "1", "--layer", "desktop", "--transparent"]);
        let config = session_config(&args, &Preferences::default());
        assert_eq!(config.mode, DisplayMode::Fullscreen);
        assert_eq!(config.display, 1);
        assert_eq!(config.layer, Some(WindowLayer::Desktop));
        assert_eq!(config.transparent, Some(true));
        assert_eq!(config.click_through, None);
    }

    #[test]
    fn multiple_modules_record_into_subdirectories() {
        let args = run_args(&["plasma", "starfield", "--record", "/tmp/takes"]);
        let modules =
            hosted_modules(&args, &Preferences::default(), &ModuleRegistry::builtin(), &AppState::default())
                .unwrap();
        assert_eq!(modules.len(), 2);
        assert_eq!(modules[0].record_to, Some(PathBuf::from("/tmp/takes/Plasma")));
        assert_eq!(modules[1].record_to, Some(PathBuf::from("/tmp/takes/Starfield")));
    }

    #[test]
    fn unknown_module_is_an_error() {
        let args = run_args(&["fireworks"]);
        let err = hosted_modules(&args, &Preferences::default(), &ModuleRegistry::builtin(), &AppState::default())
            .unwrap_err();
        assert!(err.to_string().contains("fireworks"));
    }

    #[test]
    fn restores_saved_windows_when_enabled() {
        let prefs = Preferences {
            restore_windows_on_startup: true,
            ..Preferences::default()
        };
        let state = AppState {
            saved_windows: vec![
                SavedWindow {
                    module: "Starfield".to_string(),
                    mode: DisplayMode::Windowed,
                    rect: ContentRect::new(40, 50, 320, 200),
                    layer: "floating".to_string(),
                    transparent: false,
                    click_through: true,
                },
                SavedWindow {
                    module: "Retired Module".to_string(),
                    mode: DisplayMode::Windowed,
                    rect: ContentRect::new(0, 0, 100, 100),
                    layer: "normal".to_string(),
                    transparent: false,
                    click_through: false,
                },
            ],
        };
        let modules = hosted_modules(&run_args(&[]), &prefs, &ModuleRegistry::builtin(), &state).unwrap();
        assert_eq!(modules.len(), 1);
        assert_eq!(modules[0].identity.title, "Starfield");
        assert_eq!(modules[0].config.rect, Some(ContentRect::new(40, 50, 320, 200)));
        assert_eq!(modules[0].config.layer, Some(WindowLayer::Floating));
        assert_eq!(modules[0].config.click_through, Some(true));
    }

    #[test]
    fn nothing_to_run_without_restore() {
        let state = AppState {
            saved_windows: vec![SavedWindow {
                module: "Plasma".to_string(),
                mode: DisplayMode::Windowed,
                rect: ContentRect::new(0, 0, 100, 100),
                layer: "normal".to_string(),
                transparent: false,
                click_through: false,
            }],
        };
        assert!(hosted_modules(&run_args(&[]), &Preferences::default(), &ModuleRegistry::builtin(), &state).is_err());
    }
}
