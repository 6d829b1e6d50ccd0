mod cli;
mod paths;
mod record;
mod run;
mod state;

use anyhow::{Context, Result};
use cli::{Command, PrefsAction};
use modules::ModuleRegistry;
use paths::AppPaths;
use preferences::{FilePreferenceStore, PreferenceStore, Preferences};
use session::RecordingOptions;
use state::AppState;

fn main() -> Result<()> {
    let cli = cli::parse();
    run::initialise_tracing();
    let paths = AppPaths::discover()?;

    match cli.command {
        Command::Run(args) => run::run(&paths, args),
        Command::Record(args) => record::record(&paths, args),
        Command::List(args) => list_modules(args.json),
        Command::Prefs(prefs) => handle_prefs_command(&paths, prefs.action.unwrap_or(PrefsAction::Show)),
        Command::Where => print_paths(&paths),
    }
}

fn list_modules(json: bool) -> Result<()> {
    let listings = ModuleRegistry::builtin().listings();
    if json {
        println!("{}", serde_json::to_string_pretty(&listings)?);
        return Ok(());
    }

    println!("Available modules:");
    for listing in listings {
        println!(
            "  {:<16} {:<24} {}",
            listing.title, listing.source, listing.summary
        );
    }
    Ok(())
}

fn handle_prefs_command(paths: &AppPaths, action: PrefsAction) -> Result<()> {
    let store = FilePreferenceStore::new(paths.preferences_file());
    match action {
        PrefsAction::Show => {
            let prefs = run::load_preferences(paths)?;
            print!("{}", prefs.to_toml_string()?);
        }
        PrefsAction::Reset => {
            store.save(&Preferences::default())?;
            println!("Preferences reset: {}", store.path().display());
        }
        PrefsAction::Set { key, value } => {
            let mut prefs = store.load()?;
            prefs
                .set(&key, &value)
                .with_context(|| format!("could not set `{key}`"))?;
            store.save(&prefs)?;
            println!("{key} = {value}");
        }
    }
    Ok(())
}

fn print_paths(paths: &AppPaths) -> Result<()> {
    let prefs = run::load_preferences(paths)?;
    let recordings = RecordingOptions::from_preferences(&prefs.recording).images_directory;
    let state = AppState::load_or_default(&paths.state_file())?;

    println!("Configuration directories:");
    println!("  config:      {}", paths.config_dir().display());
    println!("  data:        {}", paths.data_dir().display());
    println!("  preferences: {}", paths.preferences_file().display());
    println!("  state:       {}", paths.state_file().display());
    println!("  recordings:  {}", recordings.display());
    if !state.saved_windows.is_empty() {
        println!("Saved windows:");
        for window in &state.saved_windows {
            println!(
                "  {:<16} {} {}x{} at {},{}",
                window.module,
                window.mode,
                window.rect.width,
                window.rect.height,
                window.rect.x,
                window.rect.y
            );
        }
    }
    Ok(())
}
