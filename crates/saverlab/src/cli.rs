use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use session::{SurfaceSize, WindowLayer};

#[derive(Parser, Debug)]
#[command(
    name = "saverlab",
    author,
    version,
    about = "Preview, debug and record screen-animation modules"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Open modules in windows (or full screen) and animate them.
    Run(RunArgs),
    /// Render a module headless and record its frames.
    Record(RecordArgs),
    /// List the available modules.
    List(ListArgs),
    /// Show or change preferences.
    Prefs(PrefsCommand),
    /// Print resolved configuration and data locations.
    Where,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Module titles or slugs. Without any, the windows saved by the last run
    /// are restored when `restore_windows_on_startup` is set.
    #[arg(value_name = "MODULE")]
    pub modules: Vec<String>,

    /// Run full screen, optionally on display N (default 0).
    #[arg(
        long,
        value_name = "N",
        num_args = 0..=1,
        default_missing_value = "0",
        conflicts_with = "preview"
    )]
    pub fullscreen: Option<usize>,

    /// Run in a borderless click-through preview container.
    #[arg(long)]
    pub preview: bool,

    /// Window size, e.g. `800x600`. Defaults to the preferred window size.
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_size)]
    pub size: Option<SurfaceSize>,

    /// Window layer: desktop, normal, floating or screensaver.
    #[arg(long, value_name = "LAYER", value_parser = parse_layer)]
    pub layer: Option<WindowLayer>,

    /// Request a transparent surface.
    #[arg(long)]
    pub transparent: bool,

    /// Let mouse input pass through the window.
    #[arg(long)]
    pub click_through: bool,

    /// Start recording into DIR as soon as the module runs.
    #[arg(long, value_name = "DIR")]
    pub record: Option<PathBuf>,

    /// Exit after this many seconds.
    #[arg(long, value_name = "SECONDS", value_parser = parse_seconds)]
    pub duration: Option<Duration>,
}

#[derive(Args, Debug)]
pub struct RecordArgs {
    /// Module title or slug.
    #[arg(value_name = "MODULE")]
    pub module: String,

    /// Number of frames to render.
    #[arg(long, value_name = "N", default_value_t = 90)]
    pub frames: u64,

    /// Image directory. Defaults to a timestamped directory under the
    /// preferred recordings directory.
    #[arg(long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Keep the image sequence without assembling a movie.
    #[arg(long)]
    pub no_movie: bool,

    /// Keep the images after the movie is assembled.
    #[arg(long)]
    pub keep_images: bool,

    /// Movie frame rate, overriding the module's own rate.
    #[arg(long, value_name = "FPS", value_parser = clap::value_parser!(u32).range(1..=120))]
    pub fps: Option<u32>,

    /// Surface size, e.g. `320x240`.
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_size)]
    pub size: Option<SurfaceSize>,

    /// Print the recording summary as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Print the module list as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct PrefsCommand {
    #[command(subcommand)]
    pub action: Option<PrefsAction>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum PrefsAction {
    /// Print the current preferences as TOML.
    Show,
    /// Restore every preference to its default.
    Reset,
    /// Change one preference, e.g. `recording.create_movie false`.
    Set { key: String, value: String },
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_size(value: &str) -> Result<SurfaceSize, String> {
    let (w, h) = value
        .trim()
        .split_once(['x', 'X'])
        .ok_or_else(|| "expected WIDTHxHEIGHT".to_string())?;
    let width = w
        .trim()
        .parse::<u32>()
        .map_err(|_| format!("invalid width in '{value}'"))?;
    let height = h
        .trim()
        .parse::<u32>()
        .map_err(|_| format!("invalid height in '{value}'"))?;
    if width == 0 || height == 0 {
        return Err("size must be greater than zero".into());
    }
    Ok(SurfaceSize::new(width, height))
}

pub fn parse_layer(value: &str) -> Result<WindowLayer, String> {
    value.parse::<WindowLayer>().map_err(|err| {
        let known: Vec<&str> = WindowLayer::ALL.iter().map(WindowLayer::token).collect();
        format!("{err}; expected one of {}", known.join(", "))
    })
}

pub fn parse_seconds(value: &str) -> Result<Duration, String> {
    let seconds: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("invalid number of seconds '{value}'"))?;
    if !seconds.is_finite() || seconds <= 0.0 {
        return Err("duration must be a positive number of seconds".into());
    }
    Ok(Duration::from_secs_f64(seconds))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sizes() {
        assert_eq!(parse_size("800x600").unwrap(), SurfaceSize::new(800, 600));
        assert_eq!(parse_size(" 32 X 24 ").unwrap(), SurfaceSize::new(32, 24));
        assert!(parse_size("800").is_err());
        assert!(parse_size("0x600").is_err());
        assert!(parse_size("wide x tall").is_err());
    }

    #[test]
    fn parses_layers() {
        assert_eq!(parse_layer("floating").unwrap(), WindowLayer::Floating);
        assert_eq!(parse_layer("ScreenSaver").unwrap(), WindowLayer::ScreenSaver);
        let err = parse_layer("ceiling").unwrap_err();
        assert!(err.contains("desktop, normal, floating, screensaver"), "{err}");
    }

    #[test]
    fn parses_seconds() {
        assert_eq!(parse_seconds("1.5").unwrap(), Duration::from_millis(1500));
        assert!(parse_seconds("0").is_err());
        assert!(parse_seconds("soon").is_err());
    }

    #[test]
    fn fullscreen_takes_an_optional_display() {
        let cli = Cli::try_parse_from(["saverlab", "run", "plasma", "--fullscreen"]).unwrap();
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.fullscreen, Some(0));

        let cli = Cli::try_parse_from(["saverlab", "run", "--fullscreen", "2", "plasma"]).unwrap();
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.fullscreen, Some(2));
        assert_eq!(args.modules, ["plasma"]);
    }

    #[test]
    fn fullscreen_and_preview_conflict() {
        assert!(Cli::try_parse_from(["saverlab", "run", "plasma", "--fullscreen", "--preview"]).is_err());
    }

    #[test]
    fn record_rejects_out_of_range_rates() {
        assert!(Cli::try_parse_from(["saverlab", "record", "plasma", "--fps", "0"]).is_err());
        assert!(Cli::try_parse_from(["saverlab", "record", "plasma", "--fps", "121"]).is_err());
        let cli = Cli::try_parse_from(["saverlab", "record", "plasma", "--frames", "5", "--fps", "24"]).unwrap();
        let Command::Record(args) = cli.command else {
            panic!("expected record");
        };
        assert_eq!((args.frames, args.fps), (5, Some(24)));
    }
}
