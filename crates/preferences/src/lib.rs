//! Injectable preferences service for SaverLab.
//!
//! `Preferences` is a plain serde struct persisted as TOML. Whatever constructs a
//! session receives a [`PreferenceStore`] by reference instead of reaching for a
//! global, so tests can swap in [`MemoryPreferenceStore`].

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};

#[derive(Debug, thiserror::Error)]
pub enum PreferencesError {
    #[error("failed to parse preferences: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize preferences: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("failed to access preferences at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid preferences: {0}")]
    Invalid(String),
    #[error("unknown preference '{0}'")]
    UnknownKey(String),
}

/// Highest frame rate accepted for a custom recording rate.
pub const MAX_CUSTOM_FRAME_RATE: u32 = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSize {
    pub width: u32,
    pub height: u32,
}

impl WindowSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for WindowSize {
    fn default() -> Self {
        Self::new(640, 480)
    }
}

impl fmt::Display for WindowSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// The three choices the recording preferences offer for what happens to the
/// captured image sequence once a recording stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingDisposition {
    /// Assemble a movie, then delete the images.
    CreateAndDelete,
    /// Assemble a movie and keep the images.
    CreateAndKeep,
    /// Keep the images only.
    ImagesOnly,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingPreferences {
    pub create_movie: bool,
    pub delete_source_images: bool,
    pub use_custom_frame_rate: bool,
    pub custom_frame_rate: u32,
    pub images_directory: Option<PathBuf>,
}

impl Default for RecordingPreferences {
    fn default() -> Self {
        Self {
            create_movie: true,
            delete_source_images: true,
            use_custom_frame_rate: false,
            custom_frame_rate: 30,
            images_directory: None,
        }
    }
}

impl RecordingPreferences {
    pub fn disposition(&self) -> RecordingDisposition {
        match (self.create_movie, self.delete_source_images) {
            (true, true) => RecordingDisposition::CreateAndDelete,
            (true, false) => RecordingDisposition::CreateAndKeep,
            (false, _) => RecordingDisposition::ImagesOnly,
        }
    }

    pub fn set_disposition(&mut self, disposition: RecordingDisposition) {
        let (create, delete) = match disposition {
            RecordingDisposition::CreateAndDelete => (true, true),
            RecordingDisposition::CreateAndKeep => (true, false),
            RecordingDisposition::ImagesOnly => (false, false),
        };
        self.create_movie = create;
        self.delete_source_images = delete;
    }

    /// Frame rate override for movie assembly, if the user asked for one.
    pub fn frame_rate_override(&self) -> Option<u32> {
        self.use_custom_frame_rate.then_some(self.custom_frame_rate)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub default_window_size: WindowSize,
    pub show_module_list_on_startup: bool,
    pub show_module_list_when_no_windows: bool,
    pub restore_windows_on_startup: bool,
    pub preview_visible: bool,
    pub auto_update_module_list: bool,
    pub show_console_on_output: bool,
    /// How often hosts refresh the FPS readout in window titles and logs.
    #[serde(
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub info_refresh_interval: Duration,
    pub recording: RecordingPreferences,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            default_window_size: WindowSize::default(),
            show_module_list_on_startup: true,
            show_module_list_when_no_windows: true,
            restore_windows_on_startup: false,
            preview_visible: true,
            auto_update_module_list: true,
            show_console_on_output: false,
            info_refresh_interval: default_info_refresh(),
            recording: RecordingPreferences::default(),
        }
    }
}

fn default_info_refresh() -> Duration {
    Duration::from_secs(1)
}

fn serialize_duration<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&humantime::format_duration(*value).to_string())
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Duration;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of seconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v)
                .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Duration::from_secs(v))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Duration::from_secs(v as u64))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v.is_nan() || v.is_sign_negative() {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Duration::from_secs_f64(v))
        }
    }

    deserializer.deserialize_any(Visitor)
}

impl Preferences {
    pub fn from_toml_str(input: &str) -> Result<Self, PreferencesError> {
        let prefs: Preferences = toml::from_str(input)?;
        prefs.validate()?;
        Ok(prefs)
    }

    pub fn to_toml_string(&self) -> Result<String, PreferencesError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), PreferencesError> {
        let size = self.default_window_size;
        if size.width == 0 || size.height == 0 {
            return Err(PreferencesError::Invalid(format!(
                "default_window_size must be non-zero (got {size})"
            )));
        }

        let rate = self.recording.custom_frame_rate;
        if !(1..=MAX_CUSTOM_FRAME_RATE).contains(&rate) {
            return Err(PreferencesError::Invalid(format!(
                "recording.custom_frame_rate must be between 1 and {MAX_CUSTOM_FRAME_RATE} (got {rate})"
            )));
        }

        if self.info_refresh_interval.is_zero() {
            return Err(PreferencesError::Invalid(
                "info_refresh_interval must be greater than zero".into(),
            ));
        }

        if let Some(dir) = &self.recording.images_directory {
            if dir.as_os_str().is_empty() {
                return Err(PreferencesError::Invalid(
                    "recording.images_directory may not be empty".into(),
                ));
            }
        }

        Ok(())
    }

    /// Updates a single option from its dotted key and a string value, as used
    /// by `saverlab prefs set`. The result is validated before it is kept.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), PreferencesError> {
        let mut updated = self.clone();
        let value = value.trim();
        match key.trim() {
            "default_window_size" => updated.default_window_size = parse_size(value)?,
            "show_module_list_on_startup" => {
                updated.show_module_list_on_startup = parse_bool(key, value)?
            }
            "show_module_list_when_no_windows" => {
                updated.show_module_list_when_no_windows = parse_bool(key, value)?
            }
            "restore_windows_on_startup" => {
                updated.restore_windows_on_startup = parse_bool(key, value)?
            }
            "preview_visible" => updated.preview_visible = parse_bool(key, value)?,
            "auto_update_module_list" => updated.auto_update_module_list = parse_bool(key, value)?,
            "show_console_on_output" => updated.show_console_on_output = parse_bool(key, value)?,
            "info_refresh_interval" => {
                updated.info_refresh_interval = humantime::parse_duration(value).map_err(|err| {
                    PreferencesError::Invalid(format!("invalid duration '{value}': {err}"))
                })?
            }
            "recording.disposition" => updated
                .recording
                .set_disposition(parse_disposition(value)?),
            "recording.create_movie" => updated.recording.create_movie = parse_bool(key, value)?,
            "recording.delete_source_images" => {
                updated.recording.delete_source_images = parse_bool(key, value)?
            }
            "recording.use_custom_frame_rate" => {
                updated.recording.use_custom_frame_rate = parse_bool(key, value)?
            }
            "recording.custom_frame_rate" => {
                updated.recording.custom_frame_rate = value.parse().map_err(|_| {
                    PreferencesError::Invalid(format!("invalid frame rate '{value}'"))
                })?
            }
            "recording.images_directory" => {
                updated.recording.images_directory = if value.is_empty() {
                    None
                } else {
                    Some(PathBuf::from(value))
                }
            }
            other => return Err(PreferencesError::UnknownKey(other.to_string())),
        }
        updated.validate()?;
        *self = updated;
        Ok(())
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, PreferencesError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        other => Err(PreferencesError::Invalid(format!(
            "'{key}' expects a boolean, got '{other}'"
        ))),
    }
}

fn parse_disposition(value: &str) -> Result<RecordingDisposition, PreferencesError> {
    match value.to_ascii_lowercase().as_str() {
        "create-and-delete" => Ok(RecordingDisposition::CreateAndDelete),
        "create-and-keep" => Ok(RecordingDisposition::CreateAndKeep),
        "images-only" => Ok(RecordingDisposition::ImagesOnly),
        other => Err(PreferencesError::Invalid(format!(
            "unknown recording disposition '{other}'; expected create-and-delete, create-and-keep or images-only"
        ))),
    }
}

fn parse_size(value: &str) -> Result<WindowSize, PreferencesError> {
    let (w, h) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| PreferencesError::Invalid("expected WIDTHxHEIGHT".into()))?;
    let width = w
        .trim()
        .parse::<u32>()
        .map_err(|_| PreferencesError::Invalid(format!("invalid width in '{value}'")))?;
    let height = h
        .trim()
        .parse::<u32>()
        .map_err(|_| PreferencesError::Invalid(format!("invalid height in '{value}'")))?;
    Ok(WindowSize::new(width, height))
}

/// Read/write access to the persisted preferences.
pub trait PreferenceStore: Send + Sync {
    fn load(&self) -> Result<Preferences, PreferencesError>;
    fn save(&self, prefs: &Preferences) -> Result<(), PreferencesError>;
}

/// TOML file backed store. A missing file reads as the defaults.
#[derive(Debug, Clone)]
pub struct FilePreferenceStore {
    path: PathBuf,
}

impl FilePreferenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PreferenceStore for FilePreferenceStore {
    fn load(&self) -> Result<Preferences, PreferencesError> {
        if !self.path.exists() {
            return Ok(Preferences::default());
        }
        let contents = fs::read_to_string(&self.path).map_err(|source| PreferencesError::Io {
            path: self.path.clone(),
            source,
        })?;
        Preferences::from_toml_str(&contents)
    }

    fn save(&self, prefs: &Preferences) -> Result<(), PreferencesError> {
        prefs.validate()?;
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).map_err(|source| PreferencesError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        let serialized = prefs.to_toml_string()?;
        fs::write(&self.path, serialized).map_err(|source| PreferencesError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

#[derive(Debug, Default)]
pub struct MemoryPreferenceStore {
    inner: Mutex<Preferences>,
}

impl MemoryPreferenceStore {
    pub fn new(prefs: Preferences) -> Self {
        Self {
            inner: Mutex::new(prefs),
        }
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn load(&self) -> Result<Preferences, PreferencesError> {
        Ok(self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save(&self, prefs: &Preferences) -> Result<(), PreferencesError> {
        prefs.validate()?;
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner) = prefs.clone();
        Ok(())
    }
}
