use std::env;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use directories_next::ProjectDirs;

pub const ENV_CONFIG_DIR: &str = "SAVERLAB_CONFIG_DIR";
pub const ENV_DATA_DIR: &str = "SAVERLAB_DATA_DIR";

const QUALIFIER: &str = "org";
const ORGANISATION: &str = "SaverLab";
const APPLICATION: &str = "SaverLab";

#[derive(Debug, Clone)]
pub struct AppPaths {
    config_dir: PathBuf,
    data_dir: PathBuf,
}

impl AppPaths {
    pub fn discover() -> Result<Self> {
        let config_override = env_override(ENV_CONFIG_DIR);
        let data_override = env_override(ENV_DATA_DIR);
        if let (Some(config_dir), Some(data_dir)) = (config_override.clone(), data_override.clone()) {
            return Ok(Self {
                config_dir,
                data_dir,
            });
        }

        let project_dirs = ProjectDirs::from(QUALIFIER, ORGANISATION, APPLICATION)
            .ok_or_else(|| anyhow!("failed to determine user directories"))
            .context("failed to resolve saverlab directories")?;
        Ok(Self {
            config_dir: config_override.unwrap_or_else(|| project_dirs.config_dir().to_path_buf()),
            data_dir: data_override.unwrap_or_else(|| project_dirs.data_dir().to_path_buf()),
        })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn preferences_file(&self) -> PathBuf {
        self.config_dir.join("preferences.toml")
    }

    /// Windows saved for restore-on-startup.
    pub fn state_file(&self) -> PathBuf {
        self.data_dir.join("state.toml")
    }
}

#[cfg(test)]
impl AppPaths {
    pub fn from_raw(config_dir: PathBuf, data_dir: PathBuf) -> Self {
        Self {
            config_dir,
            data_dir,
        }
    }
}

fn env_override(name: &str) -> Option<PathBuf> {
    match env::var_os(name) {
        Some(value) if !value.is_empty() => Some(PathBuf::from(value)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn files_live_under_their_directories() {
        let paths = AppPaths::from_raw(PathBuf::from("/cfg"), PathBuf::from("/data"));
        assert_eq!(paths.preferences_file(), Path::new("/cfg/preferences.toml"));
        assert_eq!(paths.state_file(), Path::new("/data/state.toml"));
    }
}
