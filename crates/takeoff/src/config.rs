use std::path::{Path, PathBuf};

use takeoff_core::config::PipelineConfig;

use crate::error::Error;

/// `<config_dir>/takeoff/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs_next::config_dir().map(|dir| dir.join("takeoff").join("config.toml"))
}

/// Load the pipeline configuration.
///
/// An explicit path must exist. Without one, the default location is used
/// when present and the built-in defaults otherwise.
pub fn load_config(explicit: Option<&Path>) -> Result<PipelineConfig, Error> {
    match explicit {
        Some(path) => read_config(path),
        None => match default_config_path().filter(|path| path.is_file()) {
            Some(path) => read_config(&path),
            None => Ok(PipelineConfig::default()),
        },
    }
}

fn read_config(path: &Path) -> Result<PipelineConfig, Error> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::InvalidConfig(format!("failed to read {}: {}", path.display(), e))
    })?;
    log::debug!("Loaded configuration from {}", path.display());

    PipelineConfig::from_toml_str(&content)
        .map_err(|e| Error::InvalidConfig(format!("{}: {}", path.display(), e)))
}
