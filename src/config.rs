use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ViewError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub window_title: String,
    pub window_width: u32,
    pub window_height: u32,
    pub vsync: bool,
    /// `env_logger` filter used when `RUST_LOG` is unset.
    pub log_filter: String,
    /// Use the simulated AR device when no real runtime is present.
    pub simulate_xr: bool,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            window_title: "Implant Viewer".to_string(),
            window_width: 1600,
            window_height: 900,
            vsync: true,
            log_filter: "warn".to_string(),
            simulate_xr: false,
        }
    }
}

impl ViewerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ViewError::Config(format!("{}: {e}", path.display())))?;
        serde_json::from_str(&text).map_err(|e| ViewError::Config(format!("{}: {e}", path.display())))
    }

    /// Defaults when no path is given.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_fields_take_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"vsync": false, "simulate_xr": true}}"#).unwrap();

        let config = ViewerConfig::load(file.path()).unwrap();
        assert!(!config.vsync);
        assert!(config.simulate_xr);
        assert_eq!(config.window_width, 1600);
        assert_eq!(config.log_filter, "warn");
    }

    #[test]
    fn unreadable_config_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ViewerConfig::load(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, ViewError::Config(_)));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(ViewerConfig::load(file.path()), Err(ViewError::Config(_))));
    }

    #[test]
    fn no_path_means_defaults() {
        assert_eq!(ViewerConfig::load_or_default(None).unwrap(), ViewerConfig::default());
    }
}
