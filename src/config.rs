use crate::error::WmError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Manager configuration: the virtual-desktop grid, the background image and
/// free-form per-plugin tables matched by string key against each plugin's
/// option registry. All of it is optional; a missing or malformed file
/// degrades to defaults rather than refusing to start.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Config {
    workspace: Option<WorkspaceSettings>,
    background: Option<BackgroundSettings>,
    #[serde(default)]
    plugin: HashMap<String, toml::value::Table>,
}

/// [workspace] section of the configuration file.
/// The virtual desktops form a columns x rows grid; switching wraps around
/// both edges, so the grid behaves as a torus.
#[derive(Debug, Serialize, Deserialize)]
struct WorkspaceSettings {
    columns: Option<i32>,
    rows: Option<i32>,
}

/// [background] section of the configuration file.
/// The image is tiled once per workspace cell, behind every client window.
#[derive(Debug, Serialize, Deserialize)]
struct BackgroundSettings {
    image: Option<String>,
}

impl Config {
    /// Produces a configuration from the given path, falling back to
    /// `$HOME/.config/emberwm/config.toml` and finally to built-in defaults.
    pub fn load(path: Option<&Path>) -> Self {
        let path = path.map(PathBuf::from).or_else(Config::default_path);
        let path = match path {
            Some(p) => p,
            None => return Config::default(),
        };

        match Config::read(&path) {
            Ok(config) => {
                debug!("configuration loaded from {}", path.display());
                config
            }
            Err(err) => {
                warn!("using default configuration: {}", err);
                Config::default()
            }
        }
    }

    fn default_path() -> Option<PathBuf> {
        std::env::var_os("HOME")
            .map(|home| PathBuf::from(home).join(".config/emberwm/config.toml"))
            .filter(|p| p.exists())
    }

    fn read(path: &Path) -> Result<Self, WmError> {
        let contents = fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Grid dimensions, clamped to at least one cell each way.
    pub fn grid(&self) -> (i32, i32) {
        let columns = self
            .workspace
            .as_ref()
            .and_then(|w| w.columns)
            .unwrap_or(3);
        let rows = self.workspace.as_ref().and_then(|w| w.rows).unwrap_or(3);
        (columns.max(1), rows.max(1))
    }

    pub fn background_image(&self) -> Option<&str> {
        self.background.as_ref().and_then(|b| b.image.as_deref())
    }

    /// The [plugin.<name>] table, if present.
    pub fn plugin_table(&self, name: &str) -> Option<&toml::value::Table> {
        self.plugin.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_sections() {
        let config: Config = toml::from_str(
            r#"
            [workspace]
            columns = 4
            rows = 2

            [background]
            image = "/usr/share/wallpaper.png"

            [plugin.workspace]
            steps = 45

            [plugin.expo]
            enabled = true
            "#,
        )
        .unwrap();

        assert_eq!(config.grid(), (4, 2));
        assert_eq!(config.background_image(), Some("/usr/share/wallpaper.png"));

        let table = config.plugin_table("workspace").unwrap();
        assert_eq!(table.get("steps").and_then(|v| v.as_integer()), Some(45));
        assert!(config.plugin_table("missing").is_none());
    }

    #[test]
    fn defaults_to_a_three_by_three_grid() {
        let config = Config::default();
        assert_eq!(config.grid(), (3, 3));
        assert_eq!(config.background_image(), None);
    }

    #[test]
    fn degenerate_grid_is_clamped() {
        let config: Config = toml::from_str("[workspace]\ncolumns = 0\nrows = -2\n").unwrap();
        assert_eq!(config.grid(), (1, 1));
    }
}
