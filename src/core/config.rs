//! `bgproc` settings, read from `~/.config/bgproc/config.yaml`
//!
//! Every section and field is optional; anything left out falls back to the
//! value in the matching `Default` impl.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::process::SpawnRequest;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub process: ProcessPreferences,
    pub ui: UiPreferences,
    /// Named commands; `--run NAME` starts one by name
    pub saved_commands: Vec<SavedCommand>,
}

/// A command kept in the config file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedCommand {
    pub name: String,
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,
    /// Spawned as soon as the dashboard opens
    #[serde(default)]
    pub auto_start: bool,
}

impl SavedCommand {
    pub fn to_request(&self) -> SpawnRequest {
        SpawnRequest {
            name: self.name.clone(),
            command: self.command.clone(),
            cwd: self.cwd.clone(),
            env: self.env.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessPreferences {
    /// Commands run as `<shell> -c <command>`
    pub shell: String,
    /// Parent of the per-instance `bgproc-<uuid>` directory; the temp dir when unset
    pub log_dir: Option<PathBuf>,
    /// Lines each process keeps in memory for the log pane
    pub log_buffer_size: usize,
    /// How long a SIGTERM gets before the kill reports `terminate_timeout`
    pub terminate_timeout_ms: u64,
    pub force_kill_timeout_ms: u64,
}

impl Default for ProcessPreferences {
    fn default() -> Self {
        Self {
            shell: "sh".into(),
            log_dir: None,
            log_buffer_size: 5000,
            terminate_timeout_ms: 3000,
            force_kill_timeout_ms: 200,
        }
    }
}

impl ProcessPreferences {
    pub fn terminate_timeout(&self) -> Duration {
        Duration::from_millis(self.terminate_timeout_ms)
    }

    pub fn force_kill_timeout(&self) -> Duration {
        Duration::from_millis(self.force_kill_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiPreferences {
    /// Process rows shown before the table scrolls
    pub visible_rows: usize,
    /// Height of the log pane
    pub log_lines: usize,
    /// Lines moved by one J/K press
    pub log_scroll_step: usize,
    pub tick_rate_ms: u64,
    pub theme: Theme,
    pub ascii_icons: bool,
}

impl Default for UiPreferences {
    fn default() -> Self {
        Self {
            visible_rows: 8,
            log_lines: 12,
            log_scroll_step: 5,
            tick_rate_ms: 250,
            theme: Theme::Dark,
            ascii_icons: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

impl Config {
    pub fn default_path() -> PathBuf {
        let base = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        base.join("bgproc").join("config.yaml")
    }

    /// Read the config at `path` (or [`Config::default_path`])
    ///
    /// A missing file is not an error and yields the defaults. A file that
    /// exists but does not parse is.
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let path = path.unwrap_or_else(Self::default_path);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => {
                return Err(err).with_context(|| format!("reading {}", path.display()));
            }
        };
        Self::parse(&text).with_context(|| format!("parsing {}", path.display()))
    }

    fn parse(text: &str) -> Result<Self> {
        // An empty file deserializes as YAML null
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    /// Write the config as YAML, creating parent directories as needed
    pub fn save(&self, path: Option<&Path>) -> Result<()> {
        let path = path.map_or_else(Self::default_path, Path::to_path_buf);
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        }
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(&path, yaml).with_context(|| format!("writing {}", path.display()))
    }

    pub fn saved_command(&self, name: &str) -> Option<&SavedCommand> {
        self.saved_commands.iter().find(|c| c.name == name)
    }

    pub fn auto_start_commands(&self) -> impl Iterator<Item = &SavedCommand> {
        self.saved_commands.iter().filter(|c| c.auto_start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = Config::default();
        assert!(config.saved_commands.is_empty());
        assert_eq!((config.ui.visible_rows, config.ui.log_lines), (8, 12));
        assert_eq!(config.process.shell, "sh");
        assert_eq!(config.process.terminate_timeout(), Duration::from_secs(3));
        assert_eq!(config.process.force_kill_timeout(), Duration::from_millis(200));
    }

    #[test]
    fn test_saved_config_reads_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.yaml");

        let mut config = Config::default();
        config.ui.theme = Theme::Light;
        config.saved_commands.push(SavedCommand {
            name: "watch".into(),
            command: "cargo watch".into(),
            description: Some("Rebuild on change".into()),
            cwd: Some(PathBuf::from("/srv/app")),
            env: HashMap::from([("RUST_LOG".into(), "info".into())]),
            auto_start: true,
        });
        config.save(Some(path.as_path())).unwrap();

        let loaded = Config::load(Some(path)).unwrap();
        assert_eq!(loaded.ui.theme, Theme::Light);
        assert_eq!(loaded.saved_commands, config.saved_commands);
    }

    #[test]
    fn test_sections_fill_in_missing_fields() {
        let yaml = "process:\n  shell: bash\nui:\n  visible_rows: 4\nsaved_commands:\n  - name: dev\n    command: npm run dev\n    auto_start: true\n  - name: test\n    command: npm test\n";
        let config = Config::parse(yaml).unwrap();
        assert_eq!(config.process.shell, "bash");
        assert_eq!(config.process.log_buffer_size, 5000);
        assert_eq!(config.ui.visible_rows, 4);
        assert_eq!(config.ui.log_scroll_step, 5);

        let auto: Vec<&str> = config.auto_start_commands().map(|c| c.name.as_str()).collect();
        assert_eq!(auto, vec!["dev"]);
        assert_eq!(config.saved_command("test").unwrap().command, "npm test");
        assert!(config.saved_command("missing").is_none());
    }

    #[test]
    fn test_missing_or_empty_file_is_default() {
        let dir = tempdir().unwrap();
        let config = Config::load(Some(dir.path().join("absent.yaml"))).unwrap();
        assert_eq!(config.ui.tick_rate_ms, 250);

        let empty = dir.path().join("empty.yaml");
        std::fs::write(&empty, "\n").unwrap();
        assert_eq!(Config::load(Some(empty)).unwrap().process.shell, "sh");
    }

    #[test]
    fn test_malformed_file_names_the_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.yaml");
        std::fs::write(&path, "ui: [not, a, map]\n").unwrap();
        let err = Config::load(Some(path.clone())).unwrap_err();
        assert!(format!("{err}").contains(&path.display().to_string()));
    }

    #[test]
    fn test_saved_command_becomes_spawn_request() {
        let saved = SavedCommand {
            name: "api".into(),
            command: "cargo run".into(),
            description: None,
            cwd: Some(PathBuf::from("/tmp")),
            env: HashMap::from([("PORT".into(), "8080".into())]),
            auto_start: false,
        };
        let request = saved.to_request();
        assert_eq!(request.name, "api");
        assert_eq!(request.cwd.as_deref(), Some(Path::new("/tmp")));
        assert_eq!(request.env.get("PORT").map(String::as_str), Some("8080"));
    }
}
