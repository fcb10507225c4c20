use crate::recorder::RecorderSettings;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub display: DisplayConfig,
    pub recorder: RecorderConfig,
    pub replay: ReplayConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    // Overrides <home>/sessions when set
    pub session_dir: Option<PathBuf>,
    pub max_retention_days: u32,
    pub auto_prune: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct DisplayConfig {
    pub language: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct RecorderConfig {
    pub shell: String,
    pub exit_keyword: String,
    pub prompt: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ReplayConfig {
    pub delay_ms: u64,
    pub jitter_ms: u64,
    pub highlight_errors: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            session_dir: None,
            max_retention_days: 365, // Default 1 year
            auto_prune: false,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            language: "auto".to_string(),
        }
    }
}

impl Default for RecorderConfig {
    fn default() -> Self {
        let defaults = RecorderSettings::default();
        Self {
            shell: defaults.shell,
            exit_keyword: defaults.exit_keyword,
            prompt: defaults.prompt,
        }
    }
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            delay_ms: 1500,
            jitter_ms: 500,
            highlight_errors: true,
        }
    }
}

impl Config {
    /// Load `<home>/config.toml`, writing the defaults on first use.
    pub fn load_or_init(home: &Path) -> Result<Self> {
        let config_path = Self::config_path(home);

        if config_path.exists() {
            let content = fs::read_to_string(&config_path)
                .with_context(|| format!("failed to read {}", config_path.display()))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("invalid config file {}", config_path.display()))?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save(home)?;
            Ok(config)
        }
    }

    pub fn save(&self, home: &Path) -> Result<()> {
        fs::create_dir_all(home)?;
        let content = toml::to_string_pretty(self)?;
        fs::write(Self::config_path(home), content)?;
        Ok(())
    }

    pub fn config_path(home: &Path) -> PathBuf {
        home.join("config.toml")
    }

    /// `$SCRIBE_HOME`, or `~/.scribe`.
    pub fn home_dir() -> PathBuf {
        if let Some(home) = std::env::var_os("SCRIBE_HOME").filter(|v| !v.is_empty()) {
            return PathBuf::from(home);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".scribe")
    }

    pub fn get_effective_language(&self) -> String {
        if self.display.language == "auto" {
            // Try to get system language
            std::env::var("LANG")
                .unwrap_or_else(|_| "en_US".to_string())
                .split('.')
                .next()
                .unwrap_or("en")
                .to_string()
        } else {
            self.display.language.clone()
        }
    }

    pub fn recorder_settings(&self) -> RecorderSettings {
        RecorderSettings {
            shell: self.recorder.shell.clone(),
            exit_keyword: self.recorder.exit_keyword.clone(),
            prompt: self.recorder.prompt.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn first_load_writes_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load_or_init(dir.path()).unwrap();
        assert_eq!(config.replay.delay_ms, 1500);
        assert_eq!(config.recorder.exit_keyword, "exit");
        assert!(Config::config_path(dir.path()).exists());
    }

    #[test]
    fn partial_file_keeps_defaults_for_missing_keys() {
        let dir = tempdir().unwrap();
        fs::write(
            Config::config_path(dir.path()),
            "[recorder]\nshell = \"bash\"\n\n[storage]\nsession_dir = \"/var/log/scribe\"\n",
        )
        .unwrap();

        let config = Config::load_or_init(dir.path()).unwrap();
        assert_eq!(config.recorder.shell, "bash");
        assert_eq!(config.recorder.prompt, "scribe> ");
        assert_eq!(config.storage.session_dir, Some(PathBuf::from("/var/log/scribe")));
        assert_eq!(config.storage.max_retention_days, 365);
    }

    #[test]
    fn explicit_language_wins() {
        let mut config = Config::default();
        config.display.language = "zh".to_string();
        assert_eq!(config.get_effective_language(), "zh");
    }
}
