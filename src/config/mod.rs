//! Configuration and session preferences

use anyhow::{bail, Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::models::Role;

/// Languages offered to participants: (code, display name).
pub const LANGUAGES: &[(&str, &str)] = &[
    ("en", "English"),
    ("hi", "Hindi"),
    ("es", "Spanish"),
    ("fr", "French"),
    ("de", "German"),
];

/// Display name for a language code, or the code itself if unknown.
pub fn language_name(code: &str) -> &str {
    LANGUAGES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
        .unwrap_or(code)
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Budget for one audio send (upload + transcription + translation)
    pub audio_timeout_secs: u64,
    /// Language assumed for a participant who hasn't picked one yet
    pub fallback_language: String,
    /// Saved participant preferences
    pub session: SessionConfig,
    /// Translation/transcription/summarization gateway
    pub gateway: GatewayConfig,
    /// Room state and media storage
    pub store: StoreConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            audio_timeout_secs: 5,
            fallback_language: "en".to_string(),
            session: SessionConfig::default(),
            gateway: GatewayConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionConfig {
    pub role: Option<Role>,
    pub language: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub base_url: String,
    pub request_timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Override for the shared data directory
    pub data_dir: Option<PathBuf>,
    /// How often file-backed subscriptions check for changes
    pub poll_interval_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            poll_interval_ms: 500,
        }
    }
}

/// Participant identity for one run: loaded once, then passed around by value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub role: Role,
    pub language: String,
}

impl Config {
    fn project_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("com", "medconsult", "medconsult")
            .context("Could not determine config directory")
    }

    /// Get config file path
    fn config_path() -> Result<PathBuf> {
        Ok(Self::project_dirs()?.config_dir().join("config.toml"))
    }

    /// Load configuration from disk
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).context("Failed to read config file")?;
        toml::from_str(&content).context("Failed to parse config file")
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content).context("Failed to write config file")?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            fs::set_permissions(path, perms).context("Failed to set config permissions")?;
        }

        Ok(())
    }

    /// Directory shared by every participant on this machine.
    pub fn data_dir(&self) -> Result<PathBuf> {
        match self.store.data_dir {
            Some(ref dir) => Ok(dir.clone()),
            None => Ok(Self::project_dirs()?.data_dir().to_path_buf()),
        }
    }

    pub fn audio_timeout(&self) -> Duration {
        Duration::from_secs(self.audio_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.store.poll_interval_ms.max(10))
    }

    /// Session for this run. Unset preferences default to DOCTOR / fallback language.
    pub fn session(&self) -> Session {
        Session {
            role: self.session.role.unwrap_or(Role::Doctor),
            language: self
                .session
                .language
                .clone()
                .filter(|l| !l.is_empty())
                .unwrap_or_else(|| self.fallback_language.clone()),
        }
    }

    pub fn set_role(&mut self, role: Role) {
        self.session.role = Some(role);
    }

    pub fn set_language(&mut self, code: &str) -> Result<()> {
        let code = code.trim().to_lowercase();
        if !LANGUAGES.iter().any(|(c, _)| *c == code) {
            let known: Vec<&str> = LANGUAGES.iter().map(|(c, _)| *c).collect();
            bail!("Unsupported language: {}. Use: {}", code, known.join(", "));
        }
        self.session.language = Some(code);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config.audio_timeout_secs, 5);
        assert_eq!(config.store.poll_interval_ms, 500);

        let session = config.session();
        assert_eq!(session.role, Role::Doctor);
        assert_eq!(session.language, "en");
    }

    #[test]
    fn test_session_survives_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.set_role(Role::Patient);
        config.set_language("ES").unwrap();
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(
            loaded.session(),
            Session {
                role: Role::Patient,
                language: "es".to_string()
            }
        );
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[gateway]\nbase_url = \"http://gw:8080\"\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.gateway.base_url, "http://gw:8080");
        assert_eq!(config.gateway.request_timeout_secs, 30);
        assert_eq!(config.fallback_language, "en");
    }

    #[test]
    fn test_unknown_language_rejected() {
        let mut config = Config::default();
        assert!(config.set_language("xx").is_err());
        assert!(config.session.language.is_none());
        assert_eq!(language_name("hi"), "Hindi");
        assert_eq!(language_name("pt"), "pt");
    }
}
