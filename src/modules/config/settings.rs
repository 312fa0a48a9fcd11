use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::DEFAULT_PASSWORD_ITERATIONS;

/// Public address of the site, used to build absolute links in mail
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct SiteSettings {
    pub base_url: String,
}

impl Default for SiteSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
        }
    }
}

/// SMTP relay used by the default mail transport
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SmtpSettings {
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    pub username: String,
    // Looked up in the OS keyring when absent
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_use_ssl")]
    pub use_ssl: bool,
    #[serde(default = "default_smtp_timeout")]
    pub timeout_secs: u64,
}

fn default_smtp_port() -> u16 {
    465
}

fn default_use_ssl() -> bool {
    true
}

fn default_smtp_timeout() -> u64 {
    10
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct MailSettings {
    /// Sender used when an outgoing mail does not name one
    pub default_sender: String,
    pub smtp: Option<SmtpSettings>,
}

impl Default for MailSettings {
    fn default() -> Self {
        Self {
            default_sender: "noreply@localhost".to_string(),
            smtp: None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct StorageSettings {
    /// JSON database file; in-memory only when unset
    pub path: Option<PathBuf>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct SecuritySettings {
    pub password_iterations: u32,
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self {
            password_iterations: DEFAULT_PASSWORD_ITERATIONS,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct LogSettings {
    pub level: String,
    pub file: Option<PathBuf>,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

/// Application configuration
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Settings {
    pub site: SiteSettings,
    pub mail: MailSettings,
    pub storage: StorageSettings,
    pub security: SecuritySettings,
    pub log: LogSettings,
}

impl Settings {
    /// Load settings from a JSON file, falling back to defaults if the file
    /// does not exist
    pub fn load(path: &Path) -> io::Result<Self> {
        match fs::read_to_string(path) {
            Ok(raw) => serde_json::from_str(&raw).map_err(|e| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("Invalid settings file {}: {}", path.display(), e),
                )
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::warn!("Settings file {} not found, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e),
        }
    }

    /// Apply `USERGATE_*` overrides from the process environment
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(base_url) = lookup("USERGATE_BASE_URL") {
            self.site.base_url = base_url;
        }
        if let Some(sender) = lookup("USERGATE_MAIL_SENDER") {
            self.mail.default_sender = sender;
        }
        if let Some(path) = lookup("USERGATE_STORAGE_PATH") {
            self.storage.path = Some(PathBuf::from(path));
        }
        if let Some(level) = lookup("USERGATE_LOG_LEVEL") {
            self.log.level = level;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(settings.site.base_url, "http://localhost:5000");
        assert_eq!(settings.security.password_iterations, DEFAULT_PASSWORD_ITERATIONS);
        assert!(settings.mail.smtp.is_none());
        assert!(settings.storage.path.is_none());
    }

    #[test]
    fn test_partial_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "site": {{ "base_url": "https://example.com" }},
                "mail": {{
                    "default_sender": "admin@example.com",
                    "smtp": {{ "host": "smtp.example.com", "username": "admin@example.com" }}
                }}
            }}"#
        )
        .unwrap();

        let settings = Settings::load(file.path()).unwrap();
        assert_eq!(settings.site.base_url, "https://example.com");
        assert_eq!(settings.mail.default_sender, "admin@example.com");

        let smtp = settings.mail.smtp.unwrap();
        assert_eq!(smtp.port, 465);
        assert!(smtp.use_ssl);
        assert!(smtp.password.is_none());
        assert_eq!(smtp.timeout_secs, 10);
        assert_eq!(settings.log.level, "info");
    }

    #[test]
    fn test_invalid_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let err = Settings::load(file.path()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("USERGATE_BASE_URL", "https://site.test"),
            ("USERGATE_STORAGE_PATH", "/tmp/db.json"),
        ]
        .into_iter()
        .collect();

        let mut settings = Settings::default();
        settings.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(settings.site.base_url, "https://site.test");
        assert_eq!(settings.storage.path, Some(PathBuf::from("/tmp/db.json")));
        assert_eq!(settings.mail.default_sender, "noreply@localhost");
    }
}
