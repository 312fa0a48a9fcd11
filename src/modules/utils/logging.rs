use env_logger::{Builder, Env, Target, WriteStyle};
use log::{info, warn};
use std::fs::OpenOptions;

use crate::modules::config::LogSettings;

/// Initialize the logging system.
///
/// Logs go to stderr unless a log file is configured, in which case they are
/// appended to it. `RUST_LOG` still wins over the configured level.
pub fn initialize_logging(settings: &LogSettings) -> Result<(), Box<dyn std::error::Error>> {
    let mut builder = Builder::from_env(Env::default().default_filter_or(settings.level.as_str()));
    builder
        .format_timestamp_secs()
        .format_module_path(true)
        .write_style(WriteStyle::Auto);

    if let Some(path) = &settings.file {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        builder.target(Target::Pipe(Box::new(file)));
    }

    builder.try_init()?;

    info!("Logging system initialized");
    Ok(())
}

/// Mask an identifier before it reaches the log
pub fn format_sensitive(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..2].iter().collect();
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("{}***{}", head, tail)
}

/// Structured logging for account events
pub fn log_auth_event(event_type: &str, email: &str, success: bool, details: Option<&str>) {
    if success {
        info!(
            "Auth event: type={}, user={}, success=true, details={:?}",
            event_type,
            format_sensitive(email),
            details
        );
    } else {
        warn!(
            "Auth event: type={}, user={}, success=false, details={:?}",
            event_type,
            format_sensitive(email),
            details
        );
    }
}

/// Structured logging for outgoing mail attempts
pub fn log_mail_event(mail_id: u64, recipient: &str, status: &str, details: Option<&str>) {
    if details.is_none() {
        info!(
            "Mail event: id={}, to={}, status={}",
            mail_id,
            format_sensitive(recipient),
            status
        );
    } else {
        warn!(
            "Mail event: id={}, to={}, status={}, details={:?}",
            mail_id,
            format_sensitive(recipient),
            status,
            details
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_sensitive_data_formatting() {
        assert_eq!(format_sensitive("password"), "pa***rd");
        assert_eq!(format_sensitive("key"), "***");
        assert_eq!(format_sensitive("a@b.com"), "a@***om");
        assert_eq!(format_sensitive(""), "");
    }

    #[test]
    fn test_logging_initialization() {
        let log_file = NamedTempFile::new().unwrap();
        let settings = LogSettings {
            level: "info".to_string(),
            file: Some(log_file.path().to_path_buf()),
        };

        // Another test may already have installed a logger
        let result = initialize_logging(&settings);
        assert!(
            result.is_ok()
                || result
                    .unwrap_err()
                    .to_string()
                    .contains("already initialized")
        );
    }
}
