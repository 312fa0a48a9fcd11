use chrono::{DateTime, Local, Utc};

/// Current wall-clock time in UTC
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Format a stored timestamp as a readable local date
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    let local_time: DateTime<Local> = DateTime::from(*timestamp);
    local_time.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Same as [`format_timestamp`] but for optional columns
pub fn format_optional(timestamp: Option<&DateTime<Utc>>) -> String {
    match timestamp {
        Some(ts) => format_timestamp(ts),
        None => "-".to_string(),
    }
}
