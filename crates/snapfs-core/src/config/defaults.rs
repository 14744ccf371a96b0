use std::time::Duration;

use snapfs_types::{Result, SnapfsError};

pub(super) fn default_snapshot_template() -> String {
    "%Y-%m-%dT%H:%M:%S%:z".to_string()
}

pub(super) fn default_refresh_interval() -> String {
    "60s".to_string()
}

pub(super) fn default_cache_size() -> usize {
    crate::cache::DEFAULT_CACHE_SIZE
}

pub(super) fn default_progress_interval() -> String {
    "1s".to_string()
}

/// Parse a duration string like "250ms", "30s", "5m", "4h" or "2d".
/// A bare number is taken as seconds. Zero is allowed.
pub fn parse_human_duration(raw: &str) -> Result<Duration> {
    let input = raw.trim();
    if input.is_empty() {
        return Err(SnapfsError::Config("duration must not be empty".into()));
    }

    let split = input
        .find(|c: char| c.is_ascii_alphabetic())
        .unwrap_or(input.len());
    let (num_part, unit) = input.split_at(split);

    let value: u64 = num_part
        .trim()
        .parse()
        .map_err(|_| SnapfsError::Config(format!("invalid duration value: '{raw}'")))?;

    let duration = match unit.to_ascii_lowercase().as_str() {
        "ms" => Duration::from_millis(value),
        "" | "s" => Duration::from_secs(value),
        "m" => Duration::from_secs(value.saturating_mul(60)),
        "h" => Duration::from_secs(value.saturating_mul(60 * 60)),
        "d" => Duration::from_secs(value.saturating_mul(60 * 60 * 24)),
        other => {
            return Err(SnapfsError::Config(format!(
                "unsupported duration suffix '{other}' in '{raw}' (use ms/s/m/h/d)"
            )));
        }
    };

    Ok(duration)
}
