//! Logging setup and log-field hygiene.
//!
//! Request logs never carry credentials in full: sensitive header values are
//! masked, payload previews are truncated and ids in paths are collapsed so
//! one endpoint shows up as one path.

use crate::config::{LogLevel, LoggingConfig};
use crate::error::AppError;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::HeaderMap;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Headers whose values are masked in logs (compared case-insensitively).
pub const SENSITIVE_HEADERS: [&str; 4] = ["authorization", "cookie", "x-api-key", "x-auth-token"];

/// Longest payload preview written to logs.
pub const PAYLOAD_PREVIEW_LIMIT: usize = 200;

const MASK_VISIBLE_PREFIX: usize = 10;

/// Install the global subscriber.
///
/// `RUST_LOG` wins when set; otherwise the configured level applies to
/// every target.
pub fn init_logging(config: &LoggingConfig) -> Result<(), AppError> {
    let level = LogLevel::parse(&config.level).unwrap_or(LogLevel::Info);
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_filter()));

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = if config.json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };
    result.map_err(|e| AppError::Logging(e.to_string()))?;

    tracing::debug!(level = level.as_filter(), json = config.json, "Logging initialized");
    Ok(())
}

/// Mask one header value if the header is sensitive.
pub fn mask_header(name: &str, value: &str) -> String {
    let sensitive = SENSITIVE_HEADERS
        .iter()
        .any(|h| h.eq_ignore_ascii_case(name));
    if !sensitive {
        return value.to_string();
    }
    if value.chars().count() > MASK_VISIBLE_PREFIX {
        let prefix: String = value.chars().take(MASK_VISIBLE_PREFIX).collect();
        format!("{}...***", prefix)
    } else {
        "***".to_string()
    }
}

/// Render headers for a log line, masked.
pub fn masked_headers(headers: &HeaderMap) -> String {
    headers
        .iter()
        .map(|(name, value)| {
            let raw = value.to_str().unwrap_or("<binary>");
            format!("{}: {}", name.as_str(), mask_header(name.as_str(), raw))
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Cut a payload preview at [`PAYLOAD_PREVIEW_LIMIT`] characters.
pub fn truncate_payload(payload: &str) -> String {
    let total = payload.chars().count();
    if total <= PAYLOAD_PREVIEW_LIMIT {
        return payload.to_string();
    }
    let head: String = payload.chars().take(PAYLOAD_PREVIEW_LIMIT).collect();
    format!("{}... (truncated, total {} chars)", head, total)
}

static UUID_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}")
        .expect("Invalid UUID regex")
});

static ID_SEGMENT_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/\d+(/|$)").expect("Invalid ID regex"));

/// Replace UUIDs and numeric path segments with `{id}`.
pub fn normalize_path(path: &str) -> String {
    let path = path.split('?').next().unwrap_or(path);
    let result = UUID_PATTERN.replace_all(path, "{id}");
    // Adjacent numeric segments share a slash, so one pass can skip every
    // other one.
    let result = ID_SEGMENT_PATTERN.replace_all(&result, "/{id}$1");
    let result = ID_SEGMENT_PATTERN.replace_all(&result, "/{id}$1");
    result.to_string()
}
