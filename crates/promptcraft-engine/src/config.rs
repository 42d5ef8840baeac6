use std::env;
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Engine settings, read from the environment and overridable by callers.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub api_base: String,
    pub request_timeout: Duration,
    pub poll_interval: Duration,
    /// Upper bound on a video job's polling phase. `None` polls until the
    /// backend reports completion or the job is cancelled.
    pub max_wait: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_wait: None,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let api_base = read("PROMPTCRAFT_API_BASE")
            .or_else(|| read("GEMINI_API_BASE"))
            .map(|value| value.trim_end_matches('/').to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());

        let request_timeout = seconds_setting(
            read("PROMPTCRAFT_REQUEST_TIMEOUT"),
            DEFAULT_REQUEST_TIMEOUT.as_secs_f64(),
            5.0,
            600.0,
        );
        let poll_interval = seconds_setting(
            read("PROMPTCRAFT_POLL_INTERVAL"),
            DEFAULT_POLL_INTERVAL.as_secs_f64(),
            0.05,
            60.0,
        );
        let max_wait = read("PROMPTCRAFT_MAX_WAIT")
            .and_then(|raw| raw.parse::<f64>().ok())
            .filter(|value| value.is_finite() && *value > 0.0)
            .map(Duration::from_secs_f64);

        Self {
            api_base,
            request_timeout: Duration::from_secs_f64(request_timeout),
            poll_interval: Duration::from_secs_f64(poll_interval),
            max_wait,
        }
    }
}

fn seconds_setting(raw: Option<String>, default: f64, min: f64, max: f64) -> f64 {
    raw.and_then(|value| value.parse::<f64>().ok())
        .filter(|value| value.is_finite())
        .unwrap_or(default)
        .clamp(min, max)
}
