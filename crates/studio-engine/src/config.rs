use std::time::Duration;

use crate::non_empty_env;

pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_STORAGE_BUCKET: &str = "ai-clone-images";

/// Engine tunables. Delays are courtesy pauses between provider calls, not a
/// rate-limit budget.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub gemini_api_base: String,
    pub request_timeout: Duration,
    pub fallback_delay: Duration,
    pub dataset_delay: Duration,
    pub upscale_delay: Duration,
    pub motion_poll_interval: Duration,
    pub motion_poll_ceiling: Duration,
    pub storage_bucket: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            gemini_api_base: DEFAULT_GEMINI_API_BASE.to_string(),
            request_timeout: Duration::from_secs(90),
            fallback_delay: Duration::from_millis(500),
            dataset_delay: Duration::from_millis(1500),
            upscale_delay: Duration::from_millis(1000),
            motion_poll_interval: Duration::from_secs(5),
            motion_poll_ceiling: Duration::from_secs(240),
            storage_bucket: DEFAULT_STORAGE_BUCKET.to_string(),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            gemini_api_base: non_empty_env("GEMINI_API_BASE")
                .map(|value| value.trim_end_matches('/').to_string())
                .unwrap_or(defaults.gemini_api_base),
            request_timeout: env_secs("STUDIO_REQUEST_TIMEOUT_S").unwrap_or(defaults.request_timeout),
            fallback_delay: env_millis("STUDIO_FALLBACK_DELAY_MS").unwrap_or(defaults.fallback_delay),
            dataset_delay: env_millis("STUDIO_DATASET_DELAY_MS").unwrap_or(defaults.dataset_delay),
            upscale_delay: env_millis("STUDIO_UPSCALE_DELAY_MS").unwrap_or(defaults.upscale_delay),
            motion_poll_interval: env_secs("STUDIO_MOTION_POLL_INTERVAL_S")
                .unwrap_or(defaults.motion_poll_interval),
            motion_poll_ceiling: env_secs("STUDIO_MOTION_POLL_CEILING_S")
                .unwrap_or(defaults.motion_poll_ceiling),
            storage_bucket: non_empty_env("STUDIO_STORAGE_BUCKET")
                .unwrap_or(defaults.storage_bucket),
        }
    }

    /// Same config with every courtesy delay removed.
    pub fn without_delays(mut self) -> Self {
        self.fallback_delay = Duration::ZERO;
        self.dataset_delay = Duration::ZERO;
        self.upscale_delay = Duration::ZERO;
        self
    }

    /// How many status polls fit under the motion ceiling.
    pub fn motion_max_polls(&self) -> u32 {
        let interval = self.motion_poll_interval.as_millis().max(1);
        (self.motion_poll_ceiling.as_millis() / interval).min(u128::from(u32::MAX)) as u32
    }
}

fn env_secs(key: &str) -> Option<Duration> {
    non_empty_env(key)
        .and_then(|raw| raw.parse::<f64>().ok())
        .filter(|value| value.is_finite() && *value >= 0.0)
        .map(Duration::from_secs_f64)
}

fn env_millis(key: &str) -> Option<Duration> {
    non_empty_env(key)
        .and_then(|raw| raw.parse::<u64>().ok())
        .map(Duration::from_millis)
}
