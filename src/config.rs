//! Configuration management with environment variable support.
//!
//! Screen Replay reads its tunables from the environment once and caches them:
//! - Reference resolution used by scaled coordinates
//! - Poll/retry timing for the stop flag and text polling
//! - OCR backend selection and vision-model endpoint
//! - Session output directory
//!
//! # Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `SCREEN_REPLAY_REFERENCE_SIZE` | Reference resolution (`WxH`, `fhd`, `qhd`, `4k`) | `qhd` |
//! | `SCREEN_REPLAY_SESSION_DIR` | Base directory for sessions | `/tmp/screen-replay` |
//! | `SCREEN_REPLAY_POLL_INTERVAL` | Stop-flag poll slice in ms (1..=100) | `100` |
//! | `SCREEN_REPLAY_RETRY_INTERVAL` | Delay between text polling tries in ms | `1000` |
//! | `SCREEN_REPLAY_WINDOW_CACHE` | Window box cache TTL in ms (0 disables) | `0` |
//! | `SCREEN_REPLAY_TAP_DELAY` | Down/up gap for taps in ms | `50` |
//! | `SCREEN_REPLAY_OCR_BACKEND` | `tesseract` or `vlm` | `tesseract` |
//! | `SCREEN_REPLAY_TESSERACT` | Tesseract executable | `tesseract` |
//! | `SCREEN_REPLAY_VLM_ENDPOINT` | VLM API endpoint URL | `http://127.0.0.1:8080/v1/chat/completions` |
//! | `SCREEN_REPLAY_VLM_MODEL` | Model name for VLM | `qwen3` |
//! | `SCREEN_REPLAY_VLM_MAX_TOKENS` | Maximum tokens in VLM response | `400` |
//! | `SCREEN_REPLAY_VLM_TIMEOUT` | VLM activity timeout in seconds | `60` |
//! | `SCREEN_REPLAY_VLM_CONNECT_TIMEOUT` | VLM connection timeout in seconds | `10` |
//!
//! # Example
//!
//! ```bash
//! # Scripts authored on a 1920x1080 machine
//! export SCREEN_REPLAY_REFERENCE_SIZE=fhd
//!
//! # Use a local vision model instead of tesseract
//! export SCREEN_REPLAY_OCR_BACKEND=vlm
//! export SCREEN_REPLAY_VLM_ENDPOINT="http://localhost:11434/v1/chat/completions"
//! ```

use std::env;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;

use thiserror::Error;

use crate::coords::Resolution;

// ============================================================================
// Default Values
// ============================================================================

/// Default reference resolution preset
pub const DEFAULT_REFERENCE_SIZE: &str = "qhd";

/// Default session base directory
pub const DEFAULT_SESSION_DIR: &str = "/tmp/screen-replay";

/// Default stop-flag poll slice (milliseconds)
pub const DEFAULT_POLL_INTERVAL: u64 = 100;

/// Upper bound for the poll slice (milliseconds)
pub const MAX_POLL_INTERVAL: u64 = 100;

/// Default delay between text polling attempts (milliseconds)
pub const DEFAULT_RETRY_INTERVAL: u64 = 1000;

/// Default window box cache TTL (milliseconds, 0 = always re-query)
pub const DEFAULT_WINDOW_CACHE: u64 = 0;

/// Default gap between press and release for taps (milliseconds)
pub const DEFAULT_TAP_DELAY: u64 = 50;

/// Default settle delay between drag phases (milliseconds)
pub const DEFAULT_DRAG_SETTLE: u64 = 100;

/// Default OCR backend
pub const DEFAULT_OCR_BACKEND: &str = "tesseract";

/// Default tesseract executable
pub const DEFAULT_TESSERACT: &str = "tesseract";

/// Default VLM API endpoint
pub const DEFAULT_VLM_ENDPOINT: &str = "http://127.0.0.1:8080/v1/chat/completions";

/// Default VLM model name
pub const DEFAULT_VLM_MODEL: &str = "qwen3";

/// Default max tokens for VLM responses
pub const DEFAULT_VLM_MAX_TOKENS: u32 = 400;

/// Default VLM connection timeout (seconds)
pub const DEFAULT_VLM_CONNECT_TIMEOUT: u64 = 10;

/// Default VLM activity timeout (seconds)
pub const DEFAULT_VLM_ACTIVITY_TIMEOUT: u64 = 60;

// ============================================================================
// Environment Variable Names
// ============================================================================

pub const ENV_REFERENCE_SIZE: &str = "SCREEN_REPLAY_REFERENCE_SIZE";
pub const ENV_SESSION_DIR: &str = "SCREEN_REPLAY_SESSION_DIR";
pub const ENV_POLL_INTERVAL: &str = "SCREEN_REPLAY_POLL_INTERVAL";
pub const ENV_RETRY_INTERVAL: &str = "SCREEN_REPLAY_RETRY_INTERVAL";
pub const ENV_WINDOW_CACHE: &str = "SCREEN_REPLAY_WINDOW_CACHE";
pub const ENV_TAP_DELAY: &str = "SCREEN_REPLAY_TAP_DELAY";
pub const ENV_OCR_BACKEND: &str = "SCREEN_REPLAY_OCR_BACKEND";
pub const ENV_TESSERACT: &str = "SCREEN_REPLAY_TESSERACT";
pub const ENV_VLM_ENDPOINT: &str = "SCREEN_REPLAY_VLM_ENDPOINT";
pub const ENV_VLM_MODEL: &str = "SCREEN_REPLAY_VLM_MODEL";
pub const ENV_VLM_MAX_TOKENS: &str = "SCREEN_REPLAY_VLM_MAX_TOKENS";
pub const ENV_VLM_CONNECT_TIMEOUT: &str = "SCREEN_REPLAY_VLM_CONNECT_TIMEOUT";
pub const ENV_VLM_ACTIVITY_TIMEOUT: &str = "SCREEN_REPLAY_VLM_TIMEOUT";

/// Errors raised while interpreting configuration values
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid resolution '{0}' (use WxH, fhd, qhd or 4k)")]
    InvalidResolution(String),

    #[error("unknown OCR backend '{0}' (use tesseract or vlm)")]
    UnknownOcrBackend(String),
}

// ============================================================================
// Configuration Getters (with caching)
// ============================================================================

static CONFIG: OnceLock<Config> = OnceLock::new();

/// Get the global configuration (initialized from environment on first access)
pub fn get() -> &'static Config {
    CONFIG.get_or_init(Config::from_env)
}

/// Centralized configuration for Screen Replay
#[derive(Debug, Clone)]
pub struct Config {
    /// Timing and coordinate settings handed to the processor
    pub run: RunSettings,
    /// OCR backend settings
    pub ocr: OcrSettings,
    /// Session configuration
    pub session: SessionSettings,
}

/// Runtime settings consumed by the command processor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSettings {
    /// Resolution scripts are authored against (scaled mode)
    pub reference: Resolution,
    /// Granularity of stop-flag polling inside waits
    pub poll_interval: Duration,
    /// Pause between text polling attempts
    pub retry_interval: Duration,
    /// Gap between press and release for taps
    pub tap_delay: Duration,
    /// Settle delay between drag phases
    pub drag_settle: Duration,
    /// How long a resolved window box may be reused (zero = never)
    pub window_cache_ttl: Duration,
}

/// Which text recognizer to construct
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcrBackendKind {
    Tesseract,
    Vlm,
}

impl FromStr for OcrBackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "tesseract" | "tess" => Ok(OcrBackendKind::Tesseract),
            "vlm" | "vision" => Ok(OcrBackendKind::Vlm),
            other => Err(ConfigError::UnknownOcrBackend(other.to_string())),
        }
    }
}

/// OCR-related settings
#[derive(Debug, Clone)]
pub struct OcrSettings {
    pub backend: OcrBackendKind,
    /// Tesseract executable
    pub tesseract: String,
    /// VLM API endpoint URL
    pub vlm_endpoint: String,
    /// VLM model name
    pub vlm_model: String,
    /// Maximum tokens in VLM response
    pub vlm_max_tokens: u32,
    /// VLM connection timeout (seconds)
    pub vlm_connect_timeout: u64,
    /// VLM activity timeout during streaming (seconds)
    pub vlm_activity_timeout: u64,
}

/// Session-related settings
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Base directory for session storage
    pub base_dir: String,
}

impl Config {
    /// Create configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        Self {
            run: RunSettings::from_env(),
            ocr: OcrSettings::from_env(),
            session: SessionSettings::from_env(),
        }
    }

    /// Create configuration with all defaults (ignoring environment)
    pub fn defaults() -> Self {
        Self {
            run: RunSettings::defaults(),
            ocr: OcrSettings::defaults(),
            session: SessionSettings::defaults(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

impl RunSettings {
    /// Create run settings from environment variables
    pub fn from_env() -> Self {
        let reference = env::var(ENV_REFERENCE_SIZE)
            .ok()
            .and_then(|s| parse_resolution(&s).ok())
            .unwrap_or(Resolution::QHD);

        Self {
            reference,
            poll_interval: Duration::from_millis(clamp_poll(env_u64(
                ENV_POLL_INTERVAL,
                DEFAULT_POLL_INTERVAL,
            ))),
            retry_interval: Duration::from_millis(env_u64(ENV_RETRY_INTERVAL, DEFAULT_RETRY_INTERVAL)),
            tap_delay: Duration::from_millis(env_u64(ENV_TAP_DELAY, DEFAULT_TAP_DELAY)),
            drag_settle: Duration::from_millis(DEFAULT_DRAG_SETTLE),
            window_cache_ttl: Duration::from_millis(env_u64(ENV_WINDOW_CACHE, DEFAULT_WINDOW_CACHE)),
        }
    }

    /// Create run settings with hardcoded defaults
    pub fn defaults() -> Self {
        Self {
            reference: Resolution::QHD,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL),
            retry_interval: Duration::from_millis(DEFAULT_RETRY_INTERVAL),
            tap_delay: Duration::from_millis(DEFAULT_TAP_DELAY),
            drag_settle: Duration::from_millis(DEFAULT_DRAG_SETTLE),
            window_cache_ttl: Duration::from_millis(DEFAULT_WINDOW_CACHE),
        }
    }

    /// Override the reference resolution
    pub fn reference(mut self, reference: Resolution) -> Self {
        self.reference = reference;
        self
    }

    /// Override the poll slice (clamped to the 100ms ceiling)
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        let ms = clamp_poll(interval.as_millis() as u64);
        self.poll_interval = Duration::from_millis(ms);
        self
    }

    pub fn retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    pub fn tap_delay(mut self, delay: Duration) -> Self {
        self.tap_delay = delay;
        self
    }

    pub fn drag_settle(mut self, delay: Duration) -> Self {
        self.drag_settle = delay;
        self
    }

    pub fn window_cache_ttl(mut self, ttl: Duration) -> Self {
        self.window_cache_ttl = ttl;
        self
    }
}

impl Default for RunSettings {
    fn default() -> Self {
        Self::defaults()
    }
}

impl OcrSettings {
    /// Create OCR settings from environment variables
    pub fn from_env() -> Self {
        Self {
            backend: env::var(ENV_OCR_BACKEND)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(OcrBackendKind::Tesseract),
            tesseract: env::var(ENV_TESSERACT).unwrap_or_else(|_| DEFAULT_TESSERACT.to_string()),
            vlm_endpoint: env::var(ENV_VLM_ENDPOINT)
                .unwrap_or_else(|_| DEFAULT_VLM_ENDPOINT.to_string()),
            vlm_model: env::var(ENV_VLM_MODEL).unwrap_or_else(|_| DEFAULT_VLM_MODEL.to_string()),
            vlm_max_tokens: env::var(ENV_VLM_MAX_TOKENS)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_VLM_MAX_TOKENS),
            vlm_connect_timeout: env_u64(ENV_VLM_CONNECT_TIMEOUT, DEFAULT_VLM_CONNECT_TIMEOUT),
            vlm_activity_timeout: env_u64(ENV_VLM_ACTIVITY_TIMEOUT, DEFAULT_VLM_ACTIVITY_TIMEOUT),
        }
    }

    /// Create OCR settings with defaults
    pub fn defaults() -> Self {
        Self {
            backend: OcrBackendKind::Tesseract,
            tesseract: DEFAULT_TESSERACT.to_string(),
            vlm_endpoint: DEFAULT_VLM_ENDPOINT.to_string(),
            vlm_model: DEFAULT_VLM_MODEL.to_string(),
            vlm_max_tokens: DEFAULT_VLM_MAX_TOKENS,
            vlm_connect_timeout: DEFAULT_VLM_CONNECT_TIMEOUT,
            vlm_activity_timeout: DEFAULT_VLM_ACTIVITY_TIMEOUT,
        }
    }
}

impl SessionSettings {
    /// Create session settings from environment variables
    pub fn from_env() -> Self {
        Self {
            base_dir: env::var(ENV_SESSION_DIR).unwrap_or_else(|_| DEFAULT_SESSION_DIR.to_string()),
        }
    }

    /// Create session settings with defaults
    pub fn defaults() -> Self {
        Self {
            base_dir: DEFAULT_SESSION_DIR.to_string(),
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Parse a resolution string into a [`Resolution`]
/// Supports: "hd" (1280x720), "fhd" (1920x1080), "qhd" (2560x1440), "4k" (3840x2160), or "WxH"
pub fn parse_resolution(size: &str) -> Result<Resolution, ConfigError> {
    let invalid = || ConfigError::InvalidResolution(size.to_string());
    match size.trim().to_lowercase().as_str() {
        "hd" | "720p" => Ok(Resolution::new(1280, 720)),
        "fhd" | "1080p" => Ok(Resolution::new(1920, 1080)),
        "qhd" | "1440p" => Ok(Resolution::QHD),
        "4k" | "uhd" | "2160p" => Ok(Resolution::new(3840, 2160)),
        custom => {
            let parts: Vec<&str> = custom.split('x').collect();
            if parts.len() != 2 {
                return Err(invalid());
            }
            let w: u32 = parts[0].parse().map_err(|_| invalid())?;
            let h: u32 = parts[1].parse().map_err(|_| invalid())?;
            if w == 0 || h == 0 {
                return Err(invalid());
            }
            Ok(Resolution::new(w, h))
        }
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn clamp_poll(ms: u64) -> u64 {
    ms.clamp(1, MAX_POLL_INTERVAL)
}

/// Get session base directory (convenience function)
pub fn session_base_dir() -> String {
    get().session.base_dir.clone()
}
