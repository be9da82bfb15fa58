//! Configuration loaded from environment variables.
//!
//! `Settings::from_env()` is the production entry point; tests go through
//! `Settings::from_lookup` with a closure so they never touch the process env.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::domain::ConfigError;

/// Manim quality preset, mapped to the engine's `-q*` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderQuality {
    Low,
    #[default]
    Medium,
    High,
    Production,
}

impl RenderQuality {
    pub fn flag(self) -> &'static str {
        match self {
            RenderQuality::Low => "-ql",
            RenderQuality::Medium => "-qm",
            RenderQuality::High => "-qh",
            RenderQuality::Production => "-qp",
        }
    }
}

impl FromStr for RenderQuality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" | "low_quality" => Ok(Self::Low),
            "medium" | "medium_quality" => Ok(Self::Medium),
            "high" | "high_quality" => Ok(Self::High),
            "production" | "production_quality" => Ok(Self::Production),
            _ => Err(format!(
                "invalid quality '{}', expected one of: low_quality, medium_quality, high_quality, production_quality",
                s
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
    /// Upper bound for an uploaded image, in bytes.
    pub max_file_size: usize,
}

#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    pub api_key: SecretString,
    pub model: String,
    pub base_url: String,
    /// Per-request HTTP timeout.
    pub request_timeout: Duration,
    /// Transport retries per call (on top of the first try).
    pub max_retries: u32,
}

#[derive(Debug, Clone)]
pub struct RenderConfig {
    pub binary: String,
    pub quality: RenderQuality,
    /// Finished videos, one `<request_id>.mp4` each.
    pub media_dir: PathBuf,
    /// Scratch space, one sub-directory per request.
    pub work_dir: PathBuf,
    pub max_concurrent_renders: usize,
}

#[derive(Debug, Clone)]
pub struct OcrConfig {
    pub binary: String,
    pub upload_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub generation_timeout: Duration,
    pub fallback_timeout: Duration,
    /// Pause between streamed words.
    pub stream_delay: Duration,
}

#[derive(Debug, Clone)]
pub struct JanitorConfig {
    pub interval: Duration,
    pub no_video_ttl: Duration,
    /// How long a rendered video waits for its poll before it is deleted.
    pub ready_ttl: Duration,
    pub upload_max_age: Duration,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub anthropic: AnthropicConfig,
    pub render: RenderConfig,
    pub ocr: OcrConfig,
    pub pipeline: PipelineConfig,
    pub janitor: JanitorConfig,
}

const DEFAULT_ORIGINS: &str =
    "http://localhost:3000,http://localhost:5173,https://tmas-internship.vercel.app";

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let api_key = env
            .optional("ANTHROPIC_API_KEY")
            .ok_or(ConfigError::Missing("ANTHROPIC_API_KEY"))?;

        Ok(Self {
            server: ServerConfig {
                host: env.or("HOST", "0.0.0.0"),
                port: env.parse_or("PORT", 8000)?,
                allowed_origins: env
                    .or("ALLOWED_ORIGINS", DEFAULT_ORIGINS)
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect(),
                max_file_size: env.parse_or("MAX_FILE_SIZE", 10 * 1024 * 1024)?,
            },
            anthropic: AnthropicConfig {
                api_key: SecretString::from(api_key),
                model: env.or("ANTHROPIC_MODEL", "claude-opus-4-1-20250805"),
                base_url: env.or("ANTHROPIC_BASE_URL", "https://api.anthropic.com"),
                request_timeout: Duration::from_secs(env.parse_or("ANTHROPIC_TIMEOUT_SECS", 120)?),
                max_retries: env.parse_or("ANTHROPIC_MAX_RETRIES", 2)?,
            },
            render: RenderConfig {
                binary: env.or("MANIM_BINARY", "manim"),
                quality: env.parse_or("MANIM_QUALITY", RenderQuality::Medium)?,
                media_dir: PathBuf::from(env.or("MEDIA_DIR", "./media")),
                work_dir: PathBuf::from(env.or("MANIM_WORK_DIR", "./temp_manim")),
                max_concurrent_renders: env.parse_or("MAX_CONCURRENT_RENDERS", 4)?,
            },
            ocr: OcrConfig {
                binary: env.or("TESSERACT_BINARY", "tesseract"),
                upload_dir: PathBuf::from(env.or("UPLOAD_DIR", "./uploads")),
            },
            pipeline: PipelineConfig {
                generation_timeout: Duration::from_secs(
                    env.parse_or("GENERATION_TIMEOUT_SECS", 120)?,
                ),
                fallback_timeout: Duration::from_secs(env.parse_or("FALLBACK_TIMEOUT_SECS", 60)?),
                stream_delay: Duration::from_millis(env.parse_or("STREAM_DELAY_MS", 30)?),
            },
            janitor: JanitorConfig {
                interval: Duration::from_secs(env.parse_or("JANITOR_INTERVAL_SECS", 300)?),
                no_video_ttl: Duration::from_secs(env.parse_or("NO_VIDEO_TTL_SECS", 3600)?),
                ready_ttl: Duration::from_secs(env.parse_or("READY_TTL_SECS", 3600)?),
                upload_max_age: Duration::from_secs(env.parse_or("UPLOAD_MAX_AGE_SECS", 3600)?),
            },
        })
    }
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Unset and blank values are both treated as absent.
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn or(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    fn parse_or<T>(&self, key: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.optional(key) {
            None => Ok(default),
            Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
                key,
                message: e.to_string(),
            }),
        }
    }
}
