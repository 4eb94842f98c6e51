//! Per-run edit settings: which model to call and the output parameters
//! sent with every request.

use std::time::Duration;

use muse_core::job::{ExecutionMode, ImageRef, JobRequest};
use muse_replicate::config::{parse_flag, parse_var, ConfigError};
use muse_replicate::payload::QWEN_IMAGE_EDIT_PLUS;

/// Aspect ratios accepted by the Qwen edit models.
pub const ASPECT_RATIOS: &[&str] = &["match_input_image", "1:1", "16:9", "9:16", "4:3", "3:4"];

/// Output encodings accepted by the Qwen edit models.
pub const OUTPUT_FORMATS: &[&str] = &["webp", "jpg", "png"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditSettings {
    pub model: String,
    pub mode: ExecutionMode,
    pub aspect_ratio: String,
    pub output_format: String,
    /// 1-100; only affects lossy formats.
    pub output_quality: u32,
    pub disable_safety_checker: bool,
    /// Pause between scenarios in a catalog run.
    pub case_pause: Duration,
}

impl Default for EditSettings {
    fn default() -> Self {
        Self {
            model: QWEN_IMAGE_EDIT_PLUS.to_string(),
            mode: ExecutionMode::Fast,
            aspect_ratio: "match_input_image".to_string(),
            output_format: "png".to_string(),
            output_quality: 95,
            disable_safety_checker: false,
            case_pause: Duration::from_millis(1000),
        }
    }
}

impl EditSettings {
    /// Load settings from environment variables with defaults.
    ///
    /// | Env Var                       | Default                     |
    /// |-------------------------------|-----------------------------|
    /// | `MUSE_MODEL`                  | `qwen/qwen-image-edit-plus` |
    /// | `MUSE_GO_FAST`                | `true`                      |
    /// | `MUSE_ASPECT_RATIO`           | `match_input_image`         |
    /// | `MUSE_OUTPUT_FORMAT`          | `png`                       |
    /// | `MUSE_OUTPUT_QUALITY`         | `95`                        |
    /// | `MUSE_DISABLE_SAFETY_CHECKER` | `false`                     |
    /// | `MUSE_CASE_PAUSE_MS`          | `1000`                      |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let model = lookup("MUSE_MODEL")
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .unwrap_or(defaults.model);

        let aspect_ratio: String =
            parse_var(&lookup, "MUSE_ASPECT_RATIO", defaults.aspect_ratio)?;
        let output_format: String =
            parse_var(&lookup, "MUSE_OUTPUT_FORMAT", defaults.output_format)?;
        let output_quality: u32 =
            parse_var(&lookup, "MUSE_OUTPUT_QUALITY", defaults.output_quality)?;

        check_choice("MUSE_ASPECT_RATIO", &aspect_ratio, ASPECT_RATIOS)?;
        check_choice("MUSE_OUTPUT_FORMAT", &output_format, OUTPUT_FORMATS)?;
        if !(1..=100).contains(&output_quality) {
            return Err(ConfigError::Invalid {
                var: "MUSE_OUTPUT_QUALITY",
                value: output_quality.to_string(),
                reason: "must be between 1 and 100".to_string(),
            });
        }

        Ok(Self {
            model,
            mode: ExecutionMode::from_go_fast(parse_flag(&lookup, "MUSE_GO_FAST", true)?),
            aspect_ratio,
            output_format,
            output_quality,
            disable_safety_checker: parse_flag(&lookup, "MUSE_DISABLE_SAFETY_CHECKER", false)?,
            case_pause: Duration::from_millis(parse_var(&lookup, "MUSE_CASE_PAUSE_MS", 1000)?),
        })
    }

    /// Override the aspect ratio from a command-line flag.
    pub fn with_aspect_ratio(mut self, aspect_ratio: &str) -> Result<Self, ConfigError> {
        check_choice("--aspect-ratio", aspect_ratio, ASPECT_RATIOS)?;
        self.aspect_ratio = aspect_ratio.to_string();
        Ok(self)
    }

    /// Build a request carrying these settings.
    pub fn request(&self, prompt: &str, images: Vec<ImageRef>, seed: Option<i64>) -> JobRequest {
        let mut request = JobRequest::new(self.model.as_str(), prompt)
            .with_mode(self.mode)
            .with_param("aspect_ratio", self.aspect_ratio.as_str())
            .with_param("output_format", self.output_format.as_str())
            .with_param("output_quality", self.output_quality)
            .with_param("disable_safety_checker", self.disable_safety_checker)
            .with_images(images);
        if let Some(seed) = seed {
            request = request.with_param("seed", seed);
        }
        request
    }
}

fn check_choice(var: &'static str, value: &str, allowed: &[&str]) -> Result<(), ConfigError> {
    if allowed.contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            var,
            value: value.to_string(),
            reason: format!("expected one of {}", allowed.join(", ")),
        })
    }
}
