use super::defaults::MAX_LANG_BYTES;
use super::{AppConfig, CoordinatorConfig, MAX_HOLD_THRESHOLD_MS, MIN_HOLD_THRESHOLD_MS};
use crate::playback::PlaybackRate;
use anyhow::{anyhow, bail, Result};
use clap::Parser;
use std::time::Duration;

impl AppConfig {
    /// Parse CLI arguments and validate them right away.
    pub fn parse_args() -> Result<Self> {
        let mut config = Self::parse();
        config.validate()?;
        Ok(config)
    }

    /// Check CLI values and normalize them.
    pub fn validate(&mut self) -> Result<()> {
        if !(MIN_HOLD_THRESHOLD_MS..=MAX_HOLD_THRESHOLD_MS).contains(&self.hold_threshold_ms) {
            bail!(
                "--hold-threshold-ms must be between {MIN_HOLD_THRESHOLD_MS} and {MAX_HOLD_THRESHOLD_MS}, got {}",
                self.hold_threshold_ms
            );
        }

        if PlaybackRate::from_f32(self.default_rate).is_none() {
            bail!(
                "--default-rate must be one of 0.5, 1, 1.25, 1.5, 2, got {}",
                self.default_rate
            );
        }

        let lang = self.lang.trim();
        if lang.is_empty() {
            bail!("--lang must not be empty");
        }
        if lang.len() > MAX_LANG_BYTES {
            bail!("--lang must be at most {MAX_LANG_BYTES} bytes");
        }
        // BCP-47 style tags only; recognizers choke on anything else.
        if !lang
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
        {
            bail!("--lang must contain only alphanumeric characters or '-'/'_' separators");
        }
        let primary = lang.split(['-', '_']).next().unwrap_or("");
        if !(2..=3).contains(&primary.len()) || !primary.chars().all(|ch| ch.is_ascii_alphabetic())
        {
            bail!("--lang must start with a 2 or 3 letter language code, got '{lang}'");
        }
        self.lang = lang.to_string();

        if let Some(script) = &self.script {
            if !script.is_file() {
                bail!("--script '{}' is not a readable file", script.display());
            }
        }

        if let Some(device) = &self.input_device {
            if device.trim().is_empty() || device.len() > 256 {
                bail!("--input-device must be between 1 and 256 characters");
            }
        }

        Ok(())
    }

    /// Snapshot the CLI-controlled coordinator settings for downstream consumers.
    pub fn coordinator_config(&self) -> Result<CoordinatorConfig> {
        let default_rate = PlaybackRate::from_f32(self.default_rate)
            .ok_or_else(|| anyhow!("unsupported playback rate {}", self.default_rate))?;
        Ok(CoordinatorConfig {
            hold_threshold: Duration::from_millis(self.hold_threshold_ms),
            exclusivity: self.exclusivity,
            default_rate,
            lang: self.lang.clone(),
            log_timings: self.log_timings,
        })
    }
}
