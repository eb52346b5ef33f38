//! foodgrid.toml configuration.
//!
//! Precedence is CLI flag, then file, then built-in default.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use foodgrid_scheduler::{MAX_DURATION, SchedulerConfig};
use serde::Deserialize;

pub const DEFAULT_PORT: u16 = 8443;
pub const DEFAULT_DATA_DIR: &str = "/var/lib/foodgrid";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FoodgridConfig {
    pub scheduler: SchedulerSection,
    pub server: ServerSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerSection {
    pub offer_window: Option<String>,
    pub poll_interval: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSection {
    pub port: Option<u16>,
    pub data_dir: Option<PathBuf>,
}

/// Values given on the command line.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub port: Option<u16>,
    pub data_dir: Option<PathBuf>,
    pub offer_window: Option<String>,
    pub poll_interval: Option<String>,
}

/// Fully resolved daemon settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub port: u16,
    pub data_dir: PathBuf,
    pub scheduler: SchedulerConfig,
}

impl FoodgridConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: FoodgridConfig = toml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    /// Merge with command-line overrides.
    pub fn resolve(self, overrides: Overrides) -> anyhow::Result<Settings> {
        let defaults = SchedulerConfig::default();
        let offer_window = match overrides.offer_window.or(self.scheduler.offer_window) {
            Some(window) => parse_duration(&window).context("invalid offer_window")?,
            None => defaults.offer_window(),
        };
        let poll_interval = match overrides.poll_interval.or(self.scheduler.poll_interval) {
            Some(poll) => parse_duration(&poll).context("invalid poll_interval")?,
            None => defaults.poll_interval(),
        };
        let scheduler = SchedulerConfig::new(offer_window, poll_interval)?;

        Ok(Settings {
            port: overrides.port.or(self.server.port).unwrap_or(DEFAULT_PORT),
            data_dir: overrides
                .data_dir
                .or(self.server.data_dir)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
            scheduler,
        })
    }
}

/// Parse a duration string like "5s", "500ms", "10m". A bare number is
/// seconds. Zero and anything above one day are rejected.
pub fn parse_duration(s: &str) -> anyhow::Result<Duration> {
    let s = s.trim();
    let parsed = if let Some(ms) = s.strip_suffix("ms") {
        ms.trim().parse::<u64>().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.trim().parse::<u64>().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.trim()
            .parse::<u64>()
            .map(|m| Duration::from_secs(m.saturating_mul(60)))
    } else {
        s.parse::<u64>().map(Duration::from_secs)
    };

    let duration = parsed.with_context(|| format!("malformed duration {s:?}"))?;
    if duration.is_zero() {
        bail!("duration must be greater than zero");
    }
    if duration > MAX_DURATION {
        bail!("duration {s:?} exceeds {}s", MAX_DURATION.as_secs());
    }
    Ok(duration)
}
