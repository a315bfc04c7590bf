// SPDX-License-Identifier: PMPL-1.0-or-later
//
// OpsVault Engine - Environment configuration
//
// The engine needs exactly two pieces of external configuration: the
// storage root and, for the video subsystem, a signing secret. Everything
// else is internally parameterized with overridable defaults.

use std::path::PathBuf;
use std::time::Duration;

use opsvault_lifecycle::SweepConfig;
use opsvault_monitor::MonitorConfig;

use crate::error::{EngineError, EngineResult};

/// Environment variable naming the storage root. Required.
pub const ENV_ROOT: &str = "OPSVAULT_ROOT";

/// Environment variable carrying the video token signing secret.
/// Optional; without it the video subsystem stays disabled.
pub const ENV_STREAM_SECRET: &str = "OPSVAULT_STREAM_SECRET";

/// Optional override of the sweep interval, in seconds.
pub const ENV_SWEEP_INTERVAL: &str = "OPSVAULT_SWEEP_INTERVAL_SECS";

/// Optional override of the disk poll interval, in seconds.
pub const ENV_MONITOR_INTERVAL: &str = "OPSVAULT_MONITOR_INTERVAL_SECS";

/// Fully resolved engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub root: PathBuf,
    pub stream_secret: Option<String>,
    pub sweep: SweepConfig,
    pub monitor: MonitorConfig,
}

impl EngineConfig {
    /// Configuration rooted at `root` with defaults and no video
    /// subsystem.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            stream_secret: None,
            sweep: SweepConfig::default(),
            monitor: MonitorConfig::default(),
        }
    }

    /// Attach the video token signing secret.
    pub fn with_stream_secret(mut self, secret: impl Into<String>) -> Self {
        self.stream_secret = Some(secret.into());
        self
    }

    /// Read configuration from the process environment.
    pub fn from_env() -> EngineResult<Self> {
        let root = std::env::var(ENV_ROOT)
            .map_err(|_| EngineError::MissingEnv(ENV_ROOT.to_string()))?;
        let mut config = Self::new(root);

        if let Ok(secret) = std::env::var(ENV_STREAM_SECRET) {
            config.stream_secret = Some(secret);
        }
        if let Some(secs) = read_secs(ENV_SWEEP_INTERVAL)? {
            config.sweep.interval = Duration::from_secs(secs);
        }
        if let Some(secs) = read_secs(ENV_MONITOR_INTERVAL)? {
            config.monitor.poll_interval = Duration::from_secs(secs);
        }
        Ok(config)
    }
}

fn read_secs(var: &str) -> EngineResult<Option<u64>> {
    match std::env::var(var) {
        Ok(raw) => raw
            .parse::<u64>()
            .map(Some)
            .map_err(|_| EngineError::BadEnv {
                var: var.to_string(),
                value: raw,
            }),
        Err(_) => Ok(None),
    }
}
