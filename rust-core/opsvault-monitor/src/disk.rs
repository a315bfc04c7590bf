// SPDX-License-Identifier: PMPL-1.0-or-later
//
// OpsVault Disk Monitor - Free-space status and edge-triggered alerting
//
// Classifies free space into four alert levels and records an alert only
// when the level changes between observations. A volume sitting at 19%
// free produces one WARNING when it crosses the threshold, not one per
// poll cycle. The last N alerts are retained in memory for operators.

use std::collections::VecDeque;
use std::fmt;
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::MonitorResult;

/// Free-space thresholds, in percent free.
const WARNING_PERCENT: f64 = 20.0;
const CRITICAL_PERCENT: f64 = 15.0;
const EMERGENCY_PERCENT: f64 = 5.0;

/// How many alerts are kept in memory.
pub const DEFAULT_ALERT_CAPACITY: usize = 64;

/// Severity of the current free-space situation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertLevel {
    Ok,
    Warning,
    Critical,
    Emergency,
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AlertLevel::Ok => "OK",
            AlertLevel::Warning => "WARNING",
            AlertLevel::Critical => "CRITICAL",
            AlertLevel::Emergency => "EMERGENCY",
        };
        f.write_str(name)
    }
}

/// Classify a free-space percentage into an alert level.
pub fn classify(free_percent: f64) -> AlertLevel {
    if free_percent <= EMERGENCY_PERCENT {
        AlertLevel::Emergency
    } else if free_percent <= CRITICAL_PERCENT {
        AlertLevel::Critical
    } else if free_percent <= WARNING_PERCENT {
        AlertLevel::Warning
    } else {
        AlertLevel::Ok
    }
}

/// A point-in-time view of the storage volume.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DiskStatus {
    pub total_bytes: u64,
    pub free_bytes: u64,
    pub used_bytes: u64,
    pub free_percent: f64,
    pub level: AlertLevel,
}

impl DiskStatus {
    /// Build a status from raw totals, computing percentage and level.
    pub fn from_raw(total_bytes: u64, free_bytes: u64) -> Self {
        let free_percent = if total_bytes == 0 {
            100.0
        } else {
            free_bytes as f64 / total_bytes as f64 * 100.0
        };
        Self {
            total_bytes,
            free_bytes,
            used_bytes: total_bytes.saturating_sub(free_bytes),
            free_percent,
            level: classify(free_percent),
        }
    }
}

/// One recorded level change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskAlert {
    pub timestamp: DateTime<Utc>,
    pub level: AlertLevel,
    pub previous: Option<AlertLevel>,
    pub free_percent: f64,
}

#[derive(Debug, Default)]
struct AlertState {
    last_level: Option<AlertLevel>,
    alerts: VecDeque<DiskAlert>,
}

/// Edge-triggered alert tracker over disk status observations.
#[derive(Debug)]
pub struct AlertTracker {
    state: Mutex<AlertState>,
    capacity: usize,
}

impl AlertTracker {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(AlertState::default()),
            capacity,
        }
    }

    /// Feed one observation. Returns the alert if the level changed since
    /// the previous observation (the first observation initializes the
    /// level silently).
    pub fn observe(&self, status: &DiskStatus) -> Option<DiskAlert> {
        let mut state = self.state.lock().expect("alert state lock");

        let changed = match state.last_level {
            None => {
                state.last_level = Some(status.level);
                return None;
            }
            Some(previous) => previous != status.level,
        };
        if !changed {
            return None;
        }

        let previous = state.last_level;
        state.last_level = Some(status.level);

        let alert = DiskAlert {
            timestamp: Utc::now(),
            level: status.level,
            previous,
            free_percent: status.free_percent,
        };

        match status.level {
            AlertLevel::Ok => {
                info!(free_percent = status.free_percent, "disk space recovered")
            }
            level => warn!(
                level = %level,
                free_percent = status.free_percent,
                free_bytes = status.free_bytes,
                "disk space alert"
            ),
        }

        if state.alerts.len() == self.capacity {
            state.alerts.pop_front();
        }
        state.alerts.push_back(alert.clone());
        Some(alert)
    }

    /// The retained alerts, oldest first.
    pub fn recent_alerts(&self) -> Vec<DiskAlert> {
        let state = self.state.lock().expect("alert state lock");
        state.alerts.iter().cloned().collect()
    }
}

/// Query the volume holding `path` via statvfs.
pub fn disk_status_of(path: &Path) -> MonitorResult<DiskStatus> {
    let total = fs2::total_space(path)?;
    let free = fs2::available_space(path)?;
    Ok(DiskStatus::from_raw(total, free))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_thresholds() {
        assert_eq!(classify(50.0), AlertLevel::Ok);
        assert_eq!(classify(20.1), AlertLevel::Ok);
        assert_eq!(classify(20.0), AlertLevel::Warning);
        assert_eq!(classify(15.0), AlertLevel::Critical);
        assert_eq!(classify(5.0), AlertLevel::Emergency);
        assert_eq!(classify(0.0), AlertLevel::Emergency);
    }

    #[test]
    fn test_status_from_raw() {
        let status = DiskStatus::from_raw(1000, 190);
        assert_eq!(status.used_bytes, 810);
        assert_eq!(status.level, AlertLevel::Warning);
        assert!((status.free_percent - 19.0).abs() < 1e-9);
    }

    #[test]
    fn test_crossing_threshold_alerts_exactly_once() {
        let tracker = AlertTracker::new(DEFAULT_ALERT_CAPACITY);

        // Healthy volume at 21% free: initialization, no alert.
        assert!(tracker.observe(&DiskStatus::from_raw(100, 21)).is_none());

        // Crossing into WARNING at 19% free: exactly one alert...
        let alert = tracker.observe(&DiskStatus::from_raw(100, 19)).unwrap();
        assert_eq!(alert.level, AlertLevel::Warning);

        // ...and silence while the level holds.
        for _ in 0..5 {
            assert!(tracker.observe(&DiskStatus::from_raw(100, 19)).is_none());
        }
        assert_eq!(tracker.recent_alerts().len(), 1);
    }

    #[test]
    fn test_recovery_and_escalation_both_alert() {
        let tracker = AlertTracker::new(DEFAULT_ALERT_CAPACITY);
        tracker.observe(&DiskStatus::from_raw(100, 30));
        tracker.observe(&DiskStatus::from_raw(100, 19)).unwrap();

        let escalated = tracker.observe(&DiskStatus::from_raw(100, 4)).unwrap();
        assert_eq!(escalated.level, AlertLevel::Emergency);
        assert_eq!(escalated.previous, Some(AlertLevel::Warning));

        let recovered = tracker.observe(&DiskStatus::from_raw(100, 40)).unwrap();
        assert_eq!(recovered.level, AlertLevel::Ok);
        assert_eq!(tracker.recent_alerts().len(), 3);
    }

    #[test]
    fn test_alert_buffer_is_bounded() {
        let tracker = AlertTracker::new(2);
        tracker.observe(&DiskStatus::from_raw(100, 30));
        // Alternate levels so every observation alerts.
        tracker.observe(&DiskStatus::from_raw(100, 19));
        tracker.observe(&DiskStatus::from_raw(100, 30));
        tracker.observe(&DiskStatus::from_raw(100, 14));

        let alerts = tracker.recent_alerts();
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[1].level, AlertLevel::Critical);
    }

    #[test]
    fn test_disk_status_of_real_volume() {
        let dir = tempfile::TempDir::new().unwrap();
        let status = disk_status_of(dir.path()).unwrap();
        assert!(status.total_bytes > 0);
        assert!(status.free_percent >= 0.0 && status.free_percent <= 100.0);
    }
}
