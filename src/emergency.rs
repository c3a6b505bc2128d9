//! Emergency condition detection over device-status snapshots.
//!
//! Pure analysis: alerts are derived from the snapshot window on every
//! query and never persisted. The caller supplies `now` so staleness is
//! deterministic under test.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::EmergencyConfig;

/// One device-status snapshot as returned by the snapshot provider,
/// newest-first in a history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub timestamp: DateTime<Utc>,
    /// Battery percent, 0-100
    pub battery: i32,
    /// Whether the device had network connectivity
    pub network: bool,
    pub lat: f64,
    pub lng: f64,
}

/// Alert severity, ordered so the maximum drives the recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertKind {
    BatteryCritical,
    BatteryLow,
    NetworkLost,
    SnapshotStale,
    RapidDrain,
}

/// A derived emergency alert. Location and timestamp come from the latest
/// snapshot so the reader knows where the device last was.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyAlert {
    pub kind: AlertKind,
    pub severity: Severity,
    pub message: String,
    pub lat: f64,
    pub lng: f64,
    pub timestamp: DateTime<Utc>,
}

impl EmergencyAlert {
    fn from_latest(kind: AlertKind, severity: Severity, message: String, latest: &Snapshot) -> Self {
        Self {
            kind,
            severity,
            message,
            lat: latest.lat,
            lng: latest.lng,
            timestamp: latest.timestamp,
        }
    }
}

/// Check all emergency conditions against a newest-first snapshot history.
///
/// Battery critical/low are mutually exclusive (critical wins); every other
/// category fires independently. An empty history yields no alerts.
pub fn check_conditions(
    snapshots: &[Snapshot],
    now: DateTime<Utc>,
    thresholds: &EmergencyConfig,
) -> Vec<EmergencyAlert> {
    let Some(latest) = snapshots.first() else {
        return Vec::new();
    };

    let mut alerts = Vec::new();

    if latest.battery <= thresholds.battery_critical {
        alerts.push(EmergencyAlert::from_latest(
            AlertKind::BatteryCritical,
            Severity::Critical,
            format!(
                "Battery critically low at {}%! Device may shut down soon.",
                latest.battery
            ),
            latest,
        ));
    } else if latest.battery <= thresholds.battery_low {
        alerts.push(EmergencyAlert::from_latest(
            AlertKind::BatteryLow,
            Severity::High,
            format!("Battery low at {}%", latest.battery),
            latest,
        ));
    }

    if !latest.network {
        alerts.push(EmergencyAlert::from_latest(
            AlertKind::NetworkLost,
            Severity::Medium,
            "Device has lost network connectivity".to_string(),
            latest,
        ));
    }

    let minutes_since = (now - latest.timestamp).num_minutes();
    if minutes_since > thresholds.stale_minutes {
        alerts.push(EmergencyAlert::from_latest(
            AlertKind::SnapshotStale,
            Severity::High,
            format!("No status update for {} minutes", minutes_since),
            latest,
        ));
    }

    if snapshots.len() >= 2 {
        let oldest = &snapshots[snapshots.len() - 1];
        let elapsed_hours =
            (latest.timestamp - oldest.timestamp).num_seconds() as f64 / 3600.0;
        // Zero (or negative) elapsed time: the rate is undefined, skip.
        if elapsed_hours > 0.0 {
            let drain_rate = f64::from(oldest.battery - latest.battery) / elapsed_hours;
            // Inclusive boundary: draining at exactly the threshold alerts.
            if drain_rate >= thresholds.drain_rate_per_hour {
                alerts.push(EmergencyAlert::from_latest(
                    AlertKind::RapidDrain,
                    Severity::Medium,
                    format!("Battery draining rapidly at {:.1}%/hour", drain_rate),
                    latest,
                ));
            }
        }
    }

    alerts
}

/// Single recommendation string ranked by the most severe alert present.
pub fn recommendation(alerts: &[EmergencyAlert]) -> &'static str {
    match alerts.iter().map(|a| a.severity).max() {
        None => "No immediate concerns. Device status appears normal.",
        Some(Severity::Critical) => {
            "URGENT: Critical condition detected. Contact the person immediately or alert emergency services."
        }
        Some(Severity::High) => {
            "WARNING: High severity issue detected. Check on the person soon."
        }
        Some(Severity::Medium) => "NOTICE: Some concerns detected. Monitor the situation.",
        Some(Severity::Low) => "Minor issues detected. Keep monitoring.",
    }
}
