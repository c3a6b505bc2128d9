//! Task records for the watch engine.
//!
//! A task is either time-triggered (a trip that fires once inside a lead
//! window before departure) or state-triggered (an SOS request that stays
//! actionable while its source of record reports it pending). Both variants
//! share an identity and fired-state contract; variant-specific payload is
//! validated when the collection is loaded, not defensively at use sites.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A scheduled trip. Fires at most once within the lead window before
/// `depart_at`; the window closes at the departure instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripTask {
    pub id: String,
    /// Departure time (RFC 3339). The reminder window is
    /// `[depart_at - lead, depart_at)`.
    pub depart_at: DateTime<Utc>,
    pub source: String,
    pub destination: String,
    /// Set exactly once, after a dispatch reports success. Never reset.
    #[serde(default)]
    pub fired: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fired_at: Option<DateTime<Utc>>,
}

impl TripTask {
    /// Record a successful dispatch. The fired flag only ever goes
    /// false -> true; a second call is a no-op.
    pub fn mark_fired(&mut self, at: DateTime<Utc>) {
        if !self.fired {
            self.fired = true;
            self.fired_at = Some(at);
        }
    }
}

/// Remote status of an SOS request. The server owns the transition away
/// from `Pending` via the acknowledgment endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SosStatus {
    Pending,
    Completed,
}

/// An emergency ride request as returned by the SOS server's pending queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SosRequest {
    pub id: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default = "default_user_id")]
    pub user_id: String,
    /// Submission time, passed through verbatim into the agent instruction.
    #[serde(default)]
    pub timestamp: String,
    pub status: SosStatus,
}

fn default_user_id() -> String {
    "emergency_user".to_string()
}

impl SosRequest {
    /// A state-triggered task is actionable while the server still reports
    /// it pending.
    pub fn is_pending(&self) -> bool {
        self.status == SosStatus::Pending
    }
}

/// A unit of schedulable work, tagged by trigger style.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Task {
    Trip(TripTask),
    Sos(SosRequest),
}

impl Task {
    pub fn id(&self) -> &str {
        match self {
            Task::Trip(t) => &t.id,
            Task::Sos(s) => &s.id,
        }
    }

    /// Whether this task has already been dispatched. For state-triggered
    /// tasks the source of record holds the flag: anything no longer
    /// pending counts as fired.
    pub fn fired(&self) -> bool {
        match self {
            Task::Trip(t) => t.fired,
            Task::Sos(s) => !s.is_pending(),
        }
    }

    pub fn as_trip(&self) -> Option<&TripTask> {
        match self {
            Task::Trip(t) => Some(t),
            Task::Sos(_) => None,
        }
    }

    pub fn as_trip_mut(&mut self) -> Option<&mut TripTask> {
        match self {
            Task::Trip(t) => Some(t),
            Task::Sos(_) => None,
        }
    }
}
