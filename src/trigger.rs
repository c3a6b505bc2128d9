//! Trigger evaluation for time-triggered tasks.
//!
//! Evaluation is windowed, not edge-triggered: a trip stays actionable on
//! every poll from the moment the reminder window opens until it either
//! fires or the window closes at departure. Polling-interval drift and
//! missed ticks therefore cannot lose a trigger; the fired flag in the task
//! book is what prevents duplicates within the window.

use chrono::{DateTime, Duration, Utc};

use crate::task::TripTask;

/// An actionable trip together with the reason it fired, phrased for both
/// the log and the agent instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Due<'a> {
    pub trip: &'a TripTask,
    pub reason: String,
}

/// True iff `now` lies in `[depart_at - lead, depart_at)`.
pub fn in_window(trip: &TripTask, now: DateTime<Utc>, lead: Duration) -> bool {
    let opens = trip.depart_at - lead;
    now >= opens && now < trip.depart_at
}

/// The ordered set of trips actionable right now: unfired, window open.
pub fn due_trips<'a, I>(trips: I, now: DateTime<Utc>, lead: Duration) -> Vec<Due<'a>>
where
    I: IntoIterator<Item = &'a TripTask>,
{
    trips
        .into_iter()
        .filter(|t| !t.fired && in_window(t, now, lead))
        .map(|trip| {
            let remaining = trip.depart_at - now;
            Due {
                reason: format!(
                    "Trip {} -> {} departs at {} (in {}); safety reminder required",
                    trip.source,
                    trip.destination,
                    trip.depart_at.format("%Y-%m-%d %H:%M UTC"),
                    format_countdown(remaining),
                ),
                trip,
            }
        })
        .collect()
}

/// Time until the reminder window opens for a trip that is not yet due.
/// `None` once the window has opened (or passed) or the trip already fired.
pub fn time_until_window(
    trip: &TripTask,
    now: DateTime<Utc>,
    lead: Duration,
) -> Option<Duration> {
    if trip.fired {
        return None;
    }
    let opens = trip.depart_at - lead;
    if now < opens { Some(opens - now) } else { None }
}

/// Render a duration as "3h 27m" for countdown log lines.
pub fn format_countdown(d: Duration) -> String {
    let total_minutes = d.num_minutes().max(0);
    format!("{}h {}m", total_minutes / 60, total_minutes % 60)
}
