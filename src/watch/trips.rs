//! Trip-reminder watcher.
//!
//! Each cycle: load the task book, dispatch the agent for every trip whose
//! reminder window is open, record fired state atomically, send the direct
//! fallback alert, and log a countdown for trips that are not due yet.

use std::path::{Path, PathBuf};
use std::time::Duration as StdDuration;

use anyhow::{Context, Result};
use chrono::{Duration, Utc};

use crate::agent::{CommandBuilder, Outcome, builder_for, excerpt, invoke};
use crate::config::Config;
use crate::store::{TaskBook, book_path};
use crate::task::TripTask;
use crate::telegram::{maps_route_link, send_notification};
use crate::trigger::{due_trips, format_countdown, time_until_window};

use super::{CancelToken, DISPATCH_DELAY, Watcher, logline, logwarn, sleep_interruptible};

pub struct TripWatcher {
    book_path: PathBuf,
    lead: Duration,
    interval: StdDuration,
    profile: String,
    timeout: StdDuration,
    builder: Box<dyn CommandBuilder>,
}

/// Owned snapshot of one actionable trip, taken before the book is
/// reborrowed mutably for ledger updates.
struct Dispatch {
    id: String,
    reason: String,
    instruction: String,
    alert: String,
}

impl TripWatcher {
    /// Build from config; a CLI-provided interval (minutes) overrides it.
    pub fn new(dir: &Path, config: &Config, interval_minutes: Option<u64>) -> Self {
        let minutes = interval_minutes.unwrap_or(config.trips.interval_minutes);
        Self {
            book_path: book_path(dir),
            lead: Duration::hours(config.trips.lead_hours),
            interval: StdDuration::from_secs(minutes * 60),
            profile: config.trips.agent.clone(),
            timeout: StdDuration::from_secs(config.trips.timeout_secs),
            builder: builder_for(&config.agent),
        }
    }

    fn dispatch(&self, book: &mut TaskBook, d: &Dispatch) -> Result<()> {
        logline(&format!(
            "Dispatching agent '{}' via {} for {}",
            self.profile,
            self.builder.name(),
            d.id
        ));

        let invocation = self.builder.build(&self.profile, &d.instruction);
        let result = invoke(&invocation, self.timeout)?;

        match result.outcome {
            Outcome::Success => {
                logline(&format!(
                    "Agent completed for {} in {}s",
                    d.id,
                    result.duration.as_secs()
                ));
                if !result.stdout.is_empty() {
                    logline(&format!("Agent output: {}", excerpt(&result.stdout, 500)));
                }

                book.mark_fired(&d.id, Utc::now())?;
                book.save(&self.book_path)
                    .context("Failed to record fired state")?;

                // The agent runs non-interactively and may have skipped its
                // own notification step; the direct channel covers that.
                match send_notification(&d.alert) {
                    Ok(()) => logline("Fallback notification sent"),
                    Err(e) => logwarn(&format!(
                        "Fallback notification failed for {}: {:#}",
                        d.id, e
                    )),
                }
            }
            Outcome::Failed { code } => {
                logwarn(&format!(
                    "Agent failed for {} (exit {}): {}",
                    d.id,
                    code,
                    excerpt(&result.stderr, 500)
                ));
            }
            Outcome::TimedOut => {
                logwarn(&format!(
                    "Agent timed out for {} after {}s; it may have partially \
                     completed (an alert may already have been sent)",
                    d.id,
                    self.timeout.as_secs()
                ));
            }
            Outcome::NotFound => {
                logwarn(&format!(
                    "Agent executable '{}' not found. Install it or update \
                     [agent] in config.toml",
                    invocation.program
                ));
            }
        }

        Ok(())
    }
}

impl Watcher for TripWatcher {
    fn name(&self) -> &str {
        "trip"
    }

    fn interval(&self) -> StdDuration {
        self.interval
    }

    fn tick(&mut self, token: &CancelToken) -> Result<()> {
        let mut book =
            TaskBook::load(&self.book_path).context("Failed to load task book")?;

        let trip_count = book.trips().count();
        if trip_count == 0 {
            logline("No trips scheduled");
            return Ok(());
        }

        let now = Utc::now();
        logline(&format!("Checking {} trip(s)...", trip_count));

        let dispatches: Vec<Dispatch> = due_trips(book.trips(), now, self.lead)
            .into_iter()
            .map(|due| Dispatch {
                id: due.trip.id.clone(),
                reason: due.reason,
                instruction: build_instruction(due.trip, self.lead),
                alert: build_alert(due.trip),
            })
            .collect();

        let total = dispatches.len();
        for (i, dispatch) in dispatches.iter().enumerate() {
            if token.is_cancelled() {
                return Ok(());
            }
            logline(&format!("REMINDER TIME! {}", dispatch.reason));
            self.dispatch(&mut book, dispatch)?;

            if i + 1 < total {
                sleep_interruptible(token, DISPATCH_DELAY);
            }
        }

        for trip in book.trips() {
            if let Some(until) = time_until_window(trip, now, self.lead) {
                logline(&format!(
                    "Trip to {}: reminder in {}",
                    trip.destination,
                    format_countdown(until)
                ));
            }
        }

        Ok(())
    }
}

/// The multi-step directive handed to the agent. Step order is part of the
/// contract: the direct alert goes out before the slower research steps.
fn build_instruction(trip: &TripTask, lead: Duration) -> String {
    let route_link = maps_route_link(&trip.source, &trip.destination);
    let date = trip.depart_at.format("%Y-%m-%d");
    let time = trip.depart_at.format("%H:%M");

    format!(
        r#"URGENT: Send a safety reminder for an upcoming trip.

Trip: {src} -> {dst}
Date: {date} at {time} UTC

STEP 1 - SEND TELEGRAM IMMEDIATELY:
Use the telegram send_message tool to send this alert:
"Safety reminder - trip to {dst} in {lead} hours! Route: {route_link} Stay safe!"

STEP 2 - Get the weather forecast for {dst}

STEP 3 - Get recent safety news for {dst}

STEP 4 - Create an HTML report: trip-safety-report-{dst}-{date}.html

TELEGRAM IS MANDATORY - DO NOT SKIP!"#,
        src = trip.source,
        dst = trip.destination,
        lead = lead.num_hours(),
    )
}

/// The direct fallback alert, HTML-formatted for the notification channel.
fn build_alert(trip: &TripTask) -> String {
    let route_link = maps_route_link(&trip.source, &trip.destination);
    format!(
        "<b>SAFETY REMINDER</b>\n\n\
         Trip: {} -> {}\n\
         Departure: {} UTC\n\n\
         <a href=\"{}\">View route</a>\n\n\
         Safety report on the way. Stay safe!",
        trip.source,
        trip.destination,
        trip.depart_at.format("%Y-%m-%d %H:%M"),
        route_link
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Task;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn trip(id: &str, depart: chrono::DateTime<Utc>) -> TripTask {
        TripTask {
            id: id.to_string(),
            depart_at: depart,
            source: "Home".to_string(),
            destination: "Airport".to_string(),
            fired: false,
            fired_at: None,
        }
    }

    fn watcher(dir: &Path) -> TripWatcher {
        TripWatcher::new(dir, &Config::default(), None)
    }

    #[test]
    fn test_new_applies_interval_override() {
        let tmp = TempDir::new().unwrap();
        let w = TripWatcher::new(tmp.path(), &Config::default(), Some(5));
        assert_eq!(w.interval(), StdDuration::from_secs(300));

        let w = watcher(tmp.path());
        assert_eq!(w.interval(), StdDuration::from_secs(30 * 60));
    }

    #[test]
    fn test_tick_with_no_book_is_nothing_to_do() {
        let tmp = TempDir::new().unwrap();
        let mut w = watcher(tmp.path());
        w.tick(&CancelToken::new()).unwrap();
    }

    #[test]
    fn test_tick_outside_window_dispatches_nothing() {
        let tmp = TempDir::new().unwrap();
        let depart = Utc::now() + Duration::hours(12);
        let mut book = TaskBook::new();
        book.add(Task::Trip(trip("trip-1", depart)));
        book.save(book_path(tmp.path())).unwrap();

        let mut w = watcher(tmp.path());
        w.tick(&CancelToken::new()).unwrap();

        // Nothing fired: the book on disk is unchanged
        let book = TaskBook::load(book_path(tmp.path())).unwrap();
        assert!(!book.get("trip-1").unwrap().fired());
    }

    #[test]
    fn test_cancelled_token_skips_dispatch() {
        let tmp = TempDir::new().unwrap();
        let depart = Utc::now() + Duration::hours(2);
        let mut book = TaskBook::new();
        book.add(Task::Trip(trip("trip-1", depart)));
        book.save(book_path(tmp.path())).unwrap();

        let token = CancelToken::new();
        token.cancel();
        let mut w = watcher(tmp.path());
        w.tick(&token).unwrap();

        let book = TaskBook::load(book_path(tmp.path())).unwrap();
        assert!(!book.get("trip-1").unwrap().fired());
    }

    #[test]
    fn test_instruction_preserves_step_order_and_payload() {
        let depart = Utc.with_ymd_and_hms(2025, 6, 1, 18, 0, 0).unwrap();
        let instruction = build_instruction(&trip("trip-1", depart), Duration::hours(4));

        assert!(instruction.contains("Home -> Airport"));
        assert!(instruction.contains("2025-06-01 at 18:00 UTC"));
        assert!(instruction.contains("in 4 hours"));

        let s1 = instruction.find("STEP 1").unwrap();
        let s2 = instruction.find("STEP 2").unwrap();
        let s3 = instruction.find("STEP 3").unwrap();
        let s4 = instruction.find("STEP 4").unwrap();
        assert!(s1 < s2 && s2 < s3 && s3 < s4);
    }

    #[test]
    fn test_alert_contains_route_link() {
        let depart = Utc.with_ymd_and_hms(2025, 6, 1, 18, 0, 0).unwrap();
        let alert = build_alert(&trip("trip-1", depart));
        assert!(alert.contains("https://www.google.com/maps/dir/Home/Airport"));
        assert!(alert.contains("<b>SAFETY REMINDER</b>"));
    }
}
