use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use std::path::Path;

use safewatch::config::Config;
use safewatch::store::{TaskBook, book_path};
use safewatch::task::{Task, TripTask};
use safewatch::trigger::{format_countdown, time_until_window};

pub fn add(
    dir: &Path,
    depart: &str,
    source: &str,
    destination: &str,
    id: Option<&str>,
    json: bool,
) -> Result<()> {
    let depart_at = parse_depart(depart)?;

    let path = book_path(dir);
    let mut book = TaskBook::load(&path).context("Failed to load task book")?;

    let id = id
        .map(str::to_string)
        .unwrap_or_else(|| format!("trip-{}", Utc::now().timestamp_millis()));
    if book.get(&id).is_some() {
        anyhow::bail!("Task '{}' already exists", id);
    }

    book.add(Task::Trip(TripTask {
        id: id.clone(),
        depart_at,
        source: source.to_string(),
        destination: destination.to_string(),
        fired: false,
        fired_at: None,
    }));
    book.save(&path).context("Failed to save task book")?;

    if json {
        let output = serde_json::json!({
            "id": id,
            "depart_at": depart_at.to_rfc3339(),
            "source": source,
            "destination": destination,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!(
            "Added trip '{}': {} -> {} departing {} UTC",
            id,
            source,
            destination,
            depart_at.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}

pub fn list(dir: &Path, json: bool) -> Result<()> {
    let config = Config::load(dir)?;
    let lead = chrono::Duration::hours(config.trips.lead_hours);

    let book = TaskBook::load(book_path(dir)).context("Failed to load task book")?;
    let trips: Vec<_> = book.trips().collect();

    if json {
        let output: Vec<_> = trips
            .iter()
            .map(|t| {
                serde_json::json!({
                    "id": t.id,
                    "depart_at": t.depart_at.to_rfc3339(),
                    "source": t.source,
                    "destination": t.destination,
                    "fired": t.fired,
                    "fired_at": t.fired_at.map(|at| at.to_rfc3339()),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else if trips.is_empty() {
        println!("No trips scheduled");
    } else {
        let now = Utc::now();
        for trip in trips {
            let marker = if trip.fired { "[x]" } else { "[ ]" };
            let hint = match time_until_window(trip, now, lead) {
                Some(until) => format!(" (reminder in {})", format_countdown(until)),
                None => String::new(),
            };
            println!(
                "{} {} {} -> {} departs {} UTC{}",
                marker,
                trip.id,
                trip.source,
                trip.destination,
                trip.depart_at.format("%Y-%m-%d %H:%M"),
                hint
            );
        }
    }
    Ok(())
}

pub fn remove(dir: &Path, id: &str) -> Result<()> {
    let path = book_path(dir);
    let mut book = TaskBook::load(&path).context("Failed to load task book")?;

    if !book.remove(id) {
        anyhow::bail!("Task '{}' not found", id);
    }
    book.save(&path).context("Failed to save task book")?;

    println!("Removed '{}'", id);
    Ok(())
}

/// Accept RFC 3339 or a couple of bare local-free formats, treated as UTC.
fn parse_depart(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(naive.and_utc());
        }
    }
    anyhow::bail!(
        "Could not parse departure time '{}'. Use RFC 3339 (2025-06-01T18:00:00Z) \
         or YYYY-MM-DD HH:MM (UTC)",
        s
    )
}
