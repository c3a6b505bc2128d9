use anyhow::{Context, Result};
use chrono::Utc;
use std::path::Path;

use safewatch::config::Config;
use safewatch::emergency::{check_conditions, recommendation};
use safewatch::remote::MonitorClient;

pub fn run(dir: &Path, hours: i64, json: bool) -> Result<()> {
    let config = Config::load(dir)?;

    let api_url = config.monitor.api_url.as_deref().context(
        "monitor.api_url is not configured. Set it in config.toml to analyze snapshots",
    )?;

    let client = MonitorClient::new(api_url, config.monitor.timeout_secs)?;
    let snapshots = client
        .recent_snapshots(hours, 100)
        .context("Failed to fetch snapshot history")?;

    let now = Utc::now();
    let alerts = check_conditions(&snapshots, now, &config.emergency);
    let advice = recommendation(&alerts);

    if json {
        let output = serde_json::json!({
            "analysis_time": now.to_rfc3339(),
            "window_hours": hours,
            "snapshots_analyzed": snapshots.len(),
            "emergency_detected": !alerts.is_empty(),
            "alert_count": alerts.len(),
            "alerts": alerts,
            "recommendation": advice,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!(
        "Analyzed {} snapshot(s) from the last {} hours",
        snapshots.len(),
        hours
    );
    if let Some(latest) = snapshots.first() {
        println!(
            "Latest: battery {}%, network {}, at {} ({}, {})",
            latest.battery,
            if latest.network { "up" } else { "down" },
            latest.timestamp.format("%Y-%m-%d %H:%M UTC"),
            latest.lat,
            latest.lng
        );
    }

    if alerts.is_empty() {
        println!("No alerts");
    } else {
        for alert in &alerts {
            println!(
                "{} {}",
                format!("[{:?}]", alert.severity).to_uppercase(),
                alert.message
            );
        }
    }
    println!("{}", advice);

    Ok(())
}
