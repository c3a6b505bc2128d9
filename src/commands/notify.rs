use anyhow::{Context, Result};

use safewatch::telegram::send_notification;

/// Send a test message through the fallback channel, so the credentials
/// can be verified before an emergency depends on them.
pub fn run(message: &str) -> Result<()> {
    send_notification(message).context("Failed to send notification")?;
    println!("Notification sent");
    Ok(())
}
