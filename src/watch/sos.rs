//! Emergency (SOS) watcher.
//!
//! Polls the SOS server's pending queue and dispatches the emergency agent
//! for each request. The server is the source of record: only its
//! acknowledgment endpoint moves a request away from pending, so local
//! retries can never lose an emergency, only repeat one.

use std::io::Write;
use std::time::Duration as StdDuration;

use anyhow::{Context, Result};

use crate::agent::{CommandBuilder, Outcome, builder_for, excerpt, invoke};
use crate::config::Config;
use crate::remote::SosClient;
use crate::task::SosRequest;
use crate::telegram::send_notification;

use super::{CancelToken, DISPATCH_DELAY, Watcher, logline, logwarn, sleep_interruptible};

pub struct SosWatcher {
    client: SosClient,
    interval: StdDuration,
    profile: String,
    timeout: StdDuration,
    builder: Box<dyn CommandBuilder>,
}

impl SosWatcher {
    /// Build from config; a CLI-provided interval (seconds) overrides it.
    /// A missing server URL is a startup configuration error.
    pub fn new(config: &Config, interval_secs: Option<u64>) -> Result<Self> {
        let server_url = config.sos.server_url.as_deref().context(
            "sos.server_url is not configured. Set it in config.toml to watch for SOS requests",
        )?;

        Ok(Self {
            client: SosClient::new(server_url, 10)?,
            interval: StdDuration::from_secs(interval_secs.unwrap_or(config.sos.interval_secs)),
            profile: config.sos.agent.clone(),
            timeout: StdDuration::from_secs(config.sos.timeout_secs),
            builder: builder_for(&config.agent),
        })
    }

    fn dispatch(&self, request: &SosRequest) -> Result<()> {
        logline(&format!(
            "Dispatching agent '{}' via {} for request #{}",
            self.profile,
            self.builder.name(),
            request.id
        ));

        let instruction = build_instruction(request);
        let invocation = self.builder.build(&self.profile, &instruction);
        let result = invoke(&invocation, self.timeout)?;

        match result.outcome {
            Outcome::Success => {
                logline(&format!(
                    "Agent completed for request #{} in {}s",
                    request.id,
                    result.duration.as_secs()
                ));

                // Remote half of the idempotency ledger. A failed
                // acknowledgment does not retract the success; the request
                // may simply fire again next poll (at-least-once).
                match self.client.acknowledge(&request.id) {
                    Ok(()) => {
                        logline(&format!("Request #{} marked as completed", request.id));
                    }
                    Err(e) => logwarn(&format!(
                        "Could not mark #{} as completed: {:#} (it may be \
                         dispatched again next poll)",
                        request.id, e
                    )),
                }

                match send_notification(&build_alert(request)) {
                    Ok(()) => logline("Fallback notification sent"),
                    Err(e) => logwarn(&format!(
                        "Fallback notification failed for #{}: {:#}",
                        request.id, e
                    )),
                }
            }
            Outcome::Failed { code } => {
                logwarn(&format!(
                    "Agent failed for request #{} (exit {}): {}",
                    request.id,
                    code,
                    excerpt(&result.stderr, 500)
                ));
            }
            Outcome::TimedOut => {
                logwarn(&format!(
                    "Agent timed out for request #{} after {}s; it may have \
                     partially completed (a ride may already be booked)",
                    request.id,
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

impl Watcher for SosWatcher {
    fn name(&self) -> &str {
        "sos"
    }

    fn interval(&self) -> StdDuration {
        self.interval
    }

    fn tick(&mut self, token: &CancelToken) -> Result<()> {
        let pending = match self.client.pending() {
            Ok(p) => p,
            Err(e) => {
                // Transient: an unreachable server must not kill the loop.
                logwarn(&format!("Could not fetch pending requests: {:#}", e));
                return Ok(());
            }
        };

        if pending.is_empty() {
            logline("No pending SOS requests");
            return Ok(());
        }

        ring_bell();
        logline(&format!("{} PENDING SOS REQUEST(S)!", pending.len()));

        let total = pending.len();
        for (i, request) in pending.iter().enumerate() {
            if token.is_cancelled() {
                return Ok(());
            }
            if !request.is_pending() {
                continue;
            }

            logline(&format!("EMERGENCY REQUEST #{}", request.id));
            logline(&format!(
                "  Location: {}, {}",
                request.latitude, request.longitude
            ));
            logline(&format!("  User: {}", request.user_id));

            self.dispatch(request)?;

            if i + 1 < total {
                sleep_interruptible(token, DISPATCH_DELAY);
            }
        }

        Ok(())
    }
}

/// Terminal bell on SOS detection, for anyone near the console.
fn ring_bell() {
    print!("\x07");
    let _ = std::io::stdout().flush();
}

/// The multi-step directive handed to the emergency agent.
fn build_instruction(request: &SosRequest) -> String {
    format!(
        r#"URGENT EMERGENCY RIDE REQUEST!

An SOS alert has been triggered. Book a ride to safety IMMEDIATELY.

Emergency Details:
- Request ID: {id}
- Current Location: Latitude {lat}, Longitude {lng}
- User ID: {user}
- Timestamp: {ts}

REQUIRED ACTIONS:
1. Open the ride-hailing site in the browser
2. Set the pickup location to: {lat}, {lng}
3. Set the destination to the nearest safe location (police station, hospital, or public place)
4. Select the fastest available ride option
5. Complete the booking
6. Report back the ride details (driver name, ETA, vehicle info)

This is a real emergency - act quickly and efficiently!"#,
        id = request.id,
        lat = request.latitude,
        lng = request.longitude,
        user = request.user_id,
        ts = request.timestamp,
    )
}

/// The direct fallback alert for the notification channel.
fn build_alert(request: &SosRequest) -> String {
    format!(
        "<b>EMERGENCY RESPONSE DISPATCHED</b>\n\n\
         SOS request #{}\n\
         Location: {}, {}\n\
         User: {}\n\n\
         A ride to safety has been requested.",
        request.id, request.latitude, request.longitude, request.user_id
    )
}
