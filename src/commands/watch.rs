use anyhow::Result;
use std::path::Path;

use safewatch::config::Config;
use safewatch::store::book_path;
use safewatch::watch::{
    CancelToken, SosWatcher, TripWatcher, Watcher, logline, run_loop, run_once,
};

pub fn trips(dir: &Path, once: bool, interval: Option<u64>) -> Result<()> {
    let config = Config::load(dir)?;
    let mut watcher = TripWatcher::new(dir, &config, interval);

    logline(&format!("Watching {}", book_path(dir).display()));
    logline(&format!(
        "Reminder window: {} hours before departure",
        config.trips.lead_hours
    ));

    drive(&mut watcher, once)
}

pub fn sos(dir: &Path, once: bool, interval: Option<u64>) -> Result<()> {
    let config = Config::load(dir)?;
    // Missing server_url is a startup configuration error: bail nonzero.
    let mut watcher = SosWatcher::new(&config, interval)?;

    if let Some(url) = &config.sos.server_url {
        logline(&format!("SOS server: {}", url));
    }
    logline(&format!("Agent profile: {}", config.sos.agent));

    drive(&mut watcher, once)
}

fn drive(watcher: &mut dyn Watcher, once: bool) -> Result<()> {
    if once {
        run_once(watcher)
    } else {
        let token = CancelToken::new();
        token.install_signal_handlers()?;
        run_loop(watcher, &token);
        Ok(())
    }
}
