//! Lightweight Telegram notifier using reqwest.
//!
//! A minimal client for the Bot API: send an HTML-formatted message to one
//! configured chat. This is the fallback channel - it fires after every
//! successful dispatch whether or not the agent's own notification step
//! ran, giving an at-least-once guarantee across the two channels.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client as HttpClient;
use serde::Deserialize;

use crate::config::TelegramConfig;

const TELEGRAM_API: &str = "https://api.telegram.org";

/// Lightweight Telegram Bot API client
pub struct TelegramClient {
    http: HttpClient,
    base_url: String,
    bot_token: String,
    chat_id: String,
}

#[derive(Debug, Deserialize)]
struct SendMessageResponse {
    ok: bool,
}

impl TelegramClient {
    /// Create a client from credentials. Fails if either half is missing;
    /// callers that want best-effort behavior gate on
    /// `TelegramConfig::has_credentials` first.
    pub fn new(config: &TelegramConfig) -> Result<Self> {
        let bot_token = config
            .bot_token
            .clone()
            .context("bot_token is required")?;
        let chat_id = config.chat_id.clone().context("chat_id is required")?;

        let http = HttpClient::builder()
            .timeout(Duration::from_secs(10))
            .user_agent("safewatch")
            .build()?;

        Ok(Self {
            http,
            base_url: TELEGRAM_API.to_string(),
            bot_token,
            chat_id,
        })
    }

    #[cfg(test)]
    fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Send an HTML-formatted message to the configured chat.
    pub fn send_message(&self, text: &str) -> Result<()> {
        let url = format!("{}/bot{}/sendMessage", self.base_url, self.bot_token);

        let resp = self
            .http
            .post(&url)
            .form(&[
                ("chat_id", self.chat_id.as_str()),
                ("text", text),
                ("parse_mode", "HTML"),
            ])
            .send()
            .context("Telegram request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().unwrap_or_default();
            anyhow::bail!("Telegram send failed: {} - {}", status, body);
        }

        let body: SendMessageResponse = resp
            .json()
            .context("Failed to parse Telegram response")?;
        if !body.ok {
            anyhow::bail!("Telegram rejected the message");
        }

        Ok(())
    }
}

/// Send a notification through the globally configured channel (one-shot).
///
/// Missing credentials is an error here; dispatch sites downgrade it to a
/// warning because a lost fallback alert must never revert a recorded fire.
pub fn send_notification(message: &str) -> Result<()> {
    let config = TelegramConfig::load()?;

    if !config.has_credentials() {
        anyhow::bail!(
            "Telegram not configured. Set bot_token and chat_id in ~/.config/safewatch/telegram.toml"
        );
    }

    let client = TelegramClient::new(&config)?;
    client.send_message(message)
}

/// Google Maps directions link for a trip, with both endpoints urlencoded.
pub fn maps_route_link(source: &str, destination: &str) -> String {
    format!(
        "https://www.google.com/maps/dir/{}/{}",
        urlencoding::encode(source),
        urlencoding::encode(destination)
    )
}
