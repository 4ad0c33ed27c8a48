//! Telling someone about a scan while it runs.

use std::net::Ipv4Addr;

use serde_json::{Value, json};
use tokio_util::task::TaskTracker;
use tracing::warn;

use crate::{
    database::{AuthLabel, WhitelistLabel},
    processing::ServerInfo,
    scanner::ScanStatsSnapshot,
};

#[derive(Debug, Clone)]
pub enum ScanEvent {
    Started {
        seed: Ipv4Addr,
        port_start: u16,
        port_end: u16,
    },
    Found {
        info: ServerInfo,
        auth: AuthLabel,
        whitelist: WhitelistLabel,
    },
    Finished {
        stats: ScanStatsSnapshot,
    },
}

impl ScanEvent {
    pub fn found(info: ServerInfo) -> Self {
        Self::Found {
            auth: AuthLabel::from_open_auth(info.is_open_auth),
            whitelist: WhitelistLabel::from_likely(info.whitelist_likely),
            info,
        }
    }
}

/// Fire and forget. A notifier must never hold up or fail the scan.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: ScanEvent);
}

/// Posts events to a Discord-style webhook.
///
/// Posts run in the background, call [`Webhook::flush`] before shutting the
/// runtime down or the last ones are lost.
#[derive(Debug, Clone)]
pub struct Webhook {
    client: reqwest::Client,
    url: String,
    posts: TaskTracker,
}

impl Webhook {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            posts: TaskTracker::new(),
        }
    }

    /// Wait for every post sent so far to finish. The webhook can still be
    /// used afterwards.
    pub async fn flush(&self) {
        self.posts.close();
        self.posts.wait().await;
        self.posts.reopen();
    }
}

impl Notifier for Webhook {
    fn notify(&self, event: ScanEvent) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("not sending webhook, no tokio runtime");
            return;
        };

        let client = self.client.clone();
        let url = self.url.clone();
        let body = webhook_body(&event);
        self.posts.spawn_on(
            async move {
                let result = client
                    .post(url)
                    .json(&body)
                    .send()
                    .await
                    .and_then(|res| res.error_for_status());
                if let Err(err) = result {
                    warn!("failed to send webhook: {err}");
                }
            },
            &runtime,
        );
    }
}

pub fn webhook_body(event: &ScanEvent) -> Value {
    match event {
        ScanEvent::Started { seed, .. } => json!({
            "content": format!("Scanning similar IPs based on {seed}...")
        }),
        ScanEvent::Found {
            info,
            auth,
            whitelist,
        } => {
            let mut embed = json!({
                "title": "Server pinged!",
                "description": format!("**{}**", info.target),
                "color": 0xe74c3c,
                "fields": [
                    { "name": "MOTD", "value": non_empty(&info.motd), "inline": false },
                    {
                        "name": "Players Online",
                        "value": format!("{} / {}", info.players_online, info.max_players),
                        "inline": false
                    },
                    { "name": "Auth method", "value": auth.as_str(), "inline": false },
                    { "name": "Whitelist", "value": whitelist.as_str(), "inline": false }
                ]
            });
            if !info.version_name.is_empty() {
                embed["footer"] = json!({ "text": info.version_name });
            }
            json!({ "embeds": [embed] })
        }
        ScanEvent::Finished { stats } => json!({
            "content": format!(
                "Scanning complete! Found {} servers out of {} probed.",
                stats.found, stats.probed
            )
        }),
    }
}

/// Discord rejects embed fields with an empty value.
fn non_empty(s: &str) -> &str {
    if s.trim().is_empty() { "\u{200b}" } else { s }
}
