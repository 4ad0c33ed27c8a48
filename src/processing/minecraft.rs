pub mod noise;

use std::net::SocketAddrV4;

use serde::Deserialize;
use serde_json::Value;

use super::sanitize::sanitize_text;

/// What a server told us about itself, cleaned up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    pub target: SocketAddrV4,
    /// The description flattened to plain text, with control characters
    /// removed.
    pub motd: String,
    /// Passed through as the server reported it. Nothing guarantees this is
    /// at most `max_players`, or even that it isn't negative.
    pub players_online: i32,
    /// Also passed through unchecked, negative values included.
    pub max_players: i32,
    /// Usually a `data:image/png;base64,` URI, but we don't check.
    pub favicon: Option<String>,
    pub version_name: String,
    pub version_protocol: i32,

    /// Whether the server probably doesn't check that players own their
    /// account. Only a guess based on the version name being "offline", which
    /// is what a lot of server software reports in that mode.
    pub is_open_auth: bool,
    /// Whether the server probably has a whitelist. Only a guess: either the
    /// MOTD mentions a whitelist, or the server sent an empty player sample.
    pub whitelist_likely: bool,
}

impl ServerInfo {
    pub fn addr(&self) -> std::net::Ipv4Addr {
        *self.target.ip()
    }

    pub fn port(&self) -> u16 {
        self.target.port()
    }
}

#[derive(Deserialize)]
struct RawStatus {
    #[serde(default)]
    description: Value,
    players: RawPlayers,
    version: RawVersion,
    #[serde(default)]
    favicon: Option<String>,
}

#[derive(Deserialize)]
struct RawPlayers {
    online: i32,
    max: i32,
    #[serde(default)]
    sample: Option<Vec<Value>>,
}

#[derive(Deserialize)]
struct RawVersion {
    name: String,
    #[serde(default)]
    protocol: i32,
}

pub fn parse_status_json(target: SocketAddrV4, json: &str) -> eyre::Result<ServerInfo> {
    let status: RawStatus = serde_json::from_str(json)?;

    let motd = sanitize_text(&description_plaintext(&status.description));

    let is_open_auth = status.version.name.to_lowercase() == "offline";

    // servers with a whitelist tend to hide who's online
    let has_empty_sample = status
        .players
        .sample
        .as_ref()
        .is_some_and(|sample| sample.is_empty());
    let whitelist_likely = motd.to_lowercase().contains("whitelist") || has_empty_sample;

    Ok(ServerInfo {
        target,
        motd,
        players_online: status.players.online,
        max_players: status.players.max,
        favicon: status.favicon.filter(|favicon| !favicon.is_empty()),
        version_name: status.version.name,
        version_protocol: status.version.protocol,
        is_open_auth,
        whitelist_likely,
    })
}

/// Flatten a description into the text a player would read, in order.
///
/// The description can be a plain string, a chat component, or an array of
/// either. Styling is dropped, and that includes legacy `§` formatting codes.
/// Only `text` and `extra` are read from components.
pub fn description_plaintext(description: &Value) -> String {
    let mut text = String::new();
    push_component_text(description, &mut text);
    text
}

fn push_component_text(component: &Value, out: &mut String) {
    match component {
        Value::String(s) => push_without_formatting_codes(s, out),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Array(parts) => {
            for part in parts {
                push_component_text(part, out);
            }
        }
        Value::Object(fields) => {
            // translation keys aren't text anyone sees, so they're skipped
            if let Some(text) = fields.get("text") {
                push_component_text(text, out);
            }
            if let Some(extra) = fields.get("extra") {
                push_component_text(extra, out);
            }
        }
        Value::Null => {}
    }
}

fn push_without_formatting_codes(s: &str, out: &mut String) {
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '§' {
            // the code itself
            chars.next();
            continue;
        }
        out.push(c);
    }
}
