//! Responses that complete a status ping but aren't really servers.
//!
//! Hosting providers and DDoS proxies answer for addresses that have nothing
//! behind them, with a placeholder MOTD or version name.

use crate::{processing::minecraft::ServerInfo, scanner::prober::ProbeOutcome};

pub const DEFAULT_DISCARD_PHRASES: &[&str] = &[
    "Server not found",
    "Server doesn't exist",
    "Connection refused",
    "Not reachable",
];
/// Version names are only checked if some are configured, for example
/// `["TCPShield.com", "COSMIC GUARD"]` for proxies that answer on behalf of
/// hosts that are down.
pub const DEFAULT_DISCARD_VERSIONS: &[&str] = &[];

#[derive(Debug, Clone)]
pub struct NoiseFilter {
    /// Pairs of (phrase as configured, lowercased phrase).
    phrases: Vec<(String, String)>,
    versions: Vec<(String, String)>,
}

impl Default for NoiseFilter {
    fn default() -> Self {
        Self::new(
            DEFAULT_DISCARD_PHRASES.iter().copied(),
            DEFAULT_DISCARD_VERSIONS.iter().copied(),
        )
    }
}

impl NoiseFilter {
    /// `phrases` are matched against the MOTD and `versions` against the
    /// version name, both as case-insensitive substrings.
    pub fn new<P, V>(phrases: P, versions: V) -> Self
    where
        P: IntoIterator,
        P::Item: Into<String>,
        V: IntoIterator,
        V::Item: Into<String>,
    {
        fn lowercased<I>(items: I) -> Vec<(String, String)>
        where
            I: IntoIterator,
            I::Item: Into<String>,
        {
            items
                .into_iter()
                .map(Into::<String>::into)
                .filter(|item| !item.is_empty())
                .map(|item| {
                    let lower = item.to_lowercase();
                    (item, lower)
                })
                .collect()
        }

        Self {
            phrases: lowercased(phrases),
            versions: lowercased(versions),
        }
    }

    /// The first configured phrase that makes this server noise, if any.
    ///
    /// The MOTD in a [`ServerInfo`] is already sanitized, so control characters
    /// wedged into a phrase don't stop it from matching.
    pub fn matching_phrase(&self, info: &ServerInfo) -> Option<&str> {
        let motd = info.motd.to_lowercase();
        if let Some((phrase, _)) = self.phrases.iter().find(|(_, lower)| motd.contains(lower)) {
            return Some(phrase.as_str());
        }

        let version_name = info.version_name.to_lowercase();
        self.versions
            .iter()
            .find(|(_, lower)| version_name.contains(lower))
            .map(|(version, _)| version.as_str())
    }

    /// Turn a success into a discard if it's noise. Everything else passes
    /// through untouched.
    pub fn apply(&self, outcome: ProbeOutcome) -> ProbeOutcome {
        match outcome {
            ProbeOutcome::Success(info) => match self.matching_phrase(&info) {
                Some(phrase) => ProbeOutcome::Discarded(phrase.to_string()),
                None => ProbeOutcome::Success(info),
            },
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::{Ipv4Addr, SocketAddrV4};

    use super::*;
    use crate::{processing::parse_status_json, scanner::prober::UnreachableReason};

    fn info(motd: &str, version_name: &str) -> ServerInfo {
        ServerInfo {
            target: SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 1), 25565),
            motd: motd.to_string(),
            players_online: 0,
            max_players: 20,
            favicon: None,
            version_name: version_name.to_string(),
            version_protocol: 47,
            is_open_auth: false,
            whitelist_likely: false,
        }
    }

    #[test]
    fn test_discards_phrase_in_any_case() {
        let filter = NoiseFilter::default();
        let outcome = filter.apply(ProbeOutcome::Success(info(
            "Error: CONNECTION REFUSED by upstream",
            "1.20.1",
        )));
        assert_eq!(
            outcome,
            ProbeOutcome::Discarded("Connection refused".to_string())
        );
    }

    #[test]
    fn test_discards_configured_versions() {
        let filter = NoiseFilter::new(
            DEFAULT_DISCARD_PHRASES.iter().copied(),
            ["TCPShield.com", "COSMIC GUARD"],
        );
        let outcome = filter.apply(ProbeOutcome::Success(info(
            "A Minecraft Server",
            "tcpshield.com",
        )));
        assert_eq!(outcome, ProbeOutcome::Discarded("TCPShield.com".to_string()));
    }

    #[test]
    fn test_default_only_looks_at_the_motd() {
        let json = r#"{
            "version": { "name": "TCPShield.com", "protocol": 47 },
            "players": { "max": 0, "online": 0 },
            "description": "Survival"
        }"#;
        let server = parse_status_json(SocketAddrV4::new(Ipv4Addr::new(1, 2, 3, 4), 25565), json)
            .unwrap();

        assert_eq!(
            NoiseFilter::default().apply(ProbeOutcome::Success(server.clone())),
            ProbeOutcome::Success(server)
        );
    }

    #[test]
    fn test_keeps_real_servers() {
        let filter = NoiseFilter::default();
        let server = info("A Minecraft Server", "Paper 1.20.4");
        assert_eq!(
            filter.apply(ProbeOutcome::Success(server.clone())),
            ProbeOutcome::Success(server)
        );
    }

    #[test]
    fn test_leaves_failures_alone() {
        let filter = NoiseFilter::default();
        assert_eq!(
            filter.apply(ProbeOutcome::Unreachable(UnreachableReason::Refused)),
            ProbeOutcome::Unreachable(UnreachableReason::Refused)
        );
    }

    #[test]
    fn test_control_characters_dont_hide_phrases() {
        let json = r#"{
            "version": { "name": "1.20.1", "protocol": 763 },
            "players": { "max": 0, "online": 0 },
            "description": "Server\u0007 not\n found"
        }"#;
        let server = parse_status_json(SocketAddrV4::new(Ipv4Addr::new(1, 2, 3, 4), 25565), json)
            .unwrap();

        let filter = NoiseFilter::default();
        assert_eq!(
            filter.apply(ProbeOutcome::Success(server)),
            ProbeOutcome::Discarded("Server not found".to_string())
        );
    }

    #[test]
    fn test_custom_phrases() {
        let filter = NoiseFilter::new(["Start the server at FalixNodes.net/start"], [""; 0]);
        assert_eq!(
            filter.matching_phrase(&info("start the server at falixnodes.net/start", "1.20")),
            Some("Start the server at FalixNodes.net/start")
        );
        assert_eq!(filter.matching_phrase(&info("Connection refused", "TCPShield.com")), None);
    }
}
