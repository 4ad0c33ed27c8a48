use std::{fs, io, path::Path, time::Duration};

use eyre::WrapErr;
use serde::Deserialize;

use crate::{
    database,
    processing::minecraft::noise::{DEFAULT_DISCARD_PHRASES, DEFAULT_DISCARD_VERSIONS},
    scanner::protocols::minecraft::DEFAULT_PROTOCOL_VERSION,
};

#[derive(Deserialize, Clone, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// A directory to write daily log files to, at debug level. Nothing is
    /// written to disk if this isn't set.
    #[serde(default)]
    pub logging_dir: Option<String>,

    #[serde(default)]
    pub scanner: ScannerConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub filter: FilterConfig,

    /// Post to a Discord webhook when a scan starts, finds a server, and
    /// finishes.
    #[serde(default)]
    pub notify: NotifyConfig,
}

impl Config {
    /// Read a config file. A missing file is the same as an empty one.
    pub fn load(path: impl AsRef<Path>) -> eyre::Result<Self> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(contents) => Self::parse(&contents)
                .wrap_err_with(|| format!("invalid config at {}", path.display())),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(err).wrap_err_with(|| format!("couldn't read {}", path.display())),
        }
    }

    pub fn parse(contents: &str) -> eyre::Result<Self> {
        Ok(toml::from_str(contents)?)
    }
}

#[derive(Deserialize, Clone, Debug)]
#[serde(deny_unknown_fields, default)]
pub struct ScannerConfig {
    /// How many probes can be in flight at once. 1 scans strictly in order.
    pub concurrency: usize,
    /// Per probe, covering the connection and the whole response.
    pub timeout_ms: u64,
    /// The protocol version we claim to speak in the handshake.
    pub protocol_version: i32,
    /// How many addresses to scan before stopping. Scans until Ctrl-C if not
    /// set.
    pub max_addresses: Option<u64>,
    /// A file of addresses, CIDR blocks and ranges that are never scanned.
    pub exclude_file: Option<String>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            timeout_ms: 3000,
            protocol_version: DEFAULT_PROTOCOL_VERSION,
            max_addresses: None,
            exclude_file: None,
        }
    }
}

impl ScannerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Deserialize, Clone, Debug)]
#[serde(deny_unknown_fields, default)]
pub struct OutputConfig {
    pub csv_path: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            csv_path: database::DEFAULT_PATH.to_string(),
        }
    }
}

#[derive(Deserialize, Clone, Debug)]
#[serde(deny_unknown_fields, default)]
pub struct FilterConfig {
    /// Servers whose MOTD contains one of these (ignoring case) are
    /// placeholders, not real servers.
    pub discard_phrases: Vec<String>,
    /// Same, but for the version name. Empty unless configured.
    pub discard_versions: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            discard_phrases: DEFAULT_DISCARD_PHRASES.iter().map(|s| s.to_string()).collect(),
            discard_versions: DEFAULT_DISCARD_VERSIONS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Deserialize, Default, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct NotifyConfig {
    #[serde(default)]
    pub webhook_url: Option<String>,
}
