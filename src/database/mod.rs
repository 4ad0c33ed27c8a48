//! The append-only record of every server we've found.

use std::{
    fmt,
    fs::{File, OpenOptions},
    io::{self, Write},
    net::Ipv4Addr,
    path::{Path, PathBuf},
};

use parking_lot::Mutex;

use crate::processing::ServerInfo;

pub const DEFAULT_PATH: &str = "scannedServers.csv";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthLabel {
    Cracked,
    Premium,
}

impl AuthLabel {
    pub fn from_open_auth(is_open_auth: bool) -> Self {
        if is_open_auth {
            Self::Cracked
        } else {
            Self::Premium
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cracked => "Cracked",
            Self::Premium => "Premium",
        }
    }
}

impl fmt::Display for AuthLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhitelistLabel {
    Enabled,
    Disabled,
}

impl WhitelistLabel {
    pub fn from_likely(whitelist_likely: bool) -> Self {
        if whitelist_likely {
            Self::Enabled
        } else {
            Self::Disabled
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Enabled => "Enabled",
            Self::Disabled => "Disabled",
        }
    }
}

impl fmt::Display for WhitelistLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRecord {
    pub addr: Ipv4Addr,
    pub port: u16,
    pub auth: AuthLabel,
}

impl ScanRecord {
    pub fn from_info(info: &ServerInfo) -> Self {
        Self {
            addr: info.addr(),
            port: info.port(),
            auth: AuthLabel::from_open_auth(info.is_open_auth),
        }
    }

    /// One CSV line, including the newline. None of the fields can contain a
    /// comma or a quote so there's nothing to escape.
    pub fn to_line(&self) -> String {
        format!("{},{},{}\n", self.addr, self.port, self.auth)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("permission denied writing to {}, close the file or fix its permissions", .path.display())]
    PermissionDenied { path: PathBuf },
    #[error("failed to write to {}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },
}

impl PersistError {
    fn new(path: &Path, source: io::Error) -> Self {
        let path = path.to_path_buf();
        if source.kind() == io::ErrorKind::PermissionDenied {
            Self::PermissionDenied { path }
        } else {
            Self::Io { path, source }
        }
    }
}

/// Somewhere to keep found servers. Only ever appended to.
///
/// Implementations have to be safe to call from several scans at once
/// without records getting mixed together. A scan calls `append` from tokio's
/// blocking pool, so blocking IO is fine here.
pub trait RecordSink: Send + Sync {
    fn append(&self, record: &ScanRecord) -> Result<(), PersistError>;
}

/// A CSV file with one `address,port,label` line per server.
#[derive(Debug)]
pub struct Database {
    path: PathBuf,
    /// Opened on the first write, and again after a failed one.
    file: Mutex<Option<File>>,
}

impl Database {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> io::Result<File> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
    }

    fn write_line(&self, file: &mut Option<File>, line: &str) -> io::Result<()> {
        let f = match file.take() {
            Some(f) => f,
            None => self.open()?,
        };
        let f = file.insert(f);
        f.write_all(line.as_bytes())?;
        f.flush()
    }
}

impl Default for Database {
    fn default() -> Self {
        Self::new(DEFAULT_PATH)
    }
}

impl RecordSink for Database {
    fn append(&self, record: &ScanRecord) -> Result<(), PersistError> {
        let line = record.to_line();

        // the lock is what keeps lines from interleaving
        let mut file = self.file.lock();
        self.write_line(&mut file, &line).map_err(|err| {
            // the file might have been moved or had its permissions changed,
            // try again from scratch next time
            *file = None;
            PersistError::new(&self.path, err)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::{
        fs,
        net::SocketAddrV4,
        sync::Arc,
        thread,
        time::{SystemTime, UNIX_EPOCH},
    };

    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("mcseek-{name}-{}-{nanos}.csv", std::process::id()))
    }

    fn record(last_octet: u8, auth: AuthLabel) -> ScanRecord {
        ScanRecord {
            addr: Ipv4Addr::new(10, 0, 0, last_octet),
            port: 25565,
            auth,
        }
    }

    #[test]
    fn test_labels() {
        assert_eq!(AuthLabel::from_open_auth(true).to_string(), "Cracked");
        assert_eq!(AuthLabel::from_open_auth(false).to_string(), "Premium");
        assert_eq!(WhitelistLabel::from_likely(true).to_string(), "Enabled");
        assert_eq!(WhitelistLabel::from_likely(false).to_string(), "Disabled");
    }

    #[test]
    fn test_record_from_info() {
        let info = ServerInfo {
            target: SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 9), 25565),
            motd: String::new(),
            players_online: 0,
            max_players: 0,
            favicon: None,
            version_name: "offline".to_string(),
            version_protocol: 47,
            is_open_auth: true,
            whitelist_likely: false,
        };
        assert_eq!(ScanRecord::from_info(&info).to_line(), "10.0.0.9,25565,Cracked\n");
    }

    #[test]
    fn test_appends_lines() {
        let path = temp_path("append");
        let db = Database::new(&path);
        db.append(&record(1, AuthLabel::Premium)).unwrap();
        db.append(&record(2, AuthLabel::Cracked)).unwrap();

        // a second handle appends to the same file instead of truncating it
        Database::new(&path)
            .append(&record(3, AuthLabel::Premium))
            .unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        fs::remove_file(&path).unwrap();
        assert_eq!(
            contents,
            "10.0.0.1,25565,Premium\n10.0.0.2,25565,Cracked\n10.0.0.3,25565,Premium\n"
        );
    }

    #[test]
    fn test_concurrent_appends_dont_interleave() {
        let path = temp_path("concurrent");
        let db = Arc::new(Database::new(&path));

        let handles = (0..8)
            .map(|i| {
                let db = db.clone();
                thread::spawn(move || {
                    for _ in 0..50 {
                        db.append(&record(i, AuthLabel::Premium)).unwrap();
                    }
                })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            handle.join().unwrap();
        }

        let contents = fs::read_to_string(&path).unwrap();
        fs::remove_file(&path).unwrap();
        let lines = contents.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 400);
        for line in lines {
            assert!(
                line.starts_with("10.0.0.") && line.ends_with(",25565,Premium"),
                "{line:?}"
            );
        }
    }

    #[test]
    fn test_write_failure_is_reported() {
        // a directory can't be opened as a file
        let db = Database::new(std::env::temp_dir());
        assert!(db.append(&record(1, AuthLabel::Premium)).is_err());
    }
}
