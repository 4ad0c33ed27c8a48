use std::{future::Future, io, net::SocketAddrV4, time::Duration};

use tokio::{net::TcpStream, time};

use super::protocols::{self, StatusError, minecraft::DEFAULT_PROTOCOL_VERSION};
use crate::processing::{ServerInfo, parse_status_json};

/// What happened when we pinged one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Success(ServerInfo),
    Unreachable(UnreachableReason),
    /// The server answered, but with a placeholder. Holds the phrase that
    /// matched.
    Discarded(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UnreachableReason {
    #[error("timed out")]
    Timeout,
    #[error("connection refused")]
    Refused,
    #[error("{message}")]
    Io {
        kind: io::ErrorKind,
        message: String,
    },
    #[error("invalid response: {0}")]
    Protocol(String),
}

impl From<io::Error> for UnreachableReason {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionRefused => Self::Refused,
            io::ErrorKind::TimedOut => Self::Timeout,
            kind => Self::Io {
                kind,
                message: err.to_string(),
            },
        }
    }
}

impl From<StatusError> for UnreachableReason {
    fn from(err: StatusError) -> Self {
        match err {
            StatusError::Io(err) => err.into(),
            StatusError::Parse(err) => Self::Protocol(err.to_string()),
        }
    }
}

/// Something that can ask a single address and port what it is.
///
/// Implementations never retry and never fail: every problem ends up as
/// [`ProbeOutcome::Unreachable`].
pub trait Prober: Send + Sync + 'static {
    fn probe(&self, target: SocketAddrV4) -> impl Future<Output = ProbeOutcome> + Send;
}

/// Pings servers over a fresh TCP connection each time.
#[derive(Debug, Clone)]
pub struct TcpProber {
    /// Covers connecting, sending the request and reading the whole response.
    pub timeout: Duration,
    pub protocol_version: i32,
}

impl TcpProber {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            protocol_version: DEFAULT_PROTOCOL_VERSION,
        }
    }

    pub fn with_protocol_version(mut self, protocol_version: i32) -> Self {
        self.protocol_version = protocol_version;
        self
    }

    async fn status(&self, target: SocketAddrV4) -> Result<String, StatusError> {
        let mut stream = TcpStream::connect(target).await?;
        stream.set_nodelay(true)?;

        protocols::minecraft::request_status(
            &mut stream,
            &target.ip().to_string(),
            target.port(),
            self.protocol_version,
        )
        .await
    }
}

impl Prober for TcpProber {
    async fn probe(&self, target: SocketAddrV4) -> ProbeOutcome {
        let status = match time::timeout(self.timeout, self.status(target)).await {
            Ok(Ok(status)) => status,
            Ok(Err(err)) => return ProbeOutcome::Unreachable(err.into()),
            Err(_) => return ProbeOutcome::Unreachable(UnreachableReason::Timeout),
        };

        match parse_status_json(target, &status) {
            Ok(info) => ProbeOutcome::Success(info),
            Err(err) => ProbeOutcome::Unreachable(UnreachableReason::Protocol(err.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
    };

    use super::*;
    use crate::scanner::protocols::minecraft::write_varint;

    fn status_packet(json: &str) -> Vec<u8> {
        let mut data = vec![0x00];
        write_varint(&mut data, json.len() as i32);
        data.extend_from_slice(json.as_bytes());

        let mut packet = Vec::new();
        write_varint(&mut packet, data.len() as i32);
        packet.extend(data);
        packet
    }

    /// Start a server on localhost that answers a single connection with
    /// `reply`, or never answers if `reply` is None.
    async fn fake_server(reply: Option<Vec<u8>>) -> SocketAddrV4 {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0; 1024];
            let _ = socket.read(&mut buf).await;
            match reply {
                Some(reply) => {
                    socket.write_all(&reply).await.unwrap();
                    // wait for the client to hang up
                    let _ = socket.read(&mut buf).await;
                }
                None => tokio::time::sleep(Duration::from_secs(30)).await,
            }
        });

        SocketAddrV4::new(Ipv4Addr::LOCALHOST, port)
    }

    fn prober() -> TcpProber {
        TcpProber::new(Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_probe_success() {
        let json = r#"{
            "version": { "name": "OFFLINE", "protocol": 47 },
            "players": { "max": 100, "online": 7, "sample": [] },
            "description": { "text": "My\nServer" },
            "favicon": "data:image/png;base64,AAAA"
        }"#;
        let target = fake_server(Some(status_packet(json))).await;

        let outcome = prober().probe(target).await;
        let info = match outcome {
            ProbeOutcome::Success(info) => info,
            other => panic!("expected success, got {other:?}"),
        };
        assert_eq!(info.target, target);
        assert_eq!(info.motd, "MyServer");
        assert_eq!(info.players_online, 7);
        assert_eq!(info.max_players, 100);
        assert_eq!(info.favicon.as_deref(), Some("data:image/png;base64,AAAA"));
        assert!(info.is_open_auth);
        assert!(info.whitelist_likely);
    }

    #[tokio::test]
    async fn test_probe_refused() {
        // bind and immediately drop so nothing is listening on the port
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let outcome = prober()
            .probe(SocketAddrV4::new(Ipv4Addr::LOCALHOST, port))
            .await;
        assert_eq!(outcome, ProbeOutcome::Unreachable(UnreachableReason::Refused));
    }

    #[tokio::test]
    async fn test_probe_timeout() {
        let target = fake_server(None).await;

        let outcome = TcpProber::new(Duration::from_millis(200))
            .probe(target)
            .await;
        assert_eq!(outcome, ProbeOutcome::Unreachable(UnreachableReason::Timeout));
    }

    #[tokio::test]
    async fn test_probe_garbage() {
        let target = fake_server(Some(b"HTTP/1.1 400 Bad Request\r\n\r\n".to_vec())).await;

        let outcome = prober().probe(target).await;
        assert!(
            matches!(
                outcome,
                ProbeOutcome::Unreachable(UnreachableReason::Protocol(_))
            ),
            "{outcome:?}"
        );
    }

    #[tokio::test]
    async fn test_probe_json_that_isnt_a_status() {
        let target = fake_server(Some(status_packet(r#"{"hello":"world"}"#))).await;

        let outcome = prober().probe(target).await;
        assert!(
            matches!(
                outcome,
                ProbeOutcome::Unreachable(UnreachableReason::Protocol(_))
            ),
            "{outcome:?}"
        );
    }

    #[test]
    fn test_io_error_classification() {
        assert_eq!(
            UnreachableReason::from(io::Error::from(io::ErrorKind::ConnectionRefused)),
            UnreachableReason::Refused
        );
        assert_eq!(
            UnreachableReason::from(io::Error::from(io::ErrorKind::TimedOut)),
            UnreachableReason::Timeout
        );
        assert!(matches!(
            UnreachableReason::from(io::Error::from(io::ErrorKind::ConnectionReset)),
            UnreachableReason::Io {
                kind: io::ErrorKind::ConnectionReset,
                ..
            }
        ));
    }
}
