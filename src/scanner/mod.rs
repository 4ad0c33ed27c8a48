pub mod prober;
pub mod protocols;
pub mod targets;

use std::{
    fmt,
    net::{Ipv4Addr, SocketAddrV4},
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    task::{Context, Poll},
};

use futures_util::{
    Stream, StreamExt,
    future,
    stream::{self, BoxStream},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    database::{RecordSink, ScanRecord},
    notify::{Notifier, ScanEvent},
    processing::{ServerInfo, minecraft::noise::NoiseFilter},
};

use self::{
    prober::{ProbeOutcome, Prober},
    targets::{Candidates, Ipv4Ranges, PortRange, parse_seed},
};

/// A scan that can't be started. Nothing has been probed when one of these
/// is returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidRequest {
    #[error("invalid seed address {0:?}, expected four numbers from 0 to 255 separated by dots")]
    Seed(String),
    #[error("invalid port range, start {start} is after end {end}")]
    PortRange { start: u16, end: u16 },
}

#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub seed: Ipv4Addr,
    pub ports: PortRange,
    /// How many addresses to take from the sequence, excluded ones included.
    /// None scans until cancelled.
    pub max_addresses: Option<u64>,
    pub exclude: Arc<Ipv4Ranges>,
}

impl ScanRequest {
    pub fn new(seed: &str, port_start: u16, port_end: u16) -> Result<Self, InvalidRequest> {
        Ok(Self {
            seed: parse_seed(seed)?,
            ports: PortRange::new(port_start, port_end)?,
            max_addresses: None,
            exclude: Arc::new(Ipv4Ranges::default()),
        })
    }

    pub fn with_max_addresses(mut self, max_addresses: Option<u64>) -> Self {
        self.max_addresses = max_addresses;
        self
    }

    pub fn with_exclude(mut self, exclude: Arc<Ipv4Ranges>) -> Self {
        self.exclude = exclude;
        self
    }

    pub fn candidates(&self) -> Candidates {
        Candidates::new(
            self.seed,
            self.ports,
            self.max_addresses,
            self.exclude.clone(),
        )
    }
}

/// Counters for a single scan.
#[derive(Debug, Default)]
pub struct ScanStats {
    probed: AtomicU64,
    found: AtomicU64,
    discarded: AtomicU64,
    unreachable: AtomicU64,
    persist_failures: AtomicU64,
}

impl ScanStats {
    pub fn snapshot(&self) -> ScanStatsSnapshot {
        ScanStatsSnapshot {
            probed: self.probed.load(Ordering::Relaxed),
            found: self.found.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            unreachable: self.unreachable.load(Ordering::Relaxed),
            persist_failures: self.persist_failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStatsSnapshot {
    pub probed: u64,
    pub found: u64,
    pub discarded: u64,
    pub unreachable: u64,
    pub persist_failures: u64,
}

impl fmt::Display for ScanStatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "probed {}, found {}, discarded {}, unreachable {}",
            self.probed, self.found, self.discarded, self.unreachable
        )?;
        if self.persist_failures > 0 {
            write!(f, ", failed to save {}", self.persist_failures)?;
        }
        Ok(())
    }
}

pub struct Scanner<P: Prober> {
    prober: Arc<P>,
    filter: Arc<NoiseFilter>,
    sink: Option<Arc<dyn RecordSink>>,
    notifier: Option<Arc<dyn Notifier>>,
    /// Maximum number of probes in flight. 1 keeps results in candidate
    /// order.
    concurrency: usize,
}

impl<P: Prober> Scanner<P> {
    pub fn new(prober: P) -> Self {
        Self {
            prober: Arc::new(prober),
            filter: Arc::new(NoiseFilter::default()),
            sink: None,
            notifier: None,
            concurrency: 1,
        }
    }

    pub fn with_filter(mut self, filter: NoiseFilter) -> Self {
        self.filter = Arc::new(filter);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn RecordSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Validate and start a scan in one go.
    pub fn scan_from(
        &self,
        seed: &str,
        port_start: u16,
        port_end: u16,
    ) -> Result<ScanStream, InvalidRequest> {
        Ok(self.scan(ScanRequest::new(seed, port_start, port_end)?))
    }

    pub fn scan(&self, request: ScanRequest) -> ScanStream {
        self.scan_with_cancel(request, CancellationToken::new())
    }

    /// Nothing happens until the returned stream is polled. Cancelling the
    /// token stops new probes from starting, and the ones already running
    /// still finish (or time out) and get reported.
    pub fn scan_with_cancel(&self, request: ScanRequest, cancel: CancellationToken) -> ScanStream {
        let run = Arc::new(ScanRun {
            filter: self.filter.clone(),
            sink: self.sink.clone(),
            notifier: self.notifier.clone(),
            stats: ScanStats::default(),
        });

        let prober = self.prober.clone();
        let probes = stream::iter(request.candidates())
            .take_until(cancel.cancelled_owned())
            .map(move |target| {
                let prober = prober.clone();
                async move { (target, prober.probe(target).await) }
            })
            .buffer_unordered(self.concurrency);

        // one result at a time, so sink writes happen in order and never overlap
        let processor = run.clone();
        let results = probes
            .then(move |(target, outcome)| {
                let processor = processor.clone();
                async move { processor.process(target, outcome).await }
            })
            .filter_map(future::ready);

        ScanStream {
            inner: results.boxed(),
            run,
            request: Some(request),
            finished: false,
        }
    }
}

/// State that belongs to one scan and nothing else.
struct ScanRun {
    filter: Arc<NoiseFilter>,
    sink: Option<Arc<dyn RecordSink>>,
    notifier: Option<Arc<dyn Notifier>>,
    stats: ScanStats,
}

impl ScanRun {
    fn started(&self, request: &ScanRequest) {
        info!(
            "scanning from {} on ports {}-{}",
            request.seed,
            request.ports.start(),
            request.ports.end()
        );
        if let Some(notifier) = &self.notifier {
            notifier.notify(ScanEvent::Started {
                seed: request.seed,
                port_start: request.ports.start(),
                port_end: request.ports.end(),
            });
        }
    }

    async fn process(&self, target: SocketAddrV4, outcome: ProbeOutcome) -> Option<ServerInfo> {
        self.stats.probed.fetch_add(1, Ordering::Relaxed);

        let info = match self.filter.apply(outcome) {
            ProbeOutcome::Success(info) => info,
            ProbeOutcome::Unreachable(reason) => {
                self.stats.unreachable.fetch_add(1, Ordering::Relaxed);
                debug!("{target} unreachable: {reason}");
                return None;
            }
            ProbeOutcome::Discarded(phrase) => {
                self.stats.discarded.fetch_add(1, Ordering::Relaxed);
                info!("ignoring {target}, matched {phrase:?}");
                return None;
            }
        };

        self.stats.found.fetch_add(1, Ordering::Relaxed);
        info!(
            "found {} ({}/{} online, {})",
            info.target, info.players_online, info.max_players, info.version_name
        );

        if let Some(sink) = &self.sink {
            self.persist(sink.clone(), &info).await;
        }
        if let Some(notifier) = &self.notifier {
            notifier.notify(ScanEvent::found(info.clone()));
        }

        Some(info)
    }

    /// Sinks write to disk, which blocks, so it happens on tokio's blocking
    /// pool instead of the thread polling the scan.
    async fn persist(&self, sink: Arc<dyn RecordSink>, info: &ServerInfo) {
        let record = ScanRecord::from_info(info);
        let err = match tokio::task::spawn_blocking(move || sink.append(&record)).await {
            Ok(Ok(())) => return,
            Ok(Err(err)) => err.to_string(),
            Err(err) => err.to_string(),
        };
        self.stats.persist_failures.fetch_add(1, Ordering::Relaxed);
        warn!("couldn't save {}: {err}", info.target);
    }

    fn finished(&self) {
        let stats = self.stats.snapshot();
        info!("scan finished: {stats}");
        if let Some(notifier) = &self.notifier {
            notifier.notify(ScanEvent::Finished { stats });
        }
    }
}

/// The servers found by a scan, as they're found.
pub struct ScanStream {
    inner: BoxStream<'static, ServerInfo>,
    run: Arc<ScanRun>,
    /// Taken on the first poll.
    request: Option<ScanRequest>,
    finished: bool,
}

impl ScanStream {
    pub fn stats(&self) -> ScanStatsSnapshot {
        self.run.stats.snapshot()
    }
}

impl Stream for ScanStream {
    type Item = ServerInfo;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<ServerInfo>> {
        let this = &mut *self;
        if this.finished {
            return Poll::Ready(None);
        }
        if let Some(request) = this.request.take() {
            this.run.started(&request);
        }

        match this.inner.poll_next_unpin(cx) {
            Poll::Ready(None) => {
                this.finished = true;
                this.run.finished();
                Poll::Ready(None)
            }
            other => other,
        }
    }
}
