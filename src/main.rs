use std::{path::PathBuf, sync::Arc, time::Instant};

use clap::Parser;
use dotenv::dotenv;
use futures_util::StreamExt;
use mcseek::{
    config::Config,
    database::{AuthLabel, Database, WhitelistLabel},
    exclude,
    notify::Webhook,
    processing::{ServerInfo, minecraft::noise::NoiseFilter},
    scanner::{ScanRequest, Scanner, prober::TcpProber},
    terminal_colors::*,
    tracing::init_tracing,
};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Find Minecraft servers by pinging the addresses after a seed.
#[derive(Debug, Parser)]
#[command(name = "mcseek", version)]
struct Cli {
    /// The first address to scan, like 10.0.0.0.
    seed: String,
    port_start: u16,
    port_end: u16,

    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Max probes in flight at once. Overrides scanner.concurrency.
    #[arg(long)]
    concurrency: Option<usize>,

    /// Per probe timeout. Overrides scanner.timeout_ms.
    #[arg(long = "timeout-ms")]
    timeout_ms: Option<u64>,

    /// Stop after this many addresses. Overrides scanner.max_addresses.
    #[arg(long = "max-addresses")]
    max_addresses: Option<u64>,
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    dotenv().ok();
    let cli = Cli::parse();

    let mut config = Config::load(&cli.config)?;
    if let Some(concurrency) = cli.concurrency {
        config.scanner.concurrency = concurrency;
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        config.scanner.timeout_ms = timeout_ms;
    }
    if cli.max_addresses.is_some() {
        config.scanner.max_addresses = cli.max_addresses;
    }

    init_tracing(&config);
    info!("Logging initialized");

    // a bad seed or port range fails here, before anything is sent
    let mut request = ScanRequest::new(&cli.seed, cli.port_start, cli.port_end)?
        .with_max_addresses(config.scanner.max_addresses);

    if let Some(exclude_file) = &config.scanner.exclude_file {
        println!("parsing exclude file");
        let exclude_ranges = exclude::parse_file(exclude_file)?;
        println!(
            "excluding {} ips ({} ranges)",
            exclude_ranges.count(),
            exclude_ranges.ranges().len()
        );
        request = request.with_exclude(Arc::new(exclude_ranges));
    }

    let prober = TcpProber::new(config.scanner.timeout())
        .with_protocol_version(config.scanner.protocol_version);
    let filter = NoiseFilter::new(
        config.filter.discard_phrases.iter().cloned(),
        config.filter.discard_versions.iter().cloned(),
    );
    let database = Arc::new(Database::new(&config.output.csv_path));

    let mut scanner = Scanner::new(prober)
        .with_filter(filter)
        .with_sink(database.clone())
        .with_concurrency(config.scanner.concurrency);
    let webhook = config
        .notify
        .webhook_url
        .as_ref()
        .map(|webhook_url| Arc::new(Webhook::new(webhook_url)));
    if let Some(webhook) = &webhook {
        scanner = scanner.with_notifier(webhook.clone());
    }

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                println!("{YELLOW}stopping, waiting for probes in flight...{RESET}");
                cancel.cancel();
            }
        }
    });

    match request.max_addresses {
        Some(max_addresses) => println!(
            "scanning {BOLD}{max_addresses}{RESET} addresses from {BOLD}{}{RESET} on ports {}-{}",
            request.seed,
            request.ports.start(),
            request.ports.end()
        ),
        None => println!(
            "scanning from {BOLD}{}{RESET} on ports {}-{} until stopped",
            request.seed,
            request.ports.start(),
            request.ports.end()
        ),
    }

    let started = Instant::now();
    let mut servers = scanner.scan_with_cancel(request, cancel);
    while let Some(server) = servers.next().await {
        print_server(&server);
    }

    let stats = servers.stats();
    println!(
        "ok finished after {BOLD}{:.1}{RESET} seconds ({GREEN}found {BOLD}{}{RESET}{GREEN}/{}{RESET}, {GRAY}{} discarded, {} unreachable{RESET})",
        started.elapsed().as_secs_f64(),
        stats.found,
        stats.probed,
        stats.discarded,
        stats.unreachable,
    );
    if stats.persist_failures > 0 {
        println!(
            "{RED}{BOLD}{}{RESET}{RED} servers couldn't be saved to {}{RESET}",
            stats.persist_failures,
            database.path().display()
        );
    }

    if let Some(webhook) = webhook {
        // the runtime shuts down when main returns, taking unsent posts with it
        webhook.flush().await;
    }

    Ok(())
}

fn print_server(server: &ServerInfo) {
    let auth = AuthLabel::from_open_auth(server.is_open_auth);
    let whitelist = WhitelistLabel::from_likely(server.whitelist_likely);
    let auth_color = match auth {
        AuthLabel::Cracked => YELLOW,
        AuthLabel::Premium => BLUE,
    };

    println!(
        "{GREEN}{BOLD}{}{RESET} {GRAY}{}{RESET} {BOLD}{}{RESET}/{} online, {auth_color}{auth}{RESET}, whitelist {whitelist}",
        server.target, server.version_name, server.players_online, server.max_players,
    );
    if !server.motd.trim().is_empty() {
        println!("  {}", server.motd);
    }
}
