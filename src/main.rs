//! CLI driver (SPEC_FULL.md §4.7, §6). Wires argument parsing, interface
//! listing, hostname resolution, signal handling, and the per-protocol
//! scan loop around the scanning core in `lib.rs`.

use std::net::{IpAddr, SocketAddr};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use socket2::Protocol;
use tracing_subscriber::EnvFilter;

use synwatch::cli::Args;
use synwatch::engine::{ProbeContext, ShutdownFlag};
use synwatch::error::ScanError;
use synwatch::model::{Endpoint, PortSet, Protocol as ScanProtocol};
use synwatch::tcp::TcpStrategy;
use synwatch::udp::UdpStrategy;

/// Fixed for the lifetime of a run so response correlation stays stable
/// across every probe (SPEC_FULL.md §3 invariants).
const SOURCE_PORT: u16 = 57489;

fn init_logging() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive("synwatch=info".parse().unwrap()))
        .init();
}

fn list_interfaces() -> anyhow::Result<()> {
    for iface in if_addrs::get_if_addrs().context("enumerating interfaces")? {
        println!("{}\t{}", iface.name, iface.ip());
    }
    Ok(())
}

fn source_address(interface: &str, want_v6: bool) -> anyhow::Result<IpAddr> {
    if_addrs::get_if_addrs()
        .context("enumerating interfaces")?
        .into_iter()
        .find(|iface| iface.name == interface && iface.ip().is_ipv6() == want_v6)
        .map(|iface| iface.ip())
        .with_context(|| format!("no address of the requested family on interface {interface}"))
}

async fn resolve_host(target: &str) -> Result<IpAddr, ScanError> {
    let mut addrs = tokio::net::lookup_host((target, 0))
        .await
        .map_err(|source| ScanError::Resolution { host: target.to_string(), source })?;
    addrs
        .next()
        .map(|addr| addr.ip())
        .ok_or_else(|| ScanError::Resolution {
            host: target.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses"),
        })
}

async fn run_scan(
    protocol: ScanProtocol,
    interface: &str,
    source: Endpoint,
    destination: Endpoint,
    ports: &PortSet,
    wait: Duration,
    retransmissions: u32,
    rate_gap: Duration,
    shutdown: &ShutdownFlag,
) -> anyhow::Result<()> {
    if ports.is_empty() {
        return Ok(());
    }

    match protocol {
        ScanProtocol::Tcp => {
            let mut ctx = ProbeContext::new(
                interface,
                source,
                destination,
                Protocol::TCP,
                rate_gap,
                retransmissions,
                TcpStrategy::new(SOURCE_PORT),
            )?;
            for port in ports.iter() {
                if shutdown.is_set() {
                    break;
                }
                if let Some(verdict) = ctx.scan_port(port, wait, shutdown).await? {
                    println!("{port}/{protocol} {verdict}");
                }
            }
        }
        ScanProtocol::Udp => {
            let mut ctx = ProbeContext::new(
                interface,
                source,
                destination,
                Protocol::UDP,
                rate_gap,
                retransmissions,
                UdpStrategy::new(SOURCE_PORT),
            )?;
            for port in ports.iter() {
                if shutdown.is_set() {
                    break;
                }
                if let Some(verdict) = ctx.scan_port(port, wait, shutdown).await? {
                    println!("{port}/{protocol} {verdict}");
                }
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    init_logging();
    let args = Args::parse();

    let Some(interface) = args.interface.clone() else {
        list_interfaces()?;
        return Ok(ExitCode::SUCCESS);
    };

    let Some(target) = args.target.clone() else {
        eprintln!("ERR missing target host");
        return Ok(ExitCode::FAILURE);
    };

    let tcp_ports = match args.tcp_port_set() {
        Ok(set) => set,
        Err(e) => {
            eprintln!("ERR {e}");
            return Ok(ExitCode::FAILURE);
        }
    };
    let udp_ports = match args.udp_port_set() {
        Ok(set) => set,
        Err(e) => {
            eprintln!("ERR {e}");
            return Ok(ExitCode::FAILURE);
        }
    };

    let dest_ip = match resolve_host(&target).await {
        Ok(ip) => ip,
        Err(e) => {
            eprintln!("ERR {e}");
            return Ok(ExitCode::FAILURE);
        }
    };

    let source_ip = match source_address(&interface, dest_ip.is_ipv6()) {
        Ok(ip) => ip,
        Err(e) => {
            eprintln!("ERR {e}");
            return Ok(ExitCode::FAILURE);
        }
    };

    let shutdown = ShutdownFlag::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                shutdown.trigger();
            }
        });
    }

    println!("Interesting ports on {target} ({dest_ip}):");
    println!("PORT STATE");

    let source = Endpoint::new(source_ip, SOURCE_PORT);
    let destination = Endpoint::new(dest_ip, 0);
    let wait = Duration::from_millis(args.wait_ms);
    let rate_gap = Duration::from_millis(args.rate_limit_ms);

    if let Err(e) = run_scan(
        ScanProtocol::Tcp,
        &interface,
        source,
        destination,
        &tcp_ports,
        wait,
        args.retransmissions,
        rate_gap,
        &shutdown,
    )
    .await
    {
        eprintln!("ERR {e}");
        return Ok(ExitCode::FAILURE);
    }

    if let Err(e) = run_scan(
        ScanProtocol::Udp,
        &interface,
        source,
        destination,
        &udp_ports,
        wait,
        args.retransmissions,
        rate_gap,
        &shutdown,
    )
    .await
    {
        eprintln!("ERR {e}");
        return Ok(ExitCode::FAILURE);
    }

    Ok(ExitCode::SUCCESS)
}
