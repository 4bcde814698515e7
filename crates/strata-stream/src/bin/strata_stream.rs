//! # Strata Stream Demo
//!
//! Minimal endpoints for the reliable byte-stream transport.
//!
//! ## Usage
//!
//! ```bash
//! # Accept connections and print every byte received to stdout
//! strata-stream serve --bind 0.0.0.0:7000
//!
//! # Send stdin line by line until END or EOF, then close gracefully
//! strata-stream connect --remote 127.0.0.1:7000
//!
//! # Either side can load tunables from TOML
//! strata-stream serve --bind 0.0.0.0:7000 --config stream.toml
//! ```

use std::io::{self, BufRead, Write};
use std::net::SocketAddr;
use std::path::PathBuf;

use strata_stream::{StreamClient, StreamConfig, StreamReader, StreamServer, StreamWriter};

fn main() -> anyhow::Result<()> {
    // ── Logging ─────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(true)
        .with_writer(io::stderr)
        .compact()
        .init();

    // ── Parse CLI ───────────────────────────────────────────────
    let args = parse_args()?;
    let config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .map_err(|e| anyhow::anyhow!("failed to read {}: {}", path.display(), e))?;
            StreamConfig::from_toml_str(&text)?
        }
        None => StreamConfig::default(),
    };

    match args.mode {
        Mode::Serve { bind } => serve(bind, config),
        Mode::Connect { bind, remote } => connect(bind, remote, config),
    }
}

// ─── Modes ──────────────────────────────────────────────────────────────────

fn serve(bind: SocketAddr, config: StreamConfig) -> anyhow::Result<()> {
    let server = StreamServer::bind(bind, config)?;
    server.listen()?;
    tracing::info!(local = %server.local_addr(), "strata-stream serving");

    loop {
        let conn = server.accept()?;
        let peer = conn.peer_addr();
        std::thread::Builder::new()
            .name(format!("strata-conn-{peer}"))
            .spawn(move || {
                let mut reader = StreamReader::new(&conn);
                let copied = io::copy(&mut reader, &mut io::stdout().lock());
                match copied {
                    Ok(bytes) => tracing::info!(%peer, bytes, stats = ?conn.stats(), "stream finished"),
                    Err(e) => tracing::warn!(%peer, error = %e, "stream failed"),
                }
                if let Err(e) = conn.close() {
                    tracing::warn!(%peer, error = %e, "close failed");
                }
            })?;
    }
}

fn connect(bind: SocketAddr, remote: SocketAddr, config: StreamConfig) -> anyhow::Result<()> {
    let client = StreamClient::bind(bind, config)?;
    client.connect(remote)?;
    tracing::info!(local = %client.local_addr(), %remote, "strata-stream connected");

    let mut writer = StreamWriter::new(&client);
    let mut total_bytes: u64 = 0;
    for line in io::stdin().lock().lines() {
        let line = line?;
        if line == "END" {
            break;
        }
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        total_bytes += line.len() as u64 + 1;
    }

    let initiated = client.close()?;
    tracing::info!(total_bytes, initiated, stats = ?client.stats(), "strata-stream closed");
    Ok(())
}

// ─── CLI Parsing ────────────────────────────────────────────────────────────

enum Mode {
    Serve { bind: SocketAddr },
    Connect { bind: SocketAddr, remote: SocketAddr },
}

struct Args {
    mode: Mode,
    config: Option<PathBuf>,
}

fn parse_addr(flag: &str, value: Option<&String>) -> anyhow::Result<SocketAddr> {
    let val = value.ok_or_else(|| anyhow::anyhow!("{flag} requires a value"))?;
    val.parse()
        .map_err(|e| anyhow::anyhow!("invalid address '{}': {}", val, e))
}

fn parse_args() -> anyhow::Result<Args> {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(String::as_str);
    if matches!(command, None | Some("--help") | Some("-h")) {
        print_help();
        std::process::exit(0);
    }

    let mut bind = None;
    let mut remote = None;
    let mut config = None;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--bind" | "-b" => {
                i += 1;
                bind = Some(parse_addr("--bind", args.get(i))?);
            }
            "--remote" | "-r" => {
                i += 1;
                remote = Some(parse_addr("--remote", args.get(i))?);
            }
            "--config" | "-c" => {
                i += 1;
                config = Some(PathBuf::from(
                    args.get(i)
                        .ok_or_else(|| anyhow::anyhow!("--config requires a value"))?,
                ));
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            other => {
                anyhow::bail!("unknown argument: {other}\nRun with --help for usage.");
            }
        }
        i += 1;
    }

    let mode = match command {
        Some("serve") => Mode::Serve {
            bind: bind.ok_or_else(|| anyhow::anyhow!("serve requires --bind"))?,
        },
        Some("connect") => Mode::Connect {
            bind: bind.unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 0))),
            remote: remote.ok_or_else(|| anyhow::anyhow!("connect requires --remote"))?,
        },
        other => anyhow::bail!(
            "unknown command: {}\nRun with --help for usage.",
            other.unwrap_or_default()
        ),
    };

    Ok(Args { mode, config })
}

fn print_help() {
    eprintln!(
        r#"strata-stream — Reliable byte stream over UDP

USAGE:
  strata-stream serve --bind <ADDR> [OPTIONS]
  strata-stream connect --remote <ADDR> [OPTIONS]

OPTIONS:
  --bind, -b <addr>       Local UDP address (serve: required, connect: default 0.0.0.0:0)
  --remote, -r <addr>     Server address to connect to
  --config, -c <file>     TOML file with stream tunables
  --help, -h              Show this help

ENVIRONMENT:
  RUST_LOG                Log filter (default: info)"#
    );
}
