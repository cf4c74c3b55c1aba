//! Entry point: parses CLI args, wires up logging, then dispatches to
//! either the device simulator or the pipelining client.

use anyhow::Result;
use clap::Parser;
use enip_cip::cli::{Args, Command, OutputFormat};
use enip_cip::client::{poller::PollerConfig, proxy::Proxy};
use enip_cip::config::DeviceConfig;
use enip_cip::server::Server;
use tracing::{error, info};
use tracing_subscriber::{filter::LevelFilter, prelude::*, Layer};

mod logging;
use logging::ColorizedFormatter;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = match args.verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };

    let guard;
    let detailed_log_layer;

    if let Some("stderr") = args.log_file.as_deref() {
        detailed_log_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_filter(log_level)
            .boxed();
        guard = None;
    } else {
        let file_appender = match args.log_file.as_deref() {
            Some(path_str) => {
                let log_path = std::path::Path::new(path_str);
                let log_dir = log_path.parent().unwrap_or_else(|| std::path::Path::new("."));
                let log_filename = log_path.file_name().unwrap_or_else(|| std::ffi::OsStr::new("enip-cip.log"));
                tracing_appender::rolling::daily(log_dir, log_filename)
            }
            None => tracing_appender::rolling::daily(".", "enip-cip.log"),
        };
        let (non_blocking_writer, file_guard) = tracing_appender::non_blocking(file_appender);
        detailed_log_layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking_writer)
            .with_ansi(false)
            .with_filter(log_level)
            .boxed();
        guard = Some(file_guard);
    }

    let stdout_log = if !args.quiet {
        Some(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .event_format(ColorizedFormatter)
                .with_filter(log_level),
        )
    } else {
        None
    };

    tracing_subscriber::registry().with(detailed_log_layer).with(stdout_log).init();
    let _log_guard = guard;

    match args.command {
        Command::Serve { config, listen, udp_listen } => run_serve(config, listen, udp_listen).await,
        Command::Poll { target, operations, depth, multiple_budget, cycle_ms, format } => {
            run_poll(target, operations, depth, multiple_budget, cycle_ms, format).await
        }
    }
}

async fn run_serve(config_path: std::path::PathBuf, listen: String, udp_listen: Option<String>) -> Result<()> {
    let config = DeviceConfig::load(&config_path)?;
    info!(?config_path, "loaded device configuration");

    let server = std::sync::Arc::new(Server::new(config));
    let listen_addr: std::net::SocketAddr = listen.parse()?;

    if let Some(udp_addr) = udp_listen {
        let udp_addr: std::net::SocketAddr = udp_addr.parse()?;
        let udp_server = server.clone();
        let udp_task = tokio::spawn(async move {
            if let Err(error) = udp_server.serve_udp(udp_addr).await {
                error!(%error, "UDP listener exited");
            }
        });
        server.serve_tcp(listen_addr).await?;
        udp_task.abort();
    } else {
        server.serve_tcp(listen_addr).await?;
    }

    Ok(())
}

async fn run_poll(
    target: String,
    operations: Vec<String>,
    depth: usize,
    multiple_budget: usize,
    cycle_ms: Option<u64>,
    format: OutputFormat,
) -> Result<()> {
    let mut proxy = Proxy::connect(&target).await?;
    info!(%target, "connected");

    match cycle_ms {
        None => {
            let outcomes = proxy.operate(&operations, depth, multiple_budget).await;
            print_outcomes(&outcomes, format);
        }
        Some(ms) => {
            let poller_config = PollerConfig {
                parameters: operations.clone(),
                cycle: std::time::Duration::from_millis(ms),
                max_backoff: std::time::Duration::from_secs(30),
                depth,
                multiple_budget,
            };
            enip_cip::client::poller::run(
                &mut proxy,
                &poller_config,
                |outcomes| print_outcomes(outcomes, format),
                |error, failures| error!(%error, failures, "poll cycle failed"),
                || false,
            )
            .await;
        }
    }

    Ok(())
}

fn print_outcomes(outcomes: &[enip_cip::client::pipeline::Outcome], format: OutputFormat) {
    match format {
        OutputFormat::Text => {
            for outcome in outcomes {
                match &outcome.result {
                    Ok(values) => println!("[{}] ok: {:?}", outcome.index, values),
                    Err(error) => println!("[{}] error: {error}", outcome.index),
                }
            }
        }
        OutputFormat::Json => {
            let rows: Vec<serde_json::Value> = outcomes
                .iter()
                .map(|outcome| {
                    serde_json::json!({
                        "index": outcome.index,
                        "ok": outcome.result.is_ok(),
                        "error": outcome.result.as_ref().err().map(|e| e.to_string()),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&rows).unwrap_or_default());
        }
    }
}
