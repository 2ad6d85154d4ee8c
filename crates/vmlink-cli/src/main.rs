mod args;
mod output;

use crate::args::{Action, Args};
use crate::output::{Printer, is_failure};
use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use vmlink_controller::{ControllerConfig, LinkEvent, LinkHandle, LinkService};
use vmlink_hardware::{SerialSettings, SerialTransport, available_ports};
use vmlink_protocol::Operation;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let action = args.command.action()?;
    if action == Action::ListPorts {
        for port in available_ports().context("Failed to enumerate serial ports")? {
            println!("{port}");
        }
        return Ok(());
    }

    let config = match &args.config {
        Some(path) => ControllerConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => ControllerConfig::default(),
    };

    let settings = SerialSettings {
        path: args.port.clone(),
        baud_rate: args.baud,
        ..SerialSettings::default()
    };
    let transport = SerialTransport::open(&settings)
        .with_context(|| format!("Failed to open serial port {}", settings.path))?;
    info!(port = %settings.path, baud = settings.baud_rate, "Serial port opened");

    let mut link = LinkService::spawn(transport, config)?;
    let printer = Printer::new(args.json);

    let result = match action {
        Action::ListPorts => Ok(()),
        Action::Issue(op) => run_operation(&mut link, printer, op, args.max_wait()).await,
        Action::CompressorBlocking(on) => {
            run_compressor_blocking(&mut link, printer, on).await
        }
        Action::Monitor(interval) => monitor(&mut link, printer, interval).await,
    };

    link.shutdown().await?;
    result
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Issue one operation and print its events until it settles.
async fn run_operation(
    link: &mut LinkHandle<SerialTransport>,
    printer: Printer,
    op: Operation,
    max_wait: Duration,
) -> Result<()> {
    link.issue(op)
        .await
        .with_context(|| format!("Board did not accept {op}"))?;
    debug!(op = %op, "Operation accepted");

    let event = tokio::time::timeout(max_wait, wait_final(link, printer))
        .await
        .map_err(|_| anyhow!("No outcome for {op} within {}s", max_wait.as_secs()))??;

    if is_failure(&event) {
        bail!("{op} failed, board left in {}", event.resulting_state());
    }
    Ok(())
}

async fn run_compressor_blocking(
    link: &mut LinkHandle<SerialTransport>,
    printer: Printer,
    on: bool,
) -> Result<()> {
    let ack = link
        .set_compressor_blocking(on)
        .await
        .context("Blocking compressor exchange failed")?;

    while let Some(event) = link.try_recv() {
        printer.print(&event);
    }
    if !ack {
        bail!("Compressor did not acknowledge");
    }
    Ok(())
}

/// Print events until one leaves the waiting states.
async fn wait_final(link: &mut LinkHandle<SerialTransport>, printer: Printer) -> Result<LinkEvent> {
    while let Some(event) = link.recv().await {
        printer.print(&event);
        if event.is_final() {
            return Ok(event);
        }
    }
    Err(anyhow!("Link stopped before the operation finished"))
}

/// Read the temperature panel every `interval` until Ctrl-C.
async fn monitor(
    link: &mut LinkHandle<SerialTransport>,
    printer: Printer,
    interval: Duration,
) -> Result<()> {
    let mut ticker = tokio::time::interval(interval);
    info!(interval_s = interval.as_secs(), "Monitoring, press Ctrl-C to stop");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = link.get_temperature_status().await {
                    warn!(error = %e, "Temperature read skipped");
                }
            }
            event = link.recv() => match event {
                Some(event) => {
                    printer.print(&event);
                    if event.resulting_state().is_terminal() {
                        link.clear_fault().await?;
                    }
                }
                None => break,
            },
            result = tokio::signal::ctrl_c() => {
                result.context("Failed to listen for Ctrl-C")?;
                break;
            }
        }
    }
    Ok(())
}
