//! Configure-and-poll utility
//!
//! This program:
//! - Connects to the bus (I2CDriver bridge or kernel I2C device)
//! - Refuses to continue unless the part id reads 0xB2
//! - Writes mode, gain and resolution/rate, showing each register before and after
//! - Polls status, interrupt configuration and the raw sample a fixed number of times
//!
//! Ctrl+C stops the poll loop before the next sample.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Context};
use clap::Parser;
use linux_embedded_hal::Delay;
use log::{info, warn};
use ltr390::Ltr390;
use ltr390_linux::cli::PollArgs;
use ltr390_linux::{report, transport};

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = PollArgs::parse();
    let device = &args.connection.device;

    let bus = transport::open(device, args.connection.timeout())
        .with_context(|| format!("could not connect to {device}"))?;
    let mut sensor = Ltr390::new_with_delay(bus, Delay).with_address(args.connection.address);

    let stop = Arc::new(AtomicBool::new(false));
    let handler_stop = Arc::clone(&stop);
    ctrlc::set_handler(move || handler_stop.store(true, Ordering::Relaxed))
        .context("could not install Ctrl+C handler")?;

    let part_id = sensor
        .verify_identity()
        .map_err(|e| anyhow!("{device} at {:#04x}: {e}", args.connection.address))?;

    let stdout = io::stdout();
    let mut out = stdout.lock();

    writeln!(out, "part id: {part_id:#04x}")?;
    report::separator(&mut out)?;

    let config = args.sensor_config();
    let configured = sensor.configure(&config).map_err(|e| anyhow!("{e}"))?;
    report::config_report(&mut out, &configured)?;
    if !configured.is_confirmed() {
        warn!("configuration did not read back as written, polling anyway");
    }

    let mut output = Ok(());
    let summary = sensor
        .run_poll_loop(args.iterations, args.interval_ms, &stop, |index, sample| {
            if output.is_ok() {
                output = report::sample(&mut out, index, &sample);
            }
        })
        .map_err(|e| anyhow!("{e}"))?;
    output?;

    if summary.cancelled {
        info!(
            "stopped after {} of {} samples",
            summary.completed, args.iterations
        );
    }

    Ok(())
}
