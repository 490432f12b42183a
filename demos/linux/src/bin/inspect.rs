//! Read-only settings dump
//!
//! Identifies the sensor and prints mode, gain, resolution/rate and interrupt
//! configuration as they are right now. Nothing is written to the device.

use std::io::{self, Write};

use anyhow::{anyhow, Context};
use clap::Parser;
use ltr390::Ltr390;
use ltr390_linux::cli::InspectArgs;
use ltr390_linux::{report, transport};

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = InspectArgs::parse();
    let device = &args.connection.device;

    let bus = transport::open(device, args.connection.timeout())
        .with_context(|| format!("could not connect to {device}"))?;
    let mut sensor = Ltr390::new(bus).with_address(args.connection.address);

    let part_id = sensor
        .verify_identity()
        .map_err(|e| anyhow!("{device} at {:#04x}: {e}", args.connection.address))?;
    let settings = sensor.read_settings().map_err(|e| anyhow!("{e}"))?;

    let mut out = io::stdout().lock();
    writeln!(out, "part id: {part_id:#04x}")?;
    report::separator(&mut out)?;
    report::settings(&mut out, &settings)?;

    Ok(())
}
