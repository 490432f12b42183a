//! Human-readable rendering of what the session saw.
//!
//! Bus failures are printed in place of the value and also logged as warnings.

use std::fmt::{Debug, Display};
use std::io::{self, Write};

use log::warn;
use ltr390::{
    ConfigReport, Decoded, Error, MeasurementRate, PollSample, RegisterUpdate, Resolution,
    Settings, StatusInfo,
};

const SEPARATOR: &str = "--------------------";

/// Print the separator line between report sections
pub fn separator(out: &mut impl Write) -> io::Result<()> {
    writeln!(out, "{SEPARATOR}")
}

/// Render the content of the measurement rate register
pub fn resolution_rate(value: &(Decoded<Resolution>, Decoded<MeasurementRate>)) -> String {
    format!("resolution: {}, measurement rate: {}", value.0, value.1)
}

fn value_or_failure<T, E: Debug>(
    what: &str,
    value: &Result<T, Error<E>>,
    render: impl Fn(&T) -> String,
) -> String {
    match value {
        Ok(value) => render(value),
        Err(e) => {
            warn!("{what} failed: {e}");
            format!("{what} failed ({e})")
        }
    }
}

/// Print one read / write / read-back cycle
pub fn register_update<T, E: Debug>(
    out: &mut impl Write,
    name: &str,
    update: &RegisterUpdate<T, E>,
    render: impl Fn(&T) -> String,
) -> io::Result<()> {
    writeln!(
        out,
        "{name} was: {}",
        value_or_failure("read", &update.before, &render)
    )?;
    writeln!(out, "setting {name} to {}", render(&update.requested))?;
    if let Err(e) = &update.written {
        warn!("writing {name} failed: {e}");
        writeln!(out, "write failed ({e})")?;
    }
    writeln!(
        out,
        "{name} now: {}",
        value_or_failure("read-back", &update.after, &render)
    )
}

fn display<T: Display>(value: &T) -> String {
    value.to_string()
}

/// Print the outcome of the configuration step
pub fn config_report<E: Debug>(out: &mut impl Write, report: &ConfigReport<E>) -> io::Result<()> {
    register_update(out, "mode", &report.mode, display)?;
    separator(out)?;
    register_update(out, "gain", &report.gain, display)?;
    separator(out)?;
    register_update(out, "resolution/rate", &report.resolution_rate, resolution_rate)?;
    separator(out)
}

/// Print a settings snapshot
pub fn settings<E: Debug>(out: &mut impl Write, settings: &Settings<E>) -> io::Result<()> {
    writeln!(out, "mode: {}", value_or_failure("read", &settings.mode, display))?;
    writeln!(out, "gain: {}", value_or_failure("read", &settings.gain, display))?;
    writeln!(
        out,
        "{}",
        value_or_failure("read", &settings.resolution_rate, resolution_rate)
    )?;
    writeln!(
        out,
        "interrupt: {}",
        value_or_failure("read", &settings.interrupt, |int| {
            format!(
                "source {}, {}",
                int.source,
                if int.enabled { "enabled" } else { "disabled" }
            )
        })
    )
}

fn status_flags(info: StatusInfo) -> String {
    let mut flags = Vec::new();
    if info.power_on_occurred {
        flags.push("power-on");
    }
    if info.interrupt_active {
        flags.push("interrupt");
    }
    if info.data_ready {
        flags.push("data ready");
    }
    flags.join(", ")
}

/// Print one poll iteration on a single line
pub fn sample<E: Debug>(out: &mut impl Write, index: u32, sample: &PollSample<E>) -> io::Result<()> {
    let status = value_or_failure("status read", &sample.status, |status| {
        let flags = sample.status_info().map(status_flags).unwrap_or_default();
        format!("{status:#04x} [{flags}]")
    });
    let int_conf = value_or_failure("config read", &sample.int_conf, |byte| {
        format!("{byte:#04x}")
    });
    if let Err(e) = &sample.int_conf_rearm {
        warn!("re-asserting interrupt config failed: {e}");
    }
    let raw = value_or_failure("data read", &sample.raw, |raw| raw.to_string());

    writeln!(
        out,
        "#{index} status: {status} config register: {int_conf} raw data: {raw}"
    )
}
