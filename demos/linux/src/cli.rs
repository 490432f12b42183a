//! Command line model shared by the binaries

use std::time::Duration;

use clap::{Args, Parser, ValueEnum};
use ltr390::{Gain, MeasurementRate, Mode, Resolution, SensorConfig};

/// Where to find the sensor
#[derive(Debug, Args)]
pub struct ConnectionArgs {
    /// Serial port of the I2CDriver bridge (e.g. /dev/ttyUSB0) or a kernel I2C bus (/dev/i2c-1)
    pub device: String,

    /// 7-bit I2C address of the sensor
    #[arg(long, value_parser = parse_address, default_value = "0x53")]
    pub address: u8,

    /// Serial read timeout of the bridge in milliseconds
    #[arg(long, default_value_t = 1000)]
    pub timeout_ms: u64,
}

impl ConnectionArgs {
    /// Bridge read timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Configure an LTR-390 and poll its raw UV / ambient light counts
#[derive(Debug, Parser)]
#[command(name = "uv_poll", version)]
pub struct PollArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Number of samples to take
    #[arg(long, default_value_t = 10)]
    pub iterations: u32,

    /// Pause between two samples in milliseconds
    #[arg(long, default_value_t = 100)]
    pub interval_ms: u32,

    /// Operating mode
    #[arg(long, value_enum, default_value_t = ModeArg::Uvs)]
    pub mode: ModeArg,

    /// Analog gain
    #[arg(long, value_enum, default_value_t = GainArg::X18)]
    pub gain: GainArg,

    /// ADC resolution in bits
    #[arg(long, value_enum, default_value_t = ResolutionArg::Bits18)]
    pub resolution: ResolutionArg,

    /// Measurement rate in milliseconds
    #[arg(long, value_enum, default_value_t = RateArg::Ms100)]
    pub rate: RateArg,

    /// Raw interrupt configuration re-asserted on every sample
    #[arg(long, value_parser = parse_byte, default_value = "0x30")]
    pub int_config: u8,
}

impl PollArgs {
    /// Settings to write to the sensor
    pub fn sensor_config(&self) -> SensorConfig {
        SensorConfig {
            mode: self.mode.into(),
            gain: self.gain.into(),
            resolution: self.resolution.into(),
            rate: self.rate.into(),
            interrupt_config: self.int_config,
        }
    }
}

/// Identify an LTR-390 and print its current settings without changing them
#[derive(Debug, Parser)]
#[command(name = "inspect", version)]
pub struct InspectArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    /// Ambient light
    Als,
    /// Ultraviolet
    Uvs,
}

impl From<ModeArg> for Mode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Als => Mode::Als,
            ModeArg::Uvs => Mode::Uvs,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum GainArg {
    #[value(name = "1")]
    X1,
    #[value(name = "3")]
    X3,
    #[value(name = "6")]
    X6,
    #[value(name = "9")]
    X9,
    #[value(name = "18")]
    X18,
}

impl From<GainArg> for Gain {
    fn from(arg: GainArg) -> Self {
        match arg {
            GainArg::X1 => Gain::Gain1x,
            GainArg::X3 => Gain::Gain3x,
            GainArg::X6 => Gain::Gain6x,
            GainArg::X9 => Gain::Gain9x,
            GainArg::X18 => Gain::Gain18x,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ResolutionArg {
    #[value(name = "20")]
    Bits20,
    #[value(name = "19")]
    Bits19,
    #[value(name = "18")]
    Bits18,
    #[value(name = "17")]
    Bits17,
    #[value(name = "16")]
    Bits16,
    #[value(name = "13")]
    Bits13,
}

impl From<ResolutionArg> for Resolution {
    fn from(arg: ResolutionArg) -> Self {
        match arg {
            ResolutionArg::Bits20 => Resolution::Bits20,
            ResolutionArg::Bits19 => Resolution::Bits19,
            ResolutionArg::Bits18 => Resolution::Bits18,
            ResolutionArg::Bits17 => Resolution::Bits17,
            ResolutionArg::Bits16 => Resolution::Bits16,
            ResolutionArg::Bits13 => Resolution::Bits13,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RateArg {
    #[value(name = "25")]
    Ms25,
    #[value(name = "50")]
    Ms50,
    #[value(name = "100")]
    Ms100,
    #[value(name = "200")]
    Ms200,
    #[value(name = "500")]
    Ms500,
    #[value(name = "1000")]
    Ms1000,
    #[value(name = "2000")]
    Ms2000,
}

impl From<RateArg> for MeasurementRate {
    fn from(arg: RateArg) -> Self {
        match arg {
            RateArg::Ms25 => MeasurementRate::Ms25,
            RateArg::Ms50 => MeasurementRate::Ms50,
            RateArg::Ms100 => MeasurementRate::Ms100,
            RateArg::Ms200 => MeasurementRate::Ms200,
            RateArg::Ms500 => MeasurementRate::Ms500,
            RateArg::Ms1000 => MeasurementRate::Ms1000,
            RateArg::Ms2000 => MeasurementRate::Ms2000,
        }
    }
}

/// Parse a byte given in decimal or with a `0x` prefix
pub fn parse_byte(value: &str) -> Result<u8, String> {
    let parsed = match value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => value.parse(),
    };
    parsed.map_err(|e| format!("`{value}` is not a byte: {e}"))
}

/// Parse a 7-bit I2C address
pub fn parse_address(value: &str) -> Result<u8, String> {
    let address = parse_byte(value)?;
    if address > 0x7F {
        return Err(format!("{address:#04x} is not a 7-bit address"));
    }
    Ok(address)
}
