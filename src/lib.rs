//! # LTR-390 UV and Ambient Light Sensor Driver
//!
//! This is a platform-agnostic Rust driver for the Lite-On LTR-390 UV and ambient light sensor,
//! built using the [`embedded-hal`] traits for I2C communication.
//!
//! The LTR-390 provides:
//! - An ambient light (ALS) channel and a UV (UVS) channel sharing one data register
//! - Programmable gain (1x to 18x)
//! - Programmable resolution (13 to 20 bit) and measurement rate (25ms to 2000ms)
//! - Interrupt support on either channel
//! - I2C interface (default address 0x53)
//!
//! The driver is organised as a small session:
//!
//! 1. [`Ltr390::verify_identity`] reads the part id and refuses to go further on a mismatch
//! 2. [`Ltr390::configure`] writes mode, gain and resolution/rate, reading each back
//! 3. [`Ltr390::run_poll_loop`] reads status, re-arms the interrupt configuration and
//!    fetches the raw 24-bit sample at a fixed cadence
//!
//! Register reads and writes after identification are best-effort: every bus failure is
//! reported next to the value it concerns instead of aborting the session. Raw counts are
//! not converted to lux or UV index.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use core::sync::atomic::AtomicBool;
//! use ltr390::{Ltr390, SensorConfig};
//!
//! # fn main() {
//! # let i2c = embedded_hal_mock::eh1::i2c::Mock::new(&[]);
//! # let delay = embedded_hal_mock::eh1::delay::NoopDelay::new();
//! let mut sensor = Ltr390::new_with_delay(i2c, delay);
//!
//! // Refuse to talk to anything that is not an LTR-390
//! sensor.verify_identity().unwrap();
//!
//! // UV mode, 18x gain, 18 bit, 100ms
//! let report = sensor.configure(&SensorConfig::default()).unwrap();
//! if !report.is_confirmed() {
//!     // Some register did not read back as written
//! }
//!
//! let stop = AtomicBool::new(false);
//! sensor
//!     .run_poll_loop(10, 100, &stop, |index, sample| {
//!         if let Ok(raw) = sample.raw {
//!             // println!("{}: {}", index, raw);
//!         }
//!     })
//!     .unwrap();
//! # }
//! ```
//!
//! ## Async Usage
//!
//! Enable the `async` feature to use async/await patterns:
//!
//! ```toml
//! [dependencies]
//! ltr390 = { version = "0.1", features = ["async"] }
//! ```
//!
//! Every session operation has an `_async` counterpart, e.g.
//! [`Ltr390::verify_identity_async`] and `run_poll_loop_async`.
//!
//! [`embedded-hal`]: https://crates.io/crates/embedded-hal

#![no_std]
#![deny(missing_docs)]

use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};

use embedded_hal::i2c::I2c;

#[cfg(feature = "async")]
use embedded_hal_async::i2c::I2c as AsyncI2c;

pub mod ll;

use ll::Register;
pub use ll::{DEFAULT_ADDRESS, PART_ID};

/// Operating mode written to `MAIN_CTRL`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum Mode {
    /// Ambient light sensing, sensor enabled
    Als = 0x02,
    /// UV sensing, sensor enabled
    Uvs = 0x0A,
}

impl Mode {
    /// All modes the device accepts
    pub const ALL: [Mode; 2] = [Mode::Als, Mode::Uvs];

    /// Match a raw `MAIN_CTRL` value against the known modes
    pub fn from_bits(bits: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|mode| *mode as u8 == bits)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Als => f.write_str("ALS"),
            Mode::Uvs => f.write_str("UVS"),
        }
    }
}

/// Analog gain settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum Gain {
    /// 1x gain
    Gain1x = 0b000,
    /// 3x gain
    Gain3x = 0b001,
    /// 6x gain
    Gain6x = 0b010,
    /// 9x gain
    Gain9x = 0b011,
    /// 18x gain
    Gain18x = 0b100,
}

impl Gain {
    /// All gains in register order
    pub const ALL: [Gain; 5] = [
        Gain::Gain1x,
        Gain::Gain3x,
        Gain::Gain6x,
        Gain::Gain9x,
        Gain::Gain18x,
    ];

    /// Look up a gain by its register encoding
    pub fn from_bits(bits: u8) -> Option<Self> {
        Self::ALL.get(bits as usize).copied()
    }

    /// Amplification factor
    pub const fn factor(self) -> u8 {
        match self {
            Gain::Gain1x => 1,
            Gain::Gain3x => 3,
            Gain::Gain6x => 6,
            Gain::Gain9x => 9,
            Gain::Gain18x => 18,
        }
    }
}

impl fmt::Display for Gain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x", self.factor())
    }
}

/// ADC resolution, upper nibble of the measurement rate register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum Resolution {
    /// 20-bit resolution, 400ms conversion time
    Bits20 = 0b000,
    /// 19-bit resolution, 200ms conversion time
    Bits19 = 0b001,
    /// 18-bit resolution, 100ms conversion time
    Bits18 = 0b010,
    /// 17-bit resolution, 50ms conversion time
    Bits17 = 0b011,
    /// 16-bit resolution, 25ms conversion time
    Bits16 = 0b100,
    /// 13-bit resolution, 12.5ms conversion time
    Bits13 = 0b101,
}

impl Resolution {
    /// All resolutions in register order
    pub const ALL: [Resolution; 6] = [
        Resolution::Bits20,
        Resolution::Bits19,
        Resolution::Bits18,
        Resolution::Bits17,
        Resolution::Bits16,
        Resolution::Bits13,
    ];

    /// Look up a resolution by its register encoding
    pub fn from_bits(bits: u8) -> Option<Self> {
        Self::ALL.get(bits as usize).copied()
    }

    /// Number of significant bits in a sample
    pub const fn bits(self) -> u8 {
        match self {
            Resolution::Bits20 => 20,
            Resolution::Bits19 => 19,
            Resolution::Bits18 => 18,
            Resolution::Bits17 => 17,
            Resolution::Bits16 => 16,
            Resolution::Bits13 => 13,
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} bit", self.bits())
    }
}

/// Measurement rate, lower nibble of the measurement rate register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum MeasurementRate {
    /// 25ms measurement rate
    Ms25 = 0b000,
    /// 50ms measurement rate
    Ms50 = 0b001,
    /// 100ms measurement rate
    Ms100 = 0b010,
    /// 200ms measurement rate
    Ms200 = 0b011,
    /// 500ms measurement rate
    Ms500 = 0b100,
    /// 1000ms measurement rate
    Ms1000 = 0b101,
    /// 2000ms measurement rate
    Ms2000 = 0b110,
}

impl MeasurementRate {
    /// All rates in register order
    pub const ALL: [MeasurementRate; 7] = [
        MeasurementRate::Ms25,
        MeasurementRate::Ms50,
        MeasurementRate::Ms100,
        MeasurementRate::Ms200,
        MeasurementRate::Ms500,
        MeasurementRate::Ms1000,
        MeasurementRate::Ms2000,
    ];

    /// Look up a rate by its register encoding
    pub fn from_bits(bits: u8) -> Option<Self> {
        Self::ALL.get(bits as usize).copied()
    }

    /// Period between two measurements in milliseconds
    pub const fn millis(self) -> u16 {
        match self {
            MeasurementRate::Ms25 => 25,
            MeasurementRate::Ms50 => 50,
            MeasurementRate::Ms100 => 100,
            MeasurementRate::Ms200 => 200,
            MeasurementRate::Ms500 => 500,
            MeasurementRate::Ms1000 => 1000,
            MeasurementRate::Ms2000 => 2000,
        }
    }
}

impl fmt::Display for MeasurementRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.millis())
    }
}

/// Channel that drives the interrupt pin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum InterruptSource {
    /// Ambient light channel
    Als = 0b01,
    /// UV channel
    Uvs = 0b11,
}

impl InterruptSource {
    /// Look up a source by its two-bit field value
    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0b01 => Some(InterruptSource::Als),
            0b11 => Some(InterruptSource::Uvs),
            _ => None,
        }
    }
}

impl fmt::Display for InterruptSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterruptSource::Als => f.write_str("ALS channel"),
            InterruptSource::Uvs => f.write_str("UVS channel"),
        }
    }
}

/// A register field that is either one of the documented values or something else.
///
/// `Unknown` keeps the raw field value so it can be shown to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum Decoded<T> {
    /// A documented value
    Known(T),
    /// An undocumented raw field value
    Unknown(u8),
}

impl<T> Decoded<T> {
    /// Wrap the result of a lookup, falling back to the raw value
    pub fn from_option(value: Option<T>, raw: u8) -> Self {
        match value {
            Some(value) => Decoded::Known(value),
            None => Decoded::Unknown(raw),
        }
    }

    /// The documented value, if any
    pub fn known(self) -> Option<T> {
        match self {
            Decoded::Known(value) => Some(value),
            Decoded::Unknown(_) => None,
        }
    }
}

impl<T: fmt::Display> fmt::Display for Decoded<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decoded::Known(value) => fmt::Display::fmt(value, f),
            Decoded::Unknown(raw) => write!(f, "unknown ({raw:#04x})"),
        }
    }
}

/// Decoded interrupt configuration register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct InterruptConfig {
    /// Channel selected as interrupt source
    pub source: Decoded<InterruptSource>,
    /// True if the interrupt pin is enabled
    pub enabled: bool,
}

/// Device status information
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct StatusInfo {
    /// True if device went through power-up event
    pub power_on_occurred: bool,
    /// True if interrupt condition is active
    pub interrupt_active: bool,
    /// True if new data is available
    pub data_ready: bool,
}

/// Interrupt configuration re-asserted on every poll unless configured otherwise:
/// UV channel selected, interrupt pin disabled (`0x30`)
pub const DEFAULT_INTERRUPT_CONFIG: u8 = ll::encode_interrupt_config(InterruptSource::Uvs, false);

/// Settings applied by [`Ltr390::configure`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct SensorConfig {
    /// Operating mode
    pub mode: Mode,
    /// Analog gain
    pub gain: Gain,
    /// ADC resolution
    pub resolution: Resolution,
    /// Measurement rate
    pub rate: MeasurementRate,
    /// Raw interrupt configuration written on every poll
    pub interrupt_config: u8,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Uvs,
            gain: Gain::Gain18x,
            resolution: Resolution::Bits18,
            rate: MeasurementRate::Ms100,
            interrupt_config: DEFAULT_INTERRUPT_CONFIG,
        }
    }
}

/// Where the session stands in the bring-up sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum SessionState {
    /// Bus is open, device not identified yet
    Connected,
    /// Part id matched
    Verified,
    /// Configuration written, polling allowed
    Configured,
    /// Poll loop finished
    Done,
    /// Identification failed, the device must not be touched any further
    Failed,
}

/// All possible errors in this crate
#[derive(Debug)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum Error<E> {
    /// I2C communication error
    I2c(E),
    /// Invalid device ID detected
    InvalidDeviceId {
        /// Expected device ID
        expected: u8,
        /// Found device ID
        found: u8,
    },
    /// Operation not allowed in the current session state
    InvalidState(SessionState),
}

impl<E: fmt::Debug> fmt::Display for Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::I2c(e) => write!(f, "I2C error: {e:?}"),
            Error::InvalidDeviceId { expected, found } => write!(
                f,
                "wrong part id: expected {expected:#04x}, found {found:#04x}"
            ),
            Error::InvalidState(state) => write!(f, "operation not allowed while {state:?}"),
        }
    }
}

/// Outcome of one read / write / read-back cycle on a configuration register
#[derive(Debug)]
pub struct RegisterUpdate<T, E> {
    /// The value that was written, decoded
    pub requested: T,
    /// Content before the write
    pub before: Result<T, Error<E>>,
    /// Result of the write itself
    pub written: Result<(), Error<E>>,
    /// Content read back after the write
    pub after: Result<T, Error<E>>,
}

impl<T: PartialEq, E> RegisterUpdate<T, E> {
    /// True if the write went through and the read-back matches
    pub fn is_confirmed(&self) -> bool {
        self.written.is_ok() && matches!(&self.after, Ok(value) if *value == self.requested)
    }
}

/// Per-register outcome of [`Ltr390::configure`]
#[derive(Debug)]
pub struct ConfigReport<E> {
    /// `MAIN_CTRL`
    pub mode: RegisterUpdate<Decoded<Mode>, E>,
    /// Gain register
    pub gain: RegisterUpdate<Decoded<Gain>, E>,
    /// Measurement rate register
    pub resolution_rate: RegisterUpdate<(Decoded<Resolution>, Decoded<MeasurementRate>), E>,
}

impl<E> ConfigReport<E> {
    /// True if all three registers were written and read back as requested
    pub fn is_confirmed(&self) -> bool {
        self.mode.is_confirmed() && self.gain.is_confirmed() && self.resolution_rate.is_confirmed()
    }
}

/// Current register contents, see [`Ltr390::read_settings`]
#[derive(Debug)]
pub struct Settings<E> {
    /// `MAIN_CTRL`
    pub mode: Result<Decoded<Mode>, Error<E>>,
    /// Gain register
    pub gain: Result<Decoded<Gain>, Error<E>>,
    /// Measurement rate register
    pub resolution_rate: Result<(Decoded<Resolution>, Decoded<MeasurementRate>), Error<E>>,
    /// Interrupt configuration register
    pub interrupt: Result<InterruptConfig, Error<E>>,
}

/// Everything read during one poll iteration
#[derive(Debug)]
pub struct PollSample<E> {
    /// Raw main status register
    pub status: Result<u8, Error<E>>,
    /// Raw interrupt configuration, read before it is re-asserted
    pub int_conf: Result<u8, Error<E>>,
    /// Result of re-asserting the interrupt configuration
    pub int_conf_rearm: Result<(), Error<E>>,
    /// 24-bit sample of the active channel
    pub raw: Result<u32, Error<E>>,
}

impl<E> PollSample<E> {
    /// Decoded status flags, if the status read succeeded
    pub fn status_info(&self) -> Option<StatusInfo> {
        self.status.as_ref().ok().map(|status| ll::decode_status(*status))
    }

    /// Decoded interrupt configuration, if the read succeeded
    pub fn interrupt_config(&self) -> Option<InterruptConfig> {
        self.int_conf
            .as_ref()
            .ok()
            .map(|byte| ll::decode_interrupt_config(*byte))
    }
}

/// How a poll loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct PollSummary {
    /// Number of iterations that ran
    pub completed: u32,
    /// True if the cancel flag stopped the loop early
    pub cancelled: bool,
}

/// High-level LTR-390 session
pub struct Ltr390<I2C, Delay = ()> {
    i2c: I2C,
    delay: Delay,
    address: u8,
    state: SessionState,
    interrupt_config: u8,
}

impl<I2C> Ltr390<I2C, ()> {
    /// Create a new LTR-390 session without delay support
    pub fn new(i2c: I2C) -> Self {
        Self::new_with_delay(i2c, ())
    }
}

impl<I2C, Delay> Ltr390<I2C, Delay> {
    /// Create a new LTR-390 session with delay support
    pub fn new_with_delay(i2c: I2C, delay: Delay) -> Self {
        Self {
            i2c,
            delay,
            address: DEFAULT_ADDRESS,
            state: SessionState::Connected,
            interrupt_config: DEFAULT_INTERRUPT_CONFIG,
        }
    }

    /// Talk to the device at another 7-bit address
    pub fn with_address(mut self, address: u8) -> Self {
        self.address = address;
        self
    }

    /// 7-bit address the session talks to
    pub fn address(&self) -> u8 {
        self.address
    }

    /// Current session state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Destroy the driver and return the I2C interface
    pub fn destroy(self) -> I2C {
        self.i2c
    }

    fn require<E>(&self, allowed: &[SessionState]) -> Result<(), Error<E>> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(Error::InvalidState(self.state))
        }
    }

    fn check_part_id<E>(&mut self, part_id: Result<u8, Error<E>>) -> Result<u8, Error<E>> {
        match part_id {
            Ok(PART_ID) => {
                self.state = SessionState::Verified;
                Ok(PART_ID)
            }
            Ok(found) => {
                self.state = SessionState::Failed;
                Err(Error::InvalidDeviceId {
                    expected: PART_ID,
                    found,
                })
            }
            Err(e) => {
                self.state = SessionState::Failed;
                Err(e)
            }
        }
    }
}

const CONFIGURABLE: &[SessionState] = &[
    SessionState::Verified,
    SessionState::Configured,
    SessionState::Done,
];

impl<I2C, E, Delay> Ltr390<I2C, Delay>
where
    I2C: I2c<Error = E>,
{
    /// Read the part id and check it against [`PART_ID`].
    ///
    /// On mismatch the session moves to [`SessionState::Failed`] and refuses every
    /// later configuration or poll request.
    pub fn verify_identity(&mut self) -> Result<u8, Error<E>> {
        self.require::<E>(&[SessionState::Connected])?;
        let part_id = self.read_register(Register::PartId.addr());
        self.check_part_id(part_id)
    }

    /// Write mode, gain and resolution/rate in that order, reading each register
    /// before and after the write.
    ///
    /// Bus failures are recorded in the report and do not stop the sequence.
    pub fn configure(&mut self, config: &SensorConfig) -> Result<ConfigReport<E>, Error<E>> {
        self.require::<E>(CONFIGURABLE)?;

        let mode = self.update_register(
            Register::MainCtrl,
            ll::encode_mode(config.mode),
            ll::decode_mode,
        );
        let gain = self.update_register(
            Register::Gain,
            ll::encode_gain(config.gain),
            ll::decode_gain,
        );
        let resolution_rate = self.update_register(
            Register::MeasRate,
            ll::encode_resolution_rate(config.resolution, config.rate),
            ll::decode_resolution_rate,
        );

        self.interrupt_config = config.interrupt_config;
        self.state = SessionState::Configured;

        Ok(ConfigReport {
            mode,
            gain,
            resolution_rate,
        })
    }

    /// Read the current configuration registers without changing anything
    pub fn read_settings(&mut self) -> Result<Settings<E>, Error<E>> {
        self.require::<E>(CONFIGURABLE)?;
        Ok(Settings {
            mode: self.read_register(Register::MainCtrl.addr()).map(ll::decode_mode),
            gain: self.read_register(Register::Gain.addr()).map(ll::decode_gain),
            resolution_rate: self
                .read_register(Register::MeasRate.addr())
                .map(ll::decode_resolution_rate),
            interrupt: self
                .read_register(Register::IntCfg.addr())
                .map(ll::decode_interrupt_config),
        })
    }

    /// One poll iteration: status, interrupt configuration (read, then re-assert) and
    /// the raw sample.
    pub fn poll_once(&mut self) -> Result<PollSample<E>, Error<E>> {
        self.require::<E>(&[SessionState::Configured])?;

        let status = self.read_register(Register::MainStatus.addr());
        let int_conf = self.read_register(Register::IntCfg.addr());
        // Written unconditionally on every iteration
        let int_conf_rearm = self.write_register(Register::IntCfg.addr(), self.interrupt_config);
        let raw = self.read_raw_sample();

        Ok(PollSample {
            status,
            int_conf,
            int_conf_rearm,
            raw,
        })
    }

    /// Read the three data registers one at a time, least significant first.
    ///
    /// All three reads are issued even when an earlier one fails; the first failure
    /// is returned.
    pub fn read_raw_sample(&mut self) -> Result<u32, Error<E>> {
        let base = Register::Data.addr();
        let low = self.read_register(base);
        let mid = self.read_register(base + 1);
        let high = self.read_register(base + 2);
        Ok(ll::decode_raw_sample(low?, mid?, high?))
    }

    fn update_register<T>(
        &mut self,
        register: Register,
        value: u8,
        decode: fn(u8) -> T,
    ) -> RegisterUpdate<T, E> {
        let before = self.read_register(register.addr()).map(decode);
        let written = self.write_register(register.addr(), value);
        let after = self.read_register(register.addr()).map(decode);
        RegisterUpdate {
            requested: decode(value),
            before,
            written,
            after,
        }
    }

    // Helper methods for register access
    fn read_register(&mut self, address: u8) -> Result<u8, Error<E>> {
        let mut buffer = [0u8; 1];
        self.i2c
            .write_read(self.address, &[address], &mut buffer)
            .map_err(Error::I2c)?;
        Ok(buffer[0])
    }

    fn write_register(&mut self, address: u8, value: u8) -> Result<(), Error<E>> {
        self.i2c
            .write(self.address, &[address, value])
            .map_err(Error::I2c)
    }
}

impl<I2C, E, Delay> Ltr390<I2C, Delay>
where
    I2C: I2c<Error = E>,
    Delay: embedded_hal::delay::DelayNs,
{
    /// Poll up to `iterations` times, sleeping `inter_sample_delay_ms` between
    /// iterations but not after the last one.
    ///
    /// `cancel` is checked before every iteration and before every sleep; setting it
    /// from elsewhere (a signal handler, another task) ends the loop early. Each sample
    /// is handed to `on_sample` together with its zero-based index. The session ends in
    /// [`SessionState::Done`].
    pub fn run_poll_loop<F>(
        &mut self,
        iterations: u32,
        inter_sample_delay_ms: u32,
        cancel: &AtomicBool,
        mut on_sample: F,
    ) -> Result<PollSummary, Error<E>>
    where
        F: FnMut(u32, PollSample<E>),
    {
        self.require::<E>(&[SessionState::Configured])?;

        let mut summary = PollSummary {
            completed: 0,
            cancelled: false,
        };
        for index in 0..iterations {
            if index > 0 {
                if cancel.load(Ordering::Relaxed) {
                    summary.cancelled = true;
                    break;
                }
                self.delay.delay_ms(inter_sample_delay_ms);
            }
            if cancel.load(Ordering::Relaxed) {
                summary.cancelled = true;
                break;
            }
            let sample = self.poll_once()?;
            on_sample(index, sample);
            summary.completed += 1;
        }

        self.state = SessionState::Done;
        Ok(summary)
    }
}

#[cfg(feature = "async")]
impl<I2C, E, Delay> Ltr390<I2C, Delay>
where
    I2C: AsyncI2c<Error = E>,
{
    /// Read the part id and check it against [`PART_ID`] (async version)
    pub async fn verify_identity_async(&mut self) -> Result<u8, Error<E>> {
        self.require::<E>(&[SessionState::Connected])?;
        let part_id = self.read_register_async(Register::PartId.addr()).await;
        self.check_part_id(part_id)
    }

    /// Write mode, gain and resolution/rate (async version)
    pub async fn configure_async(
        &mut self,
        config: &SensorConfig,
    ) -> Result<ConfigReport<E>, Error<E>> {
        self.require::<E>(CONFIGURABLE)?;

        let mode = self
            .update_register_async(
                Register::MainCtrl,
                ll::encode_mode(config.mode),
                ll::decode_mode,
            )
            .await;
        let gain = self
            .update_register_async(Register::Gain, ll::encode_gain(config.gain), ll::decode_gain)
            .await;
        let resolution_rate = self
            .update_register_async(
                Register::MeasRate,
                ll::encode_resolution_rate(config.resolution, config.rate),
                ll::decode_resolution_rate,
            )
            .await;

        self.interrupt_config = config.interrupt_config;
        self.state = SessionState::Configured;

        Ok(ConfigReport {
            mode,
            gain,
            resolution_rate,
        })
    }

    /// Read the current configuration registers (async version)
    pub async fn read_settings_async(&mut self) -> Result<Settings<E>, Error<E>> {
        self.require::<E>(CONFIGURABLE)?;
        Ok(Settings {
            mode: self
                .read_register_async(Register::MainCtrl.addr())
                .await
                .map(ll::decode_mode),
            gain: self
                .read_register_async(Register::Gain.addr())
                .await
                .map(ll::decode_gain),
            resolution_rate: self
                .read_register_async(Register::MeasRate.addr())
                .await
                .map(ll::decode_resolution_rate),
            interrupt: self
                .read_register_async(Register::IntCfg.addr())
                .await
                .map(ll::decode_interrupt_config),
        })
    }

    /// One poll iteration (async version)
    pub async fn poll_once_async(&mut self) -> Result<PollSample<E>, Error<E>> {
        self.require::<E>(&[SessionState::Configured])?;

        let status = self.read_register_async(Register::MainStatus.addr()).await;
        let int_conf = self.read_register_async(Register::IntCfg.addr()).await;
        let int_conf_rearm = self
            .write_register_async(Register::IntCfg.addr(), self.interrupt_config)
            .await;
        let raw = self.read_raw_sample_async().await;

        Ok(PollSample {
            status,
            int_conf,
            int_conf_rearm,
            raw,
        })
    }

    /// Read the three data registers one at a time (async version)
    pub async fn read_raw_sample_async(&mut self) -> Result<u32, Error<E>> {
        let base = Register::Data.addr();
        let low = self.read_register_async(base).await;
        let mid = self.read_register_async(base + 1).await;
        let high = self.read_register_async(base + 2).await;
        Ok(ll::decode_raw_sample(low?, mid?, high?))
    }

    /// Poll loop with cancellation (async version)
    pub async fn run_poll_loop_async<F>(
        &mut self,
        iterations: u32,
        inter_sample_delay_ms: u32,
        cancel: &AtomicBool,
        mut on_sample: F,
    ) -> Result<PollSummary, Error<E>>
    where
        F: FnMut(u32, PollSample<E>),
        Delay: embedded_hal_async::delay::DelayNs,
    {
        self.require::<E>(&[SessionState::Configured])?;

        let mut summary = PollSummary {
            completed: 0,
            cancelled: false,
        };
        for index in 0..iterations {
            if index > 0 {
                if cancel.load(Ordering::Relaxed) {
                    summary.cancelled = true;
                    break;
                }
                self.delay.delay_ms(inter_sample_delay_ms).await;
            }
            if cancel.load(Ordering::Relaxed) {
                summary.cancelled = true;
                break;
            }
            let sample = self.poll_once_async().await?;
            on_sample(index, sample);
            summary.completed += 1;
        }

        self.state = SessionState::Done;
        Ok(summary)
    }

    async fn update_register_async<T>(
        &mut self,
        register: Register,
        value: u8,
        decode: fn(u8) -> T,
    ) -> RegisterUpdate<T, E> {
        let before = self.read_register_async(register.addr()).await.map(decode);
        let written = self.write_register_async(register.addr(), value).await;
        let after = self.read_register_async(register.addr()).await.map(decode);
        RegisterUpdate {
            requested: decode(value),
            before,
            written,
            after,
        }
    }

    // Helper methods for async register access
    async fn read_register_async(&mut self, address: u8) -> Result<u8, Error<E>> {
        let mut buffer = [0u8; 1];
        self.i2c
            .write_read(self.address, &[address], &mut buffer)
            .await
            .map_err(Error::I2c)?;
        Ok(buffer[0])
    }

    async fn write_register_async(&mut self, address: u8, value: u8) -> Result<(), Error<E>> {
        self.i2c
            .write(self.address, &[address, value])
            .await
            .map_err(Error::I2c)
    }
}


#[cfg(all(test, feature = "async"))]
mod async_tests {
    use super::*;
    use embassy_futures::block_on;
    use embedded_hal::i2c::ErrorKind;
    use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction as I2cTransaction};
    extern crate std;
    use std::vec;
    use std::vec::Vec;

    const ADDR: u8 = DEFAULT_ADDRESS;

    #[derive(Default)]
    struct RecordingDelay {
        sleeps: Vec<u32>,
    }

    impl embedded_hal_async::delay::DelayNs for RecordingDelay {
        async fn delay_ns(&mut self, ns: u32) {
            self.sleeps.push(ns / 1_000_000);
        }

        async fn delay_ms(&mut self, ms: u32) {
            self.sleeps.push(ms);
        }
    }

    fn read(register: u8, value: u8) -> I2cTransaction {
        I2cTransaction::write_read(ADDR, vec![register], vec![value])
    }

    fn write(register: u8, value: u8) -> I2cTransaction {
        I2cTransaction::write(ADDR, vec![register, value])
    }

    fn configure_default() -> Vec<I2cTransaction> {
        vec![
            read(0x00, 0x00),
            write(0x00, 0x0A),
            read(0x00, 0x0A),
            read(0x05, 0x01),
            write(0x05, 0x04),
            read(0x05, 0x04),
            read(0x04, 0x22),
            write(0x04, 0x22),
            read(0x04, 0x22),
        ]
    }

    fn poll(data: [u8; 3]) -> Vec<I2cTransaction> {
        vec![
            read(0x07, 0x08),
            read(0x19, 0x30),
            write(0x19, 0x30),
            read(0x10, data[0]),
            read(0x11, data[1]),
            read(0x12, data[2]),
        ]
    }

    #[test]
    fn test_wrong_part_id_blocks_configuration_async() {
        let i2c = I2cMock::new(&[read(0x06, 0xC2)]);
        let mut sensor = Ltr390::new(i2c);

        block_on(async {
            assert!(matches!(
                sensor.verify_identity_async().await,
                Err(Error::InvalidDeviceId {
                    expected: 0xB2,
                    found: 0xC2
                })
            ));
            assert!(matches!(
                sensor.configure_async(&SensorConfig::default()).await,
                Err(Error::InvalidState(SessionState::Failed))
            ));
            assert!(matches!(
                sensor.poll_once_async().await,
                Err(Error::InvalidState(SessionState::Failed))
            ));
        });
        assert_eq!(sensor.state(), SessionState::Failed);

        let mut i2c = sensor.destroy();
        i2c.done();
    }

    #[test]
    fn test_configure_reports_each_register_async() {
        let expectations = [vec![read(0x06, PART_ID)], configure_default()].concat();
        let i2c = I2cMock::new(&expectations);
        let mut sensor = Ltr390::new(i2c);

        let report = block_on(async {
            sensor.verify_identity_async().await.unwrap();
            sensor.configure_async(&SensorConfig::default()).await.unwrap()
        });

        assert!(report.is_confirmed());
        assert_eq!(report.mode.before.unwrap(), Decoded::Unknown(0x00));
        assert_eq!(report.gain.after.unwrap(), Decoded::Known(Gain::Gain18x));
        assert_eq!(sensor.state(), SessionState::Configured);

        let mut i2c = sensor.destroy();
        i2c.done();
    }

    #[test]
    fn test_raw_sample_reads_every_byte_async() {
        let expectations = [
            vec![read(0x06, PART_ID)],
            configure_default(),
            vec![
                read(0x07, 0x08),
                read(0x19, 0x30),
                write(0x19, 0x30).with_error(ErrorKind::Other),
                read(0x10, 0x01).with_error(ErrorKind::Other),
                read(0x11, 0x02),
                read(0x12, 0x03),
            ],
        ]
        .concat();
        let i2c = I2cMock::new(&expectations);
        let mut sensor = Ltr390::new(i2c);

        let sample = block_on(async {
            sensor.verify_identity_async().await.unwrap();
            sensor.configure_async(&SensorConfig::default()).await.unwrap();
            sensor.poll_once_async().await.unwrap()
        });

        assert_eq!(sample.status.unwrap(), 0x08);
        assert!(sample.int_conf_rearm.is_err());
        assert!(sample.raw.is_err());

        let mut i2c = sensor.destroy();
        i2c.done();
    }

    #[test]
    fn test_poll_loop_counts_async() {
        let mut expectations = [vec![read(0x06, PART_ID)], configure_default()].concat();
        for i in 0..10u8 {
            expectations.extend(poll([i, 0, 0]));
        }
        let i2c = I2cMock::new(&expectations);
        let mut delay = RecordingDelay::default();
        let mut sensor = Ltr390::new_with_delay(i2c, &mut delay);

        let stop = AtomicBool::new(false);
        let mut samples = Vec::new();
        let summary = block_on(async {
            sensor.verify_identity_async().await.unwrap();
            sensor.configure_async(&SensorConfig::default()).await.unwrap();
            sensor
                .run_poll_loop_async(10, 100, &stop, |index, sample| {
                    samples.push((index, sample.raw.unwrap()));
                })
                .await
                .unwrap()
        });

        assert_eq!(
            summary,
            PollSummary {
                completed: 10,
                cancelled: false
            }
        );
        assert_eq!(sensor.state(), SessionState::Done);
        let mut i2c = sensor.destroy();
        i2c.done();

        assert_eq!(samples.len(), 10);
        assert_eq!(samples[9], (9, 9));
        assert_eq!(delay.sleeps, vec![100; 9]);
    }

    #[test]
    fn test_poll_loop_cancel_async() {
        let mut expectations = [vec![read(0x06, PART_ID)], configure_default()].concat();
        for _ in 0..3 {
            expectations.extend(poll([0x10, 0x20, 0x00]));
        }
        let i2c = I2cMock::new(&expectations);
        let mut delay = RecordingDelay::default();
        let mut sensor = Ltr390::new_with_delay(i2c, &mut delay);

        let stop = AtomicBool::new(false);
        let summary = block_on(async {
            sensor.verify_identity_async().await.unwrap();
            sensor.configure_async(&SensorConfig::default()).await.unwrap();
            sensor
                .run_poll_loop_async(10, 250, &stop, |index, sample| {
                    assert_eq!(sample.raw.unwrap(), 0x2010);
                    if index == 2 {
                        stop.store(true, Ordering::Relaxed);
                    }
                })
                .await
                .unwrap()
        });

        assert_eq!(
            summary,
            PollSummary {
                completed: 3,
                cancelled: true
            }
        );
        let mut i2c = sensor.destroy();
        i2c.done();

        assert_eq!(delay.sleeps, vec![250, 250]);
    }
}
