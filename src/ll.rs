//! Low-level register map and bitfield codec for the LTR-390
//!
//! Everything in here is a pure translation between typed settings and the
//! bytes that travel over the bus. Decoding never fails: a byte outside the
//! known set comes back as [`Decoded::Unknown`] carrying the raw field value,
//! because a freshly powered or half-configured device legitimately reports
//! such values.

use crate::{
    Decoded, Gain, InterruptConfig, InterruptSource, MeasurementRate, Mode, Resolution, StatusInfo,
};

/// Default 7-bit I2C address of the LTR-390
pub const DEFAULT_ADDRESS: u8 = 0x53;

/// Content of the part id register on an LTR-390 (part 0xB, revision 2)
pub const PART_ID: u8 = 0xB2;

/// Number of consecutive one-byte registers holding a sample
pub const DATA_LEN: u8 = 3;

/// Register addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
#[repr(u8)]
pub enum Register {
    /// Operating mode and enable bits
    MainCtrl = 0x00,
    /// Resolution (bits 4-6) and measurement rate (bits 0-3)
    MeasRate = 0x04,
    /// Analog gain
    Gain = 0x05,
    /// Part number and revision
    PartId = 0x06,
    /// Power-on, interrupt and data-ready flags
    MainStatus = 0x07,
    /// Least significant byte of the active channel's sample
    Data = 0x10,
    /// Interrupt source and enable
    IntCfg = 0x19,
}

impl Register {
    /// Offset of the register in the device's register space
    pub const fn addr(self) -> u8 {
        self as u8
    }
}

const RESOLUTION_SHIFT: u8 = 4;
const RESOLUTION_MASK: u8 = 0x07;
const RATE_MASK: u8 = 0x0F;

const INT_SEL_SHIFT: u8 = 4;
const INT_SEL_MASK: u8 = 0x03;
const INT_EN: u8 = 1 << 2;

const STATUS_POWER_ON: u8 = 1 << 5;
const STATUS_INTERRUPT: u8 = 1 << 4;
const STATUS_DATA_READY: u8 = 1 << 3;

/// Encode an operating mode for `MAIN_CTRL`
pub const fn encode_mode(mode: Mode) -> u8 {
    mode as u8
}

/// Decode the content of `MAIN_CTRL`
pub fn decode_mode(byte: u8) -> Decoded<Mode> {
    Decoded::from_option(Mode::from_bits(byte), byte)
}

/// Encode an analog gain for the gain register
pub const fn encode_gain(gain: Gain) -> u8 {
    gain as u8
}

/// Decode the content of the gain register
pub fn decode_gain(byte: u8) -> Decoded<Gain> {
    Decoded::from_option(Gain::from_bits(byte), byte)
}

/// Pack resolution into bits 4-6 and rate into bits 0-3. Bit 7 stays clear.
pub const fn encode_resolution_rate(resolution: Resolution, rate: MeasurementRate) -> u8 {
    ((resolution as u8 & RESOLUTION_MASK) << RESOLUTION_SHIFT) | (rate as u8 & RATE_MASK)
}

/// Split the measurement rate register into its two nibbles.
///
/// The nibbles are decoded independently, so an unknown resolution does not
/// hide a valid rate and vice versa.
pub fn decode_resolution_rate(byte: u8) -> (Decoded<Resolution>, Decoded<MeasurementRate>) {
    let resolution = byte >> RESOLUTION_SHIFT;
    let rate = byte & RATE_MASK;
    (
        Decoded::from_option(Resolution::from_bits(resolution), resolution),
        Decoded::from_option(MeasurementRate::from_bits(rate), rate),
    )
}

/// Assemble a 24-bit sample from the three data registers, least significant first
pub const fn decode_raw_sample(byte0: u8, byte1: u8, byte2: u8) -> u32 {
    (byte2 as u32) << 16 | (byte1 as u32) << 8 | byte0 as u32
}

/// Encode the interrupt configuration register
pub const fn encode_interrupt_config(source: InterruptSource, enabled: bool) -> u8 {
    let en = if enabled { INT_EN } else { 0 };
    ((source as u8 & INT_SEL_MASK) << INT_SEL_SHIFT) | en
}

/// Decode the interrupt configuration register
pub fn decode_interrupt_config(byte: u8) -> InterruptConfig {
    let source = (byte >> INT_SEL_SHIFT) & INT_SEL_MASK;
    InterruptConfig {
        source: Decoded::from_option(InterruptSource::from_bits(source), source),
        enabled: byte & INT_EN != 0,
    }
}

/// Decode the main status register
pub const fn decode_status(byte: u8) -> StatusInfo {
    StatusInfo {
        power_on_occurred: byte & STATUS_POWER_ON != 0,
        interrupt_active: byte & STATUS_INTERRUPT != 0,
        data_ready: byte & STATUS_DATA_READY != 0,
    }
}
