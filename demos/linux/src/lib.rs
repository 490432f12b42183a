//! Linux side of the LTR-390 tools: bus transports, argument handling and report output.

pub mod cli;
pub mod i2cdriver;
pub mod report;
pub mod transport;
