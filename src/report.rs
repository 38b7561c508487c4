//! Console output of field records.
//!
//! Two line formats exist: a compact CSV for logging to a file and a verbose
//! one with units and the heater step bookkeeping of every record.

use core::fmt::{self, Write};

use crate::settings::AcquisitionConfig;
use crate::FieldData;

const HEADER_COMPACT: &str = "TimeStamp(ms),Temp(deg C),Press(Pa),Hum(%),Gas(ohm)";
const HEADER_VERBOSE: &str = "TimeStamp(ms), Temperature(deg C), Pressure(Pa), Humidity(%), \
                              Gas resistance(ohm), wait, sub-m-index, gas-m-index";

/// Output line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Format {
    /// `ts,temp,press,hum,gas`
    #[default]
    Compact,
    /// Units plus heater duration, sub-measurement index and heater step.
    Verbose,
}

/// Ratio between station pressure and sea-level pressure at `altitude_m`
/// (international barometric formula).
pub fn altitude_factor(altitude_m: f32) -> f32 {
    libm::pow(1.0 - altitude_m as f64 / 44330.0, 5.255) as f32
}

/// Writes header and record lines to a text sink.
///
/// Values are printed from single precision floats, so ties round to even on
/// the exact binary value: 26.65 °C is stored as 26.6499996 and prints `26.6`.
pub struct Reporter<W> {
    out: W,
    format: Format,
    altitude_factor: f32,
}

impl<W: Write> Reporter<W> {
    /// Reports pressure reduced to sea level for a station at `altitude_m`.
    pub fn new(out: W, format: Format, altitude_m: f32) -> Self {
        Self {
            out,
            format,
            altitude_factor: altitude_factor(altitude_m),
        }
    }

    /// Takes format and altitude from the acquisition settings.
    pub fn from_config(out: W, config: &AcquisitionConfig) -> Self {
        Self::new(out, config.format, config.altitude_m)
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.out
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// Column names matching the configured format.
    pub fn header(&mut self) -> fmt::Result {
        let header = match self.format {
            Format::Compact => HEADER_COMPACT,
            Format::Verbose => HEADER_VERBOSE,
        };
        writeln!(self.out, "{}", header)
    }

    /// Writes one record taken at `timestamp_ms`.
    pub fn record(&mut self, timestamp_ms: u32, field: &FieldData) -> fmt::Result {
        let temp = field.temperature.celsius();
        let press = field.pressure.hpa() / self.altitude_factor;
        let hum = field.humidity.percent();
        let gas = field.gas_resistance.0;

        match self.format {
            Format::Compact => writeln!(
                self.out,
                "{},{:.1},{:.0},{:.0},{}",
                timestamp_ms, temp, press, hum, gas
            ),
            Format::Verbose => writeln!(
                self.out,
                "{} ms, {:.1} deg C, {:.0} hPa, {:.0}%, {} Ohm, {}, {}, {}",
                timestamp_ms,
                temp,
                press,
                hum,
                gas,
                field.gas_wait,
                field.meas_index,
                field.gas_index
            ),
        }
    }
}
