use heapless::Vec;

use crate::error::ConfigError;
use crate::report::Format;
use crate::Celsius;

/// Maximum number of heater steps the sensor can store.
pub const MAX_PROFILE_LEN: usize = 10;

/// Oversampling settings for temperature, pressure and humidity.
///
/// Higher rates reduce noise through hardware averaging but lengthen every
/// measurement cycle, which in turn shortens the heater time left in a
/// parallel-mode cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Oversampling {
    /// No measurement. Disables the channel entirely.
    Skipped = 0,
    #[default]
    X1 = 1,
    X2 = 2,
    X4 = 3,
    X8 = 4,
    /// Maximum precision, longest duration.
    X16 = 5,
}

impl Oversampling {
    /// Decodes a register value. Codes above 5 behave like 16x on the device.
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Oversampling::Skipped,
            1 => Oversampling::X1,
            2 => Oversampling::X2,
            3 => Oversampling::X4,
            4 => Oversampling::X8,
            _ => Oversampling::X16,
        }
    }

    /// Number of ADC conversions one measurement takes.
    pub(crate) fn cycles(self) -> u32 {
        match self {
            Oversampling::Skipped => 0,
            Oversampling::X1 => 1,
            Oversampling::X2 => 2,
            Oversampling::X4 => 4,
            Oversampling::X8 => 8,
            Oversampling::X16 => 16,
        }
    }
}

/// IIR filter coefficient.
///
/// Smooths short-term disturbances of pressure and temperature (slammed doors,
/// draughts). Humidity and gas are not filtered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Filter {
    #[default]
    Off = 0,
    Size1 = 1,
    Size3 = 2,
    Size7 = 3,
    Size15 = 4,
    Size31 = 5,
    Size63 = 6,
    Size127 = 7,
}

impl Filter {
    pub fn from_u8(value: u8) -> Self {
        match value & 0x07 {
            0 => Filter::Off,
            1 => Filter::Size1,
            2 => Filter::Size3,
            3 => Filter::Size7,
            4 => Filter::Size15,
            5 => Filter::Size31,
            6 => Filter::Size63,
            _ => Filter::Size127,
        }
    }
}

/// Standby time between two measurement cycles (output data rate).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Odr {
    Ms0_59 = 0,
    Ms62_5 = 1,
    Ms125 = 2,
    Ms250 = 3,
    Ms500 = 4,
    Ms1000 = 5,
    Ms10 = 6,
    Ms20 = 7,
    /// No standby; the sensor starts the next cycle right away.
    #[default]
    None = 8,
}

impl Odr {
    fn from_bits(odr20: u8, odr3: bool) -> Self {
        if odr3 {
            return Odr::None;
        }
        match odr20 & 0x07 {
            0 => Odr::Ms0_59,
            1 => Odr::Ms62_5,
            2 => Odr::Ms125,
            3 => Odr::Ms250,
            4 => Odr::Ms500,
            5 => Odr::Ms1000,
            6 => Odr::Ms10,
            _ => Odr::Ms20,
        }
    }

    /// Splits the setting into the `odr<2:0>` field and the `odr<3>` flag.
    pub(crate) fn to_bits(self) -> (u8, bool) {
        match self {
            Odr::None => (0, true),
            other => (other as u8, false),
        }
    }

    pub(crate) fn decode(config_reg: u8, ctrl_gas_1: u8) -> Self {
        use crate::regs;
        Self::from_bits(
            regs::get_bits(config_reg, regs::ODR20_MSK, regs::ODR20_POS),
            regs::get_bits(ctrl_gas_1, regs::ODR3_MSK, regs::ODR3_POS) != 0,
        )
    }
}

/// Power mode of the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum OpMode {
    /// No measurements, minimal power draw.
    Sleep = 0,
    /// Single TPHG cycle, then back to sleep.
    Forced = 1,
    /// Continuous cycles stepping through the stored heater profile.
    Parallel = 2,
}

impl OpMode {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value & 0x03 {
            0 => Some(OpMode::Sleep),
            1 => Some(OpMode::Forced),
            2 => Some(OpMode::Parallel),
            // Sequential mode is not driven by this crate.
            _ => None,
        }
    }
}

/// Measurement configuration: oversampling, filter and output data rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    pub os_temp: Oversampling,
    pub os_pres: Oversampling,
    pub os_hum: Oversampling,
    pub filter: Filter,
    pub odr: Odr,
}

impl Default for Config {
    /// Humidity at 16x, temperature at 2x, pressure at 1x, no filter and no
    /// standby time.
    fn default() -> Self {
        Self {
            os_temp: Oversampling::X2,
            os_pres: Oversampling::X1,
            os_hum: Oversampling::X16,
            filter: Filter::Off,
            odr: Odr::None,
        }
    }
}

/// Builder for a [`Config`].
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn temp_oversampling(mut self, os: Oversampling) -> Self {
        self.config.os_temp = os;
        self
    }

    pub fn hum_oversampling(mut self, os: Oversampling) -> Self {
        self.config.os_hum = os;
        self
    }

    pub fn pres_oversampling(mut self, os: Oversampling) -> Self {
        self.config.os_pres = os;
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.config.filter = filter;
        self
    }

    pub fn odr(mut self, odr: Odr) -> Self {
        self.config.odr = odr;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

/// One step of a heater profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HeaterStep {
    /// Target temperature of the hot plate. Clamped to 400 °C when programmed.
    pub temp_c: Celsius,
    /// Parallel mode: multiple of the shared heater duration.
    /// Forced mode: heating time in milliseconds.
    pub duration: u16,
}

/// Ordered list of up to [`MAX_PROFILE_LEN`] heater steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaterProfile {
    steps: Vec<HeaterStep, MAX_PROFILE_LEN>,
}

impl HeaterProfile {
    /// Builds a profile from `(temperature °C, duration)` pairs.
    ///
    /// # Errors
    /// [`ConfigError::EmptyProfile`] for an empty slice and
    /// [`ConfigError::ProfileTooLong`] for more than ten steps.
    pub fn new(steps: &[(i16, u16)]) -> Result<Self, ConfigError> {
        if steps.is_empty() {
            return Err(ConfigError::EmptyProfile);
        }
        if steps.len() > MAX_PROFILE_LEN {
            return Err(ConfigError::ProfileTooLong(steps.len()));
        }

        let mut profile = Vec::new();
        for &(temp, duration) in steps {
            profile
                .push(HeaterStep {
                    temp_c: Celsius(temp),
                    duration,
                })
                .map_err(|_| ConfigError::ProfileTooLong(steps.len()))?;
        }

        Ok(Self { steps: profile })
    }

    /// Single step profile, the shape forced mode expects.
    pub fn single(temp: Celsius, duration_ms: u16) -> Self {
        let mut steps = Vec::new();
        // Capacity is ten, the first push cannot fail.
        let _ = steps.push(HeaterStep {
            temp_c: temp,
            duration: duration_ms,
        });
        Self { steps }
    }

    pub fn steps(&self) -> &[HeaterStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Number of parallel-mode cycles one complete pass through the profile takes.
    ///
    /// Every step occupies the heater for `duration` shared heater periods, so
    /// the pass is as long as the sum of all multipliers.
    pub fn cycle_count(&self) -> u32 {
        self.steps.iter().map(|s| s.duration as u32).sum()
    }
}

impl Default for HeaterProfile {
    /// Ten step profile alternating between 320 °C, 100 °C and 200 °C plateaus.
    fn default() -> Self {
        const TEMPS: [i16; MAX_PROFILE_LEN] = [320, 100, 100, 100, 200, 200, 200, 320, 320, 320];
        const MULTIPLIERS: [u16; MAX_PROFILE_LEN] = [5, 2, 10, 30, 5, 5, 5, 5, 5, 5];

        let mut steps = Vec::new();
        for (temp, duration) in TEMPS.into_iter().zip(MULTIPLIERS) {
            let _ = steps.push(HeaterStep {
                temp_c: Celsius(temp),
                duration,
            });
        }
        Self { steps }
    }
}

/// Gas heater configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaterConfig {
    /// `false` switches the heater off and stops gas conversions.
    pub enable: bool,
    pub profile: HeaterProfile,
    /// Parallel mode only: base heater duration every multiplier refers to.
    pub shared_duration_ms: u16,
}

impl HeaterConfig {
    pub fn disabled() -> Self {
        Self {
            enable: false,
            profile: HeaterProfile::single(Celsius(0), 0),
            shared_duration_ms: 0,
        }
    }
}

/// Everything the acquisition loop needs to know.
#[derive(Debug, Clone, PartialEq)]
pub struct AcquisitionConfig {
    pub sensor: Config,
    pub profile: HeaterProfile,
    /// Length of one parallel-mode cycle in milliseconds. The time left after
    /// the TPHG measurement becomes the shared heater duration.
    pub heater_budget_ms: u16,
    /// Altitude of the installation in metres, used to report sea-level pressure.
    pub altitude_m: f32,
    pub format: Format,
    /// Pause after a cycle that produced at least one record.
    pub update_interval_ms: Option<u32>,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            sensor: Config::default(),
            profile: HeaterProfile::default(),
            heater_budget_ms: 140,
            altitude_m: 0.0,
            format: Format::Compact,
            update_interval_ms: None,
        }
    }
}
