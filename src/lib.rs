#![cfg_attr(not(test), no_std)]

//! # BME68x parallel-mode driver
//!
//! A type-safe, `no_std` driver for the Bosch BME680 and BME688 gas sensors
//! built on `embedded-hal` 1.0, with an acquisition loop that drives the
//! sensor through a multi-step heater profile in parallel mode.
//! The typestate pattern makes sure the calibration data is loaded before any
//! measurement is taken.
//!
//! ## Features
//! - **Parallel mode**: up to ten heater steps, each held for a multiple of a
//!   shared heater duration, with three field records buffered on the sensor.
//! - **Forced mode**: single TPHG cycle with one heater step.
//! - **Fixed-point arithmetic**: compensation needs no FPU.
//! - **Validity filtering**: only records with new data, a valid gas
//!   conversion and a stable heater reach the output.
//!
//! ## Units
//! - **Temperature**: Centigrade (C * 100) -> 2350 = 23.50 °C
//! - **Humidity**: Milli-percent (RH % * 1000) -> 45123 = 45.123 %
//! - **Pressure**: Pascal (Pa) -> 101325 = 1013.25 hPa
//! - **Gas Resistance**: Ohms (Ω)
//!
//! ## Example
//!
//! ```
//! # use embedded_hal_mock::eh1::i2c::{Mock, Transaction};
//! # use embedded_hal_mock::eh1::delay::NoopDelay;
//! # let mut calib = vec![0u8; 42];
//! # let i2c = Mock::new(&[
//! #     Transaction::write(0x76, vec![0xE0, 0xB6]),
//! #     Transaction::write_read(0x76, vec![0xD0], vec![0x61]),
//! #     Transaction::write_read(0x76, vec![0xF0], vec![0x01]),
//! #     Transaction::write_read(0x76, vec![0x8A], calib.drain(..23).collect()),
//! #     Transaction::write_read(0x76, vec![0xE1], calib.drain(..14).collect()),
//! #     Transaction::write_read(0x76, vec![0x00], calib.drain(..5).collect()),
//! # ]);
//! use bme688_parallel::{Address, Bme68x, Variant};
//!
//! let mut delay = NoopDelay::new();
//! let bme = Bme68x::new(i2c, Address::Primary).init(&mut delay)?;
//! assert_eq!(bme.variant(), Variant::GasHigh);
//! # bme.release().done();
//! # Ok::<(), bme688_parallel::error::Bme68xError<embedded_hal::i2c::ErrorKind>>(())
//! ```

// Must stay first so the logging macros are visible in every module.
mod fmt;

pub mod acquisition;
mod calc;
pub mod field;
mod regs;
pub mod report;
mod settings;

use core::marker::PhantomData;
use embedded_hal::{delay::DelayNs, i2c};

pub use acquisition::{Acquisition, Clock, Plan, Summary};
pub use calc::{measurement_duration, CalibData};
pub use field::{FieldData, Fields};
pub use report::{Format, Reporter};
pub use settings::*;

/// Reset settle time after the soft-reset command.
const PERIOD_RESET_US: u32 = 10_000;
/// Pause between two polls of the measurement status.
const PERIOD_POLL_US: u32 = 10_000;
/// Forced-mode polls before giving up on new data.
const POLL_TRIES: u8 = 5;
/// Attempts to bring the sensor into sleep mode.
const SLEEP_TRIES: u8 = 10;

// --- Typestates ---

/// Sensor has been created but not yet initialized with calibration data.
#[derive(Debug)]
pub struct Uninitialized;
/// Sensor is identified and its calibration data is loaded.
#[derive(Debug)]
pub struct Ready;

/// Error types for the BME68x driver.
pub mod error {
    /// Configuration values the sensor cannot store.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub enum ConfigError {
        /// A heater profile needs at least one step.
        EmptyProfile,
        /// The sensor has ten heater slots; the value is the requested length.
        ProfileTooLong(usize),
    }

    /// Errors that can occur during communication, configuration or output.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub enum Bme68xError<E> {
        /// I2C bus error.
        I2CError(E),
        /// The chip id register did not read 0x61; the value is what it read.
        DeviceNotFound(u8),
        /// Data was requested in a mode that does not measure (sleep).
        InvalidOpMode,
        /// Invalid heater or measurement configuration.
        Config(ConfigError),
        /// The sensor did not reach the requested state in time.
        Timeout,
        /// The output sink refused a record.
        Output,
    }

    impl<E> From<ConfigError> for Bme68xError<E> {
        fn from(err: ConfigError) -> Self {
            Bme68xError::Config(err)
        }
    }

    impl<E> From<core::fmt::Error> for Bme68xError<E> {
        fn from(_: core::fmt::Error) -> Self {
            Bme68xError::Output
        }
    }

    /// Result type alias for BME68x operations.
    pub type Result<T, E> = core::result::Result<T, Bme68xError<E>>;
}

/// I2C device address.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Address {
    /// SDO pin is connected to GND.
    Primary = 0x76,
    /// SDO pin is connected to V<sub>DDIO</sub>.
    Secondary = 0x77,
}

/// Gas sensor flavour, read from the variant id register.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Variant {
    /// BME680.
    #[default]
    GasLow,
    /// BME688.
    GasHigh,
}

impl Variant {
    fn from_id(id: u8) -> Self {
        if id == 0x01 {
            Variant::GasHigh
        } else {
            Variant::GasLow
        }
    }

    /// `run_gas` value that starts gas conversions on this variant.
    fn run_gas(self) -> u8 {
        match self {
            Variant::GasLow => 0b01,
            Variant::GasHigh => 0b10,
        }
    }
}

/// Whole degrees Celsius, used for heater targets and the ambient estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Celsius(pub i16);

/// Represents temperature in Centigrade (degrees Celsius * 100).
///
/// # Example
/// A value of `2350` represents **23.50 °C**.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Temperature(pub i32);

impl Temperature {
    /// Degrees Celsius as a float.
    ///
    /// ```rust
    /// use bme688_parallel::Temperature;
    /// let temp = Temperature(2350);
    /// assert_eq!(temp.celsius(), 23.5);
    /// ```
    pub fn celsius(&self) -> f32 {
        0.01 * self.0 as f32
    }
}

/// Represents relative humidity in milli-percent (percent * 1000).
///
/// # Example
/// A value of `45123` represents **45.123 %rH**.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Humidity(pub i32);

impl Humidity {
    /// Relative humidity in percent.
    pub fn percent(&self) -> f32 {
        0.001 * self.0 as f32
    }
}

/// Represents atmospheric pressure in Pascal (Pa).
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Pressure(pub u32);

impl Pressure {
    /// Converts the raw Pascal value to Hectopascal (hPa).
    ///
    /// ```rust
    /// use bme688_parallel::Pressure;
    /// let press = Pressure(101_325);
    /// assert!((press.hpa() - 1013.25).abs() < 1e-3);
    /// ```
    pub fn hpa(&self) -> f32 {
        0.01 * self.0 as f32
    }
}

/// Represents gas resistance in Ohms (Ω).
///
/// A higher gas resistance typically indicates cleaner air (fewer VOCs).
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Gas(pub u32);

/// The main BME68x driver structure.
///
/// Use `Bme68x::new(...)` to start. The `STATE` generic tracks the
/// initialization status at compile time.
#[derive(Debug)]
pub struct Bme68x<I2C, STATE> {
    i2c: I2C,
    address: u8,
    variant: Variant,
    calib_data: CalibData,
    /// Ambient temperature estimate used for the heater set-points.
    ambient_temp: Celsius,
    _state: PhantomData<STATE>,
}

impl<I2C, E> Bme68x<I2C, Uninitialized>
where
    I2C: i2c::I2c<Error = E>,
{
    /// Creates a new driver instance in the `Uninitialized` state.
    ///
    /// This does not communicate with the sensor yet.
    pub fn new(i2c: I2C, address: Address) -> Self {
        Bme68x {
            i2c,
            address: address as u8,
            variant: Variant::default(),
            calib_data: CalibData::default(),
            ambient_temp: Celsius(25),
            _state: PhantomData,
        }
    }

    /// Resets the sensor, checks its identity and loads the factory calibration.
    ///
    /// This transitions the driver state from `Uninitialized` to `Ready`.
    ///
    /// # Errors
    /// [`error::Bme68xError::DeviceNotFound`] if the chip id is not 0x61,
    /// otherwise any I2C failure.
    pub fn init(mut self, delay: &mut impl DelayNs) -> error::Result<Bme68x<I2C, Ready>, E> {
        self.soft_reset(delay)?;

        let chip_id = self.read_reg_byte(regs::ADDR_CHIP_ID)?;
        if chip_id != regs::CHIP_ID {
            error!("unexpected chip id {}", chip_id);
            return Err(error::Bme68xError::DeviceNotFound(chip_id));
        }

        let variant = Variant::from_id(self.read_reg_byte(regs::ADDR_VARIANT_ID)?);
        let calib_data = self.get_calib_data()?;
        debug!("sensor identified as {:?}", variant);

        Ok(Bme68x {
            i2c: self.i2c,
            address: self.address,
            variant,
            calib_data,
            ambient_temp: self.ambient_temp,
            _state: PhantomData,
        })
    }

    /// Reads the three calibration blocks back to back.
    fn get_calib_data(&mut self) -> error::Result<CalibData, E> {
        let mut buffer = [0u8; regs::LEN_COEFF_ALL];
        let (coeff1, rest) = buffer.split_at_mut(regs::LEN_COEFF_1);
        let (coeff2, coeff3) = rest.split_at_mut(regs::LEN_COEFF_2);

        self.read_into(regs::ADDR_COEFF_1, coeff1)?;
        self.read_into(regs::ADDR_COEFF_2, coeff2)?;
        self.read_into(regs::ADDR_RES_HEAT_VAL, coeff3)?;

        Ok(CalibData::from_bytes(&buffer))
    }
}

impl<I2C, STATE, E> Bme68x<I2C, STATE>
where
    I2C: i2c::I2c<Error = E>,
{
    /// Performs a soft-reset of the sensor.
    ///
    /// This resets all internal registers to their default values and waits
    /// 10 ms for the sensor to come back.
    pub fn soft_reset(&mut self, delay: &mut impl DelayNs) -> error::Result<(), E> {
        self.write_reg(&[regs::ADDR_SOFT_RESET, regs::SOFT_RESET_CMD])?;
        delay.delay_us(PERIOD_RESET_US);
        Ok(())
    }

    /// Destroys the driver and hands the bus back.
    pub fn release(self) -> I2C {
        self.i2c
    }

    /// Reads data from a starting register address into a provided buffer.
    fn read_into(&mut self, reg_address: u8, buffer: &mut [u8]) -> error::Result<(), E> {
        self.i2c
            .write_read(self.address, &[reg_address], buffer)
            .map_err(error::Bme68xError::I2CError)
    }

    /// Reads a single byte from a specific register address.
    fn read_reg_byte(&mut self, reg_address: u8) -> error::Result<u8, E> {
        let mut buffer = [0];
        self.read_into(reg_address, &mut buffer)?;
        Ok(buffer[0])
    }

    /// Writes `[register, value, register, value, ...]` in one transaction.
    fn write_reg(&mut self, data: &[u8]) -> error::Result<(), E> {
        self.i2c
            .write(self.address, data)
            .map_err(error::Bme68xError::I2CError)
    }
}

impl<I2C, E> Bme68x<I2C, Ready>
where
    I2C: i2c::I2c<Error = E>,
{
    /// Reads the chip id (expected value: 0x61).
    pub fn chip_id(&mut self) -> error::Result<u8, E> {
        self.read_reg_byte(regs::ADDR_CHIP_ID)
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    pub fn calibration(&self) -> &CalibData {
        &self.calib_data
    }

    /// Updates the ambient temperature used for the next heater configuration.
    pub fn set_ambient_temp(&mut self, temp: Celsius) {
        self.ambient_temp = temp;
    }

    pub fn ambient_temp(&self) -> Celsius {
        self.ambient_temp
    }

    /// Applies oversampling, filter and output data rate.
    ///
    /// The sensor only accepts configuration in sleep mode, so it is put to
    /// sleep first and returned to its previous mode afterwards.
    pub fn set_conf(&mut self, config: &Config, delay: &mut impl DelayNs) -> error::Result<(), E> {
        let current = self.get_op_mode()?;
        self.set_op_mode(OpMode::Sleep, delay)?;

        // ctrl_gas_1, ctrl_hum, (reserved), ctrl_meas, config
        let mut data = [0u8; regs::LEN_CONFIG];
        self.read_into(regs::ADDR_CTRL_GAS_1, &mut data)?;

        let (odr20, odr3) = config.odr.to_bits();
        data[4] = regs::set_bits(data[4], regs::FILTER_MSK, regs::FILTER_POS, config.filter as u8);
        data[4] = regs::set_bits(data[4], regs::ODR20_MSK, regs::ODR20_POS, odr20);
        data[0] = regs::set_bits(data[0], regs::ODR3_MSK, regs::ODR3_POS, odr3 as u8);
        data[3] = regs::set_bits(data[3], regs::OST_MSK, regs::OST_POS, config.os_temp as u8);
        data[3] = regs::set_bits(data[3], regs::OSP_MSK, regs::OSP_POS, config.os_pres as u8);
        data[1] = regs::set_bits(data[1], regs::OSH_MSK, 0, config.os_hum as u8);

        let mut burst = [0u8; regs::LEN_CONFIG * 2];
        for (i, value) in data.iter().enumerate() {
            burst[2 * i] = regs::ADDR_CTRL_GAS_1 + i as u8;
            burst[2 * i + 1] = *value;
        }
        self.write_reg(&burst)?;

        if current != OpMode::Sleep {
            self.set_op_mode(current, delay)?;
        }
        Ok(())
    }

    /// Reads the measurement configuration back from the sensor.
    pub fn get_conf(&mut self) -> error::Result<Config, E> {
        let mut data = [0u8; regs::LEN_CONFIG];
        self.read_into(regs::ADDR_CTRL_GAS_1, &mut data)?;

        Ok(Config {
            os_temp: Oversampling::from_u8(regs::get_bits(data[3], regs::OST_MSK, regs::OST_POS)),
            os_pres: Oversampling::from_u8(regs::get_bits(data[3], regs::OSP_MSK, regs::OSP_POS)),
            os_hum: Oversampling::from_u8(data[1] & regs::OSH_MSK),
            filter: Filter::from_u8(regs::get_bits(data[4], regs::FILTER_MSK, regs::FILTER_POS)),
            odr: Odr::decode(data[4], data[0]),
        })
    }

    /// Duration of one TPHG measurement in microseconds, see [`measurement_duration`].
    pub fn measurement_duration(&self, mode: OpMode, config: &Config) -> u32 {
        calc::measurement_duration(mode, config)
    }

    /// Programs the gas heater.
    ///
    /// In forced mode only the first profile step is used and its duration is
    /// in milliseconds. In parallel mode every step is written, the durations
    /// are multipliers of `shared_duration_ms`.
    ///
    /// # Errors
    /// [`error::ConfigError::EmptyProfile`] if an enabled heater has no steps.
    pub fn set_heater_conf(
        &mut self,
        mode: OpMode,
        config: &HeaterConfig,
        delay: &mut impl DelayNs,
    ) -> error::Result<(), E> {
        self.set_op_mode(OpMode::Sleep, delay)?;

        let steps = config.profile.steps();
        if config.enable && steps.is_empty() {
            return Err(error::ConfigError::EmptyProfile.into());
        }

        let nb_conv = if config.enable {
            match mode {
                OpMode::Forced => {
                    let step = steps[0];
                    let res_heat = self.calib_data.calc_res_heat(step.temp_c, self.ambient_temp);
                    self.write_reg(&[regs::ADDR_RES_HEAT_0, res_heat])?;
                    self.write_reg(&[regs::ADDR_GAS_WAIT_0, calc::heater_duration(step.duration)])?;
                    0
                }
                OpMode::Parallel => {
                    if config.shared_duration_ms == 0 {
                        warn!("shared heater duration is zero, gas readings will not stabilise");
                    }
                    self.write_reg(&[
                        regs::ADDR_GAS_WAIT_SHARED,
                        calc::shared_heater_duration(config.shared_duration_ms),
                    ])?;
                    self.write_profile(steps)?;
                    steps.len() as u8
                }
                OpMode::Sleep => return Err(error::Bme68xError::InvalidOpMode),
            }
        } else {
            0
        };

        let mut ctrl_gas = [0u8; 2];
        self.read_into(regs::ADDR_CTRL_GAS_0, &mut ctrl_gas)?;

        let (heater_off, run_gas) = if config.enable {
            (0, self.variant.run_gas())
        } else {
            (1, 0)
        };
        ctrl_gas[0] = regs::set_bits(ctrl_gas[0], regs::HCTRL_MSK, regs::HCTRL_POS, heater_off);
        ctrl_gas[1] = regs::set_bits(ctrl_gas[1], regs::NBCONV_MSK, 0, nb_conv);
        ctrl_gas[1] = regs::set_bits(ctrl_gas[1], regs::RUN_GAS_MSK, regs::RUN_GAS_POS, run_gas);

        self.write_reg(&[
            regs::ADDR_CTRL_GAS_0,
            ctrl_gas[0],
            regs::ADDR_CTRL_GAS_1,
            ctrl_gas[1],
        ])
    }

    /// Writes `res_heat_x` and `gas_wait_x` for every step of a parallel profile.
    fn write_profile(&mut self, steps: &[HeaterStep]) -> error::Result<(), E> {
        let mut res_heat = [0u8; 2 * MAX_PROFILE_LEN];
        let mut gas_wait = [0u8; 2 * MAX_PROFILE_LEN];

        for (i, step) in steps.iter().enumerate() {
            res_heat[2 * i] = regs::ADDR_RES_HEAT_0 + i as u8;
            res_heat[2 * i + 1] = self.calib_data.calc_res_heat(step.temp_c, self.ambient_temp);
            gas_wait[2 * i] = regs::ADDR_GAS_WAIT_0 + i as u8;
            // Parallel mode stores the multiplier itself.
            gas_wait[2 * i + 1] = step.duration.min(u8::MAX as u16) as u8;
        }

        let len = 2 * steps.len();
        self.write_reg(&res_heat[..len])?;
        self.write_reg(&gas_wait[..len])
    }

    /// Reads the current power mode.
    pub fn get_op_mode(&mut self) -> error::Result<OpMode, E> {
        let mode = self.read_reg_byte(regs::ADDR_CTRL_MEAS)? & regs::MODE_MSK;
        OpMode::from_u8(mode).ok_or(error::Bme68xError::InvalidOpMode)
    }

    /// Switches the power mode.
    ///
    /// The sensor is always taken through sleep mode first; a running cycle is
    /// given 10 ms to finish between attempts.
    ///
    /// # Errors
    /// [`error::Bme68xError::Timeout`] if the sensor refuses to go to sleep.
    pub fn set_op_mode(&mut self, mode: OpMode, delay: &mut impl DelayNs) -> error::Result<(), E> {
        let mut tries = SLEEP_TRIES;
        let ctrl_meas = loop {
            let ctrl_meas = self.read_reg_byte(regs::ADDR_CTRL_MEAS)?;
            if ctrl_meas & regs::MODE_MSK == OpMode::Sleep as u8 {
                break ctrl_meas;
            }
            if tries == 0 {
                return Err(error::Bme68xError::Timeout);
            }
            tries -= 1;

            self.write_reg(&[regs::ADDR_CTRL_MEAS, ctrl_meas & !regs::MODE_MSK])?;
            delay.delay_us(PERIOD_POLL_US);
        };

        if mode != OpMode::Sleep {
            let value = regs::set_bits(ctrl_meas, regs::MODE_MSK, 0, mode as u8);
            self.write_reg(&[regs::ADDR_CTRL_MEAS, value])?;
        }
        trace!("op mode set to {:?}", mode);
        Ok(())
    }

    /// Reads the measurement results of the given mode.
    ///
    /// Forced mode polls the first field record until it holds new data.
    /// Parallel mode reads all three records at once and returns the new ones
    /// ordered by sub-measurement index. No new data is not an error: the
    /// returned [`Fields`] is simply empty.
    pub fn get_data(&mut self, mode: OpMode, delay: &mut impl DelayNs) -> error::Result<Fields, E> {
        let fields = match mode {
            OpMode::Forced => self.read_field_data(delay)?,
            OpMode::Parallel => self.read_all_field_data()?,
            OpMode::Sleep => return Err(error::Bme68xError::InvalidOpMode),
        };

        if fields.is_empty() {
            debug!("no new data");
        }
        Ok(fields)
    }

    /// Polls field 0 until it reports new data.
    fn read_field_data(&mut self, delay: &mut impl DelayNs) -> error::Result<Fields, E> {
        for _ in 0..POLL_TRIES {
            let mut buf = [0u8; regs::LEN_FIELD];
            self.read_into(regs::ADDR_FIELD_0, &mut buf)?;
            let raw = field::RawField::parse(&buf, self.variant);

            if raw.is_new() {
                let step = raw.gas_index;
                let res_heat = self.read_reg_byte(regs::ADDR_RES_HEAT_0 + step)?;
                let idac = self.read_reg_byte(regs::ADDR_IDAC_HEAT_0 + step)?;
                let gas_wait = self.read_reg_byte(regs::ADDR_GAS_WAIT_0 + step)?;

                return Ok(Fields::single(FieldData::from_raw(
                    &raw,
                    (idac, res_heat, gas_wait),
                    &self.calib_data,
                    self.variant,
                )));
            }
            delay.delay_us(PERIOD_POLL_US);
        }
        Ok(Fields::none())
    }

    /// Reads the three field records and the heater set-points in two bursts.
    fn read_all_field_data(&mut self) -> error::Result<Fields, E> {
        let mut buf = [0u8; regs::LEN_FIELD * regs::N_FIELDS];
        self.read_into(regs::ADDR_FIELD_0, &mut buf)?;

        let mut set_points = [0u8; regs::LEN_SET_POINTS];
        self.read_into(regs::ADDR_IDAC_HEAT_0, &mut set_points)?;

        let ring = field::parse_ring(
            &buf,
            &field::SetPoints(set_points),
            &self.calib_data,
            self.variant,
        );
        Ok(Fields::from_ring(ring))
    }
}
