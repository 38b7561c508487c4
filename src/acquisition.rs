//! Parallel-mode acquisition loop.
//!
//! One pass programs the heater profile, then polls the sensor once per
//! cycle until every step has been held for its full multiple of the shared
//! heater duration. Every cycle waits for a complete TPHG measurement plus
//! the shared heater duration before the field records are read.

use core::fmt::Write;

use embedded_hal::{delay::DelayNs, i2c};

use crate::report::Reporter;
use crate::settings::{AcquisitionConfig, HeaterConfig, OpMode};
use crate::{error, Bme68x, Ready};

/// Monotonic millisecond time source used to stamp the records.
pub trait Clock {
    /// Milliseconds since an arbitrary, fixed starting point (usually boot).
    fn now_ms(&mut self) -> u32;
}

/// Timing of a pass, derived when the sensor is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Plan {
    /// Cycles needed for one complete pass through the profile.
    pub cycles: u32,
    /// Wait before every read, in microseconds.
    pub period_us: u32,
    /// Heater duration every profile multiplier refers to.
    pub shared_duration_ms: u16,
}

/// Outcome of a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Summary {
    pub cycles: u32,
    /// Records that passed the validity filter and were written out.
    pub emitted: u32,
}

pub struct Acquisition {
    config: AcquisitionConfig,
}

impl Acquisition {
    pub fn new(config: AcquisitionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AcquisitionConfig {
        &self.config
    }

    /// Cycles one complete pass takes: the sum of all duration multipliers.
    pub fn cycle_count(&self) -> u32 {
        self.config.profile.cycle_count()
    }

    /// Wait before each read: one TPHG measurement plus the shared heater time.
    pub fn cycle_period_us(meas_dur_us: u32, shared_duration_ms: u16) -> u32 {
        meas_dur_us + shared_duration_ms as u32 * 1000
    }

    /// Heater time left in the cycle budget once the TPHG measurement is done.
    pub fn shared_duration_ms(&self, meas_dur_us: u32) -> u16 {
        let meas_ms = (meas_dur_us / 1000).min(u16::MAX as u32) as u16;
        self.config.heater_budget_ms.saturating_sub(meas_ms)
    }

    /// Configures the sensor and starts parallel mode.
    pub fn start<I2C, E>(
        &self,
        dev: &mut Bme68x<I2C, Ready>,
        delay: &mut impl DelayNs,
    ) -> error::Result<Plan, E>
    where
        I2C: i2c::I2c<Error = E>,
    {
        dev.set_conf(&self.config.sensor, delay)?;

        let meas_dur = dev.measurement_duration(OpMode::Parallel, &self.config.sensor);
        let shared_duration_ms = self.shared_duration_ms(meas_dur);

        let heater = HeaterConfig {
            enable: true,
            profile: self.config.profile.clone(),
            shared_duration_ms,
        };
        dev.set_heater_conf(OpMode::Parallel, &heater, delay)?;
        dev.set_op_mode(OpMode::Parallel, delay)?;

        let plan = Plan {
            cycles: self.cycle_count(),
            period_us: Self::cycle_period_us(meas_dur, shared_duration_ms),
            shared_duration_ms,
        };
        info!(
            "parallel mode: {} cycles of {} us, shared heater {} ms",
            plan.cycles,
            plan.period_us,
            plan.shared_duration_ms
        );
        Ok(plan)
    }

    /// Runs one cycle: wait, stamp, read and emit the valid records.
    ///
    /// Returns the number of records written.
    pub fn cycle<I2C, E, W>(
        &self,
        dev: &mut Bme68x<I2C, Ready>,
        plan: &Plan,
        delay: &mut impl DelayNs,
        clock: &mut impl Clock,
        out: &mut Reporter<W>,
    ) -> error::Result<u32, E>
    where
        I2C: i2c::I2c<Error = E>,
        W: Write,
    {
        delay.delay_us(plan.period_us);
        let timestamp = clock.now_ms();

        let fields = dev.get_data(OpMode::Parallel, delay)?;
        trace!("{} ms: {} new fields", timestamp, fields.len());

        let mut emitted = 0;
        for field in fields.valid() {
            out.record(timestamp, field)?;
            emitted += 1;
        }

        if emitted > 0 {
            if let Some(interval) = self.config.update_interval_ms {
                delay.delay_ms(interval);
            }
        }
        Ok(emitted)
    }

    /// One complete pass through the heater profile.
    ///
    /// Starts parallel mode, writes the header, runs [`Plan::cycles`] cycles
    /// and puts the sensor back to sleep.
    pub fn run<I2C, E, W>(
        &self,
        dev: &mut Bme68x<I2C, Ready>,
        delay: &mut impl DelayNs,
        clock: &mut impl Clock,
        out: &mut Reporter<W>,
    ) -> error::Result<Summary, E>
    where
        I2C: i2c::I2c<Error = E>,
        W: Write,
    {
        let plan = self.start(dev, delay)?;
        out.header()?;

        let mut summary = Summary {
            cycles: plan.cycles,
            emitted: 0,
        };
        for _ in 0..plan.cycles {
            summary.emitted += self.cycle(dev, &plan, delay, clock, out)?;
        }

        dev.set_op_mode(OpMode::Sleep, delay)?;
        debug!("pass done, {} records", summary.emitted);
        Ok(summary)
    }
}
