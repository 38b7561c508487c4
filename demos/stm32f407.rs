//! Example: continuous parallel-mode telemetry from a BME688 on an STM32F407.
//!
//! This example demonstrates:
//! 1. **Initialization**: Setting up I2C and the BME68x driver.
//! 2. **Configuration**: Oversampling, filter and a ten step heater profile.
//! 3. **Acquisition**: Running complete profile passes in parallel mode and
//!    streaming every valid record over RTT.
//!
//! Build with `--features demo --target thumbv7em-none-eabihf`.

#![no_main]
#![no_std]
#![deny(unsafe_code)]

use bme688_parallel::*;
use core::fmt::Write;
use cortex_m::peripheral::DWT;
use defmt_rtt as _;
use heapless::String;
use panic_probe as _;
use stm32f4xx_hal::{self as hal, prelude::*};

const SYSCLK_HZ: u32 = 168_000_000;
/// Height of the installation above sea level.
const ALTITUDE_M: f32 = 520.0;

/// Millisecond clock on top of the 32-bit DWT cycle counter.
///
/// The counter wraps after ~25 s at 168 MHz; every cycle of the acquisition
/// loop is far shorter, so the wraps are accumulated here.
struct DwtClock {
    last: u32,
    cycles: u64,
}

impl DwtClock {
    fn new() -> Self {
        Self {
            last: DWT::cycle_count(),
            cycles: 0,
        }
    }
}

impl Clock for DwtClock {
    fn now_ms(&mut self) -> u32 {
        let now = DWT::cycle_count();
        self.cycles += now.wrapping_sub(self.last) as u64;
        self.last = now;
        (self.cycles / (SYSCLK_HZ as u64 / 1000)) as u32
    }
}

/// Line buffer flushed through defmt after every record.
struct RttLines {
    line: String<128>,
}

impl Write for RttLines {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        for c in s.chars() {
            if c == '\n' {
                defmt::println!("{=str}", self.line.as_str());
                self.line.clear();
            } else {
                self.line.push(c).map_err(|_| core::fmt::Error)?;
            }
        }
        Ok(())
    }
}

#[cortex_m_rt::entry]
fn main() -> ! {
    // --- 1. Hardware Setup ---
    let dp = hal::pac::Peripherals::take().unwrap();
    let mut cp = cortex_m::Peripherals::take().unwrap();
    let clock_cfg = hal::rcc::Config::default().sysclk(168.MHz());
    let mut rcc = dp.RCC.freeze(clock_cfg);

    cp.DCB.enable_trace();
    cp.DWT.enable_cycle_counter();

    // Setup I2C1 (SCL on PB6, SDA on PB7)
    let gpiob = dp.GPIOB.split(&mut rcc);
    let scl = gpiob.pb6.into_open_drain_output();
    let sda = gpiob.pb7.into_open_drain_output();

    let i2c = hal::i2c::I2c1::new(
        dp.I2C1,
        (scl, sda),
        hal::i2c::Mode::Standard {
            frequency: 100.kHz().into(),
        },
        &mut rcc,
    );

    let mut delay = dp.TIM6.delay_us(&mut rcc);

    // --- 2. Driver Initialization ---
    let mut bme = Bme68x::new(i2c, Address::Primary)
        .init(&mut delay)
        .expect("Failed to initialize BME68x");
    defmt::info!("found {}", bme.variant());

    // --- 3. Acquisition Configuration ---
    let config = AcquisitionConfig {
        sensor: ConfigBuilder::new()
            .temp_oversampling(Oversampling::X2)
            .pres_oversampling(Oversampling::X1)
            .hum_oversampling(Oversampling::X16)
            .filter(Filter::Off)
            .odr(Odr::None)
            .build(),
        profile: HeaterProfile::default(),
        heater_budget_ms: 140,
        altitude_m: ALTITUDE_M,
        format: Format::Verbose,
        update_interval_ms: None,
    };
    let acquisition = Acquisition::new(config);

    let mut clock = DwtClock::new();
    let mut out = Reporter::from_config(
        RttLines {
            line: String::new(),
        },
        acquisition.config(),
    );

    // --- 4. Measurement Loop ---
    loop {
        match acquisition.run(&mut bme, &mut delay, &mut clock, &mut out) {
            Ok(summary) => defmt::info!(
                "pass: {} cycles, {} records",
                summary.cycles,
                summary.emitted
            ),
            Err(e) => {
                defmt::error!("pass failed: {}", e);
                delay.delay_ms(1000);
            }
        }
    }
}
