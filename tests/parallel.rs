use bme688_parallel::error::Bme68xError;
use bme688_parallel::{
    Acquisition, AcquisitionConfig, Address, Bme68x, Celsius, Clock, ConfigBuilder, Filter,
    Format, HeaterConfig, HeaterProfile, Odr, OpMode, Oversampling, Ready, Reporter, Summary,
    Variant,
};
use embedded_hal_mock::eh1::delay::{
    CheckedDelay, NoopDelay, Transaction as DelayTransaction,
};
use embedded_hal_mock::eh1::i2c::{Mock, Transaction};

const ADDR: u8 = 0x76;

const CALIB: [u8; 42] = [
    0xF2, 0x66, 0x03, 0x00, 0x0A, 0x8E, 0x75, 0xD7, 0x58, 0x00, 0x30, 0x1B, 0x94, 0xFF, 0x24, 0x1E,
    0x00, 0x00, 0xF6, 0xF4, 0xBE, 0xF8, 0x1E, 0x3F, 0x13, 0x30, 0x00, 0x2D, 0x14, 0x78, 0x9C, 0x56,
    0x65, 0xFC, 0xD1, 0xE2, 0x12, 0x28, 0x00, 0x10, 0x00, 0x00,
];

/// BME688 field record with T/P/H/G ADC counts of 500000/400000/25000/500.
fn record(gas_index: u8, meas_index: u8, gas_flags: u8) -> Vec<u8> {
    vec![
        0x80 | gas_index,
        meas_index,
        0x61,
        0xA8,
        0x00,
        0x7A,
        0x12,
        0x00,
        0x61,
        0xA8,
        0x00,
        0x00,
        0x00,
        0x00,
        0x00,
        0x7D,
        gas_flags | 0x05,
    ]
}

fn init_transactions() -> Vec<Transaction> {
    vec![
        Transaction::write(ADDR, vec![0xE0, 0xB6]),
        Transaction::write_read(ADDR, vec![0xD0], vec![0x61]),
        Transaction::write_read(ADDR, vec![0xF0], vec![0x01]),
        Transaction::write_read(ADDR, vec![0x8A], CALIB[..23].to_vec()),
        Transaction::write_read(ADDR, vec![0xE1], CALIB[23..37].to_vec()),
        Transaction::write_read(ADDR, vec![0x00], CALIB[37..].to_vec()),
    ]
}

fn ready(mut transactions: Vec<Transaction>) -> Bme68x<Mock, Ready> {
    let mut expected = init_transactions();
    expected.append(&mut transactions);
    Bme68x::new(Mock::new(&expected), Address::Primary)
        .init(&mut NoopDelay::new())
        .unwrap()
}

struct StepClock {
    now: u32,
    step: u32,
}

impl Clock for StepClock {
    fn now_ms(&mut self) -> u32 {
        self.now += self.step;
        self.now
    }
}

#[test]
fn init_reads_identity_and_calibration() {
    let bme = ready(vec![]);
    assert_eq!(bme.variant(), Variant::GasHigh);
    assert_eq!(bme.calibration().par_t1, 25942);
    assert_eq!(bme.calibration().par_gh2, -11780);
    assert_eq!(bme.ambient_temp(), Celsius(25));
    bme.release().done();
}

#[test]
fn init_rejects_foreign_chip() {
    let i2c = Mock::new(&[
        Transaction::write(ADDR, vec![0xE0, 0xB6]),
        Transaction::write_read(ADDR, vec![0xD0], vec![0x60]),
    ]);
    let mut check = i2c.clone();

    let err = Bme68x::new(i2c, Address::Primary)
        .init(&mut NoopDelay::new())
        .unwrap_err();
    assert_eq!(err, Bme68xError::DeviceNotFound(0x60));
    check.done();
}

#[test]
fn set_conf_restores_the_running_mode() {
    let mut bme = ready(vec![
        // current mode: parallel
        Transaction::write_read(ADDR, vec![0x74], vec![0x46]),
        // to sleep
        Transaction::write_read(ADDR, vec![0x74], vec![0x46]),
        Transaction::write(ADDR, vec![0x74, 0x44]),
        Transaction::write_read(ADDR, vec![0x74], vec![0x44]),
        Transaction::write_read(ADDR, vec![0x71], vec![0x80, 0x05, 0x00, 0x44, 0x00]),
        Transaction::write(
            ADDR,
            vec![0x71, 0x80, 0x72, 0x05, 0x73, 0x00, 0x74, 0x44, 0x75, 0x08],
        ),
        // back to parallel
        Transaction::write_read(ADDR, vec![0x74], vec![0x44]),
        Transaction::write(ADDR, vec![0x74, 0x46]),
    ]);

    let config = ConfigBuilder::new().filter(Filter::Size3).build();
    bme.set_conf(&config, &mut NoopDelay::new()).unwrap();
    bme.release().done();
}

#[test]
fn get_conf_decodes_registers() {
    let mut bme = ready(vec![Transaction::write_read(
        ADDR,
        vec![0x71],
        vec![0x80, 0x05, 0x00, 0x44, 0x08],
    )]);

    let config = bme.get_conf().unwrap();
    assert_eq!(config.os_temp, Oversampling::X2);
    assert_eq!(config.os_pres, Oversampling::X1);
    assert_eq!(config.os_hum, Oversampling::X16);
    assert_eq!(config.filter, Filter::Size3);
    assert_eq!(config.odr, Odr::None);
    bme.release().done();
}

#[test]
fn forced_heater_uses_first_step_in_milliseconds() {
    let mut bme = ready(vec![
        Transaction::write_read(ADDR, vec![0x74], vec![0x00]),
        Transaction::write(ADDR, vec![0x5A, 116]),
        Transaction::write(ADDR, vec![0x64, 0x65]),
        Transaction::write_read(ADDR, vec![0x70], vec![0x08, 0x00]),
        Transaction::write(ADDR, vec![0x70, 0x00, 0x71, 0x20]),
    ]);

    let heater = HeaterConfig {
        enable: true,
        profile: HeaterProfile::single(Celsius(320), 150),
        shared_duration_ms: 0,
    };
    bme.set_heater_conf(OpMode::Forced, &heater, &mut NoopDelay::new())
        .unwrap();
    bme.release().done();
}

#[test]
fn disabled_heater_stops_gas_conversions() {
    let mut bme = ready(vec![
        Transaction::write_read(ADDR, vec![0x74], vec![0x00]),
        Transaction::write_read(ADDR, vec![0x70], vec![0x00, 0x2A]),
        Transaction::write(ADDR, vec![0x70, 0x08, 0x71, 0x00]),
    ]);

    bme.set_heater_conf(
        OpMode::Parallel,
        &HeaterConfig::disabled(),
        &mut NoopDelay::new(),
    )
    .unwrap();
    bme.release().done();
}

#[test]
fn sleep_mode_has_no_data() {
    let mut bme = ready(vec![]);
    assert_eq!(
        bme.get_data(OpMode::Sleep, &mut NoopDelay::new()),
        Err(Bme68xError::InvalidOpMode)
    );
    bme.release().done();
}

#[test]
fn forced_read_polls_until_new_data() {
    let mut bme = ready(vec![
        Transaction::write_read(ADDR, vec![0x1D], vec![0; 17]),
        Transaction::write_read(ADDR, vec![0x1D], record(0, 0, 0x30)),
        Transaction::write_read(ADDR, vec![0x5A], vec![116]),
        Transaction::write_read(ADDR, vec![0x50], vec![0]),
        Transaction::write_read(ADDR, vec![0x64], vec![0x65]),
    ]);

    let fields = bme.get_data(OpMode::Forced, &mut NoopDelay::new()).unwrap();
    assert_eq!(fields.len(), 1);

    let field = fields.iter().next().unwrap();
    assert!(field.is_valid());
    assert_eq!(field.temperature.0, 2669);
    assert_eq!(field.pressure.0, 92_590);
    assert_eq!(field.humidity.0, 69_956);
    assert_eq!(field.gas_resistance.0, 2_017_700);
    assert_eq!(field.res_heat, 116);
    assert_eq!(field.gas_wait, 0x65);
    bme.release().done();
}

#[test]
fn forced_read_gives_up_after_five_polls() {
    let mut bme = ready(vec![
        Transaction::write_read(ADDR, vec![0x1D], vec![0; 17]);
        5
    ]);

    let fields = bme.get_data(OpMode::Forced, &mut NoopDelay::new()).unwrap();
    assert!(fields.is_empty());
    bme.release().done();
}

#[test]
fn sleep_waits_for_a_running_cycle() {
    let mut bme = ready(vec![
        Transaction::write_read(ADDR, vec![0x74], vec![0x46]),
        Transaction::write(ADDR, vec![0x74, 0x44]),
        Transaction::write_read(ADDR, vec![0x74], vec![0x46]),
        Transaction::write(ADDR, vec![0x74, 0x44]),
        Transaction::write_read(ADDR, vec![0x74], vec![0x44]),
    ]);

    bme.set_op_mode(OpMode::Sleep, &mut NoopDelay::new()).unwrap();
    bme.release().done();
}

#[test]
fn stuck_sensor_times_out() {
    let mut expected = Vec::new();
    for _ in 0..10 {
        expected.push(Transaction::write_read(ADDR, vec![0x74], vec![0x46]));
        expected.push(Transaction::write(ADDR, vec![0x74, 0x44]));
    }
    expected.push(Transaction::write_read(ADDR, vec![0x74], vec![0x46]));
    let mut bme = ready(expected);

    assert_eq!(
        bme.set_op_mode(OpMode::Sleep, &mut NoopDelay::new()),
        Err(Bme68xError::Timeout)
    );
    bme.release().done();
}

fn set_points() -> Vec<u8> {
    let mut values = vec![0u8; 30];
    values[10] = 116;
    values[11] = 85;
    values[20] = 1;
    values[21] = 1;
    values
}

#[test]
fn one_pass_emits_only_valid_records() {
    let mut ring = record(0, 1, 0x30);
    ring.extend_from_slice(&[0; 17]);
    ring.extend_from_slice(&record(1, 2, 0x20));

    let mut bme = ready(vec![
        // set_conf
        Transaction::write_read(ADDR, vec![0x74], vec![0x00]),
        Transaction::write_read(ADDR, vec![0x74], vec![0x00]),
        Transaction::write_read(ADDR, vec![0x71], vec![0x00; 5]),
        Transaction::write(
            ADDR,
            vec![0x71, 0x80, 0x72, 0x05, 0x73, 0x00, 0x74, 0x44, 0x75, 0x00],
        ),
        // set_heater_conf, shared duration 140 - 41 = 99 ms
        Transaction::write_read(ADDR, vec![0x74], vec![0x44]),
        Transaction::write(ADDR, vec![0x6E, 0x73]),
        Transaction::write(ADDR, vec![0x5A, 116, 0x5B, 85]),
        Transaction::write(ADDR, vec![0x64, 1, 0x65, 1]),
        Transaction::write_read(ADDR, vec![0x70], vec![0x00, 0x80]),
        Transaction::write(ADDR, vec![0x70, 0x00, 0x71, 0xA2]),
        // parallel mode
        Transaction::write_read(ADDR, vec![0x74], vec![0x44]),
        Transaction::write(ADDR, vec![0x74, 0x46]),
        // cycle 1: one valid record, one stale, one with an unstable heater
        Transaction::write_read(ADDR, vec![0x1D], ring),
        Transaction::write_read(ADDR, vec![0x50], set_points()),
        // cycle 2: nothing new
        Transaction::write_read(ADDR, vec![0x1D], vec![0; 51]),
        Transaction::write_read(ADDR, vec![0x50], set_points()),
        // back to sleep
        Transaction::write_read(ADDR, vec![0x74], vec![0x46]),
        Transaction::write(ADDR, vec![0x74, 0x44]),
        Transaction::write_read(ADDR, vec![0x74], vec![0x44]),
    ]);

    let acq = Acquisition::new(AcquisitionConfig {
        profile: HeaterProfile::new(&[(320, 1), (200, 1)]).unwrap(),
        update_interval_ms: Some(1000),
        ..Default::default()
    });
    let mut clock = StepClock { now: 0, step: 141 };
    let mut out = Reporter::from_config(String::new(), acq.config());
    // Every cycle waits 41590 us of TPHG plus 99 ms of heating. Only the
    // cycle that emitted is followed by the update interval.
    let mut delay = CheckedDelay::new(&[
        DelayTransaction::delay_us(140_590),
        DelayTransaction::delay_ms(1000),
        DelayTransaction::delay_us(140_590),
        DelayTransaction::delay_us(10_000),
    ]);

    let summary = acq.run(&mut bme, &mut delay, &mut clock, &mut out).unwrap();

    assert_eq!(
        summary,
        Summary {
            cycles: 2,
            emitted: 1
        }
    );
    assert_eq!(
        out.into_inner(),
        "TimeStamp(ms),Temp(deg C),Press(Pa),Hum(%),Gas(ohm)\n141,26.7,926,70,2017700\n"
    );
    delay.done();
    bme.release().done();
}

#[test]
fn verbose_cycle_reports_heater_bookkeeping() {
    let mut ring = record(1, 9, 0x30);
    ring.extend_from_slice(&record(0, 8, 0x30));
    ring.extend_from_slice(&[0; 17]);

    let mut bme = ready(vec![
        Transaction::write_read(ADDR, vec![0x1D], ring),
        Transaction::write_read(ADDR, vec![0x50], set_points()),
    ]);

    let acq = Acquisition::new(AcquisitionConfig {
        format: Format::Verbose,
        update_interval_ms: Some(1000),
        ..Default::default()
    });
    let plan = bme688_parallel::Plan {
        cycles: 1,
        period_us: 140_590,
        shared_duration_ms: 99,
    };
    let mut clock = StepClock { now: 1000, step: 0 };
    let mut out = Reporter::from_config(String::new(), acq.config());
    let mut delay = CheckedDelay::new(&[
        DelayTransaction::delay_us(140_590),
        DelayTransaction::delay_ms(1000),
    ]);

    let emitted = acq
        .cycle(&mut bme, &plan, &mut delay, &mut clock, &mut out)
        .unwrap();

    assert_eq!(emitted, 2);
    assert_eq!(
        out.into_inner(),
        "1000 ms, 26.7 deg C, 926 hPa, 70%, 2017700 Ohm, 1, 8, 0\n\
         1000 ms, 26.7 deg C, 926 hPa, 70%, 2017700 Ohm, 1, 9, 1\n"
    );
    delay.done();
    bme.release().done();
}

#[test]
fn quiet_cycle_skips_the_update_interval() {
    let mut bme = ready(vec![
        Transaction::write_read(ADDR, vec![0x1D], vec![0; 51]),
        Transaction::write_read(ADDR, vec![0x50], set_points()),
    ]);

    let acq = Acquisition::new(AcquisitionConfig {
        update_interval_ms: Some(1000),
        ..Default::default()
    });
    let plan = bme688_parallel::Plan {
        cycles: 1,
        period_us: 140_590,
        shared_duration_ms: 99,
    };
    let mut clock = StepClock { now: 0, step: 141 };
    let mut out = Reporter::from_config(String::new(), acq.config());
    let mut delay = CheckedDelay::new(&[DelayTransaction::delay_us(140_590)]);

    let emitted = acq
        .cycle(&mut bme, &plan, &mut delay, &mut clock, &mut out)
        .unwrap();

    assert_eq!(emitted, 0);
    assert!(out.into_inner().is_empty());
    delay.done();
    bme.release().done();
}
