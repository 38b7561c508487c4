use crate::field::RawField;
use crate::settings::{Config, OpMode};
use crate::{regs, Celsius, Variant};

/// Constants and lookup tables provided by Bosch for the gas resistance
/// calculation of the low-range (BME680) gas sensor.
mod gas_constants {
    /// Base compensation table.
    pub static ARRAY1_INT: [u32; 16] = [
        2147483647, 2147483647, 2147483647, 2147483647, 2147483647, 2126008810, 2147483647,
        2130303777, 2147483647, 2147483647, 2143188679, 2136746228, 2147483647, 2126008810,
        2147483647, 2147483647,
    ];
    /// Range scaling table converting the ADC value into Ohm.
    pub static ARRAY2_INT: [u32; 16] = [
        4096000000, 2048000000, 1024000000, 512000000, 255744255, 127110228, 64000000, 32258064,
        16016016, 8000000, 4000000, 2000000, 1000000, 500000, 250000, 125000,
    ];
}

/// Factory-fused calibration coefficients.
///
/// Decoded once during `init` from the three non-contiguous calibration
/// blocks. See BME688 datasheet, section 3.11.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CalibData {
    pub par_t1: u16,
    pub par_t2: i16,
    pub par_t3: i8,
    pub par_p1: u16,
    pub par_p2: i16,
    pub par_p3: i8,
    pub par_p4: i16,
    pub par_p5: i16,
    pub par_p6: i8,
    pub par_p7: i8,
    pub par_p8: i16,
    pub par_p9: i16,
    pub par_p10: u8,
    pub par_h1: u16,
    pub par_h2: u16,
    pub par_h3: i8,
    pub par_h4: i8,
    pub par_h5: i8,
    pub par_h6: u8,
    pub par_h7: i8,
    pub par_gh1: i8,
    pub par_gh2: i16,
    pub par_gh3: i8,
    pub res_heat_val: i8,
    pub res_heat_range: u8,
    pub range_sw_err: i8,
}

/// Compensated temperature plus the fine resolution value that pressure and
/// humidity compensation depend on.
#[derive(Debug, Copy, Clone, Default)]
pub(crate) struct CalcTempData {
    pub(crate) temp_fine: i32,
    pub(crate) temp_comp: i16,
}

fn concat_i16(msb: u8, lsb: u8) -> i16 {
    i16::from_le_bytes([lsb, msb])
}

fn concat_u16(msb: u8, lsb: u8) -> u16 {
    u16::from_le_bytes([lsb, msb])
}

impl CalibData {
    /// Maps the 42 calibration bytes (blocks at 0x8A, 0xE1 and 0x00 read back
    /// to back) to compensation parameters.
    pub fn from_bytes(buf: &[u8; regs::LEN_COEFF_ALL]) -> Self {
        Self {
            par_t1: concat_u16(buf[32], buf[31]),
            par_t2: concat_i16(buf[1], buf[0]),
            par_t3: buf[2] as i8,
            par_p1: concat_u16(buf[5], buf[4]),
            par_p2: concat_i16(buf[7], buf[6]),
            par_p3: buf[8] as i8,
            par_p4: concat_i16(buf[11], buf[10]),
            par_p5: concat_i16(buf[13], buf[12]),
            par_p6: buf[15] as i8,
            par_p7: buf[14] as i8,
            par_p8: concat_i16(buf[19], buf[18]),
            par_p9: concat_i16(buf[21], buf[20]),
            par_p10: buf[22],
            // H1 and H2 share byte 24: H1 takes the low nibble, H2 the high one.
            par_h1: ((buf[25] as u16) << 4) | (buf[24] & 0x0F) as u16,
            par_h2: ((buf[23] as u16) << 4) | (buf[24] >> 4) as u16,
            par_h3: buf[26] as i8,
            par_h4: buf[27] as i8,
            par_h5: buf[28] as i8,
            par_h6: buf[29],
            par_h7: buf[30] as i8,
            par_gh1: buf[35] as i8,
            par_gh2: concat_i16(buf[34], buf[33]),
            par_gh3: buf[36] as i8,
            res_heat_val: buf[37] as i8,
            res_heat_range: (buf[39] & 0x30) >> 4,
            range_sw_err: ((buf[41] as i8) & (0xF0u8 as i8)) / 16,
        }
    }

    /// Converts the raw temperature ADC value into centi-degrees Celsius.
    ///
    /// This is the compensation everything else hangs on: `temp_fine` is a
    /// required input for pressure and humidity.
    pub(crate) fn calc_temp(&self, temp_adc: u32) -> CalcTempData {
        let var1 = ((temp_adc as i32) >> 3) - ((self.par_t1 as i32) << 1);
        let var2 = var1.wrapping_mul(self.par_t2 as i32) >> 11;
        let var3 = ((var1 >> 1).wrapping_mul(var1 >> 1)) >> 12;
        let var3 = var3.wrapping_mul((self.par_t3 as i32) << 4) >> 14;
        let temp_fine = var2.wrapping_add(var3);

        CalcTempData {
            temp_fine,
            temp_comp: ((temp_fine.wrapping_mul(5) + 128) >> 8) as i16,
        }
    }

    /// Converts the raw pressure ADC value into Pascal.
    pub(crate) fn calc_pres(&self, t_fine: i32, press_adc: u32) -> u32 {
        const PRES_OVF_CHECK: i32 = 1 << 30;

        let mut var1 = (t_fine >> 1) - 64_000;
        let mut var2 =
            ((((var1 >> 2).wrapping_mul(var1 >> 2)) >> 11).wrapping_mul(self.par_p6 as i32)) >> 2;
        var2 = var2.wrapping_add(var1.wrapping_mul(self.par_p5 as i32) << 1);
        var2 = (var2 >> 2).wrapping_add((self.par_p4 as i32) << 16);
        var1 = ((((var1 >> 2).wrapping_mul(var1 >> 2)) >> 13).wrapping_mul((self.par_p3 as i32) << 5)
            >> 3)
            .wrapping_add(((self.par_p2 as i32).wrapping_mul(var1)) >> 1);
        var1 >>= 18;
        var1 = (32768 + var1).wrapping_mul(self.par_p1 as i32) >> 15;

        // A zero divisor only happens with blank calibration data.
        if var1 == 0 {
            return 0;
        }

        let mut press_comp = 1_048_576i32.wrapping_sub(press_adc as i32);
        press_comp = press_comp.wrapping_sub(var2 >> 12).wrapping_mul(3125);

        if press_comp >= PRES_OVF_CHECK {
            press_comp = press_comp.wrapping_div(var1) << 1;
        } else {
            press_comp = (press_comp << 1).wrapping_div(var1);
        }

        let var1 = (self.par_p9 as i32)
            .wrapping_mul(((press_comp >> 3).wrapping_mul(press_comp >> 3)) >> 13)
            >> 12;
        let var2 = (press_comp >> 2).wrapping_mul(self.par_p8 as i32) >> 13;
        let var3 = (press_comp >> 8)
            .wrapping_mul(press_comp >> 8)
            .wrapping_mul(press_comp >> 8)
            .wrapping_mul(self.par_p10 as i32)
            >> 17;

        press_comp = press_comp.wrapping_add(
            (var1 + var2 + var3 + ((self.par_p7 as i32) << 7)) >> 4,
        );
        press_comp as u32
    }

    /// Converts the raw humidity ADC value into milli-percent, clamped to 0..=100 %.
    pub(crate) fn calc_hum(&self, t_fine: i32, hum_adc: u16) -> u32 {
        let temp_scaled = (t_fine.wrapping_mul(5) + 128) >> 8;

        let var1 = (hum_adc as i32)
            - ((self.par_h1 as i32) * 16)
            - (((temp_scaled * self.par_h3 as i32) / 100) >> 1);
        let var2 = ((self.par_h2 as i32).wrapping_mul(
            ((temp_scaled * self.par_h4 as i32) / 100)
                + (((temp_scaled.wrapping_mul((temp_scaled * self.par_h5 as i32) / 100)) >> 6)
                    / 100)
                + (1 << 14),
        )) >> 10;
        let var3 = var1.wrapping_mul(var2);
        let var4 = (((self.par_h6 as i32) << 7) + ((temp_scaled * self.par_h7 as i32) / 100)) >> 4;
        let var5 = ((var3 >> 14).wrapping_mul(var3 >> 14)) >> 10;
        let var6 = var4.wrapping_mul(var5) >> 1;

        let hum = ((var3.wrapping_add(var6) >> 10).wrapping_mul(1000)) >> 12;
        hum.clamp(0, 100_000) as u32
    }

    /// Gas resistance in Ohm for the low-range gas sensor (BME680).
    pub(crate) fn calc_gas_low(&self, gas_adc: u16, gas_range: u8) -> u32 {
        let range = (gas_range & regs::GAS_RANGE_MSK) as usize;

        // 64-bit intermediates keep extreme resistances from overflowing.
        let var1 = ((1340 + 5 * self.range_sw_err as i64) * gas_constants::ARRAY1_INT[range] as i64)
            >> 16;
        let var2 = ((gas_adc as i64) << 15) - (1 << 24) + var1;
        let var3 = (gas_constants::ARRAY2_INT[range] as i64 * var1) >> 9;

        if var2 == 0 {
            return 0;
        }
        ((var3 + (var2 >> 1)) / var2) as u32
    }

    /// Gas resistance in Ohm for the high-range gas sensor (BME688).
    pub(crate) fn calc_gas_high(&self, gas_adc: u16, gas_range: u8) -> u32 {
        let var1 = 262_144u32 >> (gas_range & regs::GAS_RANGE_MSK);
        let var2 = 4096 + ((gas_adc as i32) - 512) * 3;

        (10_000 * var1 / var2 as u32) * 100
    }

    pub(crate) fn calc_gas(&self, variant: Variant, gas_adc: u16, gas_range: u8) -> u32 {
        match variant {
            Variant::GasLow => self.calc_gas_low(gas_adc, gas_range),
            Variant::GasHigh => self.calc_gas_high(gas_adc, gas_range),
        }
    }

    /// Computes the 8-bit heater resistance set-point for a target temperature.
    ///
    /// The target is clamped to 400 °C to protect the sensor membrane.
    pub(crate) fn calc_res_heat(&self, target: Celsius, ambient: Celsius) -> u8 {
        let target = (target.0 as i32).clamp(0, 400);
        let ambient = ambient.0 as i32;

        let var1 = ((ambient * self.par_gh3 as i32) / 1000) * 256;
        let var2 = (self.par_gh1 as i32 + 784)
            * (((((self.par_gh2 as i32 + 154_009) * target * 5) / 100) + 3_276_800) / 10);
        let var3 = var1 + (var2 / 2);
        let var4 = var3 / (self.res_heat_range as i32 + 4);
        let var5 = 131 * (self.res_heat_val as i32) + 65536;
        let res_heat_x100 = ((var4 / var5) - 250) * 34;

        ((res_heat_x100 + 50) / 100) as u8
    }

    /// Compensates a raw field record into physical units.
    pub(crate) fn compensate(&self, variant: Variant, raw: &RawField) -> Compensated {
        let temp = self.calc_temp(raw.temp_adc);
        Compensated {
            temperature: temp.temp_comp,
            pressure: self.calc_pres(temp.temp_fine, raw.press_adc),
            humidity: self.calc_hum(temp.temp_fine, raw.hum_adc),
            gas_resistance: self.calc_gas(variant, raw.gas_adc, raw.gas_range),
        }
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub(crate) struct Compensated {
    pub(crate) temperature: i16,
    pub(crate) pressure: u32,
    pub(crate) humidity: u32,
    pub(crate) gas_resistance: u32,
}

/// Encodes a forced-mode heater duration.
///
/// The hardware stores the time as a 6 bit mantissa and a 2 bit multiplier
/// (1, 4, 16 or 64 ms steps). Durations of 4032 ms and above saturate.
pub(crate) fn heater_duration(duration_ms: u16) -> u8 {
    if duration_ms >= 0xFC0 {
        return 0xFF;
    }

    let mut dur = duration_ms;
    let mut factor = 0u8;
    while dur > 0x3F {
        dur /= 4;
        factor += 1;
    }
    dur as u8 + factor * 64
}

/// Encodes the parallel-mode shared heater duration in 0.477 ms steps.
pub(crate) fn shared_heater_duration(duration_ms: u16) -> u8 {
    if duration_ms >= 0x783 {
        return 0xFF;
    }

    let mut dur = ((duration_ms as u32 * 1000) / 477) as u16;
    let mut factor = 0u8;
    while dur > 0x3F {
        dur >>= 2;
        factor += 1;
    }
    dur as u8 + factor * 64
}

/// Duration of one TPHG measurement in microseconds.
///
/// Parallel mode keeps the sensor awake, every other mode pays an extra 1 ms
/// wake-up.
pub fn measurement_duration(mode: OpMode, config: &Config) -> u32 {
    let meas_cycles =
        config.os_temp.cycles() + config.os_pres.cycles() + config.os_hum.cycles();

    let mut meas_dur = meas_cycles * 1963;
    // TPH switching
    meas_dur += 477 * 4;
    // Gas measurement
    meas_dur += 477 * 5;

    if mode != OpMode::Parallel {
        meas_dur += 1000;
    }
    meas_dur
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::settings::Oversampling;

    /// Calibration bytes of a BME688 (0x8A..0xA0, 0xE1..0xEE, 0x00..0x04).
    pub(crate) const CALIB_BYTES: [u8; regs::LEN_COEFF_ALL] = [
        0xF2, 0x66, 0x03, 0x00, 0x0A, 0x8E, 0x75, 0xD7, 0x58, 0x00, 0x30, 0x1B, 0x94, 0xFF, 0x24,
        0x1E, 0x00, 0x00, 0xF6, 0xF4, 0xBE, 0xF8, 0x1E, 0x3F, 0x13, 0x30, 0x00, 0x2D, 0x14, 0x78,
        0x9C, 0x56, 0x65, 0xFC, 0xD1, 0xE2, 0x12, 0x28, 0x00, 0x10, 0x00, 0x00,
    ];

    pub(crate) fn calib() -> CalibData {
        CalibData::from_bytes(&CALIB_BYTES)
    }

    #[test]
    fn decodes_calibration_layout() {
        let c = calib();
        assert_eq!(c.par_t1, 25942);
        assert_eq!(c.par_t2, 26354);
        assert_eq!(c.par_t3, 3);
        assert_eq!(c.par_p1, 36362);
        assert_eq!(c.par_p2, -10379);
        assert_eq!(c.par_p3, 88);
        assert_eq!(c.par_p4, 6960);
        assert_eq!(c.par_p5, -108);
        assert_eq!(c.par_p6, 30);
        assert_eq!(c.par_p7, 36);
        assert_eq!(c.par_p8, -2826);
        assert_eq!(c.par_p9, -1858);
        assert_eq!(c.par_p10, 30);
        assert_eq!(c.par_h1, 771);
        assert_eq!(c.par_h2, 1009);
        assert_eq!(c.par_h4, 45);
        assert_eq!(c.par_h5, 20);
        assert_eq!(c.par_h6, 120);
        assert_eq!(c.par_h7, -100);
        assert_eq!(c.par_gh1, -30);
        assert_eq!(c.par_gh2, -11780);
        assert_eq!(c.par_gh3, 18);
        assert_eq!(c.res_heat_val, 40);
        assert_eq!(c.res_heat_range, 1);
        assert_eq!(c.range_sw_err, 0);
    }

    #[test]
    fn range_switching_error_is_signed() {
        let mut bytes = CALIB_BYTES;
        bytes[41] = 0xF0;
        assert_eq!(CalibData::from_bytes(&bytes).range_sw_err, -1);
        bytes[41] = 0x3F;
        assert_eq!(CalibData::from_bytes(&bytes).range_sw_err, 3);
    }

    #[test]
    fn compensates_tph() {
        let c = calib();
        let temp = c.calc_temp(500_000);
        assert_eq!(temp.temp_fine, 136_628);
        assert_eq!(temp.temp_comp, 2669);
        assert_eq!(c.calc_pres(temp.temp_fine, 400_000), 92_590);
        assert_eq!(c.calc_hum(temp.temp_fine, 25_000), 69_956);
    }

    #[test]
    fn humidity_is_clamped() {
        let c = calib();
        let t_fine = c.calc_temp(500_000).temp_fine;
        assert_eq!(c.calc_hum(t_fine, 0), 0);
        assert_eq!(c.calc_hum(t_fine, u16::MAX), 100_000);
    }

    #[test]
    fn blank_calibration_does_not_divide_by_zero() {
        let c = CalibData::default();
        assert_eq!(c.calc_pres(0, 400_000), 0);
    }

    #[test]
    fn gas_resistance_per_variant() {
        let c = calib();
        assert_eq!(c.calc_gas(Variant::GasLow, 500, 5), 250_528);
        assert_eq!(c.calc_gas(Variant::GasHigh, 500, 5), 2_017_700);
        assert_eq!(c.calc_gas(Variant::GasHigh, 600, 4), 3_757_700);
    }

    #[test]
    fn heater_resistance_set_points() {
        let c = calib();
        let ambient = Celsius(25);
        assert_eq!(c.calc_res_heat(Celsius(320), ambient), 116);
        assert_eq!(c.calc_res_heat(Celsius(200), ambient), 85);
        assert_eq!(c.calc_res_heat(Celsius(100), ambient), 59);
        // Clamped to 400 °C.
        assert_eq!(
            c.calc_res_heat(Celsius(450), ambient),
            c.calc_res_heat(Celsius(400), ambient)
        );
    }

    #[test]
    fn forced_heater_duration_encoding() {
        assert_eq!(heater_duration(63), 63);
        assert_eq!(heater_duration(100), 0x59);
        assert_eq!(heater_duration(150), 0x65);
        assert_eq!(heater_duration(4032), 0xFF);
    }

    #[test]
    fn shared_heater_duration_encoding() {
        assert_eq!(shared_heater_duration(0), 0);
        assert_eq!(shared_heater_duration(99), 0x73);
        assert_eq!(shared_heater_duration(30), 0x3E);
        assert_eq!(shared_heater_duration(0x783), 0xFF);
    }

    #[test]
    fn measurement_duration_per_mode() {
        let config = Config::default();
        assert_eq!(measurement_duration(OpMode::Parallel, &config), 41_590);
        assert_eq!(measurement_duration(OpMode::Forced, &config), 42_590);

        let skipped = Config {
            os_temp: Oversampling::Skipped,
            os_pres: Oversampling::Skipped,
            os_hum: Oversampling::Skipped,
            ..config
        };
        assert_eq!(measurement_duration(OpMode::Parallel, &skipped), 477 * 9);
    }
}
