//! Field records: one TPHG measurement as the sensor stores it.
//!
//! In parallel mode the sensor keeps a ring of three field records. Each one
//! carries a sub-measurement index, the heater step it was taken at and a set
//! of status bits telling whether the gas reading is usable.

use heapless::Vec;

use crate::calc::CalibData;
use crate::{regs, Gas, Humidity, Pressure, Temperature, Variant};

/// New, unread data in the field.
pub const NEW_DATA: u8 = 0x80;
/// Gas conversion finished and is valid.
pub const GAS_VALID: u8 = 0x20;
/// The heater reached its target temperature during the gas conversion.
pub const HEAT_STAB: u8 = 0x10;
/// Status of a complete, trustworthy record.
pub const VALID_DATA: u8 = NEW_DATA | GAS_VALID | HEAT_STAB;

/// Uncompensated content of a field record.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub(crate) struct RawField {
    pub(crate) status: u8,
    pub(crate) gas_index: u8,
    pub(crate) meas_index: u8,
    pub(crate) press_adc: u32,
    pub(crate) temp_adc: u32,
    pub(crate) hum_adc: u16,
    pub(crate) gas_adc: u16,
    pub(crate) gas_range: u8,
}

impl RawField {
    /// Extracts ADC values and status bits from a 17 byte field record.
    ///
    /// The BME680 reports its gas result in bytes 13/14, the BME688 in 15/16.
    pub(crate) fn parse(buf: &[u8; regs::LEN_FIELD], variant: Variant) -> Self {
        let press_adc =
            ((buf[2] as u32) << 12) | ((buf[3] as u32) << 4) | ((buf[4] as u32) >> 4);
        let temp_adc =
            ((buf[5] as u32) << 12) | ((buf[6] as u32) << 4) | ((buf[7] as u32) >> 4);
        let hum_adc = ((buf[8] as u16) << 8) | buf[9] as u16;

        let (gas_msb, gas_lsb) = match variant {
            Variant::GasLow => (buf[13], buf[14]),
            Variant::GasHigh => (buf[15], buf[16]),
        };
        let gas_adc = ((gas_msb as u16) << 2) | ((gas_lsb as u16) >> 6);

        let status = (buf[0] & NEW_DATA) | (gas_lsb & GAS_VALID) | (gas_lsb & HEAT_STAB);

        RawField {
            status,
            gas_index: buf[0] & regs::GAS_INDEX_MSK,
            meas_index: buf[1],
            press_adc,
            temp_adc,
            hum_adc,
            gas_adc,
            gas_range: gas_lsb & regs::GAS_RANGE_MSK,
        }
    }

    pub(crate) fn is_new(&self) -> bool {
        self.status & NEW_DATA != 0
    }
}

/// Heater set-points as read back from `idac_heat_x`, `res_heat_x` and `gas_wait_x`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct SetPoints(pub(crate) [u8; regs::LEN_SET_POINTS]);

impl SetPoints {
    fn for_step(&self, gas_index: u8) -> (u8, u8, u8) {
        let i = gas_index.min(9) as usize;
        (self.0[i], self.0[10 + i], self.0[20 + i])
    }
}

/// One compensated measurement.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FieldData {
    /// Combination of [`NEW_DATA`], [`GAS_VALID`] and [`HEAT_STAB`].
    pub status: u8,
    /// Heater profile step the gas conversion ran at.
    pub gas_index: u8,
    /// Sub-measurement counter, wraps at 255.
    pub meas_index: u8,
    /// Heater resistance set-point of the step.
    pub res_heat: u8,
    /// Heater current set-point of the step.
    pub idac: u8,
    /// Heater duration of the step (a multiplier in parallel mode).
    pub gas_wait: u8,
    pub temperature: Temperature,
    pub pressure: Pressure,
    pub humidity: Humidity,
    pub gas_resistance: Gas,
}

impl FieldData {
    pub(crate) fn from_raw(
        raw: &RawField,
        set_points: (u8, u8, u8),
        calib: &CalibData,
        variant: Variant,
    ) -> Self {
        let (idac, res_heat, gas_wait) = set_points;
        let mut field = FieldData {
            status: raw.status,
            gas_index: raw.gas_index,
            meas_index: raw.meas_index,
            res_heat,
            idac,
            gas_wait,
            ..Default::default()
        };

        if raw.is_new() {
            let comp = calib.compensate(variant, raw);
            field.temperature = Temperature(comp.temperature as i32);
            field.pressure = Pressure(comp.pressure);
            field.humidity = Humidity(comp.humidity as i32);
            field.gas_resistance = Gas(comp.gas_resistance);
        }
        field
    }

    /// The record holds data that has not been read before.
    pub fn is_new(&self) -> bool {
        self.status & NEW_DATA != 0
    }

    /// New data with a valid gas conversion at a stable heater temperature.
    pub fn is_valid(&self) -> bool {
        self.status == VALID_DATA
    }
}

/// The new field records of one read, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fields {
    fields: Vec<FieldData, { regs::N_FIELDS }>,
}

impl Fields {
    pub(crate) fn none() -> Self {
        Self::default()
    }

    pub(crate) fn single(field: FieldData) -> Self {
        let mut fields = Vec::new();
        let _ = fields.push(field);
        Self { fields }
    }

    /// Orders all three records by sub-measurement index and keeps the new ones.
    pub(crate) fn from_ring(mut ring: [FieldData; regs::N_FIELDS]) -> Self {
        for low in 0..regs::N_FIELDS - 1 {
            for high in low + 1..regs::N_FIELDS {
                if comes_before(&ring[high], &ring[low]) {
                    ring.swap(low, high);
                }
            }
        }

        let mut fields = Vec::new();
        for field in ring.into_iter().filter(FieldData::is_new) {
            let _ = fields.push(field);
        }
        Self { fields }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldData> {
        self.fields.iter()
    }

    /// Records whose status is exactly [`VALID_DATA`].
    pub fn valid(&self) -> impl Iterator<Item = &FieldData> {
        self.fields.iter().filter(|f| f.is_valid())
    }

    pub fn as_slice(&self) -> &[FieldData] {
        &self.fields
    }
}

/// `true` if `a` has to be placed in front of `b`.
///
/// New records go before stale ones. Between two new records the
/// sub-measurement index decides, taking its wrap from 255 to 0 into account.
fn comes_before(a: &FieldData, b: &FieldData) -> bool {
    if a.is_new() && b.is_new() {
        let diff = a.meas_index as i16 - b.meas_index as i16;
        (-3 < diff && diff < 0) || diff > 2
    } else {
        a.is_new()
    }
}

/// Parses and compensates the three field records of a parallel-mode read.
pub(crate) fn parse_ring(
    buf: &[u8; regs::LEN_FIELD * regs::N_FIELDS],
    set_points: &SetPoints,
    calib: &CalibData,
    variant: Variant,
) -> [FieldData; regs::N_FIELDS] {
    let mut ring = [FieldData::default(); regs::N_FIELDS];
    for (slot, chunk) in ring.iter_mut().zip(buf.chunks_exact(regs::LEN_FIELD)) {
        let mut record = [0u8; regs::LEN_FIELD];
        record.copy_from_slice(chunk);
        let raw = RawField::parse(&record, variant);
        *slot = FieldData::from_raw(&raw, set_points.for_step(raw.gas_index), calib, variant);
    }
    ring
}
