//! BME68x register map (I2C addressing).

pub const ADDR_RES_HEAT_VAL: u8 = 0x00;
pub const ADDR_FIELD_0: u8 = 0x1D;
pub const ADDR_IDAC_HEAT_0: u8 = 0x50;
pub const ADDR_RES_HEAT_0: u8 = 0x5A;
pub const ADDR_GAS_WAIT_0: u8 = 0x64;
pub const ADDR_GAS_WAIT_SHARED: u8 = 0x6E;
pub const ADDR_CTRL_GAS_0: u8 = 0x70;
pub const ADDR_CTRL_GAS_1: u8 = 0x71;
pub const ADDR_CTRL_MEAS: u8 = 0x74;
pub const ADDR_COEFF_1: u8 = 0x8A;
pub const ADDR_CHIP_ID: u8 = 0xD0;
pub const ADDR_SOFT_RESET: u8 = 0xE0;
pub const ADDR_COEFF_2: u8 = 0xE1;
pub const ADDR_VARIANT_ID: u8 = 0xF0;

pub const CHIP_ID: u8 = 0x61;
pub const SOFT_RESET_CMD: u8 = 0xB6;

pub const LEN_COEFF_1: usize = 23;
pub const LEN_COEFF_2: usize = 14;
pub const LEN_COEFF_3: usize = 5;
pub const LEN_COEFF_ALL: usize = LEN_COEFF_1 + LEN_COEFF_2 + LEN_COEFF_3;

/// Bytes per field record.
pub const LEN_FIELD: usize = 17;
pub const N_FIELDS: usize = 3;
/// idac_heat_0..9, res_heat_0..9, gas_wait_0..9.
pub const LEN_SET_POINTS: usize = 30;
/// ctrl_gas_1 up to config.
pub const LEN_CONFIG: usize = 5;

pub const MODE_MSK: u8 = 0x03;
pub const FILTER_MSK: u8 = 0x1C;
pub const FILTER_POS: u8 = 2;
pub const ODR20_MSK: u8 = 0xE0;
pub const ODR20_POS: u8 = 5;
pub const ODR3_MSK: u8 = 0x80;
pub const ODR3_POS: u8 = 7;
pub const OST_MSK: u8 = 0xE0;
pub const OST_POS: u8 = 5;
pub const OSP_MSK: u8 = 0x1C;
pub const OSP_POS: u8 = 2;
pub const OSH_MSK: u8 = 0x07;
pub const HCTRL_MSK: u8 = 0x08;
pub const HCTRL_POS: u8 = 3;
pub const RUN_GAS_MSK: u8 = 0x30;
pub const RUN_GAS_POS: u8 = 4;
pub const NBCONV_MSK: u8 = 0x0F;

pub const GAS_INDEX_MSK: u8 = 0x0F;
pub const GAS_RANGE_MSK: u8 = 0x0F;

/// Sets the bits selected by `mask` in `reg` to `value << pos`.
pub(crate) const fn set_bits(reg: u8, mask: u8, pos: u8, value: u8) -> u8 {
    (reg & !mask) | ((value << pos) & mask)
}

/// Reads the bits selected by `mask` out of `reg`, shifted down by `pos`.
pub(crate) const fn get_bits(reg: u8, mask: u8, pos: u8) -> u8 {
    (reg & mask) >> pos
}
