/*!
Versioned field layouts of the CTid table.

Each table version is described by ordered lists of field descriptors. The
same lists drive [`encode_fields`] and [`decode_fields`], so field order, which
is part of the wire contract, exists in exactly one place.
*/

use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};

use crate::crc::Checksum;
use crate::error::{CtidError, Result};
use crate::fixed::{
    decimal16, fix, float12, pack_quad, sign_extend, undecimal16, unfix, unfloat12, unpack_quad,
    QUAD_SCALE,
};
use crate::table::{Adjust, SensorType, Table};

/// Scale of the 8-bit calibration entries used up to version 4
const CAL_BYTE_SCALE: f64 = 0.02;

/// CTid table format version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum FormatVersion {
    V1 = 1,
    V2 = 2,
    V3 = 3,
    V4 = 4,
    V5 = 5,
}

impl FormatVersion {
    /// Latest version this codec produces by default
    pub const LATEST: Self = Self::V5;

    /// Version number as stored in the first table byte
    pub fn number(self) -> u8 {
        self as u8
    }

    /// Table length in bytes, excluding checksum and start symbol
    pub fn table_len(self) -> usize {
        match self {
            Self::V1 => 30,
            Self::V2 | Self::V3 => 33,
            Self::V4 | Self::V5 => 43,
        }
    }

    /// Checksum used by this version
    pub fn checksum(self) -> Checksum {
        match self {
            Self::V1 => Checksum::Crc8Rohc,
            _ => Checksum::Crc16Modbus,
        }
    }

    /// Table length including the checksum
    pub fn frame_len(self) -> usize {
        self.table_len() + self.checksum().width()
    }

    /// Size of the model-name field
    pub fn model_len(self) -> usize {
        match self {
            Self::V4 | Self::V5 => 8,
            _ => 4,
        }
    }

    /// Whether the version has a sensor-type specific parameter block
    pub fn has_param_block(self) -> bool {
        self >= Self::V3
    }

    /// Field segments following the version byte
    pub(crate) fn header(self) -> &'static [&'static [Field]] {
        match self {
            Self::V1 => &[LEGACY_HEAD, CAL_BYTES, LEGACY_TAIL],
            Self::V2 => &[LEGACY_HEAD, CAL_BYTES, LEGACY_TAIL, RESISTANCES],
            Self::V3 => &[V3_HEAD, RESISTANCES, RESERVED],
            Self::V4 | Self::V5 => &[V4_HEAD, RESISTANCES],
        }
    }

    /// Field segments of the parameter block for `sensor_type`
    pub(crate) fn params(self, sensor_type: SensorType) -> &'static [&'static [Field]] {
        if !self.has_param_block() {
            return &[];
        }
        match sensor_type {
            SensorType::Ac | SensorType::Dc | SensorType::Rc => {
                if self >= Self::V5 {
                    &[CT_HEAD, CAL_QUADS, CT_TAIL]
                } else {
                    &[CT_HEAD, CAL_BYTES, CT_TAIL]
                }
            }
            SensorType::Linear => &[BASIC_LINEAR, LINEAR],
            SensorType::TempLinear => &[BASIC_LINEAR],
            SensorType::TempNtc => {
                if self == Self::V3 {
                    &[NTC_ABCM, NTC_R1]
                } else {
                    &[NTC_ABCM, NTC_NK]
                }
            }
            SensorType::Pulse => &[PULSE],
        }
    }
}

impl TryFrom<u8> for FormatVersion {
    type Error = CtidError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Self::V1),
            2 => Ok(Self::V2),
            3 => Ok(Self::V3),
            4 => Ok(Self::V4),
            5 => Ok(Self::V5),
            other => Err(CtidError::UnsupportedVersion(other)),
        }
    }
}

impl From<FormatVersion> for u8 {
    fn from(version: FormatVersion) -> u8 {
        version.number()
    }
}

/// Scalar table attribute addressed by a field descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Param {
    MfgId,
    SerialNumber,
    SensorType,
    Reserved,
    MfgInfo,
    RSource,
    RLoad,
    Size,
    RatedCurrent,
    VoltageAtRatedCurrent,
    PhaseAtRatedCurrent,
    VoltageTempCoeff,
    PhaseTempCoeff,
    BiasVoltage,
    Scale,
    Offset,
    Delay,
    SensorUnit,
    NtcA,
    NtcB,
    NtcC,
    NtcM,
    NtcN,
    NtcK,
    NtcR1,
    Threshold,
    Hysteresis,
    DebounceTime,
    EdgeMask,
}

impl Param {
    pub(crate) fn name(self) -> &'static str {
        match self {
            Self::MfgId => "mfg_id",
            Self::SerialNumber => "serial_number",
            Self::SensorType => "sensor_type",
            Self::Reserved => "reserved",
            Self::MfgInfo => "mfg_info",
            Self::RSource => "r_source",
            Self::RLoad => "r_load",
            Self::Size => "size",
            Self::RatedCurrent => "rated_current",
            Self::VoltageAtRatedCurrent => "voltage_at_rated_current",
            Self::PhaseAtRatedCurrent => "phase_at_rated_current",
            Self::VoltageTempCoeff => "voltage_temp_coeff",
            Self::PhaseTempCoeff => "phase_temp_coeff",
            Self::BiasVoltage => "bias_voltage",
            Self::Scale => "scale",
            Self::Offset => "offset",
            Self::Delay => "delay",
            Self::SensorUnit => "sensor_unit",
            Self::NtcA => "ntc_a",
            Self::NtcB => "ntc_b",
            Self::NtcC => "ntc_c",
            Self::NtcM => "ntc_m",
            Self::NtcN => "ntc_n",
            Self::NtcK => "ntc_k",
            Self::NtcR1 => "ntc_r1",
            Self::Threshold => "threshold",
            Self::Hysteresis => "hysteresis",
            Self::DebounceTime => "debounce_time",
            Self::EdgeMask => "edge_mask",
        }
    }
}

/// A fixed-point attribute: which parameter, its resolution and unit
#[derive(Debug, Clone, Copy)]
pub(crate) struct Scalar {
    param: Param,
    scale: f64,
    unit: &'static str,
}

const fn scaled(param: Param, scale: f64, unit: &'static str) -> Scalar {
    Scalar { param, scale, unit }
}

const fn plain(param: Param) -> Scalar {
    Scalar { param, scale: 1.0, unit: "" }
}

/// One wire field
#[derive(Debug, Clone, Copy)]
pub(crate) enum Field {
    /// Unsigned 2 bits in the top of a byte
    U2(Scalar),
    U8(Scalar),
    S8(Scalar),
    U16(Scalar),
    S16(Scalar),
    /// Signed 12 bits in the top of a 16-bit word
    S12(Scalar),
    U24(Scalar),
    /// Unsigned nibble and signed 12 bits sharing a 16-bit word
    U4S12(Scalar, Scalar),
    /// Two 12-bit floats in 3 bytes
    F12Pair(Param, Param, &'static str),
    D16(Param, &'static str),
    F32(Param),
    /// NUL-padded UTF-8 of the given size
    Model(usize),
    /// One 8-bit calibration adjustment
    CalByte(usize, Adjust),
    /// Both adjustments of two calibration rows as 10-bit values in 5 bytes
    CalQuad([usize; 2]),
}

impl Field {
    /// Encoded size in bytes
    pub(crate) fn len(&self) -> usize {
        match self {
            Self::U2(_) | Self::U8(_) | Self::S8(_) | Self::CalByte(..) => 1,
            Self::U16(_) | Self::S16(_) | Self::S12(_) | Self::U4S12(..) | Self::D16(..) => 2,
            Self::U24(_) | Self::F12Pair(..) => 3,
            Self::F32(_) => 4,
            Self::CalQuad(_) => 5,
            Self::Model(len) => *len,
        }
    }
}

/// Total size of a list of segments
pub(crate) fn segments_len(segments: &[&[Field]]) -> usize {
    segments.iter().flat_map(|s| s.iter()).map(Field::len).sum()
}

const LEGACY_HEAD: &[Field] = &[
    Field::U16(plain(Param::MfgId)),
    Field::Model(4),
    Field::U16(scaled(Param::Size, 0.1, "mm")),
    Field::U24(plain(Param::SerialNumber)),
    Field::U16(scaled(Param::RatedCurrent, 0.1, "A")),
    Field::U16(scaled(Param::VoltageAtRatedCurrent, 10e-6, "V")),
    Field::U4S12(plain(Param::SensorType), scaled(Param::PhaseAtRatedCurrent, 0.01, "°")),
    Field::S8(scaled(Param::VoltageTempCoeff, 5.0, "ppm/°C")),
    Field::S8(scaled(Param::PhaseTempCoeff, 0.5, "m°/°C")),
];

const LEGACY_TAIL: &[Field] = &[
    Field::U8(plain(Param::Reserved)),
    Field::U8(plain(Param::MfgInfo)),
];

const RESISTANCES: &[Field] = &[Field::F12Pair(Param::RSource, Param::RLoad, "Ω")];

const RESERVED: &[Field] = &[Field::U8(plain(Param::Reserved))];

const V3_HEAD: &[Field] = &[
    Field::U16(plain(Param::MfgId)),
    Field::Model(4),
    Field::U24(plain(Param::SerialNumber)),
    Field::U8(plain(Param::SensorType)),
];

const V4_HEAD: &[Field] = &[
    Field::U16(plain(Param::MfgId)),
    Field::Model(8),
    Field::U8(plain(Param::Reserved)),
    Field::U24(plain(Param::SerialNumber)),
    Field::U8(plain(Param::SensorType)),
];

const CT_HEAD: &[Field] = &[
    Field::U16(scaled(Param::RatedCurrent, 0.1, "A")),
    Field::U16(scaled(Param::VoltageAtRatedCurrent, 10e-6, "V")),
    Field::U16(scaled(Param::Size, 0.1, "mm")),
    Field::S12(scaled(Param::PhaseAtRatedCurrent, 0.01, "°")),
    Field::S8(scaled(Param::VoltageTempCoeff, 5.0, "ppm/°C")),
    Field::S8(scaled(Param::PhaseTempCoeff, 0.5, "m°/°C")),
];

const CT_TAIL: &[Field] = &[Field::S16(scaled(Param::BiasVoltage, 1e-6, "V"))];

/// Calibration rows in ascending level order, voltage before phase
const CAL_BYTES: &[Field] = &[
    Field::CalByte(0, Adjust::Voltage),
    Field::CalByte(0, Adjust::Phase),
    Field::CalByte(1, Adjust::Voltage),
    Field::CalByte(1, Adjust::Phase),
    Field::CalByte(2, Adjust::Voltage),
    Field::CalByte(2, Adjust::Phase),
    Field::CalByte(3, Adjust::Voltage),
    Field::CalByte(3, Adjust::Phase),
];

const CAL_QUADS: &[Field] = &[Field::CalQuad([0, 1]), Field::CalQuad([2, 3])];

const BASIC_LINEAR: &[Field] = &[Field::F32(Param::Scale), Field::F32(Param::Offset)];

const LINEAR: &[Field] = &[
    Field::S16(scaled(Param::Delay, 0.01, "μs")),
    Field::U16(plain(Param::SensorUnit)),
];

const NTC_ABCM: &[Field] = &[
    Field::F32(Param::NtcA),
    Field::F32(Param::NtcB),
    Field::F32(Param::NtcC),
    Field::F32(Param::NtcM),
];

const NTC_R1: &[Field] = &[Field::D16(Param::NtcR1, "Ω")];

const NTC_NK: &[Field] = &[Field::F32(Param::NtcN), Field::F32(Param::NtcK)];

const PULSE: &[Field] = &[
    Field::U16(scaled(Param::Threshold, 10e-6, "V")),
    Field::U16(scaled(Param::Hysteresis, 10e-6, "V")),
    Field::U8(plain(Param::DebounceTime)),
    Field::U2(plain(Param::EdgeMask)),
];

fn fix_scalar(table: &Table, s: &Scalar, bits: u32, signed: bool) -> Result<i64> {
    Ok(fix(table.param(s.param), bits, signed, s.scale, s.param.name(), s.unit)?)
}

fn store_scalar(table: &mut Table, s: &Scalar, raw: i64) -> Result<()> {
    table.set_param(s.param, unfix(raw, s.scale))
}

/// Append `fields` of `table` to `out`.
pub(crate) fn encode_fields(table: &Table, fields: &[Field], out: &mut BytesMut) -> Result<()> {
    for field in fields {
        match field {
            Field::U2(s) => out.put_u8((fix_scalar(table, s, 2, false)? as u8) << 6),
            Field::U8(s) => out.put_u8(fix_scalar(table, s, 8, false)? as u8),
            Field::S8(s) => out.put_i8(fix_scalar(table, s, 8, true)? as i8),
            Field::U16(s) => out.put_u16(fix_scalar(table, s, 16, false)? as u16),
            Field::S16(s) => out.put_i16(fix_scalar(table, s, 16, true)? as i16),
            Field::S12(s) => {
                let s12 = fix_scalar(table, s, 12, true)? as u16 & 0x0FFF;
                out.put_u16(s12 << 4);
            }
            Field::U24(s) => out.put_uint(fix_scalar(table, s, 24, false)? as u64, 3),
            Field::U4S12(hi, lo) => {
                let u4 = fix_scalar(table, hi, 4, false)? as u16;
                let s12 = fix_scalar(table, lo, 12, true)? as u16 & 0x0FFF;
                out.put_u16((u4 << 12) | s12);
            }
            Field::F12Pair(first, second, unit) => {
                let f1 = float12(table.param(*first), first.name(), *unit)? as u64;
                let f2 = float12(table.param(*second), second.name(), *unit)? as u64;
                out.put_uint((f1 << 12) | f2, 3);
            }
            Field::D16(param, unit) => {
                out.put_u16(decimal16(table.param(*param), param.name(), *unit)?)
            }
            Field::F32(param) => out.put_f32(table.param(*param) as f32),
            Field::Model(len) => {
                let model = table.model.as_bytes();
                if model.len() > *len {
                    return Err(CtidError::ModelTooLong {
                        model: table.model.clone(),
                        len: model.len(),
                        max: *len,
                    });
                }
                out.put_slice(model);
                out.put_bytes(0, len - model.len());
            }
            Field::CalByte(row, adjust) => {
                let value = table.cal_table[*row].get(*adjust);
                let raw = fix(value, 8, true, CAL_BYTE_SCALE, "cal_table", adjust.unit())?;
                out.put_i8(raw as i8);
            }
            Field::CalQuad([first, second]) => {
                let mut values = [0i64; 4];
                for (i, row) in [*first, *second].into_iter().enumerate() {
                    let entry = &table.cal_table[row];
                    for (j, adjust) in [Adjust::Voltage, Adjust::Phase].into_iter().enumerate() {
                        let value = entry.get(adjust);
                        values[2 * i + j] =
                            fix(value, 10, true, QUAD_SCALE, "cal_table", adjust.unit())?;
                    }
                }
                out.put_slice(&pack_quad(values));
            }
        }
    }
    Ok(())
}

/// Read `fields` from `input` into `table`.
///
/// The caller guarantees that `input` holds at least the combined length of
/// `fields`.
pub(crate) fn decode_fields(table: &mut Table, fields: &[Field], input: &mut &[u8]) -> Result<()> {
    for field in fields {
        match field {
            Field::U2(s) => store_scalar(table, s, (input.get_u8() >> 6) as i64)?,
            Field::U8(s) => store_scalar(table, s, input.get_u8() as i64)?,
            Field::S8(s) => store_scalar(table, s, input.get_i8() as i64)?,
            Field::U16(s) => store_scalar(table, s, input.get_u16() as i64)?,
            Field::S16(s) => store_scalar(table, s, input.get_i16() as i64)?,
            Field::S12(s) => {
                let raw = (input.get_u16() >> 4) as u32 & 0x0FFF;
                store_scalar(table, s, sign_extend(raw, 12))?;
            }
            Field::U24(s) => store_scalar(table, s, input.get_uint(3) as i64)?,
            Field::U4S12(hi, lo) => {
                let word = input.get_u16() as u32;
                store_scalar(table, hi, ((word >> 12) & 0xF) as i64)?;
                store_scalar(table, lo, sign_extend(word & 0x0FFF, 12))?;
            }
            Field::F12Pair(first, second, _) => {
                let u24 = input.get_uint(3);
                let f1 = unfloat12(((u24 >> 12) & 0xFFF) as u16).round_ties_even();
                let f2 = unfloat12((u24 & 0xFFF) as u16).round_ties_even();
                table.set_param(*first, f1)?;
                table.set_param(*second, f2)?;
            }
            Field::D16(param, _) => table.set_param(*param, undecimal16(input.get_u16()))?,
            Field::F32(param) => table.set_param(*param, input.get_f32() as f64)?,
            Field::Model(len) => {
                let whole: &[u8] = *input;
                let (raw, rest) = whole.split_at(*len);
                *input = rest;
                let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
                table.model = String::from_utf8(raw[..end].to_vec())?;
            }
            Field::CalByte(row, adjust) => {
                let value = unfix(input.get_i8() as i64, CAL_BYTE_SCALE);
                table.cal_table[*row].set(*adjust, value);
            }
            Field::CalQuad([first, second]) => {
                let mut raw = [0u8; 5];
                input.copy_to_slice(&mut raw);
                let values = unpack_quad(raw)?;
                for (i, row) in [*first, *second].into_iter().enumerate() {
                    let entry = &mut table.cal_table[row];
                    entry.set(Adjust::Voltage, unfix(values[2 * i], QUAD_SCALE));
                    entry.set(Adjust::Phase, unfix(values[2 * i + 1], QUAD_SCALE));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_lengths() {
        assert_eq!(FormatVersion::V1.frame_len(), 31);
        assert_eq!(FormatVersion::V2.frame_len(), 35);
        assert_eq!(FormatVersion::V3.frame_len(), 35);
        assert_eq!(FormatVersion::V4.frame_len(), 45);
        assert_eq!(FormatVersion::V5.frame_len(), 45);
    }

    #[test]
    fn test_legacy_headers_fill_the_table() {
        // 1 version byte + header fields
        assert_eq!(1 + segments_len(FormatVersion::V1.header()), 30);
        assert_eq!(1 + segments_len(FormatVersion::V2.header()), 33);
        assert!(FormatVersion::V2.params(SensorType::Ac).is_empty());
    }

    #[test]
    fn test_param_blocks_fit_except_v3_ct() {
        let types = [
            SensorType::Ac,
            SensorType::Linear,
            SensorType::TempLinear,
            SensorType::TempNtc,
            SensorType::Pulse,
        ];
        for version in [FormatVersion::V3, FormatVersion::V4, FormatVersion::V5] {
            let header = 1 + segments_len(version.header());
            for sensor_type in types {
                let size = header + segments_len(version.params(sensor_type));
                let fits = size <= version.table_len();
                let expect_fit = !(version == FormatVersion::V3 && sensor_type == SensorType::Ac);
                assert_eq!(fits, expect_fit, "{version:?} {sensor_type:?} -> {size}");
            }
        }
        // NTC fills v3 and v4 exactly
        assert_eq!(15 + segments_len(FormatVersion::V3.params(SensorType::TempNtc)), 33);
        assert_eq!(19 + segments_len(FormatVersion::V4.params(SensorType::TempNtc)), 43);
    }

    #[test]
    fn test_version_from_byte() {
        assert_eq!(FormatVersion::try_from(5).unwrap(), FormatVersion::V5);
        assert!(matches!(FormatVersion::try_from(0), Err(CtidError::UnsupportedVersion(0))));
        assert!(matches!(FormatVersion::try_from(6), Err(CtidError::UnsupportedVersion(6))));
    }
}
