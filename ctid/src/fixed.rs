/*!
Fixed-point and compact floating-point encodings used by CTid table fields.

Every field of a table is stored as a scaled integer. [`fix`] and [`unfix`]
convert between physical values and those integers; [`float12`] and
[`decimal16`] are the two compact floating formats; [`pack_quad`] and
[`unpack_quad`] handle the 5-byte calibration quad used from version 5 on.
*/

use crate::error::{CtidError, RangeError, Result};

/// Max. mantissa value of the 12-bit float format
pub const F12_MAX_MANTISSA: u16 = 0x1FF;

/// Largest value representable as a 12-bit float
pub const F12_MAX_VALUE: f64 = 1e7;

/// Scale of the 10-bit calibration quad entries
pub const QUAD_SCALE: f64 = 0.01;

/// Decimals needed to print a value at the resolution of `scale`.
fn precision(scale: f64) -> usize {
    (-scale.log10() - 1e-9).ceil().max(0.0) as usize
}

/// Convert a physical value to an integer of `bits` width.
///
/// The value is divided by `scale` and rounded to the nearest integer (ties to
/// even). Fails with a [`RangeError`] reporting the valid bounds in physical
/// units if the result does not fit.
pub fn fix(
    value: f64,
    bits: u32,
    signed: bool,
    scale: f64,
    field: &'static str,
    unit: &'static str,
) -> std::result::Result<i64, RangeError> {
    let limit = 1i64 << bits;
    let (min, max) = if signed {
        (-(limit / 2), limit / 2 - 1)
    } else {
        (0, limit - 1)
    };

    let raw = (value / scale).round_ties_even();
    if !raw.is_finite() || raw < min as f64 || raw > max as f64 {
        return Err(RangeError {
            field,
            value,
            unit,
            min: min as f64 * scale,
            max: max as f64 * scale,
            precision: precision(scale),
        });
    }
    Ok(raw as i64)
}

/// Convert an integer back to a physical value. No rounding takes place.
pub fn unfix(raw: i64, scale: f64) -> f64 {
    raw as f64 * scale
}

/// Encode a value in the range from 0 to 1e7 as a 12-bit float.
///
/// The upper 9 bits hold the mantissa, the lower 3 bits a power-of-ten
/// exponent chosen so the mantissa is as large as possible.
pub fn float12(value: f64, field: &'static str, unit: &'static str) -> Result<u16> {
    if !(0.0..=F12_MAX_VALUE).contains(&value) {
        return Err(RangeError {
            field,
            value,
            unit,
            min: 0.0,
            max: F12_MAX_VALUE,
            precision: 0,
        }
        .into());
    }
    let exp = if value >= 1.0 { value.log10().ceil() as i32 } else { 0 };
    let mantissa = (value / 10f64.powi(exp) * F12_MAX_MANTISSA as f64).round_ties_even() as u16;
    Ok((mantissa.min(F12_MAX_MANTISSA) << 3) | exp as u16)
}

/// Decode a 12-bit float.
pub fn unfloat12(raw: u16) -> f64 {
    let mantissa = (raw >> 3) & F12_MAX_MANTISSA;
    let exp = (raw & 0x7) as i32;
    mantissa as f64 / F12_MAX_MANTISSA as f64 * 10f64.powi(exp)
}

/// Encode a value as an 11-bit signed mantissa and a 5-bit signed
/// power-of-ten exponent in -16..=15.
///
/// This covers the range from -1024e15 to +1023e15. Where possible the
/// exponent is chosen so the mantissa magnitude lies in 103..=1023.
pub fn decimal16(value: f64, field: &'static str, unit: &'static str) -> Result<u16> {
    let out_of_range = || RangeError {
        field,
        value,
        unit,
        min: -1024e15,
        max: 1023e15,
        precision: 0,
    };

    if !value.is_finite() {
        return Err(out_of_range().into());
    }

    let mut mantissa: i32 = 0;
    let mut exp: i32 = 0;
    if value != 0.0 {
        let mut scaled = value;
        while exp > -16 && (-102.4..=102.3).contains(&scaled) {
            scaled *= 10.0;
            exp -= 1;
        }
        let mut m = scaled.round_ties_even();
        while !(-1024.0..=1023.0).contains(&m) {
            exp += 1;
            m = (value / 10f64.powi(exp)).round_ties_even();
        }
        if exp > 15 {
            return Err(out_of_range().into());
        }
        mantissa = m as i32;
    }
    Ok((((mantissa as u16) & 0x7FF) << 5) | (exp as u16 & 0x1F))
}

/// Decode a 16-bit decimal value.
pub fn undecimal16(raw: u16) -> f64 {
    let mut mantissa = ((raw >> 5) & 0x7FF) as i32;
    if mantissa >= 0x400 {
        mantissa -= 0x800;
    }
    let mut exp = (raw & 0x1F) as i32;
    if exp >= 0x10 {
        exp -= 0x20;
    }
    mantissa as f64 * 10f64.powi(exp)
}

/// Convert a 10-bit two's-complement integer to a signed value in -512..=511.
pub fn s10(raw: u16) -> Result<i16> {
    if raw >= 1024 {
        return Err(CtidError::unsupported(format!(
            "{raw} does not fit in 10 bits"
        )));
    }
    Ok(if raw < 512 { raw as i16 } else { raw as i16 - 1024 })
}

/// Sign-extend the low `bits` bits of `raw`.
pub(crate) fn sign_extend(raw: u32, bits: u32) -> i64 {
    let shift = 64 - bits;
    ((raw as i64) << shift) >> shift
}

/// Pack four signed 10-bit values into 5 bytes, most significant bit first.
pub fn pack_quad(values: [i64; 4]) -> [u8; 5] {
    let packed = values
        .iter()
        .fold(0u64, |acc, &v| (acc << 10) | (v as u64 & 0x3FF));
    let be = packed.to_be_bytes();
    [be[3], be[4], be[5], be[6], be[7]]
}

/// Unpack 5 bytes into four signed 10-bit values.
pub fn unpack_quad(bytes: [u8; 5]) -> Result<[i64; 4]> {
    let packed = bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64);
    let mut values = [0i64; 4];
    for (i, value) in values.iter_mut().enumerate() {
        let raw = ((packed >> (30 - 10 * i)) & 0x3FF) as u16;
        *value = s10(raw)? as i64;
    }
    Ok(values)
}
