/*!
Registries of manufacturers, sensor types and physical units.
*/

use crate::error::{CtidError, Result};
use crate::table::SensorType;

/// Registered manufacturer of CTid sensors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Manufacturer {
    pub id: u16,
    pub name: &'static str,
    pub short_name: &'static str,
}

pub const MANUFACTURERS: &[Manufacturer] = &[
    Manufacturer { id: 0x0000, name: "eGauge Systems LLC", short_name: "eGauge" },
    Manufacturer { id: 0x0001, name: "Magnelab, Inc.", short_name: "Magnelab" },
    Manufacturer { id: 0x0002, name: "Continental Control Systems LLC", short_name: "CCS" },
    Manufacturer { id: 0x0003, name: "J&D Electronics", short_name: "J&D" },
    Manufacturer { id: 0x0004, name: "Accuenergy, Inc.", short_name: "Accuenergy" },
];

/// Unit of a linear sensor's output, indexed by the `sensor_unit` code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorUnit {
    pub unit: &'static str,
    pub description: &'static str,
}

pub const SENSOR_UNITS: &[SensorUnit] = &[
    SensorUnit { unit: "V", description: "voltage" },
    SensorUnit { unit: "A", description: "current" },
    SensorUnit { unit: "Ah", description: "charge" },
    SensorUnit { unit: "W", description: "power" },
    SensorUnit { unit: "var", description: "reactive power" },
    SensorUnit { unit: "VA", description: "apparent power" },
    SensorUnit { unit: "Hz", description: "frequency" },
    SensorUnit { unit: "Ω", description: "resistance" },
    SensorUnit { unit: "°", description: "angle" },
    SensorUnit { unit: "°C", description: "temperature" },
    SensorUnit { unit: "%RH", description: "humidity" },
    SensorUnit { unit: "Pa", description: "pressure" },
    SensorUnit { unit: "g", description: "mass" },
    SensorUnit { unit: "m/s", description: "velocity" },
    SensorUnit { unit: "g/s", description: "mass flow" },
    SensorUnit { unit: "m^3/s", description: "volumetric flow" },
    SensorUnit { unit: "%", description: "percentage" },
    SensorUnit { unit: "ppm", description: "parts-per-million" },
    SensorUnit { unit: "", description: "air quality" },
    SensorUnit { unit: "", description: "number" },
];

/// Short display names of the sensor types, indexed by code
pub const SENSOR_TYPE_NAMES: [&str; 7] = ["AC", "DC", "RC", "linear", "temp", "NTC", "pulse"];

pub fn manufacturer(id: u16) -> Option<&'static Manufacturer> {
    MANUFACTURERS.iter().find(|m| m.id == id)
}

/// Full manufacturer name for `id`, or `None` if unregistered.
pub fn mfg_name(id: u16) -> Option<&'static str> {
    manufacturer(id).map(|m| m.name)
}

/// Short manufacturer name for `id`, or `None` if unregistered.
pub fn mfg_short_name(id: u16) -> Option<&'static str> {
    manufacturer(id).map(|m| m.short_name)
}

/// Look up a manufacturer id.
///
/// Accepts an unambiguous prefix of a registered full name, an exact short
/// name, or a number (decimal, or hexadecimal with a `0x` prefix).
pub fn mfg_id_for_name(name: &str) -> Result<u16> {
    find_mfg_id(MANUFACTURERS, name)
}

fn find_mfg_id(registry: &[Manufacturer], name: &str) -> Result<u16> {
    if let Some(m) = registry.iter().find(|m| m.short_name == name) {
        return Ok(m.id);
    }

    let mut matches = registry.iter().filter(|m| m.name.starts_with(name));
    match (matches.next(), matches.next()) {
        (Some(m), None) if !name.is_empty() => return Ok(m.id),
        (Some(_), Some(_)) => {
            return Err(CtidError::unknown_manufacturer(format!("{name} (ambiguous)")))
        }
        _ => {}
    }

    parse_int(name).ok_or_else(|| CtidError::unknown_manufacturer(name))
}

/// Look up a sensor type by its display name or numeric code.
pub fn sensor_type_for_name(name: &str) -> Result<SensorType> {
    if let Some(code) = SENSOR_TYPE_NAMES.iter().position(|n| n.eq_ignore_ascii_case(name)) {
        return SensorType::try_from(code as u8);
    }
    match parse_int::<u8>(name) {
        Some(code) => SensorType::try_from(code),
        None => Err(CtidError::unknown_sensor_type(name)),
    }
}

/// Look up a sensor unit code by its unit symbol or description.
pub fn sensor_unit_for_name(name: &str) -> Option<u16> {
    SENSOR_UNITS
        .iter()
        .position(|u| (!u.unit.is_empty() && u.unit == name) || u.description == name)
        .map(|i| i as u16)
        .or_else(|| parse_int::<u16>(name).filter(|&code| (code as usize) < SENSOR_UNITS.len()))
}

pub fn sensor_unit(code: u16) -> Option<&'static SensorUnit> {
    SENSOR_UNITS.get(code as usize)
}

/// Parse an integer in decimal or with a `0x`, `0o` or `0b` prefix.
fn parse_int<T: TryFrom<u64>>(s: &str) -> Option<T> {
    let s = s.trim();
    let value = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).ok()?
    } else if let Some(oct) = s.strip_prefix("0o") {
        u64::from_str_radix(oct, 8).ok()?
    } else if let Some(bin) = s.strip_prefix("0b") {
        u64::from_str_radix(bin, 2).ok()?
    } else {
        s.parse::<u64>().ok()?
    };
    T::try_from(value).ok()
}
