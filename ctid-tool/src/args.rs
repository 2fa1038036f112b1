/*!
Parsers for command-line values that need more than clap's defaults.
*/

use anyhow::{anyhow, bail, Context, Result};
use ctid::{registry, SensorType, Table, CAL_LEVELS};
use regex::Regex;

/// Calibration override `LEVEL:VADJ/PADJ`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalOverride {
    pub level: f64,
    pub voltage_adjust: f64,
    pub phase_adjust: f64,
}

const CAL_PATTERN: &str = r"^\s*([0-9.]+)\s*:\s*([-+0-9.eE]+)\s*/\s*([-+0-9.eE]+)\s*$";

/// Parse a calibration override such as `1.5:0.2/-0.04`
pub fn parse_cal_entry(s: &str) -> Result<CalOverride> {
    let caps = Regex::new(CAL_PATTERN)?
        .captures(s)
        .ok_or_else(|| anyhow!("calibration entry `{s}' is not of the form LEVEL:VADJ/PADJ"))?;
    let number = |i: usize| -> Result<f64> {
        caps[i]
            .parse::<f64>()
            .with_context(|| format!("invalid number `{}' in `{s}'", &caps[i]))
    };
    let entry = CalOverride {
        level: number(1)?,
        voltage_adjust: number(2)?,
        phase_adjust: number(3)?,
    };
    if !CAL_LEVELS.contains(&entry.level) {
        bail!("calibration level {} must be one of {:?}", entry.level, CAL_LEVELS);
    }
    Ok(entry)
}

/// Parse a pulse edge mask: `rising`, `falling`, `both` or a number
pub fn parse_edge_mask(s: &str) -> Result<u8> {
    match s.to_ascii_lowercase().as_str() {
        "rising" => Ok(1),
        "falling" => Ok(2),
        "both" => Ok(3),
        other => match other.parse::<u8>() {
            Ok(mask) if mask <= 3 => Ok(mask),
            _ => bail!("edge mask `{s}' must be rising, falling, both or 0..3"),
        },
    }
}

/// Parse hex bytes, ignoring whitespace, colons and a leading `0x`
pub fn parse_hex(s: &str) -> Result<Vec<u8>> {
    let s = s.trim();
    let s = s.strip_prefix("0x").unwrap_or(s);
    let digits: String = s
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect();
    hex::decode(&digits).with_context(|| format!("invalid hex input `{s}'"))
}

/// Table overrides given on the command line
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub serial: Option<u32>,
    pub sensor_type: Option<String>,
    pub sensor_unit: Option<String>,
    pub edge_mask: Option<u8>,
    pub cal: Vec<CalOverride>,
}

impl Overrides {
    pub fn apply(&self, table: &mut Table) -> Result<()> {
        if let Some(name) = &self.manufacturer {
            table.mfg_id = registry::mfg_id_for_name(name)?;
        }
        if let Some(model) = &self.model {
            table.model = model.clone();
        }
        if let Some(serial) = self.serial {
            table.serial_number = serial;
        }
        if let Some(name) = &self.sensor_type {
            table.sensor_type = registry::sensor_type_for_name(name)?;
        }
        if let Some(name) = &self.sensor_unit {
            table.sensor_unit = registry::sensor_unit_for_name(name)
                .ok_or_else(|| anyhow!("unknown sensor unit `{name}'"))?;
        }
        if let Some(mask) = self.edge_mask {
            if table.sensor_type != SensorType::Pulse {
                bail!("edge mask only applies to pulse sensors");
            }
            table.edge_mask = mask;
        }
        for cal in &self.cal {
            let entry = table
                .cal_entry_mut(cal.level)
                .ok_or_else(|| anyhow!("no calibration row for level {}", cal.level))?;
            entry.voltage_adjust = cal.voltage_adjust;
            entry.phase_adjust = cal.phase_adjust;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cal_entry() {
        let cal = parse_cal_entry("1.5:0.2/-0.04").unwrap();
        assert_eq!(cal, CalOverride { level: 1.5, voltage_adjust: 0.2, phase_adjust: -0.04 });
        let cal = parse_cal_entry(" 50 : -1e-2 / +0.5 ").unwrap();
        assert_eq!(cal.level, 50.0);
        assert_eq!(cal.voltage_adjust, -0.01);
        assert!(parse_cal_entry("10:0/0").is_err());
        assert!(parse_cal_entry("5:0.1").is_err());
        assert!(parse_cal_entry("5:1..2/0").is_err());
    }

    #[test]
    fn test_parse_edge_mask() {
        assert_eq!(parse_edge_mask("rising").unwrap(), 1);
        assert_eq!(parse_edge_mask("Falling").unwrap(), 2);
        assert_eq!(parse_edge_mask("both").unwrap(), 3);
        assert_eq!(parse_edge_mask("0").unwrap(), 0);
        assert!(parse_edge_mask("4").is_err());
        assert!(parse_edge_mask("sideways").is_err());
    }

    #[test]
    fn test_parse_hex() {
        assert_eq!(parse_hex("0x01ff").unwrap(), vec![0x01, 0xFF]);
        assert_eq!(parse_hex("01 ff:7e").unwrap(), vec![0x01, 0xFF, 0x7E]);
        assert!(parse_hex("0g").is_err());
        assert!(parse_hex("abc").is_err());
    }

    #[test]
    fn test_overrides_apply() {
        let overrides = Overrides {
            manufacturer: Some("Magnelab".to_string()),
            model: Some("SCT".to_string()),
            serial: Some(99),
            sensor_type: Some("DC".to_string()),
            cal: vec![parse_cal_entry("15:0.3/0.1").unwrap()],
            ..Overrides::default()
        };
        let mut table = Table::default();
        overrides.apply(&mut table).unwrap();
        assert_eq!(table.mfg_id, 1);
        assert_eq!(table.model, "SCT");
        assert_eq!(table.serial_number, 99);
        assert_eq!(table.sensor_type, SensorType::Dc);
        assert_eq!(table.cal_table[2].voltage_adjust, 0.3);

        let overrides = Overrides { edge_mask: Some(3), ..Overrides::default() };
        assert!(overrides.apply(&mut table).is_err());
    }

    #[test]
    fn test_unknown_manufacturer() {
        let overrides = Overrides {
            manufacturer: Some("Nobody Inc".to_string()),
            ..Overrides::default()
        };
        assert!(overrides.apply(&mut Table::default()).is_err());
    }
}
