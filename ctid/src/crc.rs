/*!
Checksums protecting CTid tables.

Version 1 tables carry a CRC-8/ROHC byte, later versions a big-endian
CRC-16/MODBUS. Both are reflected CRCs computed with a 256-entry lookup
table built at compile time.
*/

use crate::error::{CtidError, Result};
use crate::layout::FormatVersion;

const fn reflected_table_8(poly: u8) -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 { (crc >> 1) ^ poly } else { crc >> 1 };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

const fn reflected_table_16(poly: u16) -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u16;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 { (crc >> 1) ^ poly } else { crc >> 1 };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// Polynomial 0x07, bit-reversed
static CRC8_ROHC_TABLE: [u8; 256] = reflected_table_8(0xE0);

/// Polynomial 0x8005, bit-reversed
static CRC16_MODBUS_TABLE: [u16; 256] = reflected_table_16(0xA001);

/// CRC-8/ROHC: reflected, init 0xFF, no final XOR.
pub fn crc8_rohc(data: &[u8]) -> u8 {
    data.iter()
        .fold(0xFF, |crc, &b| CRC8_ROHC_TABLE[(crc ^ b) as usize])
}

/// CRC-16/MODBUS: reflected, init 0xFFFF, no final XOR.
pub fn crc16_modbus(data: &[u8]) -> u16 {
    data.iter().fold(0xFFFF, |crc, &b| {
        (crc >> 8) ^ CRC16_MODBUS_TABLE[((crc ^ b as u16) & 0xFF) as usize]
    })
}

/// Checksum flavour used by a table version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checksum {
    Crc8Rohc,
    Crc16Modbus,
}

impl Checksum {
    /// Number of checksum bytes appended to the table
    pub fn width(self) -> usize {
        match self {
            Self::Crc8Rohc => 1,
            Self::Crc16Modbus => 2,
        }
    }

    /// Compute the checksum of `data`
    pub fn compute(self, data: &[u8]) -> u16 {
        match self {
            Self::Crc8Rohc => crc8_rohc(data) as u16,
            Self::Crc16Modbus => crc16_modbus(data),
        }
    }

    /// Append the checksum of `data`, most significant byte first
    pub fn append(self, data: &mut Vec<u8>) {
        let crc = self.compute(data);
        match self {
            Self::Crc8Rohc => data.push(crc as u8),
            Self::Crc16Modbus => data.extend_from_slice(&crc.to_be_bytes()),
        }
    }

    /// Read a stored checksum
    fn read(self, bytes: &[u8]) -> u16 {
        match self {
            Self::Crc8Rohc => bytes[0] as u16,
            Self::Crc16Modbus => u16::from_be_bytes([bytes[0], bytes[1]]),
        }
    }
}

/// Validate the checksum of a received table.
///
/// `raw` holds the table bytes followed by the checksum, without the start
/// symbol. Trailing bytes beyond the checksum are ignored. Returns the table
/// bytes with the checksum stripped.
pub fn check_table_data(raw: &[u8]) -> Result<&[u8]> {
    let version_byte = *raw
        .first()
        .ok_or(CtidError::FrameLength { expected: 1, actual: 0 })?;
    let version = FormatVersion::try_from(version_byte)?;

    let length = version.table_len();
    let checksum = version.checksum();
    let needed = length + checksum.width();
    if raw.len() < needed {
        return Err(CtidError::FrameLength {
            expected: needed,
            actual: raw.len(),
        });
    }

    let expected = checksum.compute(&raw[..length]);
    let got = checksum.read(&raw[length..needed]);
    if expected != got {
        return Err(CtidError::Crc { expected, got });
    }
    Ok(&raw[..length])
}
