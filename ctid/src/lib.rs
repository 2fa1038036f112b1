/*!
# CTid Codec

Encoding and decoding of CTid tables, the parameter records that current
transformers and other sensors transmit over their signal leads, plus a
streaming decoder for the transmitted waveform.

## Core Types

- [`Table`] - Sensor parameters as stored in a table
- [`FormatVersion`] - Table format version (1 through 5)
- [`Decoder`] - Sample-by-sample waveform decoder
- [`Modulator`] - Waveform synthesizer

## Modules

- [`fixed`] - Fixed-point and compact float encodings
- [`bitstuff`] - Bit stuffing and unstuffing
- [`crc`] - Table checksums
- [`layout`] - Versioned field layouts
- [`table`] - Table codec
- [`registry`] - Manufacturers, sensor types and units
- [`waveform`] - Waveform decoder
- [`synth`] - Waveform synthesizer
- [`error`] - Common error types
*/

pub mod bitstuff;
pub mod crc;
pub mod error;
pub mod fixed;
pub mod layout;
pub mod registry;
pub mod synth;
pub mod table;
pub mod waveform;

// Re-export commonly used types
pub use bitstuff::{bitstuff, unstuff, START_SYM};
pub use crc::{check_table_data, Checksum};
pub use error::{CtidError, RangeError, Result};
pub use layout::FormatVersion;
pub use synth::{Modulator, Sample, SynthParams};
pub use table::{CalEntry, SensorType, Table, CAL_LEVELS};
pub use waveform::{DecodeEvent, Decoder, DecoderParams};

/// Version information for the codec library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Encode `table` in the given format version, checksum included.
pub fn encode(table: &Table, version: FormatVersion) -> Result<Vec<u8>> {
    table.encode(version)
}

/// Decode a table followed by its checksum.
pub fn decode(frame: &[u8]) -> Result<Table> {
    Table::decode(frame)
}

/// Decode a bit-stuffed transmission that begins with the start symbol.
pub fn decode_bitstream(bitstream: &[u8]) -> Result<Table> {
    Table::decode(&unstuff(bitstream)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_info() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_bitstream_roundtrip() {
        let mut table = Table::new(SensorType::Linear);
        table.model = "LIN".to_string();
        table.scale = 2.0;
        table.sensor_unit = 3;
        let frame = encode(&table, FormatVersion::V4).unwrap();
        let decoded = decode_bitstream(&bitstuff(&frame)).unwrap();
        assert_eq!(decoded.scale, 2.0);
        assert_eq!(decoded.sensor_unit, 3);
        assert_eq!(decode(&frame).unwrap(), decoded);
    }
}
