/*!
Common error types for the CTid codec.

The waveform decoder only rejects its settings; a noisy or ambiguous signal
simply fails to lock. Everything that works on already-captured bytes reports
failures through [`CtidError`].
*/

use thiserror::Error;

/// Common result type used throughout the codec
pub type Result<T> = std::result::Result<T, CtidError>;

/// A physical value that does not fit the bit width and scale of its field.
#[derive(Error, Debug, Clone, PartialEq)]
#[error(
    "{field} {value:.precision$}{suffix} outside of range from {min:.precision$} to \
     {max:.precision$}{suffix}",
    suffix = unit_suffix(.unit)
)]
pub struct RangeError {
    pub field: &'static str,
    pub value: f64,
    pub unit: &'static str,
    pub min: f64,
    pub max: f64,
    /// Number of decimals that matches the field's resolution
    pub precision: usize,
}

fn unit_suffix(unit: &str) -> String {
    if unit.is_empty() {
        String::new()
    } else {
        format!(" {unit}")
    }
}

/// Comprehensive error type for all codec operations
#[derive(Error, Debug)]
pub enum CtidError {
    /// Value outside the representable range of its field
    #[error(transparent)]
    Range(#[from] RangeError),

    /// Fewer bytes than the table version requires
    #[error("Insufficient table data: expected {expected} bytes, got {actual}")]
    FrameLength { expected: usize, actual: usize },

    /// Checksum mismatch
    #[error("Expected CRC {expected:#x} but got {got:#x}")]
    Crc { expected: u16, got: u16 },

    /// Parameter combination the requested version cannot represent
    #[error("Unsupported encoding: {0}")]
    UnsupportedEncoding(String),

    /// Bitstream does not begin with the start symbol
    #[error("Bitstream missing start symbol (got {0:#04x})")]
    StartSymbol(u8),

    /// Table format version outside 1..=5
    #[error("Unsupported CTid table version {0}")]
    UnsupportedVersion(u8),

    /// Sensor-type code with no defined meaning
    #[error("Invalid sensor type {0:#x}")]
    InvalidSensorType(u8),

    /// Model name does not fit the version's model field
    #[error("model `{model}' is {len} bytes long in UTF-8 but only up to {max} bytes are allowed")]
    ModelTooLong { model: String, len: usize, max: usize },

    /// Model bytes are not valid UTF-8
    #[error("Invalid model name: {0}")]
    InvalidModel(#[from] std::string::FromUtf8Error),

    /// Parameter block overflows the fixed table length
    #[error("CTid table too big: {size} bytes exceeds {max}")]
    TableTooBig { size: usize, max: usize },

    /// Invalid decoder or synthesizer settings
    #[error("Configuration error: {0}")]
    Config(String),

    /// Manufacturer name that matches no (or more than one) registered name
    #[error("Unknown manufacturer: {0}")]
    UnknownManufacturer(String),

    /// Sensor-type name that is neither registered nor numeric
    #[error("Unknown sensor type: {0}")]
    UnknownSensorType(String),
}

impl CtidError {
    /// Create a new unsupported encoding error
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::UnsupportedEncoding(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new unknown manufacturer error
    pub fn unknown_manufacturer(name: impl Into<String>) -> Self {
        Self::UnknownManufacturer(name.into())
    }

    /// Create a new unknown sensor type error
    pub fn unknown_sensor_type(name: impl Into<String>) -> Self {
        Self::UnknownSensorType(name.into())
    }
}
