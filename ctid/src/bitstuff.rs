/*!
Bit stuffing for CTid transmissions.

A transmitted bitstream never contains more than seven consecutive 1-bits
after the start symbol: the stuffer inserts a 0 after every run of seven 1s
and the receiver drops the bit that follows such a run. Bits travel most
significant first.
*/

use crate::error::{CtidError, Result};

/// Start symbol that precedes every bit-stuffed table
pub const START_SYM: u8 = 0xFF;

/// Number of consecutive 1-bits after which a stuffing bit is inserted
pub const MAX_RUN_LENGTH: u32 = 7;

/// Encode-side accumulator that writes bytes with stuffing bits inserted.
#[derive(Debug, Clone)]
pub struct BitStuffer {
    output: Vec<u8>,
    out_byte: u8,
    out_mask: u8,
    run_length: u32,
}

impl BitStuffer {
    /// Create a stuffer whose output starts with `header`.
    ///
    /// The header is copied verbatim and does not count towards run lengths.
    pub fn new(header: &[u8]) -> Self {
        Self {
            output: header.to_vec(),
            out_byte: 0x00,
            out_mask: 0x80,
            run_length: 0,
        }
    }

    fn shift(&mut self) {
        self.out_mask >>= 1;
        if self.out_mask == 0 {
            self.output.push(self.out_byte);
            self.out_byte = 0x00;
            self.out_mask = 0x80;
        }
    }

    /// Append one data byte.
    pub fn append(&mut self, byte: u8) {
        let mut mask = 0x80u8;
        while mask != 0 {
            if byte & mask != 0 {
                self.out_byte |= self.out_mask;
                self.run_length += 1;
                if self.run_length >= MAX_RUN_LENGTH {
                    // leave a 0 stuffing bit behind the run
                    self.shift();
                    self.run_length = 0;
                }
            } else {
                self.run_length = 0;
            }
            self.shift();
            mask >>= 1;
        }
    }

    /// Pad the trailing partial byte with 0-bits.
    pub fn finish(&mut self) {
        while self.out_mask != 0x80 {
            self.shift();
        }
    }

    /// Finish the stream and return the output.
    pub fn into_output(mut self) -> Vec<u8> {
        self.finish();
        self.output
    }
}

/// Decode-side accumulator: collects data bits into bytes, dropping the
/// stuffing bit that follows every run of seven 1-bits.
#[derive(Debug, Clone, Default)]
pub struct Destuffer {
    run_length: u32,
    value: u8,
    num_bits: u32,
}

impl Destuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one received bit; returns a byte once eight data bits are in.
    pub fn push(&mut self, bit: bool) -> Option<u8> {
        if self.run_length >= MAX_RUN_LENGTH {
            self.run_length = 0;
            return None;
        }

        if bit {
            self.run_length += 1;
        } else {
            self.run_length = 0;
        }

        self.value = (self.value << 1) | bit as u8;
        self.num_bits += 1;
        if self.num_bits < 8 {
            return None;
        }

        let byte = self.value;
        self.value = 0;
        self.num_bits = 0;
        Some(byte)
    }

    /// Number of data bits accumulated towards the next byte
    pub fn pending_bits(&self) -> u32 {
        self.num_bits
    }
}

/// Apply bit stuffing to `data` and prefix the result with the start symbol.
pub fn bitstuff(data: &[u8]) -> Vec<u8> {
    let mut stuffer = BitStuffer::new(&[START_SYM]);
    for &byte in data {
        stuffer.append(byte);
    }
    stuffer.into_output()
}

/// Remove bit stuffing from a bitstream that begins with the start symbol.
///
/// An empty bitstream is a length error, a wrong first byte a start symbol
/// error. Trailing padding bits that do not complete a byte are discarded.
pub fn unstuff(bitstream: &[u8]) -> Result<Vec<u8>> {
    let (&first, rest) = bitstream
        .split_first()
        .ok_or(CtidError::FrameLength { expected: 1, actual: 0 })?;
    if first != START_SYM {
        return Err(CtidError::StartSymbol(first));
    }

    let mut destuffer = Destuffer::new();
    let mut data = Vec::with_capacity(rest.len());
    for &byte in rest {
        let mut mask = 0x80u8;
        while mask != 0 {
            if let Some(decoded) = destuffer.push(byte & mask != 0) {
                data.push(decoded);
            }
            mask >>= 1;
        }
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitstuff_without_long_runs() {
        assert_eq!(bitstuff(&[0x55]), vec![0xFF, 0x55]);
        assert_eq!(bitstuff(&[0x00, 0x7E]), vec![0xFF, 0x00, 0x7E]);
        assert_eq!(bitstuff(&[]), vec![0xFF]);
    }

    #[test]
    fn test_bitstuff_inserts_zero_after_seven_ones() {
        // 11111111 -> 1111111 0 1, padded: 11111110 10000000
        assert_eq!(bitstuff(&[0xFF]), vec![0xFF, 0xFE, 0x80]);
        // 11111110 -> 1111111 0 0, padded: 11111110 00000000
        assert_eq!(bitstuff(&[0xFE]), vec![0xFF, 0xFE, 0x00]);
    }

    #[test]
    fn test_no_run_longer_than_seven() {
        let data: Vec<u8> = (0..=255u8).chain([0xFF; 16]).collect();
        let stream = bitstuff(&data);
        let mut run = 0;
        for byte in &stream[1..] {
            for shift in (0..8).rev() {
                if byte >> shift & 1 == 1 {
                    run += 1;
                    assert!(run <= 7);
                } else {
                    run = 0;
                }
            }
        }
    }

    #[test]
    fn test_unstuff_roundtrip() {
        let data: Vec<u8> = (0..=255u8).chain([0xFF; 9]).chain([0x7F, 0xFE]).collect();
        assert_eq!(unstuff(&bitstuff(&data)).unwrap(), data);
        assert_eq!(unstuff(&bitstuff(&[0xFF, 0xFF])).unwrap(), vec![0xFF, 0xFF]);
        assert!(unstuff(&[0xFF]).unwrap().is_empty());
    }

    #[test]
    fn test_unstuff_requires_start_symbol() {
        assert!(matches!(unstuff(&[0x7F, 0x00]), Err(CtidError::StartSymbol(0x7F))));
        assert!(matches!(unstuff(&[0x00]), Err(CtidError::StartSymbol(0x00))));
    }

    #[test]
    fn test_unstuff_empty_stream_is_too_short() {
        assert!(matches!(
            unstuff(&[]),
            Err(CtidError::FrameLength { expected: 1, actual: 0 })
        ));
    }

    #[test]
    fn test_destuffer_drops_bit_after_run() {
        let mut destuffer = Destuffer::new();
        let bits = [true, true, true, true, true, true, true, false, true];
        let mut out = None;
        for bit in bits {
            if let Some(byte) = destuffer.push(bit) {
                out = Some(byte);
            }
        }
        assert_eq!(out, Some(0xFF));
        assert_eq!(destuffer.pending_bits(), 0);
    }
}
