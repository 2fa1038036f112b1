/*!
Table assembly state machine.

Collects the bytes the waveform decoder produces after a start symbol into
one table frame. The first byte carries the format version, which fixes the
frame length; once that many bytes are in, the checksum is validated and the
table decoded.
*/

use ctid::{check_table_data, CtidError, FormatVersion, Table};
use tracing::{debug, info, warn};

/// Table assembly state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableSyncState {
    /// Waiting for a start symbol
    WaitingForStart,
    /// Start symbol seen, waiting for the version byte
    WaitingForVersion,
    /// Collecting the table and its checksum
    Collecting { version: FormatVersion, expected: usize },
}

/// Assembler statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableSyncStats {
    pub tables_completed: u64,
    pub crc_errors: u64,
    pub decode_errors: u64,
    /// Transmissions cut short by a new start symbol or loss of lock
    pub incomplete: u64,
}

/// Table assembly engine
pub struct TableSyncEngine {
    state: TableSyncState,
    buffer: Vec<u8>,
    stats: TableSyncStats,
}

impl TableSyncEngine {
    /// Create a new table assembly engine
    pub fn new() -> Self {
        Self {
            state: TableSyncState::WaitingForStart,
            buffer: Vec::new(),
            stats: TableSyncStats::default(),
        }
    }

    /// Get current state
    pub fn state(&self) -> TableSyncState {
        self.state
    }

    /// Get statistics
    pub fn stats(&self) -> TableSyncStats {
        self.stats
    }

    /// Bytes of the table currently being collected
    pub fn current_buffer(&self) -> &[u8] {
        &self.buffer
    }

    fn is_collecting(&self) -> bool {
        self.state != TableSyncState::WaitingForStart
    }

    /// A start symbol was detected
    pub fn start_symbol(&mut self) {
        if self.is_collecting() && !self.buffer.is_empty() {
            warn!(
                "⚠️ Incomplete table: {} bytes collected (new start symbol)",
                self.buffer.len()
            );
            self.stats.incomplete += 1;
        }
        debug!("📦 Start symbol detected");
        self.buffer.clear();
        self.state = TableSyncState::WaitingForVersion;
    }

    /// The decoder lost lock
    pub fn lock_lost(&mut self) {
        if let TableSyncState::Collecting { expected, .. } = self.state {
            warn!(
                "⚠️ Incomplete table: expected {} bytes, got {}",
                expected,
                self.buffer.len()
            );
            self.stats.incomplete += 1;
        }
        self.buffer.clear();
        self.state = TableSyncState::WaitingForStart;
    }

    /// Process one decoded byte.
    /// Returns Some(result) when a complete table frame was assembled
    pub fn process_byte(&mut self, byte: u8) -> Option<Result<Table, CtidError>> {
        match self.state {
            TableSyncState::WaitingForStart => None,

            TableSyncState::WaitingForVersion => match FormatVersion::try_from(byte) {
                Ok(version) => {
                    self.buffer.push(byte);
                    self.state = TableSyncState::Collecting {
                        version,
                        expected: version.frame_len(),
                    };
                    None
                }
                Err(e) => {
                    warn!("⚠️ {}", e);
                    self.stats.decode_errors += 1;
                    self.state = TableSyncState::WaitingForStart;
                    Some(Err(e))
                }
            },

            TableSyncState::Collecting { version, expected } => {
                self.buffer.push(byte);
                if self.buffer.len() < expected {
                    return None;
                }

                self.state = TableSyncState::WaitingForStart;
                let result = check_table_data(&self.buffer).and_then(Table::unmarshal);
                match &result {
                    Ok(_) => {
                        info!(
                            "✅ Table complete: version {} ({} bytes)",
                            version.number(),
                            expected
                        );
                        self.stats.tables_completed += 1;
                    }
                    Err(CtidError::Crc { expected, got }) => {
                        warn!("⚠️ CRC mismatch: expected {:#x}, got {:#x}", expected, got);
                        self.stats.crc_errors += 1;
                    }
                    Err(e) => {
                        warn!("⚠️ Failed to decode table: {}", e);
                        self.stats.decode_errors += 1;
                    }
                }
                self.buffer.clear();
                Some(result)
            }
        }
    }
}

impl Default for TableSyncEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctid::SensorType;

    fn frame() -> Vec<u8> {
        let mut table = Table::new(SensorType::Pulse);
        table.model = "P1".to_string();
        table.debounce_time = 5;
        table.encode(FormatVersion::V4).unwrap()
    }

    #[test]
    fn test_ignores_bytes_before_start() {
        let mut engine = TableSyncEngine::new();
        for byte in frame() {
            assert!(engine.process_byte(byte).is_none());
        }
        assert_eq!(engine.state(), TableSyncState::WaitingForStart);
    }

    #[test]
    fn test_assembles_table() {
        let mut engine = TableSyncEngine::new();
        engine.start_symbol();
        let frame = frame();
        let (last, head) = frame.split_last().unwrap();
        for &byte in head {
            assert!(engine.process_byte(byte).is_none());
        }
        assert!(matches!(
            engine.state(),
            TableSyncState::Collecting { expected: 45, .. }
        ));
        let table = engine.process_byte(*last).unwrap().unwrap();
        assert_eq!(table.debounce_time, 5);
        assert_eq!(engine.stats().tables_completed, 1);
        assert_eq!(engine.state(), TableSyncState::WaitingForStart);
    }

    #[test]
    fn test_counts_crc_errors() {
        let mut engine = TableSyncEngine::new();
        engine.start_symbol();
        let mut frame = frame();
        frame[10] ^= 0x80;
        let mut result = None;
        for byte in frame {
            result = engine.process_byte(byte).or(result);
        }
        assert!(matches!(result, Some(Err(CtidError::Crc { .. }))));
        assert_eq!(engine.stats().crc_errors, 1);
    }

    #[test]
    fn test_rejects_unknown_version() {
        let mut engine = TableSyncEngine::new();
        engine.start_symbol();
        assert!(matches!(
            engine.process_byte(0x42),
            Some(Err(CtidError::UnsupportedVersion(0x42)))
        ));
        assert_eq!(engine.stats().decode_errors, 1);
    }

    #[test]
    fn test_incomplete_tables() {
        let mut engine = TableSyncEngine::new();
        engine.start_symbol();
        for &byte in &frame()[..10] {
            engine.process_byte(byte);
        }
        engine.start_symbol();
        assert_eq!(engine.stats().incomplete, 1);
        for &byte in &frame()[..3] {
            engine.process_byte(byte);
        }
        engine.lock_lost();
        assert_eq!(engine.stats().incomplete, 2);
        assert!(engine.current_buffer().is_empty());
    }
}
