/*!
Threaded replay of sample files through the waveform decoder.

A reader thread parses the sample file and hands batches of samples to the
decoder thread over a bounded channel. The decoder thread runs the waveform
decoder and the table assembler and stops after the first table, or once the
configured amount of sample time passed without a start symbol.
*/

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{bounded, Receiver, Sender};
use ctid::{DecodeEvent, Decoder, Sample, Table};
use tracing::{error, info, warn};

use crate::config::DecoderConfig;
use crate::samples::SampleReader;
use crate::table_sync::{TableSyncEngine, TableSyncState, TableSyncStats};

/// Samples per channel message
const BATCH_SIZE: usize = 1024;

/// Outcome of a scan
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    pub tables: Vec<Table>,
    pub samples: u64,
    pub start_symbols: u64,
    pub bytes: u64,
    /// No start symbol was seen within the scan timeout
    pub timed_out: bool,
    pub stats: TableSyncStats,
}

/// Sample file scanner
pub struct Scanner {
    config: DecoderConfig,
    all: bool,
    running: Arc<AtomicBool>,
}

impl Scanner {
    /// Create a scanner. With `all` set the whole input is decoded instead of
    /// stopping at the first table.
    pub fn new(config: DecoderConfig, all: bool) -> Self {
        Self {
            config,
            all,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Get a reference to the running flag for external control
    pub fn get_running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn scan_file(&self, path: &Path) -> Result<ScanReport> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open sample file: {}", path.display()))?;
        info!("📂 Scanning {}", path.display());
        self.scan_reader(BufReader::new(file))
    }

    pub fn scan_reader<R: Read + Send + 'static>(&self, input: R) -> Result<ScanReport> {
        let decoder = Decoder::with_params(self.config.sampling_freq_hz, self.config.params())
            .context("Invalid decoder configuration")?;
        let (sample_tx, sample_rx) = bounded::<Vec<Sample>>(self.config.channel_capacity.max(1));

        let running_reader = Arc::clone(&self.running);
        let running_decoder = Arc::clone(&self.running);
        let config = self.config.clone();
        let all = self.all;

        let reader_handle = thread::spawn(move || {
            match Self::reader_thread(input, sample_tx, running_reader) {
                Ok(count) => {
                    info!("Reader thread finished after {} samples", count);
                    Ok(())
                }
                Err(e) => {
                    error!("Reader thread failed: {:#}", e);
                    Err(e)
                }
            }
        });

        let decoder_handle = thread::spawn(move || {
            Self::decoder_thread(decoder, config, all, sample_rx, running_decoder)
        });

        let reader_result = reader_handle
            .join()
            .map_err(|_| anyhow!("Reader thread panicked"))?;
        let report = decoder_handle
            .join()
            .map_err(|_| anyhow!("Decoder thread panicked"))?;

        // a reader error only matters if it kept us from finding anything
        if report.tables.is_empty() {
            reader_result?;
        }
        Ok(report)
    }

    /// Reader thread - parses samples and forwards them in batches
    fn reader_thread<R: Read>(
        input: R,
        sample_tx: Sender<Vec<Sample>>,
        running: Arc<AtomicBool>,
    ) -> Result<u64> {
        let mut reader = SampleReader::new(input);
        let mut batch = Vec::with_capacity(BATCH_SIZE);
        let mut count = 0u64;

        while running.load(Ordering::SeqCst) {
            match reader.next_sample()? {
                Some(sample) => {
                    batch.push(sample);
                    count += 1;
                    if batch.len() >= BATCH_SIZE {
                        let full = std::mem::replace(&mut batch, Vec::with_capacity(BATCH_SIZE));
                        if sample_tx.send(full).is_err() {
                            // decoder is done
                            return Ok(count);
                        }
                    }
                }
                None => break,
            }
        }
        if !batch.is_empty() {
            let _ = sample_tx.send(batch);
        }
        Ok(count)
    }

    /// Decoder thread - runs the waveform decoder and table assembler
    fn decoder_thread(
        mut decoder: Decoder,
        config: DecoderConfig,
        all: bool,
        sample_rx: Receiver<Vec<Sample>>,
        running: Arc<AtomicBool>,
    ) -> ScanReport {
        let mut engine = TableSyncEngine::new();
        let mut report = ScanReport::default();
        let timeout_us = config.scan_timeout().as_secs_f64() * 1e6;
        let mut first_ts: Option<f64> = None;

        info!(
            "📝 Decoder thread started ({} Hz sampling, {} Hz clock, timeout {:?})",
            config.sampling_freq_hz,
            config.clock_freq_hz,
            config.scan_timeout()
        );

        'outer: while running.load(Ordering::SeqCst) {
            let batch = match sample_rx.recv_timeout(Duration::from_millis(100)) {
                Ok(batch) => batch,
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                    info!("Sample channel disconnected - end of input");
                    break;
                }
            };

            for sample in batch {
                report.samples += 1;
                let start = *first_ts.get_or_insert(sample.timestamp_us);
                let was_locked = decoder.is_locked();

                match decoder.add_sample(sample.timestamp_us, sample.value) {
                    DecodeEvent::StartSymbol => {
                        report.start_symbols += 1;
                        engine.start_symbol();
                    }
                    DecodeEvent::ByteReady => {
                        if let Some(byte) = decoder.get_byte() {
                            report.bytes += 1;
                            if let Some(Ok(table)) = engine.process_byte(byte) {
                                report.tables.push(table);
                            }
                        }
                    }
                    DecodeEvent::Idle => {}
                }
                if was_locked && !decoder.is_locked() {
                    engine.lock_lost();
                }

                if !all && !report.tables.is_empty() {
                    break 'outer;
                }
                let acquiring =
                    !decoder.is_locked() && engine.state() == TableSyncState::WaitingForStart;
                if !all && acquiring && sample.timestamp_us - start > timeout_us {
                    warn!(
                        "⚠️ No CTid start symbol within {:?} of sample time",
                        config.scan_timeout()
                    );
                    report.timed_out = true;
                    break 'outer;
                }
            }
        }

        let pending = engine.current_buffer().len();
        if engine.state() != TableSyncState::WaitingForStart && pending > 0 {
            warn!("⚠️ Incomplete table at end of input: {} bytes", pending);
        }

        report.stats = engine.stats();
        info!("📊 Decoder final stats:");
        info!("   Samples: {}", report.samples);
        info!("   Start symbols: {}", report.start_symbols);
        info!("   Bytes: {}", report.bytes);
        info!("   Tables: {}", report.stats.tables_completed);
        info!("   CRC errors: {}", report.stats.crc_errors);
        info!("   Decode errors: {}", report.stats.decode_errors);
        info!("   Incomplete tables: {}", report.stats.incomplete);
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::samples::write_samples;
    use ctid::{bitstuff, FormatVersion, Modulator, SensorType, SynthParams};

    fn waveform(frames: &[Vec<u8>], params: SynthParams) -> Vec<u8> {
        let mut modulator = Modulator::new(params).unwrap();
        let mut samples: Vec<Sample> = Vec::new();
        for frame in frames {
            let offset = samples.last().map(|s| s.timestamp_us).unwrap_or(0.0);
            let step = 1e6 / params.sampling_freq_hz;
            for s in modulator.modulate(&bitstuff(frame)) {
                samples.push(Sample {
                    timestamp_us: s.timestamp_us + offset + step,
                    value: s.value,
                });
            }
        }
        let mut csv = Vec::new();
        write_samples(&mut csv, &samples).unwrap();
        csv
    }

    fn ct_frame(serial: u32) -> Vec<u8> {
        let mut table = Table::new(SensorType::Ac);
        table.model = "ECS-T".to_string();
        table.serial_number = serial;
        table.rated_current = 50.0;
        table.encode(FormatVersion::V5).unwrap()
    }

    #[test]
    fn test_scan_finds_table() {
        let csv = waveform(&[ct_frame(17)], SynthParams::default());
        let scanner = Scanner::new(DecoderConfig::default(), false);
        let report = scanner.scan_reader(std::io::Cursor::new(csv)).unwrap();
        assert!(!report.timed_out);
        assert_eq!(report.tables.len(), 1);
        assert_eq!(report.tables[0].serial_number, 17);
        assert_eq!(report.stats.tables_completed, 1);
    }

    #[test]
    fn test_scan_all_tables() {
        let params = SynthParams { noise_rms: 10.0, seed: 3, ..SynthParams::default() };
        let csv = waveform(&[ct_frame(1), ct_frame(2)], params);
        let scanner = Scanner::new(DecoderConfig::default(), true);
        let report = scanner.scan_reader(std::io::Cursor::new(csv)).unwrap();
        let serials: Vec<u32> = report.tables.iter().map(|t| t.serial_number).collect();
        assert_eq!(serials, vec![1, 2]);
        assert_eq!(report.start_symbols, 2);
    }

    #[test]
    fn test_scan_times_out_on_idle_line() {
        let params = SynthParams {
            amplitude: 0.0,
            noise_rms: 50.0,
            idle_ms: 600.0,
            ..SynthParams::default()
        };
        let csv = waveform(&[vec![]], params);
        let config = DecoderConfig { scan_timeout_ms: 500, ..DecoderConfig::default() };
        let report = Scanner::new(config, false)
            .scan_reader(std::io::Cursor::new(csv))
            .unwrap();
        assert!(report.timed_out);
        assert!(report.tables.is_empty());
    }

    #[test]
    fn test_table_started_before_timeout_is_kept() {
        // the start symbol arrives at 2.2 s, the table ends well after 2.5 s
        let params = SynthParams { idle_ms: 2200.0, ..SynthParams::default() };
        let csv = waveform(&[ct_frame(23)], params);
        let report = Scanner::new(DecoderConfig::default(), false)
            .scan_reader(std::io::Cursor::new(csv))
            .unwrap();
        assert!(!report.timed_out);
        assert_eq!(report.start_symbols, 1);
        assert_eq!(report.tables.len(), 1);
        assert_eq!(report.tables[0].serial_number, 23);
    }

    #[test]
    fn test_start_symbol_after_timeout_is_missed() {
        let params = SynthParams { idle_ms: 2600.0, ..SynthParams::default() };
        let csv = waveform(&[ct_frame(24)], params);
        let report = Scanner::new(DecoderConfig::default(), false)
            .scan_reader(std::io::Cursor::new(csv))
            .unwrap();
        assert!(report.timed_out);
        assert_eq!(report.start_symbols, 0);
    }

    #[test]
    fn test_rejects_invalid_decoder_config() {
        let csv = waveform(&[ct_frame(6)], SynthParams::default());
        let config = DecoderConfig { clock_tolerance_pct: 100.0, ..DecoderConfig::default() };
        let err = Scanner::new(config, false)
            .scan_reader(std::io::Cursor::new(csv.clone()))
            .unwrap_err();
        assert!(err.to_string().contains("Invalid decoder configuration"));

        let config = DecoderConfig { sampling_freq_hz: 1e12, ..DecoderConfig::default() };
        assert!(Scanner::new(config, false)
            .scan_reader(std::io::Cursor::new(csv))
            .is_err());
    }

    #[test]
    fn test_stopped_scanner_reads_nothing() {
        let csv = waveform(&[ct_frame(5)], SynthParams::default());
        let scanner = Scanner::new(DecoderConfig::default(), false);
        scanner.get_running_flag().store(false, Ordering::SeqCst);
        let report = scanner.scan_reader(std::io::Cursor::new(csv)).unwrap();
        assert_eq!(report.samples, 0);
        assert!(report.tables.is_empty());
    }

    #[test]
    fn test_missing_file() {
        let scanner = Scanner::new(DecoderConfig::default(), false);
        assert!(scanner.scan_file(Path::new("/nonexistent/samples.csv")).is_err());
    }
}
