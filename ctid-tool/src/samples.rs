/*!
CSV sample files: one `timestamp_us,value` pair per line, optionally preceded
by a header row.
*/

use std::io::{Read, Write};

use anyhow::{anyhow, Context, Result};
use csv::StringRecord;
use ctid::Sample;

pub const HEADER: [&str; 2] = ["timestamp_us", "value"];

/// Parse a sample record, `None` if it is not numeric
fn parse_record(record: &StringRecord) -> Option<Sample> {
    let timestamp_us = record.get(0)?.trim().parse().ok()?;
    let value = record.get(1)?.trim().parse().ok()?;
    Some(Sample { timestamp_us, value })
}

/// Streaming reader over a sample file
pub struct SampleReader<R: Read> {
    reader: csv::Reader<R>,
    record: StringRecord,
    line: u64,
}

impl<R: Read> SampleReader<R> {
    pub fn new(input: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(input);
        Self { reader, record: StringRecord::new(), line: 0 }
    }

    /// Read the next sample; `Ok(None)` at end of input
    pub fn next_sample(&mut self) -> Result<Option<Sample>> {
        loop {
            let more = self
                .reader
                .read_record(&mut self.record)
                .with_context(|| format!("Failed to read sample line {}", self.line + 1))?;
            if !more {
                return Ok(None);
            }
            self.line += 1;
            if let Some(sample) = parse_record(&self.record) {
                return Ok(Some(sample));
            }
            if self.line > 1 {
                return Err(anyhow!(
                    "Invalid sample on line {}: {:?}",
                    self.line,
                    self.record.iter().collect::<Vec<_>>()
                ));
            }
            // header row
        }
    }
}

/// Write samples with a header row
pub fn write_samples<W: Write>(output: W, samples: &[Sample]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(output);
    writer.write_record(HEADER)?;
    for sample in samples {
        writer.write_record(&[sample.timestamp_us.to_string(), sample.value.to_string()])?;
    }
    writer.flush().context("Failed to write samples")?;
    Ok(())
}
