/*!
# CTid Tool

Command-line front end for the CTid codec.

## Features

- Encode a table description (TOML) into table bytes and a bit-stuffed stream
- Decode table bytes or bit-stuffed streams, validating the checksum
- Scan recorded sample files for CTid transmissions
- Synthesize the waveform of a table as a sample file

## Usage

### Encode
```bash
ctid-tool encode --table sensor.toml --model ECS16 --cal 1.5:0.2/-0.04
```

### Decode
```bash
ctid-tool decode 0500000045435331...
```

### Scan a sample file
```bash
ctid-tool scan samples.csv --sampling-freq 9600
```
*/

use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use ctid::{bitstuff, unstuff, FormatVersion, Modulator, Table};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod args;
mod config;
mod samples;
mod scan;
mod table_sync;

use args::{CalOverride, Overrides};
use config::AppConfig;
use scan::Scanner;

#[derive(Parser)]
#[command(name = "ctid-tool")]
#[command(about = "Encode, decode, scan and synthesize CTid sensor tables")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, default_value = "ctid.toml")]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Encode a table
    Encode {
        /// TOML table description
        #[arg(long)]
        table: Option<PathBuf>,

        /// Table format version (default: the table's version)
        #[arg(short = 't', long)]
        table_version: Option<u8>,

        /// Manufacturer name, unique prefix or numeric ID
        #[arg(short, long)]
        manufacturer: Option<String>,

        /// Model name
        #[arg(long)]
        model: Option<String>,

        /// Serial number
        #[arg(short, long)]
        serial: Option<u32>,

        /// Sensor type name (AC, DC, RC, linear, temp, NTC, pulse) or code
        #[arg(long)]
        sensor_type: Option<String>,

        /// Unit of a linear sensor's output (symbol, description or code)
        #[arg(long)]
        sensor_unit: Option<String>,

        /// Pulse edges to count: rising, falling or both
        #[arg(long, value_parser = args::parse_edge_mask)]
        edge_mask: Option<u8>,

        /// Calibration entry LEVEL:VADJ/PADJ (repeatable)
        #[arg(long, value_parser = args::parse_cal_entry)]
        cal: Vec<CalOverride>,

        /// Print the decoded table as JSON
        #[arg(long)]
        json: bool,
    },

    /// Decode table bytes given in hex
    Decode {
        /// Hex bytes of the table and its checksum
        hex: String,

        /// Input is a bit-stuffed stream starting with the start symbol
        #[arg(long)]
        stuffed: bool,

        /// Print the table as JSON
        #[arg(long)]
        json: bool,
    },

    /// Scan a sample file for CTid tables
    Scan {
        /// CSV file of timestamp_us,value samples
        file: PathBuf,

        /// Sampling frequency in Hz (overrides the configuration)
        #[arg(long)]
        sampling_freq: Option<f64>,

        /// Decode every table in the file instead of stopping at the first
        #[arg(long)]
        all: bool,

        /// Print tables as JSON
        #[arg(long)]
        json: bool,
    },

    /// Synthesize the waveform of a table as a sample file
    Synth {
        /// TOML table description
        #[arg(long)]
        table: Option<PathBuf>,

        /// Output CSV file
        #[arg(short, long)]
        output: PathBuf,

        /// Table format version (default: the table's version)
        #[arg(short = 't', long)]
        table_version: Option<u8>,
    },

    /// Generate configuration file
    Config {
        /// Output path for configuration file
        #[arg(short, long, default_value = "ctid.toml")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging to stderr to keep stdout clean for results
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match cli.command {
        Commands::Encode {
            table,
            table_version,
            manufacturer,
            model,
            serial,
            sensor_type,
            sensor_unit,
            edge_mask,
            cal,
            json,
        } => {
            let overrides = Overrides {
                manufacturer,
                model,
                serial,
                sensor_type,
                sensor_unit,
                edge_mask,
                cal,
            };
            run_encode(table.as_deref(), table_version, &overrides, json)
        }

        Commands::Decode { hex, stuffed, json } => run_decode(&hex, stuffed, json),

        Commands::Scan { file, sampling_freq, all, json } => {
            let mut config = AppConfig::load_or_default(&cli.config)?;
            if let Some(freq) = sampling_freq {
                config.decoder.sampling_freq_hz = freq;
            }
            run_scan(config, &file, all, json)
        }

        Commands::Synth { table, output, table_version } => {
            let config = AppConfig::load_or_default(&cli.config)?;
            run_synth(config, table.as_deref(), &output, table_version)
        }

        Commands::Config { output } => generate_config_file(output),
    }
}

/// Load a table description, or defaults without one
fn load_table(path: Option<&Path>) -> Result<Table> {
    let Some(path) = path else {
        return Ok(Table::default());
    };
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read table file: {}", path.display()))?;
    toml::from_str(&content).with_context(|| "Failed to parse table file as TOML")
}

fn parse_version(version: Option<u8>) -> Result<Option<FormatVersion>> {
    version
        .map(|v| FormatVersion::try_from(v).with_context(|| format!("invalid table version {v}")))
        .transpose()
}

/// Encode `table`, falling back to version 5 if no version was requested
/// and the table's own version cannot hold it
fn encode_table(
    table: &Table,
    requested: Option<FormatVersion>,
) -> Result<(FormatVersion, Vec<u8>)> {
    if let Some(version) = requested {
        return Ok((version, table.encode(version)?));
    }
    match table.encode(table.version) {
        Ok(data) => Ok((table.version, data)),
        Err(e) if table.version != FormatVersion::V5 => {
            warn!("⚠️ {}; using v5 encoding", e);
            Ok((FormatVersion::V5, table.encode(FormatVersion::V5)?))
        }
        Err(e) => Err(e.into()),
    }
}

fn print_table(table: &Table, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(table)?);
    } else {
        println!("{}", table);
    }
    Ok(())
}

fn run_encode(
    table_path: Option<&Path>,
    table_version: Option<u8>,
    overrides: &Overrides,
    json: bool,
) -> Result<()> {
    let mut table = load_table(table_path)?;
    overrides.apply(&mut table)?;

    let (version, data) = encode_table(&table, parse_version(table_version)?)?;
    info!("🔧 Encoded {} sensor as version {}", table.sensor_type, version.number());

    let bitstream = bitstuff(&data);
    println!("table:      {}", hex::encode(&data));
    println!("bit stream: {}", hex::encode(&bitstream));

    if json {
        let decoded = ctid::decode(&data)?;
        print_table(&decoded, true)?;
    }
    Ok(())
}

fn run_decode(input: &str, stuffed: bool, json: bool) -> Result<()> {
    let mut data = args::parse_hex(input)?;
    if stuffed {
        data = unstuff(&data)?;
    }
    let table = ctid::decode(&data)?;
    print_table(&table, json)
}

fn run_scan(config: AppConfig, file: &Path, all: bool, json: bool) -> Result<()> {
    let scanner = Scanner::new(config.decoder, all);

    // Set up Ctrl+C handler
    let running = scanner.get_running_flag();
    ctrlc::set_handler(move || {
        eprintln!("\n🛑 Received Ctrl+C, stopping scan...");
        running.store(false, Ordering::SeqCst);
    })?;

    let report = scanner.scan_file(file)?;
    for table in &report.tables {
        print_table(table, json)?;
    }

    if report.tables.is_empty() {
        if report.timed_out {
            bail!("no CTid table found within the scan timeout");
        }
        bail!("no CTid table found in {}", file.display());
    }
    info!("✅ Scan completed: {} table(s)", report.tables.len());
    Ok(())
}

fn run_synth(
    config: AppConfig,
    table_path: Option<&Path>,
    output: &Path,
    table_version: Option<u8>,
) -> Result<()> {
    let table = load_table(table_path)?;
    let (version, data) = encode_table(&table, parse_version(table_version)?)?;

    let mut modulator = Modulator::new(config.synth)?;
    let samples = modulator.modulate(&bitstuff(&data));

    let file = std::fs::File::create(output)
        .with_context(|| format!("Failed to create sample file: {}", output.display()))?;
    samples::write_samples(std::io::BufWriter::new(file), &samples)?;

    println!(
        "✅ Wrote {} samples of a version {} table to {}",
        samples.len(),
        version.number(),
        output.display()
    );
    Ok(())
}

/// Generate a default configuration file
fn generate_config_file(output_path: PathBuf) -> Result<()> {
    let config = AppConfig::new();
    config.save_to_file(&output_path)?;

    println!("✅ Generated configuration file: {}", output_path.display());
    println!("📝 Edit the file to customize settings, then run:");
    println!("   ctid-tool --config {} scan samples.csv", output_path.display());

    Ok(())
}
