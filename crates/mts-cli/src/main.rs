//! MTS Telemetry - operator tools for correlation IDs, trace headers and redaction

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use mts_core::pii::validate_all;
use mts_core::trace_context::parse_traceparent;
use mts_core::{
    builtin_patterns, ConfigLoader, CorrelationId, PiiPattern, PiiScrubber, TelemetryConfig,
    TraceContext, Value,
};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "mts-telemetry")]
#[command(author = "MTSynergy")]
#[command(version)]
#[command(about = "Inspect telemetry identifiers and scrub PII from JSON", long_about = None)]
struct Cli {
    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true, env = "MTS_TELEMETRY_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate or validate correlation IDs
    CorrelationId {
        /// Check an existing ID instead of generating
        #[arg(long)]
        validate: Option<String>,

        /// Number of IDs to generate
        #[arg(short = 'n', long, default_value = "1")]
        count: usize,
    },

    /// Work with W3C traceparent headers
    Traceparent {
        #[command(subcommand)]
        action: TraceparentAction,
    },

    /// Redact PII from a JSON document
    Scrub {
        /// JSON array of {name, pattern, replacement}
        #[arg(short, long)]
        patterns: Option<PathBuf>,

        /// Also apply the built-in catalogue
        #[arg(long)]
        builtin: bool,

        /// Input file (reads stdin when omitted)
        file: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum TraceparentAction {
    /// Parse a header value and print its fields
    Parse {
        header: String,
    },

    /// Start a new root trace
    New {
        /// Clear the sampled flag
        #[arg(long)]
        unsampled: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    // Diagnostics go to stderr so stdout stays machine-readable
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::CorrelationId { validate, count } => correlation_id_command(validate, count),
        Commands::Traceparent { action } => traceparent_command(action),
        Commands::Scrub {
            patterns,
            builtin,
            file,
        } => {
            let config = load_config(cli.config);
            scrub_command(&config, patterns.as_deref(), builtin, file.as_deref())
        }
    }
}

fn load_config(cli_path: Option<PathBuf>) -> TelemetryConfig {
    let loader = ConfigLoader::new().with_cli_path(cli_path);
    match loader.load() {
        Ok(config) => {
            info!("Configuration loaded successfully");
            config
        }
        Err(e) => {
            warn!("Failed to load configuration: {}, using defaults", e);
            TelemetryConfig::default()
        }
    }
}

fn correlation_id_command(validate: Option<String>, count: usize) -> Result<()> {
    if let Some(candidate) = validate {
        if CorrelationId::is_valid(&candidate) {
            println!("valid");
            return Ok(());
        }
        bail!("'{}' is not a valid correlation ID", candidate);
    }

    for _ in 0..count {
        println!("{}", CorrelationId::generate());
    }
    Ok(())
}

fn traceparent_command(action: TraceparentAction) -> Result<()> {
    match action {
        TraceparentAction::Parse { header } => {
            let context = parse_traceparent(header.trim())
                .with_context(|| format!("Invalid traceparent: {}", header))?;
            println!("{}", serde_json::to_string_pretty(&describe(&context))?);
        }
        TraceparentAction::New { unsampled } => {
            println!("{}", TraceContext::generate(!unsampled).to_traceparent());
        }
    }
    Ok(())
}

fn describe(context: &TraceContext) -> serde_json::Value {
    serde_json::json!({
        "traceId": context.trace_id,
        "spanId": context.span_id,
        "traceFlags": format!("{:02x}", context.trace_flags),
        "sampled": context.is_sampled(),
    })
}

fn scrub_command(
    config: &TelemetryConfig,
    patterns_path: Option<&Path>,
    builtin: bool,
    input: Option<&Path>,
) -> Result<()> {
    let patterns = collect_patterns(config, patterns_path, builtin)?;
    let document = read_document(input)?;

    let scrubbed = scrub_document(&patterns, config, document);
    println!("{}", serde_json::to_string_pretty(&scrubbed)?);
    Ok(())
}

/// Patterns from the file, the config, then the built-ins.
///
/// With nothing configured the built-in catalogue is used alone.
fn collect_patterns(
    config: &TelemetryConfig,
    patterns_path: Option<&Path>,
    builtin: bool,
) -> Result<Vec<PiiPattern>> {
    let mut patterns = Vec::new();

    if let Some(path) = patterns_path {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read patterns from {:?}", path))?;
        let loaded: Vec<PiiPattern> = serde_json::from_str(&raw)
            .with_context(|| format!("Patterns file {:?} is not a pattern array", path))?;
        validate_all(&loaded)?;
        patterns.extend(loaded);
    }

    patterns.extend(config.logger.patterns.iter().cloned());

    if builtin || config.logger.use_builtin_patterns || patterns.is_empty() {
        patterns.extend(builtin_patterns());
    }

    debug!("Scrubbing with {} patterns", patterns.len());
    Ok(patterns)
}

fn read_document(input: Option<&Path>) -> Result<serde_json::Value> {
    let raw = match input {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {:?}", path))?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    serde_json::from_str(&raw).context("Input is not valid JSON")
}

fn scrub_document(
    patterns: &[PiiPattern],
    config: &TelemetryConfig,
    document: serde_json::Value,
) -> serde_json::Value {
    let scrubber = PiiScrubber::new(patterns);
    scrubber
        .scrub(&Value::from(document), &config.redaction.scrub_options())
        .to_json()
}
