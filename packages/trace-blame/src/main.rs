use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use trace_blame::{
    fix_actions, load_config, logging, report, Analysis, BugRecord, Config, Engine, Failure,
    Fingerprint, FixAction, FrameParser, SymbolSnapshot,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Resolve stack traces and attribute failures to components", long_about = None)]
struct Cli {
    /// Config file (searched upward from the working directory if omitted)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Resolve a trace and print the summary
    Analyze {
        #[command(flatten)]
        input: TraceInput,

        /// Print the analysis as JSON instead of the summary
        #[arg(long, default_value_t = false)]
        json: bool,

        /// Pretty-print JSON output
        #[arg(long, default_value_t = false)]
        pretty: bool,
    },

    /// Resolve a trace and write the full text report
    Report {
        #[command(flatten)]
        input: TraceInput,

        /// Report path (defaults to a timestamped name in the working directory)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Print the dedup fingerprint of a message and trace
    Fingerprint {
        /// Failure message
        #[arg(long, default_value = "")]
        message: String,

        /// File holding the raw trace text
        #[arg(long)]
        trace: PathBuf,
    },
}

#[derive(Args, Debug)]
struct TraceInput {
    /// Symbol snapshot (JSON) describing types, components and patches
    #[arg(long)]
    symbols: PathBuf,

    /// File holding the trace
    #[arg(long)]
    trace: PathBuf,

    /// Failure message (or log condition)
    #[arg(long, default_value = "")]
    message: String,

    /// How the trace file is laid out
    #[arg(long, value_enum, default_value_t = FormatArg::Exception)]
    format: FormatArg,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum FormatArg {
    /// Runtime failure trace text
    Exception,
    /// Log-callback trace text
    Log,
    /// A serialized failure chain
    Json,
}

#[derive(Serialize)]
struct AnalysisOutput<'a> {
    message: String,
    fingerprint: String,
    analysis: &'a Analysis,
    fixes: Vec<FixAction>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Analyze {
            input,
            json,
            pretty,
        } => {
            let (record, _) = analyze(&input, &config)?;
            let analysis = record
                .analysis()
                .context("record was not resolved")?;

            if json {
                let output = AnalysisOutput {
                    message: record.error_message(),
                    fingerprint: record.fingerprint().to_hex(),
                    analysis,
                    fixes: fix_actions(analysis),
                };
                let text = if pretty {
                    serde_json::to_string_pretty(&output)?
                } else {
                    serde_json::to_string(&output)?
                };
                println!("{text}");
            } else {
                println!("{}", record.compact_summary(&config.labels));
                for action in fix_actions(analysis) {
                    println!("fix: {action}");
                }
            }
        }
        Commands::Report { input, output } => {
            let (record, snapshot) = analyze(&input, &config)?;
            let path = output.unwrap_or_else(|| {
                PathBuf::from(report::default_file_name(
                    &config.report_file_prefix,
                    &chrono::Local::now(),
                ))
            });
            report::save_report(&record, &*snapshot, &path)?;
            println!("{}", path.display());
        }
        Commands::Fingerprint { message, trace } => {
            let trace = read_text(&trace)?;
            println!("{}", Fingerprint::of(&message, &trace));
        }
    }

    Ok(())
}

fn analyze(input: &TraceInput, config: &Config) -> Result<(BugRecord, Arc<SymbolSnapshot>)> {
    let snapshot = Arc::new(SymbolSnapshot::load(&input.symbols)?);
    let engine = Engine::new(
        FrameParser::from_config(config)?,
        snapshot.clone(),
        snapshot.clone(),
    );

    let text = read_text(&input.trace)?;
    let record = match input.format {
        FormatArg::Exception => {
            BugRecord::from_exception(None, Failure::new("Exception", &input.message, text))
        }
        FormatArg::Log => BugRecord::from_log_line(&input.message, text),
        FormatArg::Json => {
            let failure: Failure = serde_json::from_str(&text).with_context(|| {
                format!("Failed to parse failure chain {}", input.trace.display())
            })?;
            BugRecord::from_exception(None, failure)
        }
    };

    record.ready(&engine)?;
    Ok((record, snapshot))
}

fn read_text(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}
