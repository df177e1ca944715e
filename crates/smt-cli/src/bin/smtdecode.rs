use std::path::PathBuf;

use clap::{Parser, Subcommand};

use smt_cli::commands::config_ops;
use smt_cli::commands::decode_ops::{self, DecodeOptions, Mode, OutputFormat};
use smt_cli::trace_init;

#[derive(Parser)]
#[command(name = "smtdecode", about = "Statistical machine translation decoder")]
struct Cli {
    /// Write JSON trace logs to this directory instead of stderr
    /// (requires --features trace)
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Translate sentences, one per line, from a file or stdin
    Decode {
        /// Model file (TOML)
        model: PathBuf,
        /// Input file (default: stdin)
        input: Option<PathBuf>,
        /// Search mode
        #[arg(long, value_enum, default_value = "phrase")]
        mode: Mode,
        /// Settings file (default: embedded settings)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Print this many translations per sentence as n-best lines
        #[arg(short, long, default_value = "0")]
        nbest: usize,
        /// Skip n-best entries whose text was already printed
        #[arg(long)]
        distinct: bool,
        /// Number of sentences decoded in parallel
        #[arg(short, long, default_value = "1")]
        threads: usize,
        /// Output as JSON instead of text
        #[arg(long)]
        json: bool,
        /// Append word alignment to each output line
        #[arg(long)]
        alignment: bool,
        /// Report the source span of every phrase
        #[arg(long)]
        segmentation: bool,
        /// Dump the search graph of every sentence into this directory
        #[arg(long)]
        search_graph: Option<PathBuf>,
    },
    /// Export default settings as TOML
    SettingsExport,
    /// Validate a custom settings TOML file
    SettingsValidate {
        /// Path to the TOML file
        file: String,
    },
    /// Validate a model file
    ModelValidate {
        /// Path to the TOML file
        file: String,
    },
}

fn main() {
    let cli = Cli::parse();
    let _trace = trace_init::init_tracing(cli.log_dir.as_deref());

    match cli.command {
        Command::Decode {
            model,
            input,
            mode,
            config,
            nbest,
            distinct,
            threads,
            json,
            alignment,
            segmentation,
            search_graph,
        } => decode_ops::decode_cmd(&DecodeOptions {
            model,
            mode,
            config,
            input,
            threads,
            format: OutputFormat {
                nbest,
                distinct,
                json,
                alignment,
                segmentation,
            },
            search_graph,
        }),
        Command::SettingsExport => config_ops::settings_export(),
        Command::SettingsValidate { file } => config_ops::settings_validate(&file),
        Command::ModelValidate { file } => config_ops::model_validate(&file),
    }
}
