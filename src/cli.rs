use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "cellscript",
    about = "cellscript: run, compile and inspect braille-cell programs",
    version,
    propagate_version = true,
    disable_help_subcommand = true
)]
pub struct CellscriptCli {
    /// Global: pretty diagnostics
    #[arg(long = "pretty-errors", action = ArgAction::SetTrue, global = true)]
    pub pretty_errors: bool,

    /// Global: path to config (TOML); default: ~/.cellscript/config.toml
    #[arg(long = "config", value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Interpret a program
    ///
    /// Examples:
    ///   cellscript run demo.cell --trace
    ///   cellscript run demo.cell --cache replay.json --report report.json
    Run {
        #[arg(value_name = "INPUT")]
        input: PathBuf,
        /// Write the SAL report (stats, cache size, trace) as JSON
        #[arg(long = "report", value_name = "FILE")]
        report: Option<PathBuf>,
        /// Import a replay bundle before running
        #[arg(long = "cache", value_name = "FILE")]
        cache: Option<PathBuf>,
        /// Export a replay bundle after running
        #[arg(long = "export", value_name = "FILE")]
        export: Option<PathBuf>,
        /// Print the compact trace log to stderr
        #[arg(long = "trace", action = ArgAction::SetTrue)]
        trace: bool,
    },

    /// Emit JavaScript (Node 18+)
    Compile {
        #[arg(value_name = "INPUT")]
        input: PathBuf,
        /// Output file path (short: -o). Defaults to INPUT with a .js extension.
        #[arg(short = 'o', long = "out", value_name = "FILE")]
        out: Option<PathBuf>,
    },

    /// Print the token stream
    Tokens {
        #[arg(value_name = "INPUT")]
        input: PathBuf,
    },

    /// Print the AST
    Ast {
        #[arg(value_name = "INPUT")]
        input: PathBuf,
    },

    /// Transliterate readable keyword spelling into cells
    Spell {
        #[arg(value_name = "INPUT")]
        input: PathBuf,
        /// Output file path (short: -o). Defaults to stdout.
        #[arg(short = 'o', long = "out", value_name = "FILE")]
        out: Option<PathBuf>,
    },

    /// Encode text as cells, one per byte
    Encode {
        #[arg(value_name = "TEXT")]
        text: String,
    },

    /// Decode cells back to text
    Decode {
        #[arg(value_name = "CELLS")]
        text: String,
    },
}
