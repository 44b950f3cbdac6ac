//! cellscript command-line driver.
use clap::Parser; // trait import enables CellscriptCli::parse()

use cellscript::cli::{CellscriptCli, Command};
use cellscript::commands::{self, run::RunOpts};
use cellscript::config::Config;
use cellscript::core::logging;

fn main() -> anyhow::Result<()> {
    logging::init();
    let args = CellscriptCli::parse();
    let pretty = args.pretty_errors;

    let code = match args.cmd {
        Command::Encode { text } => commands::encode::encode_main(&text)?,
        Command::Decode { text } => commands::encode::decode_main(&text)?,
        Command::Spell { input, out } => commands::spell::main(&input, out)?,
        cmd => {
            let cfg = Config::load(&args.config)?;
            match cmd {
                Command::Run {
                    input,
                    report,
                    cache,
                    export,
                    trace,
                } => {
                    let opts = RunOpts {
                        report,
                        cache,
                        export,
                        trace,
                    };
                    commands::run::main_with_opts(&input, &opts, &cfg, pretty)?
                }
                Command::Compile { input, out } => {
                    commands::compile::main_with_opts(&input, out, &cfg, pretty)?
                }
                Command::Tokens { input } => commands::tokens::main(&input, &cfg, pretty)?,
                Command::Ast { input } => commands::ast::main(&input, &cfg, pretty)?,
                Command::Encode { .. } | Command::Decode { .. } | Command::Spell { .. } => 0,
            }
        }
    };

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
