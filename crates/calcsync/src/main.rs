//! `calcsync` -- recompute REDCap calculated fields.
//!
//! Parses CLI arguments with clap, resolves the runtime context, and
//! dispatches to command handlers.

mod cli;
mod commands;
mod context;
mod output;
mod prompt;

use clap::Parser;

use cli::{Cli, Commands};
use context::RuntimeContext;

/// Crates whose `debug!` output `--verbose` turns on.
const VERBOSE_FILTER: &str =
    "calcsync=debug,calcsync_core=debug,calcsync_config=debug,calcsync_formula=debug,calcsync_redcap=debug";

fn main() {
    // Ctrl+C at the confirmation prompt aborts before anything is written.
    let _ = ctrlc::set_handler(|| {
        eprintln!();
        std::process::exit(130);
    });

    let cli = Cli::parse();
    let ctx = RuntimeContext::from_global_args(&cli.global);

    if ctx.verbose {
        tracing_subscriber::fmt()
            .with_env_filter(VERBOSE_FILTER)
            .with_writer(std::io::stderr)
            .init();
    }

    let result = match cli.command {
        Some(Commands::Sync(args)) => commands::sync::run(&ctx, &args),
        Some(Commands::Check(args)) => commands::sync::run_check(&ctx, &args),
        Some(Commands::Translate(args)) => commands::translate::run(&ctx, &args),
        Some(Commands::Eval(args)) => commands::eval::run(&ctx, &args),
        Some(Commands::Config) => commands::config_cmd::run(&ctx),
        Some(Commands::Completion(args)) => commands::completion::run(&args),
        None => {
            use clap::CommandFactory;
            Cli::command().print_help().ok();
            println!();
            Ok(())
        }
    };

    if let Err(e) = result {
        let message = output::error_message(cli.global.json, &e);
        output::output_error(cli.global.json, &message);
        std::process::exit(1);
    }
}
