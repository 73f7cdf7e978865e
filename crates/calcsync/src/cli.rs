//! Clap CLI definitions for the `calcsync` command.

use std::path::PathBuf;

use calcsync_core::ComparisonMode;
use calcsync_formula::BlankPolicy;
use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

/// calcsync -- keep REDCap calculated fields in step with their formulas.
///
/// Recomputes a calculated field for every record, shows the records whose
/// stored value is out of date, and writes the corrected values back after
/// confirmation.
#[derive(Parser, Debug)]
#[command(
    name = "calcsync",
    about = "Recompute REDCap calculated fields and push corrected values back",
    version,
    propagate_version = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Global flags available to all subcommands.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// YAML config file (default: calcsync.yaml in the working directory).
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// REDCap API URL (overrides REDCAP_API_URL).
    #[arg(long, global = true)]
    pub url: Option<String>,

    /// REDCap API token (overrides REDCAP_API_TOKEN).
    #[arg(long, global = true)]
    pub token: Option<String>,

    /// Field holding the record identifier.
    #[arg(long, global = true, value_name = "FIELD")]
    pub record_id_field: Option<String>,

    /// How stored values are compared: numeric or strict.
    #[arg(long, global = true, value_name = "MODE")]
    pub comparison: Option<ComparisonMode>,

    /// Treatment of blank referenced values: error or zero.
    #[arg(long, global = true, value_name = "POLICY")]
    pub blank_values: Option<BlankPolicy>,

    /// Output in JSON format.
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable debug logging on stderr.
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output.
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,
}

/// All available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Recompute a calculated field and update mismatching records.
    Sync(SyncArgs),

    /// Report mismatching records without writing anything.
    Check(CheckArgs),

    /// Show how a field's formula is rewritten for evaluation.
    Translate(TranslateArgs),

    /// Evaluate a formula locally against given values.
    Eval(EvalArgs),

    /// Show the resolved configuration.
    Config,

    /// Generate shell completion scripts.
    Completion(CompletionArgs),
}

#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Calculated field to recompute (prompted for when omitted).
    pub field: Option<String>,

    /// Apply updates without asking for confirmation.
    #[arg(short = 'y', long)]
    pub yes: bool,

    /// Report mismatches but never write.
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Calculated field to recompute (prompted for when omitted).
    pub field: Option<String>,
}

#[derive(Args, Debug)]
pub struct TranslateArgs {
    /// Field whose formula is fetched from the project metadata.
    pub field: Option<String>,

    /// Translate this formula instead of fetching one.
    #[arg(long, conflicts_with = "field")]
    pub formula: Option<String>,

    /// Action tag to apply (e.g. "@CALCTEXT"). Defaults to the field's own.
    #[arg(long)]
    pub action_tag: Option<String>,
}

#[derive(Args, Debug)]
pub struct EvalArgs {
    /// Formula in REDCap syntax, e.g. "[weight] / ([height] ^ 2)".
    #[arg(long)]
    pub formula: String,

    /// Action tag to apply (e.g. "@CALCTEXT").
    #[arg(long)]
    pub action_tag: Option<String>,

    /// Field value as key=value (repeatable).
    #[arg(long = "var", value_name = "KEY=VALUE")]
    pub vars: Vec<String>,
}

#[derive(Args, Debug)]
pub struct CompletionArgs {
    /// Target shell.
    #[arg(value_enum)]
    pub shell: Shell,
}
