//! Command handlers, one module per subcommand.

pub mod completion;
pub mod config_cmd;
pub mod eval;
pub mod sync;
pub mod translate;
