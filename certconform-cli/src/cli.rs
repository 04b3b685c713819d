//! CLI argument parsing using clap derive API
//!
//! Purely declarative: no I/O happens here.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// certconform -- conformance planning for certificate issuing backends.
///
/// Use `certconform <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "certconform", version, about, long_about = None)]
pub struct Cli {
    /// Path to the certconform.toml configuration file.
    #[arg(short, long, default_value = "certconform.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage configuration.
    Config(ConfigArgs),

    /// Show which cases each configured backend would run or skip.
    Plan(PlanArgs),

    /// List the optional capabilities a backend can declare unsupported.
    Capabilities,

    /// Print the default aggregated-role authorization expectations.
    RbacMatrix(RbacMatrixArgs),
}

// ---- config ----

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors.
    Validate,
    /// Show the effective configuration (file + env overrides + defaults).
    Show {
        /// Show only one section (general, timing, backends).
        #[arg(long)]
        section: Option<String>,
    },
}

// ---- plan ----

#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Plan a single backend by name (default: every configured backend).
    #[arg(long)]
    pub backend: Option<String>,
}

// ---- rbac-matrix ----

#[derive(Args, Debug)]
pub struct RbacMatrixArgs {
    /// Namespace the probes are scoped to.
    #[arg(long, default_value = "default")]
    pub namespace: String,
}
