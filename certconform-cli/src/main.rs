//! certconform -- certificate issuer conformance CLI

mod cli;
mod commands;
mod error;
mod logging;
mod output;

use std::process::ExitCode;

use clap::Parser;
use colored::Colorize;

use certconform_core::config::ConformanceConfig;

use crate::cli::{Cli, Commands};
use crate::error::CliError;
use crate::output::OutputWriter;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // 로깅 섹션만 미리 읽음. 설정 오류는 각 명령이 보고합니다.
    let loaded = ConformanceConfig::load(&cli.config)
        .await
        .ok()
        .map(|c| c.general);
    let general = logging::effective_general(loaded, cli.log_level.as_deref());
    if let Err(e) = logging::init_tracing(&general) {
        eprintln!("{} {e}", "error:".red().bold());
        return ExitCode::from(2);
    }

    certconform_core::metrics::describe_all();
    tracing::debug!(config = %cli.config.display(), "certconform starting");

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {e}", "error:".red().bold());
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let writer = OutputWriter::new(cli.output);
    match cli.command {
        Commands::Config(args) => commands::config::execute(args, &cli.config, &writer).await,
        Commands::Plan(args) => commands::plan::execute(args, &cli.config, &writer).await,
        Commands::Capabilities => commands::capabilities::execute(&writer),
        Commands::RbacMatrix(args) => commands::rbac_matrix::execute(args, &writer),
    }
}
