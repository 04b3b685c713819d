//! `certconform plan` command handler
//!
//! Completes and defines a suite for each configured backend without
//! running anything, so operators can check what their declared
//! capabilities will skip.

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tracing::{debug, info};

use certconform_core::config::{BackendConfig, ConformanceConfig, TimingConfig};
use certconform_suite::{Suite, SuiteSpec};

use crate::cli::PlanArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `plan` command.
///
/// Exits with [`CliError::EmptyPlan`] when any planned backend registers
/// no cases.
pub async fn execute(
    args: PlanArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let config = ConformanceConfig::load(config_path).await?;
    let report = build_plan(&config, args.backend.as_deref())?;

    writer.render(&report)?;

    let empty = report.empty_backends();
    if !empty.is_empty() {
        return Err(CliError::EmptyPlan { backends: empty });
    }
    Ok(())
}

fn build_plan(config: &ConformanceConfig, only: Option<&str>) -> Result<PlanReport, CliError> {
    let selected: Vec<&BackendConfig> = match only {
        Some(name) => vec![
            config
                .backend(name)
                .ok_or_else(|| CliError::Command(format!("unknown backend '{name}'")))?,
        ],
        None => config.backends.iter().collect(),
    };
    if selected.is_empty() {
        return Err(CliError::Config(
            "no backends configured (add a [[backends]] table)".to_owned(),
        ));
    }

    let backends = selected
        .into_iter()
        .map(|backend| plan_backend(backend, &config.timing))
        .collect::<Result<Vec<_>, _>>()?;
    info!(backends = backends.len(), "plan built");
    Ok(PlanReport { backends })
}

/// Resolve one backend into its registered and skipped entries.
pub fn plan_backend(backend: &BackendConfig, timing: &TimingConfig) -> Result<BackendPlan, CliError> {
    let mut suite = Suite::new(SuiteSpec::from_backend(backend, timing));
    let config = suite.complete()?;
    let registration = suite.define()?;
    debug!(
        backend = %backend.name,
        registered = registration.cases.len(),
        skipped = registration.skipped.len(),
        "backend planned"
    );

    let cases = registration
        .cases
        .iter()
        .map(|case| PlannedCase {
            name: case.name(),
            description: case.definition.description(),
            lifecycle: case.definition.is_lifecycle(),
            requires: case.permitted_by.iter().map(|c| c.as_str()).collect(),
            timeout_secs: config.timeout(case.definition.timeout()).as_secs(),
        })
        .collect();
    let skipped = registration
        .skipped
        .iter()
        .map(|entry| SkippedCase {
            name: entry.name,
            description: entry.description,
            blocked_by: entry.blocked_by.iter().map(|c| c.as_str()).collect(),
        })
        .collect();

    Ok(BackendPlan {
        name: config.display_name.clone(),
        target: config.target.to_string(),
        namespace: config.namespace.clone(),
        domain_suffix: config.domain_suffix.clone(),
        unsupported: config.unsupported.iter().map(|c| c.as_str()).collect(),
        cases,
        skipped,
    })
}

#[derive(Debug, Serialize)]
pub struct PlanReport {
    pub backends: Vec<BackendPlan>,
}

impl PlanReport {
    /// Names of backends that would run nothing.
    pub fn empty_backends(&self) -> Vec<String> {
        self.backends
            .iter()
            .filter(|b| b.cases.is_empty())
            .map(|b| b.name.clone())
            .collect()
    }
}

#[derive(Debug, Serialize)]
pub struct BackendPlan {
    pub name: String,
    pub target: String,
    pub namespace: String,
    pub domain_suffix: String,
    pub unsupported: Vec<&'static str>,
    pub cases: Vec<PlannedCase>,
    pub skipped: Vec<SkippedCase>,
}

#[derive(Debug, Serialize)]
pub struct PlannedCase {
    pub name: &'static str,
    pub description: &'static str,
    pub lifecycle: bool,
    pub requires: Vec<&'static str>,
    pub timeout_secs: u64,
}

#[derive(Debug, Serialize)]
pub struct SkippedCase {
    pub name: &'static str,
    pub description: &'static str,
    pub blocked_by: Vec<&'static str>,
}

impl Render for PlanReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        for backend in &self.backends {
            writeln!(
                w,
                "{} -> {} (namespace {}, domain {})",
                backend.name.bold(),
                backend.target,
                backend.namespace,
                backend.domain_suffix
            )?;
            if !backend.unsupported.is_empty() {
                writeln!(w, "  unsupported: {}", backend.unsupported.join(", "))?;
            }

            writeln!(w, "  {} {}", "RUN".green().bold(), backend.cases.len())?;
            for case in &backend.cases {
                let kind = if case.lifecycle { "lifecycle" } else { "issuance" };
                writeln!(
                    w,
                    "    {:<32} {:<10} {:>5}s  {}",
                    case.name, kind, case.timeout_secs, case.description
                )?;
            }

            writeln!(w, "  {} {}", "SKIP".yellow().bold(), backend.skipped.len())?;
            for entry in &backend.skipped {
                writeln!(
                    w,
                    "    {:<32} blocked by {}",
                    entry.name,
                    entry.blocked_by.join(", ").yellow()
                )?;
            }
            writeln!(w)?;
        }
        Ok(())
    }
}
