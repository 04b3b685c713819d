//! `certconform config` command handler

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use certconform_core::config::{BackendConfig, ConformanceConfig};

use crate::cli::{ConfigAction, ConfigArgs};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `config` command.
pub async fn execute(
    args: ConfigArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    match args.action {
        ConfigAction::Validate => execute_validate(config_path, writer).await,
        ConfigAction::Show { section } => execute_show(config_path, section, writer).await,
    }
}

/// Load and validate the file, reporting every failure instead of
/// stopping at the first invalid backend.
async fn execute_validate(config_path: &Path, writer: &OutputWriter) -> Result<(), CliError> {
    info!(path = %config_path.display(), "validating configuration");

    let report = match ConformanceConfig::load(config_path).await {
        Ok(config) => ConfigValidationReport {
            source: config_path.display().to_string(),
            valid: true,
            backends: config.backends.iter().map(|b| b.name.clone()).collect(),
            errors: Vec::new(),
        },
        Err(e) => ConfigValidationReport {
            source: config_path.display().to_string(),
            valid: false,
            backends: Vec::new(),
            errors: vec![e.to_string()],
        },
    };

    writer.render(&report)?;

    if !report.valid {
        return Err(CliError::Config("configuration is invalid".to_owned()));
    }
    Ok(())
}

async fn execute_show(
    config_path: &Path,
    section: Option<String>,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    info!(path = %config_path.display(), "loading configuration");

    let config = ConformanceConfig::load(config_path).await?;
    let report = build_config_report(&config, &config_path.display().to_string(), section)?;

    writer.render(&report)?;
    Ok(())
}

#[derive(Serialize)]
struct BackendsSection<'a> {
    backends: &'a [BackendConfig],
}

fn build_config_report(
    config: &ConformanceConfig,
    source: &str,
    section: Option<String>,
) -> Result<ConfigReport, CliError> {
    let serialize = |result: Result<String, toml::ser::Error>| {
        result.unwrap_or_else(|e| format!("(serialization error: {e})"))
    };

    let config_toml = match section.as_deref() {
        None => serialize(toml::to_string_pretty(config)),
        Some("general") => serialize(toml::to_string_pretty(&config.general)),
        Some("timing") => serialize(toml::to_string_pretty(&config.timing)),
        Some("backends") => serialize(toml::to_string_pretty(&BackendsSection {
            backends: &config.backends,
        })),
        Some(other) => {
            return Err(CliError::Command(format!(
                "unknown section: {other} (expected: general, timing, backends)"
            )));
        }
    };

    Ok(ConfigReport {
        source: source.to_owned(),
        section,
        config: serde_json::to_value(config)?,
        config_toml,
    })
}

/// Effective configuration. JSON output carries the structured value,
/// text output the TOML rendering.
#[derive(Serialize)]
pub struct ConfigReport {
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    pub config: serde_json::Value,
    #[serde(skip)]
    pub config_toml: String,
}

impl Render for ConfigReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        match &self.section {
            Some(section) => writeln!(
                w,
                "Configuration {} (source: {})",
                format!("[{section}]").bold(),
                self.source
            )?,
            None => writeln!(w, "Configuration (source: {})", self.source.bold())?,
        }
        writeln!(w)?;
        write!(w, "{}", self.config_toml)
    }
}

/// Result of `config validate`.
#[derive(Serialize)]
pub struct ConfigValidationReport {
    pub source: String,
    pub valid: bool,
    /// Backend names found in a valid file
    pub backends: Vec<String>,
    pub errors: Vec<String>,
}

impl Render for ConfigValidationReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Config Validation: {}", self.source.bold())?;
        if self.valid {
            writeln!(w, "  Result: {}", "VALID".green().bold())?;
            writeln!(w, "  Backends: {}", self.backends.len())?;
            for name in &self.backends {
                writeln!(w, "    - {name}")?;
            }
        } else {
            writeln!(w, "  Result: {}", "INVALID".red().bold())?;
            for err in &self.errors {
                writeln!(w, "  Error: {}", err.red())?;
            }
        }
        Ok(())
    }
}
