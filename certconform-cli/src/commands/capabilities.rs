//! `certconform capabilities` command handler

use std::io::Write;

use serde::Serialize;

use certconform_core::capability::Capability;
use certconform_suite::catalog::entries;

use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `capabilities` command.
pub fn execute(writer: &OutputWriter) -> Result<(), CliError> {
    writer.render(&build_report())?;
    Ok(())
}

fn build_report() -> CapabilitiesReport {
    let catalog = entries();
    let capabilities = Capability::ALL
        .iter()
        .map(|&capability| CapabilityInfo {
            name: capability.as_str(),
            description: capability.description(),
            required_by: catalog
                .iter()
                .filter(|entry| entry.required().contains(capability))
                .map(|entry| entry.name())
                .collect(),
        })
        .collect();
    CapabilitiesReport { capabilities }
}

#[derive(Serialize)]
pub struct CapabilitiesReport {
    pub capabilities: Vec<CapabilityInfo>,
}

#[derive(Serialize)]
pub struct CapabilityInfo {
    pub name: &'static str,
    pub description: &'static str,
    /// Catalog entries skipped when this capability is declared unsupported
    pub required_by: Vec<&'static str>,
}

impl Render for CapabilitiesReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        for info in &self.capabilities {
            writeln!(w, "{:<24} {}", info.name.bold(), info.description)?;
            if !info.required_by.is_empty() {
                writeln!(w, "{:<24} skips: {}", "", info.required_by.join(", "))?;
            }
        }
        Ok(())
    }
}
