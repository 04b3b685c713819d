//! `certconform rbac-matrix` command handler

use std::io::Write;

use serde::Serialize;

use certconform_suite::AuthorizationMatrix;
use certconform_suite::rbac::{RESOURCES, ROLES};

use crate::cli::RbacMatrixArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `rbac-matrix` command.
pub fn execute(args: RbacMatrixArgs, writer: &OutputWriter) -> Result<(), CliError> {
    writer.render(&build_report(&args.namespace))?;
    Ok(())
}

fn build_report(namespace: &str) -> RbacMatrixReport {
    let matrix = AuthorizationMatrix::aggregated_roles(namespace);
    let rows = ROLES
        .iter()
        .flat_map(|&role| RESOURCES.iter().map(move |&resource| (role, resource)))
        .map(|(role, resource)| {
            let mut row = MatrixRow {
                role,
                resource,
                allowed: Vec::new(),
                denied: Vec::new(),
            };
            for e in matrix.expectations() {
                if e.request.role == role && e.request.resource == resource {
                    let verb = e.request.verb.as_str();
                    if e.allowed {
                        row.allowed.push(verb);
                    } else {
                        row.denied.push(verb);
                    }
                }
            }
            row
        })
        .collect();

    RbacMatrixReport {
        namespace: namespace.to_owned(),
        expectations: matrix.expectations().len(),
        rows,
    }
}

#[derive(Serialize)]
pub struct RbacMatrixReport {
    pub namespace: String,
    /// Number of probe cases
    pub expectations: usize,
    pub rows: Vec<MatrixRow>,
}

#[derive(Serialize)]
pub struct MatrixRow {
    pub role: &'static str,
    pub resource: &'static str,
    pub allowed: Vec<&'static str>,
    pub denied: Vec<&'static str>,
}

impl Render for RbacMatrixReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(
            w,
            "Authorization expectations in {} ({} probes)",
            self.namespace.bold(),
            self.expectations
        )?;
        writeln!(w, "{:<8} {:<22} {:<40} {}", "ROLE", "RESOURCE", "ALLOWED", "DENIED")?;
        for row in &self.rows {
            let denied = if row.denied.is_empty() {
                "-".to_owned()
            } else {
                row.denied.join(",")
            };
            writeln!(
                w,
                "{:<8} {:<22} {:<40} {}",
                row.role,
                row.resource,
                row.allowed.join(","),
                denied.red()
            )?;
        }
        Ok(())
    }
}
