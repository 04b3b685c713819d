//! Command handlers -- one module per subcommand

pub mod capabilities;
pub mod config;
pub mod plan;
pub mod rbac_matrix;
