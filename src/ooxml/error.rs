//! Engine-level error types.
//!
//! Package operations fail with [`OpcError`]; validation never fails but its
//! findings can be turned into a blocking error through
//! [`ValidationReport::ensure_savable`](crate::ooxml::validate::ValidationReport::ensure_savable).
use crate::ooxml::opc::error::OpcError;
use crate::ooxml::validate::Finding;
use thiserror::Error;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, OoxmlError>;

#[derive(Error, Debug)]
pub enum OoxmlError {
    /// Archive, lookup or editing failure in the package layer
    #[error("OPC error: {0}")]
    Opc(#[from] OpcError),

    /// A structural invariant is violated
    #[error("{} structural error(s), first: {}", .findings.len(), first(.findings))]
    Structural { findings: Vec<Finding> },

    /// An edit introduced schema violations absent from the baseline
    #[error("{} schema regression(s), first: {}", .findings.len(), first(.findings))]
    SchemaRegression { findings: Vec<Finding> },
}

fn first(findings: &[Finding]) -> String {
    findings
        .first()
        .map_or_else(|| "none".to_string(), Finding::to_string)
}

impl OoxmlError {
    /// The findings behind a validation error.
    pub fn findings(&self) -> &[Finding] {
        match self {
            OoxmlError::Opc(_) => &[],
            OoxmlError::Structural { findings } | OoxmlError::SchemaRegression { findings } => {
                findings
            },
        }
    }

    /// Whether the caller referenced a part, relationship or slide id that does
    /// not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, OoxmlError::Opc(e) if e.is_not_found())
    }
}
