//! Package validation.
//!
//! Two validators produce [`Finding`]s:
//!
//! - [`structural`] checks the cross-part invariants of a presentation
//!   (references resolve, ids are unique, every slide has one layout, ...).
//! - [`schema`] checks each XML part against the bundled rule sets, reporting
//!   only findings that a baseline package does not already have.
//!
//! Validators never fail: a part that cannot be read becomes a finding.
//! Whether the findings block saving is decided by the caller, usually
//! through [`ValidationReport::ensure_savable`].

pub mod schema;
pub mod structural;

use crate::ooxml::error::OoxmlError;
use serde::Serialize;
use std::fmt;

pub use schema::{validate_part_xml, validate_schema};
pub use structural::validate_structure;

/// Which check produced a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    WellFormed,
    Reference,
    ContentType,
    UniqueIds,
    SlideLayout,
    NotesOwnership,
    IgnorableNamespace,
    CleanupIdempotence,
    BinaryRoundTrip,
    MasterLayoutIds,
    Schema,
}

impl CheckKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckKind::WellFormed => "well_formed",
            CheckKind::Reference => "reference",
            CheckKind::ContentType => "content_type",
            CheckKind::UniqueIds => "unique_ids",
            CheckKind::SlideLayout => "slide_layout",
            CheckKind::NotesOwnership => "notes_ownership",
            CheckKind::IgnorableNamespace => "ignorable_namespace",
            CheckKind::CleanupIdempotence => "cleanup_idempotence",
            CheckKind::BinaryRoundTrip => "binary_round_trip",
            CheckKind::MasterLayoutIds => "master_layout_ids",
            CheckKind::Schema => "schema",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    /// A defect the validator fixed in place.
    Repaired,
}

/// Where a finding applies.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Location {
    /// Member name of the part, or "/" for the package as a whole.
    pub part: String,
    /// Element path inside the part, e.g. `/p:sld/p:cSld/p:spTree/p:sp[2]`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element: Option<String>,
}

impl Location {
    pub fn part(part: impl Into<String>) -> Self {
        Self {
            part: part.into(),
            element: None,
        }
    }

    pub fn element(part: impl Into<String>, element: impl Into<String>) -> Self {
        Self {
            part: part.into(),
            element: Some(element.into()),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.element {
            Some(element) => write!(f, "{}:{}", self.part, element),
            None => f.write_str(&self.part),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub kind: CheckKind,
    pub severity: Severity,
    pub location: Location,
    pub message: String,
}

impl Finding {
    pub fn error(kind: CheckKind, location: Location, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: Severity::Error,
            location,
            message: message.into(),
        }
    }

    pub fn warning(kind: CheckKind, location: Location, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: Severity::Warning,
            location,
            message: message.into(),
        }
    }

    pub fn repaired(kind: CheckKind, location: Location, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: Severity::Repaired,
            location,
            message: message.into(),
        }
    }

    #[inline]
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Repaired => "repaired",
        };
        write!(
            f,
            "[{}] {} at {}: {}",
            severity,
            self.kind.as_str(),
            self.location,
            self.message
        )
    }
}

/// Findings of one or both validators.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub findings: Vec<Finding>,
}

impl ValidationReport {
    pub fn new(findings: Vec<Finding>) -> Self {
        Self { findings }
    }

    /// Append the findings of another pass.
    pub fn extend(&mut self, findings: impl IntoIterator<Item = Finding>) {
        self.findings.extend(findings);
    }

    pub fn errors(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(|f| f.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(|f| f.severity == Severity::Warning)
    }

    pub fn repairs(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(|f| f.severity == Severity::Repaired)
    }

    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }

    /// Gate for saving.
    ///
    /// Structural errors always block. Schema errors block unless
    /// `accept_schema_regressions` is set. Warnings and repairs never block.
    pub fn ensure_savable(&self, accept_schema_regressions: bool) -> Result<(), OoxmlError> {
        let (schema, structural): (Vec<Finding>, Vec<Finding>) = self
            .errors()
            .cloned()
            .partition(|f| f.kind == CheckKind::Schema);

        if !structural.is_empty() {
            return Err(OoxmlError::Structural {
                findings: structural,
            });
        }
        if !schema.is_empty() && !accept_schema_regressions {
            return Err(OoxmlError::SchemaRegression { findings: schema });
        }
        Ok(())
    }
}
