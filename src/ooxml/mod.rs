//! Office Open XML package engine for PresentationML.
//!
//! The module is organized into layers:
//!
//! 1. **OPC Layer** (`opc`): the package as a working tree of parts, the
//!    archive codec, relationships and the content-type registry
//! 2. **PresentationML editing** (`pptx`): slide order, id allocation,
//!    duplication, reachability and cleanup
//! 3. **Validation** (`validate`): structural invariants and differential
//!    schema conformance
//! 4. **Entry points** (`api`) and the engine error type (`error`)
//!
//! # Example
//!
//! ```rust,no_run
//! use pptx_engine::ooxml::api;
//!
//! let mut pkg = api::load("deck.pptx")?;
//! let findings = api::validate_structure(&pkg);
//! println!("{} findings", findings.len());
//! api::clean(&mut pkg)?;
//! api::save(&pkg, "deck-clean.pptx")?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
pub mod api;
pub mod error;
pub mod opc;
pub mod pptx;
pub mod validate;

#[cfg(test)]
pub(crate) mod fixtures;

// Re-export commonly used types from OPC layer
pub use opc::{OpcError, PackURI, Package};

// Re-export error types
pub use error::{OoxmlError, Result};

pub use validate::{CheckKind, Finding, Location, Severity, ValidationReport};
