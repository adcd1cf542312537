//! pptx-engine - referentially safe editing of PowerPoint (.pptx) packages
//!
//! The engine loads a presentation archive into an editable working tree,
//! lets callers duplicate slides, reorder them and edit parts as text, then
//! removes whatever became unreachable and proves the result is still a
//! conformant document before it is written back.
//!
//! # Features
//!
//! - **Archive codec**: untouched entries are copied byte-for-byte on save
//! - **Cleanup**: reachability over relationships and the slide order,
//!   idempotent removal of orphaned parts and dangling references
//! - **Duplication**: monotonic slide ids and relationship ids, cloned notes
//! - **Validation**: structural invariants plus schema checks diffed against
//!   a baseline, with in-place whitespace repair
//!
//! # Example
//!
//! ```no_run
//! use pptx_engine::ooxml::api;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut pkg = api::load("deck.pptx")?;
//! let baseline = pkg.clone();
//!
//! let copy = api::duplicate(&mut pkg, "ppt/slides/slide1.xml")?;
//! api::insert_into_order(&mut pkg, copy.slide_id, &copy.relationship_id, 2)?;
//! api::clean(&mut pkg)?;
//!
//! let report = api::save_checked(&mut pkg, &baseline, "deck-out.pptx", false)?;
//! println!("{} repairs", report.repairs().count());
//! # Ok(())
//! # }
//! ```

/// Shared XML text utilities and engine configuration
pub mod common;

/// OOXML package layer, PresentationML editing and validation
pub mod ooxml;

// Re-export commonly used types for convenience
pub use common::config::{Compression, EngineConfig};
pub use ooxml::api;
pub use ooxml::{OoxmlError, Package, ValidationReport};
