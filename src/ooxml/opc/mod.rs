//! Open Packaging Conventions (OPC) implementation.
//!
//! This module provides the package layer that PresentationML editing is
//! built on. It includes support for:
//!
//! - Package structure (parts, relationships)
//! - Content type management
//! - ZIP-based physical packaging with byte-identical copies of untouched entries
//!
//! # Performance Features
//!
//! - Uses `memchr` for fast string searching in XML
//! - Uses `atoi_simd` for fast integer parsing
//! - Uses `quick-xml` for efficient zero-copy XML parsing
//! - Decodes and encodes parts in parallel with `rayon`

pub mod constants;
pub mod content_types;
pub mod error;
pub mod package;
pub mod packuri;
pub mod part;
pub mod phys_pkg;
pub mod pkgreader;
pub mod pkgwriter;
pub mod rel;

// Re-export commonly used types
pub use content_types::ContentTypeRegistry;
pub use error::{OpcError, Result};
pub use package::Package;
pub use packuri::PackURI;
pub use part::{Part, Payload};
pub use rel::{Relationship, Relationships};
