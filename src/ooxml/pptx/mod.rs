//! PresentationML structure editing.
//!
//! This module works on an [`opc::Package`](crate::ooxml::opc::Package)
//! holding a .pptx presentation:
//!
//! - `manifest`: the slide order list (`p:sldIdLst`) of the presentation part
//! - `allocator`: slide ids, relationship ids and part names for new slides
//! - `duplicate`: slide duplication and order editing
//! - `graph`: part reachability over relationships and the slide order
//! - `cleanup`: removal of everything no longer reachable
//!
//! # Example
//!
//! ```rust,no_run
//! use pptx_engine::ooxml::opc::Package;
//! use pptx_engine::ooxml::pptx::{clean, duplicate, insert_into_order};
//!
//! let mut pkg = Package::open("deck.pptx")?;
//! let copy = duplicate(&mut pkg, "ppt/slides/slide2.xml")?;
//! insert_into_order(&mut pkg, copy.slide_id, &copy.relationship_id, 3)?;
//! let removed = clean(&mut pkg)?;
//! println!("removed {} parts", removed.len());
//! pkg.save_to("deck-edited.pptx")?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod allocator;
pub mod cleanup;
pub mod duplicate;
pub mod graph;
pub mod manifest;

pub use allocator::{IdCeiling, SlideAllocation, allocate_relationship_id, allocate_slide_id};
pub use cleanup::clean;
pub use duplicate::{DuplicateOutcome, duplicate, insert_into_order, remove_from_order};
pub use graph::RelationshipGraph;
pub use manifest::{OrderManifest, SlideEntry};
