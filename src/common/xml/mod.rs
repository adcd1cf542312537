//! XML text utilities shared by the package layers.

pub mod escape;
pub mod format;
pub mod scan;

pub use escape::{escape_smart_punctuation, escape_xml, restore_smart_punctuation, unescape_xml};
pub use format::{FormatError, condense, indent};
