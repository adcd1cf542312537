/// Error types for OPC package operations
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OpcError {
    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid pack URI: {0}")]
    InvalidPackUri(String),

    #[error("Part not found: {0}")]
    PartNotFound(String),

    #[error("Relationship not found: {0}")]
    RelationshipNotFound(String),

    #[error("Slide id not found in presentation order: {0}")]
    SlideIdNotFound(u32),

    #[error("Invalid part: {0}")]
    InvalidPart(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Identifier space exhausted: {0}")]
    IdentifierExhausted(String),

    #[error("XML parsing error: {0}")]
    XmlError(String),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::common::config::ConfigError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Quick-XML error: {0}")]
    QuickXmlError(#[from] quick_xml::Error),

    #[error("Attribute error: {0}")]
    AttrError(String),
}

impl From<quick_xml::events::attributes::AttrError> for OpcError {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        OpcError::AttrError(err.to_string())
    }
}

impl From<crate::common::xml::FormatError> for OpcError {
    fn from(err: crate::common::xml::FormatError) -> Self {
        OpcError::XmlError(err.to_string())
    }
}

impl OpcError {
    /// The operation named a path, relationship or slide id that does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            OpcError::PartNotFound(_) | OpcError::RelationshipNotFound(_) | OpcError::SlideIdNotFound(_)
        )
    }

    /// The input archive itself is unusable.
    pub fn is_archive_error(&self) -> bool {
        matches!(self, OpcError::Archive(_))
    }
}

pub type Result<T> = std::result::Result<T, OpcError>;
