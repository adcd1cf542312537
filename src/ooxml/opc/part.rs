/// Open Packaging Convention (OPC) objects related to package parts.
///
/// A part is a named payload inside the package. XML parts are held as text in
/// their working-tree form (pretty-printed, typographic quotes escaped); every
/// other part is an opaque byte blob.
use crate::ooxml::opc::error::{OpcError, Result};
use crate::ooxml::opc::packuri::PackURI;

/// Content of a part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Xml(String),
    Binary(Vec<u8>),
}

impl Payload {
    /// Raw bytes of the payload as held in memory.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Payload::Xml(text) => text.as_bytes(),
            Payload::Binary(data) => data,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn is_xml(&self) -> bool {
        matches!(self, Payload::Xml(_))
    }
}

/// Whether a member is decoded as XML text on load.
pub fn is_xml_member(member: &str) -> bool {
    match member.rsplit_once('.') {
        Some((_, ext)) => ext.eq_ignore_ascii_case("xml") || ext.eq_ignore_ascii_case("rels"),
        None => false,
    }
}

/// A part in the package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    partname: PackURI,
    content_type: Option<String>,
    payload: Payload,
    /// Insertion order; parts that did not come from the source archive are
    /// written in this order after the original entries.
    seq: u64,
}

impl Part {
    /// Create an XML part.
    pub fn xml(partname: PackURI, text: impl Into<String>) -> Self {
        Self {
            partname,
            content_type: None,
            payload: Payload::Xml(text.into()),
            seq: 0,
        }
    }

    /// Create a binary part.
    pub fn binary(partname: PackURI, data: Vec<u8>) -> Self {
        Self {
            partname,
            content_type: None,
            payload: Payload::Binary(data),
            seq: 0,
        }
    }

    /// Builder-style content type assignment.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    #[inline]
    pub fn partname(&self) -> &PackURI {
        &self.partname
    }

    /// ZIP member name of this part.
    #[inline]
    pub fn membername(&self) -> &str {
        self.partname.membername()
    }

    /// Content type recorded when the part was loaded or created.
    ///
    /// The content types registry stays authoritative; this is a cached copy.
    #[inline]
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn set_content_type(&mut self, content_type: Option<String>) {
        self.content_type = content_type;
    }

    #[inline]
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Working-tree text of an XML part.
    pub fn xml_str(&self) -> Result<&str> {
        match &self.payload {
            Payload::Xml(text) => Ok(text),
            Payload::Binary(_) => Err(OpcError::InvalidPart(format!(
                "{} is not an XML part",
                self.partname
            ))),
        }
    }

    /// Replace the content with XML text.
    pub fn set_xml(&mut self, text: impl Into<String>) {
        self.payload = Payload::Xml(text.into());
    }

    /// Replace the content with bytes.
    pub fn set_binary(&mut self, data: Vec<u8>) {
        self.payload = Payload::Binary(data);
    }

    #[inline]
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub(crate) fn set_seq(&mut self, seq: u64) {
        self.seq = seq;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xml_member_detection() {
        assert!(is_xml_member("ppt/slides/slide1.xml"));
        assert!(is_xml_member("_rels/.rels"));
        assert!(is_xml_member("[Content_Types].xml"));
        assert!(is_xml_member("ppt/slides/_rels/slide1.XML.RELS"));
        assert!(!is_xml_member("ppt/media/image1.png"));
        assert!(!is_xml_member("ppt/embeddings/oleObject1"));
    }

    #[test]
    fn test_part_accessors() {
        let name = PackURI::new("/ppt/slides/slide1.xml").unwrap();
        let mut part = Part::xml(name.clone(), "<p:sld/>")
            .with_content_type("application/vnd.openxmlformats-officedocument.presentationml.slide+xml");
        assert_eq!(part.membername(), "ppt/slides/slide1.xml");
        assert_eq!(part.xml_str().unwrap(), "<p:sld/>");
        assert!(part.payload().is_xml());

        part.set_binary(vec![1, 2, 3]);
        assert!(part.xml_str().is_err());
        assert_eq!(part.payload().len(), 3);
        assert_eq!(part.partname(), &name);
    }
}
