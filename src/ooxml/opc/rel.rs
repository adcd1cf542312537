//! Relationship parts.
//!
//! A `.rels` part lists the outgoing links of one source: the package itself
//! or a single part. Links are kept in document order and duplicates are not
//! merged, so the validator sees the part exactly as stored.

use crate::common::xml::escape_xml;
use crate::ooxml::opc::constants::target_mode;
use crate::ooxml::opc::error::{OpcError, Result};
use crate::ooxml::opc::packuri::PackURI;
use quick_xml::Reader;
use quick_xml::events::Event;

/// One link: an id unique within its source, a type URI and a target that is
/// either a part name relative to the source directory or an external URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    r_id: String,
    reltype: String,
    target_ref: String,
    /// Directory of the source part
    base_uri: String,
    is_external: bool,
}

impl Relationship {
    pub fn new(
        r_id: String,
        reltype: String,
        target_ref: String,
        base_uri: String,
        is_external: bool,
    ) -> Self {
        Self {
            r_id,
            reltype,
            target_ref,
            base_uri,
            is_external,
        }
    }

    #[inline]
    pub fn r_id(&self) -> &str {
        &self.r_id
    }

    /// Full type URI.
    #[inline]
    pub fn reltype(&self) -> &str {
        &self.reltype
    }

    /// Final path segment of the relationship type ("slide", "notesSlide", ...).
    ///
    /// Transitional and strict type URIs share this segment.
    #[inline]
    pub fn kind(&self) -> &str {
        self.reltype
            .rsplit_once('/')
            .map_or(self.reltype.as_str(), |(_, kind)| kind)
    }

    /// Target as written in the .rels part.
    #[inline]
    pub fn target_ref(&self) -> &str {
        &self.target_ref
    }

    /// Point the relationship at a different target.
    pub fn set_target_ref(&mut self, target_ref: String) {
        self.target_ref = target_ref;
    }

    #[inline]
    pub fn is_external(&self) -> bool {
        self.is_external
    }

    /// Part name the target resolves to. External targets have none.
    pub fn target_partname(&self) -> Result<PackURI> {
        if self.is_external {
            return Err(OpcError::InvalidPart(format!(
                "relationship {} targets an external resource",
                self.r_id
            )));
        }
        PackURI::from_rel_ref(&self.base_uri, &self.target_ref).map_err(OpcError::InvalidPackUri)
    }
}

/// The links of one source, in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationships {
    base_uri: String,

    rels: Vec<Relationship>,
}

impl Relationships {
    /// An empty set for a source whose directory is `base_uri`.
    pub fn new(base_uri: impl Into<String>) -> Self {
        Self {
            base_uri: base_uri.into(),
            rels: Vec::new(),
        }
    }

    /// Parse the content of a .rels part.
    ///
    /// Entries missing `Id`, `Type` or `Target` are skipped.
    pub fn from_xml(xml: &[u8], base_uri: impl Into<String>) -> Result<Self> {
        let mut rels = Self::new(base_uri);
        let mut reader = Reader::from_reader(xml);
        reader.config_mut().trim_text(true);

        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e))
                    if e.local_name().as_ref() == b"Relationship" =>
                {
                    let mut r_id = None;
                    let mut reltype = None;
                    let mut target_ref = None;
                    let mut is_external = false;

                    for attr in e.attributes() {
                        let attr = attr?;
                        match attr.key.as_ref() {
                            b"Id" => r_id = Some(attr.unescape_value()?.into_owned()),
                            b"Type" => reltype = Some(attr.unescape_value()?.into_owned()),
                            b"Target" => target_ref = Some(attr.unescape_value()?.into_owned()),
                            b"TargetMode" => {
                                is_external = attr.value.as_ref() == target_mode::EXTERNAL.as_bytes();
                            },
                            _ => {},
                        }
                    }

                    match (r_id, reltype, target_ref) {
                        (Some(r_id), Some(reltype), Some(target_ref)) => {
                            rels.add_relationship(reltype, target_ref, r_id, is_external);
                        },
                        _ => tracing::debug!(
                            base_uri = %rels.base_uri,
                            "skipping relationship without Id, Type or Target"
                        ),
                    }
                },
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(OpcError::XmlError(format!(
                        "Relationships parse error: {}",
                        e
                    )));
                },
                _ => {},
            }
            buf.clear();
        }

        Ok(rels)
    }

    /// The base URI that relative targets resolve against.
    #[inline]
    pub fn base_uri(&self) -> &str {
        &self.base_uri
    }

    /// Append a link. The id is taken as given; see [`next_r_id`](Self::next_r_id).
    pub fn add_relationship(
        &mut self,
        reltype: String,
        target_ref: String,
        r_id: String,
        is_external: bool,
    ) -> &Relationship {
        let idx = self.rels.len();
        self.rels.push(Relationship::new(
            r_id,
            reltype,
            target_ref,
            self.base_uri.clone(),
            is_external,
        ));
        &self.rels[idx]
    }

    /// First link with id `r_id`.
    #[inline]
    pub fn get(&self, r_id: &str) -> Option<&Relationship> {
        self.rels.iter().find(|rel| rel.r_id == r_id)
    }

    #[inline]
    pub fn contains(&self, r_id: &str) -> bool {
        self.get(r_id).is_some()
    }

    /// Highest N among ids of the form "rIdN" (0 when there are none).
    pub fn max_r_id_number(&self) -> u32 {
        self.rels
            .iter()
            .filter_map(|rel| r_id_number(&rel.r_id))
            .max()
            .unwrap_or(0)
    }

    /// The next relationship ID, one past the highest "rIdN" in use.
    ///
    /// Gaps below the maximum are never filled.
    pub fn next_r_id(&self) -> String {
        let mut buf = itoa::Buffer::new();
        format!("rId{}", buf.format(self.max_r_id_number().saturating_add(1)))
    }

    /// First relationship whose type ends in `kind`.
    pub fn first_of_kind(&self, kind: &str) -> Option<&Relationship> {
        self.rels.iter().find(|rel| rel.kind() == kind)
    }

    /// All relationships whose type ends in `kind`.
    pub fn of_kind<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a Relationship> + 'a {
        self.rels.iter().filter(move |rel| rel.kind() == kind)
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Relationship> {
        self.rels.iter()
    }

    /// Mutable iterator, for retargeting.
    #[inline]
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Relationship> {
        self.rels.iter_mut()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rels.is_empty()
    }

    /// Remove a relationship by its ID.
    pub fn remove(&mut self, r_id: &str) -> Option<Relationship> {
        let pos = self.rels.iter().position(|rel| rel.r_id == r_id)?;
        Some(self.rels.remove(pos))
    }

    /// Keep only relationships matching `keep`, returning the removed ones.
    pub fn extract_if_not<F>(&mut self, mut keep: F) -> Vec<Relationship>
    where
        F: FnMut(&Relationship) -> bool,
    {
        let (kept, removed): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.rels).into_iter().partition(|rel| keep(rel));
        self.rels = kept;
        removed
    }

    /// Serialize relationships to XML format, one element per line.
    ///
    /// Relationships are written in collection order.
    pub fn to_xml(&self, indent_width: usize) -> String {
        let mut xml = String::with_capacity(128 + self.rels.len() * 160);
        let pad = " ".repeat(indent_width);

        xml.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
        xml.push('\n');
        xml.push_str(
            r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
        );

        for rel in &self.rels {
            let target_mode = if rel.is_external() {
                r#" TargetMode="External""#
            } else {
                ""
            };

            xml.push('\n');
            xml.push_str(&pad);
            xml.push_str(&format!(
                r#"<Relationship Id="{}" Type="{}" Target="{}"{}/>"#,
                escape_xml(rel.r_id()),
                escape_xml(rel.reltype()),
                escape_xml(rel.target_ref()),
                target_mode
            ));
        }

        if self.rels.is_empty() {
            xml.truncate(xml.len() - 1);
            xml.push_str("/>");
        } else {
            xml.push_str("\n</Relationships>");
        }

        xml
    }
}

/// Parse the N of "rIdN".
#[inline]
pub fn r_id_number(r_id: &str) -> Option<u32> {
    r_id.strip_prefix("rId")
        .and_then(|digits| atoi_simd::parse::<u32, false, false>(digits.as_bytes()).ok())
}

impl Default for Relationships {
    fn default() -> Self {
        Self::new("/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ooxml::opc::constants::relationship_type as rt;

    const SLIDE_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/notesSlide" Target="../notesSlides/notesSlide1.xml"/>
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/slideLayout" Target="../slideLayouts/slideLayout1.xml"/>
  <Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink" Target="https://example.com/?a=1&amp;b=2" TargetMode="External"/>
</Relationships>"#;

    #[test]
    fn test_relationship_creation() {
        let rel = Relationship::new(
            "rId1".to_string(),
            rt::SLIDE_LAYOUT.to_string(),
            "../slideLayouts/slideLayout1.xml".to_string(),
            "/ppt/slides".to_string(),
            false,
        );

        assert_eq!(rel.r_id(), "rId1");
        assert_eq!(rel.kind(), "slideLayout");
        assert_eq!(
            rel.target_partname().unwrap().as_str(),
            "/ppt/slideLayouts/slideLayout1.xml"
        );
        assert!(!rel.is_external());
    }

    #[test]
    fn test_parse_preserves_order() {
        let rels = Relationships::from_xml(SLIDE_RELS.as_bytes(), "/ppt/slides").unwrap();
        let ids: Vec<_> = rels.iter().map(|r| r.r_id()).collect();
        assert_eq!(ids, ["rId2", "rId1", "rId3"]);
        let link = rels.get("rId3").unwrap();
        assert!(link.is_external());
        assert_eq!(link.target_ref(), "https://example.com/?a=1&b=2");
        assert!(link.target_partname().is_err());
        assert_eq!(rels.first_of_kind("notesSlide").unwrap().r_id(), "rId2");
    }

    #[test]
    fn test_next_r_id_is_one_past_max() {
        let mut rels = Relationships::new("/ppt");
        assert_eq!(rels.next_r_id(), "rId1");

        rels.add_relationship(rt::SLIDE.into(), "slides/slide1.xml".into(), "rId1".into(), false);
        rels.add_relationship(rt::SLIDE.into(), "slides/slide5.xml".into(), "rId5".into(), false);
        rels.add_relationship(rt::THEME.into(), "theme/theme1.xml".into(), "custom".into(), false);
        assert_eq!(rels.next_r_id(), "rId6");

        rels.remove("rId5");
        assert_eq!(rels.next_r_id(), "rId2");
    }

    #[test]
    fn test_to_xml_round_trip() {
        let rels = Relationships::from_xml(SLIDE_RELS.as_bytes(), "/ppt/slides").unwrap();
        let xml = rels.to_xml(2);
        assert!(xml.contains("Target=\"https://example.com/?a=1&amp;b=2\" TargetMode=\"External\""));
        let reparsed = Relationships::from_xml(xml.as_bytes(), "/ppt/slides").unwrap();
        assert_eq!(reparsed, rels);
    }

    #[test]
    fn test_empty_collection_serializes_self_closing() {
        let xml = Relationships::new("/ppt").to_xml(2);
        assert!(xml.ends_with("relationships\"/>"));
        assert!(Relationships::from_xml(xml.as_bytes(), "/ppt").unwrap().is_empty());
    }

    #[test]
    fn test_extract_if_not() {
        let mut rels = Relationships::from_xml(SLIDE_RELS.as_bytes(), "/ppt/slides").unwrap();
        let removed = rels.extract_if_not(|rel| rel.is_external());
        assert_eq!(removed.len(), 2);
        assert_eq!(rels.len(), 1);
    }
}
