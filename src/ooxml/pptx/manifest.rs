/// The slide order manifest (`p:sldIdLst`) of the presentation part.
///
/// Each `p:sldId` pairs a slide identifier with the relationship id under
/// which the presentation part references the slide. Document order of the
/// entries is the display order of the slides.
use crate::common::xml::scan::{attr_value, prefixed_attr_value, split_qname};
use crate::ooxml::opc::constants::namespace;
use crate::ooxml::opc::error::{OpcError, Result};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::ops::Range;

/// Children of `p:presentation` that come after `p:sldIdLst` in schema order.
const FOLLOWS_SLD_ID_LST: &[&[u8]] = &[
    b"sldSz",
    b"notesSz",
    b"smartTags",
    b"embeddedFontLst",
    b"custShowLst",
    b"photoAlbum",
    b"custDataLst",
    b"kinsoku",
    b"defaultTextStyle",
    b"modifyVerifier",
    b"extLst",
];

/// One `p:sldId` entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SlideEntry {
    pub id: u32,
    pub r_id: String,
}

impl SlideEntry {
    pub fn new(id: u32, r_id: impl Into<String>) -> Self {
        Self {
            id,
            r_id: r_id.into(),
        }
    }
}

/// Ordered slide list of a presentation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderManifest {
    entries: Vec<SlideEntry>,
}

/// Byte positions of the pieces of `presentation.xml` the manifest rewrites.
struct Layout {
    root_prefix: Option<String>,
    r_prefix: Option<String>,
    /// The whole `sldIdLst` element, when present.
    list: Option<Range<usize>>,
    /// Where a missing `sldIdLst` goes.
    insert_at: usize,
    /// Raw markup of existing entries, keyed by slide id.
    raw_entries: Vec<(u32, Range<usize>)>,
}

fn parse_id(e: &BytesStart<'_>) -> Option<u32> {
    attr_value(e, b"id").and_then(|v| atoi_simd::parse::<u32, false, false>(v.trim().as_bytes()).ok())
}

impl OrderManifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the manifest from presentation XML.
    ///
    /// Entries without a parseable id or relationship id are skipped.
    pub fn from_xml(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut entries = Vec::new();
        let mut in_list = false;

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) if e.local_name().as_ref() == b"sldIdLst" => in_list = true,
                Ok(Event::End(e)) if e.local_name().as_ref() == b"sldIdLst" => in_list = false,
                Ok(Event::Start(e)) | Ok(Event::Empty(e))
                    if in_list && e.local_name().as_ref() == b"sldId" =>
                {
                    match (parse_id(&e), prefixed_attr_value(&e, b"id")) {
                        (Some(id), Some(r_id)) => entries.push(SlideEntry { id, r_id }),
                        _ => tracing::debug!("skipping incomplete sldId entry"),
                    }
                },
                Ok(Event::Eof) => break,
                Err(e) => return Err(OpcError::XmlError(e.to_string())),
                _ => {},
            }
        }

        Ok(Self { entries })
    }

    #[inline]
    pub fn entries(&self) -> &[SlideEntry] {
        &self.entries
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 1-based display position of a slide id.
    pub fn position_of(&self, id: u32) -> Option<usize> {
        self.entries.iter().position(|e| e.id == id).map(|i| i + 1)
    }

    pub fn contains(&self, id: u32) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }

    pub fn contains_r_id(&self, r_id: &str) -> bool {
        self.entries.iter().any(|e| e.r_id == r_id)
    }

    /// Highest slide id in the manifest, or 0 when empty.
    pub fn max_id(&self) -> u32 {
        self.entries.iter().map(|e| e.id).max().unwrap_or(0)
    }

    /// Insert at a 1-based position clamped to `[1, len + 1]`.
    ///
    /// Returns the position actually used.
    pub fn insert(&mut self, position: usize, entry: SlideEntry) -> usize {
        let position = position.clamp(1, self.entries.len() + 1);
        self.entries.insert(position - 1, entry);
        position
    }

    pub fn remove(&mut self, id: u32) -> Option<SlideEntry> {
        let index = self.entries.iter().position(|e| e.id == id)?;
        Some(self.entries.remove(index))
    }

    /// Keep the entries matching `keep`, returning the rest.
    pub fn retain<F>(&mut self, mut keep: F) -> Vec<SlideEntry>
    where
        F: FnMut(&SlideEntry) -> bool,
    {
        let mut removed = Vec::new();
        self.entries.retain(|entry| {
            if keep(entry) {
                true
            } else {
                removed.push(entry.clone());
                false
            }
        });
        removed
    }

    /// Rewrite the `sldIdLst` of `xml` to hold exactly these entries.
    ///
    /// Everything outside the list is left byte-for-byte as it was. Entries
    /// that already existed keep their original markup (including any
    /// extension children). A missing list is created at its schema position.
    pub fn apply_to(&self, xml: &str) -> Result<String> {
        let layout = scan_layout(xml)?;
        let p = layout
            .root_prefix
            .as_deref()
            .map(|p| format!("{}:", p))
            .unwrap_or_default();
        let r = layout.r_prefix.as_deref().unwrap_or("r");

        let mut list = String::with_capacity(64 + self.entries.len() * 48);
        if self.entries.is_empty() {
            list.push_str(&format!("<{}sldIdLst/>", p));
        } else {
            list.push_str(&format!("<{}sldIdLst>", p));
            let mut buf = itoa::Buffer::new();
            for entry in &self.entries {
                let existing = layout
                    .raw_entries
                    .iter()
                    .find(|(id, span)| *id == entry.id && raw_r_id_matches(&xml[span.clone()], &entry.r_id));
                match existing {
                    Some((_, span)) => list.push_str(&xml[span.clone()]),
                    None => list.push_str(&format!(
                        "<{}sldId id=\"{}\" {}:id=\"{}\"/>",
                        p,
                        buf.format(entry.id),
                        r,
                        entry.r_id
                    )),
                }
            }
            list.push_str(&format!("</{}sldIdLst>", p));
        }

        let (start, end) = match &layout.list {
            Some(span) => (span.start, span.end),
            None => (layout.insert_at, layout.insert_at),
        };
        let mut out = String::with_capacity(xml.len() + list.len());
        out.push_str(&xml[..start]);
        out.push_str(&list);
        out.push_str(&xml[end..]);
        Ok(out)
    }
}

fn raw_r_id_matches(raw: &str, r_id: &str) -> bool {
    let mut reader = Reader::from_str(raw);
    match reader.read_event() {
        Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
            prefixed_attr_value(&e, b"id").as_deref() == Some(r_id)
        },
        _ => false,
    }
}

fn scan_layout(xml: &str) -> Result<Layout> {
    let mut reader = Reader::from_str(xml);
    let mut depth = 0usize;
    let mut root_prefix = None;
    let mut r_prefix = None;
    let mut list: Option<Range<usize>> = None;
    let mut list_start = None;
    let mut insert_at = None;
    let mut root_end = None;
    let mut raw_entries = Vec::new();
    let mut entry_start: Option<(u32, usize)> = None;

    loop {
        let start = reader.buffer_position() as usize;
        let event = reader
            .read_event()
            .map_err(|e| OpcError::XmlError(format!("presentation part: {}", e)))?;
        let end = reader.buffer_position() as usize;

        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let is_empty = matches!(event, Event::Empty(_));
                let local = e.local_name();
                if depth == 0 {
                    root_prefix = split_qname(e.name().as_ref())
                        .0
                        .map(|p| String::from_utf8_lossy(p).into_owned());
                    r_prefix = relationships_prefix(e);
                } else if depth == 1 {
                    if local.as_ref() == b"sldIdLst" {
                        if is_empty {
                            list = Some(start..end);
                        } else {
                            list_start = Some(start);
                        }
                    } else if insert_at.is_none() && FOLLOWS_SLD_ID_LST.contains(&local.as_ref()) {
                        insert_at = Some(start);
                    }
                } else if depth == 2 && list_start.is_some() && local.as_ref() == b"sldId" {
                    if let Some(id) = parse_id(e) {
                        if is_empty {
                            raw_entries.push((id, start..end));
                        } else {
                            entry_start = Some((id, start));
                        }
                    }
                }
                if !is_empty {
                    depth += 1;
                }
            },
            Event::End(ref e) => {
                depth = depth.saturating_sub(1);
                if depth == 2
                    && let Some((id, s)) = entry_start.take()
                {
                    raw_entries.push((id, s..end));
                } else if depth == 1
                    && e.local_name().as_ref() == b"sldIdLst"
                    && let Some(s) = list_start.take()
                {
                    list = Some(s..end);
                } else if depth == 0 {
                    root_end = Some(start);
                }
            },
            Event::Eof => break,
            _ => {},
        }
    }

    let insert_at = insert_at
        .or(root_end)
        .ok_or_else(|| OpcError::XmlError("presentation part has no root element".to_string()))?;

    Ok(Layout {
        root_prefix,
        r_prefix,
        list,
        insert_at,
        raw_entries,
    })
}

/// Prefix bound to the office relationships namespace on the root element.
fn relationships_prefix(root: &BytesStart<'_>) -> Option<String> {
    root.attributes().flatten().find_map(|a| {
        let (prefix, local) = split_qname(a.key.as_ref());
        let value = a.value.as_ref();
        (prefix == Some(&b"xmlns"[..])
            && (value == namespace::OFC_RELATIONSHIPS.as_bytes()
                || value == namespace::OFC_RELATIONSHIPS_STRICT.as_bytes()))
        .then(|| String::from_utf8_lossy(local).into_owned())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRES: &str = concat!(
        "<p:presentation xmlns:r=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships\" xmlns:p=\"urn:p\">",
        "<p:sldMasterIdLst><p:sldMasterId id=\"2147483648\" r:id=\"rId1\"/></p:sldMasterIdLst>",
        "<p:sldIdLst><p:sldId id=\"256\" r:id=\"rId2\"/><p:sldId id=\"257\" r:id=\"rId3\"><p:extLst/></p:sldId></p:sldIdLst>",
        "<p:sldSz cx=\"1\" cy=\"1\"/></p:presentation>"
    );

    #[test]
    fn test_parse_manifest() {
        let manifest = OrderManifest::from_xml(PRES).unwrap();
        assert_eq!(
            manifest.entries(),
            &[SlideEntry::new(256, "rId2"), SlideEntry::new(257, "rId3")]
        );
        assert_eq!(manifest.max_id(), 257);
        assert_eq!(manifest.position_of(257), Some(2));
        assert!(manifest.contains_r_id("rId2"));
    }

    #[test]
    fn test_master_ids_are_not_slides() {
        let manifest = OrderManifest::from_xml(PRES).unwrap();
        assert!(!manifest.contains(2147483648));
    }

    #[test]
    fn test_insert_clamps_position() {
        let mut manifest = OrderManifest::from_xml(PRES).unwrap();
        assert_eq!(manifest.insert(0, SlideEntry::new(300, "rId9")), 1);
        assert_eq!(manifest.insert(99, SlideEntry::new(301, "rId10")), 4);
        let ids: Vec<u32> = manifest.entries().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![300, 256, 257, 301]);
    }

    #[test]
    fn test_apply_keeps_existing_markup() {
        let mut manifest = OrderManifest::from_xml(PRES).unwrap();
        manifest.insert(2, SlideEntry::new(258, "rId4"));
        let xml = manifest.apply_to(PRES).unwrap();
        assert!(xml.contains(concat!(
            "<p:sldIdLst><p:sldId id=\"256\" r:id=\"rId2\"/>",
            "<p:sldId id=\"258\" r:id=\"rId4\"/>",
            "<p:sldId id=\"257\" r:id=\"rId3\"><p:extLst/></p:sldId></p:sldIdLst>"
        )));
        assert!(xml.starts_with("<p:presentation"));
        assert!(xml.ends_with("<p:sldSz cx=\"1\" cy=\"1\"/></p:presentation>"));
        assert_eq!(OrderManifest::from_xml(&xml).unwrap(), manifest);
    }

    #[test]
    fn test_apply_creates_missing_list() {
        let pres = "<p:presentation xmlns:rel=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships\" xmlns:p=\"urn:p\"><p:sldMasterIdLst/><p:sldSz cx=\"1\" cy=\"1\"/></p:presentation>";
        let mut manifest = OrderManifest::from_xml(pres).unwrap();
        assert!(manifest.is_empty());
        manifest.insert(1, SlideEntry::new(256, "rId7"));
        let xml = manifest.apply_to(pres).unwrap();
        assert!(xml.contains(
            "<p:sldMasterIdLst/><p:sldIdLst><p:sldId id=\"256\" rel:id=\"rId7\"/></p:sldIdLst><p:sldSz"
        ));
    }

    #[test]
    fn test_apply_empty_manifest() {
        let mut manifest = OrderManifest::from_xml(PRES).unwrap();
        manifest.retain(|_| false);
        let xml = manifest.apply_to(PRES).unwrap();
        assert!(xml.contains("</p:sldMasterIdLst><p:sldIdLst/><p:sldSz"));
    }
}
