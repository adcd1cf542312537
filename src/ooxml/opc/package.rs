/// Objects that implement reading and writing OPC packages.
///
/// This module provides the [`Package`] type: the in-memory part store that
/// every other operation of the engine reads and mutates.
use crate::common::config::EngineConfig;
use crate::ooxml::opc::constants::kind;
use crate::ooxml::opc::content_types::ContentTypeRegistry;
use crate::ooxml::opc::error::{OpcError, Result};
use crate::ooxml::opc::packuri::{CONTENT_TYPES_MEMBER, PackURI};
use crate::ooxml::opc::part::{Part, Payload};
use crate::ooxml::opc::phys_pkg::EntryMeta;
use crate::ooxml::opc::pkgreader::{PackageReader, working_text};
use crate::ooxml::opc::pkgwriter::PackageWriter;
use crate::ooxml::opc::rel::Relationships;
use crate::ooxml::pptx::allocator::{IdCeiling, SlideAllocation};
use bytes::Bytes;
use std::collections::HashMap;
use std::path::Path;

/// Member name of the main presentation part when the package relationships
/// do not name one.
const DEFAULT_MAIN_DOCUMENT: &str = "/ppt/presentation.xml";

/// An OPC package held in memory.
///
/// Parts are keyed by member name ("ppt/slides/slide1.xml"). Every accessor
/// that takes a name accepts it with or without the leading slash.
#[derive(Debug, Clone)]
pub struct Package {
    parts: HashMap<String, Part>,

    /// Compression metadata of the source archive, keyed by member name.
    /// Survives part removal so that remove-then-reinsert keeps the original encoding.
    entries: HashMap<String, EntryMeta>,

    /// The archive this package was loaded from, for verbatim entry copies.
    source: Bytes,

    config: EngineConfig,

    /// Highest identifiers ever handed out or observed; never decreases.
    ceiling: IdCeiling,

    /// Slides created by duplication, in creation order.
    allocations: Vec<SlideAllocation>,

    next_seq: u64,
}

#[inline]
fn member_key(name: &str) -> &str {
    name.strip_prefix('/').unwrap_or(name)
}

impl Package {
    /// Create an empty package.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            parts: HashMap::new(),
            entries: HashMap::new(),
            source: Bytes::new(),
            config,
            ceiling: IdCeiling::default(),
            allocations: Vec::new(),
            next_seq: 0,
        }
    }

    /// Open a package from a file with the default configuration.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_config(path, EngineConfig::default())
    }

    /// Open a package from a file.
    pub fn open_with_config<P: AsRef<Path>>(path: P, config: EngineConfig) -> Result<Self> {
        let data = std::fs::read(path)?;
        PackageReader::load(Bytes::from(data), config)
    }

    /// Load a package from archive bytes with the default configuration.
    pub fn from_bytes(data: impl Into<Bytes>) -> Result<Self> {
        PackageReader::load(data.into(), EngineConfig::default())
    }

    /// Load a package from archive bytes.
    pub fn from_bytes_with_config(data: impl Into<Bytes>, config: EngineConfig) -> Result<Self> {
        PackageReader::load(data.into(), config)
    }

    /// Serialize the package to archive bytes.
    pub fn save(&self) -> Result<Vec<u8>> {
        PackageWriter::to_bytes(self)
    }

    /// Serialize the package to a file.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        PackageWriter::write(path, self)
    }

    pub(crate) fn from_loaded(
        parts: Vec<Part>,
        entries: HashMap<String, EntryMeta>,
        source: Bytes,
        config: EngineConfig,
    ) -> Self {
        let mut package = Self::new(config);
        package.entries = entries;
        package.source = source;
        for part in parts {
            package.insert_part(part);
        }
        package
    }

    #[inline]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[inline]
    pub(crate) fn source(&self) -> &Bytes {
        &self.source
    }

    /// Get a part by name.
    #[inline]
    pub fn part(&self, name: &str) -> Option<&Part> {
        self.parts.get(member_key(name))
    }

    /// Get a mutable part by name.
    #[inline]
    pub fn part_mut(&mut self, name: &str) -> Option<&mut Part> {
        self.parts.get_mut(member_key(name))
    }

    /// Check if a part exists in the package.
    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.parts.contains_key(member_key(name))
    }

    /// Get the number of parts in the package.
    #[inline]
    pub fn part_count(&self) -> usize {
        self.parts.len()
    }

    /// Member names of all parts, sorted.
    pub fn part_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.parts.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Get an iterator over all parts in the package.
    pub fn iter_parts(&self) -> impl Iterator<Item = &Part> {
        self.parts.values()
    }

    /// Parts in write order: source entries first, then new parts as inserted.
    pub fn parts_in_write_order(&self) -> Vec<&Part> {
        let mut parts: Vec<&Part> = self.parts.values().collect();
        parts.sort_by_key(|part| {
            let source_index = self
                .entries
                .get(part.membername())
                .and_then(|meta| meta.source_index);
            (source_index.is_none(), source_index, part.seq())
        });
        parts
    }

    /// Insert or replace a part, returning the previous one.
    ///
    /// A replaced part keeps its position in the write order.
    pub fn insert_part(&mut self, mut part: Part) -> Option<Part> {
        let key = part.membername().to_string();
        match self.parts.get(&key) {
            Some(existing) => part.set_seq(existing.seq()),
            None => {
                part.set_seq(self.next_seq);
                self.next_seq += 1;
            },
        }
        self.parts.insert(key, part)
    }

    /// Remove a part. Its compression metadata is retained.
    pub fn remove_part(&mut self, name: &str) -> Option<Part> {
        self.parts.remove(member_key(name))
    }

    /// Working-tree text of an XML part.
    pub fn xml(&self, name: &str) -> Result<&str> {
        self.part(name)
            .ok_or_else(|| OpcError::PartNotFound(name.to_string()))?
            .xml_str()
    }

    /// Replace the text of an XML part, creating the part when absent.
    pub fn put_xml(&mut self, partname: &PackURI, text: String) {
        match self.parts.get_mut(partname.membername()) {
            Some(part) => part.set_xml(text),
            None => {
                self.insert_part(Part::xml(partname.clone(), text));
            },
        }
    }

    /// Like [`put_xml`](Self::put_xml), but first brings `text` into the
    /// working-tree layout used for loaded parts.
    pub(crate) fn put_formatted_xml(&mut self, partname: &PackURI, text: String) {
        let text = working_text(partname.membername(), text, &self.config);
        self.put_xml(partname, text);
    }

    /// Replace a part's payload wholesale, creating the part when absent.
    pub fn put_payload(&mut self, partname: &PackURI, payload: Payload) {
        match payload {
            Payload::Xml(text) => self.put_xml(partname, text),
            Payload::Binary(data) => match self.parts.get_mut(partname.membername()) {
                Some(part) => part.set_binary(data),
                None => {
                    self.insert_part(Part::binary(partname.clone(), data));
                },
            },
        }
    }

    /// Relationships whose source is `source` ("/" for the package itself).
    ///
    /// A source without a .rels part has no relationships.
    pub fn relationships(&self, source: &PackURI) -> Result<Relationships> {
        let rels_uri = source.rels_uri().map_err(OpcError::InvalidPackUri)?;
        match self.part(rels_uri.membername()) {
            Some(part) => Relationships::from_xml(part.xml_str()?.as_bytes(), source.base_uri()),
            None => Ok(Relationships::new(source.base_uri())),
        }
    }

    /// Write the relationships of `source` back to its .rels part.
    pub fn put_relationships(&mut self, source: &PackURI, rels: &Relationships) -> Result<()> {
        let rels_uri = source.rels_uri().map_err(OpcError::InvalidPackUri)?;
        let xml = rels.to_xml(self.config.indent_width);
        self.put_xml(&rels_uri, xml);
        Ok(())
    }

    /// Parse the content types registry.
    pub fn content_types(&self) -> Result<ContentTypeRegistry> {
        let part = self
            .part(CONTENT_TYPES_MEMBER)
            .ok_or_else(|| OpcError::PartNotFound(CONTENT_TYPES_MEMBER.to_string()))?;
        ContentTypeRegistry::from_xml(part.xml_str()?.as_bytes())
    }

    /// Write the content types registry back.
    pub fn put_content_types(&mut self, registry: &ContentTypeRegistry) {
        let xml = registry.to_xml(self.config.indent_width);
        self.put_xml(&PackURI::content_types(), xml);
    }

    /// The main presentation part, as named by the package relationships.
    pub fn main_document(&self) -> Result<PackURI> {
        let rels = self.relationships(&PackURI::package())?;
        if let Some(rel) = rels.first_of_kind(kind::OFFICE_DOCUMENT) {
            let target = rel.target_partname()?;
            if self.contains(target.membername()) {
                return Ok(target);
            }
        }
        if self.contains(DEFAULT_MAIN_DOCUMENT) {
            return PackURI::new(DEFAULT_MAIN_DOCUMENT).map_err(OpcError::InvalidPackUri);
        }
        Err(OpcError::PartNotFound(
            "main presentation part (no officeDocument relationship)".to_string(),
        ))
    }

    /// Compression metadata recorded for `name`.
    #[inline]
    pub fn entry_meta(&self, name: &str) -> Option<&EntryMeta> {
        self.entries.get(member_key(name))
    }

    pub(crate) fn set_entry_meta(&mut self, name: &str, meta: EntryMeta) {
        self.entries.insert(member_key(name).to_string(), meta);
    }

    /// Highest identifiers observed or allocated so far.
    #[inline]
    pub fn ceiling(&self) -> IdCeiling {
        self.ceiling
    }

    /// Raise the ceiling. Lower values are ignored.
    pub(crate) fn raise_ceiling(&mut self, ceiling: IdCeiling) {
        self.ceiling = self.ceiling.raise(ceiling);
    }

    /// Slides created by duplication, in creation order.
    #[inline]
    pub fn allocations(&self) -> &[SlideAllocation] {
        &self.allocations
    }

    pub(crate) fn record_allocation(&mut self, allocation: SlideAllocation) {
        self.allocations.push(allocation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ooxml::fixtures::FixtureBuilder;
    use crate::ooxml::opc::constants::content_type as ct;

    #[test]
    fn test_open_package() {
        let pkg = Package::from_bytes(FixtureBuilder::new().slides(2).build()).unwrap();
        assert!(pkg.contains("ppt/slides/slide1.xml"));
        assert!(pkg.contains("/ppt/slides/slide2.xml"));
        assert!(pkg.part_count() > 8);
    }

    #[test]
    fn test_main_document() {
        let pkg = Package::from_bytes(FixtureBuilder::new().build()).unwrap();
        assert_eq!(pkg.main_document().unwrap().as_str(), "/ppt/presentation.xml");
        let registry = pkg.content_types().unwrap();
        assert_eq!(
            registry.resolve(&pkg.main_document().unwrap()),
            Some(ct::PML_PRESENTATION_MAIN)
        );
    }

    #[test]
    fn test_insert_keeps_write_position() {
        let mut pkg = Package::from_bytes(FixtureBuilder::new().build()).unwrap();
        let before: Vec<String> = pkg
            .parts_in_write_order()
            .iter()
            .map(|p| p.membername().to_string())
            .collect();

        let extra = PackURI::new("/ppt/extra.xml").unwrap();
        pkg.put_xml(&extra, "<x/>".to_string());
        let slide = PackURI::new("/ppt/slides/slide1.xml").unwrap();
        pkg.put_xml(&slide, "<p:sld/>".to_string());

        let after: Vec<String> = pkg
            .parts_in_write_order()
            .iter()
            .map(|p| p.membername().to_string())
            .collect();
        assert_eq!(&after[..before.len()], &before[..]);
        assert_eq!(after.last().map(String::as_str), Some("ppt/extra.xml"));
    }

    #[test]
    fn test_missing_rels_is_empty() {
        let pkg = Package::from_bytes(FixtureBuilder::new().build()).unwrap();
        let theme = PackURI::new("/ppt/theme/theme1.xml").unwrap();
        assert!(pkg.relationships(&theme).unwrap().is_empty());
        assert!(matches!(pkg.xml("ppt/nope.xml"), Err(OpcError::PartNotFound(_))));
    }

    #[test]
    fn test_remove_keeps_entry_meta() {
        let mut pkg = Package::from_bytes(FixtureBuilder::new().build()).unwrap();
        let removed = pkg.remove_part("ppt/slides/slide1.xml").unwrap();
        assert!(pkg.entry_meta("ppt/slides/slide1.xml").is_some());
        pkg.insert_part(removed);
        assert!(pkg.contains("ppt/slides/slide1.xml"));
    }
}
