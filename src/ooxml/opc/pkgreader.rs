//! Package reader: archive bytes to an in-memory [`Package`].
//!
//! XML parts are decoded to their working-tree form here. Each entry's
//! compression settings and a fingerprint of the decoded payload are kept so
//! the writer can reproduce untouched entries byte for byte.

use crate::common::config::EngineConfig;
use crate::common::xml::{escape_smart_punctuation, indent};
use crate::ooxml::opc::content_types::ContentTypeRegistry;
use crate::ooxml::opc::error::{OpcError, Result};
use crate::ooxml::opc::package::Package;
use crate::ooxml::opc::packuri::{CONTENT_TYPES_MEMBER, PackURI};
use crate::ooxml::opc::part::{Part, is_xml_member};
use crate::ooxml::opc::phys_pkg::{EntryMeta, PhysPkgReader, RawEntry};
use crate::ooxml::pptx::allocator::IdCeiling;
use bytes::Bytes;
use rayon::prelude::*;
use std::borrow::Cow;
use std::collections::{HashMap, HashSet};

/// Loads packages from archive bytes.
pub struct PackageReader;

impl PackageReader {
    /// Decode an archive into a package.
    ///
    /// Fails with [`OpcError::Archive`] when the bytes are not a ZIP file, an
    /// entry exceeds the configured limits, two entries share a name, an XML
    /// entry is not UTF-8, or `[Content_Types].xml` is missing or unreadable.
    pub fn load(data: Bytes, config: EngineConfig) -> Result<Package> {
        let mut phys_reader = PhysPkgReader::new(data.clone())?;
        let raw_entries = phys_reader.read_all(&config)?;

        let mut seen = HashSet::with_capacity(raw_entries.len());
        for entry in &raw_entries {
            if !seen.insert(entry.name.to_ascii_lowercase()) {
                return Err(OpcError::Archive(format!(
                    "duplicate entry name '{}'",
                    entry.name
                )));
            }
        }

        let decoded = raw_entries
            .into_par_iter()
            .map(|entry| decode_entry(entry, &config))
            .collect::<Result<Vec<_>>>()?;

        let registry = decoded
            .iter()
            .find(|(part, _)| part.membername() == CONTENT_TYPES_MEMBER)
            .ok_or_else(|| OpcError::Archive(format!("missing {}", CONTENT_TYPES_MEMBER)))
            .and_then(|(part, _)| {
                ContentTypeRegistry::from_xml(part.xml_str()?.as_bytes())
                    .map_err(|e| OpcError::Archive(format!("{}: {}", CONTENT_TYPES_MEMBER, e)))
            })?;

        let mut entries = HashMap::with_capacity(decoded.len());
        let mut parts = Vec::with_capacity(decoded.len());
        for (mut part, meta) in decoded {
            let content_type = registry.resolve(part.partname()).map(str::to_string);
            if content_type.is_none() && part.membername() != CONTENT_TYPES_MEMBER {
                tracing::debug!(part = %part.partname(), "no content type registered");
            }
            part.set_content_type(content_type);
            entries.insert(part.membername().to_string(), meta);
            parts.push(part);
        }
        // Archive order drives the write order of untouched parts.
        parts.sort_by_key(|part| entries.get(part.membername()).and_then(|m| m.source_index));

        let mut package = Package::from_loaded(parts, entries, data, config);
        match IdCeiling::observe(&package) {
            Ok(ceiling) => package.raise_ceiling(ceiling),
            Err(e) => tracing::warn!(error = %e, "could not read identifier ceiling from presentation"),
        }

        tracing::debug!(parts = package.part_count(), "package loaded");
        Ok(package)
    }
}

fn decode_entry(entry: RawEntry, config: &EngineConfig) -> Result<(Part, EntryMeta)> {
    let RawEntry {
        name,
        data,
        compression,
        level,
        index,
    } = entry;
    let partname = PackURI::from_membername(&name).map_err(OpcError::Archive)?;

    let part = if is_xml_member(&name) {
        let text = String::from_utf8(data)
            .map_err(|e| OpcError::Archive(format!("{} is not valid UTF-8: {}", name, e)))?;
        Part::xml(partname, working_text(&name, text, config))
    } else {
        Part::binary(partname, data)
    };

    let payload = part.payload().as_bytes();
    let meta = EntryMeta {
        compression,
        level,
        source_index: Some(index),
        loaded_crc: crc32fast::hash(payload),
        loaded_len: payload.len(),
    };
    Ok((part, meta))
}

/// On-disk XML text to working-tree text.
///
/// A part that cannot be parsed is kept verbatim so that it can still be
/// inspected and reported by the validators.
pub(crate) fn working_text(member: &str, text: String, config: &EngineConfig) -> String {
    let formatted = if config.format_xml {
        match indent(&text, config.indent_width) {
            Ok(pretty) => pretty,
            Err(e) => {
                tracing::warn!(part = member, error = %e, "keeping malformed XML part verbatim");
                text
            },
        }
    } else {
        text
    };

    let escaped = match escape_smart_punctuation(&formatted) {
        Cow::Owned(escaped) => Some(escaped),
        Cow::Borrowed(_) => None,
    };
    escaped.unwrap_or(formatted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ooxml::fixtures::{FixtureBuilder, zip_entries};
    use crate::ooxml::opc::constants::content_type as ct;

    #[test]
    fn test_load_assigns_content_types() {
        let pkg = PackageReader::load(
            Bytes::from(FixtureBuilder::new().slides(2).build()),
            EngineConfig::default(),
        )
        .unwrap();
        let slide = pkg.part("ppt/slides/slide2.xml").unwrap();
        assert_eq!(slide.content_type(), Some(ct::PML_SLIDE));
        let rels = pkg.part("ppt/slides/_rels/slide2.xml.rels").unwrap();
        assert_eq!(rels.content_type(), Some(ct::OPC_RELATIONSHIPS));
    }

    #[test]
    fn test_load_pretty_prints_and_escapes() {
        let pkg = PackageReader::load(
            Bytes::from(FixtureBuilder::new().slide_text(1, "\u{201C}Quoted\u{201D}").build()),
            EngineConfig::default(),
        )
        .unwrap();
        let xml = pkg.xml("ppt/slides/slide1.xml").unwrap();
        assert!(xml.contains("\n  <p:cSld>"));
        assert!(xml.contains("<a:t>&#x201C;Quoted&#x201D;</a:t>"));
        assert!(!xml.contains('\u{201C}'));
    }

    #[test]
    fn test_format_can_be_disabled() {
        let config = EngineConfig {
            format_xml: false,
            ..EngineConfig::default()
        };
        let pkg = PackageReader::load(Bytes::from(FixtureBuilder::new().build()), config).unwrap();
        assert!(!pkg.xml("ppt/slides/slide1.xml").unwrap().contains("\n  <p:cSld>"));
    }

    #[test]
    fn test_missing_content_types() {
        let archive = zip_entries(&[("ppt/presentation.xml", b"<p:presentation/>".as_slice())]);
        assert!(matches!(
            PackageReader::load(Bytes::from(archive), EngineConfig::default()),
            Err(OpcError::Archive(_))
        ));
    }

    #[test]
    fn test_case_insensitive_duplicates_rejected() {
        let archive = zip_entries(&[
            ("[Content_Types].xml", FixtureBuilder::content_types_xml(1).as_bytes()),
            ("ppt/a.xml", b"<a/>".as_slice()),
            ("PPT/A.xml", b"<a/>".as_slice()),
        ]);
        assert!(matches!(
            PackageReader::load(Bytes::from(archive), EngineConfig::default()),
            Err(OpcError::Archive(_))
        ));
    }

    #[test]
    fn test_malformed_xml_kept_verbatim() {
        let archive = zip_entries(&[
            ("[Content_Types].xml", FixtureBuilder::content_types_xml(1).as_bytes()),
            ("ppt/broken.xml", b"<a><b></a>".as_slice()),
        ]);
        let pkg = PackageReader::load(Bytes::from(archive), EngineConfig::default()).unwrap();
        assert_eq!(pkg.xml("ppt/broken.xml").unwrap(), "<a><b></a>");
    }

    #[test]
    fn test_invalid_utf8_is_an_archive_error() {
        let archive = zip_entries(&[
            ("[Content_Types].xml", FixtureBuilder::content_types_xml(1).as_bytes()),
            ("ppt/bad.xml", b"<a>\xff\xfe</a>".as_slice()),
        ]);
        assert!(matches!(
            PackageReader::load(Bytes::from(archive), EngineConfig::default()),
            Err(OpcError::Archive(_))
        ));
    }
}
