//! Package writer for OPC packages.
//!
//! Parts whose payload is unchanged since load are copied from the source
//! archive without recompression, so their entries come out byte-identical.
//! Everything else is converted back to its on-disk form and compressed with
//! the settings recorded for its path.

use crate::common::xml::{condense, restore_smart_punctuation};
use crate::ooxml::opc::error::{OpcError, Result};
use crate::ooxml::opc::package::Package;
use crate::ooxml::opc::part::{Part, Payload};
use crate::ooxml::opc::phys_pkg::PhysPkgWriter;
use rayon::prelude::*;
use std::borrow::Cow;
use std::collections::HashMap;
use std::path::Path;

/// Package writer that serializes a [`Package`] to a ZIP archive.
///
/// # Example
///
/// ```no_run
/// use pptx_engine::ooxml::opc::package::Package;
/// use pptx_engine::ooxml::opc::pkgwriter::PackageWriter;
///
/// let pkg = Package::open("input.pptx")?;
/// PackageWriter::write("output.pptx", &pkg)?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct PackageWriter;

/// One archive entry, ready to be appended.
enum Encoded<'a> {
    Copy(usize),
    Write {
        member: &'a str,
        data: Cow<'a, [u8]>,
        compression: crate::common::config::Compression,
        level: Option<i64>,
    },
}

impl PackageWriter {
    /// Encode the whole archive in memory, then write it to `path`. Nothing is
    /// written when encoding fails.
    pub fn write<P: AsRef<Path>>(path: P, package: &Package) -> Result<()> {
        let bytes = Self::to_bytes(package)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    /// Serialize a package to bytes.
    ///
    /// Entries appear in source-archive order, followed by new parts in
    /// insertion order. Fails with [`OpcError::Serialization`] if two part
    /// names differ only by ASCII case.
    pub fn to_bytes(package: &Package) -> Result<Vec<u8>> {
        Self::check_unique_names(package)?;

        let parts = package.parts_in_write_order();
        let encoded = parts
            .par_iter()
            .map(|part| Self::encode(part, package))
            .collect::<Result<Vec<_>>>()?;

        let mut phys_writer = PhysPkgWriter::new(Some(package.source().clone()))?;
        let mut copied = 0usize;
        for entry in encoded {
            match entry {
                Encoded::Copy(index) => {
                    phys_writer.raw_copy(index)?;
                    copied += 1;
                },
                Encoded::Write {
                    member,
                    data,
                    compression,
                    level,
                } => phys_writer.write(member, &data, compression, level)?,
            }
        }

        tracing::debug!(
            entries = parts.len(),
            copied,
            "package serialized"
        );
        phys_writer.finish()
    }

    fn check_unique_names(package: &Package) -> Result<()> {
        let mut seen: HashMap<String, &str> = HashMap::with_capacity(package.part_count());
        for name in package.part_names() {
            if let Some(other) = seen.insert(name.to_ascii_lowercase(), name) {
                return Err(OpcError::Serialization(format!(
                    "part names '{}' and '{}' differ only by case",
                    other, name
                )));
            }
        }
        Ok(())
    }

    fn encode<'a>(part: &'a Part, package: &Package) -> Result<Encoded<'a>> {
        let meta = package.entry_meta(part.membername());
        if let Some(meta) = meta
            && meta.is_unchanged(part.payload().as_bytes())
            && let Some(index) = meta.source_index
        {
            return Ok(Encoded::Copy(index));
        }

        let config = package.config();
        let (compression, level) = meta.map_or(
            (config.default_compression, config.default_compression_level),
            |meta| (meta.compression, meta.level),
        );
        let data = match part.payload() {
            Payload::Xml(text) => {
                Cow::Owned(disk_text(part.membername(), text, config.format_xml).into_bytes())
            },
            Payload::Binary(data) => Cow::Borrowed(data.as_slice()),
        };

        Ok(Encoded::Write {
            member: part.membername(),
            data,
            compression,
            level,
        })
    }
}

/// Working-tree XML text to on-disk text.
fn disk_text(member: &str, text: &str, condense_layout: bool) -> String {
    let restored = restore_smart_punctuation(text);
    if !condense_layout {
        return restored.into_owned();
    }
    match condense(&restored) {
        Ok(condensed) => condensed,
        Err(e) => {
            tracing::warn!(part = member, error = %e, "writing malformed XML part verbatim");
            restored.into_owned()
        },
    }
}
