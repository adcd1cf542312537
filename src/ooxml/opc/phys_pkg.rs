//! Provides a general interface to a physical OPC package (ZIP file).
//!
//! Reading inflates every entry once, bounded by the configured size limits,
//! and records how each entry was compressed. Writing either re-encodes an
//! entry or copies its compressed bytes verbatim from the source archive.

use crate::common::config::{Compression, EngineConfig};
use crate::ooxml::opc::error::{OpcError, Result};
use bytes::Bytes;
use std::io::{Cursor, Read, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Local file header signature ("PK\x03\x04").
const LOCAL_HEADER_SIGNATURE: [u8; 4] = [0x50, 0x4b, 0x03, 0x04];

/// How an entry was stored, plus a fingerprint of the payload as loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryMeta {
    pub compression: Compression,
    /// Deflate level inferred from the local header flags.
    pub level: Option<i64>,
    /// Position in the source archive, for verbatim copies.
    pub source_index: Option<usize>,
    /// CRC-32 of the in-memory payload right after loading.
    pub loaded_crc: u32,
    pub loaded_len: usize,
}

impl EntryMeta {
    /// Metadata for an entry that has no counterpart in the source archive.
    pub fn fresh(compression: Compression, level: Option<i64>) -> Self {
        Self {
            compression,
            level,
            source_index: None,
            loaded_crc: 0,
            loaded_len: 0,
        }
    }

    /// Whether `payload` is byte-identical to what was loaded from the source entry.
    pub fn is_unchanged(&self, payload: &[u8]) -> bool {
        self.source_index.is_some()
            && self.loaded_len == payload.len()
            && self.loaded_crc == crc32fast::hash(payload)
    }
}

/// An inflated archive entry.
#[derive(Debug)]
pub struct RawEntry {
    pub name: String,
    pub data: Vec<u8>,
    pub compression: Compression,
    pub level: Option<i64>,
    pub index: usize,
}

/// Physical package reader over an in-memory archive.
pub struct PhysPkgReader {
    archive: ZipArchive<Cursor<Bytes>>,
    data: Bytes,
}

impl PhysPkgReader {
    /// Open the archive directory. Fails if `data` is not a ZIP file.
    pub fn new(data: Bytes) -> Result<Self> {
        let archive = ZipArchive::new(Cursor::new(data.clone())).map_err(archive_error)?;
        Ok(Self { archive, data })
    }

    /// Number of entries, directories included.
    #[inline]
    pub fn len(&self) -> usize {
        self.archive.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.archive.len() == 0
    }

    /// Inflate every file entry in archive order.
    pub fn read_all(&mut self, config: &EngineConfig) -> Result<Vec<RawEntry>> {
        let mut entries = Vec::with_capacity(self.archive.len());
        let mut total: u64 = 0;

        for index in 0..self.archive.len() {
            let mut file = self.archive.by_index(index).map_err(archive_error)?;
            if file.is_dir() {
                continue;
            }

            let name = file.name().to_string();
            if file.size() > config.max_part_bytes {
                return Err(OpcError::Archive(format!(
                    "{} inflates to {} bytes, limit is {}",
                    name,
                    file.size(),
                    config.max_part_bytes
                )));
            }

            let compression = match file.compression() {
                CompressionMethod::Stored => Compression::Stored,
                CompressionMethod::Deflated => Compression::Deflated,
                other => {
                    tracing::debug!(entry = %name, method = ?other, "entry will be re-encoded as deflate");
                    Compression::Deflated
                },
            };
            let level = match compression {
                Compression::Deflated => deflate_level_hint(&self.data, file.header_start()),
                Compression::Stored => None,
            };

            let mut data = Vec::with_capacity(file.size() as usize);
            (&mut file)
                .take(config.max_part_bytes + 1)
                .read_to_end(&mut data)
                .map_err(|e| OpcError::Archive(format!("{}: {}", name, e)))?;
            if data.len() as u64 > config.max_part_bytes {
                return Err(OpcError::Archive(format!(
                    "{} exceeds the part size limit of {} bytes",
                    name, config.max_part_bytes
                )));
            }

            total += data.len() as u64;
            if total > config.max_total_bytes {
                return Err(OpcError::Archive(format!(
                    "archive exceeds the total size limit of {} bytes",
                    config.max_total_bytes
                )));
            }

            entries.push(RawEntry {
                name,
                data,
                compression,
                level,
                index,
            });
        }

        Ok(entries)
    }
}

/// Physical package writer.
pub struct PhysPkgWriter {
    zip: ZipWriter<Cursor<Vec<u8>>>,
    source: Option<ZipArchive<Cursor<Bytes>>>,
}

impl PhysPkgWriter {
    /// Create a writer; `source` enables [`raw_copy`](Self::raw_copy).
    pub fn new(source: Option<Bytes>) -> Result<Self> {
        let source = match source {
            Some(data) if !data.is_empty() => {
                Some(ZipArchive::new(Cursor::new(data)).map_err(archive_error)?)
            },
            _ => None,
        };
        Ok(Self {
            zip: ZipWriter::new(Cursor::new(Vec::new())),
            source,
        })
    }

    /// Compress and write one entry.
    pub fn write(
        &mut self,
        member: &str,
        data: &[u8],
        compression: Compression,
        level: Option<i64>,
    ) -> Result<()> {
        let options = match compression {
            Compression::Stored => {
                SimpleFileOptions::default().compression_method(CompressionMethod::Stored)
            },
            Compression::Deflated => SimpleFileOptions::default()
                .compression_method(CompressionMethod::Deflated)
                .compression_level(level),
        }
        .large_file(data.len() as u64 >= u64::from(u32::MAX));

        self.zip
            .start_file(member, options)
            .map_err(|e| serialization_error(member, e))?;
        self.zip
            .write_all(data)
            .map_err(|e| serialization_error(member, e))?;
        Ok(())
    }

    /// Copy entry `index` of the source archive without recompressing it.
    pub fn raw_copy(&mut self, index: usize) -> Result<()> {
        let source = self
            .source
            .as_mut()
            .ok_or_else(|| OpcError::Serialization("no source archive to copy from".to_string()))?;
        let file = source.by_index_raw(index).map_err(archive_error)?;
        let name = file.name().to_string();
        self.zip
            .raw_copy_file(file)
            .map_err(|e| serialization_error(&name, e))
    }

    /// Finish the central directory and return the archive bytes.
    pub fn finish(self) -> Result<Vec<u8>> {
        let cursor = self
            .zip
            .finish()
            .map_err(|e| OpcError::Serialization(e.to_string()))?;
        Ok(cursor.into_inner())
    }
}

/// Encode `data` as a single-entry archive and decode it again.
pub fn round_trip_entry(
    member: &str,
    data: &[u8],
    compression: Compression,
    level: Option<i64>,
) -> Result<Vec<u8>> {
    let mut writer = PhysPkgWriter::new(None)?;
    writer.write(member, data, compression, level)?;
    let archive = writer.finish()?;

    let config = EngineConfig {
        max_part_bytes: (data.len() as u64).max(1),
        max_total_bytes: (data.len() as u64).max(1),
        ..EngineConfig::default()
    };
    let mut reader = PhysPkgReader::new(Bytes::from(archive))?;
    let mut entries = reader.read_all(&config)?;
    entries
        .pop()
        .map(|entry| entry.data)
        .ok_or_else(|| OpcError::Archive(format!("{} vanished from its own archive", member)))
}

/// Deflate level implied by general purpose bits 1-2 of the local header.
fn deflate_level_hint(data: &[u8], header_start: u64) -> Option<i64> {
    let offset = usize::try_from(header_start).ok()?;
    let header = data.get(offset..offset.checked_add(8)?)?;
    if header[..4] != LOCAL_HEADER_SIGNATURE {
        return None;
    }
    let flags = u16::from_le_bytes([header[6], header[7]]);
    Some(match (flags >> 1) & 0b11 {
        0b01 => 9,
        0b10 => 3,
        0b11 => 1,
        _ => 6,
    })
}

fn archive_error(err: zip::result::ZipError) -> OpcError {
    OpcError::Archive(err.to_string())
}

fn serialization_error(member: &str, err: impl std::fmt::Display) -> OpcError {
    OpcError::Serialization(format!("{}: {}", member, err))
}
