//! The `[Content_Types].xml` registry.
//!
//! Entries keep their document order so that rewriting the registry after a
//! small change produces a small diff.

use crate::common::xml::escape_xml;
use crate::ooxml::opc::error::{OpcError, Result};
use crate::ooxml::opc::packuri::PackURI;
use quick_xml::Reader;
use quick_xml::events::Event;

/// One `Default` or `Override` element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentTypeEntry {
    Default {
        extension: String,
        content_type: String,
    },
    Override {
        part_name: String,
        content_type: String,
    },
}

/// Mapping from part names to content types.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentTypeRegistry {
    entries: Vec<ContentTypeEntry>,
}

impl ContentTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the registry part.
    pub fn from_xml(xml: &[u8]) -> Result<Self> {
        let mut registry = Self::new();
        let mut reader = Reader::from_reader(xml);
        reader.config_mut().trim_text(true);

        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e)) => {
                    match e.local_name().as_ref() {
                        b"Default" => {
                            // <Default Extension="xml" ContentType="application/xml"/>
                            let mut extension = None;
                            let mut content_type = None;

                            for attr in e.attributes() {
                                let attr = attr?;
                                match attr.key.as_ref() {
                                    b"Extension" => {
                                        extension = Some(attr.unescape_value()?.into_owned());
                                    },
                                    b"ContentType" => {
                                        content_type = Some(attr.unescape_value()?.into_owned());
                                    },
                                    _ => {},
                                }
                            }

                            if let (Some(extension), Some(content_type)) = (extension, content_type) {
                                registry.entries.push(ContentTypeEntry::Default {
                                    extension,
                                    content_type,
                                });
                            }
                        },
                        b"Override" => {
                            // <Override PartName="/ppt/slides/slide1.xml" ContentType="..."/>
                            let mut part_name = None;
                            let mut content_type = None;

                            for attr in e.attributes() {
                                let attr = attr?;
                                match attr.key.as_ref() {
                                    b"PartName" => {
                                        part_name = Some(attr.unescape_value()?.into_owned());
                                    },
                                    b"ContentType" => {
                                        content_type = Some(attr.unescape_value()?.into_owned());
                                    },
                                    _ => {},
                                }
                            }

                            if let (Some(part_name), Some(content_type)) = (part_name, content_type) {
                                registry.entries.push(ContentTypeEntry::Override {
                                    part_name,
                                    content_type,
                                });
                            }
                        },
                        _ => {},
                    }
                },
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(OpcError::XmlError(format!(
                        "Content types parse error: {}",
                        e
                    )));
                },
                _ => {},
            }
            buf.clear();
        }

        Ok(registry)
    }

    /// Content type of `partname`: an override wins over an extension default.
    ///
    /// Part names and extensions compare ASCII case-insensitively.
    pub fn resolve(&self, partname: &PackURI) -> Option<&str> {
        self.override_for(partname).or_else(|| {
            let ext = partname.ext();
            self.entries.iter().find_map(|entry| match entry {
                ContentTypeEntry::Default {
                    extension,
                    content_type,
                } if extension.eq_ignore_ascii_case(ext) => Some(content_type.as_str()),
                _ => None,
            })
        })
    }

    /// The override registered for `partname`, if any.
    pub fn override_for(&self, partname: &PackURI) -> Option<&str> {
        self.entries.iter().find_map(|entry| match entry {
            ContentTypeEntry::Override {
                part_name,
                content_type,
            } if part_name.eq_ignore_ascii_case(partname.as_str()) => Some(content_type.as_str()),
            _ => None,
        })
    }

    /// Register or replace the override for `partname`.
    pub fn set_override(&mut self, partname: &PackURI, content_type: &str) {
        for entry in &mut self.entries {
            if let ContentTypeEntry::Override {
                part_name,
                content_type: existing,
            } = entry
                && part_name.eq_ignore_ascii_case(partname.as_str())
            {
                *existing = content_type.to_string();
                return;
            }
        }
        self.entries.push(ContentTypeEntry::Override {
            part_name: partname.to_string(),
            content_type: content_type.to_string(),
        });
    }

    /// Drop overrides whose part name fails `keep`, returning the dropped names.
    pub fn retain_overrides<F>(&mut self, mut keep: F) -> Vec<String>
    where
        F: FnMut(&str) -> bool,
    {
        let mut removed = Vec::new();
        self.entries.retain(|entry| match entry {
            ContentTypeEntry::Override { part_name, .. } if !keep(part_name) => {
                removed.push(part_name.clone());
                false
            },
            _ => true,
        });
        removed
    }

    /// Iterate over the override part names.
    pub fn override_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().filter_map(|entry| match entry {
            ContentTypeEntry::Override { part_name, .. } => Some(part_name.as_str()),
            ContentTypeEntry::Default { .. } => None,
        })
    }

    #[inline]
    pub fn entries(&self) -> &[ContentTypeEntry] {
        &self.entries
    }

    /// Generate the XML for [Content_Types].xml.
    pub fn to_xml(&self, indent_width: usize) -> String {
        let mut xml = String::with_capacity(256 + self.entries.len() * 128);
        let pad = " ".repeat(indent_width);

        xml.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
        xml.push('\n');
        xml.push_str(
            r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
        );

        for entry in &self.entries {
            xml.push('\n');
            xml.push_str(&pad);
            match entry {
                ContentTypeEntry::Default {
                    extension,
                    content_type,
                } => xml.push_str(&format!(
                    r#"<Default Extension="{}" ContentType="{}"/>"#,
                    escape_xml(extension),
                    escape_xml(content_type)
                )),
                ContentTypeEntry::Override {
                    part_name,
                    content_type,
                } => xml.push_str(&format!(
                    r#"<Override PartName="{}" ContentType="{}"/>"#,
                    escape_xml(part_name),
                    escape_xml(content_type)
                )),
            }
        }

        xml.push_str("\n</Types>");
        xml
    }
}
