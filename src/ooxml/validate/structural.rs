//! Structural invariants of a presentation package.
//!
//! Each check is a plain function over the package. Checks share nothing and
//! run in parallel; their findings are concatenated in check order. A part
//! that one check cannot read is skipped by that check and reported by
//! [`well_formed`].

use crate::common::xml::condense;
use crate::common::xml::scan::{attr_value, for_each_start, prefixed_attr_value, split_qname};
use crate::ooxml::opc::constants::{content_type as ct, kind};
use crate::ooxml::opc::content_types::ContentTypeRegistry;
use crate::ooxml::opc::package::Package;
use crate::ooxml::opc::packuri::{CONTENT_TYPES_MEMBER, PackURI};
use crate::ooxml::opc::part::{Part, Payload};
use crate::ooxml::opc::phys_pkg::round_trip_entry;
use crate::ooxml::opc::rel::Relationships;
use crate::ooxml::pptx::cleanup::clean;
use crate::ooxml::pptx::manifest::OrderManifest;
use crate::ooxml::validate::{CheckKind, Finding, Location};
use quick_xml::events::BytesStart;
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};

type Check = fn(&Package) -> Vec<Finding>;

const CHECKS: &[Check] = &[
    well_formed,
    references,
    content_types,
    unique_ids,
    slide_layouts,
    notes_ownership,
    ignorable_namespaces,
    cleanup_idempotence,
    binary_round_trip,
    master_layout_ids,
];

/// Run every structural check. Never mutates the package.
pub fn validate_structure(package: &Package) -> Vec<Finding> {
    let findings: Vec<Finding> = CHECKS
        .par_iter()
        .map(|check| check(package))
        .collect::<Vec<_>>()
        .concat();

    tracing::info!(
        findings = findings.len(),
        errors = findings.iter().filter(|f| f.is_error()).count(),
        "structural validation finished"
    );
    findings
}

/// XML parts in name order.
fn xml_parts(package: &Package) -> Vec<(&str, &str)> {
    package
        .part_names()
        .into_iter()
        .filter_map(|name| match package.part(name)?.payload() {
            Payload::Xml(text) => Some((name, text.as_str())),
            Payload::Binary(_) => None,
        })
        .collect()
}

/// Parsed `.rels` parts with their source, in name order.
fn all_relationships(package: &Package) -> Vec<(&str, PackURI, Relationships)> {
    package
        .part_names()
        .into_iter()
        .filter_map(|name| {
            let part = package.part(name)?;
            let source = part.partname().rels_source()?;
            let rels =
                Relationships::from_xml(part.xml_str().ok()?.as_bytes(), source.base_uri()).ok()?;
            Some((name, source, rels))
        })
        .collect()
}

fn content_type_of<'a>(part: &'a Part, registry: Option<&'a ContentTypeRegistry>) -> Option<&'a str> {
    registry
        .and_then(|r| r.resolve(part.partname()))
        .or_else(|| part.content_type())
}

fn parts_of_type<'a>(package: &'a Package, content_type: &str, dir: &str) -> Vec<&'a Part> {
    let registry = package.content_types().ok();
    let mut parts: Vec<&Part> = package
        .iter_parts()
        .filter(|part| !part.partname().is_rels())
        .filter(|part| match content_type_of(part, registry.as_ref()) {
            Some(found) => found == content_type,
            None => part.partname().base_uri().eq_ignore_ascii_case(dir),
        })
        .collect();
    parts.sort_by(|a, b| a.partname().cmp(b.partname()));
    parts
}

fn manifest_of(package: &Package) -> Option<(PackURI, OrderManifest)> {
    let main = package.main_document().ok()?;
    let manifest = OrderManifest::from_xml(package.xml(main.membername()).ok()?).ok()?;
    Some((main, manifest))
}

/// Visit the start tags of `xml`, tracing where a malformed part ends the scan.
fn scan_starts<F>(name: &str, xml: &str, visit: F)
where
    F: FnMut(&BytesStart<'_>, usize),
{
    if let Err(error) = for_each_start(xml.as_bytes(), visit) {
        tracing::trace!(part = name, %error, "start tag scan stopped early");
    }
}

fn rel_location(rels_part: &str, r_id: &str) -> Location {
    Location::element(rels_part, format!("/Relationships/Relationship[@Id='{}']", r_id))
}

/// Every XML part parses.
fn well_formed(package: &Package) -> Vec<Finding> {
    xml_parts(package)
        .into_iter()
        .filter_map(|(name, xml)| {
            condense(xml)
                .err()
                .map(|e| Finding::error(CheckKind::WellFormed, Location::part(name), e.to_string()))
        })
        .collect()
}

/// Internal relationship targets and slide-order ids resolve.
fn references(package: &Package) -> Vec<Finding> {
    let mut findings = Vec::new();

    for (name, source, rels) in all_relationships(package) {
        if !source.is_package() && !package.contains(source.membername()) {
            findings.push(Finding::warning(
                CheckKind::Reference,
                Location::part(name),
                format!("relationships part of missing source {}", source),
            ));
            continue;
        }
        for rel in rels.iter().filter(|rel| !rel.is_external()) {
            match rel.target_partname() {
                Ok(target) if package.contains(target.membername()) => {},
                Ok(target) => findings.push(Finding::error(
                    CheckKind::Reference,
                    rel_location(name, rel.r_id()),
                    format!("target {} does not exist", target),
                )),
                Err(e) => findings.push(Finding::error(
                    CheckKind::Reference,
                    rel_location(name, rel.r_id()),
                    e.to_string(),
                )),
            }
        }
    }

    if let Some((main, manifest)) = manifest_of(package)
        && let Ok(rels) = package.relationships(&main)
    {
        for entry in manifest.entries() {
            let resolves = rels
                .get(&entry.r_id)
                .is_some_and(|rel| rel.kind() == kind::SLIDE && !rel.is_external());
            if !resolves {
                findings.push(Finding::error(
                    CheckKind::Reference,
                    Location::element(
                        main.membername(),
                        format!("/p:presentation/p:sldIdLst/p:sldId[@id='{}']", entry.id),
                    ),
                    format!("{} is not a slide relationship of the presentation", entry.r_id),
                ));
            }
        }
    }

    findings
}

/// Every part has a content type.
fn content_types(package: &Package) -> Vec<Finding> {
    let registry = match package.content_types() {
        Ok(registry) => registry,
        Err(e) => {
            return vec![Finding::error(
                CheckKind::ContentType,
                Location::part(CONTENT_TYPES_MEMBER),
                format!("content type registry unavailable: {}", e),
            )];
        },
    };

    let mut findings: Vec<Finding> = package
        .part_names()
        .into_iter()
        .filter(|name| *name != CONTENT_TYPES_MEMBER)
        .filter_map(|name| package.part(name))
        .filter(|part| registry.resolve(part.partname()).is_none())
        .map(|part| {
            Finding::error(
                CheckKind::ContentType,
                Location::part(part.membername()),
                "no Override or Default content type applies",
            )
        })
        .collect();

    for name in registry.override_names() {
        if !package.contains(name) {
            findings.push(Finding::warning(
                CheckKind::ContentType,
                Location::element(CONTENT_TYPES_MEMBER, format!("/Types/Override[@PartName='{}']", name)),
                "override for a part that does not exist",
            ));
        }
    }

    findings
}

/// Slide ids, master and layout ids, relationship ids and shape ids are unique
/// within their scope.
fn unique_ids(package: &Package) -> Vec<Finding> {
    let mut findings = Vec::new();

    if let Some((main, manifest)) = manifest_of(package) {
        let mut ids = HashSet::new();
        let mut r_ids = HashSet::new();
        for entry in manifest.entries() {
            let location = Location::element(
                main.membername(),
                format!("/p:presentation/p:sldIdLst/p:sldId[@id='{}']", entry.id),
            );
            if !ids.insert(entry.id) {
                findings.push(Finding::error(
                    CheckKind::UniqueIds,
                    location.clone(),
                    format!("slide id {} listed more than once", entry.id),
                ));
            }
            if !r_ids.insert(entry.r_id.as_str()) {
                findings.push(Finding::error(
                    CheckKind::UniqueIds,
                    location,
                    format!("relationship {} used by more than one slide", entry.r_id),
                ));
            }
        }
    }

    // Master and layout ids share one id space across the package.
    let mut structural_ids: HashMap<u32, String> = HashMap::new();
    for (name, xml) in xml_parts(package) {
        if name.ends_with(".rels") || name == CONTENT_TYPES_MEMBER {
            continue;
        }
        let mut shape_ids: HashSet<String> = HashSet::new();
        scan_starts(name, xml, |e, _| {
            match e.local_name().as_ref() {
                b"sldMasterId" | b"sldLayoutId" => {
                    let Some(id) = attr_value(e, b"id").and_then(|v| v.parse::<u32>().ok()) else {
                        return;
                    };
                    let element = format!(
                        "{}[@id='{}']",
                        String::from_utf8_lossy(e.name().as_ref()),
                        id
                    );
                    if let Some(first) = structural_ids.insert(id, name.to_string()) {
                        findings.push(Finding::error(
                            CheckKind::UniqueIds,
                            Location::element(name, element),
                            format!("id {} already used in {}", id, first),
                        ));
                    }
                },
                b"cNvPr" => {
                    if let Some(id) = attr_value(e, b"id")
                        && !shape_ids.insert(id.clone())
                    {
                        findings.push(Finding::warning(
                            CheckKind::UniqueIds,
                            Location::element(name, format!("cNvPr[@id='{}']", id)),
                            format!("shape id {} used more than once", id),
                        ));
                    }
                },
                _ => {},
            }
        });
    }

    for (name, _, rels) in all_relationships(package) {
        let mut seen = HashSet::new();
        for rel in rels.iter() {
            if !seen.insert(rel.r_id()) {
                findings.push(Finding::error(
                    CheckKind::UniqueIds,
                    rel_location(name, rel.r_id()),
                    format!("relationship id {} declared more than once", rel.r_id()),
                ));
            }
        }
    }

    findings
}

/// Every slide has exactly one layout relationship.
fn slide_layouts(package: &Package) -> Vec<Finding> {
    parts_of_type(package, ct::PML_SLIDE, "/ppt/slides")
        .into_iter()
        .filter_map(|slide| {
            let rels = package.relationships(slide.partname()).ok()?;
            let count = rels.of_kind(kind::SLIDE_LAYOUT).count();
            (count != 1).then(|| {
                Finding::error(
                    CheckKind::SlideLayout,
                    Location::part(slide.membername()),
                    format!("{} slideLayout relationships, expected exactly 1", count),
                )
            })
        })
        .collect()
}

/// No notes slide belongs to more than one slide.
fn notes_ownership(package: &Package) -> Vec<Finding> {
    let mut owners: HashMap<String, Vec<String>> = HashMap::new();
    for slide in parts_of_type(package, ct::PML_SLIDE, "/ppt/slides") {
        let Ok(rels) = package.relationships(slide.partname()) else {
            continue;
        };
        for rel in rels.of_kind(kind::NOTES_SLIDE) {
            if let Ok(target) = rel.target_partname() {
                owners
                    .entry(target.membername().to_string())
                    .or_default()
                    .push(slide.membername().to_string());
            }
        }
    }

    let mut findings: Vec<Finding> = owners
        .into_iter()
        .filter(|(_, slides)| slides.len() > 1)
        .map(|(notes, slides)| {
            Finding::error(
                CheckKind::NotesOwnership,
                Location::part(notes),
                format!("referenced by {} slides: {}", slides.len(), slides.join(", ")),
            )
        })
        .collect();
    findings.sort_by(|a, b| a.location.part.cmp(&b.location.part));
    findings
}

/// Prefixes listed in `mc:Ignorable` are declared on the root element.
fn ignorable_namespaces(package: &Package) -> Vec<Finding> {
    let mut findings = Vec::new();
    for (name, xml) in xml_parts(package) {
        let mut root: Option<(String, HashSet<String>, Vec<String>)> = None;
        scan_starts(name, xml, |e, depth| {
            if depth != 0 || root.is_some() {
                return;
            }
            let mut declared = HashSet::new();
            let mut ignorable = Vec::new();
            for attr in e.attributes().flatten() {
                let (prefix, local) = split_qname(attr.key.as_ref());
                if prefix == Some(&b"xmlns"[..]) {
                    declared.insert(String::from_utf8_lossy(local).into_owned());
                } else if local == b"Ignorable"
                    && let Ok(value) = attr.unescape_value()
                {
                    ignorable.extend(value.split_whitespace().map(str::to_string));
                }
            }
            root = Some((
                String::from_utf8_lossy(e.name().as_ref()).into_owned(),
                declared,
                ignorable,
            ));
        });

        let Some((qname, declared, ignorable)) = root else {
            continue;
        };
        for prefix in ignorable.iter().filter(|p| !declared.contains(*p)) {
            findings.push(Finding::error(
                CheckKind::IgnorableNamespace,
                Location::element(name, format!("/{}", qname)),
                format!("ignorable prefix '{}' is not declared", prefix),
            ));
        }
    }
    findings
}

/// Cleanup removes nothing on its second pass.
fn cleanup_idempotence(package: &Package) -> Vec<Finding> {
    let mut scratch = package.clone();
    let location = Location::part("/");

    let first = match clean(&mut scratch) {
        Ok(removed) => removed,
        Err(e) => {
            return vec![Finding::error(
                CheckKind::CleanupIdempotence,
                location,
                format!("cleanup failed: {}", e),
            )];
        },
    };

    let mut findings = Vec::new();
    if !first.is_empty() {
        findings.push(Finding::warning(
            CheckKind::CleanupIdempotence,
            location.clone(),
            format!("{} unreachable parts: {}", first.len(), first.join(", ")),
        ));
    }
    match clean(&mut scratch) {
        Ok(second) if second.is_empty() => {},
        Ok(second) => findings.push(Finding::error(
            CheckKind::CleanupIdempotence,
            location,
            format!("second cleanup pass removed {}", second.join(", ")),
        )),
        Err(e) => findings.push(Finding::error(
            CheckKind::CleanupIdempotence,
            location,
            format!("second cleanup pass failed: {}", e),
        )),
    }
    findings
}

/// Binary parts the next save re-encodes, in name order.
///
/// Entries whose bytes still match the loaded archive are copied verbatim on
/// save and need no check.
fn reencoded_binaries(package: &Package) -> Vec<(&str, &[u8])> {
    let mut parts: Vec<(&str, &[u8])> = package
        .iter_parts()
        .filter_map(|part| match part.payload() {
            Payload::Binary(data) => Some((part.membername(), data.as_slice())),
            Payload::Xml(_) => None,
        })
        .filter(|(name, data)| {
            !package
                .entry_meta(name)
                .is_some_and(|meta| meta.is_unchanged(data))
        })
        .collect();
    parts.sort_unstable_by_key(|(name, _)| *name);
    parts
}

/// Opaque parts survive the archive codec unchanged.
fn binary_round_trip(package: &Package) -> Vec<Finding> {
    let config = package.config();
    reencoded_binaries(package)
        .into_par_iter()
        .filter_map(|(name, data)| {
            let (compression, level) = package.entry_meta(name).map_or(
                (config.default_compression, config.default_compression_level),
                |meta| (meta.compression, meta.level),
            );
            let message = match round_trip_entry(name, data, compression, level) {
                Ok(decoded) if decoded == data => return None,
                Ok(decoded) => format!(
                    "decoded {} bytes differ from the {} stored bytes",
                    decoded.len(),
                    data.len()
                ),
                Err(e) => e.to_string(),
            };
            Some(Finding::error(CheckKind::BinaryRoundTrip, Location::part(name), message))
        })
        .collect()
}

/// Layout ids in each slide master point at layout relationships of that master.
fn master_layout_ids(package: &Package) -> Vec<Finding> {
    let mut findings = Vec::new();
    for master in parts_of_type(package, ct::PML_SLIDE_MASTER, "/ppt/slideMasters") {
        let Ok(xml) = master.xml_str() else {
            continue;
        };
        let mut layout_refs = Vec::new();
        scan_starts(master.membername(), xml, |e, _| {
            if e.local_name().as_ref() == b"sldLayoutId"
                && let Some(r_id) = prefixed_attr_value(e, b"id")
            {
                layout_refs.push(r_id);
            }
        });
        if layout_refs.is_empty() {
            continue;
        }

        let Ok(rels) = package.relationships(master.partname()) else {
            continue;
        };
        let valid: HashSet<&str> = rels
            .of_kind(kind::SLIDE_LAYOUT)
            .map(|rel| rel.r_id())
            .collect();
        for r_id in layout_refs.iter().filter(|r| !valid.contains(r.as_str())) {
            findings.push(Finding::error(
                CheckKind::MasterLayoutIds,
                Location::element(
                    master.membername(),
                    format!("p:sldLayoutIdLst/p:sldLayoutId[@r:id='{}']", r_id),
                ),
                format!("{} is not a slideLayout relationship of this master", r_id),
            ));
        }
    }
    findings
}
