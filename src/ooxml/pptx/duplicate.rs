//! Slide duplication and order-manifest editing.
//!
//! Every operation here first builds all new part contents on the side and
//! only touches the package once nothing can fail anymore, so an error
//! leaves the package exactly as it was.

use crate::ooxml::opc::constants::{content_type as ct, kind, relationship_type as rt};
use crate::ooxml::opc::content_types::ContentTypeRegistry;
use crate::ooxml::opc::error::{OpcError, Result};
use crate::ooxml::opc::package::Package;
use crate::ooxml::opc::packuri::PackURI;
use crate::ooxml::opc::part::{Part, Payload};
use crate::ooxml::opc::phys_pkg::EntryMeta;
use crate::ooxml::opc::rel::{Relationships, r_id_number};
use crate::ooxml::pptx::allocator::{
    IdCeiling, MAX_SLIDE_ID, MIN_SLIDE_ID, SlideAllocation, allocate_relationship_id,
    allocate_slide_id, next_part_name,
};
use crate::ooxml::pptx::manifest::{OrderManifest, SlideEntry};
use serde::Serialize;

/// Relationship kinds whose targets belong to one slide and are copied with it.
const SLIDE_SCOPED_KINDS: &[&str] = &[kind::NOTES_SLIDE, kind::COMMENTS];

/// Identifiers of a freshly duplicated slide.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateOutcome {
    pub slide_id: u32,
    pub relationship_id: String,
    pub part_name: PackURI,
}

/// A part to be written on commit.
struct Staged {
    part: Part,
    rels: Option<(PackURI, String)>,
    meta_from: PackURI,
}

pub(crate) fn partname_of(name: &str) -> Result<PackURI> {
    if name.starts_with('/') {
        PackURI::new(name)
    } else {
        PackURI::from_membername(name)
    }
    .map_err(OpcError::InvalidPackUri)
}

fn is_slide(part: &Part) -> bool {
    match part.content_type() {
        Some(content_type) => content_type == ct::PML_SLIDE,
        None => part.partname().base_uri().eq_ignore_ascii_case("/ppt/slides"),
    }
}

/// Copy a slide, its relationships and its slide-scoped dependents.
///
/// The copy gets the next free part name in the slide's directory, a new
/// slide id and a new relationship from the presentation part. Notes and
/// comments of the source are copied too, with their back-reference
/// pointing at the new slide; everything else the slide references is shared.
///
/// The new slide is not yet shown: call [`insert_into_order`] to place it.
pub fn duplicate(package: &mut Package, source: &str) -> Result<DuplicateOutcome> {
    let source_uri = partname_of(source)?;
    let source_part = package
        .part(source_uri.membername())
        .ok_or_else(|| OpcError::PartNotFound(source_uri.to_string()))?;
    if !is_slide(source_part) || !source_part.payload().is_xml() {
        return Err(OpcError::InvalidPart(format!("{} is not a slide", source_uri)));
    }

    let main = package.main_document()?;
    let (slide_id, slide_ceiling) = allocate_slide_id(package)?;
    let (r_id, rel_ceiling) = allocate_relationship_id(package)?;
    let new_uri = next_part_name(package, &source_uri, &[]);
    let mut reserved = vec![new_uri.clone()];

    let mut registry = package.content_types()?;
    let content_type = source_part
        .content_type()
        .or_else(|| registry.resolve(&source_uri))
        .unwrap_or(ct::PML_SLIDE)
        .to_string();

    let mut staged = Vec::new();
    let source_rels = package.relationships(&source_uri)?;
    let mut new_rels = Relationships::new(new_uri.base_uri());

    for rel in source_rels.iter() {
        // A link from the slide to itself follows the copy.
        if !rel.is_external() && rel.target_partname().is_ok_and(|t| t == source_uri) {
            new_rels.add_relationship(
                rel.reltype().to_string(),
                new_uri.relative_ref(new_uri.base_uri()),
                rel.r_id().to_string(),
                false,
            );
            continue;
        }
        let scoped_target = if !rel.is_external() && SLIDE_SCOPED_KINDS.contains(&rel.kind()) {
            rel.target_partname()
                .ok()
                .filter(|target| package.contains(target.membername()))
        } else {
            None
        };
        let Some(dependent) = scoped_target else {
            new_rels.add_relationship(
                rel.reltype().to_string(),
                rel.target_ref().to_string(),
                rel.r_id().to_string(),
                rel.is_external(),
            );
            continue;
        };

        let copy_uri = next_part_name(package, &dependent, &reserved);
        reserved.push(copy_uri.clone());
        staged.push(stage_dependent(
            package,
            &dependent,
            &copy_uri,
            &source_uri,
            &new_uri,
            &mut registry,
        )?);
        new_rels.add_relationship(
            rel.reltype().to_string(),
            copy_uri.relative_ref(new_uri.base_uri()),
            rel.r_id().to_string(),
            false,
        );
    }

    let source_rels_uri = source_uri.rels_uri().map_err(OpcError::InvalidPackUri)?;
    let slide_rels = if package.contains(source_rels_uri.membername()) {
        let rels_uri = new_uri.rels_uri().map_err(OpcError::InvalidPackUri)?;
        Some((rels_uri, new_rels.to_xml(package.config().indent_width)))
    } else {
        None
    };
    let slide_copy = Part::xml(new_uri.clone(), package.xml(source_uri.membername())?.to_string())
        .with_content_type(content_type.clone());
    staged.insert(
        0,
        Staged {
            part: slide_copy,
            rels: slide_rels,
            meta_from: source_uri.clone(),
        },
    );
    registry.set_override(&new_uri, &content_type);

    let mut presentation_rels = package.relationships(&main)?;
    let reltype = presentation_rels
        .of_kind(kind::SLIDE)
        .find(|rel| rel.target_partname().is_ok_and(|t| t == source_uri))
        .map_or(rt::SLIDE, |rel| rel.reltype())
        .to_string();
    presentation_rels.add_relationship(
        reltype,
        new_uri.relative_ref(main.base_uri()),
        r_id.clone(),
        false,
    );
    let presentation_rels_uri = main.rels_uri().map_err(OpcError::InvalidPackUri)?;
    let presentation_rels_xml = presentation_rels.to_xml(package.config().indent_width);

    // Nothing below can fail.
    for Staged {
        part,
        rels,
        meta_from,
    } in staged
    {
        if let Some(meta) = package.entry_meta(meta_from.membername()).copied() {
            package.set_entry_meta(
                part.membername(),
                EntryMeta::fresh(meta.compression, meta.level),
            );
        }
        package.insert_part(part);
        if let Some((rels_uri, xml)) = rels {
            let rels_meta = meta_from
                .rels_uri()
                .ok()
                .and_then(|uri| package.entry_meta(uri.membername()).copied());
            if let Some(meta) = rels_meta {
                package.set_entry_meta(
                    rels_uri.membername(),
                    EntryMeta::fresh(meta.compression, meta.level),
                );
            }
            package.put_xml(&rels_uri, xml);
        }
    }
    package.put_xml(&presentation_rels_uri, presentation_rels_xml);
    package.put_content_types(&registry);
    package.raise_ceiling(slide_ceiling.raise(rel_ceiling));
    package.record_allocation(SlideAllocation {
        slide_id,
        r_id: r_id.clone(),
        part_name: new_uri.clone(),
    });

    tracing::info!(
        source = %source_uri,
        part = %new_uri,
        slide_id,
        r_id = %r_id,
        "slide duplicated"
    );
    Ok(DuplicateOutcome {
        slide_id,
        relationship_id: r_id,
        part_name: new_uri,
    })
}

/// Copy of a notes or comments part whose link back to the source slide
/// is retargeted to the new slide.
fn stage_dependent(
    package: &Package,
    dependent: &PackURI,
    copy_uri: &PackURI,
    source_slide: &PackURI,
    new_slide: &PackURI,
    registry: &mut ContentTypeRegistry,
) -> Result<Staged> {
    let part = package
        .part(dependent.membername())
        .ok_or_else(|| OpcError::PartNotFound(dependent.to_string()))?;

    let mut copy = match part.payload() {
        Payload::Xml(text) => Part::xml(copy_uri.clone(), text.clone()),
        Payload::Binary(data) => Part::binary(copy_uri.clone(), data.clone()),
    };
    let content_type = part
        .content_type()
        .or_else(|| registry.resolve(dependent))
        .map(str::to_string);
    if let Some(content_type) = content_type {
        registry.set_override(copy_uri, &content_type);
        copy = copy.with_content_type(content_type);
    }

    let rels_uri = dependent.rels_uri().map_err(OpcError::InvalidPackUri)?;
    let rels = if package.contains(rels_uri.membername()) {
        let mut rels = package.relationships(dependent)?;
        for rel in rels.iter_mut().filter(|rel| !rel.is_external()) {
            if rel.target_partname().is_ok_and(|target| &target == source_slide) {
                rel.set_target_ref(new_slide.relative_ref(copy_uri.base_uri()));
            }
        }
        let copy_rels_uri = copy_uri.rels_uri().map_err(OpcError::InvalidPackUri)?;
        Some((copy_rels_uri, rels.to_xml(package.config().indent_width)))
    } else {
        None
    };

    Ok(Staged {
        part: copy,
        rels,
        meta_from: dependent.clone(),
    })
}

/// Show slide `slide_id` at the 1-based `position`, clamped to `[1, len + 1]`.
///
/// `r_id` must name a slide relationship of the presentation part. If it
/// does not exist but was handed out by [`duplicate`] for this slide id, the
/// relationship is restored first. Returns the position actually used.
pub fn insert_into_order(
    package: &mut Package,
    slide_id: u32,
    r_id: &str,
    position: usize,
) -> Result<usize> {
    if !(MIN_SLIDE_ID..=MAX_SLIDE_ID).contains(&slide_id) {
        return Err(OpcError::InvalidPart(format!(
            "slide id {} outside {}..={}",
            slide_id, MIN_SLIDE_ID, MAX_SLIDE_ID
        )));
    }

    let main = package.main_document()?;
    let xml = package.xml(main.membername())?;
    let mut manifest = OrderManifest::from_xml(xml)?;
    if manifest.contains(slide_id) {
        return Err(OpcError::Conflict(format!("slide id {} is already shown", slide_id)));
    }
    if manifest.contains_r_id(r_id) {
        return Err(OpcError::Conflict(format!(
            "relationship {} is already used by another slide",
            r_id
        )));
    }

    let mut rels = package.relationships(&main)?;
    let restored_rels = match rels.get(r_id) {
        Some(rel) if rel.kind() == kind::SLIDE => None,
        Some(_) => {
            return Err(OpcError::InvalidPart(format!(
                "relationship {} does not target a slide",
                r_id
            )));
        },
        None => {
            let allocation = package
                .allocations()
                .iter()
                .find(|a| {
                    a.slide_id == slide_id
                        && a.r_id == r_id
                        && package.contains(a.part_name.membername())
                })
                .ok_or_else(|| OpcError::RelationshipNotFound(r_id.to_string()))?;
            rels.add_relationship(
                rt::SLIDE.to_string(),
                allocation.part_name.relative_ref(main.base_uri()),
                r_id.to_string(),
                false,
            );
            let rels_uri = main.rels_uri().map_err(OpcError::InvalidPackUri)?;
            Some((rels_uri, rels.to_xml(package.config().indent_width)))
        },
    };

    let used = manifest.insert(position, SlideEntry::new(slide_id, r_id));
    let updated = manifest.apply_to(xml)?;

    if let Some((rels_uri, rels_xml)) = restored_rels {
        package.put_xml(&rels_uri, rels_xml);
    }
    package.put_formatted_xml(&main, updated);
    package.raise_ceiling(IdCeiling {
        slide_id,
        presentation_rel: r_id_number(r_id).unwrap_or(0),
    });

    tracing::info!(slide_id, r_id, position = used, "slide inserted into order");
    Ok(used)
}

/// Stop showing slide `slide_id`. The slide part and its relationship stay
/// until [`clean`](crate::ooxml::pptx::cleanup::clean) reclaims them.
pub fn remove_from_order(package: &mut Package, slide_id: u32) -> Result<SlideEntry> {
    let main = package.main_document()?;
    let xml = package.xml(main.membername())?;
    let mut manifest = OrderManifest::from_xml(xml)?;
    let entry = manifest
        .remove(slide_id)
        .ok_or(OpcError::SlideIdNotFound(slide_id))?;
    let updated = manifest.apply_to(xml)?;
    package.put_formatted_xml(&main, updated);

    tracing::info!(slide_id, r_id = %entry.r_id, "slide removed from order");
    Ok(entry)
}
