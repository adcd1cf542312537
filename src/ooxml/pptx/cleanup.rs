//! Removal of unreachable parts and the references that pointed at them.
//!
//! [`clean`] first computes the complete reachable set and only then
//! deletes. Everything it removes is something the next traversal would not
//! see anyway, so a second call on its own output finds nothing to do.

use crate::ooxml::opc::constants::kind;
use crate::ooxml::opc::error::Result;
use crate::ooxml::opc::package::Package;
use crate::ooxml::opc::packuri::{CONTENT_TYPES_MEMBER, PackURI};
use crate::ooxml::pptx::graph::{PACKAGE_NODE, RelationshipGraph};
use crate::ooxml::pptx::manifest::OrderManifest;

/// Remove orphaned state from `package`, returning the deleted part names, sorted.
///
/// In order:
/// 1. parts in reclaimable directories that are not reachable;
/// 2. `.rels` parts whose source part no longer exists;
/// 3. everything in discard directories;
/// 4. internal relationships whose target no longer exists (rewritten in place);
/// 5. order manifest entries whose relationship id does not resolve to a slide;
/// 6. content-type overrides for parts that no longer exist.
///
/// Only steps 1-3 delete parts and contribute to the returned list.
pub fn clean(package: &mut Package) -> Result<Vec<String>> {
    let graph = RelationshipGraph::build(package)?;
    let reachable = graph.reachable();

    let config = package.config().clone();
    let doomed: Vec<String> = package
        .part_names()
        .into_iter()
        .filter(|name| {
            *name != CONTENT_TYPES_MEMBER
                && (config.is_discarded(name)
                    || (config.is_reclaimable(name) && !graph.is_reachable(&reachable, name)))
        })
        .map(str::to_string)
        .collect();

    let mut removed = Vec::with_capacity(doomed.len());
    for name in doomed {
        if package.remove_part(&name).is_some() {
            removed.push(name);
        }
    }

    let orphan_rels: Vec<String> = package
        .iter_parts()
        .filter_map(|part| {
            let source = part.partname().rels_source()?;
            (!source.is_package() && !package.contains(source.membername()))
                .then(|| part.membername().to_string())
        })
        .collect();
    for name in orphan_rels {
        if package.remove_part(&name).is_some() {
            removed.push(name);
        }
    }

    let dropped_links = drop_dangling_relationships(package)?;
    let dropped_entries = drop_unresolved_manifest_entries(package)?;
    let dropped_overrides = drop_stale_overrides(package)?;

    removed.sort_unstable();
    tracing::info!(
        removed = removed.len(),
        dropped_links,
        dropped_entries,
        dropped_overrides,
        "package cleaned"
    );
    Ok(removed)
}

fn drop_dangling_relationships(package: &mut Package) -> Result<usize> {
    let sources: Vec<PackURI> = package
        .iter_parts()
        .filter_map(|part| part.partname().rels_source())
        .collect();

    let mut dropped = 0;
    for source in sources {
        let mut rels = package.relationships(&source)?;
        let removed = rels.extract_if_not(|rel| {
            rel.is_external()
                || rel
                    .target_partname()
                    .map_or(true, |target| package.contains(target.membername()))
        });
        if removed.is_empty() {
            continue;
        }
        for rel in &removed {
            tracing::warn!(
                source = if source.is_package() { PACKAGE_NODE } else { source.membername() },
                r_id = rel.r_id(),
                target = rel.target_ref(),
                "removing dangling relationship"
            );
        }
        dropped += removed.len();
        package.put_relationships(&source, &rels)?;
    }
    Ok(dropped)
}

fn drop_unresolved_manifest_entries(package: &mut Package) -> Result<usize> {
    let Ok(main) = package.main_document() else {
        return Ok(0);
    };
    let rels = package.relationships(&main)?;
    let xml = package.xml(main.membername())?;
    let mut manifest = OrderManifest::from_xml(xml)?;

    let removed = manifest.retain(|entry| {
        rels.get(&entry.r_id).is_some_and(|rel| {
            rel.kind() == kind::SLIDE
                && rel
                    .target_partname()
                    .is_ok_and(|target| package.contains(target.membername()))
        })
    });
    if removed.is_empty() {
        return Ok(0);
    }

    for entry in &removed {
        tracing::warn!(slide_id = entry.id, r_id = %entry.r_id, "removing unresolved slide entry");
    }
    let updated = manifest.apply_to(xml)?;
    package.put_formatted_xml(&main, updated);
    Ok(removed.len())
}

fn drop_stale_overrides(package: &mut Package) -> Result<usize> {
    if !package.contains(CONTENT_TYPES_MEMBER) {
        return Ok(0);
    }
    let mut registry = package.content_types()?;
    let removed = registry.retain_overrides(|name| package.contains(name));
    if !removed.is_empty() {
        package.put_content_types(&registry);
    }
    Ok(removed.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ooxml::fixtures::FixtureBuilder;
    use crate::ooxml::pptx::manifest::OrderManifest;

    fn load(builder: FixtureBuilder) -> Package {
        Package::from_bytes(builder.build()).unwrap()
    }

    fn drop_from_manifest(pkg: &mut Package, id: u32) {
        let main = pkg.main_document().unwrap();
        let xml = pkg.xml(main.membername()).unwrap().to_string();
        let mut manifest = OrderManifest::from_xml(&xml).unwrap();
        manifest.remove(id).unwrap();
        pkg.put_xml(&main, manifest.apply_to(&xml).unwrap());
    }

    #[test]
    fn test_clean_fresh_deck_removes_nothing() {
        let mut pkg = load(FixtureBuilder::new().slides(2).notes_on(1).image_on_first_slide());
        let before = pkg.save().unwrap();
        assert!(clean(&mut pkg).unwrap().is_empty());
        assert_eq!(pkg.save().unwrap(), before);
    }

    #[test]
    fn test_orphaned_middle_slide() {
        let mut pkg = load(FixtureBuilder::new().slides(3));
        let registry_before = pkg.content_types().unwrap();
        drop_from_manifest(&mut pkg, 257);

        let removed = clean(&mut pkg).unwrap();
        assert_eq!(
            removed,
            vec!["ppt/slides/_rels/slide2.xml.rels", "ppt/slides/slide2.xml"]
        );
        assert!(pkg.contains("ppt/slides/slide1.xml"));
        assert!(pkg.contains("ppt/slides/slide3.xml"));

        let main = pkg.main_document().unwrap();
        let rels = pkg.relationships(&main).unwrap();
        assert!(!rels.contains("rId3"));
        assert!(rels.contains("rId2") && rels.contains("rId4"));

        let registry = pkg.content_types().unwrap();
        let before: Vec<&str> = registry_before
            .override_names()
            .filter(|n| *n != "/ppt/slides/slide2.xml")
            .collect();
        assert_eq!(registry.override_names().collect::<Vec<_>>(), before);
    }

    #[test]
    fn test_orphaned_notes_go_with_their_slide() {
        let mut pkg = load(FixtureBuilder::new().slides(2).notes_on(2));
        drop_from_manifest(&mut pkg, 257);
        let removed = clean(&mut pkg).unwrap();
        assert_eq!(
            removed,
            vec![
                "ppt/notesSlides/_rels/notesSlide2.xml.rels",
                "ppt/notesSlides/notesSlide2.xml",
                "ppt/slides/_rels/slide2.xml.rels",
                "ppt/slides/slide2.xml",
            ]
        );
        assert!(pkg.contains("ppt/notesMasters/notesMaster1.xml"));
    }

    #[test]
    fn test_shared_media_survives() {
        let mut pkg = load(FixtureBuilder::new().slides(2).image_on_first_slide());
        drop_from_manifest(&mut pkg, 257);
        clean(&mut pkg).unwrap();
        assert!(pkg.contains("ppt/media/image1.png"));

        drop_from_manifest(&mut pkg, 256);
        let removed = clean(&mut pkg).unwrap();
        assert!(removed.contains(&"ppt/media/image1.png".to_string()));
    }

    #[test]
    fn test_discard_dir_and_orphan_rels() {
        let mut pkg = load(
            FixtureBuilder::new()
                .with_entry("[trash]/old.xml", b"<x/>")
                .with_entry("ppt/_rels/gone.xml.rels", b"<Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\"/>"),
        );
        let removed = clean(&mut pkg).unwrap();
        assert_eq!(removed, vec!["[trash]/old.xml", "ppt/_rels/gone.xml.rels"]);
    }

    #[test]
    fn test_unresolved_manifest_entry_dropped() {
        let mut pkg = load(FixtureBuilder::new().slides(2));
        let main = pkg.main_document().unwrap();
        let mut rels = pkg.relationships(&main).unwrap();
        rels.remove("rId3");
        pkg.put_relationships(&main, &rels).unwrap();

        let removed = clean(&mut pkg).unwrap();
        assert!(removed.contains(&"ppt/slides/slide2.xml".to_string()));
        let manifest = OrderManifest::from_xml(pkg.xml(main.membername()).unwrap()).unwrap();
        assert_eq!(manifest.len(), 1);
        assert!(manifest.contains(256));
    }

    #[test]
    fn test_clean_is_idempotent() {
        let mut pkg = load(FixtureBuilder::new().slides(4).notes_on(3).image_on_first_slide());
        drop_from_manifest(&mut pkg, 256);
        drop_from_manifest(&mut pkg, 258);
        assert!(!clean(&mut pkg).unwrap().is_empty());
        let snapshot = pkg.save().unwrap();
        assert!(clean(&mut pkg).unwrap().is_empty());
        assert_eq!(pkg.save().unwrap(), snapshot);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(32))]

            #[test]
            fn prop_clean_removes_exactly_the_dropped_slides(
                dropped in prop::collection::vec(any::<bool>(), 1..6),
                with_notes in any::<bool>(),
            ) {
                let slides = dropped.len();
                let mut builder = FixtureBuilder::new().slides(slides).image_on_first_slide();
                if with_notes {
                    builder = builder.notes_on(slides);
                }
                let mut pkg = load(builder);
                for (i, drop) in dropped.iter().enumerate() {
                    if *drop {
                        drop_from_manifest(&mut pkg, 256 + i as u32);
                    }
                }

                let removed = clean(&mut pkg).unwrap();
                for (i, drop) in dropped.iter().enumerate() {
                    let name = format!("ppt/slides/slide{}.xml", i + 1);
                    prop_assert_eq!(removed.contains(&name), *drop);
                    prop_assert_eq!(pkg.contains(&name), !*drop);
                }
                prop_assert_eq!(pkg.contains("ppt/media/image1.png"), !dropped[0]);

                let snapshot = pkg.save().unwrap();
                prop_assert!(clean(&mut pkg).unwrap().is_empty());
                prop_assert_eq!(pkg.save().unwrap(), snapshot);
            }
        }
    }
}
