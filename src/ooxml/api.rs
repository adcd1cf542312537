//! Engine entry points.
//!
//! One [`Package`] serves one editing session: load it, keep a copy as the
//! schema baseline, apply duplications, order edits and free-text part edits,
//! clean, validate and save. All operations run on the caller's thread and
//! never share a package between sessions.
//!
//! # Examples
//!
//! ### Duplicating a slide and saving the result
//!
//! ```rust,no_run
//! use pptx_engine::ooxml::api;
//!
//! let mut pkg = api::load("deck.pptx")?;
//! let baseline = pkg.clone();
//!
//! let copy = api::duplicate(&mut pkg, "ppt/slides/slide2.xml")?;
//! api::insert_into_order(&mut pkg, copy.slide_id, &copy.relationship_id, 3)?;
//! api::clean(&mut pkg)?;
//!
//! let report = api::save_checked(&mut pkg, &baseline, "deck-edited.pptx", false)?;
//! for finding in report.repairs() {
//!     println!("{}", finding);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ### Dropping a slide
//!
//! ```rust,no_run
//! use pptx_engine::ooxml::opc::Package;
//!
//! let mut pkg = Package::open("deck.pptx")?;
//! pkg.remove_from_order(257)?;
//! let removed = pkg.clean()?;
//! println!("removed {:?}", removed);
//! pkg.save_to("deck-trimmed.pptx")?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use crate::common::config::EngineConfig;
use crate::ooxml::error::Result;
use crate::ooxml::opc::package::Package;
use crate::ooxml::pptx::{self, DuplicateOutcome, SlideEntry};
use crate::ooxml::validate::{self, Finding, ValidationReport};
use std::path::Path;

/// Load a package with the default configuration.
pub fn load<P: AsRef<Path>>(path: P) -> Result<Package> {
    Ok(Package::open(path)?)
}

/// Load a package with an explicit configuration, which `save` reuses.
pub fn load_with_config<P: AsRef<Path>>(path: P, config: EngineConfig) -> Result<Package> {
    Ok(Package::open_with_config(path, config)?)
}

/// Load a package from archive bytes already in memory.
pub fn load_bytes(data: Vec<u8>) -> Result<Package> {
    Ok(Package::from_bytes(data)?)
}

/// Copy a slide under a fresh name, id and relationship id. The copy is not
/// yet part of the slide order.
pub fn duplicate(package: &mut Package, source: &str) -> Result<DuplicateOutcome> {
    Ok(pptx::duplicate(package, source)?)
}

/// Place a slide in the slide order at 1-based `position`; returns the
/// position actually used.
pub fn insert_into_order(
    package: &mut Package,
    slide_id: u32,
    relationship_id: &str,
    position: usize,
) -> Result<usize> {
    Ok(pptx::insert_into_order(package, slide_id, relationship_id, position)?)
}

/// Take a slide out of the slide order. Its parts stay until [`clean`].
pub fn remove_from_order(package: &mut Package, slide_id: u32) -> Result<SlideEntry> {
    Ok(pptx::remove_from_order(package, slide_id)?)
}

/// Delete unreachable parts and the references that pointed at them.
pub fn clean(package: &mut Package) -> Result<Vec<String>> {
    Ok(pptx::clean(package)?)
}

/// Check the cross-part invariants of `package` without changing it.
pub fn validate_structure(package: &Package) -> Vec<Finding> {
    validate::validate_structure(package)
}

/// Repair padded text runs, then report the schema violations `baseline`
/// does not already have.
pub fn validate_schema(package: &mut Package, baseline: &Package) -> Vec<Finding> {
    validate::validate_schema(package, baseline)
}

/// Run both validators. Schema repairs are applied to `package`.
pub fn validate(package: &mut Package, baseline: &Package) -> ValidationReport {
    let mut report = ValidationReport::new(validate::validate_structure(package));
    report.extend(validate::validate_schema(package, baseline));
    report
}

/// Check one part's XML before it is written into a package.
///
/// All schema violations are reported since there is no baseline.
pub fn validate_part_xml(member: &str, xml: &str) -> Vec<Finding> {
    validate::validate_part_xml(member, xml)
}

/// Write `package` to `path` without validating it.
pub fn save<P: AsRef<Path>>(package: &Package, path: P) -> Result<()> {
    Ok(package.save_to(path)?)
}

/// Validate, then save only if the findings allow it.
///
/// The report is returned on success so callers can log warnings and repairs.
pub fn save_checked<P: AsRef<Path>>(
    package: &mut Package,
    baseline: &Package,
    path: P,
    accept_schema_regressions: bool,
) -> Result<ValidationReport> {
    let report = validate(package, baseline);
    report.ensure_savable(accept_schema_regressions)?;
    package.save_to(path)?;
    Ok(report)
}

impl Package {
    /// See [`duplicate`].
    pub fn duplicate_slide(&mut self, source: &str) -> Result<DuplicateOutcome> {
        duplicate(self, source)
    }

    /// See [`insert_into_order`].
    pub fn insert_into_order(
        &mut self,
        slide_id: u32,
        relationship_id: &str,
        position: usize,
    ) -> Result<usize> {
        insert_into_order(self, slide_id, relationship_id, position)
    }

    /// See [`remove_from_order`].
    pub fn remove_from_order(&mut self, slide_id: u32) -> Result<SlideEntry> {
        remove_from_order(self, slide_id)
    }

    /// See [`clean`].
    pub fn clean(&mut self) -> Result<Vec<String>> {
        clean(self)
    }

    /// See [`validate_structure`].
    pub fn validate_structure(&self) -> Vec<Finding> {
        validate_structure(self)
    }

    /// See [`validate_schema`].
    pub fn validate_schema(&mut self, baseline: &Package) -> Vec<Finding> {
        validate_schema(self, baseline)
    }

    /// See [`validate`].
    pub fn validate(&mut self, baseline: &Package) -> ValidationReport {
        validate(self, baseline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ooxml::error::OoxmlError;
    use crate::ooxml::fixtures::{FixtureBuilder, zip_names};
    use crate::ooxml::opc::PackURI;
    use crate::ooxml::pptx::OrderManifest;
    use tempfile::TempDir;

    fn fixture(dir: &TempDir, builder: FixtureBuilder) -> std::path::PathBuf {
        let path = dir.path().join("deck.pptx");
        std::fs::write(&path, builder.build()).unwrap();
        path
    }

    fn order(pkg: &Package) -> Vec<u32> {
        let main = pkg.main_document().unwrap();
        OrderManifest::from_xml(pkg.xml(main.membername()).unwrap())
            .unwrap()
            .entries()
            .iter()
            .map(|e| e.id)
            .collect()
    }

    #[test]
    fn test_duplicate_insert_save_reload() {
        let dir = TempDir::new().unwrap();
        let source = fixture(&dir, FixtureBuilder::new().slides(3).notes_on(2));
        let mut pkg = load(&source).unwrap();
        let baseline = pkg.clone();

        let copy = pkg.duplicate_slide("ppt/slides/slide2.xml").unwrap();
        pkg.insert_into_order(copy.slide_id, &copy.relationship_id, 3)
            .unwrap();
        assert!(pkg.clean().unwrap().is_empty());

        let target = dir.path().join("out.pptx");
        let report = save_checked(&mut pkg, &baseline, &target, false).unwrap();
        assert!(!report.has_errors());

        let reloaded = load(&target).unwrap();
        assert_eq!(order(&reloaded), vec![256, 257, 259, 258]);
        assert!(reloaded.contains("ppt/slides/slide4.xml"));
        assert!(reloaded.contains("ppt/notesSlides/notesSlide3.xml"));
        assert!(validate_structure(&reloaded).iter().all(|f| !f.is_error()));
    }

    #[test]
    fn test_remove_clean_save() {
        let dir = TempDir::new().unwrap();
        let source = fixture(&dir, FixtureBuilder::new().slides(3).image_on_first_slide());
        let mut pkg = load_with_config(&source, EngineConfig::default()).unwrap();

        let entry = pkg.remove_from_order(256).unwrap();
        assert_eq!(entry.r_id, "rId2");
        let removed = pkg.clean().unwrap();
        assert!(removed.contains(&"ppt/media/image1.png".to_string()));

        let target = dir.path().join("out.pptx");
        save(&pkg, &target).unwrap();
        let names = zip_names(&std::fs::read(&target).unwrap());
        assert!(!names.iter().any(|n| n == "ppt/slides/slide1.xml"));
        assert!(names.iter().any(|n| n == "ppt/slides/slide2.xml"));
    }

    #[test]
    fn test_save_checked_blocks_regressions() {
        let dir = TempDir::new().unwrap();
        let mut pkg = load_bytes(FixtureBuilder::new().build()).unwrap();
        let baseline = pkg.clone();

        let uri = PackURI::new("/ppt/slides/slide1.xml").unwrap();
        let xml = pkg.xml(uri.membername()).unwrap().replace("<p:grpSpPr/>", "<p:grpSpPr/><p:bogus/>");
        pkg.put_xml(&uri, xml);

        let target = dir.path().join("out.pptx");
        let err = save_checked(&mut pkg, &baseline, &target, false).unwrap_err();
        assert!(matches!(err, OoxmlError::SchemaRegression { .. }));
        assert!(!target.exists());

        let report = save_checked(&mut pkg, &baseline, &target, true).unwrap();
        assert_eq!(report.errors().count(), 1);
        assert!(target.exists());
    }

    #[test]
    fn test_save_checked_blocks_structural_errors() {
        let dir = TempDir::new().unwrap();
        let mut pkg = load_bytes(FixtureBuilder::new().slides(2).build()).unwrap();
        let baseline = pkg.clone();
        pkg.remove_part("ppt/slideLayouts/slideLayout1.xml");

        let err = save_checked(&mut pkg, &baseline, dir.path().join("out.pptx"), true).unwrap_err();
        assert!(matches!(err, OoxmlError::Structural { .. }));
        assert!(err.findings().iter().any(|f| f.message.contains("slideLayout1.xml")));
    }

    #[test]
    fn test_validate_part_xml_before_put() {
        let mut pkg = load_bytes(FixtureBuilder::new().build()).unwrap();
        let candidate = pkg
            .xml("ppt/slides/slide1.xml")
            .unwrap()
            .replace("Slide 1", "Edited");
        assert!(validate_part_xml("ppt/slides/slide1.xml", &candidate).is_empty());

        let broken = candidate.replace("</p:sld>", "");
        let findings = validate_part_xml("ppt/slides/slide1.xml", &broken);
        assert!(findings.iter().any(|f| f.is_error()));

        let uri = PackURI::new("/ppt/slides/slide1.xml").unwrap();
        pkg.put_xml(&uri, candidate);
        assert!(pkg.xml("ppt/slides/slide1.xml").unwrap().contains("Edited"));
    }

    #[test]
    fn test_not_found_errors() {
        let mut pkg = load_bytes(FixtureBuilder::new().build()).unwrap();
        assert!(pkg.remove_from_order(999).unwrap_err().is_not_found());
        assert!(duplicate(&mut pkg, "ppt/slides/slide9.xml").unwrap_err().is_not_found());
        assert!(load("/nonexistent/deck.pptx").is_err());
    }
}
