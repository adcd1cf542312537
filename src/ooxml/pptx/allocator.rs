//! Identifier allocation for new slides.
//!
//! Allocation is a pure function of the package: it reads the current
//! identifiers and the package's [`IdCeiling`] and returns the new identifier
//! together with the raised ceiling. Nothing is recorded until the caller
//! commits that ceiling back into the package, so an allocation that is
//! abandoned leaves no trace.

use crate::ooxml::opc::error::{OpcError, Result};
use crate::ooxml::opc::package::Package;
use crate::ooxml::opc::packuri::PackURI;
use crate::ooxml::pptx::manifest::OrderManifest;
use serde::Serialize;

/// Smallest slide id PowerPoint accepts.
pub const MIN_SLIDE_ID: u32 = 256;

/// Largest slide id PowerPoint accepts.
pub const MAX_SLIDE_ID: u32 = 2_147_483_647;

/// Highest identifiers ever observed in or handed out for a package.
///
/// Ids removed from the order manifest stay below the ceiling, so they are
/// never issued again while the package lives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IdCeiling {
    pub slide_id: u32,
    /// Highest `rIdN` number in the presentation part's relationships.
    pub presentation_rel: u32,
}

impl IdCeiling {
    /// Read the current maxima from a package.
    pub fn observe(package: &Package) -> Result<Self> {
        let main = package.main_document()?;
        let manifest = OrderManifest::from_xml(package.xml(main.membername())?)?;
        let rels = package.relationships(&main)?;
        Ok(Self {
            slide_id: manifest.max_id(),
            presentation_rel: rels.max_r_id_number(),
        })
    }

    /// Fieldwise maximum.
    #[must_use]
    pub fn raise(self, other: IdCeiling) -> IdCeiling {
        IdCeiling {
            slide_id: self.slide_id.max(other.slide_id),
            presentation_rel: self.presentation_rel.max(other.presentation_rel),
        }
    }
}

/// A slide created by duplication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlideAllocation {
    pub slide_id: u32,
    pub r_id: String,
    pub part_name: PackURI,
}

/// Next slide id: one past the larger of the ceiling and the manifest maximum.
pub fn allocate_slide_id(package: &Package) -> Result<(u32, IdCeiling)> {
    let main = package.main_document()?;
    let manifest = OrderManifest::from_xml(package.xml(main.membername())?)?;
    let ceiling = package.ceiling();

    let highest = ceiling.slide_id.max(manifest.max_id());
    let id = if highest < MIN_SLIDE_ID {
        MIN_SLIDE_ID
    } else {
        highest
            .checked_add(1)
            .filter(|id| *id <= MAX_SLIDE_ID)
            .ok_or_else(|| {
                OpcError::IdentifierExhausted(format!(
                    "slide id would exceed {} (highest issued: {})",
                    MAX_SLIDE_ID, highest
                ))
            })?
    };

    Ok((
        id,
        ceiling.raise(IdCeiling {
            slide_id: id,
            presentation_rel: 0,
        }),
    ))
}

/// Next relationship id in the presentation part's scope.
pub fn allocate_relationship_id(package: &Package) -> Result<(String, IdCeiling)> {
    let main = package.main_document()?;
    let rels = package.relationships(&main)?;
    let ceiling = package.ceiling();

    let number = ceiling
        .presentation_rel
        .max(rels.max_r_id_number())
        .checked_add(1)
        .ok_or_else(|| OpcError::IdentifierExhausted("relationship id".to_string()))?;

    let mut buf = itoa::Buffer::new();
    let r_id = format!("rId{}", buf.format(number));
    Ok((
        r_id,
        ceiling.raise(IdCeiling {
            slide_id: 0,
            presentation_rel: number,
        }),
    ))
}

/// First unused sibling name of `like`: same directory, prefix and extension,
/// numbered one past the highest existing index.
///
/// Names in `reserved` count as taken even though they are not parts yet.
pub fn next_part_name(package: &Package, like: &PackURI, reserved: &[PackURI]) -> PackURI {
    let (prefix, _) = like.stem_parts();
    let base = like.base_uri();
    let ext = like.ext();

    let same_family = |uri: &PackURI| {
        uri.base_uri().eq_ignore_ascii_case(base)
            && uri.ext().eq_ignore_ascii_case(ext)
            && uri.stem_parts().0.eq_ignore_ascii_case(prefix)
    };

    let highest = package
        .iter_parts()
        .map(|part| part.partname())
        .chain(reserved.iter())
        .filter(|uri| same_family(uri))
        .filter_map(PackURI::idx)
        .max()
        .unwrap_or(0);

    like.with_idx(highest + 1)
}
