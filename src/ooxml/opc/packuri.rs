//! Part names.
//!
//! Every part in a package is addressed by an absolute, slash-separated name
//! such as `/ppt/slides/slide3.xml`. The archive stores the same name without
//! its leading slash; relationship targets address it relative to the
//! directory of the source part.

/// An absolute part name inside a package.
///
/// Ordering and equality are plain string comparisons, so a sorted list of
/// names is also the archive member order used on save.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
#[serde(transparent)]
pub struct PackURI {
    uri: String,
}

impl PackURI {
    /// Wrap an absolute part name; anything without a leading `/` is refused.
    pub fn new<S: Into<String>>(uri: S) -> Result<Self, String> {
        let uri = uri.into();
        match uri.as_bytes().first() {
            Some(b'/') => Ok(PackURI { uri }),
            _ => Err(format!("part name '{}' is not absolute", uri)),
        }
    }

    /// `/`, the source of package-level relationships.
    pub fn package() -> Self {
        PackURI {
            uri: PACKAGE_URI.to_string(),
        }
    }

    pub fn content_types() -> Self {
        PackURI {
            uri: CONTENT_TYPES_URI.to_string(),
        }
    }

    /// Name of the part stored under archive member `member`.
    pub fn from_membername(member: &str) -> Result<Self, String> {
        if member.is_empty() || member.starts_with('/') || member.contains('\\') {
            return Err(format!("Invalid member name '{}'", member));
        }
        Self::new(format!("/{}", member))
    }

    /// Resolve a relationship target against the directory of its source.
    ///
    /// Absolute targets are taken as-is, `.` and `..` segments are folded and
    /// a `#fragment` suffix is ignored.
    pub fn from_rel_ref(base_uri: &str, relative_ref: &str) -> Result<Self, String> {
        let target = relative_ref
            .split_once('#')
            .map_or(relative_ref, |(path, _)| path);
        if target.is_empty() {
            return Err("Empty relationship target".to_string());
        }
        let mut segments: Vec<&str> = Vec::new();
        let start = if target.starts_with('/') { "" } else { base_uri };
        for segment in start.split('/').chain(target.split('/')) {
            match segment {
                "" | "." => {},
                ".." => {
                    segments.pop();
                },
                name => segments.push(name),
            }
        }
        Self::new(format!("/{}", segments.join("/")))
    }

    fn last_slash(&self) -> usize {
        memchr::memrchr(b'/', self.uri.as_bytes()).unwrap_or(0)
    }

    /// Directory of the part: `/ppt/slides` for `/ppt/slides/slide1.xml`,
    /// `/` for top-level parts and for the package itself.
    pub fn base_uri(&self) -> &str {
        match self.last_slash() {
            0 => "/",
            pos => &self.uri[..pos],
        }
    }

    /// Last path segment; empty for `/`.
    pub fn filename(&self) -> &str {
        &self.uri[self.last_slash() + 1..]
    }

    /// Extension without the dot, or empty.
    pub fn ext(&self) -> &str {
        self.filename()
            .rsplit_once('.')
            .map_or("", |(_, ext)| ext)
    }

    /// Split the filename stem into its text prefix and numeric suffix.
    ///
    /// `("slide", Some(21))` for "/ppt/slides/slide21.xml",
    /// `("presentation", None)` for "/ppt/presentation.xml".
    pub fn stem_parts(&self) -> (&str, Option<u32>) {
        let filename = self.filename();
        let stem = filename.rsplit_once('.').map_or(filename, |(stem, _)| stem);
        let digits = stem
            .bytes()
            .rev()
            .take_while(u8::is_ascii_digit)
            .count();
        if digits == 0 || digits == stem.len() {
            return (stem, None);
        }
        let (prefix, number) = stem.split_at(stem.len() - digits);
        match atoi_simd::parse::<u32, false, false>(number.as_bytes()) {
            Ok(idx) => (prefix, Some(idx)),
            Err(_) => (stem, None),
        }
    }

    /// Numeric suffix of the stem, if any.
    #[inline]
    pub fn idx(&self) -> Option<u32> {
        self.stem_parts().1
    }

    /// The sibling partname with the same prefix and extension but index `idx`.
    ///
    /// "/ppt/slides/slide3.xml" with 7 gives "/ppt/slides/slide7.xml".
    pub fn with_idx(&self, idx: u32) -> PackURI {
        let (prefix, _) = self.stem_parts();
        let mut buf = itoa::Buffer::new();
        let mut uri = String::with_capacity(self.uri.len() + 4);
        let base = self.base_uri();
        if base != "/" {
            uri.push_str(base);
        }
        uri.push('/');
        uri.push_str(prefix);
        uri.push_str(buf.format(idx));
        let ext = self.ext();
        if !ext.is_empty() {
            uri.push('.');
            uri.push_str(ext);
        }
        PackURI { uri }
    }

    /// Archive member name: the part name without its leading slash.
    pub fn membername(&self) -> &str {
        &self.uri[1..]
    }

    /// Target string that reaches this part from a source in `base_uri`.
    ///
    /// `/ppt/slideLayouts/slideLayout1.xml` seen from `/ppt/slides` is
    /// `../slideLayouts/slideLayout1.xml`.
    pub fn relative_ref(&self, base_uri: &str) -> String {
        let from: Vec<&str> = base_uri.split('/').filter(|s| !s.is_empty()).collect();
        let to: Vec<&str> = self.uri.split('/').filter(|s| !s.is_empty()).collect();
        let (dirs, file) = to.split_at(to.len().saturating_sub(1));

        let shared = from
            .iter()
            .zip(dirs)
            .take_while(|(a, b)| a == b)
            .count();

        let mut target = "../".repeat(from.len() - shared);
        let rest: Vec<&str> = dirs[shared..].iter().chain(file).copied().collect();
        target.push_str(&rest.join("/"));
        target
    }

    /// Name of the relationships part holding this part's outgoing links:
    /// `/ppt/_rels/presentation.xml.rels` for `/ppt/presentation.xml`.
    pub fn rels_uri(&self) -> Result<PackURI, String> {
        let dir = match self.base_uri() {
            "/" => "",
            dir => dir,
        };
        Self::new(format!("{}/_rels/{}.rels", dir, self.filename()))
    }

    /// Whether this names a relationships part ("…/_rels/….rels").
    pub fn is_rels(&self) -> bool {
        self.ext().eq_ignore_ascii_case("rels") && self.base_uri().ends_with("_rels")
    }

    /// Inverse of [`rels_uri`](Self::rels_uri): the part whose relationships
    /// this .rels part holds. `/_rels/.rels` maps to the package itself ("/").
    pub fn rels_source(&self) -> Option<PackURI> {
        if !self.is_rels() {
            return None;
        }
        let filename = self.filename();
        let source_file = &filename[..filename.len() - ".rels".len()];
        let base = self.base_uri();
        let parent = &base[..base.len() - "_rels".len()];
        let parent = parent.trim_end_matches('/');
        if source_file.is_empty() {
            return parent.is_empty().then(PackURI::package);
        }
        Some(PackURI {
            uri: format!("{}/{}", parent, source_file),
        })
    }

    #[inline]
    pub fn is_package(&self) -> bool {
        self.uri == PACKAGE_URI
    }

    pub fn as_str(&self) -> &str {
        &self.uri
    }
}

impl std::fmt::Display for PackURI {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.uri)
    }
}

impl AsRef<str> for PackURI {
    fn as_ref(&self) -> &str {
        &self.uri
    }
}

/// Source name of package-level relationships
pub const PACKAGE_URI: &str = "/";

pub const CONTENT_TYPES_URI: &str = "/[Content_Types].xml";

/// Member name of the content types part inside the archive
pub const CONTENT_TYPES_MEMBER: &str = "[Content_Types].xml";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packuri_components() {
        let name = PackURI::new("/ppt/slides/slide21.xml").unwrap();
        assert_eq!(name.base_uri(), "/ppt/slides");
        assert_eq!(name.filename(), "slide21.xml");
        assert_eq!(name.ext(), "xml");
        assert_eq!(name.membername(), "ppt/slides/slide21.xml");
        assert_eq!(name.stem_parts(), ("slide", Some(21)));
        assert_eq!(PackURI::new("/[Content_Types].xml").unwrap().base_uri(), "/");
        assert_eq!(PackURI::package().membername(), "");
        assert!(PackURI::new("ppt/slides/slide1.xml").is_err());
    }

    #[test]
    fn test_singleton_has_no_idx() {
        assert_eq!(PackURI::new("/ppt/presentation.xml").unwrap().idx(), None);
        assert_eq!(PackURI::new("/ppt/media/2024.png").unwrap().idx(), None);
    }

    #[test]
    fn test_with_idx() {
        let uri = PackURI::new("/ppt/notesSlides/notesSlide3.xml").unwrap();
        assert_eq!(
            uri.with_idx(12).as_str(),
            "/ppt/notesSlides/notesSlide12.xml"
        );
    }

    #[test]
    fn test_from_rel_ref() {
        let uri = PackURI::from_rel_ref("/ppt/slides", "../slideLayouts/slideLayout1.xml").unwrap();
        assert_eq!(uri.as_str(), "/ppt/slideLayouts/slideLayout1.xml");

        let absolute = PackURI::from_rel_ref("/ppt/slides", "/ppt/media/image1.png").unwrap();
        assert_eq!(absolute.as_str(), "/ppt/media/image1.png");

        let fragment = PackURI::from_rel_ref("/ppt", "slides/slide2.xml#anchor").unwrap();
        assert_eq!(fragment.as_str(), "/ppt/slides/slide2.xml");

        let root = PackURI::from_rel_ref("/", "ppt/presentation.xml").unwrap();
        assert_eq!(root.as_str(), "/ppt/presentation.xml");
    }

    #[test]
    fn test_relative_ref() {
        let layout = PackURI::new("/ppt/slideLayouts/slideLayout1.xml").unwrap();
        assert_eq!(
            layout.relative_ref("/ppt/slides"),
            "../slideLayouts/slideLayout1.xml"
        );
        let slide = PackURI::new("/ppt/slides/slide2.xml").unwrap();
        assert_eq!(slide.relative_ref("/ppt"), "slides/slide2.xml");
        assert_eq!(slide.relative_ref("/ppt/slides"), "slide2.xml");
        assert_eq!(slide.relative_ref("/"), "ppt/slides/slide2.xml");
    }

    #[test]
    fn test_rels_round_trip() {
        let part = PackURI::new("/ppt/slides/slide1.xml").unwrap();
        let rels = part.rels_uri().unwrap();
        assert_eq!(rels.as_str(), "/ppt/slides/_rels/slide1.xml.rels");
        assert!(rels.is_rels());
        assert_eq!(rels.rels_source(), Some(part));

        let pkg_rels = PackURI::new("/_rels/.rels").unwrap();
        assert!(pkg_rels.rels_source().unwrap().is_package());

        assert_eq!(PackURI::new("/ppt/presentation.xml").unwrap().rels_source(), None);
    }

    #[test]
    fn test_from_membername() {
        assert_eq!(
            PackURI::from_membername("[Content_Types].xml").unwrap().as_str(),
            CONTENT_TYPES_URI
        );
        assert!(PackURI::from_membername("").is_err());
        assert!(PackURI::from_membername("/abs").is_err());
    }
}
