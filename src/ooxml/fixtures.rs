//! In-memory presentation packages for unit tests.

use crate::common::xml::escape_xml;
use crate::ooxml::opc::constants::{content_type as ct, namespace as ns, relationship_type as rt};
use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const DECL: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\r\n";

/// A tiny PNG signature plus padding; the engine never decodes media.
pub const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDRfixture";

fn pml_ns() -> String {
    format!(
        "xmlns:a=\"{}\" xmlns:r=\"{}\" xmlns:p=\"{}\"",
        ns::DML_MAIN,
        ns::OFC_RELATIONSHIPS,
        ns::PML_MAIN
    )
}

fn rels_xml(rels: &[(&str, &str, String)]) -> String {
    let mut xml = format!("{}<Relationships xmlns=\"{}\">", DECL, ns::OPC_RELATIONSHIPS);
    for (id, reltype, target) in rels {
        xml.push_str(&format!(
            "<Relationship Id=\"{}\" Type=\"{}\" Target=\"{}\"/>",
            id, reltype, target
        ));
    }
    xml.push_str("</Relationships>");
    xml
}

const EMPTY_TREE: &str = "<p:nvGrpSpPr><p:cNvPr id=\"1\" name=\"\"/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr/>";

const CLR_MAP: &str = "<p:clrMap bg1=\"lt1\" tx1=\"dk1\" bg2=\"lt2\" tx2=\"dk2\" accent1=\"accent1\" accent2=\"accent2\" accent3=\"accent3\" accent4=\"accent4\" accent5=\"accent5\" accent6=\"accent6\" hlink=\"hlink\" folHlink=\"folHlink\"/>";

/// Builds a minimal but complete presentation archive.
#[derive(Debug, Clone)]
pub struct FixtureBuilder {
    slides: usize,
    notes: Vec<usize>,
    texts: BTreeMap<usize, String>,
    image_on_first: bool,
    extra: Vec<(String, Vec<u8>)>,
}

impl Default for FixtureBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FixtureBuilder {
    pub fn new() -> Self {
        Self {
            slides: 1,
            notes: Vec::new(),
            texts: BTreeMap::new(),
            image_on_first: false,
            extra: Vec::new(),
        }
    }

    pub fn slides(mut self, n: usize) -> Self {
        self.slides = n;
        self
    }

    /// Give slide `n` (1-based) a notes slide.
    pub fn notes_on(mut self, n: usize) -> Self {
        self.notes.push(n);
        self
    }

    pub fn slide_text(mut self, n: usize, text: &str) -> Self {
        self.texts.insert(n, text.to_string());
        self
    }

    pub fn image_on_first_slide(mut self) -> Self {
        self.image_on_first = true;
        self
    }

    /// Add an arbitrary entry after the generated ones.
    pub fn with_entry(mut self, name: &str, data: &[u8]) -> Self {
        self.extra.push((name.to_string(), data.to_vec()));
        self
    }

    /// `[Content_Types].xml` for a plain deck of `slides` slides.
    pub fn content_types_xml(slides: usize) -> String {
        FixtureBuilder::new().slides(slides).content_types()
    }

    fn notes_rel_id(&self) -> String {
        format!("rId{}", self.slides + 3)
    }

    pub fn content_types(&self) -> String {
        let mut xml = format!("{}<Types xmlns=\"{}\">", DECL, ns::OPC_CONTENT_TYPES);
        xml.push_str(&format!(
            "<Default Extension=\"rels\" ContentType=\"{}\"/><Default Extension=\"xml\" ContentType=\"{}\"/><Default Extension=\"png\" ContentType=\"{}\"/>",
            ct::OPC_RELATIONSHIPS,
            ct::XML,
            ct::PNG
        ));
        let mut overrides = vec![
            ("/ppt/presentation.xml".to_string(), ct::PML_PRESENTATION_MAIN),
            ("/ppt/slideMasters/slideMaster1.xml".to_string(), ct::PML_SLIDE_MASTER),
            ("/ppt/slideLayouts/slideLayout1.xml".to_string(), ct::PML_SLIDE_LAYOUT),
            ("/ppt/theme/theme1.xml".to_string(), ct::OFC_THEME),
        ];
        for i in 1..=self.slides {
            overrides.push((format!("/ppt/slides/slide{}.xml", i), ct::PML_SLIDE));
        }
        for i in &self.notes {
            overrides.push((format!("/ppt/notesSlides/notesSlide{}.xml", i), ct::PML_NOTES_SLIDE));
        }
        if !self.notes.is_empty() {
            overrides.push(("/ppt/notesMasters/notesMaster1.xml".to_string(), ct::PML_NOTES_MASTER));
        }
        for (name, content_type) in overrides {
            xml.push_str(&format!(
                "<Override PartName=\"{}\" ContentType=\"{}\"/>",
                name, content_type
            ));
        }
        xml.push_str("</Types>");
        xml
    }

    fn presentation(&self) -> String {
        let mut xml = format!("{}<p:presentation {} saveSubsetFonts=\"1\">", DECL, pml_ns());
        xml.push_str("<p:sldMasterIdLst><p:sldMasterId id=\"2147483648\" r:id=\"rId1\"/></p:sldMasterIdLst>");
        if !self.notes.is_empty() {
            xml.push_str(&format!(
                "<p:notesMasterIdLst><p:notesMasterId r:id=\"{}\"/></p:notesMasterIdLst>",
                self.notes_rel_id()
            ));
        }
        xml.push_str("<p:sldIdLst>");
        for i in 1..=self.slides {
            xml.push_str(&format!("<p:sldId id=\"{}\" r:id=\"rId{}\"/>", 255 + i, i + 1));
        }
        xml.push_str("</p:sldIdLst><p:sldSz cx=\"12192000\" cy=\"6858000\"/><p:notesSz cx=\"6858000\" cy=\"9144000\"/></p:presentation>");
        xml
    }

    fn presentation_rels(&self) -> String {
        let mut rels = vec![("rId1".to_string(), rt::SLIDE_MASTER, "slideMasters/slideMaster1.xml".to_string())];
        for i in 1..=self.slides {
            rels.push((format!("rId{}", i + 1), rt::SLIDE, format!("slides/slide{}.xml", i)));
        }
        rels.push((format!("rId{}", self.slides + 2), rt::THEME, "theme/theme1.xml".to_string()));
        if !self.notes.is_empty() {
            rels.push((self.notes_rel_id(), rt::NOTES_MASTER, "notesMasters/notesMaster1.xml".to_string()));
        }
        let borrowed: Vec<(&str, &str, String)> = rels
            .iter()
            .map(|(id, t, target)| (id.as_str(), *t, target.clone()))
            .collect();
        rels_xml(&borrowed)
    }

    fn slide(&self, i: usize) -> String {
        let text = self
            .texts
            .get(&i)
            .cloned()
            .unwrap_or_else(|| format!("Slide {}", i));
        let mut xml = format!("{}<p:sld {}><p:cSld><p:spTree>{}", DECL, pml_ns(), EMPTY_TREE);
        xml.push_str(&format!(
            "<p:sp><p:nvSpPr><p:cNvPr id=\"2\" name=\"Title 1\"/><p:cNvSpPr/><p:nvPr><p:ph type=\"title\"/></p:nvPr></p:nvSpPr><p:spPr/><p:txBody><a:bodyPr/><a:lstStyle/><a:p><a:r><a:rPr lang=\"en-US\" dirty=\"0\"/><a:t>{}</a:t></a:r></a:p></p:txBody></p:sp>",
            escape_xml(&text)
        ));
        if i == 1 && self.image_on_first {
            xml.push_str("<p:pic><p:nvPicPr><p:cNvPr id=\"3\" name=\"Picture 2\"/><p:cNvPicPr/><p:nvPr/></p:nvPicPr><p:blipFill><a:blip r:embed=\"rId3\"/></p:blipFill><p:spPr/></p:pic>");
        }
        xml.push_str("</p:spTree></p:cSld><p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr></p:sld>");
        xml
    }

    fn slide_rels(&self, i: usize) -> String {
        let mut rels = vec![("rId1", rt::SLIDE_LAYOUT, "../slideLayouts/slideLayout1.xml".to_string())];
        if self.notes.contains(&i) {
            rels.push(("rId2", rt::NOTES_SLIDE, format!("../notesSlides/notesSlide{}.xml", i)));
        }
        if i == 1 && self.image_on_first {
            rels.push(("rId3", rt::IMAGE, "../media/image1.png".to_string()));
        }
        rels_xml(&rels)
    }

    fn notes_slide(&self) -> String {
        format!(
            "{}<p:notes {}><p:cSld><p:spTree>{}</p:spTree></p:cSld><p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr></p:notes>",
            DECL,
            pml_ns(),
            EMPTY_TREE
        )
    }

    fn notes_slide_rels(&self, i: usize) -> String {
        rels_xml(&[
            ("rId1", rt::NOTES_MASTER, "../notesMasters/notesMaster1.xml".to_string()),
            ("rId2", rt::SLIDE, format!("../slides/slide{}.xml", i)),
        ])
    }

    /// Build the archive.
    pub fn build(&self) -> Vec<u8> {
        let pml = pml_ns();
        let mut entries: Vec<(String, Vec<u8>, CompressionMethod)> = Vec::new();
        let mut xml = |name: &str, text: String| {
            entries.push((name.to_string(), text.into_bytes(), CompressionMethod::Deflated));
        };

        xml("[Content_Types].xml", self.content_types());
        xml(
            "_rels/.rels",
            rels_xml(&[("rId1", rt::OFFICE_DOCUMENT, "ppt/presentation.xml".to_string())]),
        );
        xml("ppt/presentation.xml", self.presentation());
        xml("ppt/_rels/presentation.xml.rels", self.presentation_rels());
        xml(
            "ppt/slideMasters/slideMaster1.xml",
            format!(
                "{}<p:sldMaster {}><p:cSld><p:spTree>{}</p:spTree></p:cSld>{}<p:sldLayoutIdLst><p:sldLayoutId id=\"2147483649\" r:id=\"rId1\"/></p:sldLayoutIdLst></p:sldMaster>",
                DECL, pml, EMPTY_TREE, CLR_MAP
            ),
        );
        xml(
            "ppt/slideMasters/_rels/slideMaster1.xml.rels",
            rels_xml(&[
                ("rId1", rt::SLIDE_LAYOUT, "../slideLayouts/slideLayout1.xml".to_string()),
                ("rId2", rt::THEME, "../theme/theme1.xml".to_string()),
            ]),
        );
        xml(
            "ppt/slideLayouts/slideLayout1.xml",
            format!(
                "{}<p:sldLayout {} type=\"title\" preserve=\"1\"><p:cSld name=\"Title Slide\"><p:spTree>{}</p:spTree></p:cSld><p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr></p:sldLayout>",
                DECL, pml, EMPTY_TREE
            ),
        );
        xml(
            "ppt/slideLayouts/_rels/slideLayout1.xml.rels",
            rels_xml(&[("rId1", rt::SLIDE_MASTER, "../slideMasters/slideMaster1.xml".to_string())]),
        );
        xml(
            "ppt/theme/theme1.xml",
            format!(
                "{}<a:theme xmlns:a=\"{}\" name=\"Office Theme\"><a:themeElements/></a:theme>",
                DECL,
                ns::DML_MAIN
            ),
        );
        for i in 1..=self.slides {
            xml(&format!("ppt/slides/slide{}.xml", i), self.slide(i));
            xml(&format!("ppt/slides/_rels/slide{}.xml.rels", i), self.slide_rels(i));
        }
        for &i in &self.notes {
            xml(&format!("ppt/notesSlides/notesSlide{}.xml", i), self.notes_slide());
            xml(
                &format!("ppt/notesSlides/_rels/notesSlide{}.xml.rels", i),
                self.notes_slide_rels(i),
            );
        }
        if !self.notes.is_empty() {
            xml(
                "ppt/notesMasters/notesMaster1.xml",
                format!(
                    "{}<p:notesMaster {}><p:cSld><p:spTree>{}</p:spTree></p:cSld>{}</p:notesMaster>",
                    DECL, pml, EMPTY_TREE, CLR_MAP
                ),
            );
            xml(
                "ppt/notesMasters/_rels/notesMaster1.xml.rels",
                rels_xml(&[("rId1", rt::THEME, "../theme/theme1.xml".to_string())]),
            );
        }
        if self.image_on_first {
            entries.push(("ppt/media/image1.png".to_string(), PNG_BYTES.to_vec(), CompressionMethod::Stored));
        }
        for (name, data) in &self.extra {
            entries.push((name.clone(), data.clone(), CompressionMethod::Deflated));
        }

        write_zip(&entries)
    }
}

fn write_zip(entries: &[(String, Vec<u8>, CompressionMethod)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data, method) in entries {
        let options = SimpleFileOptions::default().compression_method(*method);
        writer.start_file(name.as_str(), options).unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// Archive with the given entries, all deflated.
pub fn zip_entries(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let owned: Vec<_> = entries
        .iter()
        .map(|(name, data)| (name.to_string(), data.to_vec(), CompressionMethod::Deflated))
        .collect();
    write_zip(&owned)
}

/// Inflated entries by name.
pub fn read_zip(data: &[u8]) -> BTreeMap<String, Vec<u8>> {
    let mut archive = ZipArchive::new(Cursor::new(data)).unwrap();
    let mut out = BTreeMap::new();
    for i in 0..archive.len() {
        let mut file = archive.by_index(i).unwrap();
        let mut buf = Vec::new();
        file.read_to_end(&mut buf).unwrap();
        out.insert(file.name().to_string(), buf);
    }
    out
}

/// Compressed entry bytes and method by name.
pub fn read_zip_raw(data: &[u8]) -> BTreeMap<String, (CompressionMethod, Vec<u8>)> {
    let mut archive = ZipArchive::new(Cursor::new(data)).unwrap();
    let mut out = BTreeMap::new();
    for i in 0..archive.len() {
        let mut file = archive.by_index_raw(i).unwrap();
        let mut buf = Vec::new();
        file.read_to_end(&mut buf).unwrap();
        out.insert(file.name().to_string(), (file.compression(), buf));
    }
    out
}

/// Entry names in archive order.
pub fn zip_names(data: &[u8]) -> Vec<String> {
    let mut archive = ZipArchive::new(Cursor::new(data)).unwrap();
    (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect()
}
