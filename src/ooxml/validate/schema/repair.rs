//! Whitespace repair of text runs.
//!
//! Consumers strip leading and trailing whitespace from text elements unless
//! the element carries `xml:space="preserve"`. The repair splices that
//! attribute into the start tag and leaves every other byte of the part alone.

use crate::ooxml::validate::schema::rules::ElementPath;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

const PRESERVE: &str = " xml:space=\"preserve\"";

struct OpenText {
    /// Offset of the `>` closing the start tag.
    insert_at: usize,
    depth: usize,
    content: String,
    nested: bool,
    path: String,
}

fn has_xml_space(e: &BytesStart<'_>) -> bool {
    e.attributes()
        .flatten()
        .any(|a| a.key.as_ref() == b"xml:space")
}

/// Add `xml:space="preserve"` to every `t` element whose text starts or ends
/// with a space or tab and that has no `xml:space` attribute.
///
/// Returns the repaired document and the path of each repaired element, or
/// `None` when nothing needs repair or the document does not parse.
pub fn preserve_whitespace(xml: &str) -> Option<(String, Vec<String>)> {
    let mut reader = Reader::from_str(xml);
    let mut path = ElementPath::default();
    let mut open: Option<OpenText> = None;
    let mut repairs: Vec<(usize, String)> = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                path.enter(&String::from_utf8_lossy(e.name().as_ref()));
                match open.as_mut() {
                    Some(text) => text.nested = true,
                    None if e.local_name().as_ref() == b"t" && !has_xml_space(&e) => {
                        let end = reader.buffer_position() as usize;
                        open = Some(OpenText {
                            insert_at: end - 1,
                            depth: path.depth(),
                            content: String::new(),
                            nested: false,
                            path: path.current(),
                        });
                    },
                    None => {},
                }
            },
            Ok(Event::Empty(e)) => {
                path.enter(&String::from_utf8_lossy(e.name().as_ref()));
                if let Some(text) = open.as_mut() {
                    text.nested = true;
                }
                path.leave();
            },
            Ok(Event::Text(t)) => {
                if let Some(text) = open.as_mut() {
                    text.content.push_str(&String::from_utf8_lossy(&t));
                }
            },
            Ok(Event::CData(t)) => {
                if let Some(text) = open.as_mut() {
                    text.content.push_str(&String::from_utf8_lossy(&t));
                }
            },
            Ok(Event::GeneralRef(_)) => {
                // An entity or character reference is content, not whitespace.
                if let Some(text) = open.as_mut() {
                    text.content.push('&');
                }
            },
            Ok(Event::End(_)) => {
                if let Some(text) = open.take_if(|t| t.depth == path.depth()) {
                    let padded = |c: char| c == ' ' || c == '\t';
                    if !text.nested
                        && (text.content.starts_with(padded) || text.content.ends_with(padded))
                    {
                        repairs.push((text.insert_at, text.path));
                    }
                }
                path.leave();
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                tracing::debug!(error = %e, "skipping whitespace repair of unparsable part");
                return None;
            },
            _ => {},
        }
    }

    if repairs.is_empty() {
        return None;
    }

    let mut repaired = String::with_capacity(xml.len() + repairs.len() * PRESERVE.len());
    let mut copied = 0;
    let mut paths = Vec::with_capacity(repairs.len());
    for (at, path) in repairs {
        repaired.push_str(&xml[copied..at]);
        repaired.push_str(PRESERVE);
        copied = at;
        paths.push(path);
    }
    repaired.push_str(&xml[copied..]);
    Some((repaired, paths))
}
