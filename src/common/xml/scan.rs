//! Lightweight element scanning over raw XML bytes.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

/// Split a qualified name into `(prefix, local)`.
#[inline]
pub fn split_qname(qname: &[u8]) -> (Option<&[u8]>, &[u8]) {
    match memchr::memchr(b':', qname) {
        Some(pos) => (Some(&qname[..pos]), &qname[pos + 1..]),
        None => (None, qname),
    }
}

/// Read an attribute by its exact (possibly prefixed) name.
pub fn attr_value(e: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == name)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

/// Read the first prefixed attribute whose local part is `local`.
///
/// Used for `r:id` style attributes where the prefix is chosen by the writer.
pub fn prefixed_attr_value(e: &BytesStart<'_>, local: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| {
            let (prefix, name) = split_qname(a.key.as_ref());
            prefix.is_some_and(|p| p != b"xmlns") && name == local
        })
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

/// Visit every element start tag in document order together with its depth
/// (the root element has depth 0).
pub fn for_each_start<F>(xml: &[u8], mut visit: F) -> Result<(), String>
where
    F: FnMut(&BytesStart<'_>, usize),
{
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut depth = 0usize;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                visit(e, depth);
                depth += 1;
            },
            Ok(Event::Empty(ref e)) => visit(e, depth),
            Ok(Event::End(_)) => depth = depth.saturating_sub(1),
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(format!(
                    "error at byte {}: {}",
                    reader.buffer_position(),
                    e
                ));
            },
            _ => {},
        }
        buf.clear();
    }

    Ok(())
}
