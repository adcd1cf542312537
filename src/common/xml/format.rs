//! Whitespace-only reformatting of XML parts.
//!
//! Both directions work on the raw byte spans of the source events, so
//! attribute quoting, entity references and namespace declarations survive
//! untouched. Only blank text nodes between markup are added or removed.
//! Text inside text-run elements (`a:t`, `w:t`, ...) and any element that
//! carries `xml:space="preserve"` is never altered.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use thiserror::Error;

const BOM: &str = "\u{FEFF}";

#[derive(Debug, Error)]
#[error("XML formatting failed at byte {position}: {message}")]
pub struct FormatError {
    pub position: u64,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind {
    Decl,
    Start { preserve: bool },
    End,
    Empty,
    Text { blank: bool },
    Comment,
    Other,
}

#[derive(Debug, Clone, Copy)]
struct Token<'a> {
    kind: TokenKind,
    raw: &'a str,
}

/// Whether whitespace inside this element is significant.
fn preserves_space(e: &BytesStart<'_>) -> bool {
    if e.local_name().as_ref() == b"t" {
        return true;
    }
    e.attributes()
        .flatten()
        .any(|a| a.key.as_ref() == b"xml:space" && a.value.as_ref() == b"preserve")
}

fn tokenize(xml: &str) -> Result<Vec<Token<'_>>, FormatError> {
    let mut reader = Reader::from_str(xml);
    let mut tokens = Vec::new();
    let mut depth = 0usize;
    let mut seen_root = false;

    loop {
        let start = reader.buffer_position() as usize;
        let event = reader.read_event().map_err(|e| FormatError {
            position: reader.buffer_position() as u64,
            message: e.to_string(),
        })?;
        let end = reader.buffer_position() as usize;

        let kind = match event {
            Event::Decl(_) => TokenKind::Decl,
            Event::Start(ref e) => {
                depth += 1;
                seen_root = true;
                TokenKind::Start {
                    preserve: preserves_space(e),
                }
            },
            Event::End(_) => {
                depth = depth.checked_sub(1).ok_or_else(|| FormatError {
                    position: start as u64,
                    message: "unbalanced end tag".to_string(),
                })?;
                TokenKind::End
            },
            Event::Empty(_) => {
                seen_root = true;
                TokenKind::Empty
            },
            Event::Text(ref t) => TokenKind::Text {
                blank: t.iter().all(u8::is_ascii_whitespace),
            },
            Event::Comment(_) => TokenKind::Comment,
            Event::PI(_) | Event::DocType(_) => TokenKind::Other,
            Event::Eof => break,
            // CDATA sections and entity references are inline character data.
            _ => TokenKind::Text { blank: false },
        };

        tokens.push(Token {
            kind,
            raw: &xml[start..end],
        });
    }

    if depth != 0 {
        return Err(FormatError {
            position: xml.len() as u64,
            message: format!("{depth} element(s) left open"),
        });
    }
    if !seen_root {
        return Err(FormatError {
            position: 0,
            message: "document has no root element".to_string(),
        });
    }

    Ok(tokens)
}

/// Whether the blank text node at `i` is layout between two pieces of markup.
///
/// Next to character data (text, CDATA or an entity reference) it is content,
/// and so is a blank node that is the only child of its element.
fn is_layout(tokens: &[Token<'_>], i: usize) -> bool {
    let prev = i.checked_sub(1).map(|p| tokens[p].kind);
    let next = tokens.get(i + 1).map(|t| t.kind);
    let is_text = |kind: Option<TokenKind>| matches!(kind, Some(TokenKind::Text { .. }));
    let sole_child = matches!(prev, Some(TokenKind::Start { .. })) && matches!(next, Some(TokenKind::End));
    !is_text(prev) && !is_text(next) && !sole_child
}

fn split_bom(xml: &str) -> (&str, &str) {
    match xml.strip_prefix(BOM) {
        Some(rest) => (BOM, rest),
        None => ("", xml),
    }
}

fn push_indent(out: &mut String, width: usize, depth: usize) {
    out.push('\n');
    for _ in 0..width * depth {
        out.push(' ');
    }
}

/// Remove layout whitespace and comments, producing the on-disk form.
///
/// The XML declaration is followed by a CRLF, matching what Office writes.
pub fn condense(xml: &str) -> Result<String, FormatError> {
    let (bom, body) = split_bom(xml);
    let tokens = tokenize(body)?;
    let mut out = String::with_capacity(body.len());
    out.push_str(bom);

    let mut preserve = 0usize;
    for (i, token) in tokens.iter().enumerate() {
        match token.kind {
            TokenKind::Decl => {
                out.push_str(token.raw);
                out.push_str("\r\n");
            },
            TokenKind::Start { preserve: p } => {
                if preserve > 0 || p {
                    preserve += 1;
                }
                out.push_str(token.raw);
            },
            TokenKind::End => {
                preserve = preserve.saturating_sub(1);
                out.push_str(token.raw);
            },
            TokenKind::Text { blank: true } if preserve == 0 && is_layout(&tokens, i) => {},
            TokenKind::Comment if preserve == 0 => {},
            _ => out.push_str(token.raw),
        }
    }

    Ok(out)
}

/// Pretty-print with `width` spaces per nesting level.
///
/// `condense(indent(x))` equals `condense(x)` for every well-formed `x`.
pub fn indent(xml: &str, width: usize) -> Result<String, FormatError> {
    let (bom, body) = split_bom(xml);
    let tokens = tokenize(body)?;
    let mut out = String::with_capacity(body.len() + body.len() / 4);
    out.push_str(bom);

    let mut depth = 0usize;
    let mut preserve = 0usize;
    let mut prev: Option<TokenKind> = None;

    for (i, token) in tokens.iter().enumerate() {
        match token.kind {
            TokenKind::Text { blank } => {
                if blank && preserve == 0 && is_layout(&tokens, i) {
                    continue;
                }
                out.push_str(token.raw);
            },
            TokenKind::End => {
                depth = depth.saturating_sub(1);
                if preserve > 0 {
                    preserve -= 1;
                } else if matches!(
                    prev,
                    Some(TokenKind::End | TokenKind::Empty | TokenKind::Comment | TokenKind::Other)
                ) {
                    push_indent(&mut out, width, depth);
                }
                out.push_str(token.raw);
            },
            kind => {
                let breaks = !matches!(prev, None | Some(TokenKind::Text { .. }));
                if preserve == 0 && breaks {
                    push_indent(&mut out, width, depth);
                }
                out.push_str(token.raw);
                if let TokenKind::Start { preserve: p } = kind {
                    depth += 1;
                    if preserve > 0 || p {
                        preserve += 1;
                    }
                }
            },
        }
        prev = Some(token.kind);
    }

    Ok(out)
}
