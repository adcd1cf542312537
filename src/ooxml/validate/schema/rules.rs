//! Bundled schema rule sets and the per-part conformance check.
//!
//! A rule set is a YAML document describing one document family: the
//! namespaces it owns, the allowed root elements and, per element, the allowed
//! children, the required attributes and the attribute value types. Names in
//! the rule set use the rule set's own prefixes; documents are matched by
//! namespace URI, so the prefixes a producer chose do not matter.

use crate::common::xml::scan::split_qname;
use crate::ooxml::opc::constants::namespace as ns;
use crate::ooxml::opc::packuri::CONTENT_TYPES_MEMBER;
use once_cell::sync::Lazy;
use phf::phf_set;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, HashSet};

const PML_RULES: &str = include_str!("../../../../schemas/pml.yaml");
const RELATIONSHIP_RULES: &str = include_str!("../../../../schemas/opc-relationships.yaml");
const CONTENT_TYPE_RULES: &str = include_str!("../../../../schemas/opc-content-types.yaml");
const DOCPROPS_RULES: &str = include_str!("../../../../schemas/docprops.yaml");

/// Loaded once, read concurrently.
pub static SCHEMA_SET: Lazy<SchemaSet> =
    Lazy::new(|| SchemaSet::bundled().expect("bundled schema rule sets are valid"));

/// Namespaces of the published standard. Markup in any other namespace is a
/// vendor extension and is not checked.
static OOXML_NAMESPACES: phf::Set<&'static str> = phf_set! {
    "http://schemas.openxmlformats.org/officeDocument/2006/math",
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships",
    "http://schemas.openxmlformats.org/schemaLibrary/2006/main",
    "http://schemas.openxmlformats.org/drawingml/2006/main",
    "http://schemas.openxmlformats.org/drawingml/2006/chart",
    "http://schemas.openxmlformats.org/drawingml/2006/chartDrawing",
    "http://schemas.openxmlformats.org/drawingml/2006/diagram",
    "http://schemas.openxmlformats.org/drawingml/2006/picture",
    "http://schemas.openxmlformats.org/drawingml/2006/spreadsheetDrawing",
    "http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing",
    "http://schemas.openxmlformats.org/wordprocessingml/2006/main",
    "http://schemas.openxmlformats.org/presentationml/2006/main",
    "http://schemas.openxmlformats.org/spreadsheetml/2006/main",
    "http://schemas.openxmlformats.org/officeDocument/2006/sharedTypes",
    "http://schemas.openxmlformats.org/package/2006/relationships",
    "http://schemas.openxmlformats.org/package/2006/content-types",
    "http://www.w3.org/XML/1998/namespace",
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AttributeType {
    Boolean,
    Int,
    Uint,
    Enum,
    /// A relationship id reference. Empty values are allowed.
    RelId,
    String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AttributeRule {
    #[serde(rename = "type")]
    pub kind: AttributeType,
    #[serde(default)]
    pub min: Option<i64>,
    #[serde(default)]
    pub max: Option<i64>,
    #[serde(default)]
    pub values: Vec<String>,
}

impl AttributeRule {
    /// Describe why `value` does not conform, if it does not.
    pub fn violation(&self, value: &str) -> Option<String> {
        match self.kind {
            AttributeType::String => None,
            AttributeType::Boolean => (!matches!(value, "true" | "false" | "1" | "0"))
                .then(|| format!("'{}' is not a boolean", value)),
            AttributeType::Int | AttributeType::Uint => {
                let parsed = atoi_simd::parse::<i64, false, false>(value.trim().as_bytes())
                    .ok()
                    .filter(|n| self.kind == AttributeType::Int || *n >= 0);
                match parsed {
                    None if self.kind == AttributeType::Uint => {
                        Some(format!("'{}' is not an unsigned integer", value))
                    },
                    None => Some(format!("'{}' is not an integer", value)),
                    Some(n) => match (self.min, self.max) {
                        (Some(min), _) if n < min => {
                            Some(format!("{} is below the minimum {}", n, min))
                        },
                        (_, Some(max)) if n > max => {
                            Some(format!("{} is above the maximum {}", n, max))
                        },
                        _ => None,
                    },
                }
            },
            AttributeType::Enum => (!self.values.iter().any(|v| v == value))
                .then(|| format!("'{}' is not one of {}", value, self.values.join(", "))),
            AttributeType::RelId => {
                (!is_rel_id(value)).then(|| format!("'{}' is not a relationship id", value))
            },
        }
    }
}

fn is_rel_id(value: &str) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        None => true,
        Some(first) => {
            (first.is_alphabetic() || first == '_')
                && chars.all(|c| !c.is_whitespace() && c != ':')
        },
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ElementRule {
    /// Allowed children in the family's namespaces; `None` leaves them open.
    #[serde(default)]
    pub children: Option<Vec<String>>,
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default)]
    pub attributes: HashMap<String, AttributeRule>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleSet {
    pub family: String,
    pub version: String,
    /// Prefix to namespace URI.
    pub namespaces: BTreeMap<String, String>,
    pub roots: Vec<String>,
    #[serde(default)]
    pub elements: HashMap<String, ElementRule>,
    #[serde(skip)]
    prefixes: HashMap<String, String>,
}

/// One schema violation inside a part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Rule identifier such as `unexpected-child` or `invalid-value`.
    pub rule: &'static str,
    /// Element path with sibling indices.
    pub path: String,
    pub detail: String,
    pub message: String,
}

impl Violation {
    /// Identity used for baseline comparison. Sibling indices are left out so
    /// that inserting an element does not turn every later finding into a
    /// new one.
    pub fn key(&self) -> (&'static str, String, &str) {
        (self.rule, strip_indices(&self.path), &self.detail)
    }
}

struct Frame<'r> {
    rule: Option<&'r ElementRule>,
    skip: bool,
    declared: usize,
}

impl RuleSet {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, String> {
        let mut set: RuleSet = serde_saphyr::from_str(yaml).map_err(|e| e.to_string())?;
        set.prefixes = set
            .namespaces
            .iter()
            .map(|(prefix, uri)| (uri.clone(), prefix.clone()))
            .collect();
        set.verify()?;
        Ok(set)
    }

    /// Every name in the rule set uses a declared prefix.
    fn verify(&self) -> Result<(), String> {
        let declared = |name: &str| match name.split_once(':') {
            Some((prefix, _)) => self.namespaces.contains_key(prefix),
            None => false,
        };
        let element_names = self
            .roots
            .iter()
            .chain(self.elements.keys())
            .chain(self.elements.values().flat_map(|rule| rule.children.iter().flatten()));
        for name in element_names {
            if !declared(name) {
                return Err(format!("{}: element {} has no declared prefix", self.family, name));
            }
        }
        Ok(())
    }

    fn prefix_for(&self, uri: &str) -> Option<&str> {
        self.prefixes.get(uri).map(String::as_str)
    }

    /// Check one XML document. A parse error ends the check with a
    /// `well-formed` violation.
    pub fn check(&self, xml: &str) -> Vec<Violation> {
        let mut reader = Reader::from_str(xml);
        let mut scopes: Vec<(String, String)> = Vec::new();
        let mut frames: Vec<Frame<'_>> = Vec::new();
        let mut path = ElementPath::default();
        let mut out = Vec::new();

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    let frame = self.enter(&e, &mut scopes, frames.last(), &mut path, &mut out);
                    frames.push(frame);
                },
                Ok(Event::Empty(e)) => {
                    let frame = self.enter(&e, &mut scopes, frames.last(), &mut path, &mut out);
                    leave(frame, &mut scopes, &mut path);
                },
                Ok(Event::End(_)) => {
                    if let Some(frame) = frames.pop() {
                        leave(frame, &mut scopes, &mut path);
                    }
                },
                Ok(Event::Eof) => break,
                Err(e) => {
                    out.push(Violation {
                        rule: "well-formed",
                        path: path.current(),
                        detail: String::new(),
                        message: e.to_string(),
                    });
                    break;
                },
                _ => {},
            }
        }
        out
    }

    fn enter<'r>(
        &'r self,
        e: &BytesStart<'_>,
        scopes: &mut Vec<(String, String)>,
        parent: Option<&Frame<'r>>,
        path: &mut ElementPath,
        out: &mut Vec<Violation>,
    ) -> Frame<'r> {
        let declared = declare_namespaces(e, scopes);
        let qname = e.name();
        let raw = String::from_utf8_lossy(qname.as_ref());
        let (prefix, local) = split_qname(qname.as_ref());

        let uri = if parent.is_some_and(|p| p.skip) {
            None
        } else {
            lookup(scopes, prefix.unwrap_or(b""))
        };
        let Some(uri) = uri.filter(|u| self.prefixes.contains_key(*u) || OOXML_NAMESPACES.contains(*u))
        else {
            path.enter(&raw);
            return Frame {
                rule: None,
                skip: true,
                declared,
            };
        };

        let Some(name) = self
            .prefix_for(uri)
            .map(|p| format!("{}:{}", p, String::from_utf8_lossy(local)))
        else {
            path.enter(&raw);
            return Frame {
                rule: None,
                skip: false,
                declared,
            };
        };
        path.enter(&name);

        match parent {
            None if !self.roots.contains(&name) => out.push(Violation {
                rule: "unexpected-root",
                path: path.current(),
                detail: name.clone(),
                message: format!("{} is not a root element of {}", name, self.family),
            }),
            Some(parent) => {
                if let Some(children) = parent.rule.and_then(|r| r.children.as_ref())
                    && !children.contains(&name)
                {
                    out.push(Violation {
                        rule: "unexpected-child",
                        path: path.current(),
                        detail: name.clone(),
                        message: format!("{} is not allowed here", name),
                    });
                }
            },
            None => {},
        }

        let rule = self.elements.get(&name);
        if let Some(rule) = rule {
            self.check_attributes(e, rule, scopes, path, out);
        }
        Frame {
            rule,
            skip: false,
            declared,
        }
    }

    fn check_attributes(
        &self,
        e: &BytesStart<'_>,
        rule: &ElementRule,
        scopes: &[(String, String)],
        path: &ElementPath,
        out: &mut Vec<Violation>,
    ) {
        let mut present: HashSet<String> = HashSet::new();
        for attr in e.attributes().flatten() {
            let (prefix, local) = split_qname(attr.key.as_ref());
            let name = match prefix {
                None if local == b"xmlns" => continue,
                None => String::from_utf8_lossy(local).into_owned(),
                Some(b"xmlns") | Some(b"xml") => continue,
                Some(prefix) => {
                    let Some(family_prefix) =
                        lookup(scopes, prefix).and_then(|uri| self.prefix_for(uri))
                    else {
                        continue;
                    };
                    format!("{}:{}", family_prefix, String::from_utf8_lossy(local))
                },
            };

            if let Some(attr_rule) = rule.attributes.get(&name)
                && let Ok(value) = attr.unescape_value()
                && !value.contains("{{")
                && let Some(problem) = attr_rule.violation(&value)
            {
                out.push(Violation {
                    rule: "invalid-value",
                    path: path.current(),
                    detail: format!("{}={}", name, value),
                    message: format!("{}: {}", name, problem),
                });
            }
            present.insert(name);
        }

        for required in rule.required.iter().filter(|r| !present.contains(*r)) {
            out.push(Violation {
                rule: "missing-attribute",
                path: path.current(),
                detail: required.clone(),
                message: format!("required attribute {} is missing", required),
            });
        }
    }
}

fn declare_namespaces(e: &BytesStart<'_>, scopes: &mut Vec<(String, String)>) -> usize {
    let before = scopes.len();
    for attr in e.attributes().flatten() {
        let key = attr.key.as_ref();
        let prefix: &[u8] = if key == b"xmlns" {
            b""
        } else if let Some(prefix) = key.strip_prefix(b"xmlns:") {
            prefix
        } else {
            continue;
        };
        let uri = attr
            .unescape_value()
            .map(|v| v.into_owned())
            .unwrap_or_default();
        scopes.push((String::from_utf8_lossy(prefix).into_owned(), uri));
    }
    scopes.len() - before
}

fn lookup<'s>(scopes: &'s [(String, String)], prefix: &[u8]) -> Option<&'s str> {
    if prefix == b"xml" {
        return Some(ns::XML);
    }
    scopes
        .iter()
        .rev()
        .find(|(declared, _)| declared.as_bytes() == prefix)
        .map(|(_, uri)| uri.as_str())
        .filter(|uri| !uri.is_empty())
}

fn leave(frame: Frame<'_>, scopes: &mut Vec<(String, String)>, path: &mut ElementPath) {
    scopes.truncate(scopes.len() - frame.declared);
    path.leave();
}

/// The bundled rule sets.
#[derive(Debug)]
pub struct SchemaSet {
    pub pml: RuleSet,
    pub relationships: RuleSet,
    pub content_types: RuleSet,
    pub docprops: RuleSet,
}

impl SchemaSet {
    pub fn bundled() -> Result<Self, String> {
        Ok(Self {
            pml: RuleSet::from_yaml_str(PML_RULES)?,
            relationships: RuleSet::from_yaml_str(RELATIONSHIP_RULES)?,
            content_types: RuleSet::from_yaml_str(CONTENT_TYPE_RULES)?,
            docprops: RuleSet::from_yaml_str(DOCPROPS_RULES)?,
        })
    }

    /// Rule set governing `member`, if any.
    pub fn for_member(&self, member: &str) -> Option<&RuleSet> {
        if member == CONTENT_TYPES_MEMBER {
            Some(&self.content_types)
        } else if member.ends_with(".rels") {
            Some(&self.relationships)
        } else if !member.ends_with(".xml") {
            None
        } else if member.starts_with("ppt/") {
            Some(&self.pml)
        } else if member.starts_with("docProps/") {
            Some(&self.docprops)
        } else {
            None
        }
    }
}

/// Element path with 1-based sibling indices, e.g. `/p:sld/p:cSld[1]/p:spTree[1]/p:sp[2]`.
#[derive(Debug, Default)]
pub(crate) struct ElementPath {
    segments: Vec<String>,
    siblings: Vec<HashMap<String, usize>>,
}

impl ElementPath {
    pub(crate) fn enter(&mut self, name: &str) {
        let segment = match self.siblings.last_mut() {
            Some(counts) => {
                let n = counts.entry(name.to_string()).or_insert(0);
                *n += 1;
                format!("{}[{}]", name, n)
            },
            None => name.to_string(),
        };
        self.segments.push(segment);
        self.siblings.push(HashMap::new());
    }

    pub(crate) fn leave(&mut self) {
        self.segments.pop();
        self.siblings.pop();
    }

    pub(crate) fn depth(&self) -> usize {
        self.segments.len()
    }

    pub(crate) fn current(&self) -> String {
        let mut path = String::new();
        for segment in &self.segments {
            path.push('/');
            path.push_str(segment);
        }
        path
    }
}

pub(crate) fn strip_indices(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut in_index = false;
    for c in path.chars() {
        match c {
            '[' => in_index = true,
            ']' => in_index = false,
            _ if !in_index => out.push(c),
            _ => {},
        }
    }
    out
}
