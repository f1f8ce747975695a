//! Minimal owned XML element tree with path queries over local names.
//!
//! The classifier and the tolerant parser both need to look at documents
//! that may be namespaced arbitrarily (`p:`, `ns2:`, none) or slightly
//! broken, so names are stored without prefixes and the builder can run in
//! a recovering mode.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::core::ImportError;

/// How strictly [`parse_tree`] treats structural errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    /// Mismatched or missing end tags, bad escapes and trailing roots fail.
    Strict,
    /// Unmatched end tags are ignored, open elements are closed at end of
    /// input, undecodable escapes are kept verbatim.
    Recover,
}

/// One element: local name, attributes, concatenated text, children.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<XmlElement>,
}

/// Deepest element nesting accepted. FatturaPA documents stay well under
/// twenty levels; anything past this is rejected in both modes.
pub const MAX_DEPTH: usize = 256;

/// Parse `xml` into its root element.
pub fn parse_tree(xml: &str, mode: ParseMode) -> Result<XmlElement, ImportError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    reader.config_mut().check_end_names = mode == ParseMode::Strict;

    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                if root.is_some() && stack.is_empty() {
                    if mode == ParseMode::Strict {
                        return Err(ImportError::Parse(
                            "content after the root element".into(),
                        ));
                    }
                    break;
                }
                check_depth(stack.len())?;
                stack.push(element_from(e, mode)?);
            }
            Ok(Event::Empty(ref e)) => {
                if root.is_some() && stack.is_empty() {
                    if mode == ParseMode::Strict {
                        return Err(ImportError::Parse(
                            "content after the root element".into(),
                        ));
                    }
                    break;
                }
                check_depth(stack.len())?;
                let element = element_from(e, mode)?;
                attach(&mut stack, &mut root, element);
            }
            Ok(Event::Text(ref e)) => {
                let text = match e.unescape() {
                    Ok(t) => t.into_owned(),
                    Err(err) if mode == ParseMode::Strict => {
                        return Err(ImportError::Parse(format!("XML parse error: {err}")));
                    }
                    Err(_) => String::from_utf8_lossy(e).into_owned(),
                };
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&text);
                }
            }
            Ok(Event::CData(ref e)) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(e));
                }
            }
            Ok(Event::End(ref e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                // Strict mode has already verified the name via the reader.
                match stack.iter().rposition(|el| el.name == name) {
                    Some(pos) => {
                        while stack.len() > pos {
                            if let Some(done) = stack.pop() {
                                attach(&mut stack, &mut root, done);
                            }
                        }
                    }
                    None if mode == ParseMode::Strict => {
                        return Err(ImportError::Parse(format!(
                            "unexpected closing tag </{name}>"
                        )));
                    }
                    None => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                if mode == ParseMode::Strict {
                    return Err(ImportError::Parse(format!(
                        "XML parse error at byte {}: {e}",
                        reader.error_position()
                    )));
                }
                break;
            }
            _ => {}
        }
    }

    if !stack.is_empty() {
        if mode == ParseMode::Strict {
            return Err(ImportError::Parse(format!(
                "unexpected end of document inside <{}>",
                stack.last().map(|e| e.name.as_str()).unwrap_or_default()
            )));
        }
        while let Some(open) = stack.pop() {
            attach(&mut stack, &mut root, open);
        }
    }

    root.ok_or_else(|| ImportError::Parse("no root element".into()))
}

fn check_depth(open: usize) -> Result<(), ImportError> {
    if open >= MAX_DEPTH {
        return Err(ImportError::Parse(format!(
            "nesting deeper than {MAX_DEPTH} levels"
        )));
    }
    Ok(())
}

fn element_from(e: &BytesStart<'_>, mode: ParseMode) -> Result<XmlElement, ImportError> {
    let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
    let mut attributes = Vec::new();
    for attr in e.attributes().with_checks(mode == ParseMode::Strict) {
        let attr = match attr {
            Ok(a) => a,
            Err(err) if mode == ParseMode::Strict => {
                return Err(ImportError::Parse(format!("bad attribute on <{name}>: {err}")));
            }
            Err(_) => continue,
        };
        if attr.key.as_ref().starts_with(b"xmlns") {
            continue;
        }
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = match attr.unescape_value() {
            Ok(v) => v.into_owned(),
            Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
        };
        attributes.push((key, value));
    }
    Ok(XmlElement {
        name,
        attributes,
        ..Default::default()
    })
}

fn attach(stack: &mut [XmlElement], root: &mut Option<XmlElement>, element: XmlElement) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => {
            if root.is_none() {
                *root = Some(element);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Child,
    Descendant,
}

/// Split a query like `//DatiGeneraliDocumento/Numero` into steps.
fn steps(path: &str) -> Vec<(Axis, &str)> {
    let mut out = Vec::new();
    let mut rest = path.trim();
    if rest.starts_with(".//") {
        rest = &rest[1..];
    } else if let Some(stripped) = rest.strip_prefix("./") {
        rest = stripped;
    }
    while !rest.is_empty() {
        let axis = if let Some(r) = rest.strip_prefix("//") {
            rest = r;
            Axis::Descendant
        } else if let Some(r) = rest.strip_prefix('/') {
            rest = r;
            Axis::Child
        } else {
            Axis::Child
        };
        let end = rest.find('/').unwrap_or(rest.len());
        let name = &rest[..end];
        if !name.is_empty() && name != "." {
            out.push((axis, name));
        }
        rest = &rest[end..];
    }
    out
}

impl XmlElement {
    /// Attribute value by local name.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Trimmed text content, `None` when empty.
    pub fn text(&self) -> Option<&str> {
        let t = self.text.trim();
        if t.is_empty() { None } else { Some(t) }
    }

    /// First direct child with the given local name.
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == name)
    }

    /// All direct children with the given local name.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// All descendants (not including `self`) with the given local name, in
    /// document order.
    pub fn descendants(&self, name: &str) -> Vec<&XmlElement> {
        let mut out = Vec::new();
        self.collect_descendants(name, &mut out);
        out
    }

    fn collect_descendants<'a>(&'a self, name: &str, out: &mut Vec<&'a XmlElement>) {
        for child in &self.children {
            if name == "*" || child.name == name {
                out.push(child);
            }
            child.collect_descendants(name, out);
        }
    }

    /// Evaluate a path of local names: `A/B` walks children, `//A` any
    /// descendant, `*` matches every name. Relative to `self`.
    pub fn select(&self, path: &str) -> Vec<&XmlElement> {
        let mut current: Vec<&XmlElement> = vec![self];
        for (axis, name) in steps(path) {
            let mut next: Vec<&XmlElement> = Vec::new();
            for node in &current {
                let found = match axis {
                    Axis::Child => node
                        .children
                        .iter()
                        .filter(|c| name == "*" || c.name == name)
                        .collect(),
                    Axis::Descendant => node.descendants(name),
                };
                for f in found {
                    if !next.iter().any(|n| std::ptr::eq(*n, f)) {
                        next.push(f);
                    }
                }
            }
            current = next;
        }
        current
    }

    /// First match of [`select`](Self::select).
    pub fn first(&self, path: &str) -> Option<&XmlElement> {
        self.select(path).into_iter().next()
    }

    /// Trimmed text of the first match that has any.
    pub fn text_at(&self, path: &str) -> Option<&str> {
        self.select(path).into_iter().find_map(|e| e.text())
    }

    /// Owned [`text_at`](Self::text_at).
    pub fn string_at(&self, path: &str) -> Option<String> {
        self.text_at(path).map(str::to_string)
    }
}
