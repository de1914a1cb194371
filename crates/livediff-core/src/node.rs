//! Generic element tree produced from a decompressed session document.
//!
//! The session format is plain XML where scalar leaves carry their payload
//! in a `Value` attribute. Everything above this module talks to the tree
//! through [`DocumentNode::find`] / [`DocumentNode::find_all`] and a small
//! ElementTree-style path language (`.//Name/EffectiveName`).

use std::collections::{BTreeMap, HashSet};

use quick_xml::{Reader, events::BytesStart, events::Event};

use crate::error::FormatError;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DocumentNode {
    pub tag: String,
    pub attributes: BTreeMap<String, String>,
    pub text: Option<String>,
    pub children: Vec<DocumentNode>,
}

impl DocumentNode {
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_child(mut self, child: DocumentNode) -> Self {
        self.children.push(child);
        self
    }

    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// The `Value` attribute carried by scalar leaves.
    #[must_use]
    pub fn value(&self) -> Option<&str> {
        self.attr("Value")
    }

    /// Pre-order walk over every node below `self`, excluding `self`.
    #[must_use]
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants {
            stack: self.children.iter().rev().collect(),
        }
    }

    /// Descendants tagged `tag` that do not sit inside another `tag` element.
    #[must_use]
    pub fn outermost(&self, tag: &str) -> Vec<&DocumentNode> {
        let mut found = Vec::new();
        let mut stack: Vec<&DocumentNode> = self.children.iter().rev().collect();
        while let Some(node) = stack.pop() {
            if node.tag == tag {
                found.push(node);
                continue;
            }
            stack.extend(node.children.iter().rev());
        }
        found
    }

    #[must_use]
    pub fn find(&self, path: &str) -> Option<&DocumentNode> {
        NodePath::parse(path).select(self).into_iter().next()
    }

    #[must_use]
    pub fn find_all(&self, path: &str) -> Vec<&DocumentNode> {
        NodePath::parse(path).select(self)
    }

    /// Shorthand for `find(path)` followed by reading its `Value` attribute.
    #[must_use]
    pub fn find_value(&self, path: &str) -> Option<&str> {
        self.find(path).and_then(DocumentNode::value)
    }
}

pub struct Descendants<'a> {
    stack: Vec<&'a DocumentNode>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a DocumentNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Child,
    Descendant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Step {
    axis: Axis,
    tag: String,
}

impl Step {
    fn matches(&self, node: &DocumentNode) -> bool {
        self.tag == "*" || node.tag == self.tag
    }
}

/// Parsed form of a path such as `.//MasterTrack//Tempo/Manual`.
///
/// `/` selects children, `//` selects descendants at any depth. A leading
/// `.` is accepted and ignored; `*` matches any tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodePath {
    steps: Vec<Step>,
}

impl NodePath {
    #[must_use]
    pub fn parse(path: &str) -> Self {
        let mut rest = path.strip_prefix('.').unwrap_or(path);
        let mut steps = Vec::new();

        while !rest.is_empty() {
            let axis = if let Some(after) = rest.strip_prefix("//") {
                rest = after;
                Axis::Descendant
            } else if let Some(after) = rest.strip_prefix('/') {
                rest = after;
                Axis::Child
            } else {
                Axis::Child
            };

            let end = rest.find('/').unwrap_or(rest.len());
            let tag = &rest[..end];
            rest = &rest[end..];
            if !tag.is_empty() {
                steps.push(Step {
                    axis,
                    tag: tag.to_string(),
                });
            }
        }

        Self { steps }
    }

    #[must_use]
    pub fn select<'a>(&self, root: &'a DocumentNode) -> Vec<&'a DocumentNode> {
        let mut current = vec![root];
        for step in &self.steps {
            let mut seen = HashSet::new();
            let mut next = Vec::new();
            for node in current {
                let mut push = |candidate: &'a DocumentNode| {
                    if step.matches(candidate) && seen.insert(std::ptr::from_ref(candidate)) {
                        next.push(candidate);
                    }
                };
                match step.axis {
                    Axis::Child => node.children.iter().for_each(&mut push),
                    Axis::Descendant => node.descendants().for_each(&mut push),
                }
            }
            if next.is_empty() {
                return next;
            }
            current = next;
        }
        current
    }
}

/// Deepest element nesting [`parse_xml`] accepts. Live sets stay far below
/// this; the tree's derived `Drop`, `Clone` and `PartialEq` recurse per level.
pub const MAX_NESTING_DEPTH: usize = 1024;

/// Builds a [`DocumentNode`] tree from XML text.
pub fn parse_xml(xml: &str) -> Result<DocumentNode, FormatError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<DocumentNode> = Vec::new();
    let mut root: Option<DocumentNode> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|error| xml_error(&error, reader.buffer_position()))?;
        match event {
            Event::Eof => break,
            Event::Start(ref start) => {
                if let Some(done) = &root {
                    return Err(FormatError::TrailingContent(done.tag.clone()));
                }
                check_depth(stack.len() + 1, reader.buffer_position())?;
                stack.push(element_from(start, reader.buffer_position())?);
            }
            Event::Empty(ref start) => {
                if let Some(done) = &root {
                    return Err(FormatError::TrailingContent(done.tag.clone()));
                }
                check_depth(stack.len() + 1, reader.buffer_position())?;
                let node = element_from(start, reader.buffer_position())?;
                attach(&mut stack, &mut root, node);
            }
            Event::End(_) => {
                let Some(node) = stack.pop() else {
                    return Err(FormatError::Xml(format!(
                        "unmatched closing tag at byte {}",
                        reader.buffer_position()
                    )));
                };
                attach(&mut stack, &mut root, node);
            }
            Event::Text(text) => {
                let text = text
                    .unescape()
                    .map_err(|error| xml_error(&error, reader.buffer_position()))?;
                push_text(&mut stack, text.trim());
            }
            Event::CData(data) => {
                let data = String::from_utf8_lossy(&data.into_inner()).into_owned();
                push_text(&mut stack, data.trim());
            }
            Event::Decl(_) | Event::PI(_) | Event::Comment(_) | Event::DocType(_) => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(FormatError::Xml(format!(
            "unexpected end of document inside <{}>",
            open.tag
        )));
    }
    root.ok_or(FormatError::MissingRoot)
}

fn element_from(
    start: &BytesStart<'_>,
    position: impl std::fmt::Display,
) -> Result<DocumentNode, FormatError> {
    let mut node = DocumentNode::new(String::from_utf8_lossy(start.name().as_ref()));
    for attr in start.attributes() {
        let attr =
            attr.map_err(|error| FormatError::Xml(format!("{error} at byte {position}")))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|error| FormatError::Xml(format!("{error} at byte {position}")))?
            .into_owned();
        node.attributes.insert(key, value);
    }
    Ok(node)
}

fn check_depth(depth: usize, position: impl std::fmt::Display) -> Result<(), FormatError> {
    if depth > MAX_NESTING_DEPTH {
        return Err(FormatError::Xml(format!(
            "nesting too deep: more than {MAX_NESTING_DEPTH} levels at byte {position}"
        )));
    }
    Ok(())
}

fn attach(stack: &mut [DocumentNode], root: &mut Option<DocumentNode>, node: DocumentNode) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => *root = Some(node),
    }
}

fn push_text(stack: &mut [DocumentNode], text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(node) = stack.last_mut() {
        match &mut node.text {
            Some(existing) => existing.push_str(text),
            None => node.text = Some(text.to_string()),
        }
    }
}

fn xml_error(error: &quick_xml::Error, position: impl std::fmt::Display) -> FormatError {
    FormatError::Xml(format!("{error} at byte {position}"))
}
