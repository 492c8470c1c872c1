//! Minimal XML element tree for KML traversal.
//!
//! Built from `quick-xml` events. Only element names and text survive;
//! attributes, comments, and processing instructions are discarded. End
//! tags must match their start tags, and a document with no element or
//! with unclosed elements is rejected, so callers can tell well-formed
//! markup apart from text that only looks like KML.

use std::borrow::Cow;

use quick_xml::Reader;
use quick_xml::events::Event;
use thiserror::Error;

/// Why a document could not be read as XML.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarkupError {
    /// The tokenizer rejected the input.
    #[error("XML syntax error at byte {position}: {message}")]
    Syntax {
        /// Byte offset reported by the reader.
        position: u64,
        /// Reader error text.
        message: String,
    },

    /// The input ended with open elements.
    #[error("Unclosed element <{name}>")]
    Unclosed {
        /// Innermost open element.
        name: String,
    },

    /// The input contains no elements at all.
    #[error("No root element")]
    NoRootElement,
}

/// A child of an [`Element`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// A nested element.
    Element(Element),
    /// Character data, CDATA included.
    Text(String),
}

/// An XML element with its raw (possibly prefixed) name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Qualified name as written, e.g. `kml:Placemark`.
    pub name: String,
    /// Child nodes in document order.
    pub children: Vec<Node>,
}

/// How element names are compared against a KML local name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameMatch {
    /// The raw name must equal the local name.
    Exact,
    /// The raw name may carry any of the listed prefixes (`""` meaning
    /// unprefixed).
    Prefixed(&'static [&'static str]),
}

impl NameMatch {
    /// Returns true if `raw` names the element `local` under this policy.
    #[must_use]
    pub fn matches(self, raw: &str, local: &str) -> bool {
        match self {
            Self::Exact => raw == local,
            Self::Prefixed(prefixes) => prefixes.iter().any(|prefix| {
                if prefix.is_empty() {
                    raw == local
                } else {
                    raw.strip_prefix(prefix)
                        .and_then(|rest| rest.strip_prefix(':'))
                        .is_some_and(|rest| rest == local)
                }
            }),
        }
    }
}

impl Element {
    fn new(name: String) -> Self {
        Self {
            name,
            children: Vec::new(),
        }
    }

    /// Returns true if this element is `local` under `names`.
    #[must_use]
    pub fn is(&self, names: NameMatch, local: &str) -> bool {
        names.matches(&self.name, local)
    }

    /// Direct child elements.
    pub fn child_elements(&self) -> impl Iterator<Item = &Self> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    /// First direct child named `local`.
    #[must_use]
    pub fn child(&self, names: NameMatch, local: &str) -> Option<&Self> {
        self.child_elements().find(|e| e.is(names, local))
    }

    /// All descendant elements in document order, excluding `self`.
    #[must_use]
    pub fn descendants(&self) -> Vec<&Self> {
        let mut out = Vec::new();
        let mut stack: Vec<&Self> = self.child_elements().collect();
        stack.reverse();
        while let Some(element) = stack.pop() {
            out.push(element);
            let start = stack.len();
            stack.extend(element.child_elements());
            stack[start..].reverse();
        }
        out
    }

    /// All descendants named `local`, in document order.
    #[must_use]
    pub fn find_all(&self, names: NameMatch, local: &str) -> Vec<&Self> {
        self.descendants()
            .into_iter()
            .filter(|e| e.is(names, local))
            .collect()
    }

    /// First descendant named `local`.
    #[must_use]
    pub fn find(&self, names: NameMatch, local: &str) -> Option<&Self> {
        self.descendants().into_iter().find(|e| e.is(names, local))
    }

    /// Concatenated text of this element and all descendants.
    #[must_use]
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        for node in &self.children {
            match node {
                Node::Text(t) => out.push_str(t),
                Node::Element(e) => e.collect_text(out),
            }
        }
    }
}

/// Parses `text` into a synthetic document element whose children are
/// the top-level nodes.
///
/// # Errors
///
/// Returns [`MarkupError`] if the input is not well-formed or contains no
/// element.
pub fn parse(text: &str) -> Result<Element, MarkupError> {
    let mut reader = Reader::from_str(text);
    let mut stack = vec![Element::new(String::new())];
    let mut saw_element = false;

    loop {
        let event = reader.read_event().map_err(|e| MarkupError::Syntax {
            position: reader.buffer_position() as u64,
            message: e.to_string(),
        })?;

        match event {
            Event::Start(start) => {
                saw_element = true;
                stack.push(Element::new(decode_name(start.name().as_ref())));
            }
            Event::Empty(start) => {
                saw_element = true;
                let element = Element::new(decode_name(start.name().as_ref()));
                push_node(&mut stack, Node::Element(element));
            }
            Event::End(end) => {
                if stack.len() < 2 {
                    return Err(MarkupError::Syntax {
                        position: reader.buffer_position() as u64,
                        message: format!(
                            "unexpected closing tag </{}>",
                            decode_name(end.name().as_ref())
                        ),
                    });
                }
                if let Some(element) = stack.pop() {
                    push_node(&mut stack, Node::Element(element));
                }
            }
            Event::Text(t) => {
                let text = t
                    .unescape()
                    .unwrap_or_else(|_| String::from_utf8_lossy(&t).into_owned().into());
                push_text(&mut stack, text);
            }
            Event::CData(c) => {
                push_text(&mut stack, String::from_utf8_lossy(&c));
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if stack.len() > 1 {
        let name = stack.last().map(|e| e.name.clone()).unwrap_or_default();
        return Err(MarkupError::Unclosed { name });
    }
    if !saw_element {
        return Err(MarkupError::NoRootElement);
    }

    Ok(stack.pop().unwrap_or_else(|| Element::new(String::new())))
}

fn decode_name(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).into_owned()
}

fn push_node(stack: &mut [Element], node: Node) {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(node);
    }
}

fn push_text(stack: &mut [Element], text: Cow<'_, str>) {
    if text.is_empty() {
        return;
    }
    push_node(stack, Node::Text(text.into_owned()));
}
