//! Owned XML document tree.
//!
//! Every XML document that flows through the pipeline (input invoice,
//! canonical document, layout document) is held as an [`XmlDocument`]. Element
//! names keep their original qualified form for serialization and carry the
//! resolved namespace URI for matching.

use std::io::Write;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::name::ResolveResult;
use quick_xml::reader::NsReader;
use quick_xml::writer::Writer;

use crate::error::XmlError;

/// A parsed XML document.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct XmlDocument {
    nodes: Vec<Node>,
}

/// A node in the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
    Comment(String),
}

/// An element with its resolved namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Qualified name as written, e.g. `cbc:ID`.
    pub name: String,
    /// Local part of the name, e.g. `ID`.
    pub local_name: String,
    /// Namespace URI the prefix (or default namespace) resolves to.
    pub namespace: Option<String>,
    /// Attributes in document order, including namespace declarations.
    pub attributes: Vec<Attribute>,
    pub children: Vec<Node>,
}

/// An attribute as written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

impl XmlDocument {
    /// Parse a document from bytes.
    pub fn parse(data: &[u8]) -> Result<Self, XmlError> {
        let mut reader = NsReader::from_reader(data);
        let mut buf = Vec::new();
        let mut stack: Vec<Element> = Vec::new();
        let mut nodes: Vec<Node> = Vec::new();

        loop {
            let (resolved, event) = reader
                .read_resolved_event_into(&mut buf)
                .map_err(|e| XmlError::Malformed(e.to_string()))?;
            let namespace = match resolved {
                ResolveResult::Bound(ns) => Ok(Some(String::from_utf8_lossy(ns.as_ref()).into_owned())),
                ResolveResult::Unbound => Ok(None),
                ResolveResult::Unknown(prefix) => Err(String::from_utf8_lossy(&prefix).into_owned()),
            };

            match event {
                Event::Start(start) => {
                    let element = build_element(&start, namespace)?;
                    stack.push(element);
                }
                Event::Empty(start) => {
                    let element = build_element(&start, namespace)?;
                    append(&mut stack, &mut nodes, Node::Element(element))?;
                }
                Event::End(end) => {
                    let element = stack.pop().ok_or_else(|| {
                        XmlError::UnexpectedEnd(String::from_utf8_lossy(end.name().as_ref()).into_owned())
                    })?;
                    append(&mut stack, &mut nodes, Node::Element(element))?;
                }
                Event::Text(text) => {
                    let text = text
                        .unescape()
                        .map_err(|e| XmlError::Malformed(e.to_string()))?
                        .into_owned();
                    append_text(&mut stack, text)?;
                }
                Event::CData(cdata) => {
                    let text = String::from_utf8_lossy(&cdata).into_owned();
                    append_text(&mut stack, text)?;
                }
                Event::Comment(comment) => {
                    let text = String::from_utf8_lossy(&comment).into_owned();
                    append(&mut stack, &mut nodes, Node::Comment(text))?;
                }
                Event::Eof => break,
                // Declaration, processing instructions and DOCTYPE are not kept.
                _ => {}
            }
            buf.clear();
        }

        if let Some(open) = stack.last() {
            return Err(XmlError::Unclosed(open.name.clone()));
        }

        Ok(Self { nodes })
    }

    /// Parse a document from a string.
    pub fn parse_str(data: &str) -> Result<Self, XmlError> {
        Self::parse(data.as_bytes())
    }

    /// Build a document around a single root element.
    pub fn from_root(root: Element) -> Self {
        Self {
            nodes: vec![Node::Element(root)],
        }
    }

    /// Top-level nodes.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// The document element, if there is one.
    pub fn root_element(&self) -> Option<&Element> {
        self.nodes.iter().find_map(|n| match n {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    /// Serialize with an XML declaration.
    pub fn write_to<W: Write>(&self, out: W) -> Result<(), XmlError> {
        let mut writer = Writer::new(out);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(write_error)?;
        for node in &self.nodes {
            write_node(&mut writer, node)?;
        }
        Ok(())
    }

    /// Serialize into a byte vector.
    pub fn to_bytes(&self) -> Result<Vec<u8>, XmlError> {
        let mut out = Vec::new();
        self.write_to(&mut out)?;
        Ok(out)
    }
}

impl Element {
    /// A new element without namespace, attributes or children.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let local_name = match name.split_once(':') {
            Some((_, local)) => local.to_string(),
            None => name.clone(),
        };
        Self {
            name,
            local_name,
            namespace: None,
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Whether the element has the given expanded name.
    pub fn is(&self, namespace: &str, local_name: &str) -> bool {
        self.local_name == local_name && self.namespace.as_deref() == Some(namespace)
    }

    /// Value of an attribute by its written name.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    /// Child elements in document order.
    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text(&self) -> String {
        let mut out = String::new();
        collect_text(&self.children, &mut out);
        out
    }
}

fn collect_text(nodes: &[Node], out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(t) => out.push_str(t),
            Node::Element(e) => collect_text(&e.children, out),
            Node::Comment(_) => {}
        }
    }
}

fn build_element(start: &BytesStart<'_>, namespace: Result<Option<String>, String>) -> Result<Element, XmlError> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let namespace = namespace.map_err(|_| XmlError::UnboundPrefix(name.clone()))?;
    let local_name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();

    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| XmlError::Malformed(e.to_string()))?;
        let value = attr
            .unescape_value()
            .map_err(|e| XmlError::Malformed(e.to_string()))?
            .into_owned();
        attributes.push(Attribute {
            name: String::from_utf8_lossy(attr.key.as_ref()).into_owned(),
            value,
        });
    }

    Ok(Element {
        name,
        local_name,
        namespace,
        attributes,
        children: Vec::new(),
    })
}

fn append(stack: &mut [Element], nodes: &mut Vec<Node>, node: Node) -> Result<(), XmlError> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => {
            if matches!(node, Node::Element(_)) && nodes.iter().any(|n| matches!(n, Node::Element(_))) {
                return Err(XmlError::Malformed("multiple root elements".to_string()));
            }
            nodes.push(node);
        }
    }
    Ok(())
}

fn append_text(stack: &mut [Element], text: String) -> Result<(), XmlError> {
    match stack.last_mut() {
        Some(parent) => {
            // Merge adjacent text and CDATA sections.
            if let Some(Node::Text(previous)) = parent.children.last_mut() {
                previous.push_str(&text);
            } else {
                parent.children.push(Node::Text(text));
            }
            Ok(())
        }
        None if text.trim().is_empty() => Ok(()),
        None => Err(XmlError::Malformed("text outside of the root element".to_string())),
    }
}

fn write_node<W: Write>(writer: &mut Writer<W>, node: &Node) -> Result<(), XmlError> {
    match node {
        Node::Element(element) => {
            let mut start = BytesStart::new(element.name.as_str());
            for attr in &element.attributes {
                start.push_attribute((attr.name.as_str(), attr.value.as_str()));
            }

            if element.children.is_empty() {
                writer.write_event(Event::Empty(start)).map_err(write_error)?;
            } else {
                writer.write_event(Event::Start(start)).map_err(write_error)?;
                for child in &element.children {
                    write_node(writer, child)?;
                }
                writer
                    .write_event(Event::End(BytesEnd::new(element.name.as_str())))
                    .map_err(write_error)?;
            }
        }
        Node::Text(text) => {
            writer
                .write_event(Event::Text(BytesText::new(text)))
                .map_err(write_error)?;
        }
        Node::Comment(comment) => {
            writer
                .write_event(Event::Comment(BytesText::from_escaped(comment.as_str())))
                .map_err(write_error)?;
        }
    }
    Ok(())
}

fn write_error(e: impl std::fmt::Display) -> XmlError {
    XmlError::Write(e.to_string())
}
