//! Element tree for sidecar and thumbnail index files, read and written with
//! `quick-xml`.
//!
//! The `.meta` and `.db.xml` formats only carry attributes on nested
//! elements, so text content, comments, processing instructions and
//! `<!DOCTYPE>` declarations are skipped on read. A leading byte order mark
//! is accepted.

use quick_xml::encoding::Decoder;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};
use thiserror::Error;

/// Malformed document
#[derive(Debug, Error)]
#[error("{0}")]
pub struct XmlError(String);

impl XmlError {
    fn at(position: impl std::fmt::Display, message: impl std::fmt::Display) -> Self {
        Self(format!("{} at byte {}", message, position))
    }
}

/// An element with attributes and child elements
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct XmlElement {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Builder-style attribute setter
    pub fn with_attr(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.set_attr(key, value);
        self
    }

    /// Set or replace an attribute
    pub fn set_attr(&mut self, key: impl Into<String>, value: impl ToString) {
        let key = key.into();
        let value = value.to_string();
        match self.attrs.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.attrs.push((key, value)),
        }
    }

    /// Get an attribute value
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Append a child element
    pub fn push(&mut self, child: XmlElement) {
        self.children.push(child);
    }

    /// First child with the given name
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == name)
    }

    /// All children with the given name
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Parse a document and return its root element
    pub fn parse(input: &str) -> Result<XmlElement, XmlError> {
        let input = input.strip_prefix('\u{feff}').unwrap_or(input);
        let mut reader = Reader::from_str(input);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root = None;

        loop {
            let event = reader
                .read_event()
                .map_err(|e| XmlError::at(reader.error_position(), e))?;

            let (start, empty) = match event {
                Event::Start(start) => (start, false),
                Event::Empty(start) => (start, true),
                Event::End(_) => {
                    let Some(done) = stack.pop() else {
                        return Err(XmlError::at(reader.buffer_position(), "Unexpected close tag"));
                    };
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(done),
                        None => root = Some(done),
                    }
                    continue;
                }
                Event::Eof => break,
                _ => continue,
            };

            if root.is_some() {
                return Err(XmlError::at(reader.buffer_position(), "Trailing content after root element"));
            }
            let element = read_start(&start, reader.decoder())
                .map_err(|e| XmlError::at(reader.buffer_position(), e))?;
            if empty {
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => root = Some(element),
                }
            } else {
                stack.push(element);
            }
        }

        if !stack.is_empty() {
            return Err(XmlError::at(reader.buffer_position(), "Missing close tag"));
        }
        root.ok_or_else(|| XmlError::at(reader.buffer_position(), "No root element"))
    }

    /// Serialize as a document with an XML declaration, tab indented
    pub fn to_document(&self) -> Result<String, XmlError> {
        let mut writer = Writer::new_with_indent(Vec::new(), b'\t', 1);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
            .map_err(|e| XmlError(e.to_string()))?;
        self.write_into(&mut writer)?;

        let mut text = String::from_utf8(writer.into_inner()).map_err(|e| XmlError(e.to_string()))?;
        text.push('\n');
        Ok(text)
    }

    fn write_into(&self, writer: &mut Writer<Vec<u8>>) -> Result<(), XmlError> {
        let mut start = BytesStart::new(self.name.as_str());
        for (key, value) in &self.attrs {
            start.push_attribute((key.as_str(), value.as_str()));
        }

        if self.children.is_empty() {
            return writer
                .write_event(Event::Empty(start))
                .map_err(|e| XmlError(e.to_string()));
        }

        writer
            .write_event(Event::Start(start))
            .map_err(|e| XmlError(e.to_string()))?;
        for child in &self.children {
            child.write_into(writer)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new(self.name.as_str())))
            .map_err(|e| XmlError(e.to_string()))
    }
}

fn read_start(start: &BytesStart<'_>, decoder: Decoder) -> Result<XmlElement, String> {
    let binding = start.name();
    let name = std::str::from_utf8(binding.as_ref()).map_err(|e| e.to_string())?;
    let mut element = XmlElement::new(name);

    for attr in start.attributes() {
        let attr = attr.map_err(|e| e.to_string())?;
        let key = std::str::from_utf8(attr.key.as_ref()).map_err(|e| e.to_string())?;
        let value = attr.decode_and_unescape_value(decoder).map_err(|e| e.to_string())?;
        element.attrs.push((key.to_string(), value.into_owned()));
    }
    Ok(element)
}
