//! Streaming reader for SPARQL query results XML.
//!
//! Rows are pulled one `<result>` at a time, so a result document of any
//! size is read with bounded memory. Two binding layouts are accepted:
//!
//! - W3C: `<binding name="date"><literal>...</literal></binding>`
//! - Resource index: `<date>...</date>`, `<setDiss uri="..."/>`,
//!   `<x bound="false"/>`

use std::collections::HashMap;
use std::fmt::Display;
use std::io::BufRead;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{RepositoryError, Result};

/// A bound value in a result row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Literal {
        lexical: String,
        datatype: Option<String>,
        language: Option<String>,
    },
    Uri(String),
    BlankNode(String),
}

impl Value {
    /// Plain literal with no datatype or language.
    pub fn literal(lexical: impl Into<String>) -> Self {
        Value::Literal {
            lexical: lexical.into(),
            datatype: None,
            language: None,
        }
    }

    /// The lexical form, URI or blank node label.
    pub fn lexical_form(&self) -> &str {
        match self {
            Value::Literal { lexical, .. } => lexical.as_str(),
            Value::Uri(uri) => uri.as_str(),
            Value::BlankNode(label) => label.as_str(),
        }
    }
}

/// One result row: binding name to value. Unbound variables are absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultRow {
    bindings: HashMap<String, Value>,
}

impl ResultRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.bindings.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }

    /// Lexical form of `name`, if it is bound to a literal.
    pub fn literal(&self, name: &str) -> Option<&str> {
        match self.bindings.get(name)? {
            Value::Literal { lexical, .. } => Some(lexical.as_str()),
            _ => None,
        }
    }

    /// URI of `name`, if it is bound to a resource.
    pub fn uri(&self, name: &str) -> Option<&str> {
        match self.bindings.get(name)? {
            Value::Uri(uri) => Some(uri.as_str()),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for ResultRow {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        let mut row = Self::new();
        for (name, value) in iter {
            row.insert(name, value);
        }
        row
    }
}

/// Owned copy of an element's name and attributes.
struct Element {
    name: String,
    attributes: Vec<(String, String)>,
}

impl Element {
    fn from_start(start: &BytesStart<'_>) -> Result<Self> {
        let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(parse_error)?;
            let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
            let value = attr.unescape_value().map_err(parse_error)?.into_owned();
            attributes.push((key, value));
        }
        Ok(Self { name, attributes })
    }

    fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

fn parse_error(e: impl Display) -> RepositoryError {
    RepositoryError::ResultParse(e.to_string())
}

/// Iterator over the rows of a SPARQL results document.
///
/// Stops after the first error.
pub struct TupleReader<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    done: bool,
}

impl<R: BufRead> TupleReader<R> {
    pub fn new(input: R) -> Self {
        Self {
            reader: Reader::from_reader(input),
            buf: Vec::new(),
            done: false,
        }
    }

    fn next_event(&mut self) -> Result<Event<'static>> {
        self.buf.clear();
        let event = self
            .reader
            .read_event_into(&mut self.buf)
            .map_err(parse_error)?;
        Ok(event.into_owned())
    }

    /// Advance to the next `<result>` and read it.
    fn read_row(&mut self) -> Result<Option<ResultRow>> {
        loop {
            match self.next_event()? {
                Event::Start(e) if e.local_name().as_ref() == b"result" => {
                    return self.read_result().map(Some);
                }
                Event::Empty(e) if e.local_name().as_ref() == b"result" => {
                    return Ok(Some(ResultRow::new()));
                }
                Event::Eof => return Ok(None),
                _ => {}
            }
        }
    }

    fn read_result(&mut self) -> Result<ResultRow> {
        let mut row = ResultRow::new();
        loop {
            match self.next_event()? {
                Event::Start(e) => {
                    let element = Element::from_start(&e)?;
                    if element.name == "binding" {
                        let name = element
                            .attribute("name")
                            .ok_or_else(|| parse_error("<binding> without a name attribute"))?
                            .to_string();
                        if let Some(value) = self.read_binding()? {
                            row.insert(name, value);
                        }
                    } else {
                        let value = self.read_inline(&element, true)?;
                        if let Some(value) = value {
                            row.insert(element.name, value);
                        }
                    }
                }
                Event::Empty(e) => {
                    let element = Element::from_start(&e)?;
                    if element.name != "binding" {
                        if let Some(value) = self.read_inline(&element, false)? {
                            row.insert(element.name, value);
                        }
                    }
                }
                Event::End(e) if e.local_name().as_ref() == b"result" => return Ok(row),
                Event::Eof => return Err(parse_error("document ended inside <result>")),
                _ => {}
            }
        }
    }

    /// Read the value inside a W3C `<binding>` and its closing tag.
    fn read_binding(&mut self) -> Result<Option<Value>> {
        let mut value = None;
        loop {
            match self.next_event()? {
                Event::Start(e) => {
                    let element = Element::from_start(&e)?;
                    let text = self.read_text()?;
                    value = Some(typed_value(&element, text)?);
                }
                Event::Empty(e) => {
                    let element = Element::from_start(&e)?;
                    value = Some(typed_value(&element, String::new())?);
                }
                Event::End(_) => return Ok(value),
                Event::Eof => return Err(parse_error("document ended inside <binding>")),
                _ => {}
            }
        }
    }

    /// Read a resource-index style binding named after its variable.
    fn read_inline(&mut self, element: &Element, has_body: bool) -> Result<Option<Value>> {
        let text = if has_body {
            self.read_text()?
        } else {
            String::new()
        };
        if element.attribute("bound") == Some("false") {
            return Ok(None);
        }
        if let Some(uri) = element.attribute("uri") {
            return Ok(Some(Value::Uri(uri.to_string())));
        }
        if let Some(label) = element.attribute("bnode") {
            return Ok(Some(Value::BlankNode(label.to_string())));
        }
        Ok(Some(Value::Literal {
            lexical: text,
            datatype: element.attribute("datatype").map(str::to_string),
            language: element.attribute("lang").map(str::to_string),
        }))
    }

    /// Collect text up to the closing tag of the current element.
    fn read_text(&mut self) -> Result<String> {
        let mut text = String::new();
        loop {
            match self.next_event()? {
                Event::Text(t) => text.push_str(&t.unescape().map_err(parse_error)?),
                Event::CData(c) => text.push_str(&String::from_utf8_lossy(&c.into_inner())),
                Event::End(_) => return Ok(text),
                Event::Start(_) | Event::Empty(_) => {
                    return Err(parse_error("unexpected element inside a bound value"));
                }
                Event::Eof => return Err(parse_error("document ended inside a bound value")),
                _ => {}
            }
        }
    }
}

/// Build a value from a W3C `<uri>`, `<literal>` or `<bnode>` element.
fn typed_value(element: &Element, text: String) -> Result<Value> {
    match element.name.as_str() {
        "uri" => Ok(Value::Uri(text)),
        "bnode" => Ok(Value::BlankNode(text)),
        "literal" => Ok(Value::Literal {
            lexical: text,
            datatype: element.attribute("datatype").map(str::to_string),
            language: element.attribute("lang").map(str::to_string),
        }),
        other => Err(parse_error(format!("unknown value element <{other}>"))),
    }
}

impl<R: BufRead> Iterator for TupleReader<R> {
    type Item = Result<ResultRow>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_row() {
            Ok(Some(row)) => Some(Ok(row)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
