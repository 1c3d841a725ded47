//! Attribute documents
//!
//! Monitoring probes report host and VM information as attribute documents:
//!
//! ```text
//! # comments run to the end of the line
//! HYPERVISOR = "kvm"
//! TOTALCPU = 800
//! VM = [ ID = "12", DEPLOY_ID = "one-12", STATE = "RUNNING" ]
//! ```
//!
//! Single attributes hold one value, vector attributes hold a set of named
//! values. Names are case-insensitive and stored upper-case. The same name
//! may appear more than once (one `VM` vector per reported VM).

use std::collections::BTreeMap;
use std::fmt;

use serde::ser::{Serialize, SerializeMap, Serializer};

/// Value of a single template attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attribute {
    Single(String),
    Vector(BTreeMap<String, String>),
}

impl Attribute {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Attribute::Single(value) => Some(value.as_str()),
            Attribute::Vector(_) => None,
        }
    }

    pub fn as_vector(&self) -> Option<&BTreeMap<String, String>> {
        match self {
            Attribute::Vector(values) => Some(values),
            Attribute::Single(_) => None,
        }
    }
}

impl Serialize for Attribute {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Attribute::Single(value) => serializer.serialize_str(value),
            Attribute::Vector(values) => values.serialize(serializer),
        }
    }
}

/// Syntax error found while parsing a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl fmt::Display for TemplateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "syntax error at line {}, column {}: {}",
            self.line, self.column, self.message
        )
    }
}

impl std::error::Error for TemplateError {}

/// Ordered collection of attributes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Template {
    attributes: Vec<(String, Attribute)>,
}

impl Template {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an attribute document
    pub fn parse(input: &str) -> Result<Self, TemplateError> {
        Parser::new(input).parse()
    }

    pub fn add(&mut self, name: &str, value: impl Into<String>) {
        self.attributes
            .push((attribute_name(name), Attribute::Single(value.into())));
    }

    pub fn add_vector<K, V>(&mut self, name: &str, values: impl IntoIterator<Item = (K, V)>)
    where
        K: AsRef<str>,
        V: Into<String>,
    {
        let values = values
            .into_iter()
            .map(|(k, v)| (attribute_name(k.as_ref()), v.into()))
            .collect();

        self.attributes
            .push((attribute_name(name), Attribute::Vector(values)));
    }

    /// First attribute with the given name
    pub fn get(&self, name: &str) -> Option<&Attribute> {
        self.get_all(name).next()
    }

    /// Value of the first single attribute with the given name
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Attribute::as_str)
    }

    pub fn get_all<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a Attribute> + 'a {
        let name = name.to_ascii_uppercase();
        self.attributes
            .iter()
            .filter(move |(n, _)| *n == name)
            .map(|(_, a)| a)
    }

    /// Replace every attribute named in `other` with the values from `other`
    pub fn merge(&mut self, other: Template) {
        for (name, _) in &other.attributes {
            self.attributes.retain(|(n, _)| n != name);
        }
        self.attributes.extend(other.attributes);
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Attribute)> {
        self.attributes.iter().map(|(n, a)| (n.as_str(), a))
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// Normalize a name the way the parser reads it
fn attribute_name(name: &str) -> String {
    debug_assert!(
        !name.is_empty() && name.chars().all(is_name_char),
        "invalid attribute name {name:?}"
    );
    name.to_ascii_uppercase()
}

fn write_quoted(f: &mut fmt::Formatter<'_>, value: &str) -> fmt::Result {
    f.write_str("\"")?;
    for c in value.chars() {
        match c {
            '"' => f.write_str("\\\"")?,
            '\\' => f.write_str("\\\\")?,
            c => write!(f, "{c}")?,
        }
    }
    f.write_str("\"")
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, attribute) in &self.attributes {
            write!(f, "{name}=")?;
            match attribute {
                Attribute::Single(value) => write_quoted(f, value)?,
                Attribute::Vector(values) => {
                    f.write_str("[")?;
                    for (i, (key, value)) in values.iter().enumerate() {
                        if i > 0 {
                            f.write_str(",")?;
                        }
                        write!(f, "\n  {key}=")?;
                        write_quoted(f, value)?;
                    }
                    f.write_str(" ]")?;
                }
            }
            f.write_str("\n")?;
        }
        Ok(())
    }
}

/// Serialized as a JSON object; repeated names become arrays
impl Serialize for Template {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut grouped: Vec<(&str, Vec<&Attribute>)> = Vec::new();
        for (name, attribute) in &self.attributes {
            match grouped.iter_mut().find(|(n, _)| *n == name.as_str()) {
                Some((_, values)) => values.push(attribute),
                None => grouped.push((name.as_str(), vec![attribute])),
            }
        }

        let mut map = serializer.serialize_map(Some(grouped.len()))?;
        for (name, values) in grouped {
            if let [single] = values.as_slice() {
                map.serialize_entry(name, single)?;
            } else {
                map.serialize_entry(name, &values)?;
            }
        }
        map.end()
    }
}

struct Parser<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
    column: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
            line: 1,
            column: 1,
        }
    }

    fn parse(mut self) -> Result<Template, TemplateError> {
        let mut template = Template::new();

        loop {
            self.skip_whitespace();
            if self.chars.peek().is_none() {
                break;
            }

            let name = self.name()?;
            self.skip_blanks();
            self.expect('=')?;
            self.skip_blanks();

            if self.chars.peek() == Some(&'[') {
                self.bump();
                let values = self.vector_body()?;
                template.attributes.push((name, Attribute::Vector(values)));
            } else {
                let value = self.value(false)?;
                template.attributes.push((name, Attribute::Single(value)));
            }
        }

        Ok(template)
    }

    fn vector_body(&mut self) -> Result<BTreeMap<String, String>, TemplateError> {
        let mut values = BTreeMap::new();

        loop {
            self.skip_whitespace();
            match self.chars.peek() {
                Some(']') => {
                    self.bump();
                    return Ok(values);
                }
                None => return Err(self.error("unterminated vector attribute")),
                _ => {}
            }

            let key = self.name()?;
            self.skip_whitespace();
            self.expect('=')?;
            self.skip_whitespace();
            let value = self.value(true)?;
            values.insert(key, value);

            self.skip_whitespace();
            match self.chars.peek() {
                Some(',') => {
                    self.bump();
                }
                Some(']') => {}
                Some(c) => {
                    let c = *c;
                    return Err(self.error(&format!("expected ',' or ']' but found '{c}'")));
                }
                None => return Err(self.error("unterminated vector attribute")),
            }
        }
    }

    fn name(&mut self) -> Result<String, TemplateError> {
        let mut name = String::new();
        while let Some(&c) = self.chars.peek() {
            if is_name_char(c) {
                name.push(c.to_ascii_uppercase());
                self.bump();
            } else {
                break;
            }
        }

        if name.is_empty() {
            let found = self
                .chars
                .peek()
                .map_or("end of input".to_string(), |c| format!("'{c}'"));
            return Err(self.error(&format!("expected attribute name but found {found}")));
        }

        Ok(name)
    }

    fn value(&mut self, in_vector: bool) -> Result<String, TemplateError> {
        if self.chars.peek() == Some(&'"') {
            self.bump();
            return self.quoted();
        }

        let mut value = String::new();
        while let Some(&c) = self.chars.peek() {
            if c.is_whitespace() || (in_vector && (c == ',' || c == ']')) {
                break;
            }
            value.push(c);
            self.bump();
        }
        Ok(value)
    }

    fn quoted(&mut self) -> Result<String, TemplateError> {
        let mut value = String::new();
        loop {
            match self.bump() {
                Some('"') => return Ok(value),
                Some('\\') => match self.bump() {
                    Some(c) => value.push(c),
                    None => return Err(self.error("unterminated string")),
                },
                Some(c) => value.push(c),
                None => return Err(self.error("unterminated string")),
            }
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), TemplateError> {
        match self.chars.peek() {
            Some(&c) if c == expected => {
                self.bump();
                Ok(())
            }
            Some(&c) => Err(self.error(&format!("expected '{expected}' but found '{c}'"))),
            None => Err(self.error(&format!("expected '{expected}' but found end of input"))),
        }
    }

    /// Skip whitespace, newlines and comments
    fn skip_whitespace(&mut self) {
        while let Some(&c) = self.chars.peek() {
            if c == '#' {
                while let Some(&c) = self.chars.peek() {
                    if c == '\n' {
                        break;
                    }
                    self.bump();
                }
            } else if c.is_whitespace() {
                self.bump();
            } else {
                break;
            }
        }
    }

    /// Skip spaces and tabs only
    fn skip_blanks(&mut self) {
        while let Some(&c) = self.chars.peek() {
            if c == ' ' || c == '\t' {
                self.bump();
            } else {
                break;
            }
        }
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn error(&self, message: &str) -> TemplateError {
        TemplateError {
            line: self.line,
            column: self.column,
            message: message.to_string(),
        }
    }
}
