//! Schema descriptors for the typed queue.
//!
//! A schema is declared textually, e.g. `body:string header:table?`, and
//! fixes which files an element directory contains and how each one is
//! decoded. `?` marks a field optional; `*` (by reference) is accepted for
//! compatibility with sibling implementations and behaves as by-value.

use std::collections::BTreeMap;
use std::str::FromStr;

use crate::error::{Error, Result};

/// The declared type of one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Unicode text, percent-escaped on disk.
    String,
    /// Arbitrary bytes, stored raw in a `.bin` file.
    Binary,
    /// A string-to-string map, stored through the line codec.
    Table,
}

/// One declared field of a schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub kind: FieldKind,
    pub optional: bool,
    /// Accepted for compatibility; the engine always stores by value.
    pub reference: bool,
}

impl FieldSpec {
    /// The name of the file holding this field inside an element directory.
    pub(crate) fn file_name(&self, field: &str) -> String {
        match self.kind {
            FieldKind::Binary => format!("{field}.bin"),
            FieldKind::String | FieldKind::Table => field.to_string(),
        }
    }
}

/// A parsed schema: field name to specification.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Schema {
    fields: BTreeMap<String, FieldSpec>,
}

impl Schema {
    pub fn get(&self, field: &str) -> Option<&FieldSpec> {
        self.fields.get(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldSpec)> {
        self.fields.iter().map(|(name, spec)| (name.as_str(), spec))
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

fn valid_field_name(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| b.is_ascii_alphanumeric())
}

impl FromStr for Schema {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self> {
        let mut fields = BTreeMap::new();
        let mut required = 0usize;
        for item in input.split_ascii_whitespace() {
            let (name, spec) = item
                .split_once(':')
                .ok_or_else(|| Error::InvalidConfig(format!("schema field without type: {item}")))?;
            if !valid_field_name(name) {
                return Err(Error::InvalidConfig(format!("invalid schema name: {name}")));
            }
            let mut spec = spec;
            let mut optional = false;
            let mut reference = false;
            if let Some(rest) = spec.strip_suffix('*') {
                reference = true;
                spec = rest;
            }
            if let Some(rest) = spec.strip_suffix('?') {
                optional = true;
                spec = rest;
            }
            let kind = match spec {
                "string" => FieldKind::String,
                "binary" => FieldKind::Binary,
                "table" => FieldKind::Table,
                other => {
                    return Err(Error::InvalidConfig(format!(
                        "invalid schema data type: {other}"
                    )))
                }
            };
            if !optional {
                required += 1;
            }
            let previous = fields.insert(
                name.to_string(),
                FieldSpec {
                    kind,
                    optional,
                    reference,
                },
            );
            if previous.is_some() {
                return Err(Error::InvalidConfig(format!("duplicate schema field: {name}")));
            }
        }
        if fields.is_empty() {
            return Err(Error::InvalidConfig("empty schema".to_string()));
        }
        if required == 0 {
            return Err(Error::InvalidConfig("schema has no mandatory field".to_string()));
        }
        Ok(Schema { fields })
    }
}
