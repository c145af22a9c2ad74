//! Field-level validation errors
//!
//! Produced before anything reaches a collection; the form view model shows
//! them next to the offending input.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    Title,
    Description,
    Category,
}

impl Field {
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Title => "title",
            Field::Description => "description",
            Field::Category => "category",
        }
    }
}

/// Per-field messages; empty means valid
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationErrors {
    fields: BTreeMap<Field, String>,
}

impl ValidationErrors {
    pub fn insert(&mut self, field: Field, message: impl Into<String>) {
        self.fields.insert(field, message.into());
    }

    pub fn remove(&mut self, field: Field) {
        self.fields.remove(&field);
    }

    pub fn get(&self, field: Field) -> Option<&str> {
        self.fields.get(&field).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Field, &str)> {
        self.fields.iter().map(|(f, m)| (*f, m.as_str()))
    }

    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, message) in self.iter() {
            if !first {
                f.write_str("; ")?;
            }
            write!(f, "{}: {}", field.as_str(), message)?;
            first = false;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}
