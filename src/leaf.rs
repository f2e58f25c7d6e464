// (c) Copyright 2026 The changeset authors. All rights reserved.
//! Leaf values of the staged trees.
//!
//! A [`Change`] records a write that is waiting to be executed; an [`Invalid`] records a write
//! that failed validation, keeping the attempted value around so it can be shown back to a user.
use crate::Error;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{fmt, slice};

/// A staged write.
#[derive(Debug, Clone, PartialEq)]
pub struct Change(pub Value);

impl Change {
    pub fn new(value: impl Into<Value>) -> Self {
        Self(value.into())
    }

    pub fn value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

/// One or more reasons a value was rejected.
///
/// Serializes as either a bare string or a list of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Validation {
    Message(String),
    Messages(Vec<String>),
}

impl Validation {
    /// All reasons, in the order they were produced.
    pub fn messages(&self) -> &[String] {
        match self {
            Validation::Message(m) => slice::from_ref(m),
            Validation::Messages(ms) => ms,
        }
    }

    /// Appends reasons, promoting a single message to a list first.
    pub fn extend<I>(&mut self, reasons: I)
    where
        I: IntoIterator<Item = String>,
    {
        let mut messages = match std::mem::replace(self, Validation::Messages(Vec::new())) {
            Validation::Message(m) => vec![m],
            Validation::Messages(ms) => ms,
        };
        messages.extend(reasons);
        *self = Validation::Messages(messages);
    }

    pub fn is_empty(&self) -> bool {
        self.messages().is_empty()
    }
}

impl fmt::Display for Validation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.messages().join(", "))
    }
}

impl From<&str> for Validation {
    fn from(value: &str) -> Self {
        Validation::Message(value.to_string())
    }
}

impl From<String> for Validation {
    fn from(value: String) -> Self {
        Validation::Message(value)
    }
}

impl From<Vec<String>> for Validation {
    fn from(value: Vec<String>) -> Self {
        Validation::Messages(value)
    }
}

impl From<Vec<&str>> for Validation {
    fn from(value: Vec<&str>) -> Self {
        Validation::Messages(value.into_iter().map(str::to_string).collect())
    }
}

impl From<Validation> for Value {
    fn from(validation: Validation) -> Self {
        match validation {
            Validation::Message(m) => Value::String(m),
            Validation::Messages(ms) => Value::Array(ms.into_iter().map(Value::String).collect()),
        }
    }
}

/// A staged failure: the attempted value and why it was rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invalid {
    pub value: Value,
    pub validation: Validation,
}

impl Invalid {
    pub fn new(value: impl Into<Value>, validation: impl Into<Validation>) -> Self {
        Self {
            value: value.into(),
            validation: validation.into(),
        }
    }

    /// The `{"value": ..., "validation": ...}` object form.
    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "value": self.value,
            "validation": Value::from(self.validation.clone()),
        })
    }
}

/// Parses a manually built error object.
///
/// The object must carry both a `value` and a `validation` field; `validation` must be a string
/// or a list of strings.
impl TryFrom<Value> for Invalid {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let Value::Object(mut obj) = value else {
            return Err(Error::MalformedError { missing: "value" });
        };
        let Some(value) = obj.remove("value") else {
            return Err(Error::MalformedError { missing: "value" });
        };
        let validation = obj
            .remove("validation")
            .and_then(|v| serde_json::from_value::<Validation>(v).ok())
            .ok_or(Error::MalformedError {
                missing: "validation",
            })?;
        Ok(Self { value, validation })
    }
}
