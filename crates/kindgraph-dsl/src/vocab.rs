//! Property vocabulary shared by the structural and declarative planes.
//!
//! The structural plane names scalar types by their plain name (`integer`),
//! the declarative plane by a backend tag (`xsd:integer`). Both spellings
//! parse into the same [`PropertyType`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VocabError {
    #[error("unknown property type `{0}` (expected one of string, integer, float, boolean, date, time, datetime)")]
    UnknownType(String),
    #[error("unknown type family `{0}` (expected one of Mandatory, Optional, List, Set)")]
    UnknownFamily(String),
}

/// Scalar type of a property slot.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    #[default]
    String,
    Integer,
    Float,
    Boolean,
    Date,
    Time,
    #[serde(rename = "datetime")]
    DateTime,
}

impl PropertyType {
    pub const ALL: [PropertyType; 7] = [
        PropertyType::String,
        PropertyType::Integer,
        PropertyType::Float,
        PropertyType::Boolean,
        PropertyType::Date,
        PropertyType::Time,
        PropertyType::DateTime,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PropertyType::String => "string",
            PropertyType::Integer => "integer",
            PropertyType::Float => "float",
            PropertyType::Boolean => "boolean",
            PropertyType::Date => "date",
            PropertyType::Time => "time",
            PropertyType::DateTime => "datetime",
        }
    }

    /// Backend-native scalar tag used in schema text.
    ///
    /// Floats map to `xsd:decimal`, which is what declarative graph stores
    /// expose for fractional numbers.
    pub fn backend_tag(self) -> &'static str {
        match self {
            PropertyType::String => "xsd:string",
            PropertyType::Integer => "xsd:integer",
            PropertyType::Float => "xsd:decimal",
            PropertyType::Boolean => "xsd:boolean",
            PropertyType::Date => "xsd:date",
            PropertyType::Time => "xsd:time",
            PropertyType::DateTime => "xsd:dateTime",
        }
    }

    pub fn from_backend_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|ty| ty.backend_tag() == tag)
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PropertyType {
    type Err = VocabError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(ty) = Self::from_backend_tag(s) {
            return Ok(ty);
        }
        Self::ALL
            .into_iter()
            .find(|ty| ty.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| VocabError::UnknownType(s.to_string()))
    }
}

/// Cardinality/optionality modifier of a property or relationship slot.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum TypeFamily {
    Mandatory,
    #[default]
    Optional,
    List,
    Set,
}

impl TypeFamily {
    pub const ALL: [TypeFamily; 4] = [
        TypeFamily::Mandatory,
        TypeFamily::Optional,
        TypeFamily::List,
        TypeFamily::Set,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TypeFamily::Mandatory => "Mandatory",
            TypeFamily::Optional => "Optional",
            TypeFamily::List => "List",
            TypeFamily::Set => "Set",
        }
    }
}

impl fmt::Display for TypeFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TypeFamily {
    type Err = VocabError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|family| family.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| VocabError::UnknownFamily(s.to_string()))
    }
}
