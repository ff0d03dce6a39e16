//! Typed metadata values attached to atoms, residues, and frames.

use std::collections::BTreeMap;

use lin_alg::f64::Vec3;

use crate::error::{Error, Result};

/// A tagged value: bool, double, string, or 3-vector. Typed accessors fail
/// with a property error when the tag does not match.
#[derive(Clone, Debug)]
pub enum Property {
    Bool(bool),
    Double(f64),
    String(String),
    Vector3(Vec3),
}

/// Name → value maps, ordered so that serialization is deterministic.
pub type PropertyMap = BTreeMap<String, Property>;

impl Property {
    /// The name of the contained variant, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Property::Bool(_) => "bool",
            Property::Double(_) => "double",
            Property::String(_) => "string",
            Property::Vector3(_) => "Vector3",
        }
    }

    pub fn as_bool(&self) -> Result<bool> {
        match self {
            Property::Bool(value) => Ok(*value),
            other => Err(Error::Property(format!(
                "expected a bool property, got a {} one",
                other.kind()
            ))),
        }
    }

    pub fn as_double(&self) -> Result<f64> {
        match self {
            Property::Double(value) => Ok(*value),
            other => Err(Error::Property(format!(
                "expected a double property, got a {} one",
                other.kind()
            ))),
        }
    }

    pub fn as_string(&self) -> Result<&str> {
        match self {
            Property::String(value) => Ok(value),
            other => Err(Error::Property(format!(
                "expected a string property, got a {} one",
                other.kind()
            ))),
        }
    }

    pub fn as_vector3(&self) -> Result<Vec3> {
        match self {
            Property::Vector3(value) => Ok(*value),
            other => Err(Error::Property(format!(
                "expected a Vector3 property, got a {} one",
                other.kind()
            ))),
        }
    }
}

impl PartialEq for Property {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Property::Bool(a), Property::Bool(b)) => a == b,
            (Property::Double(a), Property::Double(b)) => a == b,
            (Property::String(a), Property::String(b)) => a == b,
            (Property::Vector3(a), Property::Vector3(b)) => {
                a.x == b.x && a.y == b.y && a.z == b.z
            }
            _ => false,
        }
    }
}

impl From<bool> for Property {
    fn from(value: bool) -> Self {
        Property::Bool(value)
    }
}

impl From<f64> for Property {
    fn from(value: f64) -> Self {
        Property::Double(value)
    }
}

impl From<&str> for Property {
    fn from(value: &str) -> Self {
        Property::String(value.to_owned())
    }
}

impl From<String> for Property {
    fn from(value: String) -> Self {
        Property::String(value)
    }
}

impl From<Vec3> for Property {
    fn from(value: Vec3) -> Self {
        Property::Vector3(value)
    }
}
