//! Typed field values.
//!
//! Every entity field carries a [`FieldValue`]. The set of value shapes is
//! closed so the diff and merge engines can compare any two fields without
//! knowing which entity kind they belong to. Free-form metadata is carried
//! as a single [`FieldValue::Metadata`] blob and compared as a whole.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{TypeError, TypeResult};
use crate::ids::EntityId;

/// Free-form string metadata attached to an entity.
pub type Metadata = BTreeMap<String, String>;

/// A position in building coordinates (metres).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

impl fmt::Display for Point3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// The value of a single entity field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    /// Absent value of an optional field.
    Null,
    Bool(bool),
    Integer(i64),
    Number(f64),
    Text(String),
    Point(Point3),
    /// Reference to another entity (used for containment).
    Reference(EntityId),
    Metadata(Metadata),
}

/// The declared shape of a field, used to parse and validate values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    Bool,
    Integer,
    Number,
    Text,
    Point,
    Reference,
    Metadata,
}

impl FieldType {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Text => "text",
            Self::Point => "point",
            Self::Reference => "reference",
            Self::Metadata => "metadata",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FieldValue {
    /// Human-readable name of this value's shape.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Integer(_) => "integer",
            Self::Number(_) => "number",
            Self::Text(_) => "text",
            Self::Point(_) => "point",
            Self::Reference(_) => "reference",
            Self::Metadata(_) => "metadata",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// False for NaN or infinite numbers and points.
    pub fn is_finite(&self) -> bool {
        match self {
            Self::Number(n) => n.is_finite(),
            Self::Point(p) => p.x.is_finite() && p.y.is_finite() && p.z.is_finite(),
            _ => true,
        }
    }

    /// Parse user input into a value of the given type.
    ///
    /// `null` (or an empty string) yields [`FieldValue::Null`]; whether null is
    /// acceptable is decided by the field when the value is assigned.
    /// Points are written `x,y,z`; metadata as `key=value;key=value`.
    pub fn parse(ty: FieldType, input: &str) -> TypeResult<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() || trimmed == "null" {
            return Ok(Self::Null);
        }
        let parse_err = || TypeError::Parse {
            input: input.to_string(),
            expected: ty.name(),
        };
        match ty {
            FieldType::Bool => match trimmed {
                "true" | "yes" | "on" => Ok(Self::Bool(true)),
                "false" | "no" | "off" => Ok(Self::Bool(false)),
                _ => Err(parse_err()),
            },
            FieldType::Integer => trimmed.parse().map(Self::Integer).map_err(|_| parse_err()),
            FieldType::Number => parse_finite(trimmed).map(Self::Number).ok_or_else(parse_err),
            FieldType::Text => Ok(Self::Text(input.to_string())),
            FieldType::Point => {
                let parts: Vec<&str> = trimmed.split(',').map(str::trim).collect();
                if parts.len() != 3 {
                    return Err(parse_err());
                }
                let mut coords = [0.0f64; 3];
                for (slot, part) in coords.iter_mut().zip(&parts) {
                    *slot = parse_finite(part).ok_or_else(parse_err)?;
                }
                Ok(Self::Point(Point3::new(coords[0], coords[1], coords[2])))
            }
            FieldType::Reference => trimmed
                .parse::<EntityId>()
                .map(Self::Reference)
                .map_err(|_| parse_err()),
            FieldType::Metadata => {
                let mut map = Metadata::new();
                for pair in trimmed.split(';').filter(|p| !p.trim().is_empty()) {
                    let (k, v) = pair.split_once('=').ok_or_else(parse_err)?;
                    map.insert(k.trim().to_string(), v.trim().to_string());
                }
                Ok(Self::Metadata(map))
            }
        }
    }
}

/// NaN and infinities are refused: they do not compare equal to themselves,
/// so a field holding one would show up as changed in every diff.
fn parse_finite(input: &str) -> Option<f64> {
    input.parse::<f64>().ok().filter(|n| n.is_finite())
}

fn check_finite(field: &str, n: f64) -> TypeResult<f64> {
    if n.is_finite() {
        Ok(n)
    } else {
        Err(TypeError::NonFinite {
            field: field.to_string(),
        })
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "{s:?}"),
            Self::Point(p) => write!(f, "{p}"),
            Self::Reference(id) => write!(f, "@{id}"),
            Self::Metadata(m) => {
                let pairs: Vec<String> = m.iter().map(|(k, v)| format!("{k}={v}")).collect();
                write!(f, "{{{}}}", pairs.join(", "))
            }
        }
    }
}

/// Conversion between Rust field types and [`FieldValue`].
///
/// Implemented for every type an entity struct stores, so assigning a field
/// from a generic value is one `from_value` call with a type check.
pub trait FieldCodec: Sized {
    fn into_value(self) -> FieldValue;
    fn from_value(field: &str, value: FieldValue) -> TypeResult<Self>;
}

fn mismatch(field: &str, expected: &'static str, value: &FieldValue) -> TypeError {
    TypeError::FieldType {
        field: field.to_string(),
        expected,
        found: value.type_name(),
    }
}

macro_rules! codec {
    ($ty:ty, $variant:ident, $name:literal) => {
        impl FieldCodec for $ty {
            fn into_value(self) -> FieldValue {
                FieldValue::$variant(self)
            }

            fn from_value(field: &str, value: FieldValue) -> TypeResult<Self> {
                match value {
                    FieldValue::$variant(v) => Ok(v),
                    other => Err(mismatch(field, $name, &other)),
                }
            }
        }
    };
}

codec!(bool, Bool, "bool");
codec!(String, Text, "text");
codec!(EntityId, Reference, "reference");
codec!(Metadata, Metadata, "metadata");

impl FieldCodec for i64 {
    fn into_value(self) -> FieldValue {
        FieldValue::Integer(self)
    }

    fn from_value(field: &str, value: FieldValue) -> TypeResult<Self> {
        match value {
            FieldValue::Integer(v) => Ok(v),
            other => Err(mismatch(field, "integer", &other)),
        }
    }
}

impl FieldCodec for f64 {
    fn into_value(self) -> FieldValue {
        FieldValue::Number(self)
    }

    // Integers widen to numbers so `area_sqm=20` is accepted.
    fn from_value(field: &str, value: FieldValue) -> TypeResult<Self> {
        match value {
            FieldValue::Number(v) => check_finite(field, v),
            FieldValue::Integer(v) => Ok(v as f64),
            other => Err(mismatch(field, "number", &other)),
        }
    }
}

impl FieldCodec for Point3 {
    fn into_value(self) -> FieldValue {
        FieldValue::Point(self)
    }

    fn from_value(field: &str, value: FieldValue) -> TypeResult<Self> {
        match value {
            FieldValue::Point(p) => Ok(Point3::new(
                check_finite(field, p.x)?,
                check_finite(field, p.y)?,
                check_finite(field, p.z)?,
            )),
            other => Err(mismatch(field, "point", &other)),
        }
    }
}

impl<T: FieldCodec> FieldCodec for Option<T> {
    fn into_value(self) -> FieldValue {
        match self {
            Some(v) => v.into_value(),
            None => FieldValue::Null,
        }
    }

    fn from_value(field: &str, value: FieldValue) -> TypeResult<Self> {
        match value {
            FieldValue::Null => Ok(None),
            other => T::from_value(field, other).map(Some),
        }
    }
}
