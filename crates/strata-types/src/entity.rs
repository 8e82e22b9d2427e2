//! The building entity model.
//!
//! Entities form a containment hierarchy: building → floor → room →
//! equipment → control point (equipment may also sit directly on a floor).
//! Each kind has a fixed, closed set of typed fields. Field enumeration
//! destructures every struct without `..`, so adding a field without
//! teaching the diff about it fails to compile.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{TypeError, TypeResult};
use crate::field::{FieldCodec, FieldType, FieldValue, Metadata, Point3};
use crate::ids::EntityId;

/// Name of the containment field common to all entities.
pub const PARENT_FIELD: &str = "parent";
/// Name of the free-form metadata field common to all entities.
pub const METADATA_FIELD: &str = "metadata";

/// Declared name and type of one entity field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub ty: FieldType,
    pub optional: bool,
}

const fn required(name: &'static str, ty: FieldType) -> FieldSpec {
    FieldSpec {
        name,
        ty,
        optional: false,
    }
}

const fn optional(name: &'static str, ty: FieldType) -> FieldSpec {
    FieldSpec {
        name,
        ty,
        optional: true,
    }
}

const COMMON_FIELDS: &[FieldSpec] = &[
    optional(PARENT_FIELD, FieldType::Reference),
    required(METADATA_FIELD, FieldType::Metadata),
];

/// The kind of a building entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKind {
    Building,
    Floor,
    Room,
    Equipment,
    ControlPoint,
}

impl EntityKind {
    pub const ALL: [EntityKind; 5] = [
        Self::Building,
        Self::Floor,
        Self::Room,
        Self::Equipment,
        Self::ControlPoint,
    ];

    /// Kinds this kind may be contained in. Empty means it must be a root.
    pub fn allowed_parents(&self) -> &'static [EntityKind] {
        match self {
            Self::Building => &[],
            Self::Floor => &[Self::Building],
            Self::Room => &[Self::Floor],
            Self::Equipment => &[Self::Room, Self::Floor],
            Self::ControlPoint => &[Self::Equipment],
        }
    }

    /// Kind-specific fields, in declaration order.
    pub fn fields(&self) -> &'static [FieldSpec] {
        match self {
            Self::Building => Building::FIELDS,
            Self::Floor => Floor::FIELDS,
            Self::Room => Room::FIELDS,
            Self::Equipment => Equipment::FIELDS,
            Self::ControlPoint => ControlPoint::FIELDS,
        }
    }

    /// Look up any field of this kind, including the common ones.
    pub fn field(&self, name: &str) -> Option<FieldSpec> {
        self.fields()
            .iter()
            .chain(COMMON_FIELDS)
            .find(|spec| spec.name == name)
            .copied()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Building => "building",
            Self::Floor => "floor",
            Self::Room => "room",
            Self::Equipment => "equipment",
            Self::ControlPoint => "control_point",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "building" => Ok(Self::Building),
            "floor" => Ok(Self::Floor),
            "room" => Ok(Self::Room),
            "equipment" => Ok(Self::Equipment),
            "control_point" | "point" | "bas_point" => Ok(Self::ControlPoint),
            _ => Err(TypeError::UnknownKind(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------
// Kind-specific payloads
// ---------------------------------------------------------------

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Building {
    pub name: String,
    pub address: Option<String>,
    pub year_built: Option<i64>,
    pub gross_area_sqm: Option<f64>,
}

impl Building {
    pub const FIELDS: &'static [FieldSpec] = &[
        required("name", FieldType::Text),
        optional("address", FieldType::Text),
        optional("year_built", FieldType::Integer),
        optional("gross_area_sqm", FieldType::Number),
    ];

    fn values(&self) -> Vec<(&'static str, FieldValue)> {
        let Building {
            name,
            address,
            year_built,
            gross_area_sqm,
        } = self;
        vec![
            ("name", name.clone().into_value()),
            ("address", address.clone().into_value()),
            ("year_built", year_built.into_value()),
            ("gross_area_sqm", gross_area_sqm.into_value()),
        ]
    }

    fn set(&mut self, field: &str, value: FieldValue) -> TypeResult<()> {
        match field {
            "name" => self.name = FieldCodec::from_value(field, value)?,
            "address" => self.address = FieldCodec::from_value(field, value)?,
            "year_built" => self.year_built = FieldCodec::from_value(field, value)?,
            "gross_area_sqm" => self.gross_area_sqm = FieldCodec::from_value(field, value)?,
            _ => return Err(unknown(EntityKind::Building, field)),
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Floor {
    pub name: String,
    pub level: i64,
    pub elevation_m: Option<f64>,
}

impl Floor {
    pub const FIELDS: &'static [FieldSpec] = &[
        required("name", FieldType::Text),
        required("level", FieldType::Integer),
        optional("elevation_m", FieldType::Number),
    ];

    fn values(&self) -> Vec<(&'static str, FieldValue)> {
        let Floor {
            name,
            level,
            elevation_m,
        } = self;
        vec![
            ("name", name.clone().into_value()),
            ("level", level.into_value()),
            ("elevation_m", elevation_m.into_value()),
        ]
    }

    fn set(&mut self, field: &str, value: FieldValue) -> TypeResult<()> {
        match field {
            "name" => self.name = FieldCodec::from_value(field, value)?,
            "level" => self.level = FieldCodec::from_value(field, value)?,
            "elevation_m" => self.elevation_m = FieldCodec::from_value(field, value)?,
            _ => return Err(unknown(EntityKind::Floor, field)),
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub name: String,
    pub number: Option<String>,
    pub status: String,
    pub description: Option<String>,
    pub area_sqm: Option<f64>,
    pub occupancy: Option<i64>,
}

impl Default for Room {
    fn default() -> Self {
        Self {
            name: String::new(),
            number: None,
            status: "available".into(),
            description: None,
            area_sqm: None,
            occupancy: None,
        }
    }
}

impl Room {
    pub const FIELDS: &'static [FieldSpec] = &[
        required("name", FieldType::Text),
        optional("number", FieldType::Text),
        required("status", FieldType::Text),
        optional("description", FieldType::Text),
        optional("area_sqm", FieldType::Number),
        optional("occupancy", FieldType::Integer),
    ];

    fn values(&self) -> Vec<(&'static str, FieldValue)> {
        let Room {
            name,
            number,
            status,
            description,
            area_sqm,
            occupancy,
        } = self;
        vec![
            ("name", name.clone().into_value()),
            ("number", number.clone().into_value()),
            ("status", status.clone().into_value()),
            ("description", description.clone().into_value()),
            ("area_sqm", area_sqm.into_value()),
            ("occupancy", occupancy.into_value()),
        ]
    }

    fn set(&mut self, field: &str, value: FieldValue) -> TypeResult<()> {
        match field {
            "name" => self.name = FieldCodec::from_value(field, value)?,
            "number" => self.number = FieldCodec::from_value(field, value)?,
            "status" => self.status = FieldCodec::from_value(field, value)?,
            "description" => self.description = FieldCodec::from_value(field, value)?,
            "area_sqm" => self.area_sqm = FieldCodec::from_value(field, value)?,
            "occupancy" => self.occupancy = FieldCodec::from_value(field, value)?,
            _ => return Err(unknown(EntityKind::Room, field)),
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Equipment {
    pub name: String,
    /// Equipment category, e.g. `hvac`, `electrical`, `plumbing`.
    pub category: String,
    pub status: String,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub serial_number: Option<String>,
    pub location: Option<Point3>,
}

impl Default for Equipment {
    fn default() -> Self {
        Self {
            name: String::new(),
            category: "general".into(),
            status: "operational".into(),
            manufacturer: None,
            model: None,
            serial_number: None,
            location: None,
        }
    }
}

impl Equipment {
    pub const FIELDS: &'static [FieldSpec] = &[
        required("name", FieldType::Text),
        required("category", FieldType::Text),
        required("status", FieldType::Text),
        optional("manufacturer", FieldType::Text),
        optional("model", FieldType::Text),
        optional("serial_number", FieldType::Text),
        optional("location", FieldType::Point),
    ];

    fn values(&self) -> Vec<(&'static str, FieldValue)> {
        let Equipment {
            name,
            category,
            status,
            manufacturer,
            model,
            serial_number,
            location,
        } = self;
        vec![
            ("name", name.clone().into_value()),
            ("category", category.clone().into_value()),
            ("status", status.clone().into_value()),
            ("manufacturer", manufacturer.clone().into_value()),
            ("model", model.clone().into_value()),
            ("serial_number", serial_number.clone().into_value()),
            ("location", location.into_value()),
        ]
    }

    fn set(&mut self, field: &str, value: FieldValue) -> TypeResult<()> {
        match field {
            "name" => self.name = FieldCodec::from_value(field, value)?,
            "category" => self.category = FieldCodec::from_value(field, value)?,
            "status" => self.status = FieldCodec::from_value(field, value)?,
            "manufacturer" => self.manufacturer = FieldCodec::from_value(field, value)?,
            "model" => self.model = FieldCodec::from_value(field, value)?,
            "serial_number" => self.serial_number = FieldCodec::from_value(field, value)?,
            "location" => self.location = FieldCodec::from_value(field, value)?,
            _ => return Err(unknown(EntityKind::Equipment, field)),
        }
        Ok(())
    }
}

/// A building-automation point (sensor reading or setpoint).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ControlPoint {
    pub name: String,
    /// e.g. `analog_input`, `binary_output`.
    pub point_type: String,
    pub unit: Option<String>,
    pub value: Option<f64>,
    pub writable: bool,
}

impl Default for ControlPoint {
    fn default() -> Self {
        Self {
            name: String::new(),
            point_type: "analog_input".into(),
            unit: None,
            value: None,
            writable: false,
        }
    }
}

impl ControlPoint {
    pub const FIELDS: &'static [FieldSpec] = &[
        required("name", FieldType::Text),
        required("point_type", FieldType::Text),
        optional("unit", FieldType::Text),
        optional("value", FieldType::Number),
        required("writable", FieldType::Bool),
    ];

    fn values(&self) -> Vec<(&'static str, FieldValue)> {
        let ControlPoint {
            name,
            point_type,
            unit,
            value,
            writable,
        } = self;
        vec![
            ("name", name.clone().into_value()),
            ("point_type", point_type.clone().into_value()),
            ("unit", unit.clone().into_value()),
            ("value", value.into_value()),
            ("writable", writable.into_value()),
        ]
    }

    fn set(&mut self, field: &str, value: FieldValue) -> TypeResult<()> {
        match field {
            "name" => self.name = FieldCodec::from_value(field, value)?,
            "point_type" => self.point_type = FieldCodec::from_value(field, value)?,
            "unit" => self.unit = FieldCodec::from_value(field, value)?,
            "value" => self.value = FieldCodec::from_value(field, value)?,
            "writable" => self.writable = FieldCodec::from_value(field, value)?,
            _ => return Err(unknown(EntityKind::ControlPoint, field)),
        }
        Ok(())
    }
}

fn unknown(kind: EntityKind, field: &str) -> TypeError {
    TypeError::UnknownField {
        kind,
        field: field.to_string(),
    }
}

/// Kind-specific data of an entity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum EntityPayload {
    Building(Building),
    Floor(Floor),
    Room(Room),
    Equipment(Equipment),
    ControlPoint(ControlPoint),
}

impl EntityPayload {
    /// A payload of the given kind with default field values.
    pub fn empty(kind: EntityKind) -> Self {
        match kind {
            EntityKind::Building => Self::Building(Building::default()),
            EntityKind::Floor => Self::Floor(Floor::default()),
            EntityKind::Room => Self::Room(Room::default()),
            EntityKind::Equipment => Self::Equipment(Equipment::default()),
            EntityKind::ControlPoint => Self::ControlPoint(ControlPoint::default()),
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Building(_) => EntityKind::Building,
            Self::Floor(_) => EntityKind::Floor,
            Self::Room(_) => EntityKind::Room,
            Self::Equipment(_) => EntityKind::Equipment,
            Self::ControlPoint(_) => EntityKind::ControlPoint,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Building(b) => &b.name,
            Self::Floor(f) => &f.name,
            Self::Room(r) => &r.name,
            Self::Equipment(e) => &e.name,
            Self::ControlPoint(p) => &p.name,
        }
    }

    fn values(&self) -> Vec<(&'static str, FieldValue)> {
        match self {
            Self::Building(b) => b.values(),
            Self::Floor(f) => f.values(),
            Self::Room(r) => r.values(),
            Self::Equipment(e) => e.values(),
            Self::ControlPoint(p) => p.values(),
        }
    }

    fn set(&mut self, field: &str, value: FieldValue) -> TypeResult<()> {
        match self {
            Self::Building(b) => b.set(field, value),
            Self::Floor(f) => f.set(field, value),
            Self::Room(r) => r.set(field, value),
            Self::Equipment(e) => e.set(field, value),
            Self::ControlPoint(p) => p.set(field, value),
        }
    }
}

/// A versioned building entity.
///
/// Equality is structural: two entities are equal iff their kind, parent,
/// metadata and every typed field are equal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub parent: Option<EntityId>,
    pub payload: EntityPayload,
    pub metadata: Metadata,
}

impl Entity {
    /// Create a new entity with a fresh id.
    pub fn new(payload: EntityPayload) -> Self {
        Self::with_id(EntityId::new(), payload)
    }

    pub fn with_id(id: EntityId, payload: EntityPayload) -> Self {
        Self {
            id,
            parent: None,
            payload,
            metadata: Metadata::new(),
        }
    }

    pub fn with_parent(mut self, parent: EntityId) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn kind(&self) -> EntityKind {
        self.payload.kind()
    }

    pub fn name(&self) -> &str {
        self.payload.name()
    }

    /// Every field with its current value: kind-specific fields in
    /// declaration order, then `parent` and `metadata`.
    pub fn fields(&self) -> Vec<(&'static str, FieldValue)> {
        let mut values = self.payload.values();
        values.push((PARENT_FIELD, self.parent.into_value()));
        values.push((METADATA_FIELD, self.metadata.clone().into_value()));
        values
    }

    /// Current value of a single field.
    pub fn field(&self, name: &str) -> Option<FieldValue> {
        self.fields()
            .into_iter()
            .find(|(field, _)| *field == name)
            .map(|(_, value)| value)
    }

    /// Reject numeric fields holding NaN or an infinity. Entities built
    /// through [`Entity::set_field`] never do; struct literals might.
    pub fn check_values(&self) -> TypeResult<()> {
        match self.fields().into_iter().find(|(_, value)| !value.is_finite()) {
            Some((field, _)) => Err(TypeError::NonFinite {
                field: field.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Assign a field, checking that it exists on this kind and that the
    /// value has the declared type.
    pub fn set_field(&mut self, name: &str, value: FieldValue) -> TypeResult<()> {
        match name {
            PARENT_FIELD => self.parent = FieldCodec::from_value(name, value)?,
            METADATA_FIELD => self.metadata = FieldCodec::from_value(name, value)?,
            _ => self.payload.set(name, value)?,
        }
        Ok(())
    }
}
