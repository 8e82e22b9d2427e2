//! Structured merge conflicts.

use std::fmt;

use serde::{Deserialize, Serialize};

use strata_types::{CommitId, EntityId, FieldValue};

/// Why a field could not be merged automatically.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConflictKind {
    /// Both sides set the field to different values.
    Field,
    /// The source removed an entity the target modified.
    RemovedInSource,
    /// The target removed an entity the source modified.
    RemovedInTarget,
    /// The merged state would leave the entity without its container.
    MissingParent,
}

impl ConflictKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Field => "field",
            Self::RemovedInSource => "removed-in-source",
            Self::RemovedInTarget => "removed-in-target",
            Self::MissingParent => "missing-parent",
        }
    }
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One field of one entity that needs a manual decision.
///
/// `None` on a side means the entity does not exist there.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    pub entity: EntityId,
    pub field: String,
    pub kind: ConflictKind,
    pub source: Option<FieldValue>,
    pub target: Option<FieldValue>,
}

impl Conflict {
    pub fn field(
        entity: EntityId,
        field: impl Into<String>,
        source: FieldValue,
        target: FieldValue,
    ) -> Self {
        Self {
            entity,
            field: field.into(),
            kind: ConflictKind::Field,
            source: Some(source),
            target: Some(target),
        }
    }
}

fn side(value: &Option<FieldValue>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => "<removed>".into(),
    }
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} ({}): source={} target={}",
            self.entity,
            self.field,
            self.kind,
            side(&self.source),
            side(&self.target)
        )
    }
}

/// Every conflict of a failed merge, with the commits involved.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConflictReport {
    pub base: CommitId,
    pub source_tip: CommitId,
    pub target_tip: CommitId,
    /// Sorted by entity, then field.
    pub conflicts: Vec<Conflict>,
}

impl ConflictReport {
    pub fn len(&self) -> usize {
        self.conflicts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conflicts.is_empty()
    }
}

impl fmt::Display for ConflictReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} conflict(s) merging {} into {} (base {})",
            self.conflicts.len(),
            self.source_tip.short_hex(),
            self.target_tip.short_hex(),
            self.base.short_hex()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_shows_both_sides() {
        let id = EntityId::new();
        let c = Conflict::field(
            id,
            "status",
            FieldValue::Text("closed".into()),
            FieldValue::Text("open".into()),
        );
        let text = c.to_string();
        assert!(text.contains("status (field)"));
        assert!(text.contains(r#"source="closed""#));
        assert!(text.contains(r#"target="open""#));

        let removed = Conflict {
            kind: ConflictKind::RemovedInTarget,
            target: None,
            ..c
        };
        assert!(removed.to_string().contains("target=<removed>"));
    }
}
