//! Attribute diff engine.
//!
//! Each resource kind maps its declared fields onto an [`AttributeSet`]
//! through [`AttributeSetBuilder`]. Every slot records whether the field is
//! present and, when absent, whether absence must remove the attribute from
//! the store or simply leave the store default alone.
//!
//! [`diff`] yields what Update sends: every present attribute (writes are
//! idempotent, so unchanged values are re-sent) plus removals for removable
//! attributes that were observed but are no longer declared. [`changes`]
//! yields only what actually differs, which is what a plan shows.

use crate::context::Context;
use crate::error::{Error, Result};
use cypress::{Attributes, YPath};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Name of the attribute never written for the root object.
const NAME: &str = "name";

#[derive(Debug, Clone, PartialEq)]
enum Slot {
    Present(Value),
    Absent { removable: bool },
}

/// Typed-to-wire mapping of one resource snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeSet {
    entries: BTreeMap<String, Slot>,
    root: bool,
}

impl AttributeSet {
    /// Start building a set for `object` (used in error messages).
    pub fn builder(object: impl Into<String>) -> AttributeSetBuilder {
        AttributeSetBuilder {
            object: object.into(),
            set: Self::default(),
            error: None,
        }
    }

    /// Value of a present attribute.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self.entries.get(key) {
            Some(Slot::Present(value)) => Some(value),
            _ => None,
        }
    }

    /// Whether the snapshot describes the distinguished root object.
    pub fn is_root(&self) -> bool {
        self.root
    }

    /// Present attributes in key order.
    pub fn present(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().filter_map(|(key, slot)| match slot {
            Slot::Present(value) => Some((key.as_str(), value)),
            Slot::Absent { .. } => None,
        })
    }

    /// Attribute bag for a create call: present attributes only.
    pub fn to_attributes(&self) -> Attributes {
        self.present()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect()
    }
}

/// Builder for [`AttributeSet`].
///
/// Serialization failures are kept and reported by [`build`](Self::build).
#[derive(Debug)]
pub struct AttributeSetBuilder {
    object: String,
    set: AttributeSet,
    error: Option<Error>,
}

impl AttributeSetBuilder {
    fn slot(mut self, key: &str, slot: std::result::Result<Slot, serde_json::Error>) -> Self {
        match slot {
            Ok(slot) => {
                self.set.entries.insert(key.to_string(), slot);
            }
            Err(e) => {
                self.error.get_or_insert(Error::Encoding {
                    object: self.object.clone(),
                    field: key.to_string(),
                    message: e.to_string(),
                });
            }
        }
        self
    }

    /// Mark the set as describing the root object, whose name is never written.
    pub fn root_object(mut self, root: bool) -> Self {
        self.set.root = root;
        self
    }

    /// A field that always has a value.
    pub fn required<T: Serialize + ?Sized>(self, key: &str, value: &T) -> Self {
        let slot = serde_json::to_value(value).map(Slot::Present);
        self.slot(key, slot)
    }

    /// An optional field whose absence removes the attribute.
    pub fn optional<T: Serialize>(self, key: &str, value: Option<&T>) -> Self {
        let slot = match value {
            Some(value) => serde_json::to_value(value).map(Slot::Present),
            None => Ok(Slot::Absent { removable: true }),
        };
        self.slot(key, slot)
    }

    /// An optional field whose absence leaves the store default in place.
    pub fn defaulted<T: Serialize>(self, key: &str, value: Option<&T>) -> Self {
        let slot = match value {
            Some(value) => serde_json::to_value(value).map(Slot::Present),
            None => Ok(Slot::Absent { removable: false }),
        };
        self.slot(key, slot)
    }

    /// Finish, surfacing the first encoding error.
    pub fn build(self) -> Result<AttributeSet> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.set),
        }
    }
}

/// Writes and removals that move the store toward a declared snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeDiff {
    pub writes: BTreeMap<String, Value>,
    pub removals: Vec<String>,
}

impl AttributeDiff {
    /// Nothing to write and nothing to remove.
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty() && self.removals.is_empty()
    }

    /// Send every write to `<base>/@<key>`.
    pub fn apply_writes(&self, ctx: &Context<'_>, base: &YPath) -> Result<()> {
        for (key, value) in &self.writes {
            ctx.set(&base.attr(key), value)?;
        }
        Ok(())
    }

    /// Remove every attribute in the removal list.
    pub fn apply_removals(&self, ctx: &Context<'_>, base: &YPath) -> Result<()> {
        for key in &self.removals {
            ctx.remove(&base.attr(key))?;
        }
        Ok(())
    }

    /// Writes first, then removals.
    pub fn apply(&self, ctx: &Context<'_>, base: &YPath) -> Result<()> {
        self.apply_writes(ctx, base)?;
        self.apply_removals(ctx, base)
    }
}

fn removals(declared: &AttributeSet, observed: Option<&AttributeSet>) -> Vec<String> {
    let Some(observed) = observed else {
        return Vec::new();
    };
    declared
        .entries
        .iter()
        .filter(|(key, slot)| {
            matches!(slot, Slot::Absent { removable: true }) && observed.get(key).is_some()
        })
        .map(|(key, _)| key.clone())
        .collect()
}

fn writable<'a>(declared: &'a AttributeSet) -> impl Iterator<Item = (&'a str, &'a Value)> {
    declared
        .present()
        .filter(move |(key, _)| !(declared.root && *key == NAME))
}

/// Conservative diff used by Update.
///
/// Every present declared attribute is written. Removable attributes that
/// are absent in `declared` but present in `observed` are removed.
pub fn diff(declared: &AttributeSet, observed: Option<&AttributeSet>) -> AttributeDiff {
    AttributeDiff {
        writes: writable(declared)
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect(),
        removals: removals(declared, observed),
    }
}

/// Minimal diff: only writes whose value differs from `observed`.
pub fn changes(declared: &AttributeSet, observed: Option<&AttributeSet>) -> AttributeDiff {
    AttributeDiff {
        writes: writable(declared)
            .filter(|(key, value)| observed.and_then(|o| o.get(key)) != Some(*value))
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect(),
        removals: removals(declared, observed),
    }
}
