//! Core types shared by store implementations.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Attribute bag sent with create calls.
pub type Attributes = serde_json::Map<String, serde_json::Value>;

/// Object types the reconciler creates or inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectType {
    Account,
    User,
    Group,
    MapNode,
    TabletCellBundle,
    TabletCell,
    SchedulerPool,
    DomesticMedium,
    Area,
}

impl ObjectType {
    /// All object types.
    pub const ALL: &'static [Self] = &[
        Self::Account,
        Self::User,
        Self::Group,
        Self::MapNode,
        Self::TabletCellBundle,
        Self::TabletCell,
        Self::SchedulerPool,
        Self::DomesticMedium,
        Self::Area,
    ];

    /// Wire name of the type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Account => "account",
            Self::User => "user",
            Self::Group => "group",
            Self::MapNode => "map_node",
            Self::TabletCellBundle => "tablet_cell_bundle",
            Self::TabletCell => "tablet_cell",
            Self::SchedulerPool => "scheduler_pool",
            Self::DomesticMedium => "domestic_medium",
            Self::Area => "area",
        }
    }

    /// Whether objects of this type live at a caller-chosen path
    /// (created with `create_node`) rather than being addressed by id.
    pub fn is_node(&self) -> bool {
        matches!(self, Self::MapNode)
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|t| t.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown object type: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_type_round_trip_names() {
        for ty in ObjectType::ALL {
            assert_eq!(ty.as_str().parse::<ObjectType>().unwrap(), *ty);
        }
        assert!("table".parse::<ObjectType>().is_err());
    }

    #[test]
    fn test_object_type_serde() {
        let json = serde_json::to_string(&ObjectType::DomesticMedium).unwrap();
        assert_eq!(json, "\"domestic_medium\"");
    }
}
