//! Tablet cell bundles.
//!
//! A bundle owns `tablet_cell_count` anonymous tablet cells, driven through
//! [`scale::reconcile`]. Its `node_tag_filter` is not stored on the bundle
//! but on the bundle's `default` area; a missing area and an empty filter
//! both read back as unset.

use super::{Controller, Kind, mark_managed};
use crate::acl::{self, Ace, AceSpec};
use crate::context::Context;
use crate::diff::{self, AttributeSet};
use crate::error::Result;
use crate::scale::{self, Population};
use cypress::{ObjectType, YPath};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const DEFAULT_AREA: &str = "default";

fn default_quorum() -> i64 {
    2
}

fn default_replication_factor() -> i64 {
    3
}

/// Changelog and snapshot storage settings of a bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleOptions {
    pub changelog_account: String,
    #[serde(default = "default_quorum")]
    pub changelog_write_quorum: i64,
    #[serde(default = "default_quorum")]
    pub changelog_read_quorum: i64,
    #[serde(default = "default_replication_factor")]
    pub changelog_replication_factor: i64,
    pub changelog_primary_medium: String,
    pub snapshot_account: String,
    #[serde(default = "default_replication_factor")]
    pub snapshot_replication_factor: i64,
    pub snapshot_primary_medium: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabletCellBundle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub tablet_cell_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_tag_filter: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub acl: Vec<AceSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<BundleOptions>,
}

#[derive(Debug, Deserialize)]
struct Wire {
    name: String,
    #[serde(default)]
    tablet_cell_count: u64,
    #[serde(default)]
    acl: Vec<Ace>,
    #[serde(default)]
    options: Option<BundleOptions>,
}

#[derive(Debug, Deserialize)]
struct Area {
    id: String,
    #[serde(default)]
    node_tag_filter: String,
}

impl TabletCellBundle {
    fn builder(&self) -> diff::AttributeSetBuilder {
        AttributeSet::builder(self.label())
            .required("name", &self.name)
            .required("acl", &acl::normalize(&acl::to_wire(&self.acl)))
            .defaulted("options", self.options.as_ref())
    }

    /// Update writes an empty filter to clear it.
    fn attributes(&self) -> Result<AttributeSet> {
        self.builder()
            .required(
                "node_tag_filter",
                self.node_tag_filter.as_deref().unwrap_or_default(),
            )
            .build()
    }

    fn population(&self, id: &str) -> Population {
        Population::tablet_cells(id, &self.name)
    }

    fn areas(ctx: &Context<'_>, id: &str) -> Result<BTreeMap<String, Area>> {
        Ok(ctx
            .get_optional(&YPath::object(id).attr("areas"))?
            .unwrap_or_default())
    }
}

impl Controller for TabletCellBundle {
    const KIND: Kind = Kind::TabletCellBundle;

    fn key(&self) -> &str {
        &self.name
    }

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn comparison_attributes(&self) -> Result<AttributeSet> {
        self.builder()
            .required(
                "node_tag_filter",
                self.node_tag_filter.as_deref().unwrap_or_default(),
            )
            .required("tablet_cell_count", &self.tablet_cell_count)
            .build()
    }

    fn create(&self, ctx: &Context<'_>) -> Result<Self> {
        let mut attributes = self
            .builder()
            .defaulted("node_tag_filter", self.node_tag_filter.as_ref())
            .build()?
            .to_attributes();
        mark_managed(&mut attributes);

        let id = ctx.create_object(ObjectType::TabletCellBundle, &attributes)?;
        log::info!("created tablet cell bundle {} ({id})", self.name);

        scale::reconcile(ctx, &self.population(&id), 0, self.tablet_cell_count)?;
        Ok(Self {
            id: Some(id),
            ..self.clone()
        })
    }

    fn read(ctx: &Context<'_>, id: &str, _prior: Option<&Self>) -> Result<Self> {
        let wire: Wire = ctx.get(&YPath::object(id).attrs())?;
        let node_tag_filter = Self::areas(ctx, id)?
            .remove(DEFAULT_AREA)
            .map(|area| area.node_tag_filter)
            .filter(|filter| !filter.is_empty());
        Ok(Self {
            id: Some(id.to_string()),
            name: wire.name,
            tablet_cell_count: wire.tablet_cell_count,
            node_tag_filter,
            acl: acl::from_wire(&wire.acl),
            options: wire.options,
        })
    }

    fn update(&self, ctx: &Context<'_>, observed: &Self) -> Result<Self> {
        let id = observed.require_id()?;
        let base = YPath::object(id);
        diff::diff(&self.attributes()?, Some(&observed.attributes()?)).apply(ctx, &base)?;

        // cells reference the bundle by name, so this runs after the rename
        scale::reconcile(
            ctx,
            &self.population(id),
            observed.tablet_cell_count,
            self.tablet_cell_count,
        )?;

        Self::read(ctx, id, Some(self))
    }

    fn delete(&self, ctx: &Context<'_>) -> Result<()> {
        let id = self.require_id()?;
        let base = YPath::object(id);

        let current: u64 = ctx.get(&base.attr("tablet_cell_count"))?;
        scale::reconcile(ctx, &self.population(id), current, 0)?;

        for (name, area) in Self::areas(ctx, id)? {
            log::debug!("{}: removing area {name}", self.label());
            ctx.remove(&YPath::object(&area.id))?;
        }

        ctx.remove(&base)?;
        ctx.wait_removed(&base)?;
        log::info!("deleted tablet cell bundle {}", self.name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::testing::fast;
    use cypress::{Call, MockStore};
    use serde_json::json;

    fn bundle(name: &str, cells: u64, filter: Option<&str>) -> TabletCellBundle {
        TabletCellBundle {
            id: None,
            name: name.to_string(),
            tablet_cell_count: cells,
            node_tag_filter: filter.map(str::to_string),
            acl: Vec::new(),
            options: None,
        }
    }

    #[test]
    fn test_create_scales_up_and_reads_back() {
        let store = MockStore::new();
        let ctx = fast(&store);
        let created = bundle("b", 3, Some("ssd")).create(&ctx).unwrap();
        assert_eq!(store.count(ObjectType::TabletCell), 3);

        let read = TabletCellBundle::read(&ctx, created.id().unwrap(), None).unwrap();
        assert_eq!(read, created);
    }

    #[test]
    fn test_create_without_filter_omits_it() {
        let store = MockStore::new();
        let ctx = fast(&store);
        let created = bundle("b", 0, None).create(&ctx).unwrap();
        let Call::CreateObject { attributes, .. } = &store.calls()[0] else {
            panic!("expected a create call");
        };
        assert!(!attributes.contains_key("node_tag_filter"));

        let read = TabletCellBundle::read(&ctx, created.id().unwrap(), None).unwrap();
        assert_eq!(read.node_tag_filter, None);
        assert_eq!(store.count(ObjectType::TabletCell), 0);
    }

    #[test]
    fn test_clearing_filter_writes_empty_value() {
        let store = MockStore::new();
        let ctx = fast(&store);
        let created = bundle("b", 0, Some("ssd")).create(&ctx).unwrap();
        store.clear_calls();

        let updated = bundle("b", 0, None).update(&ctx, &created).unwrap();
        assert_eq!(updated.node_tag_filter, None);
        let id = created.id().unwrap();
        assert!(
            store
                .mutations()
                .contains(&Call::Set(format!("#{id}/@node_tag_filter"), json!("")))
        );
    }

    #[test]
    fn test_missing_default_area_reads_as_unset() {
        let store = MockStore::new();
        let ctx = fast(&store);
        let created = bundle("b", 0, Some("ssd")).create(&ctx).unwrap();
        let id = created.id().unwrap();

        let areas = store.peek(&YPath::object(id).attr("areas")).unwrap();
        let area_id = areas["default"]["id"].as_str().unwrap().to_string();
        cypress::ObjectStore::remove_node(&store, &YPath::object(&area_id)).unwrap();

        let read = TabletCellBundle::read(&ctx, id, None).unwrap();
        assert_eq!(read.node_tag_filter, None);
        assert_eq!(read.name, "b");
    }

    #[test]
    fn test_empty_filter_reads_as_unset() {
        let store = MockStore::new();
        let ctx = fast(&store);
        let created = bundle("b", 0, Some("ssd")).create(&ctx).unwrap();
        let id = created.id().unwrap();

        cypress::ObjectStore::set_node(
            &store,
            &YPath::object(id).attr("node_tag_filter"),
            &json!(""),
        )
        .unwrap();

        let read = TabletCellBundle::read(&ctx, id, None).unwrap();
        assert_eq!(read.node_tag_filter, None);
    }

    #[test]
    fn test_update_writes_before_scaling() {
        let store = MockStore::new();
        let ctx = fast(&store);
        let created = bundle("b", 1, None).create(&ctx).unwrap();
        store.clear_calls();

        let updated = bundle("b2", 2, None).update(&ctx, &created).unwrap();
        assert_eq!(updated.tablet_cell_count, 2);
        assert_eq!(updated.name, "b2");

        let mutations = store.mutations();
        let rename = mutations
            .iter()
            .position(|c| c.path().is_some_and(|p| p.ends_with("/@name")))
            .unwrap();
        let grow = mutations
            .iter()
            .position(|c| matches!(c, Call::CreateObject { .. }))
            .unwrap();
        assert!(rename < grow);
        let Call::CreateObject { attributes, .. } = &mutations[grow] else {
            unreachable!()
        };
        assert_eq!(attributes.get("tablet_cell_bundle"), Some(&json!("b2")));
    }

    #[test]
    fn test_shrink_then_delete_call_sequence() {
        let store = MockStore::new();
        let ctx = fast(&store);
        let created = bundle("b", 1, None).create(&ctx).unwrap();
        let id = created.id().unwrap().to_string();
        let cell = store.peek(&YPath::object(&id).attr("tablet_cell_ids")).unwrap()[0]
            .as_str()
            .unwrap()
            .to_string();
        let area = store.peek(&YPath::object(&id).attr("areas/default/id")).unwrap();
        let area = area.as_str().unwrap().to_string();
        store.clear_calls();

        created.delete(&ctx).unwrap();
        assert_eq!(
            store.calls(),
            vec![
                Call::Get(format!("#{id}/@tablet_cell_count")),
                Call::Get(format!("#{id}/@tablet_cell_ids")),
                Call::Remove(format!("#{cell}")),
                Call::Get(format!("#{id}/@tablet_cell_count")),
                Call::Get(format!("#{id}/@areas")),
                Call::Remove(format!("#{area}")),
                Call::Remove(format!("#{id}")),
                Call::Exists(format!("#{id}")),
            ]
        );
        assert_eq!(store.count(ObjectType::TabletCellBundle), 0);
        assert_eq!(store.count(ObjectType::Area), 0);
    }

    #[test]
    fn test_delete_uses_live_count_not_snapshot() {
        let store = MockStore::new();
        let ctx = fast(&store);
        let created = bundle("b", 2, None).create(&ctx).unwrap();
        let stale = TabletCellBundle {
            tablet_cell_count: 0,
            ..created
        };
        stale.delete(&ctx).unwrap();
        assert_eq!(store.count(ObjectType::TabletCell), 0);
    }

    #[test]
    fn test_delete_with_lagging_store_waits() {
        let store = MockStore::new();
        let ctx = fast(&store);
        let created = bundle("b", 2, None).create(&ctx).unwrap();
        store.set_convergence_lag(2);
        store.clear_calls();

        created.delete(&ctx).unwrap();
        let exists = store
            .calls()
            .iter()
            .filter(|c| matches!(c, Call::Exists(_)))
            .count();
        assert_eq!(exists, 3);
    }
}
