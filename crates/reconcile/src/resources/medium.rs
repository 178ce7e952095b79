//! Domestic media.
//!
//! Media can be created and renamed but never removed. The `config` block is
//! always written, falling back to the store defaults when undeclared, and
//! is only reported back when the caller declared it.

use super::{Controller, Kind, mark_managed};
use crate::acl::{self, Ace, AceSpec};
use crate::context::Context;
use crate::diff::{self, AttributeSet};
use crate::error::{Error, Result};
use cypress::{ObjectType, YPath};
use serde::{Deserialize, Serialize};

const UNLIMITED_PER_RACK: i64 = i32::MAX as i64;

fn unlimited_per_rack() -> i64 {
    UNLIMITED_PER_RACK
}

fn default_max_replication_factor() -> i64 {
    20
}

fn default_prefer_local_host() -> bool {
    true
}

/// Replica placement limits of a medium.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediumConfig {
    #[serde(default = "unlimited_per_rack")]
    pub max_replicas_per_rack: i64,
    #[serde(default = "unlimited_per_rack")]
    pub max_regular_replicas_per_rack: i64,
    #[serde(default = "unlimited_per_rack")]
    pub max_journal_replicas_per_rack: i64,
    #[serde(default = "unlimited_per_rack")]
    pub max_erasure_replicas_per_rack: i64,
    #[serde(default = "default_max_replication_factor")]
    pub max_replication_factor: i64,
    #[serde(default = "default_prefer_local_host")]
    pub prefer_local_host_for_dynamic_tables: bool,
}

impl Default for MediumConfig {
    fn default() -> Self {
        Self {
            max_replicas_per_rack: UNLIMITED_PER_RACK,
            max_regular_replicas_per_rack: UNLIMITED_PER_RACK,
            max_journal_replicas_per_rack: UNLIMITED_PER_RACK,
            max_erasure_replicas_per_rack: UNLIMITED_PER_RACK,
            max_replication_factor: default_max_replication_factor(),
            prefer_local_host_for_dynamic_tables: default_prefer_local_host(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Medium {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub acl: Vec<AceSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_family_whitelist: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<MediumConfig>,
}

#[derive(Debug, Deserialize)]
struct Wire {
    name: String,
    #[serde(default)]
    acl: Vec<Ace>,
    #[serde(default)]
    disk_family_whitelist: Option<Vec<String>>,
    #[serde(default)]
    config: Option<MediumConfig>,
}

impl Medium {
    fn attributes(&self) -> Result<AttributeSet> {
        AttributeSet::builder(self.label())
            .required("name", &self.name)
            .required("acl", &acl::normalize(&acl::to_wire(&self.acl)))
            .required("config", &self.config.clone().unwrap_or_default())
            .optional("disk_family_whitelist", self.disk_family_whitelist.as_ref())
            .build()
    }
}

impl Controller for Medium {
    const KIND: Kind = Kind::Medium;

    fn key(&self) -> &str {
        &self.name
    }

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn comparison_attributes(&self) -> Result<AttributeSet> {
        self.attributes()
    }

    fn create(&self, ctx: &Context<'_>) -> Result<Self> {
        let mut attributes = self.attributes()?.to_attributes();
        mark_managed(&mut attributes);
        let id = ctx.create_object(ObjectType::DomesticMedium, &attributes)?;
        log::info!("created medium {} ({id})", self.name);
        Ok(Self {
            id: Some(id),
            ..self.clone()
        })
    }

    fn read(ctx: &Context<'_>, id: &str, prior: Option<&Self>) -> Result<Self> {
        let wire: Wire = ctx.get(&YPath::object(id).attrs())?;
        let declared_config = prior.is_some_and(|p| p.config.is_some());
        Ok(Self {
            id: Some(id.to_string()),
            name: wire.name,
            acl: acl::from_wire(&wire.acl),
            disk_family_whitelist: wire.disk_family_whitelist,
            config: wire.config.filter(|_| declared_config),
        })
    }

    fn update(&self, ctx: &Context<'_>, observed: &Self) -> Result<Self> {
        let id = observed.require_id()?;
        let base = YPath::object(id);
        diff::diff(&self.attributes()?, Some(&observed.attributes()?)).apply(ctx, &base)?;
        Self::read(ctx, id, Some(self))
    }

    fn delete(&self, _ctx: &Context<'_>) -> Result<()> {
        Err(Error::Forbidden {
            object: self.label(),
            reason: "media can't be deleted after creation, only renamed".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::testing::fast;
    use cypress::{Call, MockStore};
    use serde_json::json;

    fn medium(name: &str) -> Medium {
        Medium {
            id: None,
            name: name.to_string(),
            acl: Vec::new(),
            disk_family_whitelist: None,
            config: None,
        }
    }

    #[test]
    fn test_undeclared_config_writes_defaults_and_reads_back_unset() {
        let store = MockStore::new();
        let ctx = fast(&store);
        let created = medium("ssd_blobs").create(&ctx).unwrap();

        let Call::CreateObject { attributes, .. } = &store.calls()[0] else {
            panic!("expected a create call");
        };
        assert_eq!(
            attributes["config"]["max_replicas_per_rack"],
            json!(2_147_483_647)
        );
        assert_eq!(attributes["config"]["max_replication_factor"], json!(20));

        let read = Medium::read(&ctx, created.id().unwrap(), Some(&created)).unwrap();
        assert_eq!(read.config, None);
        assert_eq!(read, created);
    }

    #[test]
    fn test_declared_config_reported() {
        let store = MockStore::new();
        let ctx = fast(&store);
        let declared = Medium {
            config: Some(MediumConfig {
                max_replication_factor: 5,
                ..MediumConfig::default()
            }),
            ..medium("ssd_blobs")
        };
        let created = declared.create(&ctx).unwrap();
        let read = Medium::read(&ctx, created.id().unwrap(), Some(&declared)).unwrap();
        assert_eq!(read.config.map(|c| c.max_replication_factor), Some(5));
    }

    #[test]
    fn test_whitelist_removed_when_dropped() {
        let store = MockStore::new();
        let ctx = fast(&store);
        let created = Medium {
            disk_family_whitelist: Some(vec!["ssd".into()]),
            ..medium("ssd_blobs")
        }
        .create(&ctx)
        .unwrap();
        store.clear_calls();

        let updated = medium("ssd_blobs").update(&ctx, &created).unwrap();
        assert_eq!(updated.disk_family_whitelist, None);
        let id = created.id().unwrap();
        assert!(
            store
                .mutations()
                .contains(&Call::Remove(format!("#{id}/@disk_family_whitelist")))
        );
    }

    #[test]
    fn test_delete_is_forbidden_without_calls() {
        let store = MockStore::new();
        let ctx = fast(&store);
        let created = medium("ssd_blobs").create(&ctx).unwrap();
        store.clear_calls();

        let err = created.delete(&ctx).unwrap_err();
        assert_eq!(err.label(), "forbidden");
        assert!(err.to_string().contains("only renamed"));
        assert!(store.calls().is_empty());
    }
}
