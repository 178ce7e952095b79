//! Map nodes: plain directories in the Cypress tree.
//!
//! A node is created at its path and addressed by id afterwards. The path
//! itself cannot be changed in place. An undeclared account is inherited
//! from the parent node, so Create reads it back.

use super::{Controller, Kind, default_true, mark_managed};
use crate::acl::{self, Ace, AceSpec};
use crate::context::Context;
use crate::diff::{self, AttributeSet};
use crate::error::{Error, Result};
use cypress::{ObjectType, YPath};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapNode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    #[serde(default = "default_true")]
    pub inherit_acl: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub acl: Vec<AceSpec>,
}

#[derive(Debug, Deserialize)]
struct Wire {
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    account: Option<String>,
    #[serde(default = "default_true")]
    inherit_acl: bool,
    #[serde(default)]
    acl: Vec<Ace>,
}

impl MapNode {
    fn builder(&self) -> diff::AttributeSetBuilder {
        AttributeSet::builder(self.label())
            .required("inherit_acl", &self.inherit_acl)
            .required("acl", &acl::normalize(&acl::to_wire(&self.acl)))
            .defaulted("account", self.account.as_ref())
    }

    fn attributes(&self) -> Result<AttributeSet> {
        self.builder().build()
    }
}

impl Controller for MapNode {
    const KIND: Kind = Kind::MapNode;

    fn key(&self) -> &str {
        &self.path
    }

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn comparison_attributes(&self) -> Result<AttributeSet> {
        self.builder().required("path", &self.path).build()
    }

    fn create(&self, ctx: &Context<'_>) -> Result<Self> {
        let path = YPath::new(self.path.as_str());
        let mut attributes = self.attributes()?.to_attributes();
        mark_managed(&mut attributes);

        let id = ctx.create_node(&path, ObjectType::MapNode, &attributes)?;
        log::info!("created map node {} ({id})", self.path);

        let account = match &self.account {
            Some(account) => account.clone(),
            None => ctx.get(&path.attr("account"))?,
        };
        Ok(Self {
            id: Some(id),
            account: Some(account),
            ..self.clone()
        })
    }

    fn read(ctx: &Context<'_>, id: &str, _prior: Option<&Self>) -> Result<Self> {
        let base = YPath::object(id);
        let wire: Wire = ctx.get(&base.attrs())?;
        let path = match wire.path {
            Some(path) => path,
            None => ctx.get(&base.attr("path"))?,
        };
        Ok(Self {
            id: Some(id.to_string()),
            path,
            account: wire.account,
            inherit_acl: wire.inherit_acl,
            acl: acl::from_wire(&wire.acl),
        })
    }

    fn update(&self, ctx: &Context<'_>, observed: &Self) -> Result<Self> {
        if self.path != observed.path {
            return Err(Error::ImmutableFieldChanged {
                object: self.label(),
                field: "path",
                observed: observed.path.clone(),
                declared: self.path.clone(),
            });
        }
        let id = observed.require_id()?;
        let base = YPath::object(id);
        diff::diff(&self.attributes()?, Some(&observed.attributes()?)).apply(ctx, &base)?;
        Self::read(ctx, id, Some(self))
    }

    fn delete(&self, ctx: &Context<'_>) -> Result<()> {
        let path = YPath::new(self.path.as_str());
        ctx.remove(&path)?;
        ctx.wait_removed(&path)?;
        log::info!("deleted map node {}", self.path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acl::Action;
    use crate::resources::testing::fast;
    use cypress::{Attributes, Call, MockStore};
    use serde_json::json;

    fn node(path: &str, account: Option<&str>) -> MapNode {
        MapNode {
            id: None,
            path: path.to_string(),
            account: account.map(str::to_string),
            inherit_acl: true,
            acl: Vec::new(),
        }
    }

    #[test]
    fn test_create_reads_back_inherited_account() {
        let store = MockStore::new();
        store
            .seed_node(
                "//home",
                ObjectType::MapNode,
                Attributes::from_iter([("account".to_string(), json!("home-acc"))]),
            )
            .unwrap();
        let ctx = fast(&store);

        let created = node("//home/team", None).create(&ctx).unwrap();
        assert_eq!(created.account.as_deref(), Some("home-acc"));
        assert_eq!(
            store.calls().last(),
            Some(&Call::Get("//home/team/@account".into()))
        );
    }

    #[test]
    fn test_create_with_account_skips_read_back() {
        let store = MockStore::new();
        let ctx = fast(&store);
        let created = node("//tmp", Some("tmp")).create(&ctx).unwrap();
        assert_eq!(created.account.as_deref(), Some("tmp"));
        assert_eq!(store.calls().len(), 1);
    }

    #[test]
    fn test_read_folds_in_path() {
        let store = MockStore::new();
        let ctx = fast(&store);
        let created = node("//tmp", None).create(&ctx).unwrap();
        let read = MapNode::read(&ctx, created.id().unwrap(), None).unwrap();
        assert_eq!(read.path, "//tmp");
        assert_eq!(read.account.as_deref(), Some("sys"));
    }

    #[test]
    fn test_path_change_rejected_without_calls() {
        let store = MockStore::new();
        let ctx = fast(&store);
        let created = node("//tmp", None).create(&ctx).unwrap();
        store.clear_calls();

        let err = node("//tmp2", None).update(&ctx, &created).unwrap_err();
        assert_eq!(err.label(), "immutable_field_changed");
        assert!(err.to_string().contains("//tmp -> //tmp2"), "{err}");
        assert!(store.calls().is_empty());
    }

    #[test]
    fn test_update_writes_acl() {
        let store = MockStore::new();
        let ctx = fast(&store);
        let created = node("//tmp", None).create(&ctx).unwrap();
        let declared = MapNode {
            acl: vec![AceSpec {
                action: Action::Allow,
                subjects: vec!["devs".into()],
                permissions: vec!["write".into(), "read".into()],
                inheritance_mode: None,
            }],
            ..node("//tmp", None)
        };
        let updated = declared.update(&ctx, &created).unwrap();
        assert!(acl::equal_declared(&updated.acl, &declared.acl));
        // undeclared account is left to the store
        assert_eq!(updated.account.as_deref(), Some("sys"));
    }

    #[test]
    fn test_delete_by_path() {
        let store = MockStore::new();
        let ctx = fast(&store);
        let created = node("//tmp", None).create(&ctx).unwrap();
        store.clear_calls();
        created.delete(&ctx).unwrap();
        assert_eq!(store.calls()[0], Call::Remove("//tmp".into()));
        assert_eq!(store.count(ObjectType::MapNode), 0);
    }
}
