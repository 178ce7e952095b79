//! Accounts.
//!
//! Accounts form a tree under the distinguished `root` account. The parent
//! is referenced by name through `parent_name`; the root account itself is
//! never renamed or reparented.

use super::{Controller, Kind, default_true, mark_managed};
use crate::acl::{self, Ace, AceSpec};
use crate::context::Context;
use crate::diff::{self, AttributeSet};
use crate::error::{Error, Result};
use crate::reference::{ACCOUNT_ROOT, ParentResolver, ParentWrite};
use cypress::{ObjectType, YPath};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

const ROOT_ACCOUNT: &str = "root";
const PARENT: ParentResolver = ParentResolver::new("parent_name", ACCOUNT_ROOT);

/// Quotas of an account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    #[serde(default)]
    pub node_count: i64,
    #[serde(default)]
    pub chunk_count: i64,
    #[serde(default)]
    pub tablet_count: i64,
    #[serde(default)]
    pub tablet_static_memory: i64,
    /// Bytes per medium name. A missing medium means no quota on it.
    #[serde(default)]
    pub disk_space_per_medium: BTreeMap<String, i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_name: Option<String>,
    #[serde(default = "default_true")]
    pub inherit_acl: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub acl: Vec<AceSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_limits: Option<ResourceLimits>,
}

#[derive(Debug, Deserialize)]
struct Wire {
    name: String,
    #[serde(default)]
    parent_name: Option<String>,
    #[serde(default = "default_true")]
    inherit_acl: bool,
    #[serde(default)]
    acl: Vec<Ace>,
    #[serde(default)]
    resource_limits: Option<ResourceLimits>,
}

impl Account {
    fn is_root(&self) -> bool {
        self.name == ROOT_ACCOUNT
    }

    fn attributes(&self) -> Result<AttributeSet> {
        self.builder().build()
    }

    fn builder(&self) -> diff::AttributeSetBuilder {
        AttributeSet::builder(self.label())
            .root_object(self.is_root())
            .required("name", &self.name)
            .required("inherit_acl", &self.inherit_acl)
            .required("acl", &acl::normalize(&acl::to_wire(&self.acl)))
            .defaulted("resource_limits", self.resource_limits.as_ref())
    }
}

impl Controller for Account {
    const KIND: Kind = Kind::Account;

    fn key(&self) -> &str {
        &self.name
    }

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn parent(&self) -> Option<&str> {
        self.parent_name.as_deref()
    }

    fn validate(&self) -> Result<()> {
        PARENT.validate(&self.label(), self.parent_name.as_deref())?;
        if self.is_root() && self.parent_name.is_some() {
            return Err(Error::InvalidDeclaration {
                object: self.label(),
                reason: "the root account has no parent".to_string(),
            });
        }
        Ok(())
    }

    fn comparison_attributes(&self) -> Result<AttributeSet> {
        self.builder()
            .optional(PARENT.field(), self.parent_name.as_ref())
            .build()
    }

    fn create(&self, ctx: &Context<'_>) -> Result<Self> {
        let mut attributes = self.attributes()?.to_attributes();
        if let Some(parent) = PARENT.for_create(&self.label(), self.parent_name.as_deref())? {
            attributes.insert(PARENT.field().to_string(), Value::from(parent));
        }
        mark_managed(&mut attributes);

        let id = ctx.create_object(ObjectType::Account, &attributes)?;
        log::info!("created account {} ({id})", self.name);
        Ok(Self {
            id: Some(id),
            ..self.clone()
        })
    }

    fn read(ctx: &Context<'_>, id: &str, _prior: Option<&Self>) -> Result<Self> {
        let wire: Wire = ctx.get(&YPath::object(id).attrs())?;
        Ok(Self {
            id: Some(id.to_string()),
            name: wire.name,
            parent_name: PARENT.to_declared(wire.parent_name.as_deref()),
            inherit_acl: wire.inherit_acl,
            acl: acl::from_wire(&wire.acl),
            resource_limits: wire.resource_limits,
        })
    }

    fn update(&self, ctx: &Context<'_>, observed: &Self) -> Result<Self> {
        let id = observed.require_id()?;
        let base = YPath::object(id);
        let delta = diff::diff(&self.attributes()?, Some(&observed.attributes()?));

        delta.apply_writes(ctx, &base)?;
        if !self.is_root() {
            let write = PARENT.for_update(
                &self.label(),
                self.parent_name.as_deref(),
                observed.parent_name.as_deref(),
            )?;
            if let ParentWrite::Set(parent) = write {
                ctx.set(&base.attr(PARENT.field()), &parent)?;
            }
        }
        delta.apply_removals(ctx, &base)?;

        Self::read(ctx, id, Some(self))
    }

    fn delete(&self, ctx: &Context<'_>) -> Result<()> {
        if self.is_root() {
            return Err(Error::Forbidden {
                object: self.label(),
                reason: "the root account cannot be deleted".to_string(),
            });
        }

        let path = YPath::accounts().child(&self.name);
        let children = ctx.list(&path)?;
        if !children.is_empty() {
            return Err(Error::DependentObjectsExist {
                object: self.label(),
                dependents: children,
            });
        }

        ctx.remove(&path)?;
        ctx.wait_removed(&path)?;
        log::info!("deleted account {}", self.name);
        Ok(())
    }
}
