//! Scheduler pools.
//!
//! Pools live in a pool tree (`//sys/pool_trees/<tree>`) and nest by
//! `parent_name`. A top-level pool's parent is `<Root>`, which the store may
//! also report as an object id. Every tuning field is optional and
//! removable: dropping it from the declaration removes the attribute so the
//! scheduler default applies again.

use super::{Controller, Kind, mark_managed};
use crate::acl::{self, Ace, AceSpec};
use crate::context::Context;
use crate::diff::{self, AttributeSet};
use crate::error::{Error, Result};
use crate::reference::{POOL_ROOT, ParentResolver, ParentWrite};
use cypress::{ObjectType, YPath};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const PARENT: ParentResolver = ParentResolver::new("parent_name", POOL_ROOT);
const POOL_TREES: &str = "//sys/pool_trees/";

const MIN_WEIGHT: f64 = 1.0;
const MIN_OPERATION_COUNT: i64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolMode {
    FairShare,
    Fifo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuaranteeType {
    #[serde(rename = "none")]
    NoGuarantee,
    Burst,
    Relaxed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolResources {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegralGuarantees {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guarantee_type: Option<GuaranteeType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_flow: Option<PoolResources>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub burst_guarantee_resources: Option<PoolResources>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerPool {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub pool_tree: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub acl: Vec<AceSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_running_operation_count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_operation_count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<PoolMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forbid_immediate_operations: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strong_guarantee_resources: Option<PoolResources>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_limits: Option<PoolResources>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integral_guarantees: Option<IntegralGuarantees>,
}

#[derive(Debug, Deserialize)]
struct Wire {
    name: String,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    parent_name: Option<String>,
    #[serde(default)]
    acl: Vec<Ace>,
    #[serde(default)]
    max_running_operation_count: Option<i64>,
    #[serde(default)]
    max_operation_count: Option<i64>,
    #[serde(default)]
    weight: Option<f64>,
    #[serde(default)]
    mode: Option<PoolMode>,
    #[serde(default)]
    forbid_immediate_operations: Option<bool>,
    #[serde(default)]
    strong_guarantee_resources: Option<PoolResources>,
    #[serde(default)]
    resource_limits: Option<PoolResources>,
    #[serde(default)]
    integral_guarantees: Option<IntegralGuarantees>,
}

/// Pool tree named by a pool path `//sys/pool_trees/<tree>/...`.
fn tree_of(path: &str) -> Option<&str> {
    let rest = path.strip_prefix(POOL_TREES)?;
    let (tree, _) = rest.split_once('/')?;
    (!tree.is_empty()).then_some(tree)
}

impl SchedulerPool {
    fn builder(&self) -> diff::AttributeSetBuilder {
        AttributeSet::builder(self.label())
            .required("name", &self.name)
            .required("acl", &acl::normalize(&acl::to_wire(&self.acl)))
            .optional(
                "max_running_operation_count",
                self.max_running_operation_count.as_ref(),
            )
            .optional("max_operation_count", self.max_operation_count.as_ref())
            .optional("weight", self.weight.as_ref())
            .optional("mode", self.mode.as_ref())
            .optional(
                "forbid_immediate_operations",
                self.forbid_immediate_operations.as_ref(),
            )
            .optional(
                "strong_guarantee_resources",
                self.strong_guarantee_resources.as_ref(),
            )
            .optional("resource_limits", self.resource_limits.as_ref())
            .optional("integral_guarantees", self.integral_guarantees.as_ref())
    }

    fn attributes(&self) -> Result<AttributeSet> {
        self.builder().build()
    }

    fn invalid(&self, reason: String) -> Error {
        Error::InvalidDeclaration {
            object: self.label(),
            reason,
        }
    }
}

impl Controller for SchedulerPool {
    const KIND: Kind = Kind::SchedulerPool;

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
        if self.pool_tree.trim().is_empty() {
            return Err(self.invalid("pool_tree must not be empty".to_string()));
        }
        for (field, value) in [
            ("max_running_operation_count", self.max_running_operation_count),
            ("max_operation_count", self.max_operation_count),
        ] {
            if let Some(value) = value
                && value < MIN_OPERATION_COUNT
            {
                return Err(self.invalid(format!(
                    "{field} must be at least {MIN_OPERATION_COUNT}, got {value}"
                )));
            }
        }
        if let (Some(running), Some(total)) =
            (self.max_running_operation_count, self.max_operation_count)
            && running > total
        {
            return Err(self.invalid(format!(
                "max_running_operation_count ({running}) must not exceed max_operation_count ({total})"
            )));
        }
        if let Some(weight) = self.weight
            && (weight.is_nan() || weight < MIN_WEIGHT)
        {
            return Err(self.invalid(format!("weight must be at least {MIN_WEIGHT}, got {weight}")));
        }
        Ok(())
    }

    fn comparison_attributes(&self) -> Result<AttributeSet> {
        self.builder()
            .required("pool_tree", &self.pool_tree)
            .optional(PARENT.field(), self.parent_name.as_ref())
            .build()
    }

    fn create(&self, ctx: &Context<'_>) -> Result<Self> {
        let mut attributes = self.attributes()?.to_attributes();
        attributes.insert("pool_tree".to_string(), Value::from(self.pool_tree.as_str()));
        if let Some(parent) = PARENT.for_create(&self.label(), self.parent_name.as_deref())? {
            attributes.insert(PARENT.field().to_string(), Value::from(parent));
        }
        mark_managed(&mut attributes);

        let id = ctx.create_object(ObjectType::SchedulerPool, &attributes)?;
        log::info!(
            "created scheduler pool {} in {} ({id})",
            self.name,
            self.pool_tree
        );
        Ok(Self {
            id: Some(id),
            ..self.clone()
        })
    }

    fn read(ctx: &Context<'_>, id: &str, prior: Option<&Self>) -> Result<Self> {
        let wire: Wire = ctx.get(&YPath::object(id).attrs())?;
        let pool_tree = wire
            .path
            .as_deref()
            .and_then(tree_of)
            .map(str::to_string)
            .or_else(|| prior.map(|p| p.pool_tree.clone()))
            .ok_or_else(|| Error::InvalidDeclaration {
                object: format!("{} {}", Self::KIND, wire.name),
                reason: format!(
                    "cannot tell the pool tree from path {:?}",
                    wire.path.as_deref().unwrap_or_default()
                ),
            })?;

        Ok(Self {
            id: Some(id.to_string()),
            name: wire.name,
            pool_tree,
            parent_name: PARENT.to_declared(wire.parent_name.as_deref()),
            acl: acl::from_wire(&wire.acl),
            max_running_operation_count: wire.max_running_operation_count,
            max_operation_count: wire.max_operation_count,
            weight: wire.weight,
            mode: wire.mode,
            forbid_immediate_operations: wire.forbid_immediate_operations,
            strong_guarantee_resources: wire.strong_guarantee_resources,
            resource_limits: wire.resource_limits,
            integral_guarantees: wire.integral_guarantees,
        })
    }

    fn update(&self, ctx: &Context<'_>, observed: &Self) -> Result<Self> {
        if self.pool_tree != observed.pool_tree {
            return Err(Error::ImmutableFieldChanged {
                object: self.label(),
                field: "pool_tree",
                observed: observed.pool_tree.clone(),
                declared: self.pool_tree.clone(),
            });
        }
        let id = observed.require_id()?;
        let base = YPath::object(id);
        let delta = diff::diff(&self.attributes()?, Some(&observed.attributes()?));

        delta.apply_writes(ctx, &base)?;
        let write = PARENT.for_update(
            &self.label(),
            self.parent_name.as_deref(),
            observed.parent_name.as_deref(),
        )?;
        if let ParentWrite::Set(parent) = write {
            ctx.set(&base.attr(PARENT.field()), &parent)?;
        }
        delta.apply_removals(ctx, &base)?;

        Self::read(ctx, id, Some(self))
    }

    fn delete(&self, ctx: &Context<'_>) -> Result<()> {
        let id = self.require_id()?;
        let path = YPath::object(id);
        let children = ctx.list(&path)?;
        if !children.is_empty() {
            return Err(Error::DependentObjectsExist {
                object: self.label(),
                dependents: children,
            });
        }

        ctx.remove(&path)?;
        ctx.wait_removed(&path)?;
        log::info!("deleted scheduler pool {}", self.name);
        Ok(())
    }
}
