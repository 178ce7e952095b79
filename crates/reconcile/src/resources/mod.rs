//! Resource controllers.
//!
//! Every managed kind is a model struct implementing [`Controller`]: the
//! five lifecycle operations plus the typed struct-to-wire mapping the diff
//! engine works on. [`Resource`] wraps all kinds so the boundary can hold a
//! heterogeneous list and dispatch without knowing the concrete type.

pub mod account;
pub mod group;
pub mod map_node;
pub mod medium;
pub mod scheduler_pool;
pub mod tablet_cell_bundle;
pub mod user;

pub use account::{Account, ResourceLimits};
pub use group::Group;
pub use map_node::MapNode;
pub use medium::{Medium, MediumConfig};
pub use scheduler_pool::{
    GuaranteeType, IntegralGuarantees, PoolMode, PoolResources, SchedulerPool,
};
pub use tablet_cell_bundle::{BundleOptions, TabletCellBundle};
pub use user::User;

use crate::context::Context;
use crate::diff::AttributeSet;
use crate::error::{Error, Result};
use cypress::Attributes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Custom attribute set on every object this tool creates.
pub const MANAGED_ATTRIBUTE: &str = "ytconverge_resource";

/// Managed kinds, in the order parents have to exist before children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    Medium,
    Account,
    Group,
    User,
    MapNode,
    TabletCellBundle,
    SchedulerPool,
}

impl Kind {
    pub const ALL: &'static [Self] = &[
        Self::Medium,
        Self::Account,
        Self::Group,
        Self::User,
        Self::MapNode,
        Self::TabletCellBundle,
        Self::SchedulerPool,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Medium => "medium",
            Self::Account => "account",
            Self::Group => "group",
            Self::User => "user",
            Self::MapNode => "map_node",
            Self::TabletCellBundle => "tablet_cell_bundle",
            Self::SchedulerPool => "scheduler_pool",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Kind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|k| k.as_str() == s)
            .copied()
            .ok_or_else(|| {
                let known: Vec<&str> = Self::ALL.iter().map(Self::as_str).collect();
                format!("unknown resource kind '{s}' (expected one of: {})", known.join(", "))
            })
    }
}

/// Lifecycle of one managed kind.
///
/// `self` is always the declared snapshot, except in [`delete`](Self::delete)
/// where it is the last observed one. Every operation runs to completion or
/// stops at the first error; nothing already written is rolled back.
pub trait Controller: Sized {
    const KIND: Kind;

    /// Unique key within the kind (name, or path for map nodes).
    fn key(&self) -> &str;

    /// Store id, once created or imported.
    fn id(&self) -> Option<&str>;

    /// Parent key within the same kind, if any.
    fn parent(&self) -> Option<&str> {
        None
    }

    /// Cross-field checks that need no store access.
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// Everything a plan compares, including values Update writes through
    /// other channels (parents, counts, memberships).
    fn comparison_attributes(&self) -> Result<AttributeSet>;

    fn create(&self, ctx: &Context<'_>) -> Result<Self>;

    /// Read the object with store id `id`. `prior` is the snapshot the
    /// caller last held, used for fields the store cannot report back.
    fn read(ctx: &Context<'_>, id: &str, prior: Option<&Self>) -> Result<Self>;

    /// Move the store from `observed` to `self`. Returns a fresh read.
    fn update(&self, ctx: &Context<'_>, observed: &Self) -> Result<Self>;

    fn delete(&self, ctx: &Context<'_>) -> Result<()>;

    /// Adopt an existing object by id.
    fn import(ctx: &Context<'_>, id: &str) -> Result<Self> {
        Self::read(ctx, id, None)
    }

    /// `<kind> <key>`, used in error messages.
    fn label(&self) -> String {
        format!("{} {}", Self::KIND, self.key())
    }

    /// The id, or [`Error::MissingId`].
    fn require_id(&self) -> Result<&str> {
        self.id().ok_or_else(|| Error::MissingId {
            object: self.label(),
        })
    }
}

/// Tag a create bag with [`MANAGED_ATTRIBUTE`].
pub(crate) fn mark_managed(attributes: &mut Attributes) {
    attributes.insert(MANAGED_ATTRIBUTE.to_string(), Value::Bool(true));
}

pub(crate) fn default_true() -> bool {
    true
}

// =============================================================================
// Heterogeneous wrapper
// =============================================================================

/// A declared or observed snapshot of any kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Resource {
    Medium(Medium),
    Account(Account),
    Group(Group),
    User(User),
    MapNode(MapNode),
    TabletCellBundle(TabletCellBundle),
    SchedulerPool(SchedulerPool),
}

macro_rules! each_kind {
    ($resource:expr, $model:ident => $body:expr) => {
        match $resource {
            Resource::Medium($model) => $body,
            Resource::Account($model) => $body,
            Resource::Group($model) => $body,
            Resource::User($model) => $body,
            Resource::MapNode($model) => $body,
            Resource::TabletCellBundle($model) => $body,
            Resource::SchedulerPool($model) => $body,
        }
    };
}

macro_rules! impl_from_model {
    ($($variant:ident),*) => {
        $(
            impl From<$variant> for Resource {
                fn from(model: $variant) -> Self {
                    Self::$variant(model)
                }
            }
        )*
    };
}

impl_from_model!(
    Medium,
    Account,
    Group,
    User,
    MapNode,
    TabletCellBundle,
    SchedulerPool
);

fn read_as<C: Controller + Into<Resource>>(
    ctx: &Context<'_>,
    model: &C,
) -> Result<Resource> {
    let id = model.require_id()?;
    C::read(ctx, id, Some(model)).map(Into::into)
}

impl Resource {
    pub fn kind(&self) -> Kind {
        match self {
            Self::Medium(_) => Kind::Medium,
            Self::Account(_) => Kind::Account,
            Self::Group(_) => Kind::Group,
            Self::User(_) => Kind::User,
            Self::MapNode(_) => Kind::MapNode,
            Self::TabletCellBundle(_) => Kind::TabletCellBundle,
            Self::SchedulerPool(_) => Kind::SchedulerPool,
        }
    }

    pub fn key(&self) -> &str {
        each_kind!(self, m => m.key())
    }

    pub fn id(&self) -> Option<&str> {
        each_kind!(self, m => m.id())
    }

    pub fn parent(&self) -> Option<&str> {
        each_kind!(self, m => m.parent())
    }

    /// `<kind>.<key>`, the address used by the state file and the CLI.
    pub fn address(&self) -> String {
        format!("{}.{}", self.kind(), self.key())
    }

    pub fn label(&self) -> String {
        each_kind!(self, m => m.label())
    }

    pub fn validate(&self) -> Result<()> {
        each_kind!(self, m => m.validate())
    }

    pub fn comparison_attributes(&self) -> Result<AttributeSet> {
        each_kind!(self, m => m.comparison_attributes())
    }

    pub fn create(&self, ctx: &Context<'_>) -> Result<Self> {
        each_kind!(self, m => m.create(ctx).map(Self::from))
    }

    /// Re-read this snapshot by its id.
    pub fn read(&self, ctx: &Context<'_>) -> Result<Self> {
        each_kind!(self, m => read_as(ctx, m))
    }

    /// Update toward `self` from `observed`, which must be the same kind.
    pub fn update(&self, ctx: &Context<'_>, observed: &Self) -> Result<Self> {
        match (self, observed) {
            (Self::Medium(d), Self::Medium(o)) => d.update(ctx, o).map(Self::from),
            (Self::Account(d), Self::Account(o)) => d.update(ctx, o).map(Self::from),
            (Self::Group(d), Self::Group(o)) => d.update(ctx, o).map(Self::from),
            (Self::User(d), Self::User(o)) => d.update(ctx, o).map(Self::from),
            (Self::MapNode(d), Self::MapNode(o)) => d.update(ctx, o).map(Self::from),
            (Self::TabletCellBundle(d), Self::TabletCellBundle(o)) => {
                d.update(ctx, o).map(Self::from)
            }
            (Self::SchedulerPool(d), Self::SchedulerPool(o)) => d.update(ctx, o).map(Self::from),
            _ => Err(Error::InvalidDeclaration {
                object: self.label(),
                reason: format!("cannot update from a {} snapshot", observed.kind()),
            }),
        }
    }

    pub fn delete(&self, ctx: &Context<'_>) -> Result<()> {
        each_kind!(self, m => m.delete(ctx))
    }

    /// Import the object with store id `id` as `kind`.
    pub fn import(kind: Kind, ctx: &Context<'_>, id: &str) -> Result<Self> {
        match kind {
            Kind::Medium => Medium::import(ctx, id).map(Self::from),
            Kind::Account => Account::import(ctx, id).map(Self::from),
            Kind::Group => Group::import(ctx, id).map(Self::from),
            Kind::User => User::import(ctx, id).map(Self::from),
            Kind::MapNode => MapNode::import(ctx, id).map(Self::from),
            Kind::TabletCellBundle => TabletCellBundle::import(ctx, id).map(Self::from),
            Kind::SchedulerPool => SchedulerPool::import(ctx, id).map(Self::from),
        }
    }
}
