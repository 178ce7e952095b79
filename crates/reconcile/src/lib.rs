//! # reconcile
//!
//! Converges YTsaurus objects toward a declared state.
//!
//! This crate provides the pieces every resource controller is built from,
//! plus the controllers themselves:
//!
//! ## Core Concepts
//!
//! - **AttributeSet / AttributeDiff**: typed struct-to-wire mapping and the
//!   minimal set of writes and removals between two snapshots
//! - **ACL normalizer**: order-insensitive ACE comparison
//! - **ParentResolver**: name-based parent references with a root sentinel
//! - **Scale reconciler**: grows or shrinks a population of anonymous
//!   children and waits for the owner's counter to agree
//! - **Controller**: Create/Read/Update/Delete/Import for one kind
//! - **Context**: the injected store plus the polling policy
//!
//! ## Example
//!
//! ```no_run
//! use cypress::MockStore;
//! use reconcile::{Context, Controller, TabletCellBundle};
//!
//! let store = MockStore::new();
//! let ctx = Context::new(&store);
//!
//! let declared = TabletCellBundle {
//!     id: None,
//!     name: "analytics".into(),
//!     tablet_cell_count: 4,
//!     node_tag_filter: Some("ssd".into()),
//!     acl: Vec::new(),
//!     options: None,
//! };
//! let created = declared.create(&ctx)?;
//! let observed = TabletCellBundle::read(&ctx, created.id().unwrap_or_default(), Some(&declared))?;
//! assert_eq!(observed.tablet_cell_count, 4);
//! # Ok::<(), reconcile::Error>(())
//! ```

pub mod acl;
pub mod context;
pub mod diff;
pub mod error;
pub mod poll;
pub mod reference;
pub mod resources;
pub mod scale;

pub use acl::{Ace, AceSpec, Action, InheritanceMode};
pub use context::Context;
pub use diff::{AttributeDiff, AttributeSet};
pub use error::{Error, Failure, Result};
pub use poll::{LogObserver, NoObserver, PollObserver, PollPolicy};
pub use reference::{ACCOUNT_ROOT, POOL_ROOT, ParentResolver, RootSentinel};
pub use resources::{
    Account, BundleOptions, Controller, GuaranteeType, Group, IntegralGuarantees, Kind,
    MANAGED_ATTRIBUTE, MapNode, Medium, MediumConfig, PoolMode, PoolResources, Resource,
    ResourceLimits, SchedulerPool, TabletCellBundle, User,
};
pub use scale::{Population, ScaleOutcome};
