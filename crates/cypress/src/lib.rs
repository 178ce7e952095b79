//! # cypress
//!
//! Blocking client for the YTsaurus Cypress object store.
//!
//! This crate provides:
//! - [`YPath`] addressing by path or `#id`, with `/@attr` suffixes
//! - the [`ObjectStore`] trait: node and object creation, attribute
//!   get/set/remove, listing, existence checks and group membership
//! - [`HttpStore`], speaking the HTTP proxy API v4
//! - [`MockStore`], an in-memory tree for tests
//!
//! ## Example
//!
//! ```no_run
//! use cypress::{HttpStore, HttpStoreConfig, ObjectStore, YPath};
//!
//! let mut config = HttpStoreConfig::from_cluster("https://proxy.example.net", false);
//! config.token = std::env::var("YT_TOKEN").ok();
//! let store = HttpStore::new(&config).expect("invalid config");
//!
//! let accounts = store.list_node(&YPath::accounts()).expect("list failed");
//! println!("{} accounts", accounts.len());
//! ```

pub mod error;
pub mod store;
pub mod types;
pub mod ypath;

pub use error::{Error, ErrorCategory, Result};
pub use store::http::{HttpStore, HttpStoreConfig};
pub use store::mock::{Call, MockStore, Op};
pub use store::{ObjectStore, ObjectStoreExt};
pub use types::{Attributes, ObjectType};
pub use ypath::YPath;
