//! The object store interface and its implementations.
//!
//! [`ObjectStore`] is the narrow surface the reconciler needs: node and
//! object creation, attribute get/set/remove, listing, existence checks
//! and group membership. [`http::HttpStore`] talks to a real proxy;
//! [`mock::MockStore`] keeps an in-memory tree for tests.

pub mod http;
pub mod mock;

use crate::error::{Error, Result};
use crate::types::{Attributes, ObjectType};
use crate::ypath::YPath;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Operations the reconciler performs against the cluster.
///
/// Every method is a single blocking round trip. Implementations must not
/// retry on their own; retry policy belongs to the caller.
pub trait ObjectStore: Send + Sync {
    /// Create an id-addressed object (account, user, bundle, ...).
    ///
    /// Returns the id assigned by the store.
    fn create_object(&self, kind: ObjectType, attributes: &Attributes) -> Result<String>;

    /// Create a path-addressed node.
    ///
    /// Returns the id assigned by the store.
    fn create_node(&self, path: &YPath, kind: ObjectType, attributes: &Attributes)
    -> Result<String>;

    /// Read a node, attribute or attribute map.
    fn get_node(&self, path: &YPath) -> Result<Value>;

    /// Write a node or attribute.
    fn set_node(&self, path: &YPath, value: &Value) -> Result<()>;

    /// Remove a node, object or attribute.
    fn remove_node(&self, path: &YPath) -> Result<()>;

    /// List child names of a node.
    fn list_node(&self, path: &YPath) -> Result<Vec<String>>;

    /// Check whether a node, object or attribute exists.
    fn node_exists(&self, path: &YPath) -> Result<bool>;

    /// Add `member` (a user or group name) to `group`.
    fn add_member(&self, group: &str, member: &str) -> Result<()>;

    /// Remove `member` from `group`.
    fn remove_member(&self, group: &str, member: &str) -> Result<()>;
}

/// Typed helpers on top of [`ObjectStore`].
pub trait ObjectStoreExt: ObjectStore {
    /// Read a value and deserialize it into `T`.
    fn get_as<T: DeserializeOwned>(&self, path: &YPath) -> Result<T> {
        let value = self.get_node(path)?;
        serde_json::from_value(value).map_err(|e| Error::Decode {
            path: path.to_string(),
            message: e.to_string(),
        })
    }

    /// Serialize `value` and write it.
    fn set_as<T: serde::Serialize>(&self, path: &YPath, value: &T) -> Result<()> {
        let value = serde_json::to_value(value).map_err(|e| Error::Decode {
            path: path.to_string(),
            message: e.to_string(),
        })?;
        self.set_node(path, &value)
    }
}

impl<S: ObjectStore + ?Sized> ObjectStoreExt for S {}

#[cfg(test)]
mod tests {
    use super::*;
    use mock::MockStore;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Named {
        name: String,
    }

    #[test]
    fn test_get_as_through_trait_object() {
        let mock = MockStore::new();
        let store: &dyn ObjectStore = &mock;
        let id = store
            .create_object(ObjectType::Group, &Attributes::from_iter([(
                "name".to_string(),
                Value::from("devs"),
            )]))
            .unwrap();

        let named: Named = store.get_as(&YPath::object(&id).attrs()).unwrap();
        assert_eq!(named.name, "devs");
    }

    #[test]
    fn test_get_as_decode_error_names_path() {
        let mock = MockStore::new();
        let err = mock
            .get_as::<Vec<u64>>(&YPath::accounts().child("root").attr("name"))
            .unwrap_err();
        match err {
            Error::Decode { path, .. } => assert_eq!(path, "//sys/accounts/root/@name"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
