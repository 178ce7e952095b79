//! Per-operation context handed to every controller.
//!
//! The store, the poll policy and the poll observer are injected here
//! instead of being reached through globals, so tests can run every
//! controller against a [`cypress::MockStore`] with a zero-interval policy.

use crate::error::{Error, RemoteContext, Result};
use crate::poll::{LogObserver, PollObserver, PollPolicy, poll_until};
use cypress::{Attributes, ObjectStore, ObjectStoreExt, ObjectType, YPath};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Everything a controller needs to talk to the store.
#[derive(Clone, Copy)]
pub struct Context<'a> {
    store: &'a dyn ObjectStore,
    poll: PollPolicy,
    observer: &'a dyn PollObserver,
}

impl<'a> Context<'a> {
    /// Context with the default bounded poll policy and a logging observer.
    pub fn new(store: &'a dyn ObjectStore) -> Self {
        Self {
            store,
            poll: PollPolicy::default(),
            observer: &LogObserver,
        }
    }

    #[must_use]
    pub fn with_poll(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    #[must_use]
    pub fn with_observer(mut self, observer: &'a dyn PollObserver) -> Self {
        self.observer = observer;
        self
    }

    pub fn store(&self) -> &'a dyn ObjectStore {
        self.store
    }

    pub fn poll(&self) -> &PollPolicy {
        &self.poll
    }

    // =========================================================================
    // Store calls
    // =========================================================================

    /// Read and decode a value.
    pub fn get<T: DeserializeOwned>(&self, path: &YPath) -> Result<T> {
        log::debug!("get {path}");
        self.store.get_as(path).remote("get", path)
    }

    /// Like [`get`](Self::get), but a missing node or attribute is `None`.
    pub fn get_optional<T: DeserializeOwned>(&self, path: &YPath) -> Result<Option<T>> {
        match self.get(path) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Encode and write a value.
    pub fn set<T: Serialize + ?Sized>(&self, path: &YPath, value: &T) -> Result<()> {
        let value = serde_json::to_value(value).map_err(|e| Error::Encoding {
            object: path.to_string(),
            field: path.split_attribute().1.unwrap_or_default().to_string(),
            message: e.to_string(),
        })?;
        log::debug!("set {path} = {value}");
        self.store.set_node(path, &value).remote("set", path)
    }

    pub fn remove(&self, path: &YPath) -> Result<()> {
        log::debug!("remove {path}");
        self.store.remove_node(path).remote("remove", path)
    }

    pub fn list(&self, path: &YPath) -> Result<Vec<String>> {
        log::debug!("list {path}");
        self.store.list_node(path).remote("list", path)
    }

    pub fn exists(&self, path: &YPath) -> Result<bool> {
        log::debug!("exists {path}");
        self.store.node_exists(path).remote("exists", path)
    }

    /// Create an id-addressed object and return its id.
    pub fn create_object(&self, kind: ObjectType, attributes: &Attributes) -> Result<String> {
        let name = attributes
            .get("name")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default();
        let target = if name.is_empty() {
            kind.to_string()
        } else {
            format!("{kind} {name}")
        };
        log::debug!("create {target}");
        self.store
            .create_object(kind, attributes)
            .remote("create", target)
    }

    /// Create a path-addressed node and return its id.
    pub fn create_node(
        &self,
        path: &YPath,
        kind: ObjectType,
        attributes: &Attributes,
    ) -> Result<String> {
        log::debug!("create {kind} {path}");
        self.store
            .create_node(path, kind, attributes)
            .remote("create", path)
    }

    pub fn add_member(&self, group: &str, member: &str) -> Result<()> {
        log::debug!("add member {member} to {group}");
        self.store
            .add_member(group, member)
            .remote("add_member", format!("{member} -> {group}"))
    }

    pub fn remove_member(&self, group: &str, member: &str) -> Result<()> {
        log::debug!("remove member {member} from {group}");
        self.store
            .remove_member(group, member)
            .remote("remove_member", format!("{member} -> {group}"))
    }

    // =========================================================================
    // Convergence
    // =========================================================================

    /// Poll `probe` under this context's policy and observer.
    pub fn wait_until<F>(&self, target: &str, condition: &str, probe: F) -> Result<u32>
    where
        F: FnMut() -> Result<bool>,
    {
        poll_until(&self.poll, self.observer, target, condition, probe)
    }

    /// Wait until `path` no longer exists.
    pub fn wait_removed(&self, path: &YPath) -> Result<()> {
        self.wait_until(path.as_str(), "removal", || Ok(!self.exists(path)?))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cypress::{Call, MockStore, Op};
    use serde_json::json;
    use std::time::Duration;

    fn fast(store: &MockStore) -> Context<'_> {
        Context::new(store).with_poll(PollPolicy::new(Duration::ZERO, Some(Duration::from_secs(5))))
    }

    #[test]
    fn test_get_optional_maps_not_found() {
        let store = MockStore::new();
        let ctx = fast(&store);
        let missing: Option<String> = ctx
            .get_optional(&YPath::accounts().child("nope").attr("name"))
            .unwrap();
        assert!(missing.is_none());

        let root: Option<String> = ctx
            .get_optional(&YPath::accounts().child("root").attr("name"))
            .unwrap();
        assert_eq!(root.as_deref(), Some("root"));
    }

    #[test]
    fn test_get_optional_keeps_other_errors() {
        let store = MockStore::new();
        store.fail_on(Op::Get, "root");
        let ctx = fast(&store);
        let err = ctx
            .get_optional::<String>(&YPath::accounts().child("root").attr("name"))
            .unwrap_err();
        assert_eq!(err.label(), "remote_call");
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_wait_removed_outlasts_lag() {
        let store = MockStore::new();
        let id = store
            .seed_object(
                ObjectType::Group,
                Attributes::from_iter([("name".to_string(), json!("devs"))]),
            )
            .unwrap();
        store.set_convergence_lag(2);
        let ctx = fast(&store);
        let path = YPath::object(&id);
        ctx.remove(&path).unwrap();
        ctx.wait_removed(&path).unwrap();

        let exists = store
            .calls()
            .iter()
            .filter(|c| matches!(c, Call::Exists(_)))
            .count();
        assert_eq!(exists, 3);
    }

    #[test]
    fn test_remote_error_names_created_object() {
        let store = MockStore::new();
        store.fail_on(Op::CreateObject, "group");
        let ctx = fast(&store);
        let attrs = Attributes::from_iter([("name".to_string(), json!("devs"))]);
        let err = ctx.create_object(ObjectType::Group, &attrs).unwrap_err();
        assert!(err.to_string().starts_with("create group devs:"), "{err}");
    }
}
