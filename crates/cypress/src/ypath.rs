//! YPath addressing.
//!
//! Objects are reachable by path (`//sys/accounts/team`) and by id
//! (`#1-2-3-4`). Attributes hang off either form with `/@`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A path into the Cypress tree, optionally pointing at an attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct YPath(String);

impl YPath {
    /// Wrap an already formed path.
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// Address an object by its id.
    pub fn object(id: &str) -> Self {
        Self(format!("#{id}"))
    }

    /// `//sys/accounts`
    pub fn accounts() -> Self {
        Self::new("//sys/accounts")
    }

    /// `//sys/users`
    pub fn users() -> Self {
        Self::new("//sys/users")
    }

    /// `//sys/groups`
    pub fn groups() -> Self {
        Self::new("//sys/groups")
    }

    /// `//sys/tablet_cell_bundles`
    pub fn tablet_cell_bundles() -> Self {
        Self::new("//sys/tablet_cell_bundles")
    }

    /// `//sys/media`
    pub fn media() -> Self {
        Self::new("//sys/media")
    }

    /// `//sys/pool_trees/<tree>`
    pub fn pool_tree(tree: &str) -> Self {
        Self(format!("//sys/pool_trees/{tree}"))
    }

    /// Child node `<self>/<name>`.
    pub fn child(&self, name: &str) -> Self {
        Self(format!("{}/{name}", self.0))
    }

    /// Single attribute `<self>/@<name>`.
    ///
    /// `name` may itself be a nested path such as `resource_limits/cpu`.
    pub fn attr(&self, name: &str) -> Self {
        Self(format!("{}/@{name}", self.0))
    }

    /// The whole attribute map `<self>/@`.
    pub fn attrs(&self) -> Self {
        Self(format!("{}/@", self.0))
    }

    /// Split into the node part and the attribute part, if any.
    ///
    /// `#1-2/@acl` yields `("#1-2", Some("acl"))`, `#1-2/@` yields
    /// `("#1-2", Some(""))`.
    pub fn split_attribute(&self) -> (&str, Option<&str>) {
        match self.0.find("/@") {
            Some(pos) => (&self.0[..pos], Some(&self.0[pos + 2..])),
            None => (&self.0, None),
        }
    }

    /// The object id if this is an `#id` address.
    pub fn object_id(&self) -> Option<&str> {
        let (node, _) = self.split_attribute();
        node.strip_prefix('#')
    }

    /// Last component of the node part.
    pub fn basename(&self) -> &str {
        let (node, _) = self.split_attribute();
        node.rsplit('/').next().unwrap_or(node)
    }

    /// Borrow the path text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for YPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for YPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for YPath {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_attr() {
        let path = YPath::object("1-2-3-4").attr("tablet_cell_count");
        assert_eq!(path.as_str(), "#1-2-3-4/@tablet_cell_count");
        assert_eq!(path.object_id(), Some("1-2-3-4"));
    }

    #[test]
    fn test_split_attribute() {
        let path = YPath::accounts().child("team").attr("resource_limits/node_count");
        assert_eq!(
            path.split_attribute(),
            ("//sys/accounts/team", Some("resource_limits/node_count"))
        );

        let all = YPath::object("a").attrs();
        assert_eq!(all.split_attribute(), ("#a", Some("")));

        let plain = YPath::new("//home/project");
        assert_eq!(plain.split_attribute(), ("//home/project", None));
        assert_eq!(plain.object_id(), None);
    }

    #[test]
    fn test_basename() {
        assert_eq!(YPath::pool_tree("physical").child("research").basename(), "research");
        assert_eq!(YPath::new("//home/a/b").attr("account").basename(), "b");
    }
}
