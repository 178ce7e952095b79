//! The declared resources: one array of tables per kind.
//!
//! ```toml
//! [[account]]
//! name = "analytics"
//! parent_name = "research"
//!
//! [[user]]
//! name = "alice"
//! member_of = ["analysts"]
//!
//! [[map_node]]
//! path = "//home/analytics"
//! account = "analytics"
//! ```

use anyhow::{Context, Result};
use reconcile::{
    Account, Controller, Group, Kind, MapNode, Medium, Resource, SchedulerPool, TabletCellBundle,
    User, acl,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Absolute Cypress path: `//` followed by non-empty segments.
const MAP_NODE_PATH: &str = r"^//[^/@&*\[\]{}\s]+(/[^/@&*\[\]{}\s]+)*$";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub medium: Vec<Medium>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub account: Vec<Account>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub group: Vec<Group>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub user: Vec<User>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub map_node: Vec<MapNode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tablet_cell_bundle: Vec<TabletCellBundle>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scheduler_pool: Vec<SchedulerPool>,
}

// ============================================================================
// Validation Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Issue {
    #[error("{kind} '{key}' is declared more than once")]
    DuplicateKey { kind: Kind, key: String },

    #[error("'{name}' is declared both as a user and as a group")]
    PrincipalCollision { name: String },

    #[error("{address}: unknown permission '{permission}'")]
    UnknownPermission { address: String, permission: String },

    #[error("{address}: '{path}' is not an absolute Cypress path")]
    InvalidPath { address: String, path: String },

    #[error("{address}: ids are assigned by the cluster; use `import` to adopt an object")]
    IdDeclared { address: String },

    #[error("{address}: parent chain loops back on itself")]
    ParentCycle { address: String },

    #[error("[{label}] {detail}")]
    Invalid { label: &'static str, detail: String },
}

/// Every problem found in a manifest.
#[derive(Debug, Error)]
pub struct ValidationErrors(pub Vec<Issue>);

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "manifest has {} problem(s)", self.0.len())?;
        for issue in &self.0 {
            write!(f, "\n  - {issue}")?;
        }
        Ok(())
    }
}

// ============================================================================
// Manifest Implementation
// ============================================================================

impl Manifest {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read manifest: {}", path.display()))?;
        let manifest = Self::parse(&content)
            .with_context(|| format!("Invalid manifest: {}", path.display()))?;
        log::debug!(
            "Loaded {} resource(s) from {}",
            manifest.len(),
            path.display()
        );
        Ok(manifest)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse manifest")
    }

    pub fn len(&self) -> usize {
        self.medium.len()
            + self.account.len()
            + self.group.len()
            + self.user.len()
            + self.map_node.len()
            + self.tablet_cell_bundle.len()
            + self.scheduler_pool.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All declared resources, grouped by kind.
    pub fn resources(&self) -> Vec<Resource> {
        let mut out = Vec::with_capacity(self.len());
        out.extend(self.medium.iter().cloned().map(Resource::from));
        out.extend(self.account.iter().cloned().map(Resource::from));
        out.extend(self.group.iter().cloned().map(Resource::from));
        out.extend(self.user.iter().cloned().map(Resource::from));
        out.extend(self.map_node.iter().cloned().map(Resource::from));
        out.extend(self.tablet_cell_bundle.iter().cloned().map(Resource::from));
        out.extend(self.scheduler_pool.iter().cloned().map(Resource::from));
        out
    }

    /// Check everything that can be checked without a cluster.
    pub fn validate(&self) -> Result<()> {
        let path_pattern = Regex::new(MAP_NODE_PATH).context("Invalid map node path pattern")?;
        let resources = self.resources();
        let mut issues = Vec::new();

        let mut seen = BTreeSet::new();
        for resource in &resources {
            if !seen.insert((resource.kind(), resource.key().to_string())) {
                issues.push(Issue::DuplicateKey {
                    kind: resource.kind(),
                    key: resource.key().to_string(),
                });
            }
            if resource.id().is_some() {
                issues.push(Issue::IdDeclared {
                    address: resource.address(),
                });
            }
            if let Err(err) = resource.validate() {
                let failure = err.to_failure();
                issues.push(Issue::Invalid {
                    label: failure.label,
                    detail: failure.detail,
                });
            }
        }

        for user in &self.user {
            if self.group.iter().any(|g| g.name == user.name) {
                issues.push(Issue::PrincipalCollision {
                    name: user.name.clone(),
                });
            }
        }

        for node in &self.map_node {
            if !path_pattern.is_match(&node.path) {
                issues.push(Issue::InvalidPath {
                    address: address_of(node),
                    path: node.path.clone(),
                });
            }
        }

        self.check_permissions(&mut issues);
        check_parent_cycles(&resources, &mut issues);

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationErrors(issues).into())
        }
    }

    fn check_permissions(&self, issues: &mut Vec<Issue>) {
        let acls = self
            .medium
            .iter()
            .map(|m| (address_of(m), &m.acl))
            .chain(self.account.iter().map(|a| (address_of(a), &a.acl)))
            .chain(self.map_node.iter().map(|n| (address_of(n), &n.acl)))
            .chain(
                self.tablet_cell_bundle
                    .iter()
                    .map(|b| (address_of(b), &b.acl)),
            )
            .chain(self.scheduler_pool.iter().map(|p| (address_of(p), &p.acl)));

        for (address, entries) in acls {
            for permission in acl::unknown_permissions(entries) {
                issues.push(Issue::UnknownPermission {
                    address: address.clone(),
                    permission: permission.to_string(),
                });
            }
        }
    }
}

fn address_of<C: Controller>(model: &C) -> String {
    format!("{}.{}", C::KIND, model.key())
}

/// Walk each parent chain within the manifest; revisiting a key is a loop.
fn check_parent_cycles(resources: &[Resource], issues: &mut Vec<Issue>) {
    let parents: BTreeMap<(Kind, &str), Option<&str>> = resources
        .iter()
        .map(|r| ((r.kind(), r.key()), r.parent()))
        .collect();

    for resource in resources {
        let kind = resource.kind();
        let mut visited = BTreeSet::from([resource.key()]);
        let mut next = resource.parent();
        while let Some(parent) = next {
            if !visited.insert(parent) {
                issues.push(Issue::ParentCycle {
                    address: resource.address(),
                });
                break;
            }
            next = parents.get(&(kind, parent)).copied().flatten();
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn issues(content: &str) -> Vec<Issue> {
        let manifest = Manifest::parse(content).unwrap();
        match manifest.validate() {
            Ok(()) => Vec::new(),
            Err(err) => err.downcast::<ValidationErrors>().unwrap().0,
        }
    }

    #[test]
    fn test_parse_all_kinds() {
        let manifest = Manifest::parse(
            r#"
[[medium]]
name = "ssd_blobs"

[[account]]
name = "analytics"
parent_name = "research"

[[account]]
name = "research"

[[group]]
name = "analysts"

[[user]]
name = "alice"
member_of = ["analysts"]

[[map_node]]
path = "//home/analytics"
account = "analytics"

[[tablet_cell_bundle]]
name = "analytics"
tablet_cell_count = 3
node_tag_filter = "ssd"

[[scheduler_pool]]
name = "adhoc"
pool_tree = "physical"
weight = 2.0
"#,
        )
        .unwrap();
        assert_eq!(manifest.len(), 8);
        manifest.validate().unwrap();

        let kinds: Vec<Kind> = manifest.resources().iter().map(Resource::kind).collect();
        assert_eq!(kinds.first(), Some(&Kind::Medium));
        assert_eq!(kinds.last(), Some(&Kind::SchedulerPool));
    }

    #[test]
    fn test_unknown_table_rejected() {
        assert!(Manifest::parse("[[bucket]]\nname = \"x\"").is_err());
    }

    #[test]
    fn test_duplicate_keys_reported() {
        let found = issues("[[group]]\nname = \"a\"\n[[group]]\nname = \"a\"\n");
        assert_eq!(
            found,
            vec![Issue::DuplicateKey {
                kind: Kind::Group,
                key: "a".into()
            }]
        );
    }

    #[test]
    fn test_same_name_in_different_kinds_is_fine() {
        let found = issues("[[account]]\nname = \"a\"\n[[tablet_cell_bundle]]\nname = \"a\"\n");
        assert!(found.is_empty());
    }

    #[test]
    fn test_user_group_collision() {
        let found = issues("[[group]]\nname = \"ops\"\n[[user]]\nname = \"ops\"\n");
        assert_eq!(
            found,
            vec![Issue::PrincipalCollision {
                name: "ops".into()
            }]
        );
    }

    #[test]
    fn test_bad_paths() {
        for path in ["/home", "//", "//home/", "//home//x", "home"] {
            let found = issues(&format!("[[map_node]]\npath = \"{path}\"\n"));
            assert!(
                matches!(found.as_slice(), [Issue::InvalidPath { .. }]),
                "{path}: {found:?}"
            );
        }
        assert!(issues("[[map_node]]\npath = \"//home/a-b_c.d\"\n").is_empty());
    }

    #[test]
    fn test_unknown_permission() {
        let found = issues(
            r#"
[[account]]
name = "a"
acl = [{ action = "allow", subjects = ["devs"], permissions = ["read", "fly"] }]
"#,
        );
        assert_eq!(
            found,
            vec![Issue::UnknownPermission {
                address: "account.a".into(),
                permission: "fly".into()
            }]
        );
    }

    #[test]
    fn test_declared_id_rejected() {
        let found = issues("[[group]]\nname = \"a\"\nid = \"1-2-3-4\"\n");
        assert!(matches!(found.as_slice(), [Issue::IdDeclared { .. }]));
    }

    #[test]
    fn test_controller_validation_surfaces() {
        let found = issues(
            r#"
[[scheduler_pool]]
name = "p"
pool_tree = "physical"
max_running_operation_count = 10
max_operation_count = 5
"#,
        );
        assert!(
            matches!(
                found.as_slice(),
                [Issue::Invalid {
                    label: "invalid_declaration",
                    ..
                }]
            ),
            "{found:?}"
        );
    }

    #[test]
    fn test_implicit_users_group_rejected() {
        let found = issues(
            r#"
[[group]]
name = "devs"

[[user]]
name = "alice"
member_of = ["devs", "users"]
"#,
        );
        match found.as_slice() {
            [Issue::Invalid { label, detail }] => {
                assert_eq!(*label, "invalid_declaration");
                assert!(detail.contains("users"), "{detail}");
            }
            other => panic!("unexpected issues: {other:?}"),
        }
    }

    #[test]
    fn test_parent_cycle() {
        let found = issues(
            r#"
[[account]]
name = "a"
parent_name = "b"

[[account]]
name = "b"
parent_name = "a"
"#,
        );
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|i| matches!(i, Issue::ParentCycle { .. })));
    }

    #[test]
    fn test_error_lists_every_issue() {
        let manifest =
            Manifest::parse("[[group]]\nname = \"a\"\n[[group]]\nname = \"a\"\n[[user]]\nname = \"a\"\n")
                .unwrap();
        let message = manifest.validate().unwrap_err().to_string();
        assert!(message.starts_with("manifest has 2 problem(s)"), "{message}");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ytconverge.toml");
        fs::write(&path, "[[group]]\nname = \"a\"\n").unwrap();
        let manifest = Manifest::load(&path).unwrap();
        assert_eq!(manifest.group.len(), 1);
    }
}
