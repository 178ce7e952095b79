//! Access control lists.
//!
//! ACE order inside an ACL is significant; the subject and permission sets
//! inside one ACE are not. [`normalize`] sorts those sets and [`equal`]
//! compares element by element after normalizing.
//!
//! The declared form ([`AceSpec`]) may leave `inheritance_mode` out. The wire
//! form ([`Ace`]) always carries it, resolved to
//! [`InheritanceMode::ObjectAndDescendants`] when absent.

use serde::{Deserialize, Serialize};

/// Permission tokens the store understands.
pub const PERMISSIONS: &[&str] = &[
    "read",
    "write",
    "use",
    "administer",
    "create",
    "remove",
    "mount",
    "manage",
    "modify_children",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Allow,
    Deny,
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum InheritanceMode {
    ObjectOnly,
    #[default]
    ObjectAndDescendants,
    DescendantsOnly,
    ImmediateDescendantsOnly,
}

/// A declared access control entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AceSpec {
    pub action: Action,
    pub subjects: Vec<String>,
    pub permissions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inheritance_mode: Option<InheritanceMode>,
}

/// An access control entry as the store holds it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ace {
    pub action: Action,
    pub subjects: Vec<String>,
    pub permissions: Vec<String>,
    #[serde(default)]
    pub inheritance_mode: InheritanceMode,
}

impl From<&AceSpec> for Ace {
    fn from(spec: &AceSpec) -> Self {
        Self {
            action: spec.action,
            subjects: spec.subjects.clone(),
            permissions: spec.permissions.clone(),
            inheritance_mode: spec.inheritance_mode.unwrap_or_default(),
        }
    }
}

impl From<&Ace> for AceSpec {
    fn from(ace: &Ace) -> Self {
        Self {
            action: ace.action,
            subjects: ace.subjects.clone(),
            permissions: ace.permissions.clone(),
            inheritance_mode: Some(ace.inheritance_mode),
        }
    }
}

/// Declared ACL to wire ACL, preserving ACE order.
pub fn to_wire(acl: &[AceSpec]) -> Vec<Ace> {
    acl.iter().map(Ace::from).collect()
}

/// Wire ACL to declared ACL, preserving ACE order.
pub fn from_wire(acl: &[Ace]) -> Vec<AceSpec> {
    acl.iter().map(AceSpec::from).collect()
}

/// Sort and deduplicate subjects and permissions inside every ACE.
///
/// ACEs themselves keep their order.
pub fn normalize(acl: &[Ace]) -> Vec<Ace> {
    acl.iter()
        .map(|ace| {
            let mut ace = ace.clone();
            ace.subjects.sort();
            ace.subjects.dedup();
            ace.permissions.sort();
            ace.permissions.dedup();
            ace
        })
        .collect()
}

/// Whether two ACLs grant the same thing.
pub fn equal(a: &[Ace], b: &[Ace]) -> bool {
    a.len() == b.len() && normalize(a) == normalize(b)
}

/// [`equal`] for declared ACLs, resolving default inheritance first.
pub fn equal_declared(a: &[AceSpec], b: &[AceSpec]) -> bool {
    equal(&to_wire(a), &to_wire(b))
}

/// Permission tokens outside [`PERMISSIONS`].
pub fn unknown_permissions(acl: &[AceSpec]) -> Vec<&str> {
    acl.iter()
        .flat_map(|ace| ace.permissions.iter())
        .map(String::as_str)
        .filter(|p| !PERMISSIONS.contains(p))
        .collect()
}
