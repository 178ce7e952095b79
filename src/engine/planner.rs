//! Plan construction: compare declared resources with tracked snapshots.
//!
//! Creates and updates run parents first: kinds in [`Kind`] order, then by
//! parent depth (accounts, pools) or path depth (map nodes). Deletes run
//! afterwards in the reverse order, so children are gone before their
//! parents and re-parented objects have moved away first.

use anyhow::{Result, bail};
use reconcile::{AttributeSet, Kind, Resource, diff};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::state::State;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Create,
    Update,
    Delete,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        })
    }
}

/// One attribute as the plan shows it.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    pub name: String,
    pub before: Option<Value>,
    pub after: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct Change {
    pub action: Action,
    pub address: String,
    pub declared: Option<Resource>,
    pub observed: Option<Resource>,
    pub fields: Vec<FieldChange>,
}

#[derive(Debug, Default)]
pub struct Plan {
    pub changes: Vec<Change>,
    pub unchanged: usize,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn count(&self, action: Action) -> usize {
        self.changes.iter().filter(|c| c.action == action).count()
    }
}

// ============================================================================
// Targets
// ============================================================================

/// `kind` or `kind.key`. The key may itself contain dots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub kind: Kind,
    pub key: Option<String>,
}

impl Target {
    pub fn parse(target: &str) -> Result<Self> {
        let (kind, key) = match target.split_once('.') {
            Some((kind, key)) => (kind, Some(key)),
            None => (target, None),
        };
        let kind = kind.parse::<Kind>().map_err(anyhow::Error::msg)?;
        if key.is_some_and(str::is_empty) {
            bail!("Empty key in target '{target}'");
        }
        Ok(Self {
            kind,
            key: key.map(str::to_string),
        })
    }

    pub fn matches(&self, resource: &Resource) -> bool {
        resource.kind() == self.kind && self.key.as_deref().is_none_or(|k| k == resource.key())
    }
}

fn selected(target: Option<&Target>, resource: &Resource) -> bool {
    target.is_none_or(|t| t.matches(resource))
}

// ============================================================================
// Ordering
// ============================================================================

/// Parents before children within one kind.
fn depth(resource: &Resource, parents: &BTreeMap<(Kind, &str), Option<&str>>) -> usize {
    if let Resource::MapNode(node) = resource {
        return node.path.split('/').filter(|s| !s.is_empty()).count();
    }

    let mut depth = 0;
    let mut next = resource.parent();
    while let Some(parent) = next {
        depth += 1;
        // a hand-edited state file may still loop
        if depth > parents.len() {
            break;
        }
        next = parents
            .get(&(resource.kind(), parent))
            .copied()
            .flatten();
    }
    depth
}

fn sort_parents_first(changes: &mut [Change], population: &[&Resource]) {
    let parents: BTreeMap<(Kind, &str), Option<&str>> = population
        .iter()
        .map(|r| ((r.kind(), r.key()), r.parent()))
        .collect();

    changes.sort_by_cached_key(|change| {
        let resource = change.declared.as_ref().or(change.observed.as_ref());
        match resource {
            Some(r) => (r.kind(), depth(r, &parents), r.key().to_string()),
            None => (Kind::Medium, 0, change.address.clone()),
        }
    });
}

// ============================================================================
// Building
// ============================================================================

fn field_changes(declared: &AttributeSet, observed: Option<&AttributeSet>) -> Vec<FieldChange> {
    let delta = diff::changes(declared, observed);
    let before = |key: &str| observed.and_then(|o| o.get(key)).cloned();

    let mut fields: Vec<FieldChange> = delta
        .writes
        .into_iter()
        .map(|(name, after)| FieldChange {
            before: before(&name),
            after: Some(after),
            name,
        })
        .collect();
    fields.extend(delta.removals.into_iter().map(|name| FieldChange {
        before: before(&name),
        after: None,
        name,
    }));
    fields.sort_by(|a, b| a.name.cmp(&b.name));
    fields
}

/// Plan converging the cluster onto `declared`.
///
/// Tracked objects missing from `declared` are deleted.
pub fn build(declared: &[Resource], state: &State, target: Option<&Target>) -> Result<Plan> {
    let mut plan = Plan::default();
    let mut upserts = Vec::new();
    let declared_addresses: BTreeSet<String> = declared.iter().map(Resource::address).collect();

    for resource in declared.iter().filter(|r| selected(target, r)) {
        let address = resource.address();
        let desired = resource.comparison_attributes()?;

        match state.get(&address) {
            None => upserts.push(Change {
                action: Action::Create,
                address,
                declared: Some(resource.clone()),
                observed: None,
                fields: field_changes(&desired, None),
            }),
            Some(observed) => {
                let fields = field_changes(&desired, Some(&observed.comparison_attributes()?));
                if fields.is_empty() {
                    plan.unchanged += 1;
                } else {
                    upserts.push(Change {
                        action: Action::Update,
                        address,
                        declared: Some(resource.clone()),
                        observed: Some(observed.clone()),
                        fields,
                    });
                }
            }
        }
    }
    sort_parents_first(&mut upserts, &declared.iter().collect::<Vec<_>>());

    let orphans: Vec<&Resource> = state
        .snapshots()
        .filter(|r| !declared_addresses.contains(&r.address()) && selected(target, r))
        .collect();

    plan.changes = upserts;
    plan.changes.extend(deletions(state, &orphans));
    Ok(plan)
}

/// Plan deleting every tracked object `target` selects.
pub fn destroy(state: &State, target: Option<&Target>) -> Plan {
    let doomed: Vec<&Resource> = state.snapshots().filter(|r| selected(target, r)).collect();
    Plan {
        changes: deletions(state, &doomed),
        unchanged: 0,
    }
}

fn deletions(state: &State, doomed: &[&Resource]) -> Vec<Change> {
    let mut changes: Vec<Change> = doomed
        .iter()
        .map(|r| Change {
            action: Action::Delete,
            address: r.address(),
            declared: None,
            observed: Some((*r).clone()),
            fields: Vec::new(),
        })
        .collect();

    let population: Vec<&Resource> = state.snapshots().collect();
    sort_parents_first(&mut changes, &population);
    changes.reverse();
    changes
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use reconcile::{Account, Group, MapNode, User};

    fn account(name: &str, parent: Option<&str>) -> Account {
        Account {
            id: None,
            name: name.to_string(),
            parent_name: parent.map(str::to_string),
            inherit_acl: true,
            acl: Vec::new(),
            resource_limits: None,
        }
    }

    fn node(path: &str) -> MapNode {
        MapNode {
            id: None,
            path: path.to_string(),
            account: None,
            inherit_acl: true,
            acl: Vec::new(),
        }
    }

    fn tracked(resource: impl Into<Resource>, id: &str, state: &mut State) {
        let mut resource: Resource = resource.into();
        match &mut resource {
            Resource::Account(a) => a.id = Some(id.into()),
            Resource::Group(g) => g.id = Some(id.into()),
            Resource::User(u) => u.id = Some(id.into()),
            Resource::MapNode(n) => n.id = Some(id.into()),
            _ => unreachable!(),
        }
        state.upsert(resource);
    }

    fn addresses(plan: &Plan) -> Vec<(Action, &str)> {
        plan.changes
            .iter()
            .map(|c| (c.action, c.address.as_str()))
            .collect()
    }

    #[test]
    fn test_target_parse() {
        assert_eq!(
            Target::parse("map_node.//home/a.b").unwrap(),
            Target {
                kind: Kind::MapNode,
                key: Some("//home/a.b".into())
            }
        );
        assert_eq!(Target::parse("group").unwrap().key, None);
        assert!(Target::parse("bucket.x").is_err());
        assert!(Target::parse("group.").is_err());
    }

    #[test]
    fn test_creates_parents_first() {
        let declared: Vec<Resource> = vec![
            node("//home/a/b").into(),
            account("leaf", Some("mid")).into(),
            node("//home").into(),
            account("mid", Some("top")).into(),
            Group {
                id: None,
                name: "g".into(),
            }
            .into(),
            account("top", None).into(),
            node("//home/a").into(),
        ];
        let plan = build(&declared, &State::default(), None).unwrap();
        assert_eq!(
            addresses(&plan),
            vec![
                (Action::Create, "account.top"),
                (Action::Create, "account.mid"),
                (Action::Create, "account.leaf"),
                (Action::Create, "group.g"),
                (Action::Create, "map_node.//home"),
                (Action::Create, "map_node.//home/a"),
                (Action::Create, "map_node.//home/a/b"),
            ]
        );
    }

    #[test]
    fn test_unchanged_is_not_planned() {
        let mut state = State::default();
        tracked(account("top", None), "1", &mut state);
        let plan = build(&[account("top", None).into()], &state, None).unwrap();
        assert!(plan.is_empty());
        assert_eq!(plan.unchanged, 1);
    }

    #[test]
    fn test_update_shows_before_and_after() {
        let mut state = State::default();
        tracked(account("child", Some("a")), "1", &mut state);
        let plan = build(&[account("child", Some("b")).into()], &state, None).unwrap();

        assert_eq!(addresses(&plan), vec![(Action::Update, "account.child")]);
        assert_eq!(
            plan.changes[0].fields,
            vec![FieldChange {
                name: "parent_name".into(),
                before: Some("a".into()),
                after: Some("b".into()),
            }]
        );
    }

    #[test]
    fn test_membership_change_is_an_update() {
        let mut state = State::default();
        tracked(
            User {
                id: None,
                name: "alice".into(),
                member_of: ["devs".to_string()].into(),
            },
            "1",
            &mut state,
        );
        let declared = User {
            id: None,
            name: "alice".into(),
            member_of: ["ops".to_string()].into(),
        };
        let plan = build(&[declared.into()], &state, None).unwrap();
        assert_eq!(plan.count(Action::Update), 1);
        assert_eq!(plan.changes[0].fields[0].name, "member_of");
    }

    #[test]
    fn test_orphans_deleted_children_first_after_upserts() {
        let mut state = State::default();
        tracked(account("top", None), "1", &mut state);
        tracked(account("mid", Some("top")), "2", &mut state);
        tracked(account("leaf", Some("mid")), "3", &mut state);

        let declared: Vec<Resource> = vec![
            account("top", None).into(),
            Group {
                id: None,
                name: "g".into(),
            }
            .into(),
        ];
        let plan = build(&declared, &state, None).unwrap();
        assert_eq!(
            addresses(&plan),
            vec![
                (Action::Create, "group.g"),
                (Action::Delete, "account.leaf"),
                (Action::Delete, "account.mid"),
            ]
        );
    }

    #[test]
    fn test_target_limits_plan() {
        let mut state = State::default();
        tracked(account("old", None), "1", &mut state);
        let declared: Vec<Resource> = vec![
            account("new", None).into(),
            Group {
                id: None,
                name: "g".into(),
            }
            .into(),
        ];
        let target = Target::parse("group").unwrap();
        let plan = build(&declared, &state, Some(&target)).unwrap();
        assert_eq!(addresses(&plan), vec![(Action::Create, "group.g")]);
    }

    #[test]
    fn test_destroy_reverses_order() {
        let mut state = State::default();
        tracked(node("//home"), "1", &mut state);
        tracked(node("//home/a"), "2", &mut state);
        tracked(account("top", None), "3", &mut state);
        let plan = destroy(&state, None);
        assert_eq!(
            addresses(&plan),
            vec![
                (Action::Delete, "map_node.//home/a"),
                (Action::Delete, "map_node.//home"),
                (Action::Delete, "account.top"),
            ]
        );
    }

    #[test]
    fn test_depth_survives_cycle_in_state() {
        let mut state = State::default();
        tracked(account("a", Some("b")), "1", &mut state);
        tracked(account("b", Some("a")), "2", &mut state);
        assert_eq!(destroy(&state, None).changes.len(), 2);
    }
}
