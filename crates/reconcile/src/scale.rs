//! Scale-to-N reconciliation of anonymous child populations.
//!
//! Some owners (tablet cell bundles) declare only how many identical
//! children they have. [`reconcile`] creates or removes children until the
//! count matches and then polls the owner's count attribute, since the
//! store updates it asynchronously.
//!
//! Individual children are never tracked. Shrinking removes ids from the
//! front of the list the store reports, in the store's order.

use crate::context::Context;
use crate::error::Result;
use cypress::{Attributes, ObjectType, YPath};
use serde_json::Value;

/// Where a scaled population lives and how it is addressed.
#[derive(Debug, Clone)]
pub struct Population {
    /// Owner address used for count and id reads.
    pub owner: YPath,
    /// Type of each child.
    pub child_kind: ObjectType,
    /// Attribute on each child that points back at the owner.
    pub owner_attribute: &'static str,
    /// Value written to `owner_attribute`.
    pub owner_reference: String,
    /// Owner attribute reporting the live child count.
    pub count_attribute: &'static str,
    /// Owner attribute listing child ids.
    pub ids_attribute: &'static str,
}

impl Population {
    /// Tablet cells of a bundle. Cells reference their bundle by name.
    pub fn tablet_cells(bundle_id: &str, bundle_name: &str) -> Self {
        Self {
            owner: YPath::object(bundle_id),
            child_kind: ObjectType::TabletCell,
            owner_attribute: "tablet_cell_bundle",
            owner_reference: bundle_name.to_string(),
            count_attribute: "tablet_cell_count",
            ids_attribute: "tablet_cell_ids",
        }
    }

    fn count_path(&self) -> YPath {
        self.owner.attr(self.count_attribute)
    }
}

/// What a reconcile pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScaleOutcome {
    pub created: u64,
    pub removed: u64,
}

impl ScaleOutcome {
    pub fn is_noop(&self) -> bool {
        self.created == 0 && self.removed == 0
    }
}

/// Drive the population from `current` to `desired` children.
///
/// Equal counts issue no store call at all. Any failed call aborts at
/// once; calling again with a freshly read `current` resumes the work.
pub fn reconcile(
    ctx: &Context<'_>,
    population: &Population,
    current: u64,
    desired: u64,
) -> Result<ScaleOutcome> {
    let outcome = match desired.cmp(&current) {
        std::cmp::Ordering::Equal => return Ok(ScaleOutcome::default()),
        std::cmp::Ordering::Greater => grow(ctx, population, desired - current)?,
        std::cmp::Ordering::Less => shrink(ctx, population, current - desired)?,
    };

    log::info!(
        "{}: {} {current} -> {desired}",
        population.owner,
        population.count_attribute
    );

    let count_path = population.count_path();
    ctx.wait_until(
        count_path.as_str(),
        &format!("{} == {desired}", population.count_attribute),
        || Ok(ctx.get::<u64>(&count_path)? == desired),
    )?;
    Ok(outcome)
}

fn grow(ctx: &Context<'_>, population: &Population, count: u64) -> Result<ScaleOutcome> {
    let attributes = Attributes::from_iter([(
        population.owner_attribute.to_string(),
        Value::from(population.owner_reference.as_str()),
    )]);
    for _ in 0..count {
        let id = ctx.create_object(population.child_kind, &attributes)?;
        log::debug!("{}: created {} {id}", population.owner, population.child_kind);
    }
    Ok(ScaleOutcome {
        created: count,
        removed: 0,
    })
}

fn shrink(ctx: &Context<'_>, population: &Population, count: u64) -> Result<ScaleOutcome> {
    let ids: Vec<String> = ctx.get(&population.owner.attr(population.ids_attribute))?;
    let take = usize::try_from(count).unwrap_or(usize::MAX);
    if ids.len() < take {
        log::warn!(
            "{}: asked to remove {count} {}(s) but only {} listed",
            population.owner,
            population.child_kind,
            ids.len()
        );
    }

    let mut removed = 0;
    for id in ids.iter().take(take) {
        ctx.remove(&YPath::object(id))?;
        removed += 1;
    }
    Ok(ScaleOutcome {
        created: 0,
        removed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poll::PollPolicy;
    use cypress::{Call, MockStore, Op};
    use serde_json::json;
    use std::time::Duration;

    fn bundle(store: &MockStore, cells: usize) -> (String, Vec<String>) {
        let id = store
            .seed_object(
                ObjectType::TabletCellBundle,
                Attributes::from_iter([("name".to_string(), json!("b"))]),
            )
            .unwrap();
        let cells = (0..cells)
            .map(|_| {
                store
                    .seed_object(
                        ObjectType::TabletCell,
                        Attributes::from_iter([("tablet_cell_bundle".to_string(), json!("b"))]),
                    )
                    .unwrap()
            })
            .collect();
        (id, cells)
    }

    fn fast(store: &MockStore) -> Context<'_> {
        Context::new(store).with_poll(PollPolicy::new(Duration::ZERO, Some(Duration::from_secs(5))))
    }

    fn creates(calls: &[Call]) -> usize {
        calls
            .iter()
            .filter(|c| matches!(c, Call::CreateObject { kind: ObjectType::TabletCell, .. }))
            .count()
    }

    #[test]
    fn test_grow_creates_difference_and_polls() {
        let store = MockStore::new();
        let (id, _) = bundle(&store, 3);
        store.set_convergence_lag(2);
        let ctx = fast(&store);

        let outcome = reconcile(&ctx, &Population::tablet_cells(&id, "b"), 3, 7).unwrap();
        assert_eq!(outcome.created, 4);

        let calls = store.calls();
        assert_eq!(creates(&calls), 4);
        let count_path = format!("#{id}/@tablet_cell_count");
        let polls = calls
            .iter()
            .filter(|c| c.path() == Some(count_path.as_str()))
            .count();
        assert_eq!(polls, 3);
        assert_eq!(
            store.peek(&YPath::object(&id).attr("tablet_cell_count")),
            Some(json!(7))
        );
    }

    #[test]
    fn test_child_tagged_with_owner() {
        let store = MockStore::new();
        let (id, _) = bundle(&store, 0);
        reconcile(&fast(&store), &Population::tablet_cells(&id, "b"), 0, 1).unwrap();
        let Call::CreateObject { attributes, .. } = &store.calls()[0] else {
            panic!("expected a create call");
        };
        assert_eq!(attributes.get("tablet_cell_bundle"), Some(&json!("b")));
    }

    #[test]
    fn test_shrink_removes_first_listed_ids() {
        let store = MockStore::new();
        let (id, cells) = bundle(&store, 7);
        let ctx = fast(&store);

        let outcome = reconcile(&ctx, &Population::tablet_cells(&id, "b"), 7, 3).unwrap();
        assert_eq!(outcome.removed, 4);

        let removed: Vec<String> = store
            .mutations()
            .iter()
            .filter_map(|c| match c {
                Call::Remove(path) => Some(path.clone()),
                _ => None,
            })
            .collect();
        let expected: Vec<String> = cells[..4].iter().map(|c| format!("#{c}")).collect();
        assert_eq!(removed, expected);
        assert_eq!(
            store.peek(&YPath::object(&id).attr("tablet_cell_count")),
            Some(json!(3))
        );
    }

    #[test]
    fn test_equal_counts_issue_no_calls() {
        let store = MockStore::new();
        let (id, _) = bundle(&store, 5);
        let outcome = reconcile(&fast(&store), &Population::tablet_cells(&id, "b"), 5, 5).unwrap();
        assert!(outcome.is_noop());
        assert!(store.calls().is_empty());
    }

    #[test]
    fn test_failed_create_aborts_and_names_target() {
        let store = MockStore::new();
        let (id, _) = bundle(&store, 0);
        store.fail_on(Op::CreateObject, "tablet_cell");
        let err = reconcile(&fast(&store), &Population::tablet_cells(&id, "b"), 0, 3).unwrap_err();
        assert_eq!(err.label(), "remote_call");
        assert!(err.to_string().contains("tablet_cell"), "{err}");
        assert_eq!(store.calls().len(), 1);
    }

    #[test]
    fn test_poll_read_error_aborts() {
        let store = MockStore::new();
        let (id, _) = bundle(&store, 1);
        store.fail_on(Op::Get, "tablet_cell_count");
        let err = reconcile(&fast(&store), &Population::tablet_cells(&id, "b"), 1, 2).unwrap_err();
        assert_eq!(err.label(), "remote_call");
        assert_eq!(store.count(ObjectType::TabletCell), 2);
    }

    #[test]
    fn test_stuck_count_times_out() {
        let store = MockStore::new();
        let (id, _) = bundle(&store, 2);
        let ctx = Context::new(&store).with_poll(PollPolicy::new(
            Duration::from_millis(1),
            Some(Duration::from_millis(10)),
        ));
        // stale `current`: the bundle ends up with 4 cells and never reports 3
        let err = reconcile(&ctx, &Population::tablet_cells(&id, "b"), 1, 3).unwrap_err();
        assert_eq!(err.label(), "convergence_timeout");
    }
}
