//! In-memory object store for testing without a cluster.
//!
//! [`MockStore`] models just enough of Cypress for reconciliation tests:
//! named objects under `//sys/...`, map nodes at arbitrary paths, tablet
//! cells owned by bundles, areas, group membership and the computed
//! attributes derived from them. Every call is recorded so tests can assert
//! exact call sequences.
//!
//! Two behaviours of a real cluster can be switched on:
//!
//! - convergence lag: after cells are added or removed, `tablet_cell_count`
//!   keeps reporting the old value for a number of reads; removed objects
//!   keep answering `exists = true` for the same number of reads;
//! - failure injection: calls of a given kind whose target contains a
//!   substring fail with a remote error.
//!
//! ```
//! use cypress::{MockStore, ObjectStore, ObjectType, YPath};
//! use serde_json::json;
//!
//! let store = MockStore::new();
//! let mut attrs = cypress::Attributes::new();
//! attrs.insert("name".into(), json!("analytics"));
//! let id = store.create_object(ObjectType::Account, &attrs).unwrap();
//!
//! let parent = store.get_node(&YPath::object(&id).attr("parent_name")).unwrap();
//! assert_eq!(parent, json!("root"));
//! ```

use crate::error::{CODE_ALREADY_EXISTS, CODE_RESOLVE_ERROR, Error, Result};
use crate::store::ObjectStore;
use crate::types::{Attributes, ObjectType};
use crate::ypath::YPath;
use serde_json::{Value, json};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Name of the account every other account descends from.
pub const ROOT_ACCOUNT: &str = "root";
/// Parent value of a top-level scheduler pool.
pub const ROOT_POOL: &str = "<Root>";
/// Account given to map nodes that neither declare one nor have a parent node.
pub const DEFAULT_NODE_ACCOUNT: &str = "sys";
/// Group every user belongs to implicitly.
pub const USERS_GROUP: &str = "users";

const READ_ONLY: &[&str] = &[
    "id",
    "type",
    "path",
    "tablet_cell_count",
    "tablet_cell_ids",
    "areas",
    "member_of",
    "members",
];

/// Kind of a store call, used to target injected failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    CreateObject,
    CreateNode,
    Get,
    Set,
    Remove,
    List,
    Exists,
    AddMember,
    RemoveMember,
}

/// A recorded store call.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    CreateObject {
        kind: ObjectType,
        attributes: Attributes,
    },
    CreateNode {
        path: String,
        kind: ObjectType,
        attributes: Attributes,
    },
    Get(String),
    Set(String, Value),
    Remove(String),
    List(String),
    Exists(String),
    AddMember {
        group: String,
        member: String,
    },
    RemoveMember {
        group: String,
        member: String,
    },
}

impl Call {
    /// The kind of this call.
    pub fn op(&self) -> Op {
        match self {
            Self::CreateObject { .. } => Op::CreateObject,
            Self::CreateNode { .. } => Op::CreateNode,
            Self::Get(_) => Op::Get,
            Self::Set(..) => Op::Set,
            Self::Remove(_) => Op::Remove,
            Self::List(_) => Op::List,
            Self::Exists(_) => Op::Exists,
            Self::AddMember { .. } => Op::AddMember,
            Self::RemoveMember { .. } => Op::RemoveMember,
        }
    }

    /// Whether the call changes the store.
    pub fn is_mutation(&self) -> bool {
        !matches!(self.op(), Op::Get | Op::List | Op::Exists)
    }

    /// Path the call addressed, if it addressed one.
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::CreateNode { path, .. }
            | Self::Get(path)
            | Self::Set(path, _)
            | Self::Remove(path)
            | Self::List(path)
            | Self::Exists(path) => Some(path),
            _ => None,
        }
    }
}

/// An object held by the mock.
#[derive(Debug, Clone)]
pub struct MockObject {
    pub id: String,
    pub kind: ObjectType,
    /// Stored (non-computed) attributes.
    pub attributes: Attributes,
    /// Path of a map node.
    pub path: Option<String>,
    /// Pool tree of a scheduler pool.
    pub tree: Option<String>,
    /// Owning bundle id of a tablet cell or area.
    pub owner: Option<String>,
    /// Members of a group.
    pub members: BTreeSet<String>,
    created: u64,
}

impl MockObject {
    fn str_attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).and_then(Value::as_str)
    }

    /// The `name` attribute.
    pub fn name(&self) -> Option<&str> {
        self.str_attr("name")
    }
}

#[derive(Debug)]
struct Failure {
    op: Op,
    target: String,
}

#[derive(Debug)]
struct Ghost {
    aliases: Vec<String>,
    remaining: u32,
}

#[derive(Debug, Default)]
struct State {
    objects: HashMap<String, MockObject>,
    seq: u64,
    calls: Vec<Call>,
    failures: Vec<Failure>,
    lag: u32,
    stale_counts: HashMap<String, (usize, u32)>,
    ghosts: Vec<Ghost>,
}

/// In-memory [`ObjectStore`].
///
/// Cloning yields a handle to the same tree.
#[derive(Debug, Clone)]
pub struct MockStore {
    state: Arc<Mutex<State>>,
}

impl Default for MockStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MockStore {
    /// Create a store holding only the root account.
    pub fn new() -> Self {
        let store = Self {
            state: Arc::default(),
        };
        store.lock().insert(
            ObjectType::Account,
            Attributes::from_iter([("name".to_string(), json!(ROOT_ACCOUNT))]),
            None,
        );
        store
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // =========================================================================
    // Test helpers (not recorded)
    // =========================================================================

    /// Create an object without recording the call.
    pub fn seed_object(&self, kind: ObjectType, attributes: Attributes) -> Result<String> {
        self.lock().create_object(kind, attributes)
    }

    /// Create a node without recording the call.
    pub fn seed_node(&self, path: &str, kind: ObjectType, attributes: Attributes) -> Result<String> {
        self.lock().create_node(path, kind, attributes)
    }

    /// Add a group member without recording the call.
    pub fn seed_member(&self, group: &str, member: &str) -> Result<()> {
        self.lock().add_member(group, member)
    }

    /// Look up an object by id.
    pub fn object(&self, id: &str) -> Option<MockObject> {
        self.lock().objects.get(id).cloned()
    }

    /// Id of the named object of a kind.
    pub fn id_of(&self, kind: ObjectType, name: &str) -> Option<String> {
        self.lock().find_named(&[kind], name).map(|o| o.id.clone())
    }

    /// Number of objects of a kind.
    pub fn count(&self, kind: ObjectType) -> usize {
        self.lock().objects.values().filter(|o| o.kind == kind).count()
    }

    /// Read a value without recording the call or consuming lag.
    pub fn peek(&self, path: &YPath) -> Option<Value> {
        self.lock().get(path, false).ok()
    }

    /// Every call made so far.
    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// Only the calls that changed the store.
    pub fn mutations(&self) -> Vec<Call> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.is_mutation())
            .cloned()
            .collect()
    }

    /// Forget recorded calls.
    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Make count and existence changes visible only after `reads` reads.
    pub fn set_convergence_lag(&self, reads: u32) {
        self.lock().lag = reads;
    }

    /// Fail every `op` call whose target contains `target`.
    pub fn fail_on(&self, op: Op, target: impl Into<String>) {
        self.lock().failures.push(Failure {
            op,
            target: target.into(),
        });
    }

    /// Remove all injected failures.
    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    fn begin(&self, call: Call, target: &str) -> Result<MutexGuard<'_, State>> {
        let mut state = self.lock();
        let op = call.op();
        log::debug!("mock {call:?}");
        state.calls.push(call);
        if state
            .failures
            .iter()
            .any(|f| f.op == op && target.contains(&f.target))
        {
            return Err(Error::remote(1, format!("injected failure: {op:?} {target}")));
        }
        Ok(state)
    }
}

fn not_found(what: &str) -> Error {
    Error::remote(CODE_RESOLVE_ERROR, format!("Error resolving path {what}"))
}

fn lookup<'a>(attributes: &'a Attributes, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('/');
    let mut current = attributes.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn set_nested(target: &mut Value, path: &str, value: Value) -> bool {
    let mut segments: Vec<&str> = path.split('/').collect();
    let Some(last) = segments.pop() else {
        return false;
    };
    let mut current = target;
    for segment in segments {
        match current.as_object_mut().and_then(|m| m.get_mut(segment)) {
            Some(next) => current = next,
            None => return false,
        }
    }
    match current.as_object_mut() {
        Some(map) => {
            map.insert(last.to_string(), value);
            true
        }
        None => false,
    }
}

fn remove_nested(target: &mut Value, path: &str) -> bool {
    let mut segments: Vec<&str> = path.split('/').collect();
    let Some(last) = segments.pop() else {
        return false;
    };
    let mut current = target;
    for segment in segments {
        match current.as_object_mut().and_then(|m| m.get_mut(segment)) {
            Some(next) => current = next,
            None => return false,
        }
    }
    current
        .as_object_mut()
        .is_some_and(|map| map.remove(last).is_some())
}

fn namespace(kind: ObjectType) -> &'static [ObjectType] {
    match kind {
        ObjectType::User | ObjectType::Group => &[ObjectType::User, ObjectType::Group],
        ObjectType::Account => &[ObjectType::Account],
        ObjectType::TabletCellBundle => &[ObjectType::TabletCellBundle],
        ObjectType::DomesticMedium => &[ObjectType::DomesticMedium],
        _ => &[],
    }
}

impl State {
    fn insert(
        &mut self,
        kind: ObjectType,
        attributes: Attributes,
        path: Option<String>,
    ) -> String {
        self.seq += 1;
        let code = ObjectType::ALL
            .iter()
            .position(|k| *k == kind)
            .unwrap_or_default()
            + 0x100;
        let id = format!(
            "{:x}-{:x}-{code:x}-3e8",
            self.seq,
            self.seq.wrapping_mul(0x9e37) & 0xffff
        );
        self.objects.insert(
            id.clone(),
            MockObject {
                id: id.clone(),
                kind,
                attributes,
                path,
                tree: None,
                owner: None,
                members: BTreeSet::new(),
                created: self.seq,
            },
        );
        id
    }

    fn find_named(&self, kinds: &[ObjectType], name: &str) -> Option<&MockObject> {
        self.objects
            .values()
            .find(|o| kinds.contains(&o.kind) && o.name() == Some(name))
    }

    fn find_pool(&self, tree: &str, name: &str) -> Option<&MockObject> {
        self.objects.values().find(|o| {
            o.kind == ObjectType::SchedulerPool
                && o.tree.as_deref() == Some(tree)
                && o.name() == Some(name)
        })
    }

    fn resolve(&self, node: &str) -> Option<String> {
        if let Some(id) = node.strip_prefix('#') {
            return self.objects.contains_key(id).then(|| id.to_string());
        }
        let named = |prefix: &str, kind: ObjectType| -> Option<String> {
            let rest = node.strip_prefix(prefix)?;
            if rest.is_empty() || rest.contains('/') {
                return None;
            }
            self.find_named(&[kind], rest).map(|o| o.id.clone())
        };
        named("//sys/accounts/", ObjectType::Account)
            .or_else(|| named("//sys/users/", ObjectType::User))
            .or_else(|| named("//sys/groups/", ObjectType::Group))
            .or_else(|| named("//sys/tablet_cell_bundles/", ObjectType::TabletCellBundle))
            .or_else(|| named("//sys/media/", ObjectType::DomesticMedium))
            .or_else(|| {
                let rest = node.strip_prefix("//sys/pool_trees/")?;
                let (tree, pools) = rest.split_once('/')?;
                let name = pools.rsplit('/').next()?;
                self.find_pool(tree, name).map(|o| o.id.clone())
            })
            .or_else(|| {
                self.objects
                    .values()
                    .find(|o| o.kind == ObjectType::MapNode && o.path.as_deref() == Some(node))
                    .map(|o| o.id.clone())
            })
    }

    fn is_namespace_root(node: &str) -> bool {
        matches!(
            node,
            "//sys/accounts"
                | "//sys/users"
                | "//sys/groups"
                | "//sys/tablet_cell_bundles"
                | "//sys/media"
        ) || node
            .strip_prefix("//sys/pool_trees/")
            .is_some_and(|tree| !tree.is_empty() && !tree.contains('/'))
    }

    fn cells_of(&self, bundle_id: &str) -> Vec<&MockObject> {
        let mut cells: Vec<_> = self
            .objects
            .values()
            .filter(|o| o.kind == ObjectType::TabletCell && o.owner.as_deref() == Some(bundle_id))
            .collect();
        cells.sort_by_key(|o| o.created);
        cells
    }

    fn areas_of(&self, bundle_id: &str) -> Vec<&MockObject> {
        let mut areas: Vec<_> = self
            .objects
            .values()
            .filter(|o| o.kind == ObjectType::Area && o.owner.as_deref() == Some(bundle_id))
            .collect();
        areas.sort_by_key(|o| o.created);
        areas
    }

    fn pool_path(&self, pool: &MockObject) -> String {
        let tree = pool.tree.clone().unwrap_or_default();
        let mut segments = vec![pool.name().unwrap_or_default().to_string()];
        let mut parent = pool.str_attr("parent_name");
        while let Some(name) = parent.filter(|p| *p != ROOT_POOL) {
            if segments.len() > 64 {
                break;
            }
            match self.find_pool(&tree, name) {
                Some(next) => {
                    segments.push(name.to_string());
                    parent = next.str_attr("parent_name");
                }
                None => break,
            }
        }
        segments.reverse();
        format!("//sys/pool_trees/{tree}/{}", segments.join("/"))
    }

    fn named_path(&self, object: &MockObject) -> Option<String> {
        let name = object.name();
        match object.kind {
            ObjectType::Account => name.map(|n| format!("//sys/accounts/{n}")),
            ObjectType::User => name.map(|n| format!("//sys/users/{n}")),
            ObjectType::Group => name.map(|n| format!("//sys/groups/{n}")),
            ObjectType::TabletCellBundle => name.map(|n| format!("//sys/tablet_cell_bundles/{n}")),
            ObjectType::DomesticMedium => name.map(|n| format!("//sys/media/{n}")),
            ObjectType::SchedulerPool => Some(self.pool_path(object)),
            ObjectType::MapNode => object.path.clone(),
            _ => None,
        }
    }

    /// Stored plus computed attributes. Opaque attributes are only included
    /// when asked for by name.
    fn view(&self, object: &MockObject, opaque: bool) -> Attributes {
        let mut attrs = object.attributes.clone();
        attrs.insert("id".into(), json!(object.id));
        attrs.insert("type".into(), json!(object.kind.as_str()));
        match object.kind {
            ObjectType::Account | ObjectType::SchedulerPool => {
                if let Some(path) = self.named_path(object) {
                    attrs.insert("path".into(), json!(path));
                }
            }
            ObjectType::MapNode => {
                if opaque && let Some(path) = &object.path {
                    attrs.insert("path".into(), json!(path));
                }
            }
            ObjectType::TabletCellBundle => {
                let cells = self.cells_of(&object.id);
                let areas = self.areas_of(&object.id);
                let filter = areas
                    .iter()
                    .find(|a| a.name() == Some("default"))
                    .and_then(|a| a.str_attr("node_tag_filter"))
                    .unwrap_or_default();
                attrs.insert("tablet_cell_count".into(), json!(cells.len()));
                attrs.insert("node_tag_filter".into(), json!(filter));
                if opaque {
                    let ids: Vec<&str> = cells.iter().map(|c| c.id.as_str()).collect();
                    attrs.insert("tablet_cell_ids".into(), json!(ids));
                    let mut by_name = Attributes::new();
                    for area in areas {
                        let name = area.name().unwrap_or_default();
                        let cell_count = if name == "default" { cells.len() } else { 0 };
                        by_name.insert(
                            name.to_string(),
                            json!({
                                "id": area.id,
                                "cell_count": cell_count,
                                "node_tag_filter": area.str_attr("node_tag_filter").unwrap_or_default(),
                            }),
                        );
                    }
                    attrs.insert("areas".into(), Value::Object(by_name));
                }
            }
            ObjectType::User => {
                let name = object.name().unwrap_or_default();
                let mut groups: BTreeSet<&str> = self
                    .objects
                    .values()
                    .filter(|o| o.kind == ObjectType::Group && o.members.contains(name))
                    .filter_map(MockObject::name)
                    .collect();
                groups.insert(USERS_GROUP);
                attrs.insert("member_of".into(), json!(groups));
            }
            ObjectType::Group => {
                attrs.insert("members".into(), json!(object.members));
            }
            _ => {}
        }
        attrs
    }

    fn note_count_change(&mut self, bundle_id: &str) {
        if self.lag == 0 || self.stale_counts.contains_key(bundle_id) {
            return;
        }
        let current = self.cells_of(bundle_id).len();
        self.stale_counts
            .insert(bundle_id.to_string(), (current, self.lag));
    }

    fn check_unique(&self, kind: ObjectType, name: &str, except: Option<&str>) -> Result<()> {
        let clash = self.objects.values().any(|o| {
            namespace(kind).contains(&o.kind)
                && o.name() == Some(name)
                && Some(o.id.as_str()) != except
        });
        if clash {
            return Err(Error::remote(
                CODE_ALREADY_EXISTS,
                format!("{kind} {name:?} already exists"),
            ));
        }
        Ok(())
    }

    // =========================================================================
    // Operations
    // =========================================================================

    fn create_object(&mut self, kind: ObjectType, mut attributes: Attributes) -> Result<String> {
        let name = attributes
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string);

        match kind {
            ObjectType::TabletCell => {
                let bundle = attributes
                    .get("tablet_cell_bundle")
                    .and_then(Value::as_str)
                    .ok_or_else(|| Error::remote(1, "tablet_cell_bundle attribute is required"))?;
                let bundle_id = self
                    .find_named(&[ObjectType::TabletCellBundle], bundle)
                    .map(|o| o.id.clone())
                    .ok_or_else(|| not_found(&format!("//sys/tablet_cell_bundles/{bundle}")))?;
                self.note_count_change(&bundle_id);
                let id = self.insert(kind, attributes, None);
                if let Some(cell) = self.objects.get_mut(&id) {
                    cell.owner = Some(bundle_id);
                }
                return Ok(id);
            }
            ObjectType::Area => {
                let bundle_id = attributes
                    .get("cell_bundle_id")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| Error::remote(1, "cell_bundle_id attribute is required"))?;
                let id = self.insert(kind, attributes, None);
                if let Some(area) = self.objects.get_mut(&id) {
                    area.owner = Some(bundle_id);
                }
                return Ok(id);
            }
            ObjectType::MapNode => {
                return Err(Error::remote(1, "map nodes are created with create_node"));
            }
            _ => {}
        }

        let name = name.ok_or_else(|| Error::remote(1, format!("{kind} requires a name")))?;

        match kind {
            ObjectType::SchedulerPool => {
                let tree = attributes
                    .remove("pool_tree")
                    .and_then(|v| v.as_str().map(str::to_string))
                    .ok_or_else(|| Error::remote(1, "pool_tree attribute is required"))?;
                if self.find_pool(&tree, &name).is_some() {
                    return Err(Error::remote(
                        CODE_ALREADY_EXISTS,
                        format!("pool {name:?} already exists in tree {tree:?}"),
                    ));
                }
                let parent = attributes
                    .get("parent_name")
                    .and_then(Value::as_str)
                    .unwrap_or(ROOT_POOL)
                    .to_string();
                if parent != ROOT_POOL && self.find_pool(&tree, &parent).is_none() {
                    return Err(not_found(&format!("//sys/pool_trees/{tree}/{parent}")));
                }
                attributes.insert("parent_name".into(), json!(parent));
                let id = self.insert(kind, attributes, None);
                if let Some(pool) = self.objects.get_mut(&id) {
                    pool.tree = Some(tree);
                }
                return Ok(id);
            }
            ObjectType::Account => {
                self.check_unique(kind, &name, None)?;
                let parent = attributes
                    .get("parent_name")
                    .and_then(Value::as_str)
                    .unwrap_or(ROOT_ACCOUNT)
                    .to_string();
                if self.find_named(&[ObjectType::Account], &parent).is_none() {
                    return Err(not_found(&format!("//sys/accounts/{parent}")));
                }
                attributes.insert("parent_name".into(), json!(parent));
            }
            _ => self.check_unique(kind, &name, None)?,
        }

        let filter = if kind == ObjectType::TabletCellBundle {
            Some(
                attributes
                    .remove("node_tag_filter")
                    .and_then(|v| v.as_str().map(str::to_string))
                    .unwrap_or_default(),
            )
        } else {
            None
        };

        let id = self.insert(kind, attributes, None);

        if let Some(filter) = filter {
            let area = Attributes::from_iter([
                ("name".to_string(), json!("default")),
                ("cell_bundle_id".to_string(), json!(id)),
                ("node_tag_filter".to_string(), json!(filter)),
            ]);
            self.create_object(ObjectType::Area, area)?;
        }
        Ok(id)
    }

    fn create_node(&mut self, path: &str, kind: ObjectType, mut attributes: Attributes) -> Result<String> {
        if kind != ObjectType::MapNode {
            return Err(Error::remote(1, format!("{kind} is not a node type")));
        }
        if self.resolve(path).is_some() {
            return Err(Error::remote(
                CODE_ALREADY_EXISTS,
                format!("Node {path} already exists"),
            ));
        }
        if !attributes.contains_key("account") {
            let inherited = path
                .rsplit_once('/')
                .and_then(|(parent, _)| self.resolve(parent))
                .and_then(|id| self.objects.get(&id))
                .and_then(|p| p.str_attr("account"))
                .unwrap_or(DEFAULT_NODE_ACCOUNT)
                .to_string();
            attributes.insert("account".into(), json!(inherited));
        }
        Ok(self.insert(kind, attributes, Some(path.to_string())))
    }

    fn get(&mut self, path: &YPath, consume_lag: bool) -> Result<Value> {
        let (node, attr) = path.split_attribute();
        let id = self.resolve(node).ok_or_else(|| not_found(node))?;
        let Some(object) = self.objects.get(&id) else {
            return Err(not_found(node));
        };

        match attr {
            None => {
                let children = self.children(object);
                Ok(Value::Object(
                    children.into_iter().map(|c| (c, json!({}))).collect(),
                ))
            }
            Some("") => Ok(Value::Object(self.view(object, false))),
            Some(attr) => {
                if consume_lag
                    && attr == "tablet_cell_count"
                    && let Some((stale, remaining)) = self.stale_counts.get_mut(&id)
                {
                    if *remaining > 0 {
                        *remaining -= 1;
                        return Ok(json!(*stale));
                    }
                    self.stale_counts.remove(&id);
                }
                let object = self.objects.get(&id).ok_or_else(|| not_found(node))?;
                let view = self.view(object, true);
                lookup(&view, attr)
                    .cloned()
                    .ok_or_else(|| not_found(path.as_str()))
            }
        }
    }

    fn children(&self, object: &MockObject) -> Vec<String> {
        let mut names: Vec<String> = match object.kind {
            ObjectType::Account => {
                let name = object.name();
                self.objects
                    .values()
                    .filter(|o| o.kind == ObjectType::Account && o.str_attr("parent_name") == name)
                    .filter_map(|o| o.name().map(str::to_string))
                    .collect()
            }
            ObjectType::SchedulerPool => {
                let name = object.name();
                self.objects
                    .values()
                    .filter(|o| {
                        o.kind == ObjectType::SchedulerPool
                            && o.tree == object.tree
                            && o.str_attr("parent_name") == name
                    })
                    .filter_map(|o| o.name().map(str::to_string))
                    .collect()
            }
            ObjectType::MapNode => {
                let Some(path) = &object.path else {
                    return Vec::new();
                };
                self.objects
                    .values()
                    .filter(|o| o.kind == ObjectType::MapNode)
                    .filter_map(|o| {
                        let (parent, base) = o.path.as_deref()?.rsplit_once('/')?;
                        (parent == path.as_str()).then(|| base.to_string())
                    })
                    .collect()
            }
            _ => Vec::new(),
        };
        names.sort();
        names
    }

    fn set(&mut self, path: &YPath, value: Value) -> Result<()> {
        let (node, attr) = path.split_attribute();
        let id = self.resolve(node).ok_or_else(|| not_found(node))?;
        let attr = match attr {
            Some(attr) if !attr.is_empty() => attr,
            _ => return Err(Error::remote(1, format!("cannot overwrite node {node}"))),
        };
        let (head, rest) = match attr.split_once('/') {
            Some((head, rest)) => (head, Some(rest)),
            None => (attr, None),
        };
        if READ_ONLY.contains(&head) {
            return Err(Error::remote(
                1,
                format!("Builtin attribute {head:?} cannot be set"),
            ));
        }
        let Some(object) = self.objects.get(&id) else {
            return Err(not_found(node));
        };
        let kind = object.kind;
        let tree = object.tree.clone();

        if rest.is_none() {
            match (kind, head) {
                (ObjectType::TabletCellBundle, "node_tag_filter") => {
                    let area_id = self
                        .areas_of(&id)
                        .iter()
                        .find(|a| a.name() == Some("default"))
                        .map(|a| a.id.clone());
                    let area_id = match area_id {
                        Some(area_id) => area_id,
                        None => self.create_object(
                            ObjectType::Area,
                            Attributes::from_iter([
                                ("name".to_string(), json!("default")),
                                ("cell_bundle_id".to_string(), json!(id)),
                            ]),
                        )?,
                    };
                    if let Some(area) = self.objects.get_mut(&area_id) {
                        area.attributes.insert("node_tag_filter".into(), value);
                    }
                    return Ok(());
                }
                (_, "name") => {
                    let name = value
                        .as_str()
                        .ok_or_else(|| Error::remote(1, "name must be a string"))?;
                    if kind == ObjectType::SchedulerPool {
                        let tree = tree.unwrap_or_default();
                        if self.find_pool(&tree, name).is_some_and(|p| p.id != id) {
                            return Err(Error::remote(
                                CODE_ALREADY_EXISTS,
                                format!("pool {name:?} already exists"),
                            ));
                        }
                    } else {
                        self.check_unique(kind, name, Some(&id))?;
                    }
                }
                (ObjectType::Account, "parent_name") => {
                    let parent = value.as_str().unwrap_or_default();
                    if self.find_named(&[ObjectType::Account], parent).is_none() {
                        return Err(not_found(&format!("//sys/accounts/{parent}")));
                    }
                }
                (ObjectType::SchedulerPool, "parent_name") => {
                    let parent = value.as_str().unwrap_or_default();
                    let tree = tree.unwrap_or_default();
                    if parent != ROOT_POOL && self.find_pool(&tree, parent).is_none() {
                        return Err(not_found(&format!("//sys/pool_trees/{tree}/{parent}")));
                    }
                }
                _ => {}
            }
        }

        if rest.is_none()
            && head == "name"
            && matches!(kind, ObjectType::User | ObjectType::Group)
        {
            self.rename_principal(&id, &value);
        }

        let object = self.objects.get_mut(&id).ok_or_else(|| not_found(node))?;
        match rest {
            None => {
                object.attributes.insert(head.to_string(), value);
                Ok(())
            }
            Some(rest) => {
                let target = object
                    .attributes
                    .get_mut(head)
                    .ok_or_else(|| not_found(path.as_str()))?;
                if set_nested(target, rest, value) {
                    Ok(())
                } else {
                    Err(not_found(path.as_str()))
                }
            }
        }
    }

    /// Memberships follow the principal object, not its old name.
    fn rename_principal(&mut self, id: &str, name: &Value) {
        let (Some(old), Some(new)) = (
            self.objects.get(id).and_then(MockObject::name).map(str::to_string),
            name.as_str(),
        ) else {
            return;
        };
        for group in self.objects.values_mut() {
            if group.members.remove(&old) {
                group.members.insert(new.to_string());
            }
        }
    }

    fn remove(&mut self, path: &YPath) -> Result<()> {
        let (node, attr) = path.split_attribute();
        let id = self.resolve(node).ok_or_else(|| not_found(node))?;

        if let Some(attr) = attr.filter(|a| !a.is_empty()) {
            let object = self.objects.get_mut(&id).ok_or_else(|| not_found(node))?;
            let removed = match attr.split_once('/') {
                None => object.attributes.remove(attr).is_some(),
                Some((head, rest)) => object
                    .attributes
                    .get_mut(head)
                    .is_some_and(|target| remove_nested(target, rest)),
            };
            return if removed {
                Ok(())
            } else {
                Err(not_found(path.as_str()))
            };
        }

        let Some(object) = self.objects.get(&id).cloned() else {
            return Err(not_found(node));
        };
        let name = object.name().unwrap_or_default().to_string();

        match object.kind {
            ObjectType::TabletCellBundle => {
                let cells = self.cells_of(&id).len();
                if cells > 0 {
                    return Err(Error::remote(
                        1,
                        format!("Cannot remove tablet cell bundle {name:?} since it has {cells} cell(s)"),
                    ));
                }
                let areas: Vec<String> = self.areas_of(&id).iter().map(|a| a.id.clone()).collect();
                for area in areas {
                    self.objects.remove(&area);
                }
            }
            ObjectType::DomesticMedium => {
                return Err(Error::remote(1, format!("Medium {name:?} cannot be removed")));
            }
            ObjectType::TabletCell => {
                if let Some(owner) = &object.owner {
                    self.note_count_change(owner);
                }
            }
            ObjectType::Account | ObjectType::SchedulerPool | ObjectType::MapNode => {
                if !self.children(&object).is_empty() {
                    return Err(Error::remote(
                        1,
                        format!("Cannot remove {} {node} since it has children", object.kind),
                    ));
                }
            }
            ObjectType::User | ObjectType::Group => {
                for group in self.objects.values_mut() {
                    group.members.remove(&name);
                }
            }
            ObjectType::Area => {}
        }

        let mut aliases = vec![format!("#{id}")];
        aliases.extend(self.named_path(&object));
        self.objects.remove(&id);
        if self.lag > 0 {
            self.ghosts.push(Ghost {
                aliases,
                remaining: self.lag,
            });
        }
        Ok(())
    }

    fn list(&self, path: &YPath) -> Result<Vec<String>> {
        let node = path.as_str();
        let by_kind = |kind: ObjectType| -> Vec<String> {
            let mut names: Vec<String> = self
                .objects
                .values()
                .filter(|o| o.kind == kind)
                .filter_map(|o| o.name().map(str::to_string))
                .collect();
            names.sort();
            names
        };
        match node {
            "//sys/accounts" => return Ok(by_kind(ObjectType::Account)),
            "//sys/users" => return Ok(by_kind(ObjectType::User)),
            "//sys/groups" => return Ok(by_kind(ObjectType::Group)),
            "//sys/tablet_cell_bundles" => return Ok(by_kind(ObjectType::TabletCellBundle)),
            "//sys/media" => return Ok(by_kind(ObjectType::DomesticMedium)),
            _ => {}
        }
        if let Some(tree) = node.strip_prefix("//sys/pool_trees/")
            && !tree.contains('/')
        {
            let mut names: Vec<String> = self
                .objects
                .values()
                .filter(|o| {
                    o.kind == ObjectType::SchedulerPool
                        && o.tree.as_deref() == Some(tree)
                        && o.str_attr("parent_name") == Some(ROOT_POOL)
                })
                .filter_map(|o| o.name().map(str::to_string))
                .collect();
            names.sort();
            return Ok(names);
        }
        let id = self.resolve(node).ok_or_else(|| not_found(node))?;
        let object = self.objects.get(&id).ok_or_else(|| not_found(node))?;
        Ok(self.children(object))
    }

    fn exists(&mut self, path: &YPath) -> bool {
        let (node, attr) = path.split_attribute();
        if attr.is_none() && Self::is_namespace_root(node) {
            return true;
        }
        match self.resolve(node) {
            Some(id) => match attr {
                None | Some("") => true,
                Some(attr) => self
                    .objects
                    .get(&id)
                    .is_some_and(|o| lookup(&self.view(o, true), attr).is_some()),
            },
            None => {
                if attr.is_some() {
                    return false;
                }
                self.ghosts.retain(|g| g.remaining > 0);
                match self
                    .ghosts
                    .iter_mut()
                    .find(|g| g.aliases.iter().any(|a| a == node))
                {
                    Some(ghost) => {
                        ghost.remaining -= 1;
                        true
                    }
                    None => false,
                }
            }
        }
    }

    fn add_member(&mut self, group: &str, member: &str) -> Result<()> {
        if self
            .find_named(&[ObjectType::User, ObjectType::Group], member)
            .is_none()
        {
            return Err(not_found(&format!("//sys/users/{member}")));
        }
        let group_id = self
            .find_named(&[ObjectType::Group], group)
            .map(|g| g.id.clone())
            .ok_or_else(|| not_found(&format!("//sys/groups/{group}")))?;
        let Some(group_object) = self.objects.get_mut(&group_id) else {
            return Err(not_found(&format!("//sys/groups/{group}")));
        };
        if !group_object.members.insert(member.to_string()) {
            return Err(Error::remote(
                CODE_ALREADY_EXISTS,
                format!("Member {member:?} is already present in group {group:?}"),
            ));
        }
        Ok(())
    }

    fn remove_member(&mut self, group: &str, member: &str) -> Result<()> {
        let group_id = self
            .find_named(&[ObjectType::Group], group)
            .map(|g| g.id.clone())
            .ok_or_else(|| not_found(&format!("//sys/groups/{group}")))?;
        let Some(group_object) = self.objects.get_mut(&group_id) else {
            return Err(not_found(&format!("//sys/groups/{group}")));
        };
        if !group_object.members.remove(member) {
            return Err(Error::remote(
                1,
                format!("Member {member:?} is not present in group {group:?}"),
            ));
        }
        Ok(())
    }
}

impl ObjectStore for MockStore {
    fn create_object(&self, kind: ObjectType, attributes: &Attributes) -> Result<String> {
        let call = Call::CreateObject {
            kind,
            attributes: attributes.clone(),
        };
        self.begin(call, kind.as_str())?
            .create_object(kind, attributes.clone())
    }

    fn create_node(
        &self,
        path: &YPath,
        kind: ObjectType,
        attributes: &Attributes,
    ) -> Result<String> {
        let call = Call::CreateNode {
            path: path.to_string(),
            kind,
            attributes: attributes.clone(),
        };
        self.begin(call, path.as_str())?
            .create_node(path.as_str(), kind, attributes.clone())
    }

    fn get_node(&self, path: &YPath) -> Result<Value> {
        self.begin(Call::Get(path.to_string()), path.as_str())?
            .get(path, true)
    }

    fn set_node(&self, path: &YPath, value: &Value) -> Result<()> {
        self.begin(Call::Set(path.to_string(), value.clone()), path.as_str())?
            .set(path, value.clone())
    }

    fn remove_node(&self, path: &YPath) -> Result<()> {
        self.begin(Call::Remove(path.to_string()), path.as_str())?
            .remove(path)
    }

    fn list_node(&self, path: &YPath) -> Result<Vec<String>> {
        self.begin(Call::List(path.to_string()), path.as_str())?
            .list(path)
    }

    fn node_exists(&self, path: &YPath) -> Result<bool> {
        Ok(self
            .begin(Call::Exists(path.to_string()), path.as_str())?
            .exists(path))
    }

    fn add_member(&self, group: &str, member: &str) -> Result<()> {
        let call = Call::AddMember {
            group: group.to_string(),
            member: member.to_string(),
        };
        self.begin(call, &format!("{group}/{member}"))?
            .add_member(group, member)
    }

    fn remove_member(&self, group: &str, member: &str) -> Result<()> {
        let call = Call::RemoveMember {
            group: group.to_string(),
            member: member.to_string(),
        };
        self.begin(call, &format!("{group}/{member}"))?
            .remove_member(group, member)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(name: &str) -> Attributes {
        Attributes::from_iter([("name".to_string(), json!(name))])
    }

    #[test]
    fn test_root_account_seeded() {
        let store = MockStore::new();
        assert!(store.id_of(ObjectType::Account, ROOT_ACCOUNT).is_some());
        assert!(store.calls().is_empty());
    }

    #[test]
    fn test_account_children_listed() {
        let store = MockStore::new();
        let mut child = named("child");
        child.insert("parent_name".into(), json!("team"));
        store.seed_object(ObjectType::Account, named("team")).unwrap();
        store.seed_object(ObjectType::Account, child).unwrap();

        let children = store
            .list_node(&YPath::accounts().child("team"))
            .unwrap();
        assert_eq!(children, vec!["child".to_string()]);

        let err = store
            .remove_node(&YPath::accounts().child("team"))
            .unwrap_err();
        assert!(err.to_string().contains("children"));
    }

    #[test]
    fn test_users_and_groups_share_namespace() {
        let store = MockStore::new();
        store.seed_object(ObjectType::Group, named("alice")).unwrap();
        let err = store
            .create_object(ObjectType::User, &named("alice"))
            .unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn test_bundle_cells_and_areas() {
        let store = MockStore::new();
        let mut attrs = named("b");
        attrs.insert("node_tag_filter".into(), json!("ssd"));
        let bundle = store.seed_object(ObjectType::TabletCellBundle, attrs).unwrap();
        let cell = Attributes::from_iter([("tablet_cell_bundle".to_string(), json!("b"))]);
        let first = store.seed_object(ObjectType::TabletCell, cell.clone()).unwrap();
        store.seed_object(ObjectType::TabletCell, cell).unwrap();

        let base = YPath::object(&bundle);
        assert_eq!(store.peek(&base.attr("tablet_cell_count")), Some(json!(2)));
        let ids = store.peek(&base.attr("tablet_cell_ids")).unwrap();
        assert_eq!(ids[0], json!(first));
        let areas = store.peek(&base.attr("areas")).unwrap();
        assert_eq!(areas["default"]["node_tag_filter"], json!("ssd"));

        // opaque attributes stay out of the full listing
        let all = store.peek(&base.attrs()).unwrap();
        assert!(all.get("tablet_cell_ids").is_none());
        assert_eq!(all["node_tag_filter"], json!("ssd"));

        assert!(store.remove_node(&base).is_err());
    }

    #[test]
    fn test_convergence_lag_on_count_and_exists() {
        let store = MockStore::new();
        let bundle = store
            .seed_object(ObjectType::TabletCellBundle, named("b"))
            .unwrap();
        store.set_convergence_lag(2);
        store
            .create_object(
                ObjectType::TabletCell,
                &Attributes::from_iter([("tablet_cell_bundle".to_string(), json!("b"))]),
            )
            .unwrap();

        let count = YPath::object(&bundle).attr("tablet_cell_count");
        assert_eq!(store.get_node(&count).unwrap(), json!(0));
        assert_eq!(store.get_node(&count).unwrap(), json!(0));
        assert_eq!(store.get_node(&count).unwrap(), json!(1));

        let group = store.seed_object(ObjectType::Group, named("g")).unwrap();
        store.remove_node(&YPath::object(&group)).unwrap();
        let path = YPath::groups().child("g");
        assert!(store.node_exists(&path).unwrap());
        assert!(store.node_exists(&path).unwrap());
        assert!(!store.node_exists(&path).unwrap());
    }

    #[test]
    fn test_injected_failure_is_recorded() {
        let store = MockStore::new();
        store.fail_on(Op::Remove, "//sys/groups");
        store.seed_object(ObjectType::Group, named("g")).unwrap();
        assert!(store.remove_node(&YPath::groups().child("g")).is_err());
        assert_eq!(store.calls(), vec![Call::Remove("//sys/groups/g".to_string())]);
        assert!(store.id_of(ObjectType::Group, "g").is_some());
    }

    #[test]
    fn test_membership_and_member_of() {
        let store = MockStore::new();
        store.seed_object(ObjectType::Group, named("devs")).unwrap();
        let user = store.seed_object(ObjectType::User, named("alice")).unwrap();
        store.add_member("devs", "alice").unwrap();
        assert!(store.add_member("devs", "alice").is_err());

        let member_of = store
            .peek(&YPath::object(&user).attr("member_of"))
            .unwrap();
        assert_eq!(member_of, json!(["devs", "users"]));

        store.remove_member("devs", "alice").unwrap();
        assert!(store.remove_member("devs", "alice").is_err());
    }

    #[test]
    fn test_rename_keeps_membership() {
        let store = MockStore::new();
        store.seed_object(ObjectType::Group, named("devs")).unwrap();
        let user = store.seed_object(ObjectType::User, named("alice")).unwrap();
        store.seed_member("devs", "alice").unwrap();

        store
            .set_node(&YPath::object(&user).attr("name"), &json!("alicia"))
            .unwrap();
        store.remove_member("devs", "alicia").unwrap();
    }

    #[test]
    fn test_map_node_account_inherited() {
        let store = MockStore::new();
        let mut attrs = Attributes::new();
        attrs.insert("account".into(), json!("research"));
        store
            .seed_node("//home/research", ObjectType::MapNode, attrs)
            .unwrap();
        store
            .create_node(&YPath::new("//home/research/data"), ObjectType::MapNode, &Attributes::new())
            .unwrap();
        assert_eq!(
            store.peek(&YPath::new("//home/research/data").attr("account")),
            Some(json!("research"))
        );
        assert_eq!(
            store.list_node(&YPath::new("//home/research")).unwrap(),
            vec!["data".to_string()]
        );
    }

    #[test]
    fn test_pool_path_and_parent() {
        let store = MockStore::new();
        let mut parent = named("research");
        parent.insert("pool_tree".into(), json!("physical"));
        store.seed_object(ObjectType::SchedulerPool, parent).unwrap();
        let mut child = named("ml");
        child.insert("pool_tree".into(), json!("physical"));
        child.insert("parent_name".into(), json!("research"));
        let id = store.seed_object(ObjectType::SchedulerPool, child).unwrap();

        assert_eq!(
            store.peek(&YPath::object(&id).attr("path")),
            Some(json!("//sys/pool_trees/physical/research/ml"))
        );
        assert_eq!(
            store.list_node(&YPath::pool_tree("physical")).unwrap(),
            vec!["research".to_string()]
        );
    }

    #[test]
    fn test_nested_attribute_set_and_remove() {
        let store = MockStore::new();
        let mut attrs = named("team");
        attrs.insert("resource_limits".into(), json!({"node_count": 10}));
        let id = store.seed_object(ObjectType::Account, attrs).unwrap();
        let limit = YPath::object(&id).attr("resource_limits/node_count");

        store.set_node(&limit, &json!(20)).unwrap();
        assert_eq!(store.peek(&limit), Some(json!(20)));
        store.remove_node(&limit).unwrap();
        assert_eq!(store.peek(&limit), None);
        assert!(store.remove_node(&limit).is_err());
    }
}
