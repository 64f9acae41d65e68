//! Full-state snapshots.
//!
//! A snapshot is the literal tree plus the parked deletions:
//!
//! ```text
//! {
//!   "root": {"id": null, "value": "", "children": [...], "size": 2, "empty": false},
//!   "pendingDeletions": [[{"position": 9, "site": "b", "clock": 4}]]
//! }
//! ```
//!
//! Parent links are not part of the schema; they are rebuilt on load. Encoded
//! sizes are checked against the sizes the rebuilt tree actually has, so a
//! hand-edited or truncated snapshot is refused instead of producing a tree
//! whose offsets disagree with its text.
//!
//! Every tree level nests two JSON containers, and sequential typing alone
//! builds trees far deeper than `serde_json`'s default recursion limit. The
//! limit is lifted on load and every recursive step runs under
//! [`stacker::maybe_grow`] so the depth is bounded by memory, not stack.

use std::collections::BTreeSet;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::SnapshotError;
use crate::identifier::{Identifier, Path};
use crate::tree::{NodeId, PositionTree};

/// Stack left before a recursive step grows a new segment.
const RED_ZONE: usize = 64 * 1024;
/// Size of each freshly grown stack segment.
const STACK_SEGMENT: usize = 1024 * 1024;

fn with_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, STACK_SEGMENT, f)
}

/// Serializable form of a whole document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentState {
    /// The tree, starting at the root.
    pub root: NodeState,
    /// Deletions waiting for their insert.
    #[serde(default)]
    pub pending_deletions: Vec<Path>,
}

/// Serializable form of one tree node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeState {
    /// `None` only for the root.
    pub id: Option<Identifier>,
    /// Empty, or the single character held by the node.
    pub value: String,
    /// Children in identifier order.
    pub children: Vec<NodeState>,
    /// Live characters in this subtree.
    pub size: usize,
    /// Tombstone flag.
    pub empty: bool,
}

/// Field layout of [`NodeState`] on the wire.
#[derive(Serialize, Deserialize)]
#[serde(remote = "NodeState")]
struct NodeStateDef {
    id: Option<Identifier>,
    #[serde(default)]
    value: String,
    #[serde(default)]
    children: Vec<NodeState>,
    size: usize,
    empty: bool,
}

impl Serialize for NodeState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        with_stack(|| NodeStateDef::serialize(self, serializer))
    }
}

impl<'de> Deserialize<'de> for NodeState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        with_stack(|| NodeStateDef::deserialize(deserializer))
    }
}

impl Drop for NodeState {
    fn drop(&mut self) {
        // Flatten first so dropping a deep tree does not recurse.
        let mut stack = std::mem::take(&mut self.children);
        while let Some(mut node) = stack.pop() {
            stack.append(&mut node.children);
        }
    }
}

impl DocumentState {
    /// Capture `tree` and `pending`.
    pub fn capture<'a>(tree: &PositionTree, pending: impl IntoIterator<Item = &'a Path>) -> Self {
        Self {
            root: capture_node(tree, tree.root()),
            pending_deletions: pending.into_iter().cloned().collect(),
        }
    }

    /// Decode a JSON snapshot of any depth.
    pub fn from_json(snapshot: &str) -> Result<Self, SnapshotError> {
        let mut deserializer = serde_json::Deserializer::from_str(snapshot);
        deserializer.disable_recursion_limit();
        let state = Self::deserialize(&mut deserializer)?;
        deserializer.end()?;
        Ok(state)
    }

    /// Encode as JSON.
    pub fn to_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Rebuild the tree and pending set, validating the encoding.
    pub fn restore(&self) -> Result<(PositionTree, BTreeSet<Path>), SnapshotError> {
        if self.root.id.is_some() {
            return Err(SnapshotError::RootHasId);
        }
        if !has_sentinels(&self.root) {
            return Err(SnapshotError::MissingSentinels);
        }
        // Anything under the end sentinel would be laid out after it.
        if self.root.children.last().is_some_and(|end| !end.children.is_empty()) {
            return Err(SnapshotError::OutOfBounds {
                path: Path::from(vec![Identifier::end()]),
            });
        }

        let mut tree = PositionTree::with_root(!self.root.empty);
        let root = tree.root();
        let mut path = Path::new();
        attach_children(&mut tree, root, &self.root, &mut path)?;
        check_size(&tree, root, &self.root, &path)?;

        let pending = self.pending_deletions.iter().cloned().collect();
        Ok((tree, pending))
    }
}

fn capture_node(tree: &PositionTree, node: NodeId) -> NodeState {
    with_stack(|| NodeState {
        id: tree.id(node).cloned(),
        value: tree.value(node).map(String::from).unwrap_or_default(),
        children: tree
            .children(node)
            .iter()
            .map(|child| capture_node(tree, *child))
            .collect(),
        size: tree.size(node),
        empty: !tree.is_live(node),
    })
}

/// The first and last children of the root must be live sentinels.
fn has_sentinels(root: &NodeState) -> bool {
    let is = |node: Option<&NodeState>, expected: Identifier| {
        node.is_some_and(|n| !n.empty && n.id.as_ref() == Some(&expected))
    };
    root.children.len() >= 2
        && is(root.children.first(), Identifier::start())
        && is(root.children.last(), Identifier::end())
}

fn attach_children(
    tree: &mut PositionTree,
    parent: NodeId,
    state: &NodeState,
    path: &mut Path,
) -> Result<(), SnapshotError> {
    let mut previous: Option<&Identifier> = None;
    for child in &state.children {
        let id = child
            .id
            .as_ref()
            .ok_or(SnapshotError::MissingId { depth: path.len() })?;
        if previous.is_some_and(|prev| prev >= id) {
            return Err(SnapshotError::UnsortedChildren { path: path.clone() });
        }
        previous = Some(id);

        path.push(id.clone());
        if !id.is_in_bounds() {
            return Err(SnapshotError::OutOfBounds { path: path.clone() });
        }
        let mut chars = child.value.chars();
        let value = match (chars.next(), chars.next()) {
            (None, _) => None,
            (Some(ch), None) => Some(ch),
            _ => {
                return Err(SnapshotError::InvalidValue {
                    path: path.clone(),
                    value: child.value.clone(),
                });
            }
        };

        let node = tree.alloc_node(id.clone(), value, !child.empty);
        tree.add_child(parent, node);

        with_stack(|| attach_children(tree, node, child, path))?;
        check_size(tree, node, child, path)?;
        path.pop();
    }
    Ok(())
}

fn check_size(
    tree: &PositionTree,
    node: NodeId,
    state: &NodeState,
    path: &Path,
) -> Result<(), SnapshotError> {
    let actual = tree.size(node);
    if actual == state.size {
        Ok(())
    } else {
        Err(SnapshotError::SizeMismatch {
            path: path.clone(),
            encoded: state.size,
            actual,
        })
    }
}
