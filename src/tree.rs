//! Order-statistics tree keyed by [`Identifier`].
//!
//! Every node other than the root is addressed by the [`Path`] of identifiers
//! leading to it. A pre-order walk that visits children in identifier order
//! lays out the document, and each node caches the number of live characters
//! in its subtree so an offset can be turned into a node by descending from
//! the root.
//!
//! Nodes live in an arena and refer to their parent by [`NodeId`], so walking
//! up for size maintenance and path reconstruction never needs a back
//! reference.

use core::fmt;

use crate::identifier::{Identifier, Path};

/// Handle to a node inside a [`PositionTree`].
///
/// Handles are only meaningful for the tree that produced them and are
/// invalidated when the node is pruned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Fenwick tree over the sizes of a node's children.
///
/// Lets an offset be mapped to the child that holds it in `O(log k)`. Point
/// updates follow size changes; the whole index is rebuilt when a child is
/// added or removed since every later slot shifts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct SizeIndex {
    /// `sums[i - 1]` holds Fenwick cell `i`.
    sums: Vec<usize>,
}

impl SizeIndex {
    fn build(sizes: impl IntoIterator<Item = usize>) -> Self {
        let mut sums: Vec<usize> = sizes.into_iter().collect();
        let n = sums.len();
        for i in 1..=n {
            let up = i + (i & i.wrapping_neg());
            if up <= n {
                sums[up - 1] += sums[i - 1];
            }
        }
        Self { sums }
    }

    fn add(&mut self, index: usize, amount: usize) {
        let mut i = index + 1;
        while i <= self.sums.len() {
            self.sums[i - 1] += amount;
            i += i & i.wrapping_neg();
        }
    }

    fn sub(&mut self, index: usize, amount: usize) {
        let mut i = index + 1;
        while i <= self.sums.len() {
            self.sums[i - 1] = self.sums[i - 1].saturating_sub(amount);
            i += i & i.wrapping_neg();
        }
    }

    /// The child covering `offset` and the offset left inside it, or `None`
    /// when `offset` is at or past the total.
    fn locate(&self, mut offset: usize) -> Option<(usize, usize)> {
        let n = self.sums.len();
        if n == 0 {
            return None;
        }
        let mut pos = 0;
        let mut step = 1 << (usize::BITS - 1 - n.leading_zeros());
        while step > 0 {
            let next = pos + step;
            if next <= n && self.sums[next - 1] <= offset {
                pos = next;
                offset -= self.sums[next - 1];
            }
            step >>= 1;
        }
        (pos < n).then_some((pos, offset))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Node {
    id: Option<Identifier>,
    value: Option<char>,
    parent: Option<NodeId>,
    /// Sorted by identifier.
    children: Vec<NodeId>,
    /// Sizes of `children`, slot for slot.
    index: SizeIndex,
    size: usize,
    live: bool,
}

impl Node {
    fn new(id: Option<Identifier>, value: Option<char>, live: bool) -> Self {
        let mut node = Self {
            id,
            value,
            parent: None,
            children: Vec::new(),
            index: SizeIndex::default(),
            size: 0,
            live,
        };
        node.size = node.weight();
        node
    }

    /// How many offset units this node occupies on its own. The root is
    /// structural and never counts.
    fn weight(&self) -> usize {
        usize::from(self.live && self.id.is_some())
    }
}

/// The document tree.
///
/// A fresh tree holds the root and its two permanent sentinel children, the
/// start sentinel at [`Identifier::start`] and the end sentinel at
/// [`Identifier::end`]. Sentinels are live but carry no character, so the
/// document length is `root size - 2`.
///
/// # Example
///
/// ```
/// use logoot::{Identifier, Path, PositionTree};
///
/// let mut tree = PositionTree::new();
/// let path = Path::from(vec![Identifier::new(42, "a", 0)]);
/// let node = tree.resolve_path(&path, true).unwrap();
/// tree.set_value(node, Some('x'));
/// tree.set_live(node, true);
///
/// assert_eq!(tree.len(), 1);
/// assert_eq!(tree.chars().collect::<String>(), "x");
/// assert_eq!(tree.node_at_offset(1), Some(node));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionTree {
    nodes: Vec<Node>,
    free: Vec<NodeId>,
    root: NodeId,
}

impl PositionTree {
    /// Create a tree containing only the root and the two sentinels.
    pub fn new() -> Self {
        let mut tree = Self::with_root(true);
        let start = tree.alloc(Node::new(Some(Identifier::start()), None, true));
        let end = tree.alloc(Node::new(Some(Identifier::end()), None, true));
        tree.add_child(tree.root, start);
        tree.add_child(tree.root, end);
        tree
    }

    /// A tree holding a bare root. Snapshot loading fills it in.
    pub(crate) fn with_root(live: bool) -> Self {
        Self {
            nodes: vec![Node::new(None, None, live)],
            free: Vec::new(),
            root: NodeId(0),
        }
    }

    /// Store `node` detached from the tree.
    fn alloc(&mut self, node: Node) -> NodeId {
        match self.free.pop() {
            Some(slot) => {
                self.nodes[slot.0] = node;
                slot
            }
            None => {
                self.nodes.push(node);
                NodeId(self.nodes.len() - 1)
            }
        }
    }

    /// Allocate a detached node with the given contents.
    pub(crate) fn alloc_node(&mut self, id: Identifier, value: Option<char>, live: bool) -> NodeId {
        self.alloc(Node::new(Some(id), value, live))
    }

    fn node(&self, node: NodeId) -> &Node {
        &self.nodes[node.0]
    }

    fn node_mut(&mut self, node: NodeId) -> &mut Node {
        &mut self.nodes[node.0]
    }

    /// The root handle.
    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of live characters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.node(self.root).size.saturating_sub(2)
    }

    /// Whether the document holds no live characters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of nodes attached to the tree, tombstones and sentinels
    /// included.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    /// The identifier of `node` (`None` for the root).
    #[must_use]
    pub fn id(&self, node: NodeId) -> Option<&Identifier> {
        self.node(node).id.as_ref()
    }

    /// The character stored at `node`, if any.
    #[must_use]
    pub fn value(&self, node: NodeId) -> Option<char> {
        self.node(node).value
    }

    /// Replace the character stored at `node`. Liveness is unaffected.
    pub fn set_value(&mut self, node: NodeId, value: Option<char>) {
        self.node_mut(node).value = value;
    }

    /// Whether `node` is live (not tombstoned).
    #[must_use]
    pub fn is_live(&self, node: NodeId) -> bool {
        self.node(node).live
    }

    /// Live characters in the subtree rooted at `node`, itself included.
    #[must_use]
    pub fn size(&self, node: NodeId) -> usize {
        self.node(node).size
    }

    /// The parent of `node` (`None` for the root and detached nodes).
    #[must_use]
    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.node(node).parent
    }

    /// Children of `node` in identifier order.
    #[must_use]
    pub fn children(&self, node: NodeId) -> &[NodeId] {
        &self.node(node).children
    }

    /// Whether `node` is one of the two permanent sentinels.
    #[must_use]
    pub fn is_sentinel(&self, node: NodeId) -> bool {
        self.parent(node) == Some(self.root)
            && self
                .id(node)
                .is_some_and(|id| *id == Identifier::start() || *id == Identifier::end())
    }

    /// Find the child of `parent` carrying exactly `id`.
    fn search(&self, parent: NodeId, id: &Identifier) -> Result<usize, usize> {
        self.node(parent)
            .children
            .binary_search_by(|child| match self.id(*child) {
                Some(child_id) => child_id.cmp(id),
                None => core::cmp::Ordering::Less,
            })
    }

    /// Find the child of `parent` carrying exactly `id`.
    #[must_use]
    pub fn child(&self, parent: NodeId, id: &Identifier) -> Option<NodeId> {
        self.search(parent, id)
            .ok()
            .map(|index| self.node(parent).children[index])
    }

    /// Attach `child` under `parent` at its sorted position and grow every
    /// ancestor by the child's subtree size.
    ///
    /// If a child with the same identifier already exists the new one is
    /// placed next to it; callers resolve paths first to avoid that.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) {
        let index = match self.node(child).id.as_ref() {
            Some(id) => {
                let id = id.clone();
                self.node(parent)
                    .children
                    .partition_point(|c| self.id(*c).is_some_and(|cid| *cid < id))
            }
            None => 0,
        };
        self.node_mut(parent).children.insert(index, child);
        self.node_mut(child).parent = Some(parent);
        self.reindex(parent);
        let size = self.node(child).size;
        self.grow(parent, size);
    }

    /// Detach `child` from `parent`, shrink the ancestors and recycle the
    /// detached subtree. Returns `false` if `child` is not a child of
    /// `parent`.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> bool {
        let Some(id) = self.node(child).id.clone() else {
            return false;
        };
        let index = match self.search(parent, &id) {
            Ok(index) if self.node(parent).children[index] == child => index,
            _ => return false,
        };
        self.node_mut(parent).children.remove(index);
        self.reindex(parent);
        let size = self.node(child).size;
        self.shrink(parent, size);
        self.release(child);
        true
    }

    /// Toggle tombstone status, adjusting the size of `node` and its
    /// ancestors by one. Children are unaffected.
    pub fn set_live(&mut self, node: NodeId, live: bool) {
        if self.node(node).live == live {
            return;
        }
        let before = self.node(node).weight();
        self.node_mut(node).live = live;
        let after = self.node(node).weight();
        if after > before {
            self.grow(node, after - before);
        } else if before > after {
            self.shrink(node, before - after);
        }
    }

    /// Remove `node` if it is a childless tombstone, then keep going with its
    /// parent. Tombstones that still have descendants stay as path anchors.
    ///
    /// Returns the number of nodes removed.
    pub fn prune_if_empty(&mut self, node: NodeId) -> usize {
        let mut removed = 0;
        let mut current = node;
        while let Some(parent) = self.parent(current) {
            let n = self.node(current);
            if n.live || !n.children.is_empty() {
                break;
            }
            if !self.remove_child(parent, current) {
                break;
            }
            removed += 1;
            current = parent;
        }
        if removed > 0 {
            tracing::trace!(removed, "pruned empty tombstones");
        }
        removed
    }

    /// The identifiers from the root's child down to `node`.
    #[must_use]
    pub fn path_of(&self, node: NodeId) -> Path {
        let mut ids = Vec::new();
        let mut current = Some(node);
        while let Some(n) = current {
            let entry = self.node(n);
            if let Some(id) = &entry.id {
                ids.push(id.clone());
            }
            current = entry.parent;
        }
        ids.reverse();
        Path::from(ids)
    }

    /// Follow `path` from the root.
    ///
    /// Missing segments are created as tombstoned placeholders when
    /// `materialize` is set; otherwise a missing segment yields `None`.
    pub fn resolve_path(&mut self, path: &[Identifier], materialize: bool) -> Option<NodeId> {
        if materialize {
            Some(self.materialize(path))
        } else {
            self.find(path)
        }
    }

    /// Follow `path` from the root, creating tombstoned placeholders for
    /// every missing segment.
    pub fn materialize(&mut self, path: &[Identifier]) -> NodeId {
        let mut current = self.root;
        for id in path {
            current = match self.child(current, id) {
                Some(next) => next,
                None => {
                    let placeholder = self.alloc_node(id.clone(), None, false);
                    self.add_child(current, placeholder);
                    placeholder
                }
            };
        }
        current
    }

    /// Follow `path` from the root without creating anything.
    #[must_use]
    pub fn find(&self, path: &[Identifier]) -> Option<NodeId> {
        path.iter()
            .try_fold(self.root, |current, id| self.child(current, id))
    }

    /// The node occupying `offset` in the live layout.
    ///
    /// Offset `0` is the start sentinel, offsets `1..=len()` are the
    /// characters and `len() + 1` is the end sentinel. Anything beyond
    /// yields `None`.
    #[must_use]
    pub fn node_at_offset(&self, offset: usize) -> Option<NodeId> {
        let mut current = self.root;
        let mut remaining = offset;
        loop {
            let node = self.node(current);
            let own = node.weight();
            if remaining < own {
                return Some(current);
            }
            let (slot, rest) = node.index.locate(remaining - own)?;
            current = node.children[slot];
            remaining = rest;
        }
    }

    /// Lazily iterate over the live characters in document order.
    pub fn chars(&self) -> Chars<'_> {
        Chars {
            tree: self,
            stack: vec![self.root],
        }
    }

    /// Slot of `child` in its parent's `children`.
    fn slot_of(&self, parent: NodeId, child: NodeId) -> Option<usize> {
        let id = self.node(child).id.as_ref()?;
        self.search(parent, id)
            .ok()
            .filter(|&slot| self.node(parent).children[slot] == child)
    }

    fn reindex(&mut self, node: NodeId) {
        let index = SizeIndex::build(
            self.node(node)
                .children
                .iter()
                .map(|child| self.node(*child).size),
        );
        self.node_mut(node).index = index;
    }

    fn grow(&mut self, from: NodeId, amount: usize) {
        self.node_mut(from).size += amount;
        let mut current = from;
        while let Some(parent) = self.parent(current) {
            if let Some(slot) = self.slot_of(parent, current) {
                self.node_mut(parent).index.add(slot, amount);
            }
            self.node_mut(parent).size += amount;
            current = parent;
        }
    }

    fn shrink(&mut self, from: NodeId, amount: usize) {
        let node = self.node_mut(from);
        node.size = node.size.saturating_sub(amount);
        let mut current = from;
        while let Some(parent) = self.parent(current) {
            if let Some(slot) = self.slot_of(parent, current) {
                self.node_mut(parent).index.sub(slot, amount);
            }
            let node = self.node_mut(parent);
            node.size = node.size.saturating_sub(amount);
            current = parent;
        }
    }

    /// Return the slots of a detached subtree to the free list.
    fn release(&mut self, node: NodeId) {
        let mut stack = vec![node];
        while let Some(n) = stack.pop() {
            let entry = self.node_mut(n);
            entry.parent = None;
            stack.append(&mut entry.children);
            self.free.push(n);
        }
    }
}

impl Default for PositionTree {
    fn default() -> Self {
        Self::new()
    }
}

/// Pre-order iterator over live characters, see [`PositionTree::chars`].
#[derive(Debug, Clone)]
pub struct Chars<'a> {
    tree: &'a PositionTree,
    stack: Vec<NodeId>,
}

impl Iterator for Chars<'_> {
    type Item = char;

    fn next(&mut self) -> Option<char> {
        while let Some(n) = self.stack.pop() {
            let node = self.tree.node(n);
            self.stack.extend(node.children.iter().rev().copied());
            if node.live {
                if let Some(ch) = node.value {
                    return Some(ch);
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(position: u64) -> Identifier {
        Identifier::new(position, "a", position)
    }

    fn put(tree: &mut PositionTree, path: &[Identifier], ch: char) -> NodeId {
        let node = tree.resolve_path(path, true).unwrap();
        tree.set_value(node, Some(ch));
        tree.set_live(node, true);
        node
    }

    #[test]
    fn new_tree_has_only_sentinels() {
        let tree = PositionTree::new();
        assert!(tree.is_empty());
        assert_eq!(tree.size(tree.root()), 2);
        assert_eq!(tree.node_count(), 3);
        assert_eq!(tree.chars().count(), 0);

        let start = tree.node_at_offset(0).unwrap();
        let end = tree.node_at_offset(1).unwrap();
        assert_eq!(tree.id(start), Some(&Identifier::start()));
        assert_eq!(tree.id(end), Some(&Identifier::end()));
        assert!(tree.is_sentinel(start));
        assert!(tree.is_sentinel(end));
        assert_eq!(tree.node_at_offset(2), None);
    }

    #[test]
    fn children_stay_sorted() {
        let mut tree = PositionTree::new();
        put(&mut tree, &[id(30)], 'c');
        put(&mut tree, &[id(10)], 'a');
        put(&mut tree, &[id(20)], 'b');

        let ids: Vec<u64> = tree
            .children(tree.root())
            .iter()
            .map(|c| tree.id(*c).unwrap().position)
            .collect();
        assert_eq!(ids, vec![1, 10, 20, 30, crate::MAX_POSITION]);
        assert_eq!(tree.chars().collect::<String>(), "abc");
    }

    #[test]
    fn nested_nodes_follow_parent() {
        let mut tree = PositionTree::new();
        put(&mut tree, &[id(10)], 'a');
        put(&mut tree, &[id(20)], 'c');
        put(&mut tree, &[id(10), id(5)], 'b');

        assert_eq!(tree.chars().collect::<String>(), "abc");
        assert_eq!(tree.len(), 3);
    }

    #[test]
    fn offsets_walk_the_layout() {
        let mut tree = PositionTree::new();
        let a = put(&mut tree, &[id(10)], 'a');
        let b = put(&mut tree, &[id(10), id(5)], 'b');
        let c = put(&mut tree, &[id(20)], 'c');

        assert_eq!(tree.node_at_offset(1), Some(a));
        assert_eq!(tree.node_at_offset(2), Some(b));
        assert_eq!(tree.node_at_offset(3), Some(c));
        let end = tree.node_at_offset(4).unwrap();
        assert_eq!(tree.id(end), Some(&Identifier::end()));
    }

    #[test]
    fn tombstones_are_skipped_by_offsets() {
        let mut tree = PositionTree::new();
        let a = put(&mut tree, &[id(10)], 'a');
        let b = put(&mut tree, &[id(10), id(5)], 'b');
        tree.set_live(a, false);

        assert_eq!(tree.len(), 1);
        assert_eq!(tree.node_at_offset(1), Some(b));
        assert_eq!(tree.chars().collect::<String>(), "b");
    }

    #[test]
    fn set_live_is_idempotent() {
        let mut tree = PositionTree::new();
        let a = put(&mut tree, &[id(10)], 'a');
        tree.set_live(a, true);
        assert_eq!(tree.len(), 1);
        tree.set_live(a, false);
        tree.set_live(a, false);
        assert_eq!(tree.len(), 0);
    }

    #[test]
    fn materialize_creates_placeholders() {
        let mut tree = PositionTree::new();
        let leaf = put(&mut tree, &[id(10), id(20), id(30)], 'x');
        let path = tree.path_of(leaf);
        assert_eq!(&*path, &[id(10), id(20), id(30)]);

        let middle = tree.find(&[id(10), id(20)]).unwrap();
        assert!(!tree.is_live(middle));
        assert_eq!(tree.size(middle), 1);
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn resolve_without_materialize_fails_on_missing() {
        let mut tree = PositionTree::new();
        assert_eq!(tree.resolve_path(&[id(10)], false), None);
        assert_eq!(tree.node_count(), 3);
    }

    #[test]
    fn prune_removes_dead_chain() {
        let mut tree = PositionTree::new();
        let leaf = put(&mut tree, &[id(10), id(20), id(30)], 'x');
        assert_eq!(tree.node_count(), 6);

        tree.set_live(leaf, false);
        assert_eq!(tree.prune_if_empty(leaf), 3);
        assert_eq!(tree.node_count(), 3);
        assert_eq!(tree.find(&[id(10)]), None);
    }

    #[test]
    fn prune_keeps_anchors_with_live_descendants() {
        let mut tree = PositionTree::new();
        let parent = put(&mut tree, &[id(10)], 'a');
        put(&mut tree, &[id(10), id(5)], 'b');

        tree.set_live(parent, false);
        assert_eq!(tree.prune_if_empty(parent), 0);
        assert!(tree.find(&[id(10)]).is_some());
        assert_eq!(tree.chars().collect::<String>(), "b");
    }

    #[test]
    fn sentinels_survive_pruning() {
        let mut tree = PositionTree::new();
        let start = tree.node_at_offset(0).unwrap();
        assert_eq!(tree.prune_if_empty(start), 0);
        assert_eq!(tree.node_count(), 3);
    }

    #[test]
    fn freed_slots_are_reused() {
        let mut tree = PositionTree::new();
        let a = put(&mut tree, &[id(10)], 'a');
        tree.set_live(a, false);
        tree.prune_if_empty(a);
        let b = put(&mut tree, &[id(20)], 'b');
        assert_eq!(a, b);
        assert_eq!(tree.node_count(), 4);
    }

    #[test]
    fn remove_child_rejects_strangers() {
        let mut tree = PositionTree::new();
        let a = put(&mut tree, &[id(10)], 'a');
        let b = put(&mut tree, &[id(10), id(5)], 'b');
        assert!(!tree.remove_child(tree.root(), b));
        assert!(tree.remove_child(a, b));
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn size_index_locates_by_prefix_sum() {
        let mut index = SizeIndex::build([2, 0, 3, 1]);
        assert_eq!(index.locate(0), Some((0, 0)));
        assert_eq!(index.locate(1), Some((0, 1)));
        assert_eq!(index.locate(2), Some((2, 0)));
        assert_eq!(index.locate(4), Some((2, 2)));
        assert_eq!(index.locate(5), Some((3, 0)));
        assert_eq!(index.locate(6), None);

        index.add(1, 4);
        assert_eq!(index.locate(2), Some((1, 0)));
        assert_eq!(index.locate(6), Some((2, 0)));
        index.sub(0, 2);
        assert_eq!(index.locate(0), Some((1, 0)));
        assert_eq!(SizeIndex::default().locate(0), None);
    }

    #[test]
    fn offsets_agree_with_layout_after_churn() {
        let mut tree = PositionTree::new();
        let mut nodes = Vec::new();
        for i in 1..60u64 {
            let position = (i * 37) % 101 + 2;
            nodes.push(put(&mut tree, &[id(position)], 'a'));
            nodes.push(put(&mut tree, &[id(position), id(i % 7 + 2)], 'b'));
        }
        for (i, node) in nodes.iter().enumerate() {
            if i % 3 == 0 {
                tree.set_live(*node, false);
                tree.prune_if_empty(*node);
            }
        }

        // Live nodes in pre-order, sentinels included.
        let mut layout = Vec::new();
        let mut stack = vec![tree.root()];
        while let Some(n) = stack.pop() {
            if n != tree.root() && tree.is_live(n) {
                layout.push(n);
            }
            stack.extend(tree.children(n).iter().rev().copied());
        }
        assert_eq!(layout.len(), tree.len() + 2);
        for (offset, node) in layout.iter().enumerate() {
            assert_eq!(tree.node_at_offset(offset), Some(*node));
        }
        assert_eq!(tree.node_at_offset(layout.len()), None);
    }

    #[test]
    fn chars_is_restartable() {
        let mut tree = PositionTree::new();
        put(&mut tree, &[id(10)], 'h');
        put(&mut tree, &[id(20)], 'i');
        let first: String = tree.chars().collect();
        let second: String = tree.chars().collect();
        assert_eq!(first, second);
    }
}
