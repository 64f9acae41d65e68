use std::collections::BTreeSet;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::DocumentConfig;
use crate::error::{OperationError, SnapshotError};
use crate::events::OpCrdt;
use crate::identifier::{Identifier, Path, MIN_POSITION};
use crate::operation::{Applied, Operation};
use crate::snapshot::DocumentState;
use crate::tree::{Chars, NodeId, PositionTree};

/// A Logoot replicated text document.
///
/// Every character sits at a unique [`Path`] of identifiers. Local edits
/// allocate fresh paths strictly between the neighbouring characters and
/// return the [`Operation`]s that peers need; remote operations are folded in
/// with [`apply`](Self::apply), in any order and any number of times.
///
/// A delete that overtakes its insert is parked in a pending set and cancels
/// the insert when it finally arrives, so the character never shows up.
///
/// All mutation goes through `&mut self`; a host that edits from several
/// threads must route every edit and every inbound payload for one document
/// through a single owner.
///
/// # Example
///
/// ```
/// use logoot::prelude::*;
///
/// let mut alice = ReplicatedDocument::new("alice");
/// let ops = alice.insert("hello", 0);
///
/// let mut bob = ReplicatedDocument::new("bob");
/// for op in &ops {
///     bob.apply(op).unwrap();
/// }
/// assert_eq!(bob.value(), "hello");
///
/// for op in bob.delete(1, 3) {
///     alice.apply(&op).unwrap();
/// }
/// assert_eq!(alice.value(), "ho");
/// ```
#[derive(Debug, Clone)]
pub struct ReplicatedDocument {
    site: String,
    /// Next clock value to hand out.
    clock: u64,
    tree: PositionTree,
    /// Deletes that arrived before their insert.
    pending: BTreeSet<Path>,
    config: DocumentConfig,
    rng: StdRng,
}

impl ReplicatedDocument {
    /// Create an empty document for `site` with the default configuration.
    pub fn new(site: impl Into<String>) -> Self {
        Self::with_config(site, DocumentConfig::default())
    }

    /// Create an empty document for `site`.
    pub fn with_config(site: impl Into<String>, config: DocumentConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            site: site.into(),
            clock: 0,
            tree: PositionTree::new(),
            pending: BTreeSet::new(),
            config,
            rng,
        }
    }

    /// Create a replica of this document's current state for another site.
    ///
    /// Use this to bring up a peer that starts in sync; the two replicas
    /// then diverge only through the operations they exchange.
    pub fn fork(&mut self, site: impl Into<String>) -> Self {
        let mut replica = Self {
            site: site.into(),
            clock: 0,
            tree: self.tree.clone(),
            pending: self.pending.clone(),
            config: self.config.clone(),
            rng: StdRng::seed_from_u64(self.rng.gen()),
        };
        replica.resume_clock();
        replica
    }

    /// This replica's site id.
    #[must_use]
    pub fn site(&self) -> &str {
        &self.site
    }

    /// The next clock value this replica will assign.
    #[must_use]
    pub fn clock(&self) -> u64 {
        self.clock
    }

    /// The configuration in use.
    #[must_use]
    pub fn config(&self) -> &DocumentConfig {
        &self.config
    }

    /// Read access to the underlying tree.
    #[must_use]
    pub fn tree(&self) -> &PositionTree {
        &self.tree
    }

    /// Number of visible characters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    /// Whether the document shows no text.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// The visible text.
    #[must_use]
    pub fn value(&self) -> String {
        self.tree.chars().collect()
    }

    /// Iterate over the visible characters.
    pub fn chars(&self) -> Chars<'_> {
        self.tree.chars()
    }

    /// Deletes still waiting for their insert.
    pub fn pending_deletions(&self) -> impl Iterator<Item = &Path> {
        self.pending.iter()
    }

    // ---- local edits ----

    /// Insert `text` so that it starts at `offset`.
    ///
    /// `offset` is clamped to `[0, len]`. Returns one insert operation per
    /// character, in order.
    pub fn insert(&mut self, text: &str, offset: usize) -> Vec<Operation> {
        let offset = offset.min(self.len());
        text.chars()
            .enumerate()
            .filter_map(|(i, ch)| self.insert_char(ch, offset + i))
            .collect()
    }

    /// Delete the characters at `start..=end`.
    ///
    /// Offsets past the end of the text are ignored, and nothing happens when
    /// `end < start`.
    pub fn delete(&mut self, start: usize, end: usize) -> Vec<Operation> {
        let mut ops = Vec::new();
        if end < start {
            return ops;
        }
        // Each deletion shifts the rest of the range onto `start`.
        for _ in start..=end {
            match self.delete_char(start) {
                Some(op) => ops.push(op),
                None => break,
            }
        }
        ops
    }

    /// Replace the selection `start..end` with `text`.
    ///
    /// ```
    /// use logoot::ReplicatedDocument;
    ///
    /// let mut doc = ReplicatedDocument::new("a");
    /// doc.insert("hello", 0);
    /// doc.replace_range("X", 1, 3);
    /// assert_eq!(doc.value(), "hXlo");
    /// ```
    pub fn replace_range(&mut self, text: &str, start: usize, end: usize) -> Vec<Operation> {
        let start = start.min(self.len());
        let mut ops = if end > start {
            self.delete(start, end - 1)
        } else {
            Vec::new()
        };
        ops.extend(self.insert(text, start));
        ops
    }

    /// Replace the whole text.
    pub fn set_value(&mut self, text: &str) -> Vec<Operation> {
        self.replace_range(text, 0, self.len())
    }

    fn insert_char(&mut self, ch: char, offset: usize) -> Option<Operation> {
        let offset = offset.min(self.len());
        let prev = self.tree.node_at_offset(offset)?;
        let next = self.tree.node_at_offset(offset + 1)?;
        let prev_path = self.tree.path_of(prev);
        let next_path = self.tree.path_of(next);

        let path = self.allocate_between(&prev_path, &next_path);
        let node = self.tree.materialize(&path);
        self.tree.set_value(node, Some(ch));
        self.tree.set_live(node, true);
        Some(Operation::Insert { path, ch })
    }

    fn delete_char(&mut self, offset: usize) -> Option<Operation> {
        // Offset 0 of the tree is the start sentinel.
        let node = self.tree.node_at_offset(offset.checked_add(1)?)?;
        if self.tree.id(node).map_or(true, Identifier::is_unassigned) {
            return None;
        }
        let path = self.tree.path_of(node);
        self.remove_node(node);
        Some(Operation::Delete { path })
    }

    fn remove_node(&mut self, node: NodeId) {
        self.tree.set_live(node, false);
        self.tree.prune_if_empty(node);
    }

    /// Mint a path that sorts strictly between `prev` and `next`.
    ///
    /// Walks down one level at a time. At each depth the window is bounded
    /// below by `prev` (or the floor once `prev` runs out) and above by `next`
    /// while the two still share a prefix, or by the level's capacity once
    /// they have split. The first window with room gets a random position.
    fn allocate_between(&mut self, prev: &[Identifier], next: &[Identifier]) -> Path {
        let mut path = Path::new();
        let mut shared_prefix = true;
        let mut depth = 0;
        loop {
            let exhausted = depth >= prev.len();
            let low = prev
                .get(depth)
                .cloned()
                .unwrap_or_else(|| Identifier::boundary(MIN_POSITION));
            let high = match next.get(depth) {
                Some(id) if shared_prefix => id.clone(),
                _ => Identifier::boundary(self.config.capacity(depth)),
            };

            if high.position > low.position.saturating_add(1) {
                let position = self.rng.gen_range(low.position + 1..high.position);
                path.push(Identifier::new(position, self.site.clone(), self.clock));
                self.clock = self.clock.saturating_add(1);
                tracing::debug!(depth, position, site = %self.site, "allocated identifier");
                return path;
            }

            if exhausted && shared_prefix && high.position <= MIN_POSITION {
                // Nothing fits below `high`; follow it down instead.
                path.push(high);
            } else {
                let mut segment = low;
                if exhausted && depth > 0 {
                    segment.adopt(&self.site);
                }
                if segment != high {
                    shared_prefix = false;
                }
                path.push(segment);
            }
            depth += 1;
        }
    }

    // ---- remote operations ----

    /// Fold in an operation from any replica.
    ///
    /// Idempotent and insensitive to delivery order between an insert and
    /// the delete of the same path. Structurally invalid operations are
    /// refused without touching the document.
    pub fn apply(&mut self, op: &Operation) -> Result<Applied, OperationError> {
        op.validate()?;
        let applied = match op {
            Operation::Insert { path, ch } => self.apply_insert(path, *ch),
            Operation::Delete { path } => self.apply_delete(path),
        };
        tracing::debug!(?applied, path = %op.path(), "applied operation");
        Ok(applied)
    }

    /// Decode a wire payload and apply it.
    ///
    /// Failures are logged and returned; the document is left as it was.
    pub fn receive(&mut self, payload: &str) -> Result<Applied, OperationError> {
        let result = Operation::from_json(payload).and_then(|op| self.apply(&op));
        if let Err(err) = &result {
            tracing::warn!(%err, site = %self.site, "dropping remote operation");
        }
        result
    }

    fn apply_insert(&mut self, path: &Path, ch: char) -> Applied {
        self.observe(path);
        if self.pending.remove(path) {
            return Applied::Cancelled;
        }
        if let Some(node) = self.tree.find(path) {
            if self.tree.is_live(node) {
                return Applied::Duplicate;
            }
        }
        let node = self.tree.materialize(path);
        self.tree.set_value(node, Some(ch));
        self.tree.set_live(node, true);
        Applied::Inserted
    }

    fn apply_delete(&mut self, path: &Path) -> Applied {
        match self.tree.find(path) {
            Some(node) if self.tree.is_live(node) => {
                self.remove_node(node);
                Applied::Deleted
            }
            _ if self.pending.insert(path.clone()) => Applied::Deferred,
            _ => Applied::Duplicate,
        }
    }

    /// Keep the local clock ahead of every identifier minted under our site.
    fn observe(&mut self, path: &[Identifier]) {
        for id in path {
            if id.site == self.site {
                self.clock = self.clock.max(id.clock.saturating_add(1));
            }
        }
    }

    fn resume_clock(&mut self) {
        let mut stack = vec![self.tree.root()];
        while let Some(node) = stack.pop() {
            if let Some(id) = self.tree.id(node) {
                if id.site == self.site {
                    self.clock = self.clock.max(id.clock.saturating_add(1));
                }
            }
            stack.extend_from_slice(self.tree.children(node));
        }
        let pending: Vec<Path> = self.pending.iter().cloned().collect();
        for path in &pending {
            self.observe(path);
        }
    }

    // ---- snapshots ----

    /// Capture the full state.
    #[must_use]
    pub fn to_state(&self) -> DocumentState {
        DocumentState::capture(&self.tree, &self.pending)
    }

    /// Encode the full state as JSON.
    pub fn serialize(&self) -> Result<String, SnapshotError> {
        self.to_state().to_json()
    }

    /// Rebuild a document for `site` from a captured state.
    pub fn from_state(site: impl Into<String>, state: &DocumentState) -> Result<Self, SnapshotError> {
        let mut doc = Self::new(site);
        doc.restore(state)?;
        Ok(doc)
    }

    /// Rebuild a document for `site` from a JSON snapshot.
    pub fn deserialize(site: impl Into<String>, snapshot: &str) -> Result<Self, SnapshotError> {
        let mut doc = Self::new(site);
        doc.load(snapshot)?;
        Ok(doc)
    }

    /// Replace this document's content with a JSON snapshot, keeping the site
    /// and configuration. On error the document is unchanged.
    pub fn load(&mut self, snapshot: &str) -> Result<(), SnapshotError> {
        self.restore(&DocumentState::from_json(snapshot)?)
    }

    /// Replace this document's content with `state`. On error the document is
    /// unchanged.
    pub fn restore(&mut self, state: &DocumentState) -> Result<(), SnapshotError> {
        let (tree, pending) = state.restore()?;
        self.tree = tree;
        self.pending = pending;
        self.resume_clock();
        tracing::info!(
            site = %self.site,
            len = self.len(),
            pending = self.pending.len(),
            "loaded snapshot"
        );
        Ok(())
    }
}

impl OpCrdt for ReplicatedDocument {
    type Op = Operation;
    type Outcome = Applied;
    type Error = OperationError;

    fn apply_op(&mut self, op: &Operation) -> Result<Applied, OperationError> {
        self.apply(op)
    }
}

impl core::fmt::Display for ReplicatedDocument {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        for ch in self.chars() {
            write!(f, "{ch}")?;
        }
        Ok(())
    }
}
