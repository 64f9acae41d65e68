use core::cmp::Ordering;
use core::fmt;
use core::ops::Deref;

use serde::{Deserialize, Serialize};

/// Smallest position an identifier can take. Used by the start sentinel and
/// as the floor when a path runs out during allocation.
pub const MIN_POSITION: u64 = 1;

/// Largest position an identifier can take.
///
/// Kept at `2^53 - 1` so positions survive a round trip through peers that
/// store JSON numbers as doubles.
pub const MAX_POSITION: u64 = (1 << 53) - 1;

/// One segment of a [`Path`]: `(position, site, clock)`.
///
/// Identifiers are totally ordered by position, then site, then clock. Two
/// identifiers minted by the same site differ at least by clock, so once a
/// site is assigned no two distinct allocations compare equal.
///
/// An empty `site` marks an *unassigned* boundary identifier: the document
/// sentinels and the synthetic floor/ceiling used during allocation.
///
/// # Example
///
/// ```
/// use logoot::Identifier;
///
/// let a = Identifier::new(10, "alice", 0);
/// let b = Identifier::new(10, "bob", 0);
/// assert!(a < b);
/// assert!(Identifier::start() < a);
/// assert!(b < Identifier::end());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identifier {
    /// Position fraction within the current depth.
    pub position: u64,
    /// Site that minted this identifier (`""` when unassigned).
    pub site: String,
    /// Logical clock of the minting site.
    pub clock: u64,
}

impl Identifier {
    /// Create an identifier.
    pub fn new(position: u64, site: impl Into<String>, clock: u64) -> Self {
        Self {
            position,
            site: site.into(),
            clock,
        }
    }

    /// An unassigned identifier at `position`.
    pub fn boundary(position: u64) -> Self {
        Self::new(position, String::new(), 0)
    }

    /// The start-of-document sentinel.
    pub fn start() -> Self {
        Self::boundary(MIN_POSITION)
    }

    /// The end-of-document sentinel.
    pub fn end() -> Self {
        Self::boundary(MAX_POSITION)
    }

    /// Whether no site has been assigned yet.
    #[must_use]
    pub fn is_unassigned(&self) -> bool {
        self.site.is_empty()
    }

    /// Promote an unassigned identifier to `site`. Assigned identifiers are
    /// left untouched.
    pub fn adopt(&mut self, site: &str) {
        if self.is_unassigned() {
            self.site = site.into();
        }
    }

    /// Whether the position lies in `[MIN_POSITION, MAX_POSITION]` and the
    /// clock leaves room for a successor.
    #[must_use]
    pub fn is_in_bounds(&self) -> bool {
        (MIN_POSITION..=MAX_POSITION).contains(&self.position) && self.clock < u64::MAX
    }
}

impl Ord for Identifier {
    fn cmp(&self, other: &Self) -> Ordering {
        self.position
            .cmp(&other.position)
            .then_with(|| self.site.cmp(&other.site))
            .then_with(|| self.clock.cmp(&other.clock))
    }
}

impl PartialOrd for Identifier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.position, self.site, self.clock)
    }
}

/// The identifiers from the root's child down to a node.
///
/// Paths compare lexicographically and a path sorts before every extension of
/// itself, which is exactly the order in which the tree lays out characters
/// (a node precedes its descendants).
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Path(Vec<Identifier>);

impl Path {
    /// Create an empty path (the root).
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Append a segment.
    pub fn push(&mut self, id: Identifier) {
        self.0.push(id);
    }

    /// Remove the last segment.
    pub fn pop(&mut self) -> Option<Identifier> {
        self.0.pop()
    }

    /// The final segment, i.e. the identifier of the addressed node.
    #[must_use]
    pub fn target(&self) -> Option<&Identifier> {
        self.0.last()
    }

    /// Consume the path, returning its segments.
    pub fn into_inner(self) -> Vec<Identifier> {
        self.0
    }
}

impl Deref for Path {
    type Target = [Identifier];

    fn deref(&self) -> &[Identifier] {
        &self.0
    }
}

impl From<Vec<Identifier>> for Path {
    fn from(ids: Vec<Identifier>) -> Self {
        Self(ids)
    }
}

impl FromIterator<Identifier> for Path {
    fn from_iter<I: IntoIterator<Item = Identifier>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, id) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{id}")?;
        }
        f.write_str("]")
    }
}
