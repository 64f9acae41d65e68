//! Operation-based CRDT trait.
//!
//! A Logoot document never merges full states. Replicas exchange individual
//! operations instead, and each operation is an event that can be:
//! - Broadcast to other replicas as it happens
//! - Persisted in an append-only log
//! - Replayed, in any order, to rebuild the same text
//!
//! ```text
//! local edit -> Vec<Operation> -> transport -> apply_op() on every peer
//! ```

/// A CRDT that exchanges discrete operations rather than whole states.
///
/// # Example
///
/// ```
/// use logoot::events::OpCrdt;
/// use logoot::prelude::*;
///
/// let mut alice = ReplicatedDocument::new("alice");
/// let mut bob = ReplicatedDocument::new("bob");
///
/// for op in alice.insert("hi", 0) {
///     bob.apply_op(&op).unwrap();
/// }
/// assert_eq!(bob.value(), "hi");
/// ```
pub trait OpCrdt {
    /// The operation type this CRDT produces.
    type Op;

    /// What applying an operation reports back.
    type Outcome;

    /// Why an operation was refused.
    type Error;

    /// Apply an operation from a local or remote replica.
    ///
    /// For convergence, `apply_op` must be:
    /// - **Order-insensitive**: delivery order does not change the result
    /// - **Idempotent**: applying the same op twice has no additional effect
    fn apply_op(&mut self, op: &Self::Op) -> Result<Self::Outcome, Self::Error>;
}
