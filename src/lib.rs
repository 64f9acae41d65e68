//! # logoot
//!
//! A Logoot sequence CRDT for collaborative plain-text editing.
//!
//! Every character is addressed by a [`Path`] of [`Identifier`]s drawn from a
//! dense, totally ordered space. Sites insert and delete concurrently, ship
//! the resulting [`Operation`]s over any transport that may reorder or
//! duplicate them, and converge to the same text without coordination.
//!
//! ## Quick Start
//!
//! ```
//! use logoot::prelude::*;
//!
//! let mut alice = ReplicatedDocument::new("alice");
//! let mut bob = ReplicatedDocument::new("bob");
//!
//! let ops = alice.insert("hi", 0);
//! for op in &ops {
//!     bob.apply(op).unwrap();
//! }
//!
//! // Concurrent edits at the same spot
//! let from_alice = alice.insert("!", 2);
//! let from_bob = bob.insert("?", 2);
//! for op in &from_bob {
//!     alice.apply(op).unwrap();
//! }
//! for op in &from_alice {
//!     bob.apply(op).unwrap();
//! }
//!
//! assert_eq!(alice.value(), bob.value());
//! assert_eq!(alice.len(), 4);
//! ```
//!
//! ## Layers
//!
//! - [`Identifier`] / [`Path`]: position keys and their total order
//! - [`PositionTree`]: order-statistics tree translating offsets to paths
//! - [`ReplicatedDocument`]: allocation, local edits, remote operations,
//!   pending deletions and snapshots
//!
//! ## Delivery
//!
//! [`ReplicatedDocument::apply`] is idempotent and tolerates a delete that
//! overtakes its insert. Hosts only need to feed every local edit and every
//! inbound payload for a document through one owner.

#![warn(missing_docs)]

mod config;
mod document;
mod error;
mod identifier;
mod operation;
mod snapshot;
mod tree;
#[cfg(feature = "wasm")]
mod wasm;

pub mod events;
pub mod prelude;

pub use config::DocumentConfig;
pub use document::ReplicatedDocument;
pub use error::{OperationError, SnapshotError};
pub use identifier::{Identifier, Path, MAX_POSITION, MIN_POSITION};
pub use operation::{Applied, Operation};
pub use snapshot::{DocumentState, NodeState};
pub use tree::{Chars, NodeId, PositionTree};
