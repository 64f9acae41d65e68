//! Convenient re-exports for common usage.
//!
//! ```
//! use logoot::prelude::*;
//! ```

pub use crate::events::OpCrdt;
pub use crate::Applied;
pub use crate::DocumentConfig;
pub use crate::Identifier;
pub use crate::Operation;
pub use crate::Path;
pub use crate::ReplicatedDocument;
