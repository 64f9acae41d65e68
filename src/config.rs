use serde::{Deserialize, Serialize};

use crate::identifier::MAX_POSITION;

/// Tuning knobs for a [`ReplicatedDocument`](crate::ReplicatedDocument).
///
/// All replicas of a document should share the same `base`; differing bases
/// still converge but waste identifier space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentConfig {
    /// Identifier capacity at depth 0 below the first real character. Each
    /// level deeper doubles it, capped at [`MAX_POSITION`].
    pub base: u64,
    /// Seed for position allocation. `None` seeds from OS entropy; fixed
    /// seeds make allocation reproducible in tests.
    pub seed: Option<u64>,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            base: 256,
            seed: None,
        }
    }
}

impl DocumentConfig {
    /// Use `base` as the depth-0 capacity.
    #[must_use]
    pub fn with_base(mut self, base: u64) -> Self {
        self.base = base;
        self
    }

    /// Seed the allocation RNG.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// `min(base * 2^depth, MAX_POSITION)`, never below 3 so a gap can
    /// always open above the floor.
    #[must_use]
    pub fn capacity(&self, depth: usize) -> u64 {
        let base = self.base.max(3);
        u32::try_from(depth)
            .ok()
            .and_then(|shift| 1u64.checked_shl(shift))
            .and_then(|factor| base.checked_mul(factor))
            .map_or(MAX_POSITION, |cap| cap.min(MAX_POSITION))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_doubles_per_level() {
        let config = DocumentConfig::default();
        assert_eq!(config.capacity(0), 256);
        assert_eq!(config.capacity(1), 512);
        assert_eq!(config.capacity(4), 4096);
    }

    #[test]
    fn capacity_saturates() {
        let config = DocumentConfig::default();
        assert_eq!(config.capacity(45), MAX_POSITION);
        assert_eq!(config.capacity(64), MAX_POSITION);
        assert_eq!(config.capacity(500), MAX_POSITION);
    }

    #[test]
    fn tiny_base_is_lifted() {
        let config = DocumentConfig::default().with_base(0);
        assert_eq!(config.capacity(0), 3);
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: DocumentConfig = serde_json::from_str(r#"{"seed": 7}"#).unwrap();
        assert_eq!(config, DocumentConfig::default().with_seed(7));
    }
}
