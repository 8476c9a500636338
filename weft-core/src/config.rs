//! Runtime configuration.
//!
//! A [`SpaceConfig`] sizes the arena backing a task space. The defaults are
//! intended for general use; tests shrink them to force chunk rotation and
//! exhaustion on purpose.

/// Configuration for a task space and its backing arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpaceConfig {
    /// Number of task slots carved out of each arena chunk.
    pub chunk_capacity: usize,

    /// Upper bound on the total number of chunks the arena may create.
    ///
    /// `None` means the arena grows until the process runs out of memory.
    /// With a bound in place, exceeding it surfaces as
    /// [`EmplaceError::OutOfMemory`](crate::error::EmplaceError::OutOfMemory).
    pub max_chunks: Option<usize>,
}

impl Default for SpaceConfig {
    fn default() -> Self {
        Self {
            chunk_capacity: 256,
            max_chunks: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_unbounded() {
        let config = SpaceConfig::default();
        assert_eq!(config.chunk_capacity, 256);
        assert!(config.max_chunks.is_none());
    }
}
