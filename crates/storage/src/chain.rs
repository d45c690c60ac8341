//! Per-entity chain index
//!
//! The table keeps every row in one append-only heap. A `ChainIndex` lists
//! the heap positions of one entity's rows in version order, playing the
//! role of an `(entity_id, version)` index in a relational engine.
//!
//! Positions are stored oldest-first, so `positions[v - 1]` is version `v`
//! and the latest row is always the last entry.

use annal_core::Version;

/// Heap positions of one entity's rows, ascending by version
#[derive(Debug, Clone, Default)]
pub struct ChainIndex {
    positions: Vec<usize>,
}

impl ChainIndex {
    /// Empty chain (entity has no rows yet)
    pub fn new() -> Self {
        Self {
            positions: Vec::with_capacity(4),
        }
    }

    /// Record the heap position of the next version
    #[inline]
    pub fn push(&mut self, position: usize) {
        self.positions.push(position);
    }

    /// Heap position of the latest version
    #[inline]
    pub fn latest(&self) -> Option<usize> {
        self.positions.last().copied()
    }

    /// Heap position of a specific version
    pub fn at(&self, version: Version) -> Option<usize> {
        let idx = usize::try_from(version.as_u64()).ok()?.checked_sub(1)?;
        self.positions.get(idx).copied()
    }

    /// Highest version recorded, `None` if empty
    pub fn max_version(&self) -> Option<Version> {
        Version::new(self.positions.len() as u64)
    }

    /// Version an append to this chain must carry
    pub fn next_version(&self) -> Version {
        match self.max_version() {
            Some(v) => v.next(),
            None => Version::FIRST,
        }
    }

    /// Every position, oldest first
    pub fn positions(&self) -> &[usize] {
        &self.positions
    }

    /// Number of versions
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Whether the chain has no versions
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}
