//! Core identifier types for bound query plans.
//!
//! These types provide type-safe wrappers around numeric identifiers,
//! preventing accidental misuse of a table index as a column position
//! and vice versa.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Table index - identifies the output of one plan node.
///
/// Every plan node that introduces new columns (scans, projections,
/// aggregates) is assigned a table index when it is created. Column
/// references name a column by `(table index, column position)`.
///
/// # Example
///
/// ```rust
/// use sparse_common::types::TableIndex;
///
/// let idx = TableIndex::new(3);
/// assert_eq!(idx.as_u64(), 3);
/// assert_eq!(idx.next(), TableIndex::new(4));
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct TableIndex(u64);

impl TableIndex {
    /// Invalid table index constant, used as a sentinel value.
    pub const INVALID: Self = Self(u64::MAX);

    /// First valid table index.
    pub const FIRST: Self = Self(0);

    /// Creates a new `TableIndex` from a raw u64 value.
    #[inline]
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw u64 value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the next table index.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Checks if this is a valid table index.
    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != Self::INVALID.0
    }
}

impl fmt::Debug for TableIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "TableIndex(INVALID)")
        } else {
            write!(f, "TableIndex({})", self.0)
        }
    }
}

impl fmt::Display for TableIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for TableIndex {
    #[inline]
    fn from(id: u64) -> Self {
        Self::new(id)
    }
}

impl From<TableIndex> for u64 {
    #[inline]
    fn from(id: TableIndex) -> Self {
        id.0
    }
}

/// Column binding - names one output column of one plan node.
///
/// A binding is only meaningful relative to the plan version it was taken
/// from. Rewriting a node changes the bindings it exposes, and every
/// reference to the old bindings must be repaired.
///
/// # Example
///
/// ```rust
/// use sparse_common::types::{ColumnBinding, TableIndex};
///
/// let binding = ColumnBinding::new(TableIndex::new(2), 5);
/// assert_eq!(binding.to_string(), "#[2.5]");
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ColumnBinding {
    /// The node that produces the column.
    pub table_index: TableIndex,
    /// Position of the column within that node's output.
    pub column_index: usize,
}

impl ColumnBinding {
    /// Creates a new column binding.
    #[inline]
    #[must_use]
    pub const fn new(table_index: TableIndex, column_index: usize) -> Self {
        Self {
            table_index,
            column_index,
        }
    }

    /// Returns the bindings `(table_index, 0..count)`.
    #[must_use]
    pub fn range(table_index: TableIndex, count: usize) -> Vec<Self> {
        (0..count).map(|i| Self::new(table_index, i)).collect()
    }
}

impl fmt::Debug for ColumnBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#[{}.{}]", self.table_index.0, self.column_index)
    }
}

impl fmt::Display for ColumnBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#[{}.{}]", self.table_index.0, self.column_index)
    }
}

/// Allocator for fresh table indices.
///
/// Rewrites that introduce new plan nodes ask the allocator for an index
/// that no other node in the plan uses. The allocator is seeded past the
/// highest index already present in the plan and only ever moves forward.
#[derive(Debug)]
pub struct TableIndexAllocator {
    next: AtomicU64,
}

impl TableIndexAllocator {
    /// Creates an allocator whose first issued index is `first`.
    #[must_use]
    pub fn starting_at(first: TableIndex) -> Self {
        Self {
            next: AtomicU64::new(first.as_u64()),
        }
    }

    /// Creates an allocator that issues indices greater than `max`.
    ///
    /// Pass `None` when the plan has no indexed nodes yet.
    #[must_use]
    pub fn after(max: Option<TableIndex>) -> Self {
        Self::starting_at(max.map_or(TableIndex::FIRST, TableIndex::next))
    }

    /// Issues a new, never before returned, table index.
    pub fn allocate(&self) -> TableIndex {
        TableIndex::new(self.next.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the index the next call to [`allocate`](Self::allocate) will issue.
    #[must_use]
    pub fn peek(&self) -> TableIndex {
        TableIndex::new(self.next.load(Ordering::Relaxed))
    }
}

impl Default for TableIndexAllocator {
    fn default() -> Self {
        Self::starting_at(TableIndex::FIRST)
    }
}
