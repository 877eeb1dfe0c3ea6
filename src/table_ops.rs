// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{merge::BoxedIterator, InternalValue, TableMeta};

/// How a table should be read during compaction
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ReadOptions {
    /// Whether blocks read for this iterator may populate the block cache.
    ///
    /// Compaction reads every input exactly once, so they never do.
    pub fill_cache: bool,

    /// Whether corrupt table data fails the read (`Err` item) instead of
    /// being skipped.
    pub strict: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            fill_cache: true,
            strict: true,
        }
    }
}

/// The on-disk sorted-table boundary.
///
/// The planner itself never touches table bytes; building tables during a
/// flush and streaming them during a compaction both go through this
/// capability, which the engine passes in as `Arc<dyn TableOps>`.
pub trait TableOps: Send + Sync {
    /// Builds exactly one immutable sorted table from an ordered
    /// key/value stream.
    ///
    /// Returns the new table's descriptor and the number of entries
    /// written.
    fn create_from(
        &self,
        iter: &mut dyn Iterator<Item = crate::Result<InternalValue>>,
    ) -> crate::Result<(TableMeta, usize)>;

    /// Opens an iterator over one table.
    ///
    /// Read failures surface as `Err` items of the returned iterator.
    fn table_iter(&self, meta: &TableMeta, opts: &ReadOptions) -> BoxedIterator<'static>;
}
