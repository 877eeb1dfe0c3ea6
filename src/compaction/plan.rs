// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    compaction::CompactionKind,
    key::InternalKey,
    level::{aggregate_range, total_size, LevelFiles},
    level_reader::LevelReader,
    merge::{BoxedIterator, Merger},
    table_ops::{ReadOptions, TableOps},
    Config, KeyRange, TableFamily, TableMeta, Version,
};
use humansize::{format_size, BINARY};
use std::sync::Arc;

/// A planned merge job over one or two adjacent levels of one family.
///
/// A plan is produced by [`Session::pick_compaction`] or
/// [`Session::compaction_range`] and then driven by the executor: it reads
/// [`Compaction::iter`], rolls its output files at
/// [`Compaction::should_stop_before`], elides tombstones through
/// [`Compaction::base_level_for_key`], and finally drops the plan.
///
/// The plan owns one handle to the version it was planned against; the
/// handle is released when the plan is dropped (or explicitly via
/// [`Compaction::release`]).
///
/// [`Session::pick_compaction`]: crate::Session::pick_compaction
/// [`Session::compaction_range`]: crate::Session::compaction_range
pub struct Compaction {
    kind: CompactionKind,
    family: TableFamily,
    source_level: usize,

    /// Input tables: `[0]` from the source level, `[1]` from the level
    /// below it
    inputs: [Vec<TableMeta>; 2],

    /// Tables of `source_level + 2` overlapping the compaction range
    grandparents: Vec<TableMeta>,

    /// Grandparent bytes one output file may overlap before it is rolled
    max_gp_overlaps: u64,

    /// Inclusive internal-key range of the source inputs
    min: InternalKey,
    max: InternalKey,

    // Cursors advanced while the executor feeds keys through the
    // predicates. `table_ptrs` is indexed by absolute level.
    table_ptrs: Vec<usize>,
    gp_index: usize,
    seen_key: bool,
    gp_overlapped_bytes: u64,

    // One generation of cursor snapshot for restore()
    snap_table_ptrs: Vec<usize>,
    snap_gp_index: usize,
    snap_seen_key: bool,
    snap_gp_overlapped_bytes: u64,

    /// The owned version handle; `None` once released
    version: Option<Version>,

    tops: Arc<dyn TableOps>,
    read_opts: ReadOptions,
}

impl Compaction {
    pub(crate) fn new(
        version: Version,
        family: TableFamily,
        source_level: usize,
        seed: Vec<TableMeta>,
        kind: CompactionKind,
        config: &Config,
        tops: Arc<dyn TableOps>,
    ) -> Self {
        assert!(!seed.is_empty(), "compaction seed cannot be empty");

        #[allow(clippy::expect_used)]
        let (min, max) = aggregate_range(seed.iter()).expect("seed is not empty");

        let level_count = version.level_count();

        let mut compaction = Self {
            kind,
            family,
            source_level,
            inputs: [seed, Vec::new()],
            grandparents: Vec::new(),
            max_gp_overlaps: config.max_grandparent_overlap(source_level),
            min,
            max,
            table_ptrs: vec![0; level_count],
            gp_index: 0,
            seen_key: false,
            gp_overlapped_bytes: 0,
            snap_table_ptrs: Vec::with_capacity(level_count),
            snap_gp_index: 0,
            snap_seen_key: false,
            snap_gp_overlapped_bytes: 0,
            version: Some(version),
            tops,
            read_opts: ReadOptions {
                fill_cache: false,
                strict: config.strict_compaction,
            },
        };

        compaction.expand(config.compaction_expand_limit(source_level));
        compaction.save();
        compaction
    }

    /// What triggered this compaction.
    #[must_use]
    pub fn kind(&self) -> CompactionKind {
        self.kind
    }

    /// The table family being compacted.
    #[must_use]
    pub fn family(&self) -> TableFamily {
        self.family
    }

    /// The level the inputs are merged out of.
    #[must_use]
    pub fn source_level(&self) -> usize {
        self.source_level
    }

    /// Input tables of the source level (`idx == 0`) or the level below
    /// it (`idx == 1`).
    #[must_use]
    pub fn input(&self, idx: usize) -> &[TableMeta] {
        self.inputs.get(idx).map_or(&[], Vec::as_slice)
    }

    /// Grandparent tables overlapping the compaction.
    #[must_use]
    pub fn grandparents(&self) -> &[TableMeta] {
        &self.grandparents
    }

    /// Inclusive internal-key range of the source inputs.
    #[must_use]
    pub fn range(&self) -> (&InternalKey, &InternalKey) {
        (&self.min, &self.max)
    }

    /// Inclusive user-key range of the source inputs.
    #[must_use]
    pub fn user_range(&self) -> KeyRange {
        KeyRange::new((self.min.user_key.clone(), self.max.user_key.clone()))
    }

    #[allow(clippy::expect_used)]
    fn version(&self) -> &Version {
        self.version
            .as_ref()
            .expect("compaction plan was already released")
    }

    /// Grows the input set while the next level's contribution stays put.
    ///
    /// Level-0 seeds are first re-grown transitively, because user keys
    /// may hop across overlapping L0 tables. Then one single-shot growth
    /// of the source set is attempted; it is only adopted if it does not
    /// pull in any additional next-level table, otherwise cascading
    /// expansion could enlarge the job without bound.
    fn expand(&mut self, limit: u64) {
        let version = self.version().clone();

        #[allow(clippy::expect_used)]
        let vt0 = version
            .level(self.family, self.source_level)
            .expect("source level must exist");
        let empty = LevelFiles::empty();
        let vt1 = version
            .level(self.family, self.source_level + 1)
            .unwrap_or(&empty);

        let mut t0 = std::mem::take(&mut self.inputs[0]);
        let mut t1 = std::mem::take(&mut self.inputs[1]);

        #[allow(clippy::expect_used)]
        let (mut min, mut max) =
            aggregate_range(t0.iter()).expect("compaction inputs cannot be empty");

        // For non-zero levels, the user key can't hop across tables at all.
        if self.source_level == 0 {
            let seed_len = t0.len();
            t0 = vt0.overlapping(min.user_key(), max.user_key(), true);

            if t0.len() != seed_len {
                #[allow(clippy::expect_used)]
                let range = aggregate_range(t0.iter()).expect("grown seed cannot be empty");
                (min, max) = range;
            }
        }

        t1 = vt1.overlapping(min.user_key(), max.user_key(), false);

        // Entire range covered by the compaction
        #[allow(clippy::expect_used)]
        let (mut amin, mut amax) =
            aggregate_range(t0.iter().chain(t1.iter())).expect("inputs cannot be empty");

        // See if we can grow the number of source-level inputs without
        // changing the number of next-level tables we pick up.
        if !t1.is_empty() {
            let exp0 = vt0.overlapping(amin.user_key(), amax.user_key(), self.source_level == 0);

            if exp0.len() > t0.len() && total_size(&t1) + total_size(&exp0) < limit {
                #[allow(clippy::expect_used)]
                let (xmin, xmax) =
                    aggregate_range(exp0.iter()).expect("grown inputs cannot be empty");

                let exp1 = vt1.overlapping(xmin.user_key(), xmax.user_key(), false);

                if exp1.len() == t1.len() {
                    log::debug!(
                        "table@compaction expanding L{}+L{} (F·{} S·{})+(F·{} S·{}) -> (F·{} S·{})+(F·{} S·{})",
                        self.source_level,
                        self.source_level + 1,
                        t0.len(),
                        format_size(total_size(&t0), BINARY),
                        t1.len(),
                        format_size(total_size(&t1), BINARY),
                        exp0.len(),
                        format_size(total_size(&exp0), BINARY),
                        exp1.len(),
                        format_size(total_size(&exp1), BINARY),
                    );

                    (min, max) = (xmin, xmax);
                    (t0, t1) = (exp0, exp1);

                    #[allow(clippy::expect_used)]
                    let range = aggregate_range(t0.iter().chain(t1.iter()))
                        .expect("inputs cannot be empty");
                    (amin, amax) = range;
                }
            }
        }

        // Grandparents: the tables the outputs of this compaction will
        // have to be merged into one level later
        if let Some(gp_level) = version.level(self.family, self.source_level + 2) {
            self.grandparents = gp_level.overlapping(amin.user_key(), amax.user_key(), false);
        }

        self.inputs = [t0, t1];
        self.min = min;
        self.max = max;
    }

    /// Captures the cursor state so a mid-compaction abort can rewind.
    ///
    /// Exactly one generation is retained; calling this twice overwrites
    /// the previous snapshot.
    pub fn save(&mut self) {
        self.snap_gp_index = self.gp_index;
        self.snap_seen_key = self.seen_key;
        self.snap_gp_overlapped_bytes = self.gp_overlapped_bytes;
        self.snap_table_ptrs.clear();
        self.snap_table_ptrs.extend_from_slice(&self.table_ptrs);
    }

    /// Rewinds the cursor state to the last [`Compaction::save`], so a
    /// retried run emits identical output.
    pub fn restore(&mut self) {
        self.gp_index = self.snap_gp_index;
        self.seen_key = self.snap_seen_key;
        self.gp_overlapped_bytes = self.snap_gp_overlapped_bytes;
        self.table_ptrs.clear();
        self.table_ptrs.extend_from_slice(&self.snap_table_ptrs);
    }

    /// Releases the owned version handle.
    ///
    /// Idempotent; also happens when the plan is dropped.
    pub fn release(&mut self) {
        self.version = None;
    }

    /// Returns `true` if this compaction can be executed as a pure
    /// metadata move of its single input file to the next level.
    #[must_use]
    pub fn is_trivial_move(&self) -> bool {
        self.inputs[0].len() == 1
            && self.inputs[1].is_empty()
            && total_size(&self.grandparents) <= self.max_gp_overlaps
    }

    /// Returns `true` if the writer must roll to a new output file
    /// *before* writing `key`.
    ///
    /// Bounds how many grandparent bytes a single new output at
    /// `source_level + 1` can overlap, which in turn bounds the size of
    /// the future compaction that pushes it down. Never fires for the
    /// first key of a compaction. Keys must be fed in ascending order.
    pub fn should_stop_before(&mut self, key: &InternalKey) -> bool {
        while let Some(gp) = self.grandparents.get(self.gp_index) {
            if *key <= gp.max {
                break;
            }

            if self.seen_key {
                self.gp_overlapped_bytes += gp.size;
            }

            self.gp_index += 1;
        }

        self.seen_key = true;

        if self.gp_overlapped_bytes > self.max_gp_overlaps {
            // Too much overlap for current output; start new output
            self.gp_overlapped_bytes = 0;
            true
        } else {
            false
        }
    }

    /// Returns `true` if no level below the compaction's output can
    /// contain `ukey`, meaning a tombstone for it may be dropped.
    ///
    /// Cursors advance monotonically, which is sound because the merge
    /// delivers user keys in ascending order.
    pub fn base_level_for_key(&mut self, ukey: &[u8]) -> bool {
        let Some(version) = &self.version else {
            return true;
        };

        let levels = version.levels(self.family);
        let ptrs = &mut self.table_ptrs;

        for level in (self.source_level + 2)..levels.len() {
            let (Some(tables), Some(ptr)) = (levels.get(level), ptrs.get_mut(level)) else {
                break;
            };

            while let Some(table) = tables.get(*ptr) {
                if ukey <= &*table.max.user_key {
                    // We've advanced far enough
                    if ukey >= &*table.min.user_key {
                        // Key falls in this file's range, so definitely
                        // not base level
                        return false;
                    }
                    break;
                }

                *ptr += 1;
            }
        }

        true
    }

    /// Builds the merged iterator over all input tables.
    ///
    /// Level-0 inputs get one leaf iterator each (they may overlap one
    /// another) and are fed newest-first; deeper inputs are read through
    /// a lazily-opening [`LevelReader`] per level. Either way, ties in
    /// user key come out newest first, so the feeding order of the L0
    /// leaves is not observable.
    #[must_use]
    pub fn iter(&self) -> Merger<'static> {
        let cap = if self.source_level == 0 {
            self.inputs[0].len() + 1
        } else {
            self.inputs.len()
        };
        let mut iters: Vec<BoxedIterator<'static>> = Vec::with_capacity(cap);

        for (idx, tables) in self.inputs.iter().enumerate() {
            if tables.is_empty() {
                continue;
            }

            // Level-0 is not sorted and tables may overlap each other
            if self.source_level + idx == 0 {
                for table in tables {
                    iters.push(self.tops.table_iter(table, &self.read_opts));
                }
            } else {
                iters.push(Box::new(LevelReader::new(
                    tables.clone(),
                    self.tops.clone(),
                    self.read_opts,
                )));
            }
        }

        Merger::new(iters)
    }
}
