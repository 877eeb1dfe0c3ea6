// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{level::LevelFiles, Config, TableFamily, TableMeta};
use arc_swap::ArcSwapOption;
use std::sync::Arc;

/// Monotonically increasing ID of a version.
pub type VersionId = u64;

/// A pending seek-triggered compaction: the table that burned through its
/// seek allowance, and the level it lives on.
///
/// Set by the read path, consumed (but never cleared) by the planner.
#[derive(Clone, Debug)]
pub struct SeekHint {
    /// Level the table lives on
    pub level: usize,

    /// The table to compact away
    pub table: TableMeta,
}

/// One table family's slice of a version.
struct FamilyLevels {
    levels: Vec<LevelFiles>,

    /// Size pressure of the most oversized level; >= 1 means a size
    /// compaction is due.
    compaction_score: f64,

    /// The level `compaction_score` belongs to.
    compaction_level: usize,

    /// Wait-free seek-compaction hint.
    seek_hint: ArcSwapOption<SeekHint>,
}

impl FamilyLevels {
    fn new(mut levels: Vec<LevelFiles>, config: &Config) -> Self {
        levels.resize(config.level_count, LevelFiles::empty());

        let (compaction_score, compaction_level) = compute_score(&levels, config);

        Self {
            levels,
            compaction_score,
            compaction_level,
            seek_hint: ArcSwapOption::empty(),
        }
    }
}

/// Size scoring: level 0 by file count against the trigger, deeper levels
/// by total bytes against the level's target size. The last level is never
/// scored; there is nowhere to push its data.
#[allow(clippy::cast_precision_loss)]
fn compute_score(levels: &[LevelFiles], config: &Config) -> (f64, usize) {
    let mut best_level = 0;
    let mut best_score = levels
        .first()
        .map_or(0.0, |l0| l0.len() as f64 / config.l0_trigger as f64);

    for (level, files) in levels.iter().enumerate().skip(1) {
        if level == levels.len() - 1 {
            break;
        }

        let score = files.size() as f64 / config.level_target_size(level) as f64;

        if score > best_score {
            best_level = level;
            best_score = score;
        }
    }

    (best_score, best_level)
}

pub(crate) struct VersionInner {
    id: VersionId,
    families: [FamilyLevels; 2],
}

/// A version is an immutable, point-in-time view of both families' levels.
///
/// Any time a table is created or deleted, a new version is installed.
/// Versions are reference counted; a clone acquires a handle, dropping it
/// releases the handle. A [`Compaction`](crate::Compaction) owns exactly
/// one handle for its whole lifetime.
#[derive(Clone)]
pub struct Version {
    pub(crate) inner: Arc<VersionInner>,
}

impl Version {
    /// Creates a new empty version.
    #[must_use]
    pub fn new(id: VersionId, config: &Config) -> Self {
        Self::from_levels(id, Vec::new(), Vec::new(), config)
    }

    /// Creates a pre-populated version and computes its compaction scores.
    ///
    /// Missing trailing levels are padded with empty file lists up to the
    /// configured level count.
    #[must_use]
    pub fn from_levels(
        id: VersionId,
        primary: Vec<LevelFiles>,
        secondary: Vec<LevelFiles>,
        config: &Config,
    ) -> Self {
        Self {
            inner: Arc::new(VersionInner {
                id,
                families: [
                    FamilyLevels::new(primary, config),
                    FamilyLevels::new(secondary, config),
                ],
            }),
        }
    }

    /// Returns the version ID.
    #[must_use]
    pub fn id(&self) -> VersionId {
        self.inner.id
    }

    /// Returns the number of levels.
    #[must_use]
    pub fn level_count(&self) -> usize {
        self.family(TableFamily::Primary).levels.len()
    }

    // NOTE: The index is 0 or 1 by construction
    #[allow(clippy::indexing_slicing)]
    fn family(&self, family: TableFamily) -> &FamilyLevels {
        &self.inner.families[family.index()]
    }

    /// Returns one family's levels.
    #[must_use]
    pub fn levels(&self, family: TableFamily) -> &[LevelFiles] {
        &self.family(family).levels
    }

    /// Gets the n-th level of a family.
    #[must_use]
    pub fn level(&self, family: TableFamily, n: usize) -> Option<&LevelFiles> {
        self.family(family).levels.get(n)
    }

    /// Returns the family's size-compaction score.
    #[must_use]
    pub fn compaction_score(&self, family: TableFamily) -> f64 {
        self.family(family).compaction_score
    }

    /// Returns the level the size-compaction score belongs to.
    #[must_use]
    pub fn compaction_level(&self, family: TableFamily) -> usize {
        self.family(family).compaction_level
    }

    /// Returns `true` if either trigger (size or seek) fires for the family.
    #[must_use]
    pub fn needs_compaction(&self, family: TableFamily) -> bool {
        self.compaction_score(family) >= 1.0 || self.seek_hint(family).is_some()
    }

    /// Loads the family's seek-compaction hint. Wait-free.
    #[must_use]
    pub fn seek_hint(&self, family: TableFamily) -> Option<Arc<SeekHint>> {
        self.family(family).seek_hint.load_full()
    }

    /// Publishes a seek-compaction hint for the family. Wait-free.
    ///
    /// Called by the read path when a table has wasted too many seeks.
    /// An existing hint is replaced.
    pub fn set_seek_hint(&self, family: TableFamily, level: usize, table: TableMeta) {
        self.family(family)
            .seek_hint
            .store(Some(Arc::new(SeekHint { level, table })));
    }

    /// Clears the family's seek-compaction hint.
    ///
    /// The planner never does this; the engine does, once the triggered
    /// compaction has actually run (or become moot).
    pub fn clear_seek_hint(&self, family: TableFamily) {
        self.family(family).seek_hint.store(None);
    }

    /// Returns a new version with one table added at the given level.
    ///
    /// Scores are recomputed; the seek hint starts out empty.
    #[must_use]
    pub fn with_added_table(
        &self,
        family: TableFamily,
        level: usize,
        table: &TableMeta,
        config: &Config,
    ) -> Self {
        let build = |f: TableFamily| {
            let mut levels: Vec<LevelFiles> = self.levels(f).to_vec();

            if f == family {
                if let Some(files) = levels.get_mut(level) {
                    let mut tables = files.to_vec();
                    tables.push(table.clone());

                    *files = if level == 0 {
                        LevelFiles::level0(tables)
                    } else {
                        LevelFiles::disjoint(tables)
                    };
                }
            }

            levels
        };

        Self::from_levels(
            self.id() + 1,
            build(TableFamily::Primary),
            build(TableFamily::Secondary),
            config,
        )
    }

    /// Picks the level a freshly flushed table covering `[umin, umax]`
    /// should land on.
    ///
    /// Restricting flushes to level 0 on strictly incrementing key-spaces
    /// traps deletion markers at low levels while live keys pile up
    /// higher, so the deepest level is picked at which the table overlaps
    /// nothing at that level or its parent, and overlaps at most the
    /// configured grandparent budget.
    #[must_use]
    pub fn pick_table_level(
        &self,
        family: TableFamily,
        umin: &[u8],
        umax: &[u8],
        max_level: usize,
        config: &Config,
    ) -> usize {
        let levels = self.levels(family);
        let mut level = 0;

        if max_level == 0 || levels.is_empty() {
            return 0;
        }

        if let Some(l0) = levels.first() {
            if l0.overlaps(umin, umax, true) {
                return 0;
            }
        }

        while level < max_level {
            match levels.get(level + 1) {
                None => return max_level,
                Some(parent) => {
                    if parent.overlaps(umin, umax, false) {
                        break;
                    }
                }
            }

            if let Some(grandparent) = levels.get(level + 2) {
                let overlap: u64 = grandparent
                    .overlapping(umin, umax, false)
                    .iter()
                    .map(|t| t.size)
                    .sum();

                if overlap > config.max_grandparent_overlap(level) {
                    break;
                }
            }

            level += 1;
        }

        level
    }
}
