// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The planning session: current version, compact pointers, and the
//! compaction pickers

pub(crate) mod record;

pub use record::{NewTable, SessionRecord};

use crate::{
    compaction::{Compaction, CompactionKind},
    key::InternalKey,
    table_ops::TableOps,
    Config, TableFamily, Version,
};
use std::sync::Arc;

/// Planner state shared by all compactions of one tree.
///
/// A session tracks the currently installed [`Version`] and one compact
/// pointer per family and level (the largest internal key compacted there
/// last time), which round-robins size compactions across the keyspace.
///
/// The session itself requires external synchronization: the engine must
/// drive at most one planner at a time. Only the version's seek hint is
/// touched concurrently, and that one is wait-free.
pub struct Session {
    config: Config,
    tops: Arc<dyn TableOps>,
    current: Version,
    compact_pointers: [Vec<Option<InternalKey>>; 2],
}

impl Session {
    /// Creates a session starting from an empty version.
    #[must_use]
    pub fn new(config: Config, tops: Arc<dyn TableOps>) -> Self {
        let current = Version::new(0, &config);
        let compact_pointers = [
            vec![None; config.level_count],
            vec![None; config.level_count],
        ];

        Self {
            config,
            tops,
            current,
            compact_pointers,
        }
    }

    /// Returns the planner configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn table_ops(&self) -> &Arc<dyn TableOps> {
        &self.tops
    }

    /// Acquires a handle to the current version.
    #[must_use]
    pub fn version(&self) -> Version {
        self.current.clone()
    }

    /// Installs a new current version.
    pub fn install_version(&mut self, version: Version) {
        self.current = version;
    }

    /// Returns the compact pointer of a level, if any compaction has run
    /// there before.
    // NOTE: The family index is 0 or 1 by construction
    #[allow(clippy::indexing_slicing)]
    #[must_use]
    pub fn compact_pointer(&self, family: TableFamily, level: usize) -> Option<&InternalKey> {
        self.compact_pointers[family.index()]
            .get(level)
            .and_then(Option::as_ref)
    }

    /// Records the largest internal key compacted at a level, so the next
    /// size compaction there resumes behind it.
    // NOTE: The family index is 0 or 1 by construction
    #[allow(clippy::indexing_slicing)]
    pub fn set_compact_pointer(&mut self, family: TableFamily, level: usize, key: InternalKey) {
        if let Some(slot) = self.compact_pointers[family.index()].get_mut(level) {
            *slot = Some(key);
        }
    }

    /// Picks the next compaction for a family, or `None` if neither the
    /// size nor the seek trigger fires.
    ///
    /// Size pressure wins over seek hints. The seek hint is only read
    /// here, never cleared; resetting it is the engine's call once the
    /// compaction actually ran.
    #[must_use]
    pub fn pick_compaction(&self, family: TableFamily) -> Option<Compaction> {
        let version = self.version();

        let (source_level, seed, kind) = if version.compaction_score(family) >= 1.0 {
            let source_level = version.compaction_level(family);
            let tables = version.level(family, source_level)?;

            let pointer = self.compact_pointer(family, source_level);

            // Round-robin across the keyspace: resume behind the last
            // compacted key, wrap to the front once nothing is past it.
            let seed = tables
                .iter()
                .find(|t| pointer.is_none_or(|p| t.max > *p))
                .or_else(|| tables.first())?
                .clone();

            let kind = if source_level == 0 {
                CompactionKind::Level0
            } else {
                CompactionKind::NonLevel0
            };

            (source_level, seed, kind)
        } else {
            let hint = version.seek_hint(family)?;
            (hint.level, hint.table.clone(), CompactionKind::Seek)
        };

        Some(Compaction::new(
            version,
            family,
            source_level,
            vec![seed],
            kind,
            &self.config,
            self.tops.clone(),
        ))
    }

    /// Builds a compaction from an explicit user-supplied key range, e.g.
    /// for an administrative range-compact. Returns `None` if no file
    /// overlaps the range.
    #[must_use]
    pub fn compaction_range(
        &self,
        family: TableFamily,
        source_level: usize,
        umin: &[u8],
        umax: &[u8],
        no_limit: bool,
    ) -> Option<Compaction> {
        let version = self.version();

        let files = version.level(family, source_level)?;
        let mut seed = files.overlapping(umin, umax, source_level == 0);

        if seed.is_empty() {
            return None;
        }

        // Avoid compacting too much in one shot in case the range is
        // large. Level 0 is exempt: its tables overlap each other, and an
        // older table must never be dropped while a newer overlapping one
        // is picked.
        if !no_limit && source_level > 0 {
            let limit = self.config.compaction_source_limit(source_level);
            let mut total = 0;

            for (idx, table) in seed.iter().enumerate() {
                total += table.size;

                if total >= limit {
                    log::debug!("table@compaction limiting F·{} -> F·{}", seed.len(), idx + 1);
                    seed.truncate(idx + 1);
                    break;
                }
            }
        }

        let kind = if source_level == 0 {
            CompactionKind::Level0
        } else {
            CompactionKind::NonLevel0
        };

        Some(Compaction::new(
            version,
            family,
            source_level,
            seed,
            kind,
            &self.config,
            self.tops.clone(),
        ))
    }
}
