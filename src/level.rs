// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{binary_search::partition_point, key::InternalKey, TableMeta};

/// Computes the inclusive internal-key bounds of a set of tables.
///
/// Works for unsorted (level 0) lists as well, so it always scans.
pub(crate) fn aggregate_range<'a>(
    files: impl Iterator<Item = &'a TableMeta>,
) -> Option<(InternalKey, InternalKey)> {
    let mut range: Option<(InternalKey, InternalKey)> = None;

    for file in files {
        range = Some(match range {
            None => (file.min.clone(), file.max.clone()),
            Some((min, max)) => (
                if file.min < min { file.min.clone() } else { min },
                if file.max > max { file.max.clone() } else { max },
            ),
        });
    }

    range
}

/// Sums the file sizes of a set of tables.
pub(crate) fn total_size(files: &[TableMeta]) -> u64 {
    files.iter().map(|t| t.size).sum()
}

/// The ordered list of sorted tables of one level.
///
/// Level 0 files may overlap each other and are kept newest-first by
/// table ID. Files of deeper levels are disjoint in user-key range and
/// kept in ascending order of their smallest key.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct LevelFiles(Vec<TableMeta>);

impl std::ops::Deref for LevelFiles {
    type Target = [TableMeta];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl LevelFiles {
    /// Creates an empty level.
    #[must_use]
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Creates a level-0 file list, ordered newest-first.
    #[must_use]
    pub fn level0(mut files: Vec<TableMeta>) -> Self {
        files.sort_unstable_by(|a, b| b.id.cmp(&a.id));
        Self(files)
    }

    /// Creates a disjoint (level >= 1) file list, ordered by smallest key.
    ///
    /// # Panics
    ///
    /// Panics if two files overlap in user-key range; that means the
    /// on-disk state is corrupt and the engine must not continue.
    #[must_use]
    pub fn disjoint(mut files: Vec<TableMeta>) -> Self {
        files.sort_unstable_by(|a, b| a.min.cmp(&b.min));

        for window in files.windows(2) {
            if let [a, b] = window {
                assert!(
                    a.max.user_key < b.min.user_key,
                    "files overlap in a disjoint level: {:?} vs {:?}",
                    a.max,
                    b.min,
                );
            }
        }

        Self(files)
    }

    /// Returns the total file size of the level in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.0.iter().map(|t| t.size).sum()
    }

    /// Returns the inclusive internal-key bounds of the whole level.
    #[must_use]
    pub fn aggregate_range(&self) -> Option<(InternalKey, InternalKey)> {
        aggregate_range(self.0.iter())
    }

    /// Returns `true` if any file intersects `[umin, umax]` (user keys).
    #[must_use]
    pub fn overlaps(&self, umin: &[u8], umax: &[u8], overlap0: bool) -> bool {
        if overlap0 {
            self.0.iter().any(|t| t.overlaps_user_range(umin, umax))
        } else {
            let (lo, hi) = self.overlap_indexes(umin, umax);
            lo < hi
        }
    }

    /// Returns the files intersecting `[umin, umax]` (user keys).
    ///
    /// With `overlap0` set, level-0 semantics apply: any file touching the
    /// range widens it, and the scan restarts so that files which overlap
    /// the selection only transitively are picked up as well. Without it,
    /// the level is assumed disjoint and a binary-searched slice is
    /// returned.
    #[must_use]
    pub fn overlapping(&self, umin: &[u8], umax: &[u8], overlap0: bool) -> Vec<TableMeta> {
        if overlap0 {
            let mut umin = umin.to_vec();
            let mut umax = umax.to_vec();
            let mut dst = Vec::new();

            let mut i = 0;
            while let Some(t) = self.0.get(i) {
                i += 1;

                if !t.overlaps_user_range(&umin, &umax) {
                    continue;
                }

                if &*t.min.user_key < umin.as_slice() {
                    umin = t.min.user_key.to_vec();
                    dst.clear();
                    i = 0;
                    continue;
                }
                if &*t.max.user_key > umax.as_slice() {
                    umax = t.max.user_key.to_vec();
                    dst.clear();
                    i = 0;
                    continue;
                }

                dst.push(t.clone());
            }

            dst
        } else {
            let (lo, hi) = self.overlap_indexes(umin, umax);
            self.0.get(lo..hi).unwrap_or_default().to_vec()
        }
    }

    // Binary-searched [lo, hi) slice of a disjoint level.
    fn overlap_indexes(&self, umin: &[u8], umax: &[u8]) -> (usize, usize) {
        let lo = partition_point(&self.0, |t| &*t.max.user_key < umin);
        let hi = lo
            + partition_point(
                self.0.get(lo..).unwrap_or_default(),
                |t| &*t.min.user_key <= umax,
            );
        (lo, hi)
    }
}

impl From<Vec<TableMeta>> for LevelFiles {
    fn from(files: Vec<TableMeta>) -> Self {
        Self(files)
    }
}
