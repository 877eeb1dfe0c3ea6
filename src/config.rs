// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

/// Planner configuration
///
/// All sizing knobs are per-family; both table families share one config.
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    /// Number of levels (default 7)
    pub level_count: usize,

    /// Number of level-0 tables that triggers a size compaction (default 4)
    pub l0_trigger: usize,

    /// Target size of one sorted table at level 0 (default 2 MiB)
    pub table_base_size: u64,

    /// Per-level growth of the table target size (default 1.0)
    pub table_size_multiplier: f64,

    /// Target total size of level 1 (default 10 MiB)
    pub level_base_size: u64,

    /// Size ratio between consecutive levels (default 10.0)
    pub level_size_multiplier: f64,

    /// Expansion ceiling, in table target sizes (default 25)
    pub expand_limit_factor: u64,

    /// Grandparent overlap ceiling, in table target sizes (default 10)
    pub gp_overlap_factor: u64,

    /// Range-compaction source ceiling, in table target sizes (default 1)
    pub source_limit_factor: u64,

    /// Whether compaction reads fail hard on corrupt table data (default true)
    pub strict_compaction: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            level_count: 7,
            l0_trigger: 4,
            table_base_size:/* 2 MiB */ 2 * 1_024 * 1_024,
            table_size_multiplier: 1.0,
            level_base_size:/* 10 MiB */ 10 * 1_024 * 1_024,
            level_size_multiplier: 10.0,
            expand_limit_factor: 25,
            gp_overlap_factor: 10,
            source_limit_factor: 1,
            strict_compaction: true,
        }
    }
}

impl Config {
    /// Creates a config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of levels.
    ///
    /// # Panics
    ///
    /// Panics if `count` is less than 3 (the planner needs a parent and a
    /// grandparent level above the source).
    #[must_use]
    pub fn level_count(mut self, count: usize) -> Self {
        assert!(count >= 3, "level count should be at least 3");
        self.level_count = count;
        self
    }

    /// Sets the level-0 compaction trigger (number of files).
    #[must_use]
    pub fn l0_trigger(mut self, count: usize) -> Self {
        self.l0_trigger = count;
        self
    }

    /// Sets the table target size at level 0.
    #[must_use]
    pub fn table_base_size(mut self, bytes: u64) -> Self {
        self.table_base_size = bytes;
        self
    }

    /// Sets the target total size of level 1.
    #[must_use]
    pub fn level_base_size(mut self, bytes: u64) -> Self {
        self.level_base_size = bytes;
        self
    }

    /// Sets whether compaction reads fail hard on corrupt table data.
    #[must_use]
    pub fn strict_compaction(mut self, strict: bool) -> Self {
        self.strict_compaction = strict;
        self
    }

    /// Target size of one sorted table at `level`.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn table_target_size(&self, level: usize) -> u64 {
        (self.table_base_size as f64 * self.table_size_multiplier.powi(level as i32)) as u64
    }

    /// Byte ceiling for growing a compaction's input set at `level`.
    #[must_use]
    pub fn compaction_expand_limit(&self, level: usize) -> u64 {
        self.expand_limit_factor * self.table_target_size(level)
    }

    /// Maximum number of grandparent bytes a single compaction output at
    /// `level + 1` may overlap before the writer has to roll its output.
    #[must_use]
    pub fn max_grandparent_overlap(&self, level: usize) -> u64 {
        self.gp_overlap_factor * self.table_target_size(level)
    }

    /// Byte ceiling on the source file set of a range-scoped compaction.
    #[must_use]
    pub fn compaction_source_limit(&self, level: usize) -> u64 {
        self.source_limit_factor * self.table_target_size(level)
    }

    /// Target total size of `level` (level >= 1), used for size scoring.
    ///
    /// L1 is `level_base_size`; every further level is
    /// `level_size_multiplier` times its parent.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn level_target_size(&self, level: usize) -> u64 {
        assert!(level >= 1, "level 0 is scored by file count, not size");

        (self.level_base_size as f64 * self.level_size_multiplier.powi(level as i32 - 1)) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::Config;
    use test_log::test;

    #[test]
    fn config_derived_limits() {
        let config = Config::default();

        assert_eq!(2 * 1_024 * 1_024, config.table_target_size(0));
        assert_eq!(2 * 1_024 * 1_024, config.table_target_size(3));
        assert_eq!(50 * 1_024 * 1_024, config.compaction_expand_limit(1));
        assert_eq!(20 * 1_024 * 1_024, config.max_grandparent_overlap(2));
        assert_eq!(2 * 1_024 * 1_024, config.compaction_source_limit(4));
    }

    #[test]
    fn config_level_targets() {
        let config = Config::default();

        assert_eq!(10 * 1_024 * 1_024, config.level_target_size(1));
        assert_eq!(100 * 1_024 * 1_024, config.level_target_size(2));
    }
}
