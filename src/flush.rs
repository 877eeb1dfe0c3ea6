// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{InternalValue, Session, SessionRecord, TableFamily, TableOps as _};
use humansize::{format_size, BINARY};

impl Session {
    /// Materializes a frozen memtable into exactly one sorted table and
    /// records where it lands.
    ///
    /// The table is built through [`TableOps::create_from`], the target
    /// level is picked with [`Version::pick_table_level`] from the new
    /// table's user-key bounds, and an `add_table_file` entry is appended
    /// to `record`. Returns the picked level.
    ///
    /// On a table-build failure the error is returned as-is and `record`
    /// stays untouched.
    ///
    /// [`TableOps::create_from`]: crate::TableOps::create_from
    /// [`Version::pick_table_level`]: crate::Version::pick_table_level
    pub fn flush_memtable(
        &self,
        family: TableFamily,
        record: &mut SessionRecord,
        entries: &mut dyn Iterator<Item = crate::Result<InternalValue>>,
        max_level: usize,
    ) -> crate::Result<usize> {
        let (table, entry_count) = self.table_ops().create_from(entries)?;

        let version = self.version();
        let level = version.pick_table_level(
            family,
            table.min.user_key(),
            table.max.user_key(),
            max_level,
            self.config(),
        );

        record.add_table_file(family, level, table.clone());

        log::debug!(
            "memdb@flush created L{}@{} N·{} S·{} {:?}:{:?}",
            level,
            table.id,
            entry_count,
            format_size(table.size, BINARY),
            table.min,
            table.max,
        );

        Ok(level)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::{
        key::InternalKey,
        level::LevelFiles,
        merge::BoxedIterator,
        table_ops::{ReadOptions, TableOps},
        Config, Error, TableMeta, ValueType, Version,
    };
    use std::sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    };
    use test_log::test;

    /// Builds a descriptor covering the streamed entries; fails when the
    /// stream fails.
    #[derive(Default)]
    struct RecordingTableOps {
        next_id: AtomicU64,
    }

    impl TableOps for RecordingTableOps {
        fn create_from(
            &self,
            iter: &mut dyn Iterator<Item = crate::Result<InternalValue>>,
        ) -> crate::Result<(TableMeta, usize)> {
            let mut items = Vec::new();
            for item in iter {
                items.push(item?);
            }

            let min = items.first().map(|v| v.key.clone()).ok_or_else(|| {
                Error::Corruption("flush stream was empty".into())
            })?;
            let max = items.last().map(|v| v.key.clone()).unwrap_or_else(|| min.clone());

            let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;

            Ok((TableMeta::new(id, 100 * items.len() as u64, min, max), items.len()))
        }

        fn table_iter(&self, _meta: &TableMeta, _opts: &ReadOptions) -> BoxedIterator<'static> {
            Box::new(std::iter::empty())
        }
    }

    fn entry(key: &str, seqno: u64) -> crate::Result<InternalValue> {
        Ok(InternalValue::from_components(
            key,
            "v",
            seqno,
            ValueType::Value,
        ))
    }

    fn table(id: u64, min: &str, max: &str, size: u64) -> TableMeta {
        TableMeta::new(
            id,
            size,
            InternalKey::new(min, 10, ValueType::Value),
            InternalKey::new(max, 5, ValueType::Value),
        )
    }

    #[test]
    fn flush_lands_on_deepest_safe_level() {
        let mut session = Session::new(Config::default(), Arc::new(RecordingTableOps::default()));

        // L0 [h..k], L1 empty, L2 [a..c]
        let version = Version::from_levels(
            1,
            vec![
                LevelFiles::level0(vec![table(90, "h", "k", 100)]),
                LevelFiles::empty(),
                LevelFiles::disjoint(vec![table(91, "a", "c", 100)]),
            ],
            Vec::new(),
            session.config(),
        );
        session.install_version(version);

        let mut record = SessionRecord::new();
        let mut entries = [entry("m", 3), entry("q", 2), entry("z", 1)].into_iter();

        let level = session
            .flush_memtable(TableFamily::Primary, &mut record, &mut entries, 2)
            .unwrap();

        assert_eq!(2, level);

        let added = record.added_tables();
        assert_eq!(1, added.len());
        assert_eq!(TableFamily::Primary, added[0].family);
        assert_eq!(2, added[0].level);
        assert_eq!(b"m", added[0].table.min.user_key());
        assert_eq!(b"z", added[0].table.max.user_key());
        assert_eq!(300, added[0].table.size);
    }

    #[test]
    fn flush_overlapping_l0_stays_at_zero() {
        let mut session = Session::new(Config::default(), Arc::new(RecordingTableOps::default()));

        let version = Version::from_levels(
            1,
            vec![LevelFiles::level0(vec![table(90, "h", "k", 100)])],
            Vec::new(),
            session.config(),
        );
        session.install_version(version);

        let mut record = SessionRecord::new();
        let mut entries = [entry("i", 3), entry("j", 2)].into_iter();

        let level = session
            .flush_memtable(TableFamily::Primary, &mut record, &mut entries, 4)
            .unwrap();

        assert_eq!(0, level);
    }

    #[test]
    fn flush_failure_leaves_record_untouched() {
        let session = Session::new(Config::default(), Arc::new(RecordingTableOps::default()));

        let mut record = SessionRecord::new();
        let mut entries = [
            entry("a", 1),
            Err(Error::Corruption("torn memtable page".into())),
        ]
        .into_iter();

        let result = session.flush_memtable(TableFamily::Primary, &mut record, &mut entries, 4);

        assert!(result.is_err());
        assert!(record.is_empty());
    }
}
