// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    merge::BoxedIterator,
    table_ops::{ReadOptions, TableOps},
    InternalValue, TableMeta,
};
use std::sync::Arc;

/// Reads through a disjoint list of tables, table by table
///
/// Table iterators are opened lazily, so a reader over a long level only
/// ever holds two open tables (one per direction).
#[allow(clippy::module_name_repetitions)]
pub struct LevelReader {
    tables: Vec<TableMeta>,
    tops: Arc<dyn TableOps>,
    read_opts: ReadOptions,

    lo: usize,
    hi: usize,
    lo_reader: Option<BoxedIterator<'static>>,
    hi_reader: Option<BoxedIterator<'static>>,
}

impl LevelReader {
    /// Creates a reader over a disjoint set of tables.
    ///
    /// # Panics
    ///
    /// Panics if `tables` is empty.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new(tables: Vec<TableMeta>, tops: Arc<dyn TableOps>, read_opts: ReadOptions) -> Self {
        assert!(!tables.is_empty(), "level reader cannot read empty level");

        let lo = 0;
        let hi = tables.len() - 1;

        let lo_reader = tops.table_iter(tables.first().expect("tables are not empty"), &read_opts);

        let hi_reader = if hi > lo {
            Some(tops.table_iter(tables.get(hi).expect("hi is a valid index"), &read_opts))
        } else {
            None
        };

        Self {
            tables,
            tops,
            read_opts,
            lo,
            hi,
            lo_reader: Some(lo_reader),
            hi_reader,
        }
    }
}

impl Iterator for LevelReader {
    type Item = crate::Result<InternalValue>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(lo_reader) = &mut self.lo_reader {
                if let Some(item) = lo_reader.next() {
                    return Some(item);
                }

                // NOTE: Lo reader is empty, get next one
                self.lo_reader = None;
                self.lo += 1;

                if self.lo < self.hi {
                    #[allow(clippy::expect_used)]
                    let table = self.tables.get(self.lo).expect("lo is within bounds");
                    self.lo_reader = Some(self.tops.table_iter(table, &self.read_opts));
                }
            } else if let Some(hi_reader) = &mut self.hi_reader {
                // NOTE: We reached the hi marker, so consume from it instead
                //
                // If it returns nothing, it is empty, so we are done
                return hi_reader.next();
            } else {
                return None;
            }
        }
    }
}

impl DoubleEndedIterator for LevelReader {
    fn next_back(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(hi_reader) = &mut self.hi_reader {
                if let Some(item) = hi_reader.next_back() {
                    return Some(item);
                }

                // NOTE: Hi reader is empty, get prev one
                self.hi_reader = None;
                self.hi -= 1;

                if self.lo < self.hi {
                    #[allow(clippy::expect_used)]
                    let table = self.tables.get(self.hi).expect("hi is within bounds");
                    self.hi_reader = Some(self.tops.table_iter(table, &self.read_opts));
                }
            } else if let Some(lo_reader) = &mut self.lo_reader {
                // NOTE: We reached the lo marker, so consume from it instead
                //
                // If it returns nothing, it is empty, so we are done
                return lo_reader.next_back();
            } else {
                return None;
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::{key::InternalKey, ValueType};
    use std::collections::BTreeMap;
    use test_log::test;

    /// Table store backed by a map of table ID -> sorted items
    #[derive(Default)]
    struct MapTableOps {
        tables: BTreeMap<u64, Vec<InternalValue>>,
    }

    impl TableOps for MapTableOps {
        fn create_from(
            &self,
            _iter: &mut dyn Iterator<Item = crate::Result<InternalValue>>,
        ) -> crate::Result<(TableMeta, usize)> {
            unimplemented!("reader tests never build tables")
        }

        fn table_iter(&self, meta: &TableMeta, _opts: &ReadOptions) -> BoxedIterator<'static> {
            let items = self.tables.get(&meta.id).cloned().unwrap_or_default();
            Box::new(items.into_iter().map(Ok))
        }
    }

    fn item(key: &str, seqno: u64) -> InternalValue {
        InternalValue::from_components(key, "", seqno, ValueType::Value)
    }

    fn fixture() -> (Arc<dyn TableOps>, Vec<TableMeta>) {
        let mut ops = MapTableOps::default();
        let mut metas = Vec::new();

        for (id, keys) in [(1, ["a", "b", "c"]), (2, ["d", "e", "f"]), (3, ["g", "h", "i"])] {
            let items: Vec<_> = keys.iter().map(|k| item(k, 1)).collect();

            metas.push(TableMeta::new(
                id,
                100,
                items.first().unwrap().key.clone(),
                items.last().unwrap().key.clone(),
            ));
            ops.tables.insert(id, items);
        }

        (Arc::new(ops), metas)
    }

    #[test]
    fn level_reader_forward() {
        let (ops, metas) = fixture();
        let reader = LevelReader::new(metas, ops, ReadOptions::default());

        let keys: Vec<_> = reader
            .map(|v| v.unwrap().key.user_key.to_vec())
            .collect();

        assert_eq!(
            vec![b"a", b"b", b"c", b"d", b"e", b"f", b"g", b"h", b"i"]
                .into_iter()
                .map(|b| b.to_vec())
                .collect::<Vec<_>>(),
            keys,
        );
    }

    #[test]
    fn level_reader_backward() {
        let (ops, metas) = fixture();
        let reader = LevelReader::new(metas, ops, ReadOptions::default());

        let keys: Vec<_> = reader
            .rev()
            .map(|v| v.unwrap().key.user_key.to_vec())
            .collect();

        assert_eq!(b"i".to_vec(), keys.first().unwrap().clone());
        assert_eq!(b"a".to_vec(), keys.last().unwrap().clone());
        assert_eq!(9, keys.len());
    }

    #[test]
    fn level_reader_ping_pong() {
        let (ops, metas) = fixture();
        let mut reader = LevelReader::new(metas, ops, ReadOptions::default());

        assert_eq!(
            InternalKey::new("a", 1, ValueType::Value),
            reader.next().unwrap().unwrap().key,
        );
        assert_eq!(
            InternalKey::new("i", 1, ValueType::Value),
            reader.next_back().unwrap().unwrap().key,
        );
        assert_eq!(
            InternalKey::new("b", 1, ValueType::Value),
            reader.next().unwrap().unwrap().key,
        );

        let rest: Vec<_> = reader.map(|v| v.unwrap().key.user_key.to_vec()).collect();
        assert_eq!(
            vec![b"c".to_vec(), b"d".to_vec(), b"e".to_vec(), b"f".to_vec(), b"g".to_vec(), b"h".to_vec()],
            rest,
        );
    }

    #[test]
    fn level_reader_single_table() {
        let (ops, metas) = fixture();
        let reader = LevelReader::new(metas.into_iter().take(1).collect(), ops, ReadOptions::default());

        assert_eq!(3, reader.count());
    }
}
