// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use lsm_planner::{
    BoxedIterator, CompactionKind, Config, InternalValue, ReadOptions, Session, SessionRecord,
    TableFamily, TableMeta, TableOps, ValueType,
};
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
};
use test_log::test;

/// In-memory table store: tables are plain sorted vectors.
#[derive(Default)]
struct MemTableStore {
    tables: Mutex<HashMap<u64, Vec<InternalValue>>>,
    next_id: AtomicU64,
}

impl TableOps for MemTableStore {
    fn create_from(
        &self,
        iter: &mut dyn Iterator<Item = lsm_planner::Result<InternalValue>>,
    ) -> lsm_planner::Result<(TableMeta, usize)> {
        let mut items = Vec::new();
        for item in iter {
            items.push(item?);
        }

        assert!(!items.is_empty(), "flushed memtable cannot be empty");
        assert!(
            items.windows(2).all(|w| w[0].key < w[1].key),
            "memtable stream must be sorted",
        );

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;

        let size = items
            .iter()
            .map(|v| (v.key.user_key.len() + v.value.len() + 9) as u64)
            .sum();

        let meta = TableMeta::new(
            id,
            size,
            items.first().unwrap().key.clone(),
            items.last().unwrap().key.clone(),
        );

        let count = items.len();
        self.tables.lock().unwrap().insert(id, items);

        Ok((meta, count))
    }

    fn table_iter(&self, meta: &TableMeta, _opts: &ReadOptions) -> BoxedIterator<'static> {
        let items = self
            .tables
            .lock()
            .unwrap()
            .get(&meta.id)
            .cloned()
            .unwrap_or_default();

        Box::new(items.into_iter().map(Ok))
    }
}

fn entry(key: &str, value: &str, seqno: u64) -> lsm_planner::Result<InternalValue> {
    Ok(InternalValue::from_components(
        key,
        value,
        seqno,
        ValueType::Value,
    ))
}

/// Installs everything a record appended into the session's version.
fn apply_record(session: &mut Session, record: &SessionRecord) {
    let config = session.config().clone();
    let mut version = session.version();

    for added in record.added_tables() {
        version = version.with_added_table(added.family, added.level, &added.table, &config);
    }

    session.install_version(version);
}

#[test]
fn flush_then_level0_compaction_roundtrip() {
    let config = Config {
        l0_trigger: 2,
        ..Config::default()
    };

    let store = Arc::new(MemTableStore::default());
    let mut session = Session::new(config, store);

    // Two overlapping memtables; "d" exists in both generations
    let mut record = SessionRecord::new();

    let mut mem1 = [entry("a", "1", 1), entry("b", "2", 2), entry("d", "old", 3)].into_iter();
    let level = session
        .flush_memtable(TableFamily::Primary, &mut record, &mut mem1, 0)
        .unwrap();
    assert_eq!(0, level);
    apply_record(&mut session, &record);

    let mut record = SessionRecord::new();
    let mut mem2 = [entry("d", "new", 10), entry("h", "3", 11)].into_iter();
    let level = session
        .flush_memtable(TableFamily::Primary, &mut record, &mut mem2, 0)
        .unwrap();
    assert_eq!(0, level);
    apply_record(&mut session, &record);

    // Two L0 tables trip the trigger
    let version = session.version();
    assert!(version.needs_compaction(TableFamily::Primary));

    let mut compaction = session.pick_compaction(TableFamily::Primary).unwrap();

    assert_eq!(CompactionKind::Level0, compaction.kind());
    assert_eq!(0, compaction.source_level());
    assert_eq!(2, compaction.input(0).len());
    assert!(compaction.input(1).is_empty());
    assert!(!compaction.is_trivial_move());

    // Drive the merge the way the executor would
    let mut merged = Vec::new();
    for item in compaction.iter() {
        let item = item.unwrap();

        assert!(!compaction.should_stop_before(&item.key));

        // Nothing lives below L1, so every tombstone would be droppable
        assert!(compaction.base_level_for_key(&item.key.user_key));

        merged.push(item);
    }

    let keys: Vec<_> = merged
        .iter()
        .map(|v| (v.key.user_key.to_vec(), v.key.seqno))
        .collect();

    // Ascending user keys; the newer "d" comes out before the shadowed one
    assert_eq!(
        vec![
            (b"a".to_vec(), 1),
            (b"b".to_vec(), 2),
            (b"d".to_vec(), 10),
            (b"d".to_vec(), 3),
            (b"h".to_vec(), 11),
        ],
        keys,
    );

    assert_eq!("new", std::str::from_utf8(&merged[2].value).unwrap());

    compaction.release();
}

#[test]
fn seek_hint_triggers_trivial_move() {
    let config = Config::default();
    let store = Arc::new(MemTableStore::default());
    let mut session = Session::new(config, store);

    // One lonely table at L1
    let mut record = SessionRecord::new();
    let mut mem = [entry("m", "1", 1), entry("p", "2", 2)].into_iter();
    let level = session
        .flush_memtable(TableFamily::Primary, &mut record, &mut mem, 1)
        .unwrap();
    assert_eq!(1, level);
    apply_record(&mut session, &record);

    // No size pressure in either family
    for family in TableFamily::ALL {
        assert!(session.pick_compaction(family).is_none());
    }

    // The read path reports the table as seek-heavy
    let version = session.version();
    let table = version.level(TableFamily::Primary, 1).unwrap()[0].clone();
    version.set_seek_hint(TableFamily::Primary, 1, table.clone());

    let compaction = session.pick_compaction(TableFamily::Primary).unwrap();

    assert_eq!(CompactionKind::Seek, compaction.kind());
    assert_eq!(1, compaction.source_level());
    assert_eq!(vec![table], compaction.input(0).to_vec());

    // Nothing below overlaps: a pure metadata move suffices
    assert!(compaction.is_trivial_move());

    // The hint survives planning; clearing it is the engine's job
    assert!(version.seek_hint(TableFamily::Primary).is_some());
}

#[test]
fn deep_level_merge_reads_through_level_readers() {
    let config = Config {
        level_base_size: 32, // L1 overflows immediately
        table_base_size: 1_024,
        ..Config::default()
    };

    let store = Arc::new(MemTableStore::default());
    let mut session = Session::new(config, store);

    // L1: [a..c], [d..f] / L2: [b..e]
    let mut record = SessionRecord::new();

    let mut l2_mem = [entry("b", "l2", 1), entry("e", "l2", 2)].into_iter();
    assert_eq!(
        2,
        session
            .flush_memtable(TableFamily::Primary, &mut record, &mut l2_mem, 2)
            .unwrap(),
    );
    apply_record(&mut session, &record);

    let mut record = SessionRecord::new();

    let mut l1_mem_a = [entry("a", "l1", 10), entry("c", "l1", 11)].into_iter();
    let mut l1_mem_b = [entry("d", "l1", 12), entry("f", "l1", 13)].into_iter();

    // Cap the flush level at 1 so both tables land above the L2 table
    assert_eq!(
        1,
        session
            .flush_memtable(TableFamily::Primary, &mut record, &mut l1_mem_a, 1)
            .unwrap(),
    );
    assert_eq!(
        1,
        session
            .flush_memtable(TableFamily::Primary, &mut record, &mut l1_mem_b, 1)
            .unwrap(),
    );
    apply_record(&mut session, &record);

    let compaction = session.pick_compaction(TableFamily::Primary).unwrap();

    assert_eq!(CompactionKind::NonLevel0, compaction.kind());
    assert_eq!(1, compaction.source_level());

    // The second L1 table is pulled in for free: the L2 table spans into
    // its range anyway
    assert_eq!(2, compaction.input(0).len());
    assert_eq!(1, compaction.input(1).len());

    let keys: Vec<_> = compaction
        .iter()
        .map(|item| item.unwrap().key.user_key.to_vec())
        .collect();

    assert_eq!(
        vec![
            b"a".to_vec(),
            b"b".to_vec(),
            b"c".to_vec(),
            b"d".to_vec(),
            b"e".to_vec(),
            b"f".to_vec(),
        ],
        keys,
    );
}
