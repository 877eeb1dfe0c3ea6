// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Compaction selection and planning core for leveled LSM-trees.
//!
//! ##### NOTE
//!
//! > This crate only decides *what* to merge, it is not a storage engine.
//! > Reading and writing sorted tables, journaling version edits and
//! > scheduling background work are the surrounding engine's job; the
//! > planner talks to them through the [`TableOps`] and [`SessionRecord`]
//! > boundaries.
//!
//! ##### About
//!
//! An LSM-tree accumulates immutable sorted tables, organized into
//! levels: level 0 holds freshly flushed tables that may overlap each
//! other, deeper levels are sorted runs of disjoint tables. Merging
//! tables downwards keeps reads fast and space bounded, but *which*
//! tables get merged, and when, decides how much write amplification the
//! tree pays.
//!
//! This crate implements that decision for two parallel table families
//! sharing one key space:
//!
//! - [`Session::pick_compaction`] turns size pressure (an oversized
//!   level) or read pressure (a table wasting seeks) into a
//!   [`Compaction`] plan,
//! - [`Session::compaction_range`] plans an administrative range-compact,
//! - [`Session::flush_memtable`] places a freshly flushed memtable at the
//!   deepest level it cannot conflict with,
//! - [`Compaction`] itself grows its input set while next-level fan-in
//!   stays put, bounds output files by grandparent overlap
//!   ([`Compaction::should_stop_before`]), tells the merge loop when a
//!   tombstone may be dropped ([`Compaction::base_level_for_key`]), and
//!   assembles the merged input iterator ([`Compaction::iter`]).
//!
//! # Example
//!
//! ```
//! use lsm_planner::{Config, Session, TableFamily};
//! # use lsm_planner::{InternalValue, ReadOptions, TableMeta, TableOps};
//! # use lsm_planner::BoxedIterator;
//! #
//! # struct NullTables;
//! #
//! # impl TableOps for NullTables {
//! #     fn create_from(
//! #         &self,
//! #         _iter: &mut dyn Iterator<Item = lsm_planner::Result<InternalValue>>,
//! #     ) -> lsm_planner::Result<(TableMeta, usize)> {
//! #         unimplemented!()
//! #     }
//! #
//! #     fn table_iter(&self, _: &TableMeta, _: &ReadOptions) -> BoxedIterator<'static> {
//! #         Box::new(std::iter::empty())
//! #     }
//! # }
//!
//! let session = Session::new(Config::default(), std::sync::Arc::new(NullTables));
//!
//! // Nothing flushed yet, so there is nothing to do
//! assert!(session.pick_compaction(TableFamily::Primary).is_none());
//! ```

#![forbid(unsafe_code)]
#![deny(clippy::all, missing_docs, clippy::cargo)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::indexing_slicing)]
#![warn(clippy::pedantic, clippy::nursery)]
#![warn(clippy::expect_used)]
#![allow(clippy::missing_const_for_fn)]
#![warn(clippy::multiple_crate_versions)]
#![allow(clippy::option_if_let_else)]

mod binary_search;
mod coding;

pub mod compaction;

mod config;
mod error;
mod flush;
mod key;
mod key_range;
mod level;
mod level_reader;

#[doc(hidden)]
pub mod merge;

mod session;
mod slice;
mod table;
mod table_ops;
mod value;
mod version;

#[doc(hidden)]
pub use merge::{BoxedIterator, Merger};

pub use {
    coding::{Decode, DecodeError, Encode, EncodeError},
    compaction::{Compaction, CompactionKind},
    config::Config,
    error::{Error, Result},
    key::InternalKey,
    key_range::KeyRange,
    level::LevelFiles,
    level_reader::LevelReader,
    session::{NewTable, Session, SessionRecord},
    slice::Slice,
    table::{TableFamily, TableId, TableMeta},
    table_ops::{ReadOptions, TableOps},
    value::{InternalValue, SeqNo, UserKey, UserValue, ValueType},
    version::{SeekHint, Version, VersionId},
};
