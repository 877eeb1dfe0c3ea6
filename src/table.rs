// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    coding::{Decode, DecodeError, Encode, EncodeError},
    key::InternalKey,
    KeyRange,
};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

/// Monotonically increasing ID of a sorted table file.
pub type TableId = u64;

/// Which of the two table families a table (or a compaction) belongs to.
///
/// The engine keeps two parallel sets of sorted tables over the same
/// key space. Both families share one set of planning rules, so every
/// planner entry point is parameterized by this tag instead of having a
/// mirrored code path per family.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum TableFamily {
    /// The main key-value tables
    Primary,

    /// The auxiliary tables
    Secondary,
}

impl TableFamily {
    /// Both families, in index order.
    pub const ALL: [Self; 2] = [Self::Primary, Self::Secondary];

    pub(crate) fn index(self) -> usize {
        match self {
            Self::Primary => 0,
            Self::Secondary => 1,
        }
    }
}

impl std::fmt::Display for TableFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Primary => write!(f, "primary"),
            Self::Secondary => write!(f, "secondary"),
        }
    }
}

impl From<TableFamily> for u8 {
    fn from(value: TableFamily) -> Self {
        match value {
            TableFamily::Primary => 0,
            TableFamily::Secondary => 1,
        }
    }
}

impl TryFrom<u8> for TableFamily {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Primary),
            1 => Ok(Self::Secondary),
            _ => Err(()),
        }
    }
}

/// Immutable descriptor of one on-disk sorted table.
///
/// The planner never opens table files itself; it works on these
/// descriptors and leaves the bytes to [`TableOps`](crate::TableOps).
#[derive(Clone, Debug, Eq, PartialEq)]
#[allow(clippy::module_name_repetitions)]
pub struct TableMeta {
    /// Stable file number
    pub id: TableId,

    /// File size in bytes
    pub size: u64,

    /// Smallest internal key in the table
    pub min: InternalKey,

    /// Largest internal key in the table
    pub max: InternalKey,
}

impl TableMeta {
    /// Creates a new table descriptor.
    ///
    /// # Panics
    ///
    /// Panics if `min > max`.
    #[must_use]
    pub fn new(id: TableId, size: u64, min: InternalKey, max: InternalKey) -> Self {
        assert!(min <= max, "table key range is inverted");

        Self { id, size, min, max }
    }

    /// Returns the table's user-key range.
    #[must_use]
    pub fn user_key_range(&self) -> KeyRange {
        KeyRange::new((self.min.user_key.clone(), self.max.user_key.clone()))
    }

    /// Returns `true` if the table's user-key range intersects `[umin, umax]`.
    #[must_use]
    pub fn overlaps_user_range(&self, umin: &[u8], umax: &[u8]) -> bool {
        &*self.max.user_key >= umin && &*self.min.user_key <= umax
    }
}

impl Encode for TableMeta {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        writer.write_u64::<BigEndian>(self.id)?;
        writer.write_u64::<BigEndian>(self.size)?;
        self.min.encode_into(writer)?;
        self.max.encode_into(writer)?;
        Ok(())
    }
}

impl Decode for TableMeta {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let id = reader.read_u64::<BigEndian>()?;
        let size = reader.read_u64::<BigEndian>()?;
        let min = InternalKey::decode_from(reader)?;
        let max = InternalKey::decode_from(reader)?;
        Ok(Self { id, size, min, max })
    }
}
