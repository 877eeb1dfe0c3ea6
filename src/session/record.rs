// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    coding::{Decode, DecodeError, Encode, EncodeError},
    TableFamily, TableMeta,
};
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};
use varint_rs::{VarintReader, VarintWriter};

/// One "add table file at level" entry of a [`SessionRecord`]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NewTable {
    /// Which family the table belongs to
    pub family: TableFamily,

    /// The level the table was placed at
    pub level: usize,

    /// The new table's descriptor
    pub table: TableMeta,
}

/// An append-only fragment of version changes.
///
/// The planner only ever appends "table F now lives at level L" entries;
/// journaling the record and installing the resulting version is the
/// manifest layer's job.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SessionRecord {
    added_tables: Vec<NewTable>,
}

impl SessionRecord {
    /// Creates an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a new table at the given level.
    pub fn add_table_file(&mut self, family: TableFamily, level: usize, table: TableMeta) {
        self.added_tables.push(NewTable {
            family,
            level,
            table,
        });
    }

    /// Returns the appended entries, oldest first.
    #[must_use]
    pub fn added_tables(&self) -> &[NewTable] {
        &self.added_tables
    }

    /// Returns `true` if nothing was appended yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added_tables.is_empty()
    }
}

impl Encode for SessionRecord {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        // NOTE: records hold a handful of entries, never 4 billion
        #[allow(clippy::cast_possible_truncation)]
        writer.write_u32_varint(self.added_tables.len() as u32)?;

        for entry in &self.added_tables {
            writer.write_u8(u8::from(entry.family))?;

            // NOTE: level counts are tiny
            #[allow(clippy::cast_possible_truncation)]
            writer.write_u32_varint(entry.level as u32)?;

            entry.table.encode_into(writer)?;
        }

        Ok(())
    }
}

impl Decode for SessionRecord {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let len = reader.read_u32_varint()?;
        let mut added_tables = Vec::with_capacity(len as usize);

        for _ in 0..len {
            let family = reader.read_u8()?;
            let family = TableFamily::try_from(family)
                .map_err(|()| DecodeError::InvalidTag(("TableFamily", family)))?;

            let level = reader.read_u32_varint()? as usize;
            let table = TableMeta::decode_from(reader)?;

            added_tables.push(NewTable {
                family,
                level,
                table,
            });
        }

        Ok(Self { added_tables })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::{InternalKey, ValueType};
    use std::io::Cursor;
    use test_log::test;

    #[test]
    fn record_roundtrip() {
        let mut record = SessionRecord::new();
        assert!(record.is_empty());

        record.add_table_file(
            TableFamily::Primary,
            2,
            TableMeta::new(
                7,
                1_234,
                InternalKey::new("a", 9, ValueType::Value),
                InternalKey::new("f", 3, ValueType::Tombstone),
            ),
        );
        record.add_table_file(
            TableFamily::Secondary,
            0,
            TableMeta::new(
                8,
                99,
                InternalKey::new("x", 1, ValueType::Value),
                InternalKey::new("z", 1, ValueType::Value),
            ),
        );

        let bytes = record.encode_into_vec();
        let decoded = SessionRecord::decode_from(&mut Cursor::new(bytes)).unwrap();

        assert_eq!(record, decoded);
        assert_eq!(2, decoded.added_tables().len());
    }
}
