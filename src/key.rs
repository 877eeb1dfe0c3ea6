// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    coding::{Decode, DecodeError, Encode, EncodeError},
    SeqNo, UserKey, ValueType,
};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

/// A user key tagged with a sequence number and a record type.
///
/// Internal keys are what tables and the merge machinery actually order by.
#[derive(Clone, PartialEq, Eq)]
#[allow(clippy::module_name_repetitions)]
pub struct InternalKey {
    /// User key bytes
    pub user_key: UserKey,

    /// Sequence number
    pub seqno: SeqNo,

    /// Record type (put or delete)
    pub value_type: ValueType,
}

impl std::fmt::Debug for InternalKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = if self.is_tombstone() { "del" } else { "set" };
        write!(f, "{:?}@{}:{tag}", self.user_key, self.seqno)
    }
}

impl InternalKey {
    /// Creates a new internal key.
    ///
    /// # Panics
    ///
    /// Panics if the user key is longer than 65535 bytes.
    pub fn new<K: Into<UserKey>>(user_key: K, seqno: SeqNo, value_type: ValueType) -> Self {
        let user_key = user_key.into();

        assert!(
            user_key.len() <= u16::MAX.into(),
            "user keys are limited to 65535 bytes"
        );

        Self {
            user_key,
            seqno,
            value_type,
        }
    }

    /// Returns the user key portion.
    #[must_use]
    pub fn user_key(&self) -> &[u8] {
        &self.user_key
    }

    /// Returns `true` if this key marks a deletion.
    #[must_use]
    pub fn is_tombstone(&self) -> bool {
        self.value_type == ValueType::Tombstone
    }
}

impl Encode for InternalKey {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        // `new` caps user keys at u16::MAX bytes, so the length prefix
        // cannot lose bits here
        #[allow(clippy::cast_possible_truncation)]
        writer.write_u16::<BigEndian>(self.user_key.len() as u16)?;
        writer.write_all(&self.user_key)?;

        writer.write_u64::<BigEndian>(self.seqno)?;
        writer.write_u8(u8::from(self.value_type))?;

        Ok(())
    }
}

impl Decode for InternalKey {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let key_len = reader.read_u16::<BigEndian>()?;
        let mut user_key = vec![0; usize::from(key_len)];
        reader.read_exact(&mut user_key)?;

        let seqno = reader.read_u64::<BigEndian>()?;

        let tag = reader.read_u8()?;
        let value_type = ValueType::try_from(tag)
            .map_err(|()| DecodeError::InvalidTag(("ValueType", tag)))?;

        Ok(Self::new(user_key, seqno, value_type))
    }
}

impl PartialOrd for InternalKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

// User keys sort ascending; within one user key, higher sequence numbers
// sort FIRST, so that a merge yields the newest record before the ones it
// shadows. Everything downstream (compaction merges, the grandparent
// bookkeeping) assumes exactly this order.
impl Ord for InternalKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.user_key
            .cmp(&other.user_key)
            .then_with(|| other.seqno.cmp(&self.seqno))
    }
}

#[cfg(test)]
#[allow(clippy::indexing_slicing)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn ikey_cmp_user_key() {
        let a = InternalKey::new(*b"a", 0, ValueType::Value);
        let b = InternalKey::new(*b"b", 0, ValueType::Value);
        assert!(a < b);
    }

    #[test]
    fn ikey_cmp_seqno() {
        let a = InternalKey::new(*b"a", 0, ValueType::Value);
        let b = InternalKey::new(*b"a", 1, ValueType::Value);
        assert!(a > b);
    }

    #[test]
    fn ikey_newest_sorts_first() {
        let mut keys = vec![
            InternalKey::new(*b"b", 3, ValueType::Value),
            InternalKey::new(*b"a", 1, ValueType::Value),
            InternalKey::new(*b"a", 9, ValueType::Tombstone),
        ];
        keys.sort();

        assert_eq!(9, keys[0].seqno);
        assert_eq!(1, keys[1].seqno);
        assert_eq!(b"b", keys[2].user_key());
    }
}
