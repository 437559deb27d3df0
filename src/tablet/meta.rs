//! Persisted fixed-layout tablet records.
//!
//! Field order and integer widths are part of the on-disk format and must not
//! change.

use std::io::{self, Read, Write};

use crate::serdes::{Decode, Encode};

/// Encoded size of [`RangeInfo`].
pub const RANGE_INFO_SIZE: usize = 16;

/// Encoded size of [`ExtendInfo`].
pub const EXTEND_INFO_SIZE: usize = 64;

const EXTEND_INFO_RESERVED_LEN: usize = 2;

/// Range boundary record stored ahead of the range's key bytes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RangeInfo {
    /// Length of the start key that follows the record.
    pub start_key_size: i16,
    /// Length of the end key that follows the start key.
    pub end_key_size: i16,
    /// Non-zero when the tablet is removed in the next generation.
    pub is_removed: i8,
    /// Non-zero once a merge completed.
    pub is_merged: i8,
    /// Non-zero when the range continues into the next sibling tablet.
    pub is_with_next_brother: i8,
    /// Border flag bits, see [`crate::range::BorderFlag`].
    pub border_flag: i8,
    /// Table the range belongs to.
    pub table_id: i64,
}

impl Encode for RangeInfo {
    fn encode<W>(&self, writer: &mut W) -> io::Result<()>
    where
        W: Write,
    {
        self.start_key_size.encode(writer)?;
        self.end_key_size.encode(writer)?;
        self.is_removed.encode(writer)?;
        self.is_merged.encode(writer)?;
        self.is_with_next_brother.encode(writer)?;
        self.border_flag.encode(writer)?;
        self.table_id.encode(writer)
    }

    fn size(&self) -> usize {
        RANGE_INFO_SIZE
    }
}

impl Decode for RangeInfo {
    fn decode<R>(reader: &mut R) -> io::Result<Self>
    where
        R: Read,
    {
        Ok(RangeInfo {
            start_key_size: i16::decode(reader)?,
            end_key_size: i16::decode(reader)?,
            is_removed: i8::decode(reader)?,
            is_merged: i8::decode(reader)?,
            is_with_next_brother: i8::decode(reader)?,
            border_flag: i8::decode(reader)?,
            table_id: i64::decode(reader)?,
        })
    }
}

/// Aggregate metadata derived from a tablet's readers.
///
/// The record ends with reserved padding that is always written as zero and
/// skipped on read.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExtendInfo {
    /// Rows across all readers.
    pub row_count: i64,
    /// Bytes occupied across all readers.
    pub occupy_size: i64,
    /// Order-independent combination of reader checksums.
    pub checksum: u64,
    /// Version of the last expiry pass applied.
    pub last_expire_version: i64,
    /// Sequence number assigned by the last rewrite.
    pub sequence_num: i64,
    /// Storage format generation of the tablet's readers.
    pub storage_format_version: i16,
}

impl Encode for ExtendInfo {
    fn encode<W>(&self, writer: &mut W) -> io::Result<()>
    where
        W: Write,
    {
        self.row_count.encode(writer)?;
        self.occupy_size.encode(writer)?;
        self.checksum.encode(writer)?;
        self.last_expire_version.encode(writer)?;
        self.sequence_num.encode(writer)?;
        self.storage_format_version.encode(writer)?;
        // reserved16, reserved32, reserved[2]
        0i16.encode(writer)?;
        0i32.encode(writer)?;
        for _ in 0..EXTEND_INFO_RESERVED_LEN {
            0i64.encode(writer)?;
        }
        Ok(())
    }

    fn size(&self) -> usize {
        EXTEND_INFO_SIZE
    }
}

impl Decode for ExtendInfo {
    fn decode<R>(reader: &mut R) -> io::Result<Self>
    where
        R: Read,
    {
        let info = ExtendInfo {
            row_count: i64::decode(reader)?,
            occupy_size: i64::decode(reader)?,
            checksum: u64::decode(reader)?,
            last_expire_version: i64::decode(reader)?,
            sequence_num: i64::decode(reader)?,
            storage_format_version: i16::decode(reader)?,
        };
        i16::decode(reader)?;
        i32::decode(reader)?;
        for _ in 0..EXTEND_INFO_RESERVED_LEN {
            i64::decode(reader)?;
        }
        Ok(info)
    }
}
