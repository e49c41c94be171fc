//! The per-metadata-event string table.
//!
//! Every name in the metadata element tree (element kinds, attribute keys,
//! attribute values) is stored once in a table at the front of the metadata
//! event and referenced by index. Entries are interned as `Arc<str>` so the
//! thousands of descriptor references a chunk builds share one allocation
//! per distinct string.

use std::sync::Arc;

use crate::bytes::{ByteReader, StringValue, strenc};
use crate::error::{ParflightError, Result};

/// The deduplicated string table of one metadata event.
#[derive(Debug, Clone, Default)]
pub struct StringTable {
    entries: Vec<Option<Arc<str>>>,
}

impl StringTable {
    /// Parses the table: a varint entry count followed by that many
    /// discriminated string values.
    ///
    /// Null entries are legal (attribute values may be null); constant-pool
    /// references are not, because the table exists precisely to make the
    /// metadata event self-contained.
    pub(crate) fn parse(reader: &mut ByteReader<'_>) -> Result<Self> {
        let bound = reader.remaining() as u64;
        let count = reader.read_varuint_len(bound)?;
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            let at = reader.absolute_position();
            match reader.read_string()? {
                StringValue::Null => entries.push(None),
                StringValue::Empty => entries.push(Some(Arc::from(""))),
                StringValue::Literal(s) => entries.push(Some(Arc::from(s.as_ref()))),
                StringValue::PoolIndex(_) => {
                    return Err(ParflightError::UnsupportedStringEncoding {
                        offset: at,
                        encoding: strenc::CONSTANT_POOL,
                    });
                }
            }
        }
        Ok(Self { entries })
    }

    /// Looks up an entry by index. `Ok(None)` is a present-but-null entry;
    /// an out-of-range index is an error.
    pub fn lookup(&self, index: u64) -> Result<Option<&Arc<str>>> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.entries.get(i))
            .map(Option::as_ref)
            .ok_or(ParflightError::UnknownStringIndex {
                index,
                table_len: self.entries.len(),
            })
    }

    /// Number of entries in the table.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` for a table with no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nulls_and_literals() {
        let mut bytes = vec![4u8]; // count
        bytes.push(strenc::NULL);
        bytes.push(strenc::EMPTY);
        bytes.push(strenc::UTF8);
        bytes.push(5);
        bytes.extend_from_slice(b"class");
        bytes.push(strenc::LATIN1);
        bytes.push(1);
        bytes.push(0xe9); // é

        let mut r = ByteReader::new(&bytes);
        let table = StringTable::parse(&mut r).unwrap();
        assert_eq!(table.len(), 4);
        assert_eq!(table.lookup(0).unwrap(), None);
        assert_eq!(table.lookup(1).unwrap().map(|s| &**s), Some(""));
        assert_eq!(table.lookup(2).unwrap().map(|s| &**s), Some("class"));
        assert_eq!(table.lookup(3).unwrap().map(|s| &**s), Some("é"));
    }

    #[test]
    fn out_of_range_index_is_typed() {
        let bytes = [0u8]; // empty table
        let mut r = ByteReader::new(&bytes);
        let table = StringTable::parse(&mut r).unwrap();
        assert!(matches!(
            table.lookup(3),
            Err(ParflightError::UnknownStringIndex {
                index: 3,
                table_len: 0
            })
        ));
    }

    #[test]
    fn pool_references_are_rejected_inside_the_table() {
        let bytes = [1u8, strenc::CONSTANT_POOL, 7];
        let mut r = ByteReader::new(&bytes);
        assert!(matches!(
            StringTable::parse(&mut r),
            Err(ParflightError::UnsupportedStringEncoding { encoding: 2, .. })
        ));
    }
}
