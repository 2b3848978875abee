use std::collections::BTreeMap;

use crate::format::{EntryType, SequenceNumber};


/// The newest write to a user key which has not yet been flushed to a table file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MemtableEntry {
    pub sequence:   SequenceNumber,
    pub entry_type: EntryType,
    /// Empty for deletions.
    pub value:      Vec<u8>,
}

/// In-memory buffer of recent writes, ordered by user key.
///
/// Only the newest write to each user key is retained. Older writes to the same key are
/// shadowed anyway, since nothing reads at an older sequence number.
#[derive(Debug, Default)]
pub(crate) struct Memtable {
    /// Only [`Memtable::insert`] inserts anything into this map.
    entries: BTreeMap<Vec<u8>, MemtableEntry>,
}

#[expect(unreachable_pub, reason = "control visibility at type definition")]
impl Memtable {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        user_key:   &[u8],
        sequence:   SequenceNumber,
        entry_type: EntryType,
        value:      &[u8],
    ) {
        let entry = MemtableEntry {
            sequence,
            entry_type,
            value: value.to_vec(),
        };

        if let Some(existing) = self.entries.get_mut(user_key) {
            // Writes are applied in sequence order, but be careful not to regress.
            if existing.sequence <= sequence {
                *existing = entry;
            }
        } else {
            self.entries.insert(user_key.to_vec(), entry);
        }
    }

    #[must_use]
    pub fn get(&self, user_key: &[u8]) -> Option<&MemtableEntry> {
        self.entries.get(user_key)
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Iterate over entries in increasing order of user key.
    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &MemtableEntry)> {
        self.entries.iter().map(|(user_key, entry)| (user_key.as_slice(), entry))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}


#[cfg(test)]
mod tests {
    use super::*;


    fn seq(n: u64) -> SequenceNumber {
        SequenceNumber::new_usable(n).unwrap()
    }

    #[test]
    fn newest_write_wins() {
        let mut memtable = Memtable::new();
        memtable.insert(b"b", seq(1), EntryType::Value, b"one");
        memtable.insert(b"a", seq(2), EntryType::Value, b"two");
        memtable.insert(b"b", seq(3), EntryType::Deletion, b"");
        memtable.insert(b"a", seq(1), EntryType::Value, b"stale");

        assert_eq!(memtable.len(), 2);
        assert_eq!(memtable.get(b"b").map(|entry| entry.entry_type), Some(EntryType::Deletion));
        assert_eq!(memtable.get(b"a").map(|entry| entry.value.as_slice()), Some(&b"two"[..]));

        let keys = memtable.iter().map(|(key, _)| key.to_vec()).collect::<Vec<_>>();
        assert_eq!(keys, [b"a".to_vec(), b"b".to_vec()]);

        memtable.clear();
        assert!(memtable.is_empty());
    }
}
