use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;

use parking_lot::Mutex;

/// Intern table for strings and blobs that live for the whole program.
///
/// This is the recorder's "read-only address range": a record that mentions a
/// `'static` string (a format, a file name, a constant buffer) stores only a
/// compact index into this table instead of copying the bytes. The replayer
/// turns the index back into the original slice.
///
/// Entries are keyed by address and length, so the same literal always maps
/// to the same index. The table only grows; once it is full, further strings
/// fall back to being copied inline.
///
/// # Thread Safety
///
/// All storage is allocated up front, so interning never allocates. Each slot
/// is written once and never changes afterwards, which lets [`resolve`]
/// read without taking any lock. Only [`intern`] locks, to keep the index
/// consistent; inside a recorder it always runs under the recorder's own
/// lock, so that inner lock is never contended by a reader.
///
/// [`resolve`]: StringTable::resolve
/// [`intern`]: StringTable::intern
pub struct StringTable {
    slots: Box<[OnceLock<&'static [u8]>]>,
    len: AtomicUsize,
    index: Mutex<HashMap<(usize, usize), u16>>,
}

impl StringTable {
    /// Creates an empty table holding at most `capacity` entries (capped at
    /// 65536 so every index fits two bytes).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.min(u16::MAX as usize + 1);
        Self {
            slots: (0..capacity).map(|_| OnceLock::new()).collect(),
            len: AtomicUsize::new(0),
            index: Mutex::new(HashMap::with_capacity(capacity)),
        }
    }

    /// Returns the index for `bytes`, registering it on first use.
    ///
    /// # Returns
    ///
    /// * `Some(index)` - The string is (now) in the table
    /// * `None` - The table is full and the string was not seen before
    ///
    /// # Examples
    ///
    /// ```
    /// # use ring_recorder::StringTable;
    /// static FILE: &[u8] = b"sensor.c";
    ///
    /// let table = StringTable::new(16);
    /// let id1 = table.intern(FILE);
    /// let id2 = table.intern(FILE);
    /// assert_eq!(id1, id2);
    /// assert_eq!(table.resolve(id1.unwrap()), Some(FILE));
    /// ```
    pub fn intern(&self, bytes: &'static [u8]) -> Option<u16> {
        let key = (bytes.as_ptr() as usize, bytes.len());
        let mut index = self.index.lock();
        if let Some(&id) = index.get(&key) {
            return Some(id);
        }
        let next = index.len();
        let slot = self.slots.get(next)?;
        if slot.set(bytes).is_err() {
            return None;
        }
        let id = next as u16;
        index.insert(key, id);
        self.len.store(next + 1, Ordering::Release);
        Some(id)
    }

    /// Looks up an entry by index. Never blocks.
    pub fn resolve(&self, id: u16) -> Option<&'static [u8]> {
        self.slots.get(id as usize)?.get().copied()
    }

    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}
