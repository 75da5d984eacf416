//! Fixed-capacity circular byte store holding whole records.
//!
//! A ring never holds a partial record: space is checked out with
//! [`RingStore::reserve`], which evicts old records from the head until the
//! request fits, and checked back in with [`RingStore::commit`] using the
//! exact number of bytes written.
//!
//! Next to the bytes, a ring keeps one [`RecordMeta`] per stored record. Its
//! sequence number is the full-width global order of the record, so the
//! replay merge never has to guess across a counter wrap however far one
//! ring falls behind the other.

use std::collections::VecDeque;

use tracing::{trace, warn};

use crate::wire::read_prefix;

/// Space checked out of a ring, to be returned through [`RingStore::commit`].
#[must_use = "a reservation must be committed"]
#[derive(Debug)]
pub struct WriteHandle {
    reserved: usize,
}

impl WriteHandle {
    pub fn reserved(&self) -> usize {
        self.reserved
    }
}

/// Occupancy numbers of one ring.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RingUsage {
    pub capacity: usize,
    pub used: usize,
    pub records_written: u64,
    pub records_evicted: u64,
}

/// Bookkeeping for one stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordMeta {
    /// Global issue order, never wrapping.
    pub seq: u64,
    /// Already rendered from the other ring; skip on replay.
    pub replayed: bool,
}

/// Shortest record a length prefix can describe.
const MIN_STORED_RECORD: usize = 2;

pub struct RingStore {
    buf: Box<[u8]>,
    head: usize,
    len: usize,
    meta: VecDeque<RecordMeta>,
    written: u64,
    evicted: u64,
}

impl RingStore {
    pub fn new(capacity: usize) -> Self {
        Self::with_record_floor(capacity, MIN_STORED_RECORD)
    }

    /// Creates a ring whose records are never shorter than `min_record_len`.
    ///
    /// The per-record bookkeeping is sized for the most records that can fit,
    /// so committing never allocates.
    pub fn with_record_floor(capacity: usize, min_record_len: usize) -> Self {
        let max_records = capacity / min_record_len.max(MIN_STORED_RECORD) + 1;
        Self {
            buf: vec![0u8; capacity].into_boxed_slice(),
            head: 0,
            len: 0,
            meta: VecDeque::with_capacity(max_records),
            written: 0,
            evicted: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn used(&self) -> usize {
        self.len
    }

    pub fn free_space(&self) -> usize {
        self.capacity() - self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn usage(&self) -> RingUsage {
        RingUsage {
            capacity: self.capacity(),
            used: self.len,
            records_written: self.written,
            records_evicted: self.evicted,
        }
    }

    /// Makes room for `n` bytes, evicting from the head as needed.
    ///
    /// Returns `None` only when `n` exceeds the whole capacity.
    pub fn reserve(&mut self, n: usize) -> Option<WriteHandle> {
        if n > self.capacity() {
            return None;
        }
        self.evict_to_fit(n);
        Some(WriteHandle { reserved: n })
    }

    /// Appends a finished record into space taken by `reserve`, tagged with
    /// its global sequence number.
    ///
    /// Returns `false`, writing nothing, if the record is larger than the
    /// reservation.
    pub fn commit(&mut self, handle: WriteHandle, record: &[u8], seq: u64) -> bool {
        if record.is_empty()
            || record.len() > handle.reserved
            || record.len() > self.free_space()
        {
            return false;
        }
        let cap = self.capacity();
        let tail = (self.head + self.len) % cap;
        let first = record.len().min(cap - tail);
        self.buf[tail..tail + first].copy_from_slice(&record[..first]);
        self.buf[..record.len() - first].copy_from_slice(&record[first..]);
        self.len += record.len();
        self.meta.push_back(RecordMeta { seq, replayed: false });
        self.written += 1;
        true
    }

    /// Bookkeeping of the record at the head.
    pub fn head_meta(&self) -> Option<RecordMeta> {
        self.meta.front().copied()
    }

    /// Flags the stored record with sequence `seq` as already rendered.
    /// Returns `false` if no such record is held.
    pub fn mark_replayed(&mut self, seq: u64) -> bool {
        match self.meta.binary_search_by_key(&seq, |m| m.seq) {
            Ok(i) => {
                self.meta[i].replayed = true;
                true
            }
            Err(_) => false,
        }
    }

    /// The oldest `n` bytes as up to two slices (the second is non-empty when
    /// the range wraps).
    pub fn peek(&self, n: usize) -> Option<(&[u8], &[u8])> {
        if n > self.len {
            return None;
        }
        let cap = self.capacity();
        let first = n.min(cap - self.head);
        Some((&self.buf[self.head..self.head + first], &self.buf[..n - first]))
    }

    /// Copies the oldest `dst.len()` bytes out, or nothing if fewer are stored.
    pub fn peek_into(&self, dst: &mut [u8]) -> bool {
        match self.peek(dst.len()) {
            Some((a, b)) => {
                dst[..a.len()].copy_from_slice(a);
                dst[a.len()..].copy_from_slice(b);
                true
            }
            None => false,
        }
    }

    /// Length of the record at the head, from its prefix.
    pub fn head_record_len(&self) -> Option<usize> {
        let mut head = [0u8; 2];
        let avail = self.len.min(2);
        if !self.peek_into(&mut head[..avail]) {
            return None;
        }
        let (total, _) = read_prefix(&head[..avail])?;
        (total <= self.len).then_some(total)
    }

    /// Drops the head record, which is `n` bytes long.
    pub fn remove(&mut self, n: usize) {
        self.meta.pop_front();
        let n = n.min(self.len);
        self.head = (self.head + n) % self.capacity().max(1);
        self.len -= n;
        if self.len == 0 {
            self.head = 0;
            self.meta.clear();
        }
    }

    /// Evicts whole records from the head until `required` bytes are free.
    ///
    /// Once any eviction is needed, keeps going until an eighth of the ring
    /// (or `required`, if larger) is free so the next writes do not have to
    /// evict again. Returns the number of records dropped.
    pub fn evict_to_fit(&mut self, required: usize) -> usize {
        if self.free_space() >= required {
            return 0;
        }
        let target = required.max(self.capacity() / 8).min(self.capacity());
        let mut dropped = 0;
        while self.free_space() < target {
            match self.head_record_len() {
                Some(len) => {
                    self.remove(len);
                    dropped += 1;
                }
                None => {
                    warn!(used = self.len, "ring head is not a valid record; clearing ring");
                    dropped += 1;
                    self.clear();
                    break;
                }
            }
        }
        self.evicted += dropped as u64;
        trace!(dropped, required, free = self.free_space(), "evicted records");
        dropped
    }

    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
        self.meta.clear();
    }

    /// Stored bytes in order, oldest first.
    pub fn contents(&self) -> Vec<u8> {
        let mut out = vec![0u8; self.len];
        self.peek_into(&mut out);
        out
    }
}
