//! Buffering and coordination between the solver loop and the record store.
//!
//! Every address goes through `unseen -> in progress -> resolved`. Resolved
//! records wait in a write buffer until a flush sorts them by address and
//! writes them in one pass, then advances the watermark: the highest address
//! known to be durable.
//!
//! [`SolveCache`] is the single-threaded variant. For the concurrent solver,
//! [`SharedState`] holds what all threads see (the claim set of in-progress
//! addresses, the watermark and the store) and each thread keeps a
//! [`WorkerCache`] with a private write buffer and a memo of child records.
//! A record another thread has not flushed yet reads back as
//! [`Lookup::Pending`], never as an error.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use dashmap::DashSet;
use rustc_hash::FxHashMap;

use crate::error::{Error, Result};
use crate::record::{Record, RecordFormat};
use crate::store::RecordStore;

/// Result of reading a record through a cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lookup {
    Found(Record),
    /// Not available yet. The caller has to compute or retry it.
    Pending,
}

impl Lookup {
    pub fn found(self) -> Option<Record> {
        match self {
            Self::Found(record) => Some(record),
            Self::Pending => None,
        }
    }
}

fn encode(format: &RecordFormat, address: u64, record: Record) -> Result<u64> {
    match format.encode(&record) {
        Some(packed) if packed != 0 => Ok(packed),
        _ => Err(Error::UnencodableRecord {
            address,
            value: record.value,
            remoteness: record.remoteness,
        }),
    }
}

/// Drains `buffer` into `batch` sorted by address.
fn drain_sorted(buffer: &mut FxHashMap<u64, u64>, batch: &mut Vec<(u64, u64)>) {
    batch.clear();
    batch.extend(buffer.drain());
    batch.sort_unstable_by_key(|&(address, _)| address);
}

/// Write buffer for a single solver thread.
pub struct SolveCache<'s> {
    store: &'s dyn RecordStore,
    format: RecordFormat,
    buffer: FxHashMap<u64, u64>,
    batch: Vec<(u64, u64)>,
    flush_threshold: usize,
    watermark: Option<u64>,
}

impl<'s> SolveCache<'s> {
    pub fn new(store: &'s dyn RecordStore, format: RecordFormat, flush_threshold: usize) -> Self {
        Self {
            store,
            format,
            buffer: FxHashMap::default(),
            batch: Vec::new(),
            flush_threshold: flush_threshold.max(1),
            watermark: None,
        }
    }

    pub fn format(&self) -> &RecordFormat {
        &self.format
    }

    /// Records waiting for the next flush.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Highest address flushed so far.
    pub fn watermark(&self) -> Option<u64> {
        self.watermark
    }

    pub fn get(&self, address: u64) -> Result<Lookup> {
        if let Some(&packed) = self.buffer.get(&address) {
            return Ok(Lookup::Found(self.format.decode(packed)?));
        }
        if self.watermark.is_some_and(|w| address <= w) {
            if let Some(packed) = self.store.read(address)? {
                return Ok(Lookup::Found(self.format.decode(packed)?));
            }
        }
        Ok(Lookup::Pending)
    }

    /// Buffers a resolved record, flushing once the buffer is full.
    pub fn put(&mut self, address: u64, record: Record) -> Result<()> {
        let packed = encode(&self.format, address, record)?;
        self.buffer.insert(address, packed);
        if self.buffer.len() >= self.flush_threshold {
            self.flush()?;
        }
        Ok(())
    }

    /// Writes the buffer out in address order. Returns the number of
    /// records written.
    pub fn flush(&mut self) -> Result<usize> {
        if self.buffer.is_empty() {
            return Ok(0);
        }
        drain_sorted(&mut self.buffer, &mut self.batch);
        self.store.write_batch(&self.batch)?;
        if let Some(&(last, _)) = self.batch.last() {
            self.watermark = Some(self.watermark.map_or(last, |w| w.max(last)));
        }
        log::debug!(
            "flushed {} records, watermark {:?}",
            self.batch.len(),
            self.watermark
        );
        Ok(self.batch.len())
    }
}

/// State shared by every thread of a concurrent solve.
pub struct SharedState<'s> {
    store: &'s dyn RecordStore,
    format: RecordFormat,
    claims: DashSet<u64>,
    /// One past the highest durable address, 0 before the first flush.
    high_water: AtomicU64,
    flush_lock: Mutex<()>,
}

impl<'s> SharedState<'s> {
    pub fn new(store: &'s dyn RecordStore, format: RecordFormat) -> Self {
        Self {
            store,
            format,
            claims: DashSet::new(),
            high_water: AtomicU64::new(0),
            flush_lock: Mutex::new(()),
        }
    }

    pub fn format(&self) -> &RecordFormat {
        &self.format
    }

    /// Marks `address` in progress. Returns false if another thread holds it.
    pub fn claim(&self, address: u64) -> bool {
        self.claims.insert(address)
    }

    /// Gives up a claim without resolving the address.
    pub fn release(&self, address: u64) -> bool {
        self.claims.remove(&address).is_some()
    }

    pub fn is_claimed(&self, address: u64) -> bool {
        self.claims.contains(&address)
    }

    /// Number of addresses currently in progress or buffered.
    pub fn claimed(&self) -> usize {
        self.claims.len()
    }

    /// Highest address any thread has flushed.
    pub fn watermark(&self) -> Option<u64> {
        self.high_water.load(Ordering::Acquire).checked_sub(1)
    }

    fn read(&self, address: u64) -> Result<Lookup> {
        // A claimed address is either being computed or sitting in some
        // thread's buffer.
        if self.is_claimed(address) {
            return Ok(Lookup::Pending);
        }
        if address >= self.high_water.load(Ordering::Acquire) {
            return Ok(Lookup::Pending);
        }
        match self.store.read(address)? {
            Some(packed) => Ok(Lookup::Found(self.format.decode(packed)?)),
            None => Ok(Lookup::Pending),
        }
    }

    /// Writes a sorted batch, advances the watermark, then drops the claims.
    fn publish(&self, batch: &[(u64, u64)]) -> Result<()> {
        let Some(&(last, _)) = batch.last() else {
            return Ok(());
        };
        {
            let _guard = self.flush_lock.lock().map_err(|_| Error::CorruptStore {
                reason: "flush lock poisoned by a panicked worker".to_string(),
            })?;
            self.store.write_batch(batch)?;
            self.high_water.fetch_max(last + 1, Ordering::AcqRel);
        }
        for &(address, _) in batch {
            self.claims.remove(&address);
        }
        Ok(())
    }
}

/// Per-thread view of a [`SharedState`].
pub struct WorkerCache<'a, 's> {
    shared: &'a SharedState<'s>,
    buffer: FxHashMap<u64, u64>,
    batch: Vec<(u64, u64)>,
    memo: FxHashMap<u64, Record>,
    memo_capacity: usize,
    flush_threshold: usize,
}

impl<'a, 's> WorkerCache<'a, 's> {
    pub fn new(shared: &'a SharedState<'s>, flush_threshold: usize, memo_capacity: usize) -> Self {
        Self {
            shared,
            buffer: FxHashMap::default(),
            batch: Vec::new(),
            memo: FxHashMap::default(),
            memo_capacity,
            flush_threshold: flush_threshold.max(1),
        }
    }

    pub fn shared(&self) -> &'a SharedState<'s> {
        self.shared
    }

    /// Own buffer, then memo, then the shared store.
    pub fn get(&mut self, address: u64) -> Result<Lookup> {
        if let Some(&packed) = self.buffer.get(&address) {
            return Ok(Lookup::Found(self.shared.format.decode(packed)?));
        }
        if let Some(&record) = self.memo.get(&address) {
            return Ok(Lookup::Found(record));
        }
        let lookup = self.shared.read(address)?;
        if let Lookup::Found(record) = lookup {
            if self.memo_capacity > 0 {
                if self.memo.len() >= self.memo_capacity {
                    self.memo.clear();
                }
                self.memo.insert(address, record);
            }
        }
        Ok(lookup)
    }

    /// Buffers the record of an address this thread has claimed. The claim
    /// is held until the record is flushed.
    pub fn put(&mut self, address: u64, record: Record) -> Result<()> {
        let packed = encode(&self.shared.format, address, record)?;
        self.buffer.insert(address, packed);
        if self.buffer.len() >= self.flush_threshold {
            self.flush()?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<usize> {
        if self.buffer.is_empty() {
            return Ok(0);
        }
        drain_sorted(&mut self.buffer, &mut self.batch);
        self.shared.publish(&self.batch)?;
        log::trace!(
            "worker flushed {} records, watermark {:?}",
            self.batch.len(),
            self.shared.watermark()
        );
        Ok(self.batch.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Value;
    use crate::store::MemoryStore;

    #[test]
    fn sequential_read_path() {
        let store = MemoryStore::new(16);
        let mut cache = SolveCache::new(&store, RecordFormat::two_player(9), 3);
        assert_eq!(cache.get(5).unwrap(), Lookup::Pending);

        cache.put(9, Record::new(Value::Win, 1)).unwrap();
        cache.put(4, Record::new(Value::Lose, 0)).unwrap();
        assert_eq!(cache.buffered(), 2);
        assert_eq!(cache.watermark(), None);
        assert_eq!(cache.get(4).unwrap(), Lookup::Found(Record::new(Value::Lose, 0)));
        assert_eq!(store.read(4).unwrap(), None);

        // Third record reaches the threshold.
        cache.put(6, Record::new(Value::Tie, 2)).unwrap();
        assert_eq!(cache.buffered(), 0);
        assert_eq!(cache.watermark(), Some(9));
        assert_eq!(cache.get(6).unwrap(), Lookup::Found(Record::new(Value::Tie, 2)));
        assert_eq!(cache.get(5).unwrap(), Lookup::Pending);
        assert_eq!(cache.get(12).unwrap(), Lookup::Pending);
    }

    #[test]
    fn unencodable_records_are_rejected() {
        let store = MemoryStore::new(4);
        let mut cache = SolveCache::new(&store, RecordFormat::two_player(3), 8);
        assert!(matches!(
            cache.put(1, Record::new(Value::Win, 4)),
            Err(Error::UnencodableRecord { address: 1, .. })
        ));
        assert!(cache.put(1, Record::UNDECIDED).is_err());
    }

    #[test]
    fn claimed_addresses_stay_pending_until_flushed() {
        let store = MemoryStore::new(8);
        let shared = SharedState::new(&store, RecordFormat::two_player(9));
        let mut writer = WorkerCache::new(&shared, 100, 16);
        let mut reader = WorkerCache::new(&shared, 100, 16);

        assert!(shared.claim(3));
        assert!(!shared.claim(3));
        writer.put(3, Record::new(Value::Lose, 0)).unwrap();
        assert_eq!(writer.get(3).unwrap(), Lookup::Found(Record::new(Value::Lose, 0)));
        assert_eq!(reader.get(3).unwrap(), Lookup::Pending);
        assert_eq!(shared.watermark(), None);

        assert_eq!(writer.flush().unwrap(), 1);
        assert!(!shared.is_claimed(3));
        assert_eq!(shared.watermark(), Some(3));
        assert_eq!(reader.get(3).unwrap(), Lookup::Found(Record::new(Value::Lose, 0)));
        // Above the watermark nothing is durable yet.
        assert_eq!(reader.get(7).unwrap(), Lookup::Pending);
    }

    #[test]
    fn watermark_only_moves_up() {
        let store = MemoryStore::new(8);
        let shared = SharedState::new(&store, RecordFormat::two_player(9));
        let mut a = WorkerCache::new(&shared, 100, 0);
        let mut b = WorkerCache::new(&shared, 100, 0);
        for (cache, address) in [(&mut a, 6), (&mut b, 2)] {
            assert!(shared.claim(address));
            cache.put(address, Record::new(Value::Win, 1)).unwrap();
        }
        a.flush().unwrap();
        b.flush().unwrap();
        assert_eq!(shared.watermark(), Some(6));
        assert_eq!(shared.claimed(), 0);
        assert!(shared.claim(5));
        assert!(shared.release(5));
        assert!(!shared.release(5));
    }
}
