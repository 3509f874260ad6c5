//! Durable address → packed record storage.
//!
//! Addresses are dense from 0. A packed value of 0 is the unsolved record,
//! so reading it back yields `None` (not found).

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use memmap2::MmapMut;

use crate::error::{Error, Result};

/// Fixed-width record storage addressed by position.
pub trait RecordStore: Send + Sync {
    /// Number of addresses.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The packed record at `address`, or `None` if nothing was written.
    fn read(&self, address: u64) -> Result<Option<u64>>;

    fn write(&self, address: u64, packed: u64) -> Result<()>;

    /// Writes a run of records sorted by address.
    fn write_batch(&self, records: &[(u64, u64)]) -> Result<()> {
        for &(address, packed) in records {
            self.write(address, packed)?;
        }
        Ok(())
    }

    /// Makes every write so far durable.
    fn sync(&self) -> Result<()> {
        Ok(())
    }
}

fn check(address: u64, len: u64) -> Result<()> {
    if address >= len {
        return Err(Error::AddressOutOfRange {
            address,
            total: len,
        });
    }
    Ok(())
}

/// Heap-backed store, one atomic word per address.
#[derive(Debug)]
pub struct MemoryStore {
    records: Vec<AtomicU64>,
}

impl MemoryStore {
    pub fn new(len: u64) -> Self {
        Self {
            records: (0..len).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    /// Packed contents, for comparing two solves.
    pub fn snapshot(&self) -> Vec<u64> {
        self.records
            .iter()
            .map(|r| r.load(Ordering::Acquire))
            .collect()
    }
}

impl RecordStore for MemoryStore {
    fn len(&self) -> u64 {
        self.records.len() as u64
    }

    fn read(&self, address: u64) -> Result<Option<u64>> {
        check(address, self.len())?;
        let packed = self.records[address as usize].load(Ordering::Acquire);
        Ok((packed != 0).then_some(packed))
    }

    fn write(&self, address: u64, packed: u64) -> Result<()> {
        check(address, self.len())?;
        self.records[address as usize].store(packed, Ordering::Release);
        Ok(())
    }
}

const MAGIC: u32 = 0x4244_5354; // "TSDB"
const VERSION: u32 = 1;
const HEADER_LEN: usize = 24;

/// Memory-mapped file store.
///
/// Layout: 24-byte header (magic, version, record width, reserved, record
/// count, all little-endian) followed by `width` bytes per address.
#[derive(Debug)]
pub struct MmapStore {
    map: RwLock<MmapMut>,
    width: usize,
    len: u64,
}

impl MmapStore {
    /// Creates (or truncates) a zeroed store of `len` records.
    pub fn create(path: impl AsRef<Path>, len: u64, width: usize) -> Result<Self> {
        if !(1..=8).contains(&width) {
            return Err(Error::CorruptStore {
                reason: format!("record width {width} not in 1..=8"),
            });
        }
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        let bytes = len
            .checked_mul(width as u64)
            .and_then(|b| b.checked_add(HEADER_LEN as u64))
            .ok_or_else(|| Error::overflow("store file size"))?;
        file.set_len(bytes)?;
        let mut map = unsafe { MmapMut::map_mut(&file)? };
        map[0..4].copy_from_slice(&MAGIC.to_le_bytes());
        map[4..8].copy_from_slice(&VERSION.to_le_bytes());
        map[8..12].copy_from_slice(&(width as u32).to_le_bytes());
        map[12..16].copy_from_slice(&0u32.to_le_bytes());
        map[16..24].copy_from_slice(&len.to_le_bytes());
        log::debug!(
            "created store {} ({} records x {} bytes)",
            path.display(),
            len,
            width
        );
        Ok(Self {
            map: RwLock::new(map),
            width,
            len,
        })
    }

    /// Opens an existing store, checking its header against the file size.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let map = unsafe { MmapMut::map_mut(&file)? };
        if map.len() < HEADER_LEN {
            return Err(corrupt(path, "file shorter than header"));
        }
        let word = |at: usize| u32::from_le_bytes([map[at], map[at + 1], map[at + 2], map[at + 3]]);
        if word(0) != MAGIC || word(4) != VERSION {
            return Err(corrupt(
                path,
                &format!("bad magic 0x{:08x} or version {}", word(0), word(4)),
            ));
        }
        let width = word(8) as usize;
        let mut len_bytes = [0u8; 8];
        len_bytes.copy_from_slice(&map[16..24]);
        let len = u64::from_le_bytes(len_bytes);
        if !(1..=8).contains(&width) {
            return Err(corrupt(path, &format!("record width {width}")));
        }
        let expected = len
            .checked_mul(width as u64)
            .and_then(|bytes| bytes.checked_add(HEADER_LEN as u64))
            .ok_or_else(|| corrupt(path, &format!("{len} records of width {width} overflow")))?;
        if map.len() as u64 != expected {
            return Err(corrupt(
                path,
                &format!("size {} does not match {len} x {width}", map.len()),
            ));
        }
        Ok(Self {
            map: RwLock::new(map),
            width,
            len,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    fn put(&self, map: &mut MmapMut, address: u64, packed: u64) -> Result<()> {
        check(address, self.len)?;
        let at = HEADER_LEN + address as usize * self.width;
        map[at..at + self.width].copy_from_slice(&packed.to_le_bytes()[..self.width]);
        Ok(())
    }
}

fn corrupt(path: &Path, reason: &str) -> Error {
    Error::CorruptStore {
        reason: format!("{}: {reason}", path.display()),
    }
}

fn poisoned() -> Error {
    Error::CorruptStore {
        reason: "store lock poisoned by a panicked writer".to_string(),
    }
}

impl RecordStore for MmapStore {
    fn len(&self) -> u64 {
        self.len
    }

    fn read(&self, address: u64) -> Result<Option<u64>> {
        check(address, self.len)?;
        let map = self.map.read().map_err(|_| poisoned())?;
        let at = HEADER_LEN + address as usize * self.width;
        let mut bytes = [0u8; 8];
        bytes[..self.width].copy_from_slice(&map[at..at + self.width]);
        let packed = u64::from_le_bytes(bytes);
        Ok((packed != 0).then_some(packed))
    }

    fn write(&self, address: u64, packed: u64) -> Result<()> {
        let mut map = self.map.write().map_err(|_| poisoned())?;
        self.put(&mut map, address, packed)
    }

    fn write_batch(&self, records: &[(u64, u64)]) -> Result<()> {
        let mut map = self.map.write().map_err(|_| poisoned())?;
        for &(address, packed) in records {
            self.put(&mut map, address, packed)?;
        }
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        let map = self.map.read().map_err(|_| poisoned())?;
        map.flush()?;
        Ok(())
    }
}
