//! Record file: packs fixed-size records into aligned blocks and hands out
//! stable record indices. Freed slots are reused LIFO; the file never shrinks.
#![deny(unused_must_use)]

mod cache;

use {
	cache::BlockCache,
	core::mem,
	log::debug,
	rafile::{xassert, Dev, File, Stats},
};

/// Alignment unit; should be the disk's block size.
pub const BLOCK_SIZE: usize = 256;

pub type Record = u64;
/// Index of a record in the record file.
pub type RecordIdx = u64;

pub(crate) const NIL: u64 = u64::MAX;

// A free slot stores the next-free index in place of the record, so a slot
// must hold the larger of the two.
const ITEM_SIZE: usize = {
	let (r, i) = (mem::size_of::<Record>(), mem::size_of::<RecordIdx>());
	if r > i {
		r
	} else {
		i
	}
};
const RECORDS_PER_BLOCK: u64 = (BLOCK_SIZE / ITEM_SIZE) as u64;

/// Block holding record `idx`. Block 0 is the superblock.
fn idx_to_block(idx: RecordIdx) -> u64 {
	idx / RECORDS_PER_BLOCK + 1
}

fn idx_to_offset(idx: RecordIdx) -> u64 {
	idx_to_block(idx) * BLOCK_SIZE as u64 + idx % RECORDS_PER_BLOCK * ITEM_SIZE as u64
}

struct Superblock {
	free_list_head: RecordIdx,
	/// One past the highest-ever-allocated record index.
	end: RecordIdx,
}

const SUPERBLOCK_SIZE: usize = 16;

impl Superblock {
	fn to_raw(&self) -> [u8; SUPERBLOCK_SIZE] {
		let mut raw = [0; SUPERBLOCK_SIZE];
		raw[..8].copy_from_slice(&self.free_list_head.to_le_bytes());
		raw[8..].copy_from_slice(&self.end.to_le_bytes());
		raw
	}

	fn from_raw(raw: &[u8; SUPERBLOCK_SIZE]) -> Self {
		Self {
			free_list_head: u64::from_le_bytes(raw[..8].try_into().unwrap()),
			end: u64::from_le_bytes(raw[8..].try_into().unwrap()),
		}
	}
}

#[derive(Debug)]
pub enum LoadError<E> {
	Dev(E),
	BadSuperblock,
}

/// A slot-addressable store of fixed-size records.
///
/// Indices are stable across allocations and deallocations; there is no
/// compaction. All I/O goes through a single-block write-back cache owned by
/// the handle.
pub struct Recf<D: Dev> {
	file: File<D>,
	superblock: Superblock,
	cache: BlockCache,
}

impl<D: Dev> Recf<D> {
	/// Initialize a fresh record file on `dev`, discarding previous contents.
	pub fn new(dev: D) -> Result<Self, D::Error> {
		let mut file = File::new(dev)?;
		file.set_size(BLOCK_SIZE as u64)?;

		let mut slf = Self {
			file,
			superblock: Superblock { free_list_head: NIL, end: 0 },
			cache: BlockCache::new(),
		};
		slf.write_superblock()?;
		Ok(slf)
	}

	/// Open an existing record file.
	pub fn load(dev: D) -> Result<Self, LoadError<D::Error>> {
		let file = File::new(dev).map_err(LoadError::Dev)?;
		if file.size() < BLOCK_SIZE as u64 {
			return Err(LoadError::BadSuperblock);
		}

		let mut slf = Self {
			file,
			superblock: Superblock { free_list_head: NIL, end: 0 },
			cache: BlockCache::new(),
		};
		slf.read_superblock().map_err(LoadError::Dev)?;

		let sb = &slf.superblock;
		if sb.end > 0 && slf.file.size() < (idx_to_block(sb.end - 1) + 1) * BLOCK_SIZE as u64 {
			return Err(LoadError::BadSuperblock);
		}
		Ok(slf)
	}

	/// Allocate a slot, store `record` in it and return its index.
	pub fn add(&mut self, record: Record) -> Result<RecordIdx, D::Error> {
		let idx = self.alloc_record()?;
		self.write_record(record, idx)?;
		Ok(idx)
	}

	pub fn get(&mut self, idx: RecordIdx) -> Result<Record, D::Error> {
		xassert!(1, idx < self.superblock.end);
		self.read_record(idx)
	}

	/// Push the slot onto the free list. The file is not shrunk.
	pub fn delete(&mut self, idx: RecordIdx) -> Result<(), D::Error> {
		xassert!(1, idx < self.superblock.end);
		self.dealloc_record(idx)
	}

	/// Write the superblock and flush the block cache.
	pub fn sync(&mut self) -> Result<(), D::Error> {
		self.write_superblock()?;
		self.cache.flush(&mut self.file)
	}

	/// Sync, flush through to the host and return the device.
	pub fn close(mut self) -> Result<D, D::Error> {
		self.sync()?;
		self.file.sync()?;
		Ok(self.file.into_dev())
	}

	pub fn stats(&self) -> Stats {
		self.file.stats()
	}

	fn alloc_record(&mut self) -> Result<RecordIdx, D::Error> {
		let free_idx = self.superblock.free_list_head;
		if free_idx != NIL {
			// The free list is non-empty; reuse its first element.
			self.superblock.free_list_head = self.read_free(free_idx)?;
			debug!("reusing slot {}", free_idx);
			return Ok(free_idx);
		}

		let old_end = self.superblock.end;
		self.superblock.end += 1;

		// Grow the file when the new slot starts a block.
		if old_end == 0 || idx_to_block(self.superblock.end - 1) > idx_to_block(old_end - 1) {
			let blocks = idx_to_block(self.superblock.end - 1) + 1;
			self.file.set_size(blocks * BLOCK_SIZE as u64)?;
		}

		Ok(old_end)
	}

	fn dealloc_record(&mut self, idx: RecordIdx) -> Result<(), D::Error> {
		self.write_free(self.superblock.free_list_head, idx)?;
		self.superblock.free_list_head = idx;
		Ok(())
	}

	fn read_superblock(&mut self) -> Result<(), D::Error> {
		let mut raw = [0; SUPERBLOCK_SIZE];
		self.cache.read(&mut self.file, 0, &mut raw)?;
		self.superblock = Superblock::from_raw(&raw);
		Ok(())
	}

	fn write_superblock(&mut self) -> Result<(), D::Error> {
		let raw = self.superblock.to_raw();
		self.cache.write(&mut self.file, 0, &raw)
	}

	fn read_free(&mut self, idx: RecordIdx) -> Result<RecordIdx, D::Error> {
		let mut raw = [0; 8];
		self.cache.read(&mut self.file, idx_to_offset(idx), &mut raw)?;
		Ok(u64::from_le_bytes(raw))
	}

	fn write_free(&mut self, next_free: RecordIdx, idx: RecordIdx) -> Result<(), D::Error> {
		self.cache
			.write(&mut self.file, idx_to_offset(idx), &next_free.to_le_bytes())
	}

	fn read_record(&mut self, idx: RecordIdx) -> Result<Record, D::Error> {
		let mut raw = [0; 8];
		self.cache.read(&mut self.file, idx_to_offset(idx), &mut raw)?;
		Ok(Record::from_le_bytes(raw))
	}

	fn write_record(&mut self, record: Record, idx: RecordIdx) -> Result<(), D::Error> {
		self.cache
			.write(&mut self.file, idx_to_offset(idx), &record.to_le_bytes())
	}
}
