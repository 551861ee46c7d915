use {
	crate::{BLOCK_SIZE, NIL},
	log::trace,
	rafile::{xassert, Dev, File},
};

/// Write-back cache holding the most recently used block.
///
/// If `dirty`, the cached data differs from disk and is flushed before
/// another block is loaded and on sync.
pub(crate) struct BlockCache {
	dirty: bool,
	block: u64,
	data: [u8; BLOCK_SIZE],
}

impl BlockCache {
	pub fn new() -> Self {
		Self { dirty: false, block: NIL, data: [0; BLOCK_SIZE] }
	}

	pub fn flush<D: Dev>(&mut self, file: &mut File<D>) -> Result<(), D::Error> {
		if !self.dirty {
			return Ok(());
		}
		self.dirty = false;
		trace!("flushing block {}", self.block);
		file.write(self.block * BLOCK_SIZE as u64, &self.data)
	}

	fn load<D: Dev>(&mut self, file: &mut File<D>, block: u64) -> Result<(), D::Error> {
		if block == self.block {
			return Ok(());
		}
		self.flush(file)?;
		file.read(block * BLOCK_SIZE as u64, &mut self.data)?;
		self.block = block;
		Ok(())
	}

	/// Read a sub-range of one block. The range must not cross a block
	/// boundary.
	pub fn read<D: Dev>(
		&mut self,
		file: &mut File<D>,
		offset: u64,
		buf: &mut [u8],
	) -> Result<(), D::Error> {
		let block = offset / BLOCK_SIZE as u64;
		self.load(file, block)?;

		let o = (offset - block * BLOCK_SIZE as u64) as usize;
		xassert!(1, o + buf.len() <= BLOCK_SIZE);
		buf.copy_from_slice(&self.data[o..o + buf.len()]);
		Ok(())
	}

	/// Write a sub-range of one block. The range must not cross a block
	/// boundary.
	pub fn write<D: Dev>(
		&mut self,
		file: &mut File<D>,
		offset: u64,
		data: &[u8],
	) -> Result<(), D::Error> {
		let block = offset / BLOCK_SIZE as u64;
		self.load(file, block)?;

		let o = (offset - block * BLOCK_SIZE as u64) as usize;
		xassert!(1, o + data.len() <= BLOCK_SIZE);
		self.data[o..o + data.len()].copy_from_slice(data);
		self.dirty = true;
		Ok(())
	}
}
