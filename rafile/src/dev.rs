use {
	core::{convert::Infallible, fmt},
	log::debug,
	std::{
		fs,
		io::{self, Read, Seek, SeekFrom, Write},
		path::Path,
	},
};

/// A device holding a resizable sequence of bytes.
///
/// The seam between [`File`](crate::File) and the host.
pub trait Dev {
	type Error: fmt::Debug;

	fn len(&mut self) -> Result<u64, Self::Error>;
	fn set_len(&mut self, len: u64) -> Result<(), Self::Error>;
	fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), Self::Error>;
	fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<(), Self::Error>;
	fn sync(&mut self) -> Result<(), Self::Error>;
}

/// A device wrapping a host file.
#[derive(Debug)]
pub struct FileDev {
	file: fs::File,
}

impl FileDev {
	/// Create or open the named file. If `truncate`, its size becomes 0.
	pub fn open(path: impl AsRef<Path>, truncate: bool) -> io::Result<Self> {
		let path = path.as_ref();
		let file = fs::OpenOptions::new()
			.read(true)
			.write(true)
			.create(true)
			.truncate(truncate)
			.open(path)?;
		debug!("opened {} (truncate: {})", path.display(), truncate);
		Ok(Self { file })
	}
}

impl Dev for FileDev {
	type Error = io::Error;

	fn len(&mut self) -> io::Result<u64> {
		self.file.seek(SeekFrom::End(0))
	}

	fn set_len(&mut self, len: u64) -> io::Result<()> {
		self.file.set_len(len)
	}

	fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
		self.file.seek(SeekFrom::Start(offset))?;
		self.file.read_exact(buf)
	}

	fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<()> {
		self.file.seek(SeekFrom::Start(offset))?;
		self.file.write_all(data)
	}

	fn sync(&mut self) -> io::Result<()> {
		self.file.sync_all()
	}
}

/// A device entirely in memory. Useful for testing.
#[derive(Debug, Default)]
pub struct MemDev {
	buf: Vec<u8>,
}

impl MemDev {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn into_vec(self) -> Vec<u8> {
		self.buf
	}
}

impl From<Vec<u8>> for MemDev {
	fn from(buf: Vec<u8>) -> Self {
		Self { buf }
	}
}

impl Dev for MemDev {
	type Error = Infallible;

	fn len(&mut self) -> Result<u64, Infallible> {
		Ok(self.buf.len() as u64)
	}

	fn set_len(&mut self, len: u64) -> Result<(), Infallible> {
		self.buf.resize(len.try_into().expect("length out of range"), 0);
		Ok(())
	}

	fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), Infallible> {
		let o = usize::try_from(offset).expect("offset out of range");
		buf.copy_from_slice(self.buf.get(o..o + buf.len()).expect("out of bounds"));
		Ok(())
	}

	fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<(), Infallible> {
		let o = usize::try_from(offset).expect("offset out of range");
		self.buf
			.get_mut(o..o + data.len())
			.expect("out of bounds")
			.copy_from_slice(data);
		Ok(())
	}

	fn sync(&mut self) -> Result<(), Infallible> {
		Ok(())
	}
}
