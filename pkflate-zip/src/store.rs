//! Backing stores for archives.
//!
//! A store is a random-access byte container addressed by archive-relative
//! offsets. The reader only calls [`ZipStore::read_at`]; the writer also
//! calls [`ZipStore::write_at`]. Four stores are provided: a growable heap
//! buffer, a borrowed slice, a file window and caller callbacks.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Random-access storage behind an archive handle.
pub trait ZipStore {
    /// Current size in bytes.
    fn size(&self) -> u64;

    /// Read up to `buf.len()` bytes at `offset`. Returns the number read,
    /// which is short only at the end of the store.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize>;

    /// Write `data` at `offset`, extending the store as needed. Returns the
    /// number of bytes written.
    fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<usize>;

    /// Whether [`write_at`](Self::write_at) can succeed.
    fn is_writable(&self) -> bool {
        true
    }

    /// Push buffered writes to their destination.
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<S: ZipStore + ?Sized> ZipStore for &mut S {
    fn size(&self) -> u64 {
        (**self).size()
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read_at(offset, buf)
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<usize> {
        (**self).write_at(offset, data)
    }

    fn is_writable(&self) -> bool {
        (**self).is_writable()
    }

    fn flush(&mut self) -> io::Result<()> {
        (**self).flush()
    }
}

impl<S: ZipStore + ?Sized> ZipStore for Box<S> {
    fn size(&self) -> u64 {
        (**self).size()
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read_at(offset, buf)
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<usize> {
        (**self).write_at(offset, data)
    }

    fn is_writable(&self) -> bool {
        (**self).is_writable()
    }

    fn flush(&mut self) -> io::Result<()> {
        (**self).flush()
    }
}

/// Fill `buf` from `offset`, failing on a short read.
pub fn read_exact_at<S: ZipStore + ?Sized>(
    store: &mut S,
    mut offset: u64,
    mut buf: &mut [u8],
) -> io::Result<()> {
    while !buf.is_empty() {
        let n = store.read_at(offset, buf)?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "read past the end of the store",
            ));
        }
        offset += n as u64;
        buf = &mut buf[n..];
    }
    Ok(())
}

/// Write all of `data` at `offset`, failing on a short write.
pub fn write_all_at<S: ZipStore + ?Sized>(
    store: &mut S,
    mut offset: u64,
    mut data: &[u8],
) -> io::Result<()> {
    while !data.is_empty() {
        let n = store.write_at(offset, data)?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                "store accepted no bytes",
            ));
        }
        offset += n as u64;
        data = &data[n..];
    }
    Ok(())
}

fn offset_to_usize(offset: u64) -> io::Result<usize> {
    usize::try_from(offset)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "offset exceeds address space"))
}

fn copy_out(src: &[u8], offset: u64, buf: &mut [u8]) -> usize {
    let Ok(start) = usize::try_from(offset) else {
        return 0;
    };
    if start >= src.len() {
        return 0;
    }
    let n = buf.len().min(src.len() - start);
    buf[..n].copy_from_slice(&src[start..start + n]);
    n
}

/// Growable in-memory archive.
///
/// Capacity at least doubles whenever a write runs past it, so building an
/// archive entry by entry stays linear.
#[derive(Debug, Clone, Default)]
pub struct HeapStore {
    data: Vec<u8>,
}

impl HeapStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store with room for `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
        }
    }

    /// Wrap existing archive bytes.
    pub fn from_vec(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// The stored bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Current capacity of the backing buffer.
    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    /// Take the stored bytes.
    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

impl ZipStore for HeapStore {
    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        Ok(copy_out(&self.data, offset, buf))
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<usize> {
        let start = offset_to_usize(offset)?;
        let end = start
            .checked_add(data.len())
            .ok_or_else(|| io::Error::new(io::ErrorKind::OutOfMemory, "archive too large"))?;

        if end > self.data.capacity() {
            let new_cap = end.max(self.data.capacity().saturating_mul(2)).max(64);
            self.data.reserve_exact(new_cap - self.data.len());
        }
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[start..end].copy_from_slice(data);
        Ok(data.len())
    }
}

/// Read-only archive in a borrowed buffer.
#[derive(Debug, Clone, Copy)]
pub struct SliceStore<'a> {
    data: &'a [u8],
}

impl<'a> SliceStore<'a> {
    /// Wrap a buffer.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// The borrowed bytes.
    pub fn as_slice(&self) -> &'a [u8] {
        self.data
    }
}

impl ZipStore for SliceStore<'_> {
    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        Ok(copy_out(self.data, offset, buf))
    }

    fn write_at(&mut self, _offset: u64, _data: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(
            io::ErrorKind::PermissionDenied,
            "slice store is read-only",
        ))
    }

    fn is_writable(&self) -> bool {
        false
    }
}

/// A window of a file, starting at `start`.
///
/// Offsets are relative to the window, so an archive embedded after an
/// arbitrary prefix is addressed as if it began at zero.
#[derive(Debug)]
pub struct FileStore {
    file: File,
    start: u64,
    size: u64,
    writable: bool,
}

impl FileStore {
    /// Open an existing file for reading.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = File::open(path)?;
        let size = file.metadata()?.len();
        Ok(Self {
            file,
            start: 0,
            size,
            writable: false,
        })
    }

    /// Open an existing file for reading and writing.
    pub fn open_rw<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let size = file.metadata()?.len();
        Ok(Self {
            file,
            start: 0,
            size,
            writable: true,
        })
    }

    /// Create or truncate a file.
    pub fn create<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(Self {
            file,
            start: 0,
            size: 0,
            writable: true,
        })
    }

    /// Use `size` bytes of `file` starting at `start`. Pass `None` to use
    /// everything from `start` to the end of the file.
    pub fn from_file(
        file: File,
        start: u64,
        size: Option<u64>,
        writable: bool,
    ) -> io::Result<Self> {
        let len = file.metadata()?.len();
        if start > len {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "window starts past the end of the file",
            ));
        }
        let size = match size {
            Some(size) if start.checked_add(size).is_some_and(|end| end <= len) => size,
            Some(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "window extends past the end of the file",
                ));
            }
            None => len - start,
        };
        Ok(Self {
            file,
            start,
            size,
            writable,
        })
    }

    /// Offset of the window inside the file.
    pub fn start(&self) -> u64 {
        self.start
    }

    /// Release the file handle.
    pub fn into_file(self) -> File {
        self.file
    }
}

impl ZipStore for FileStore {
    fn size(&self) -> u64 {
        self.size
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        if offset >= self.size {
            return Ok(0);
        }
        let limit = (self.size - offset).min(buf.len() as u64) as usize;
        self.file.seek(SeekFrom::Start(self.start + offset))?;

        let mut filled = 0;
        while filled < limit {
            match self.file.read(&mut buf[filled..limit]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<usize> {
        if !self.writable {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "file opened read-only",
            ));
        }
        self.file.seek(SeekFrom::Start(self.start + offset))?;
        self.file.write_all(data)?;
        self.size = self.size.max(offset + data.len() as u64);
        Ok(data.len())
    }

    fn is_writable(&self) -> bool {
        self.writable
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()?;
        if self.writable {
            self.file.sync_data()?;
        }
        Ok(())
    }
}

type ReadFn<'a> = Box<dyn FnMut(u64, &mut [u8]) -> usize + 'a>;
type WriteFn<'a> = Box<dyn FnMut(u64, &[u8]) -> usize + 'a>;

/// Store driven by caller callbacks.
///
/// The read callback fills a buffer from an offset and returns the count;
/// the write callback stores bytes at an offset and returns the count. A
/// short count is reported as an I/O error, which is how a caller cancels
/// an operation.
pub struct CallbackStore<'a> {
    size: u64,
    read: Option<ReadFn<'a>>,
    write: Option<WriteFn<'a>>,
}

impl<'a> CallbackStore<'a> {
    /// Read-only store of `size` bytes.
    pub fn reader<R>(size: u64, read: R) -> Self
    where
        R: FnMut(u64, &mut [u8]) -> usize + 'a,
    {
        Self {
            size,
            read: Some(Box::new(read)),
            write: None,
        }
    }

    /// Write-only store, initially empty.
    pub fn writer<W>(write: W) -> Self
    where
        W: FnMut(u64, &[u8]) -> usize + 'a,
    {
        Self {
            size: 0,
            read: None,
            write: Some(Box::new(write)),
        }
    }

    /// Readable and writable store of `size` bytes.
    pub fn read_write<R, W>(size: u64, read: R, write: W) -> Self
    where
        R: FnMut(u64, &mut [u8]) -> usize + 'a,
        W: FnMut(u64, &[u8]) -> usize + 'a,
    {
        Self {
            size,
            read: Some(Box::new(read)),
            write: Some(Box::new(write)),
        }
    }
}

impl ZipStore for CallbackStore<'_> {
    fn size(&self) -> u64 {
        self.size
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let Some(read) = self.read.as_mut() else {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "no read callback",
            ));
        };
        if offset >= self.size {
            return Ok(0);
        }
        let limit = (self.size - offset).min(buf.len() as u64) as usize;
        let n = read(offset, &mut buf[..limit]);
        if n > limit {
            return Err(io::Error::other("read callback overran its buffer"));
        }
        Ok(n)
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<usize> {
        let Some(write) = self.write.as_mut() else {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "no write callback",
            ));
        };
        let n = write(offset, data);
        if n != data.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                "write callback stored a short count",
            ));
        }
        self.size = self.size.max(offset + n as u64);
        Ok(n)
    }

    fn is_writable(&self) -> bool {
        self.write.is_some()
    }
}
