//! Byte sources backing a document
//!
//! A document reads from either an in-memory buffer or a read-only memory
//! mapping of its file. Both hand out one contiguous `&[u8]`, so the lexer and
//! object parser work the same way over either.

use super::MemoryOptions;
use crate::error::{PdfError, Result};
use std::fmt;
use std::fs::File;
#[cfg(not(any(unix, windows)))]
use std::io::{Read, Seek, SeekFrom};
use std::ops::Deref;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

/// Held by the incremental writer while old bytes are copied forward and the
/// new revision is appended, so no mapping is read while its file grows.
pub static SOURCE_LOCK: Mutex<()> = Mutex::new(());

/// Acquire [`SOURCE_LOCK`]. A poisoned lock is still usable since it guards no data.
pub fn lock_sources() -> MutexGuard<'static, ()> {
    SOURCE_LOCK
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Platform-specific memory mapping implementation
#[cfg(unix)]
mod unix_mmap {
    use super::*;
    use std::os::unix::io::AsRawFd;
    use std::ptr;

    pub struct MmapInner {
        ptr: *mut u8,
        len: usize,
    }

    // SAFETY: the mapping is read-only and never remapped while shared
    unsafe impl Send for MmapInner {}
    unsafe impl Sync for MmapInner {}

    impl MmapInner {
        pub fn new(file: &File, len: usize) -> Result<Self> {
            if len == 0 {
                return Err(PdfError::InvalidStructure(
                    "Cannot mmap empty file".to_string(),
                ));
            }

            unsafe {
                let ptr = libc::mmap(
                    ptr::null_mut(),
                    len,
                    libc::PROT_READ,
                    libc::MAP_PRIVATE,
                    file.as_raw_fd(),
                    0,
                );

                if ptr == libc::MAP_FAILED {
                    return Err(PdfError::Io(std::io::Error::last_os_error()));
                }

                Ok(Self {
                    ptr: ptr as *mut u8,
                    len,
                })
            }
        }

        pub fn as_slice(&self) -> &[u8] {
            unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
        }
    }

    impl Drop for MmapInner {
        fn drop(&mut self) {
            unsafe {
                libc::munmap(self.ptr as *mut libc::c_void, self.len);
            }
        }
    }
}

#[cfg(windows)]
mod windows_mmap {
    use super::*;
    use std::os::windows::io::AsRawHandle;
    use std::ptr;
    use winapi::um::handleapi::CloseHandle;
    use winapi::um::memoryapi::{
        CreateFileMappingW, MapViewOfFile, UnmapViewOfFile, FILE_MAP_READ,
    };
    use winapi::um::winnt::PAGE_READONLY;

    pub struct MmapInner {
        ptr: *mut u8,
        len: usize,
        mapping_handle: *mut winapi::ctypes::c_void,
    }

    unsafe impl Send for MmapInner {}
    unsafe impl Sync for MmapInner {}

    impl MmapInner {
        pub fn new(file: &File, len: usize) -> Result<Self> {
            if len == 0 {
                return Err(PdfError::InvalidStructure(
                    "Cannot mmap empty file".to_string(),
                ));
            }

            unsafe {
                let mapping_handle = CreateFileMappingW(
                    file.as_raw_handle() as *mut _,
                    ptr::null_mut(),
                    PAGE_READONLY,
                    0,
                    0,
                    ptr::null(),
                );

                if mapping_handle.is_null() {
                    return Err(PdfError::Io(std::io::Error::last_os_error()));
                }

                let ptr = MapViewOfFile(mapping_handle, FILE_MAP_READ, 0, 0, len);

                if ptr.is_null() {
                    CloseHandle(mapping_handle);
                    return Err(PdfError::Io(std::io::Error::last_os_error()));
                }

                Ok(Self {
                    ptr: ptr as *mut u8,
                    len,
                    mapping_handle,
                })
            }
        }

        pub fn as_slice(&self) -> &[u8] {
            unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
        }
    }

    impl Drop for MmapInner {
        fn drop(&mut self) {
            unsafe {
                UnmapViewOfFile(self.ptr as *mut _);
                CloseHandle(self.mapping_handle);
            }
        }
    }
}

// Fallback implementation for unsupported platforms
#[cfg(not(any(unix, windows)))]
mod fallback_mmap {
    use super::*;

    pub struct MmapInner {
        data: Vec<u8>,
    }

    impl MmapInner {
        pub fn new(file: &File, len: usize) -> Result<Self> {
            let mut data = vec![0u8; len];
            let mut file_clone = file.try_clone()?;
            file_clone.seek(SeekFrom::Start(0))?;
            file_clone.read_exact(&mut data)?;
            Ok(Self { data })
        }

        pub fn as_slice(&self) -> &[u8] {
            &self.data
        }
    }
}

#[cfg(not(any(unix, windows)))]
use fallback_mmap::MmapInner;
#[cfg(unix)]
use unix_mmap::MmapInner;
#[cfg(windows)]
use windows_mmap::MmapInner;

/// Read-only memory-mapped file
pub struct MemoryMappedFile {
    inner: Arc<MmapInner>,
}

impl MemoryMappedFile {
    /// Map the whole of `file`.
    pub fn new(file: &File) -> Result<Self> {
        let len = usize::try_from(file.metadata()?.len())
            .map_err(|_| PdfError::InvalidStructure("File too large to map".to_string()))?;

        let inner = MmapInner::new(file, len)?;

        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// Get the length of the mapped region
    pub fn len(&self) -> usize {
        self.inner.as_slice().len()
    }

    /// Check if the mapped region is empty
    pub fn is_empty(&self) -> bool {
        self.inner.as_slice().is_empty()
    }
}

impl Deref for MemoryMappedFile {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.inner.as_slice()
    }
}

impl AsRef<[u8]> for MemoryMappedFile {
    fn as_ref(&self) -> &[u8] {
        self.inner.as_slice()
    }
}

/// The bytes of one document revision.
#[derive(Clone)]
pub enum ByteSource {
    Memory(Arc<[u8]>),
    Mapped(Arc<MemoryMappedFile>),
}

impl ByteSource {
    pub fn from_vec(data: Vec<u8>) -> Self {
        ByteSource::Memory(data.into())
    }

    /// Open `path`, mapping it when mapping is enabled and the file is at
    /// least `mmap_threshold` bytes. A failed mapping falls back to reading.
    pub fn open<P: AsRef<Path>>(path: P, options: &MemoryOptions) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let len = file.metadata()?.len();

        if options.memory_mapping && len > 0 && len >= options.mmap_threshold as u64 {
            match MemoryMappedFile::new(&file) {
                Ok(mmap) => {
                    debug!("Mapped {} ({} bytes)", path.display(), len);
                    return Ok(ByteSource::Mapped(Arc::new(mmap)));
                }
                Err(err) => warn!("Mapping {} failed, reading instead: {}", path.display(), err),
            }
        }

        Ok(Self::from_vec(std::fs::read(path)?))
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            ByteSource::Memory(data) => &data[..],
            ByteSource::Mapped(mmap) => &mmap[..],
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }

    pub fn is_mapped(&self) -> bool {
        matches!(self, ByteSource::Mapped(_))
    }
}

impl From<Vec<u8>> for ByteSource {
    fn from(data: Vec<u8>) -> Self {
        Self::from_vec(data)
    }
}

impl From<&[u8]> for ByteSource {
    fn from(data: &[u8]) -> Self {
        ByteSource::Memory(data.into())
    }
}

impl Deref for ByteSource {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.as_bytes()
    }
}

impl AsRef<[u8]> for ByteSource {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl fmt::Debug for ByteSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_mapped() { "Mapped" } else { "Memory" };
        f.debug_struct("ByteSource")
            .field("kind", &kind)
            .field("len", &self.len())
            .finish()
    }
}
