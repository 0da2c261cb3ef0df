//! Byte sources, caches and lazy object loading
//!
//! A document never parses more than it is asked for. The bytes behind it are
//! either held in memory or mapped from the file, objects are parsed on their
//! first access, and decoded object streams sit in a bounded LRU cache.
//!
//! # Example
//!
//! ```rust,no_run
//! use pdfdelta::memory::MemoryOptions;
//! use pdfdelta::{Document, DocumentOptions};
//!
//! # fn main() -> pdfdelta::Result<()> {
//! let options = DocumentOptions::default().with_memory(
//!     MemoryOptions::default()
//!         .with_object_stream_cache_size(16)
//!         .with_memory_mapping(true),
//! );
//!
//! let document = Document::open_file("large_document.pdf", options)?;
//! println!("{} pages", document.page_count()?);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod lazy_loader;
pub mod memory_mapped;

// Re-export main types
pub use cache::{CacheStats, ContainerCache, LruCache};
pub use lazy_loader::{ObjectStore, StoreStats};
pub use memory_mapped::{lock_sources, ByteSource, MemoryMappedFile, SOURCE_LOCK};

/// Configuration options for memory use
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryOptions {
    /// Decoded object streams kept in the container cache
    pub object_stream_cache_size: usize,
    /// Keep decoded bytes of content streams and object streams after first decode
    pub cache_decoded_streams: bool,
    /// Enable memory mapping for file access
    pub memory_mapping: bool,
    /// Threshold for using memory mapping (bytes)
    pub mmap_threshold: usize,
}

impl Default for MemoryOptions {
    fn default() -> Self {
        Self {
            object_stream_cache_size: 64,
            cache_decoded_streams: true,
            memory_mapping: true,
            mmap_threshold: 10 * 1024 * 1024, // 10MB
        }
    }
}

impl MemoryOptions {
    pub fn with_object_stream_cache_size(mut self, size: usize) -> Self {
        self.object_stream_cache_size = size;
        self
    }

    pub fn with_decoded_stream_cache(mut self, enabled: bool) -> Self {
        self.cache_decoded_streams = enabled;
        self
    }

    /// Enable memory mapping
    pub fn with_memory_mapping(mut self, enabled: bool) -> Self {
        self.memory_mapping = enabled;
        self
    }

    pub fn with_mmap_threshold(mut self, bytes: usize) -> Self {
        self.mmap_threshold = bytes;
        self
    }
}
