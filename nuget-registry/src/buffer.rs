//! Bounded, hashing, rewindable staging buffer
//!
//! Uploads are materialised into a [`HashedBuffer`] before any parsing
//! starts. The same buffer is then hashed (digests are computed while
//! writing), parsed forward-only by the extractors and re-read from offset
//! zero for persistence.
//!
//! Small uploads stay in memory; anything above the memory threshold spills
//! into an anonymous temporary file. Both backings are released when the
//! buffer is dropped, which is how every exit path of an upload (success,
//! validation failure, cancellation) frees its staging space.

use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};

use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::hash_utils::{HashSummary, MultiHasher};

enum Backing {
    Memory(Cursor<Vec<u8>>),
    File(File),
}

impl Backing {
    fn as_read_seek(&mut self) -> &mut dyn ReadSeek {
        match self {
            Backing::Memory(cursor) => cursor,
            Backing::File(file) => file,
        }
    }
}

trait ReadSeek: Read + Seek {}
impl<T: Read + Seek> ReadSeek for T {}

/// Write side of a [`HashedBuffer`].
///
/// Rejects data beyond `max_size` with [`AppError::PayloadTooLarge`] and
/// switches to a temporary file once `memory_threshold` is crossed.
pub struct HashedBufferWriter {
    memory: Option<Vec<u8>>,
    file: Option<File>,
    hasher: MultiHasher,
    size: u64,
    max_size: u64,
    memory_threshold: usize,
}

impl HashedBufferWriter {
    pub fn new(max_size: u64, memory_threshold: usize) -> Self {
        HashedBufferWriter {
            memory: Some(Vec::new()),
            file: None,
            hasher: MultiHasher::new(),
            size: 0,
            max_size,
            memory_threshold,
        }
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn append(&mut self, chunk: &[u8]) -> AppResult<()> {
        let new_size = self.size + chunk.len() as u64;
        if new_size > self.max_size {
            return Err(AppError::PayloadTooLarge(format!(
                "upload exceeds the maximum size of {} bytes",
                self.max_size
            )));
        }

        if let Some(memory) = self.memory.as_mut() {
            if memory.len() + chunk.len() <= self.memory_threshold {
                memory.extend_from_slice(chunk);
            } else {
                let mut file = tempfile::tempfile()?;
                file.write_all(memory)?;
                file.write_all(chunk)?;
                debug!(size = new_size, "Staging buffer spilled to temporary file");
                self.memory = None;
                self.file = Some(file);
            }
        } else if let Some(file) = self.file.as_mut() {
            file.write_all(chunk)?;
        }

        self.hasher.update(chunk);
        self.size = new_size;
        Ok(())
    }

    /// Seal the buffer and position it at offset zero.
    pub fn finish(self) -> AppResult<HashedBuffer> {
        let backing = match (self.memory, self.file) {
            (Some(memory), _) => Backing::Memory(Cursor::new(memory)),
            (None, Some(mut file)) => {
                file.flush()?;
                file.seek(SeekFrom::Start(0))?;
                Backing::File(file)
            }
            (None, None) => Backing::Memory(Cursor::new(Vec::new())),
        };

        Ok(HashedBuffer {
            backing,
            size: self.size,
            hashes: self.hasher.finalize(),
        })
    }
}

/// Sealed staging buffer with known size and digests.
pub struct HashedBuffer {
    backing: Backing,
    size: u64,
    hashes: HashSummary,
}

impl HashedBuffer {
    /// Wrap bytes that are already in memory.
    #[cfg(test)]
    pub fn from_bytes(data: Vec<u8>) -> Self {
        let hashes = crate::hash_utils::hash_summary(&data);
        HashedBuffer {
            size: data.len() as u64,
            backing: Backing::Memory(Cursor::new(data)),
            hashes,
        }
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn hashes(&self) -> &HashSummary {
        &self.hashes
    }

    pub fn is_spilled(&self) -> bool {
        matches!(self.backing, Backing::File(_))
    }

    pub fn rewind(&mut self) -> io::Result<()> {
        self.seek(SeekFrom::Start(0)).map(|_| ())
    }

    /// Read the whole content from offset zero, leaving the buffer rewound.
    pub fn read_all(&mut self) -> io::Result<Vec<u8>> {
        self.rewind()?;
        let mut out = Vec::with_capacity(self.size as usize);
        self.read_to_end(&mut out)?;
        self.rewind()?;
        Ok(out)
    }
}

impl Read for HashedBuffer {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.backing.as_read_seek().read(buf)
    }
}

impl Seek for HashedBuffer {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.backing.as_read_seek().seek(pos)
    }
}

impl std::fmt::Debug for HashedBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashedBuffer")
            .field("size", &self.size)
            .field("spilled", &self.is_spilled())
            .field("sha256", &self.hashes.sha256)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash_utils::hash_summary;

    #[test]
    fn test_memory_buffer_rewinds() {
        let mut writer = HashedBufferWriter::new(1024, 512);
        writer.append(b"hello ").unwrap();
        writer.append(b"world").unwrap();
        let mut buf = writer.finish().unwrap();

        assert!(!buf.is_spilled());
        assert_eq!(buf.size(), 11);
        assert_eq!(buf.hashes(), &hash_summary(b"hello world"));

        let mut first = String::new();
        buf.read_to_string(&mut first).unwrap();
        assert_eq!(first, "hello world");

        buf.rewind().unwrap();
        let mut second = String::new();
        buf.read_to_string(&mut second).unwrap();
        assert_eq!(second, "hello world");
    }

    #[test]
    fn test_spills_past_threshold() {
        let mut writer = HashedBufferWriter::new(1024, 8);
        writer.append(b"0123").unwrap();
        writer.append(b"456789").unwrap();
        writer.append(b"abc").unwrap();
        let mut buf = writer.finish().unwrap();

        assert!(buf.is_spilled());
        assert_eq!(buf.read_all().unwrap(), b"0123456789abc");
        assert_eq!(buf.hashes(), &hash_summary(b"0123456789abc"));
    }

    #[test]
    fn test_rejects_oversized_upload() {
        let mut writer = HashedBufferWriter::new(8, 4);
        writer.append(b"12345678").unwrap();
        let err = writer.append(b"9").unwrap_err();
        assert!(matches!(err, AppError::PayloadTooLarge(_)));
        assert_eq!(writer.size(), 8);
    }

    #[test]
    fn test_from_bytes() {
        let mut buf = HashedBuffer::from_bytes(b"pdb".to_vec());
        assert_eq!(buf.size(), 3);
        assert_eq!(buf.read_all().unwrap(), b"pdb");
    }
}
