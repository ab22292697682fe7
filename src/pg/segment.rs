//! Relation segment file I/O.
//!
//! Provides [`SegmentFile`], the entry point for reading one segment of a
//! PostgreSQL relation (`base/<db>/<relfilenode>[.N]`). The block size is
//! detected from the `pd_pagesize_version` field of block 0 unless forced.
//! Blocks are read one at a time in a single forward pass; the last block of
//! a torn file may be returned short.

use std::io::{Cursor, Read, Seek, SeekFrom};
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian};

use crate::pg::constants::*;
use crate::pg::session::is_valid_block_size;
use crate::HexeditError;

/// Supertrait combining `Read + Seek` for type-erased readers.
pub(crate) trait ReadSeek: Read + Seek {}
impl<T: Read + Seek> ReadSeek for T {}

/// A memory-mapped file reader implementing `Read` and `Seek`.
///
/// Wraps a `memmap2::Mmap` with a cursor position so it can stand in for a
/// `File` behind `Box<dyn ReadSeek>`.
#[cfg(feature = "cli")]
struct MmapReader {
    mmap: memmap2::Mmap,
    position: u64,
}

#[cfg(feature = "cli")]
impl MmapReader {
    fn new(mmap: memmap2::Mmap) -> Self {
        Self { mmap, position: 0 }
    }
}

#[cfg(feature = "cli")]
impl Read for MmapReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let len = self.mmap.len() as u64;
        if self.position >= len {
            return Ok(0);
        }
        let available = (len - self.position) as usize;
        let to_read = buf.len().min(available);
        let start = self.position as usize;
        buf[..to_read].copy_from_slice(&self.mmap[start..start + to_read]);
        self.position += to_read as u64;
        Ok(to_read)
    }
}

#[cfg(feature = "cli")]
impl Seek for MmapReader {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        let len = self.mmap.len() as i64;
        let new_pos = match pos {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::End(offset) => len + offset,
            SeekFrom::Current(offset) => self.position as i64 + offset,
        };
        if new_pos < 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "seek to a negative position",
            ));
        }
        self.position = new_pos as u64;
        Ok(self.position)
    }
}

/// Where the block size of a segment came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockSizeSource {
    /// Given by the caller.
    Forced,
    /// Read from the header of block 0.
    Detected,
    /// Block 0 did not hold a usable page size; the default was used.
    Fallback(u32),
}

/// An open relation segment file or in-memory image.
pub struct SegmentFile {
    reader: Box<dyn ReadSeek>,
    path: String,
    file_size: u64,
    block_size: u32,
    source: BlockSizeSource,
}

impl SegmentFile {
    /// Open a segment file and detect its block size.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, HexeditError> {
        let path = path.as_ref();
        let (file, file_size) = open_file(path)?;
        Self::init(Box::new(file), path.display().to_string(), file_size, None)
    }

    /// Open with a specific block size (bypass detection).
    pub fn open_with_block_size<P: AsRef<Path>>(path: P, block_size: u32) -> Result<Self, HexeditError> {
        let path = path.as_ref();
        let (file, file_size) = open_file(path)?;
        Self::init(Box::new(file), path.display().to_string(), file_size, Some(block_size))
    }

    /// Open a segment file using memory-mapped I/O.
    ///
    /// # Safety
    ///
    /// The mapping is only sound while no other process truncates the file.
    /// Relation files should be copied out of a running cluster before they
    /// are inspected.
    #[cfg(feature = "cli")]
    pub fn open_mmap<P: AsRef<Path>>(path: P, block_size: Option<u32>) -> Result<Self, HexeditError> {
        let path = path.as_ref();
        let (file, file_size) = open_file(path)?;
        let mmap = unsafe {
            memmap2::Mmap::map(&file)
                .map_err(|e| HexeditError::Io(format!("Cannot mmap {}: {}", path.display(), e)))?
        };
        Self::init(
            Box::new(MmapReader::new(mmap)),
            path.display().to_string(),
            file_size,
            block_size,
        )
    }

    /// Create a segment from an in-memory image with a detected block size.
    ///
    /// # Examples
    ///
    /// ```
    /// use pghex::pg::segment::SegmentFile;
    ///
    /// let mut page = vec![0u8; 8192];
    /// page[18..20].copy_from_slice(&(8192u16 | 4).to_le_bytes());
    /// let seg = SegmentFile::from_bytes(page).unwrap();
    /// assert_eq!(seg.block_size(), 8192);
    /// assert_eq!(seg.block_count(), 1);
    /// ```
    pub fn from_bytes(data: Vec<u8>) -> Result<Self, HexeditError> {
        let file_size = data.len() as u64;
        Self::init(Box::new(Cursor::new(data)), "<memory>".to_string(), file_size, None)
    }

    /// Create a segment from an in-memory image with a specific block size.
    pub fn from_bytes_with_block_size(data: Vec<u8>, block_size: u32) -> Result<Self, HexeditError> {
        let file_size = data.len() as u64;
        Self::init(
            Box::new(Cursor::new(data)),
            "<memory>".to_string(),
            file_size,
            Some(block_size),
        )
    }

    fn init(
        mut reader: Box<dyn ReadSeek>,
        path: String,
        file_size: u64,
        forced_block_size: Option<u32>,
    ) -> Result<Self, HexeditError> {
        if let Some(bs) = forced_block_size {
            if !is_valid_block_size(bs) {
                return Err(HexeditError::Argument(format!("invalid block size {}", bs)));
            }
            return Ok(SegmentFile {
                reader,
                path,
                file_size,
                block_size: bs,
                source: BlockSizeSource::Forced,
            });
        }

        let mut header = [0u8; SIZE_PAGE_HEADER];
        let n = read_fully(&mut reader, &mut header)
            .map_err(|e| HexeditError::Io(format!("Cannot read block 0 of {}: {}", path, e)))?;
        if n < SIZE_PAGE_HEADER {
            return Err(HexeditError::Parse(format!(
                "unable to read full page header from block 0 of {}: read {} bytes",
                path, n
            )));
        }
        reader
            .seek(SeekFrom::Start(0))
            .map_err(|e| HexeditError::Io(format!("Cannot seek to start of {}: {}", path, e)))?;

        let detected = (LittleEndian::read_u16(&header[PD_PAGESIZE_VERSION..]) & 0xFF00) as u32;
        let (block_size, source) = if is_valid_block_size(detected) {
            (detected, BlockSizeSource::Detected)
        } else {
            (BLCKSZ_DEFAULT, BlockSizeSource::Fallback(detected))
        };

        Ok(SegmentFile {
            reader,
            path,
            file_size,
            block_size,
            source,
        })
    }

    /// Path the segment was opened from, or `<memory>`.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    pub fn block_size_source(&self) -> BlockSizeSource {
        self.source
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Number of blocks in the file, counting a trailing partial block.
    pub fn block_count(&self) -> u64 {
        self.file_size.div_ceil(self.block_size as u64)
    }

    /// Position the reader at the start of `block`.
    pub fn seek_block(&mut self, block: u32) -> Result<(), HexeditError> {
        let offset = block as u64 * self.block_size as u64;
        self.reader.seek(SeekFrom::Start(offset)).map_err(|e| {
            HexeditError::Io(format!(
                "seek error encountered before requested start block {}: {}",
                block, e
            ))
        })?;
        Ok(())
    }

    /// Read the next block into `buf` (resized to the block size).
    ///
    /// Returns the number of bytes read: the block size for a whole block,
    /// fewer for a partial block at end of file, 0 at end of file.
    pub fn read_next(&mut self, buf: &mut Vec<u8>) -> Result<usize, HexeditError> {
        buf.resize(self.block_size as usize, 0);
        read_fully(&mut self.reader, buf).map_err(|e| HexeditError::Io(format!("Cannot read {}: {}", self.path, e)))
    }

    /// Read one block by number into a newly allocated buffer, truncated to
    /// the bytes actually present.
    pub fn read_block(&mut self, block: u32) -> Result<Vec<u8>, HexeditError> {
        self.seek_block(block)?;
        let mut buf = Vec::new();
        let n = self.read_next(&mut buf)?;
        if n == 0 {
            return Err(HexeditError::Parse(format!(
                "Block {} out of range ({} has {} blocks)",
                block,
                self.path,
                self.block_count()
            )));
        }
        buf.truncate(n);
        Ok(buf)
    }
}

fn open_file(path: &Path) -> Result<(std::fs::File, u64), HexeditError> {
    let file = std::fs::File::open(path)
        .map_err(|e| HexeditError::Io(format!("could not open file \"{}\": {}", path.display(), e)))?;
    let file_size = file
        .metadata()
        .map_err(|e| HexeditError::Io(format!("Cannot stat {}: {}", path.display(), e)))?
        .len();
    Ok((file, file_size))
}

/// Read until `buf` is full or the reader is exhausted.
fn read_fully<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match reader.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}

/// Segment number from a relation file name: the numeric suffix after the
/// last `.` (`16384.3` gives 3), or 0 when there is none.
pub fn segment_number_from_path<P: AsRef<Path>>(path: P) -> u32 {
    let name = match path.as_ref().file_name().and_then(|n| n.to_str()) {
        Some(n) => n,
        None => return 0,
    };
    match name.rsplit_once('.') {
        Some((_, suffix)) if !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()) => {
            suffix.parse().unwrap_or(0)
        }
        _ => 0,
    }
}
