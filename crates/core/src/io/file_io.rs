use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use thiserror::Error;

use crate::shared::byte_order::{swap_bytes, swap_bytes_in_place, Endian};

#[derive(Error, Debug)]
pub enum FileIoError {
    #[error("cannot open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot seek {path}: {source}")]
    Seek {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path}: {len} bytes at offset {pos} is outside the file ({size} bytes)")]
    Range {
        path: PathBuf,
        pos: i64,
        len: u64,
        size: u64,
    },
    #[error("{path}: file is not open for {operation}")]
    NotOpen { path: PathBuf, operation: &'static str },
    #[error("cannot list directory {path}: {source}")]
    List {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Write,
    ReadWrite,
    Append,
}

impl OpenMode {
    fn can_read(self) -> bool {
        matches!(self, OpenMode::Read | OpenMode::ReadWrite)
    }

    fn can_write(self) -> bool {
        !matches!(self, OpenMode::Read)
    }
}

enum Backing {
    Mapped(Mmap),
    File(File),
    Buffered(BufWriter<File>),
    Closed,
}

/// Positioned binary file access with optional per-element byte swapping.
///
/// `Read` mode memory-maps the file when possible; writable modes go through
/// a `BufWriter`. All positioning is checked against the file size; nothing
/// is clamped. In `Append` mode every write lands at the end of the file.
pub struct FileIo {
    path: PathBuf,
    mode: OpenMode,
    backing: Backing,
    pos: u64,
    size: u64,
    swap: bool,
}

impl FileIo {
    pub fn open(path: &Path, mode: OpenMode) -> Result<Self, FileIoError> {
        Self::open_with(path, mode, true)
    }

    /// Opens without memory mapping, reading through the file handle.
    pub fn open_unmapped(path: &Path, mode: OpenMode) -> Result<Self, FileIoError> {
        Self::open_with(path, mode, false)
    }

    fn open_with(path: &Path, mode: OpenMode, allow_mmap: bool) -> Result<Self, FileIoError> {
        let open_error = |source| FileIoError::Open {
            path: path.to_path_buf(),
            source,
        };
        let file = match mode {
            OpenMode::Read => File::open(path),
            OpenMode::Write => File::create(path),
            OpenMode::ReadWrite => OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(path),
            OpenMode::Append => OpenOptions::new().append(true).create(true).open(path),
        }
        .map_err(open_error)?;
        let size = file.metadata().map_err(open_error)?.len();

        let backing = if mode.can_write() {
            Backing::Buffered(BufWriter::new(file))
        } else if allow_mmap && size > 0 {
            // Safety: the map is read-only and never outlives this handle.
            // Concurrent truncation by another process is not guarded against.
            match unsafe { Mmap::map(&file) } {
                Ok(map) => Backing::Mapped(map),
                Err(e) => {
                    log::debug!("mmap failed for {}, using buffered reads: {e}", path.display());
                    Backing::File(file)
                }
            }
        } else {
            Backing::File(file)
        };

        let pos = if mode == OpenMode::Append { size } else { 0 };
        Ok(Self {
            path: path.to_path_buf(),
            mode,
            backing,
            pos,
            size,
            swap: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        !matches!(self.backing, Backing::Closed)
    }

    pub fn is_mapped(&self) -> bool {
        matches!(self.backing, Backing::Mapped(_))
    }

    pub fn pos(&self) -> u64 {
        self.pos
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Enables byte swapping of every multi-byte element read or written.
    pub fn set_endian_swap(&mut self, swap: bool) {
        self.swap = swap;
    }

    /// Sets swapping so that data is exchanged in `endian` byte order.
    pub fn set_endian(&mut self, endian: Endian) {
        self.swap = endian.needs_swap();
    }

    pub fn endian_swap(&self) -> bool {
        self.swap
    }

    /// The whole mapped file, when memory mapped.
    pub fn mapped_slice(&self) -> Option<&[u8]> {
        match &self.backing {
            Backing::Mapped(map) => Some(&map[..]),
            _ => None,
        }
    }

    /// Mapped bytes from the current position to the end.
    pub fn remaining_mapped(&self) -> Option<&[u8]> {
        self.mapped_slice().map(|data| &data[self.pos as usize..])
    }

    pub fn set_pos(&mut self, pos: u64) -> Result<(), FileIoError> {
        if pos > self.size {
            return Err(self.range_error(pos as i64, 0));
        }
        let result = match &mut self.backing {
            Backing::File(file) => file.seek(SeekFrom::Start(pos)),
            Backing::Buffered(writer) => writer.seek(SeekFrom::Start(pos)),
            Backing::Mapped(_) => Ok(pos),
            Backing::Closed => return Err(self.not_open("seek")),
        };
        result.map_err(|source| FileIoError::Seek {
            path: self.path.clone(),
            source,
        })?;
        self.pos = pos;
        Ok(())
    }

    /// Moves relative to the current position.
    pub fn seek(&mut self, offset: i64) -> Result<(), FileIoError> {
        let target = self.pos as i64 + offset;
        if target < 0 || target as u64 > self.size {
            return Err(self.range_error(target, 0));
        }
        self.set_pos(target as u64)
    }

    /// Reads `element_count` elements of `element_size` bytes into `buf`,
    /// swapping each element when swapping is enabled.
    pub fn read(
        &mut self,
        buf: &mut [u8],
        element_count: usize,
        element_size: usize,
    ) -> Result<(), FileIoError> {
        let len = element_count * element_size;
        if !self.mode.can_read() {
            return Err(self.not_open("reading"));
        }
        if buf.len() < len || self.pos + len as u64 > self.size {
            return Err(self.range_error(self.pos as i64, len as u64));
        }
        let dst = &mut buf[..len];
        match &mut self.backing {
            Backing::Mapped(map) => {
                let src = &map[self.pos as usize..self.pos as usize + len];
                if self.swap && element_size > 1 {
                    for (d, s) in dst
                        .chunks_exact_mut(element_size)
                        .zip(src.chunks_exact(element_size))
                    {
                        for (i, byte) in d.iter_mut().enumerate() {
                            *byte = s[element_size - 1 - i];
                        }
                    }
                } else {
                    dst.copy_from_slice(src);
                }
            }
            Backing::File(file) => {
                file.read_exact(dst).map_err(|source| FileIoError::Read {
                    path: self.path.clone(),
                    source,
                })?;
                if self.swap {
                    swap_bytes_in_place(dst, element_size);
                }
            }
            Backing::Buffered(writer) => {
                let result = writer.flush().and_then(|()| writer.get_mut().read_exact(dst));
                result.map_err(|source| FileIoError::Read {
                    path: self.path.clone(),
                    source,
                })?;
                if self.swap {
                    swap_bytes_in_place(dst, element_size);
                }
            }
            Backing::Closed => return Err(self.not_open("reading")),
        }
        self.pos += len as u64;
        Ok(())
    }

    pub fn read_vec(&mut self, element_count: usize, element_size: usize) -> Result<Vec<u8>, FileIoError> {
        let mut out = vec![0u8; element_count * element_size];
        self.read(&mut out, element_count, element_size)?;
        Ok(out)
    }

    /// Raw bytes, never swapped.
    pub fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>, FileIoError> {
        self.read_vec(len, 1)
    }

    pub fn read_u8(&mut self) -> Result<u8, FileIoError> {
        let mut b = [0u8; 1];
        self.read(&mut b, 1, 1)?;
        Ok(b[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, FileIoError> {
        let mut b = [0u8; 2];
        self.read(&mut b, 1, 2)?;
        Ok(u16::from_ne_bytes(b))
    }

    pub fn read_i16(&mut self) -> Result<i16, FileIoError> {
        Ok(self.read_u16()? as i16)
    }

    pub fn read_u32(&mut self) -> Result<u32, FileIoError> {
        let mut b = [0u8; 4];
        self.read(&mut b, 1, 4)?;
        Ok(u32::from_ne_bytes(b))
    }

    pub fn read_i32(&mut self) -> Result<i32, FileIoError> {
        Ok(self.read_u32()? as i32)
    }

    pub fn read_f32(&mut self) -> Result<f32, FileIoError> {
        Ok(f32::from_bits(self.read_u32()?))
    }

    /// Writes `element_count` elements of `element_size` bytes from `data`,
    /// swapping each element when swapping is enabled.
    pub fn write(
        &mut self,
        data: &[u8],
        element_count: usize,
        element_size: usize,
    ) -> Result<(), FileIoError> {
        let len = element_count * element_size;
        if !self.mode.can_write() {
            return Err(self.not_open("writing"));
        }
        if data.len() < len {
            return Err(self.range_error(self.pos as i64, len as u64));
        }
        let Backing::Buffered(writer) = &mut self.backing else {
            return Err(self.not_open("writing"));
        };
        let result = if self.swap && element_size > 1 {
            writer.write_all(&swap_bytes(&data[..len], element_size))
        } else {
            writer.write_all(&data[..len])
        };
        result.map_err(|source| FileIoError::Write {
            path: self.path.clone(),
            source,
        })?;
        if self.mode == OpenMode::Append {
            self.pos = self.size;
        }
        self.pos += len as u64;
        self.size = self.size.max(self.pos);
        Ok(())
    }

    /// Raw bytes, never swapped.
    pub fn write_bytes(&mut self, data: &[u8]) -> Result<(), FileIoError> {
        self.write(data, data.len(), 1)
    }

    pub fn write_u8(&mut self, value: u8) -> Result<(), FileIoError> {
        self.write(&[value], 1, 1)
    }

    pub fn write_u16(&mut self, value: u16) -> Result<(), FileIoError> {
        self.write(&value.to_ne_bytes(), 1, 2)
    }

    pub fn write_i16(&mut self, value: i16) -> Result<(), FileIoError> {
        self.write_u16(value as u16)
    }

    pub fn write_u32(&mut self, value: u32) -> Result<(), FileIoError> {
        self.write(&value.to_ne_bytes(), 1, 4)
    }

    pub fn write_i32(&mut self, value: i32) -> Result<(), FileIoError> {
        self.write_u32(value as u32)
    }

    pub fn write_f32(&mut self, value: f32) -> Result<(), FileIoError> {
        self.write_u32(value.to_bits())
    }

    /// Releases the handle or mapping. Safe to call repeatedly.
    pub fn close(&mut self) {
        if let Backing::Buffered(writer) = &mut self.backing {
            if let Err(e) = writer.flush() {
                log::warn!("flush failed for {}: {e}", self.path.display());
            }
        }
        self.backing = Backing::Closed;
    }

    fn range_error(&self, pos: i64, len: u64) -> FileIoError {
        FileIoError::Range {
            path: self.path.clone(),
            pos,
            len,
            size: self.size,
        }
    }

    fn not_open(&self, operation: &'static str) -> FileIoError {
        FileIoError::NotOpen {
            path: self.path.clone(),
            operation,
        }
    }
}

impl Drop for FileIo {
    fn drop(&mut self) {
        self.close();
    }
}
