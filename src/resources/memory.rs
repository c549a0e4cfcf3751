// src/resources/memory.rs
//! Backing memory and on-disk dumps for caches and datasets
//!
//! A dump file is the 8-byte magic number followed by the raw generated
//! bytes. Dumps are written to a temporary sibling and renamed into place
//! only after generation finished, so a dump that exists is complete.
#![allow(unsafe_code)]

use crate::miner::algorithm::ALGORITHM_REVISION;
use crate::utils::error::EngineError;
use memmap2::{Mmap, MmapMut};
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

/// Marker at the start of every dump file
pub const DUMP_MAGIC: u64 = 0xFEE1_DEAD_BADD_CAFE;
/// Bytes taken by [`DUMP_MAGIC`]
pub const MAGIC_LEN: usize = 8;

/// Bytes of a generated cache or dataset
pub enum Memory {
    /// Owned heap allocation
    Heap(Vec<u8>),
    /// Read-only mapping of a dump file, magic included
    Mapped(Mmap),
}

impl Memory {
    /// The generated bytes, without any file header
    pub fn bytes(&self) -> &[u8] {
        match self {
            Memory::Heap(data) => data,
            Memory::Mapped(map) => &map[MAGIC_LEN..],
        }
    }

    /// Whether the bytes live in a memory-mapped file
    pub fn is_mapped(&self) -> bool {
        matches!(self, Memory::Mapped(_))
    }
}

/// Kind of generated resource, also selecting the dump file prefix
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ResourceKind {
    /// Verification cache
    Cache,
    /// Full mining dataset
    Dataset,
}

impl ResourceKind {
    fn prefix(self) -> &'static str {
        match self {
            ResourceKind::Cache => "cache",
            ResourceKind::Dataset => "full",
        }
    }
}

/// Path of the dump for the epoch owning `seed`
pub fn dump_path(dir: &Path, kind: ResourceKind, seed: &[u8; 32]) -> PathBuf {
    dir.join(format!(
        "{}-R{}-{}",
        kind.prefix(),
        ALGORITHM_REVISION,
        hex::encode(&seed[..8])
    ))
}

/// Allocates a zeroed heap buffer, reporting allocation failure as an error
pub fn allocate(size: usize) -> Result<Vec<u8>, EngineError> {
    let mut buffer = Vec::new();
    buffer.try_reserve_exact(size)?;
    buffer.resize(size, 0);
    Ok(buffer)
}

/// Reads a cache dump into memory
///
/// # Returns
/// - `Ok(Some(bytes))` for a complete dump of exactly `size` bytes
/// - `Ok(None)` if the file is missing or invalid; invalid files are removed
pub fn load_heap(path: &Path, size: u64) -> Result<Option<Vec<u8>>, EngineError> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if !has_valid_layout(&file, size)? || !has_magic(&mut file)? {
        discard(path);
        return Ok(None);
    }
    let mut data = allocate(size as usize)?;
    file.read_exact(&mut data)?;
    Ok(Some(data))
}

/// Maps a dataset dump read-only
///
/// Same validation and return convention as [`load_heap`].
pub fn load_mapped(path: &Path, size: u64) -> Result<Option<Memory>, EngineError> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if !has_valid_layout(&file, size)? || !has_magic(&mut file)? {
        discard(path);
        return Ok(None);
    }
    // SAFETY: dump files are only created through `dump_mapped`/`dump_heap`,
    // which never modify a file after renaming it into place.
    let map = unsafe { Mmap::map(&file) }.map_err(EngineError::from_io)?;
    Ok(Some(Memory::Mapped(map)))
}

/// Writes an already generated buffer as a dump
pub fn dump_heap(path: &Path, data: &[u8]) -> Result<(), EngineError> {
    let temp = temp_path(path);
    let result = (|| -> Result<(), EngineError> {
        let mut file = File::create(&temp).map_err(EngineError::from_io)?;
        file.write_all(&DUMP_MAGIC.to_le_bytes())
            .and_then(|_| file.write_all(data))
            .and_then(|_| file.sync_all())
            .map_err(EngineError::from_io)?;
        fs::rename(&temp, path)?;
        Ok(())
    })();
    if result.is_err() {
        discard(&temp);
    }
    result
}

/// Generates a dump of `size` bytes directly into a mapped file
///
/// `fill` receives the payload area. The magic is written and the file
/// renamed to `path` only if `fill` succeeds; on any failure the temporary
/// file is removed and nothing appears at `path`.
pub fn dump_mapped(
    path: &Path,
    size: u64,
    fill: impl FnOnce(&mut [u8]) -> Result<(), EngineError>,
) -> Result<Memory, EngineError> {
    let temp = temp_path(path);
    let result = (|| -> Result<Memory, EngineError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&temp)
            .map_err(EngineError::from_io)?;
        reserve(&file, MAGIC_LEN as u64 + size)?;

        // SAFETY: the temporary file name is unique to this generation and
        // nothing else opens it before the rename below.
        let mut map = unsafe { MmapMut::map_mut(&file) }.map_err(EngineError::from_io)?;
        fill(&mut map[MAGIC_LEN..])?;
        map[..MAGIC_LEN].copy_from_slice(&DUMP_MAGIC.to_le_bytes());
        map.flush().map_err(EngineError::from_io)?;

        fs::rename(&temp, path)?;
        let map = map.make_read_only()?;
        Ok(Memory::Mapped(map))
    })();
    if result.is_err() {
        discard(&temp);
    }
    result
}

/// Removes dumps of epochs that fell out of the on-disk window
///
/// Keeps `keep` epochs ending at `epoch`; `seed_of` maps an epoch to its seed.
pub fn remove_stale(
    dir: &Path,
    kind: ResourceKind,
    epoch: u64,
    keep: u64,
    seed_of: impl Fn(u64) -> [u8; 32],
) {
    let Some(newest_stale) = epoch.checked_sub(keep) else {
        return;
    };
    for stale in (0..=newest_stale).rev() {
        let path = dump_path(dir, kind, &seed_of(stale));
        if fs::remove_file(&path).is_ok() {
            log::debug!("Removed stale {:?} dump epoch={} path={}", kind, stale, path.display());
        }
    }
}

fn has_valid_layout(file: &File, size: u64) -> Result<bool, EngineError> {
    Ok(file.metadata()?.len() == MAGIC_LEN as u64 + size)
}

fn has_magic(file: &mut File) -> Result<bool, EngineError> {
    let mut magic = [0u8; MAGIC_LEN];
    file.read_exact(&mut magic)?;
    Ok(u64::from_le_bytes(magic) == DUMP_MAGIC)
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(format!(".{}", rand::random::<u32>()));
    PathBuf::from(name)
}

fn discard(path: &Path) {
    if fs::remove_file(path).is_ok() {
        log::debug!("Discarded invalid or partial dump path={}", path.display());
    }
}

/// Sizes the file, allocating real blocks where the platform allows so a
/// full disk fails here instead of on a later write through the mapping
fn reserve(file: &File, len: u64) -> Result<(), EngineError> {
    file.set_len(len).map_err(EngineError::from_io)?;

    #[cfg(target_os = "linux")]
    {
        use std::os::unix::io::AsRawFd;
        // SAFETY: plain syscall on a file descriptor we own.
        let rc = unsafe { libc::posix_fallocate(file.as_raw_fd(), 0, len as libc::off_t) };
        if rc != 0 && rc != libc::EOPNOTSUPP && rc != libc::EINVAL {
            return Err(EngineError::from_io(io::Error::from_raw_os_error(rc)));
        }
    }
    Ok(())
}
