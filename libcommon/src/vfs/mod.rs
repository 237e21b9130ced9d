//! A tiny virtual filesystem abstraction.
//!
//! The core never touches sockets or the local filesystem directly outside of
//! this trait; callers (the CLI, tests) supply whichever implementation fits.

use anyhow::{Context, Result as AResult};
use crate::{Reader, SharedStream};
use std::{collections::HashMap, fs::File, path::{Path, PathBuf}};

pub trait VirtualFileSystem<T: Reader> {
    fn open(&self, path: impl AsRef<Path>) -> AResult<Box<dyn VirtualFile<T>>>;
}

pub trait VirtualFile<T: Reader> {
    fn data(&self) -> SharedStream<T>;
    fn path(&self) -> &Path;
}

/// Opens raw files directly off the local disk.
#[derive(Default)]
pub struct HostFileSystem;

impl HostFileSystem {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

pub struct HostFile {
    path: PathBuf,
    inner: SharedStream<File>,
}

impl VirtualFile<File> for HostFile {
    fn data(&self) -> SharedStream<File> {
        self.inner.clone()
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl VirtualFileSystem<File> for HostFileSystem {
    fn open(&self, path: impl AsRef<Path>) -> AResult<Box<dyn VirtualFile<File>>> {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| format!("can't open {}", path.display()))?;
        Ok(Box::new(HostFile {
            path: path.to_path_buf(),
            inner: SharedStream::new(file),
        }))
    }
}

/// An in-memory filesystem, used by tests and by the external-cast fetcher
/// to hand already-downloaded bytes back through the same loading path as a
/// real file.
#[derive(Default)]
pub struct MemoryFileSystem {
    files: HashMap<PathBuf, Vec<u8>>,
}

impl MemoryFileSystem {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, bytes: impl Into<Vec<u8>>) {
        self.files.insert(path.into(), bytes.into());
    }
}

pub struct MemoryFile {
    path: PathBuf,
    inner: SharedStream<std::io::Cursor<Vec<u8>>>,
}

impl VirtualFile<std::io::Cursor<Vec<u8>>> for MemoryFile {
    fn data(&self) -> SharedStream<std::io::Cursor<Vec<u8>>> {
        self.inner.clone()
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl VirtualFileSystem<std::io::Cursor<Vec<u8>>> for MemoryFileSystem {
    fn open(&self, path: impl AsRef<Path>) -> AResult<Box<dyn VirtualFile<std::io::Cursor<Vec<u8>>>>> {
        let path = path.as_ref();
        let bytes = self.files.get(path)
            .with_context(|| format!("no such file in memory filesystem: {}", path.display()))?
            .clone();
        Ok(Box::new(MemoryFile {
            path: path.to_path_buf(),
            inner: SharedStream::new(std::io::Cursor::new(bytes)),
        }))
    }
}
