// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Filesystem access.
//!
//! Service tree resolution and environment loading never touch the host
//! filesystem directly. They go through the [`FileSystem`] trait instead, so
//! callers can swap in a recording or in-memory implementation.

use std::{
    ffi::OsString,
    io,
    path::{Path, PathBuf},
};
use tracing::warn;

/// Immediate child of a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Name of the entry, without its parent path.
    pub name: OsString,

    /// Absolute path to the entry.
    pub path: PathBuf,

    /// Entry is a directory.
    pub is_dir: bool,
}

/// Layer of indirection for filesystem access.
pub trait FileSystem {
    /// List immediate children of a directory.
    fn read_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>>;

    /// Check that a path exists.
    fn exists(&self, path: &Path) -> bool;

    /// Read entire file as text.
    fn read_to_string(&self, path: &Path) -> io::Result<String>;
}

impl<F> FileSystem for &F
where
    F: FileSystem + ?Sized,
{
    fn read_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        (**self).read_dir(path)
    }

    fn exists(&self, path: &Path) -> bool {
        (**self).exists(path)
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        (**self).read_to_string(path)
    }
}

/// Filesystem access through the host operating system.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostFs;

impl FileSystem for HostFs {
    fn read_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        let mut entries = Vec::new();
        for entry in readable(std::fs::read_dir(path)?, path) {
            // INVARIANT: Follow symlinks so linked service directories count.
            let is_dir = entry.path().is_dir();
            entries.push(DirEntry {
                name: entry.file_name(),
                path: entry.path(),
                is_dir,
            });
        }

        Ok(entries)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }
}

/// Skip directory entries that cannot be read.
fn readable<T>(
    entries: impl IntoIterator<Item = io::Result<T>>,
    dir: &Path,
) -> impl Iterator<Item = T> {
    let dir = dir.to_path_buf();
    entries.into_iter().filter_map(move |entry| match entry {
        Ok(entry) => Some(entry),
        Err(error) => {
            warn!("skipping unreadable entry of {:?}: {error}", dir.display());
            None
        }
    })
}
