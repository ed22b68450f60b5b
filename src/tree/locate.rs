// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Prefix lookup of directories and files.
//!
//! Every level of the service tree names its directory and files with a
//! __key prefix__: the level code followed by a dash, e.g.,
//! `01310-webshop/` or `0310-dev.env`. Whatever follows the dash is free
//! form, so lookups match on the prefix alone.
//!
//! Lookups never fail. A missing or unreadable search base simply means
//! nothing was found. Candidates are visited in lexicographic order, so the
//! first match is stable no matter how the host enumerates a directory.

use crate::fs::{DirEntry, FileSystem};

use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Find first child directory of `base` whose name starts with `"{key}-"`.
pub fn find_directory(
    fs: &impl FileSystem,
    base: Option<&Path>,
    key: impl AsRef<str>,
) -> Option<PathBuf> {
    let prefix = format!("{}-", key.as_ref());
    sorted_entries(fs, base?, &prefix)
        .into_iter()
        .find(|entry| entry.is_dir && has_prefix(entry, &prefix))
        .map(|entry| entry.path)
}

/// Find first file in `base` named `"{key}-*.{ext}"`.
///
/// The match is only returned if the filesystem confirms it exists.
pub fn find_file(
    fs: &impl FileSystem,
    base: Option<&Path>,
    key: impl AsRef<str>,
    ext: impl AsRef<str>,
) -> Option<PathBuf> {
    let prefix = format!("{}-", key.as_ref());
    let suffix = format!(".{}", ext.as_ref());
    sorted_entries(fs, base?, &prefix)
        .into_iter()
        .filter(|entry| !entry.is_dir && has_prefix(entry, &prefix))
        .filter(|entry| entry.name.to_string_lossy().ends_with(&suffix))
        .find(|entry| fs.exists(&entry.path))
        .map(|entry| entry.path)
}

fn sorted_entries(fs: &impl FileSystem, base: &Path, prefix: &str) -> Vec<DirEntry> {
    match fs.read_dir(base) {
        Ok(mut entries) => {
            entries.sort_by(|lhs, rhs| lhs.name.cmp(&rhs.name));
            entries
        }
        Err(error) => {
            warn!(
                "nothing found with key prefix {prefix:?} at {:?}: {error}",
                base.display()
            );
            Vec::new()
        }
    }
}

fn has_prefix(entry: &DirEntry, prefix: &str) -> bool {
    let matched = entry.name.to_string_lossy().starts_with(prefix);
    if matched {
        debug!("prefix {prefix:?} matched {:?}", entry.path.display());
    }

    matched
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::HostFs;
    use pretty_assertions::assert_eq;
    use std::fs::{create_dir, write};

    #[test]
    fn find_directory_picks_first_in_lexicographic_order() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        create_dir(root.path().join("001000-zeta"))?;
        create_dir(root.path().join("001000-alpha"))?;
        create_dir(root.path().join("0010000-other"))?;
        write(root.path().join("001000-file"), "")?;

        let result = find_directory(&HostFs, Some(root.path()), "001000");
        assert_eq!(result, Some(root.path().join("001000-alpha")));

        Ok(())
    }

    #[test]
    fn find_directory_skips_files() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        write(root.path().join("01310-webshop"), "")?;

        let result = find_directory(&HostFs, Some(root.path()), "01310");
        assert_eq!(result, None);

        Ok(())
    }

    #[test]
    fn find_file_matches_prefix_and_extension() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        create_dir(root.path().join("0310-dir.env"))?;
        write(root.path().join("0310-docker-compose.yml"), "")?;
        write(root.path().join("0310-dev.env"), "")?;
        write(root.path().join("0310-devenv"), "")?;
        write(root.path().join("03100-dev.env"), "")?;

        let result = find_file(&HostFs, Some(root.path()), "0310", "env");
        assert_eq!(result, Some(root.path().join("0310-dev.env")));

        let result = find_file(&HostFs, Some(root.path()), "0310", "yml");
        assert_eq!(result, Some(root.path().join("0310-docker-compose.yml")));

        let result = find_file(&HostFs, Some(root.path()), "0311", "env");
        assert_eq!(result, None);

        Ok(())
    }

    #[test]
    fn lookups_in_missing_base_find_nothing() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let missing = root.path().join("missing");

        assert_eq!(find_directory(&HostFs, Some(missing.as_path()), "01310"), None);
        assert_eq!(find_file(&HostFs, Some(missing.as_path()), "0310", "env"), None);
        assert_eq!(find_directory(&HostFs, None, "01310"), None);
        assert_eq!(find_file(&HostFs, None, "0310", "env"), None);

        Ok(())
    }
}
