// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Service tree resolution.
//!
//! Services on the host live in a four level directory hierarchy rooted at
//! the __server__ directory:
//!
//! ```text
//! <server>/
//! |-- 000000-SRV.env
//! `-- 0{org_id}-<name>/
//!     |-- {org_id}-<name>.env
//!     `-- 0{app_id}-<name>/
//!         |-- {app_id}-<name>.env
//!         `-- {service_id}-<name>/
//!             |-- {dev_version}-<name>.env
//!             |-- {prod_version}-<name>.env
//!             |-- {dev_version}-docker-compose.yml
//!             `-- {prod_version}-docker-compose.yml
//! ```
//!
//! All level codes come from a [`ServiceKey`]. Resolution walks the levels
//! top-down, and each level is searched inside the directory found by its
//! parent. A level that cannot be found does not stop resolution. Its
//! children simply come up empty too, and the caller decides what to do
//! with the holes afterwards.
//!
//! # See Also
//!
//! - [`locate`] for the prefix matching rules.

pub mod locate;

use crate::{
    fs::FileSystem,
    key::{KeyError, ServiceKey},
    tree::locate::{find_directory, find_file},
};

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
};
use tracing::{debug, instrument};

/// Fixed name of the server level environment file.
pub const SERVER_ENV_FILE: &str = "000000-SRV.env";

/// Top level of the service tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerLevel {
    /// Directory resolution started from.
    pub dir: PathBuf,

    /// Server environment file. Never searched for, so it may not exist.
    pub env_file: PathBuf,
}

impl ServerLevel {
    /// Construct server level rooted at target directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let env_file = dir.join(SERVER_ENV_FILE);
        Self { dir, env_file }
    }
}

/// Organization or application level of the service tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Level {
    /// Level code derived from service key.
    pub id: String,

    /// Directory of level, if found.
    pub dir: Option<PathBuf>,

    /// Environment file of level, if found.
    pub env_file: Option<PathBuf>,
}

impl Level {
    /// Resolve a level whose directory carries an extra leading zero, which
    /// is the case for organizations and applications.
    fn resolve(fs: &impl FileSystem, parent: Option<&Path>, id: String) -> Self {
        let dir = find_directory(fs, parent, format!("0{id}"));
        let env_file = find_file(fs, dir.as_deref(), &id, "env");
        Self { id, dir, env_file }
    }
}

/// Service level of the service tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceLevel {
    /// Level code derived from service key.
    pub id: String,

    /// Version code of development files.
    pub dev_version: String,

    /// Version code of production files.
    pub prod_version: String,

    /// Directory of service, if found.
    pub dir: Option<PathBuf>,

    /// Development environment file, if found.
    pub env_file_dev: Option<PathBuf>,

    /// Production environment file, if found.
    pub env_file_prod: Option<PathBuf>,

    /// Development compose file, if found.
    pub yml_dev: Option<PathBuf>,

    /// Production compose file, if found.
    pub yml_prod: Option<PathBuf>,
}

impl ServiceLevel {
    fn resolve(fs: &impl FileSystem, parent: Option<&Path>, key: &ServiceKey) -> Self {
        let id = key.service_id();
        let dev_version = key.dev_version();
        let prod_version = key.prod_version();
        let dir = find_directory(fs, parent, &id);
        let base = dir.as_deref();

        Self {
            env_file_dev: find_file(fs, base, &dev_version, "env"),
            env_file_prod: find_file(fs, base, &prod_version, "env"),
            yml_dev: find_file(fs, base, &dev_version, "yml"),
            yml_prod: find_file(fs, base, &prod_version, "yml"),
            id,
            dev_version,
            prod_version,
            dir,
        }
    }
}

/// Fully resolved service tree.
///
/// Built fresh for each invocation, and never modified once resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceTree {
    pub key: ServiceKey,
    pub server: ServerLevel,
    pub organization: Level,
    pub application: Level,
    pub service: ServiceLevel,
}

impl ServiceTree {
    /// Resolve service tree of textual service key from target root.
    ///
    /// # Errors
    ///
    /// - Return [`KeyError::InvalidFormat`] if the service key is malformed.
    ///   The filesystem is not touched in that case.
    pub fn resolve_str(
        fs: &impl FileSystem,
        root: impl Into<PathBuf>,
        key: impl AsRef<str>,
    ) -> Result<Self, KeyError> {
        let key = key.as_ref().parse()?;
        Ok(Self::resolve(fs, root, key))
    }

    /// Resolve service tree of service key from target root.
    ///
    /// Each level is resolved inside the directory of its parent level.
    /// Missing directories or files never abort resolution, they are left
    /// empty instead.
    #[instrument(skip(fs, root), level = "debug")]
    pub fn resolve(fs: &impl FileSystem, root: impl Into<PathBuf>, key: ServiceKey) -> Self {
        let server = ServerLevel::new(root);
        debug!("resolve service tree from {:?}", server.dir.display());
        let organization = Level::resolve(fs, Some(server.dir.as_path()), key.org_id());
        let application = Level::resolve(fs, organization.dir.as_deref(), key.app_id());
        let service = ServiceLevel::resolve(fs, application.dir.as_deref(), &key);

        Self {
            key,
            server,
            organization,
            application,
            service,
        }
    }

    /// Candidate environment files in order of precedence, lowest first.
    pub fn env_files(&self) -> [Option<&Path>; 5] {
        [
            Some(self.server.env_file.as_path()),
            self.organization.env_file.as_deref(),
            self.application.env_file.as_deref(),
            self.service.env_file_dev.as_deref(),
            self.service.env_file_prod.as_deref(),
        ]
    }
}

impl Display for ServiceTree {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        writeln!(fmt, "=== service {} ===", self.key)?;

        writeln!(fmt, "\n[server]")?;
        writeln!(fmt, "directory: {}", self.server.dir.display())?;
        writeln!(fmt, "env file: {}", self.server.env_file.display())?;

        for (title, level) in [
            ("organization", &self.organization),
            ("application", &self.application),
        ] {
            writeln!(fmt, "\n[{title}]")?;
            writeln!(fmt, "id: {}", level.id)?;
            writeln!(fmt, "directory: {}", Found(&level.dir))?;
            writeln!(fmt, "env file: {}", Found(&level.env_file))?;
        }

        let service = &self.service;
        writeln!(fmt, "\n[service]")?;
        writeln!(fmt, "id: {}", service.id)?;
        writeln!(fmt, "dev version: {}", service.dev_version)?;
        writeln!(fmt, "prod version: {}", service.prod_version)?;
        writeln!(fmt, "directory: {}", Found(&service.dir))?;
        writeln!(fmt, "env file (dev): {}", Found(&service.env_file_dev))?;
        writeln!(fmt, "env file (prod): {}", Found(&service.env_file_prod))?;
        writeln!(fmt, "yml file (dev): {}", Found(&service.yml_dev))?;
        write!(fmt, "yml file (prod): {}", Found(&service.yml_prod))
    }
}

struct Found<'a>(&'a Option<PathBuf>);

impl Display for Found<'_> {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self.0 {
            Some(path) => write!(fmt, "{}", path.display()),
            None => fmt.write_str("not found"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{DirEntry, HostFs};
    use pretty_assertions::assert_eq;
    use std::{
        cell::Cell,
        fs::{create_dir_all, write},
        io,
    };

    #[derive(Default)]
    struct CountingFs {
        calls: Cell<usize>,
    }

    impl FileSystem for CountingFs {
        fn read_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
            self.calls.set(self.calls.get() + 1);
            HostFs.read_dir(path)
        }

        fn exists(&self, path: &Path) -> bool {
            self.calls.set(self.calls.get() + 1);
            HostFs.exists(path)
        }

        fn read_to_string(&self, path: &Path) -> io::Result<String> {
            self.calls.set(self.calls.get() + 1);
            HostFs.read_to_string(path)
        }
    }

    #[test]
    fn resolve_full_tree() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let org = root.path().join("0000000-acme");
        let app = org.join("001000-shop");
        let svc = app.join("01310-web");
        create_dir_all(&svc)?;
        write(org.join("000000-acme.env"), "")?;
        write(app.join("01000-shop.env"), "")?;
        write(svc.join("0310-web.env"), "")?;
        write(svc.join("0310-docker-compose.yml"), "")?;

        let result = ServiceTree::resolve_str(&HostFs, root.path(), "01310")?;
        let expect = ServiceTree {
            key: "01310".parse()?,
            server: ServerLevel {
                dir: root.path().into(),
                env_file: root.path().join("000000-SRV.env"),
            },
            organization: Level {
                id: "000000".into(),
                dir: Some(org.clone()),
                env_file: Some(org.join("000000-acme.env")),
            },
            application: Level {
                id: "01000".into(),
                dir: Some(app.clone()),
                env_file: Some(app.join("01000-shop.env")),
            },
            service: ServiceLevel {
                id: "01310".into(),
                dev_version: "0310".into(),
                prod_version: "0310".into(),
                dir: Some(svc.clone()),
                env_file_dev: Some(svc.join("0310-web.env")),
                env_file_prod: Some(svc.join("0310-web.env")),
                yml_dev: Some(svc.join("0310-docker-compose.yml")),
                yml_prod: Some(svc.join("0310-docker-compose.yml")),
            },
        };
        assert_eq!(result, expect);

        Ok(())
    }

    #[test]
    fn resolve_degrades_below_missing_level() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        create_dir_all(root.path().join("0010000-acme"))?;
        write(root.path().join("0010000-acme").join("010000-acme.env"), "")?;

        let result = ServiceTree::resolve_str(&HostFs, root.path(), "12345")?;
        assert_eq!(result.organization.dir, Some(root.path().join("0010000-acme")));
        assert!(result.organization.env_file.is_some());
        assert_eq!(result.application.dir, None);
        assert_eq!(result.application.env_file, None);
        assert_eq!(result.service.dir, None);
        assert_eq!(result.service.yml_dev, None);
        assert_eq!(result.service.dev_version, "0345");
        assert_eq!(result.service.prod_version, "0340");

        let env_files = result.env_files();
        assert_eq!(env_files[0], Some(root.path().join("000000-SRV.env").as_path()));
        assert!(env_files[1].is_some());
        assert!(env_files[2..].iter().all(Option::is_none));

        Ok(())
    }

    #[test]
    fn resolve_rejects_bad_key_before_io() {
        let fs = CountingFs::default();
        for key in ["", "0131", "013100"] {
            let result = ServiceTree::resolve_str(&fs, "/nowhere", key);
            assert!(matches!(result, Err(KeyError::InvalidFormat { .. })));
        }
        assert_eq!(fs.calls.get(), 0);
    }

    #[test]
    fn report_marks_missing_fields() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let tree = ServiceTree::resolve_str(&HostFs, root.path(), "01310")?;
        let report = tree.to_string();

        assert!(report.starts_with("=== service 01310 ==="));
        assert!(report.contains(&format!("directory: {}", root.path().display())));
        assert!(report.contains("[organization]\nid: 000000\ndirectory: not found"));
        assert!(report.ends_with("yml file (prod): not found"));

        Ok(())
    }
}
