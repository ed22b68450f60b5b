// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Environment composition.
//!
//! Every level of the service tree may contribute an environment file. These
//! files are layered on top of each other in a fixed order of precedence:
//!
//! 1. server,
//! 2. organization,
//! 3. application,
//! 4. service (dev),
//! 5. service (prod).
//!
//! Later files override same-named variables of earlier files. Once merged,
//! variable references like `${DOMAIN}` or `$DOMAIN` are interpolated so
//! that a service file can build on values defined by any other level.
//!
//! # See Also
//!
//! - [`dotenv`] for the accepted file format.
//! - [`interpolate`] for reference resolution rules.

pub mod dotenv;
pub mod interpolate;

use crate::{
    compose::options::CommandOptions,
    env::interpolate::{Interpolation, Interpolator},
    fs::FileSystem,
    tree::ServiceTree,
};

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument};

/// Insertion ordered mapping of variable names to values.
///
/// # Invariant
///
/// - Overwriting a variable keeps its position.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EnvironmentMap {
    entries: Vec<(String, String)>,
    index: HashMap<String, usize>,
}

impl EnvironmentMap {
    /// Construct new empty environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set variable, returning its previous value if any.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let key = key.into();
        let value = value.into();
        match self.index.get(&key) {
            Some(&at) => Some(std::mem::replace(&mut self.entries[at].1, value)),
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, value));
                None
            }
        }
    }

    /// Get value of variable.
    pub fn get(&self, key: impl AsRef<str>) -> Option<&str> {
        self.index
            .get(key.as_ref())
            .map(|&at| self.entries[at].1.as_str())
    }

    /// Check if variable is defined.
    pub fn contains_key(&self, key: impl AsRef<str>) -> bool {
        self.index.contains_key(key.as_ref())
    }

    /// Iterate variables in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for EnvironmentMap
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut env = Self::new();
        env.extend(iter);
        env
    }
}

impl<K, V> Extend<(K, V)> for EnvironmentMap
where
    K: Into<String>,
    V: Into<String>,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.insert(key, value);
        }
    }
}

/// Merged and interpolated environment of a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedEnvironment {
    /// Environment files that were loaded, in load order.
    pub sources: Vec<PathBuf>,

    /// Candidate environment files that do not exist.
    pub missing: Vec<PathBuf>,

    /// Interpolated variables.
    pub vars: EnvironmentMap,

    /// Variables still holding references after interpolation.
    pub unresolved: Vec<String>,
}

/// Load and compose environment files.
#[derive(Debug, Default, Clone)]
pub struct EnvLoader {
    interpolator: Interpolator,
}

impl EnvLoader {
    /// Construct new loader with target interpolation pass bound.
    pub fn new(max_passes: usize) -> Self {
        Self {
            interpolator: Interpolator::new(max_passes),
        }
    }

    /// Merge and interpolate candidate environment files.
    ///
    /// Candidates are given lowest precedence first. Absent candidates, or
    /// candidates that do not exist, are skipped.
    ///
    /// # Errors
    ///
    /// - Return [`EnvError::Read`] if an existing file cannot be read.
    /// - Return [`EnvError::NoEnvironmentLoaded`] if no file contributed any
    ///   variable.
    #[instrument(skip_all, level = "debug")]
    pub fn load<'a>(
        &self,
        fs: &impl FileSystem,
        candidates: impl IntoIterator<Item = Option<&'a Path>>,
    ) -> Result<LoadedEnvironment> {
        let mut sources = Vec::new();
        let mut missing = Vec::new();
        let mut merged = EnvironmentMap::new();

        for path in candidates.into_iter().flatten() {
            if !fs.exists(path) {
                info!("env file {:?} not found or optional", path.display());
                missing.push(path.to_path_buf());
                continue;
            }

            let content = fs.read_to_string(path).map_err(|err| EnvError::Read {
                source: err,
                path: path.to_path_buf(),
            })?;
            let vars = dotenv::parse(&content);
            debug!("loaded {} variables from {:?}", vars.len(), path.display());
            merged.extend(vars);
            sources.push(path.to_path_buf());
        }

        if merged.is_empty() {
            return Err(EnvError::NoEnvironmentLoaded);
        }

        let Interpolation {
            vars, unresolved, ..
        } = self.interpolator.interpolate(&merged);

        Ok(LoadedEnvironment {
            sources,
            missing,
            vars,
            unresolved,
        })
    }
}

/// Render diagnostic report of an upcoming launch.
///
/// The report holds the resolved tree, the loaded environment files, and
/// every composed variable as `KEY=value`. Detached launches get no report.
pub fn launch_report(
    tree: &ServiceTree,
    env: &LoadedEnvironment,
    options: &CommandOptions,
) -> Option<String> {
    if options.detached {
        return None;
    }

    let mut report = tree.to_string();
    report.push_str("\n\n[environment]");
    for source in &env.sources {
        report.push_str(&format!("\nloaded: {}", source.display()));
    }
    for (key, value) in env.vars.iter() {
        report.push_str(&format!("\n{key}={value}"));
    }

    Some(report)
}

/// Environment loading error types.
#[derive(Debug, thiserror::Error)]
pub enum EnvError {
    /// Not a single environment variable could be loaded.
    #[error("no environment variable was loaded")]
    NoEnvironmentLoaded,

    /// Environment file exists but cannot be read.
    #[error("failed to read env file at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = EnvError> = std::result::Result<T, E>;
