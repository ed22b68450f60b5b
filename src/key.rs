// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Service key decoding.
//!
//! Every service on the host is selected by a __service key__: a fixed-width
//! identifier of five characters like `01310`. Each character occupies a
//! position that feeds one level of the service tree:
//!
//! ```text
//!   0 1 3 1 0
//!   | | | | `-- dev revision
//!   | | `-+---- service slot
//!   | `-------- application
//!   `---------- organization
//! ```
//!
//! The codes for each level are derived purely from these positions. Nothing
//! about the derivation is configurable, since the directory layout on disk
//! is named after them.

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    str::FromStr,
};

/// Width of a service key.
pub const KEY_WIDTH: usize = 5;

/// Five character service selector.
///
/// # Invariant
///
/// - Always holds exactly [`KEY_WIDTH`] characters.
/// - Character set is not validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceKey([char; KEY_WIDTH]);

impl ServiceKey {
    /// Code of the organization level, e.g., `01310` gives `000000`.
    pub fn org_id(&self) -> String {
        let [c0, ..] = self.0;
        format!("0{c0}0000")
    }

    /// Code of the application level, e.g., `01310` gives `01000`.
    pub fn app_id(&self) -> String {
        let [c0, c1, ..] = self.0;
        format!("{c0}{c1}000")
    }

    /// Code of the service level, e.g., `01310` gives `01310`.
    pub fn service_id(&self) -> String {
        let [c0, c1, c2, c3, _] = self.0;
        format!("{c0}{c1}{c2}{c3}0")
    }

    /// Version code of the development files, e.g., `12345` gives `0345`.
    pub fn dev_version(&self) -> String {
        let [_, _, c2, c3, c4] = self.0;
        format!("0{c2}{c3}{c4}")
    }

    /// Version code of the production files, e.g., `12345` gives `0340`.
    pub fn prod_version(&self) -> String {
        let [_, _, c2, c3, _] = self.0;
        format!("0{c2}{c3}0")
    }
}

impl FromStr for ServiceKey {
    type Err = KeyError;

    fn from_str(data: &str) -> Result<Self> {
        let chars: [char; KEY_WIDTH] = data
            .chars()
            .collect::<Vec<_>>()
            .try_into()
            .map_err(|_| KeyError::InvalidFormat { given: data.into() })?;

        Ok(Self(chars))
    }
}

impl Display for ServiceKey {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        for ch in self.0 {
            write!(fmt, "{ch}")?;
        }

        Ok(())
    }
}

/// Service key decoding error types.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    /// Identifier does not have exactly five characters.
    #[error("service key must be exactly {} characters (e.g. 01310), got {given:?}", KEY_WIDTH)]
    InvalidFormat { given: String },
}

/// Friendly result alias :3
type Result<T, E = KeyError> = std::result::Result<T, E>;
