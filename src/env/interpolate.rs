// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Variable reference interpolation.
//!
//! Values may refer to other variables as `${NAME}` or `$NAME`, where `NAME`
//! is made of word characters. Interpolation runs in passes. Each pass
//! rebuilds every value from its raw text, substituting each reference with
//! the first non-empty candidate of:
//!
//! 1. the value already interpolated for that name,
//! 2. the raw value of that name,
//! 3. the empty string.
//!
//! Substituted text is not rescanned within a pass, so every pass resolves
//! one more level of indirection. The number of passes is bounded, three by
//! default, which means chains of up to three references resolve fully while
//! deeper chains stay partially unresolved. Interpolation stops early once a
//! pass changes nothing.
//!
//! A reference of a variable to itself is never substituted and stays as
//! written.
//!
//! Variables that still refer to a known variable after the final pass are
//! reported as __unresolved__. This is how reference cycles and chains that
//! exceed the pass bound are surfaced.

use crate::env::EnvironmentMap;

use regex::{Captures, Regex};
use std::sync::LazyLock;
use tracing::{debug, warn};

/// Default bound on interpolation passes.
pub const DEFAULT_MAX_PASSES: usize = 3;

/// Upper limit on interpolation passes.
///
/// Mutually referencing values can grow geometrically with every pass.
pub const MAX_PASSES_LIMIT: usize = 10;

static REFERENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{(\w+)\}|\$(\w+)").expect("reference pattern is valid"));

/// Result of interpolating an environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interpolation {
    /// Interpolated variables, in insertion order.
    pub vars: EnvironmentMap,

    /// Number of passes performed.
    pub passes: usize,

    /// Variables whose value still refers to a known variable.
    pub unresolved: Vec<String>,
}

/// Bounded multi-pass reference interpolator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interpolator {
    max_passes: usize,
}

impl Default for Interpolator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PASSES)
    }
}

impl Interpolator {
    /// Construct new interpolator. A bound of zero disables interpolation.
    ///
    /// Bounds above [`MAX_PASSES_LIMIT`] are clamped to it.
    pub fn new(max_passes: usize) -> Self {
        if max_passes > MAX_PASSES_LIMIT {
            warn!("interpolation bound {max_passes} lowered to {MAX_PASSES_LIMIT} passes");
        }

        Self {
            max_passes: max_passes.min(MAX_PASSES_LIMIT),
        }
    }

    /// Interpolate all references of raw environment.
    ///
    /// Never fails. References to unknown variables become empty strings.
    pub fn interpolate(&self, raw: &EnvironmentMap) -> Interpolation {
        // INVARIANT: Seeding with raw values equals falling back to them for
        //   variables not yet visited in the first pass.
        let mut vars = raw.clone();
        let mut passes = 0;

        while passes < self.max_passes {
            let before = vars.clone();
            for (key, value) in raw.iter() {
                let next = REFERENCE
                    .replace_all(value, |caps: &Captures| match reference_name(caps) {
                        name if name == key => caps[0].to_string(),
                        name => lookup(&vars, raw, name),
                    })
                    .into_owned();
                vars.insert(key, next);
            }
            passes += 1;

            if vars == before {
                debug!("interpolation reached fixed point after {passes} passes");
                break;
            }
        }

        let unresolved = unresolved_keys(&vars, raw);
        for key in &unresolved {
            warn!(
                "variable {key} still has unresolved references after {passes} passes: {:?}",
                vars.get(key).unwrap_or_default()
            );
        }

        Interpolation {
            vars,
            passes,
            unresolved,
        }
    }
}

fn reference_name<'c>(caps: &'c Captures) -> &'c str {
    caps.get(1)
        .or_else(|| caps.get(2))
        .map_or("", |name| name.as_str())
}

fn lookup(vars: &EnvironmentMap, raw: &EnvironmentMap, name: &str) -> String {
    [vars.get(name), raw.get(name)]
        .into_iter()
        .flatten()
        .find(|value| !value.is_empty())
        .unwrap_or_default()
        .to_string()
}

fn unresolved_keys(vars: &EnvironmentMap, raw: &EnvironmentMap) -> Vec<String> {
    vars.iter()
        .filter(|(_, value)| {
            REFERENCE
                .captures_iter(value)
                .any(|caps| raw.contains_key(reference_name(&caps)))
        })
        .map(|(key, _)| key.to_string())
        .collect()
}
