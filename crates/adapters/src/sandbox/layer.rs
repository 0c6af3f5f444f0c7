// SPDX-License-Identifier: MIT

//! Sandbox permission layers and the merge lattice.
//!
//! Layers are YAML documents declaring path access classes, a network
//! policy, an environment whitelist, and passthrough flags. Merging is
//! most-permissive-wins per path: `none < ro < rox < rw < rwx`.

use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};

/// Filesystem access class. Variant order is the permissiveness order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Access {
    Ro,
    Rox,
    Rw,
    Rwx,
}

impl Access {
    /// Launcher flag for this class.
    pub fn flag(&self) -> &'static str {
        match self {
            Access::Ro => "--ro",
            Access::Rox => "--rox",
            Access::Rw => "--rw",
            Access::Rwx => "--rwx",
        }
    }
}

/// Network policy mode for one layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkMode {
    #[default]
    Disabled,
    Restricted,
    Unrestricted,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NetworkPolicy {
    #[serde(default)]
    pub mode: NetworkMode,
    #[serde(default)]
    pub ports: Vec<u16>,
}

/// Launcher failure policy, declared by the system layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SandboxMode {
    /// Session creation fails when the launcher is absent
    Strict,
    /// Run unwrapped with a warning when the launcher is absent
    #[default]
    BestEffort,
}

/// One YAML permission layer (system, backend, role, or task).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Layer {
    /// Only honored on the system layer
    #[serde(default)]
    pub mode: Option<SandboxMode>,
    #[serde(default)]
    pub ro: Vec<String>,
    #[serde(default)]
    pub rox: Vec<String>,
    #[serde(default)]
    pub rw: Vec<String>,
    #[serde(default)]
    pub rwx: Vec<String>,
    #[serde(default)]
    pub network: NetworkPolicy,
    #[serde(default)]
    pub env: Vec<String>,
    /// Extra launcher flags passed through verbatim
    #[serde(default)]
    pub flags: Vec<String>,
}

impl Layer {
    /// Iterate `(template, access)` pairs in this layer.
    pub fn path_entries(&self) -> impl Iterator<Item = (&str, Access)> {
        let classes = [
            (&self.ro, Access::Ro),
            (&self.rox, Access::Rox),
            (&self.rw, Access::Rw),
            (&self.rwx, Access::Rwx),
        ];
        classes
            .into_iter()
            .flat_map(|(paths, access)| paths.iter().map(move |p| (p.as_str(), access)))
    }
}

/// Fully merged sandbox permissions for one session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SandboxSpec {
    /// Expanded path -> winning access class. BTreeMap ordering puts every
    /// parent before its children, which the launcher requires.
    pub paths: BTreeMap<String, Access>,
    pub network: NetworkMode,
    pub ports: BTreeSet<u16>,
    pub env: BTreeSet<String>,
    pub flags: Vec<String>,
    pub mode: SandboxMode,
}

impl SandboxSpec {
    /// Fold one layer's (already expanded) entries into the spec.
    pub fn absorb_path(&mut self, path: String, access: Access) {
        self.paths
            .entry(path)
            .and_modify(|existing| *existing = (*existing).max(access))
            .or_insert(access);
    }

    /// Merge a layer's network policy: unrestricted dominates, restricted
    /// unions ports, disabled contributes nothing.
    pub fn absorb_network(&mut self, policy: &NetworkPolicy) {
        match policy.mode {
            NetworkMode::Unrestricted => self.network = NetworkMode::Unrestricted,
            NetworkMode::Restricted => {
                if self.network != NetworkMode::Unrestricted {
                    self.network = NetworkMode::Restricted;
                }
                self.ports.extend(policy.ports.iter().copied());
            }
            NetworkMode::Disabled => {}
        }
    }
}

#[cfg(test)]
#[path = "layer_tests.rs"]
mod tests;
