// SPDX-License-Identifier: MIT

//! Backend registry: name -> launch command and behavior knobs.
//!
//! Loaded from `<config-dir>/anvil/backends.toml`. A built-in `fake`
//! backend (plain `cat`) always exists so the daemon can be exercised
//! without any real agent installed.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use crate::startup::StartupHandlerKind;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("bad registry {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// One backend's launch configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendSpec {
    /// Command line the window runs (pre-sandbox)
    pub command: String,
    /// Process name the tree inspector looks for; default is the
    /// basename of the command's first word
    #[serde(default)]
    pub process_name: Option<String>,
    #[serde(default)]
    pub startup_handler: StartupHandlerKind,
    /// Slash commands the backend accepts; `*` accepts everything
    #[serde(default)]
    pub slash_commands: Vec<String>,
    /// Default prompt-prefix for new sessions
    #[serde(default)]
    pub context: String,
}

impl BackendSpec {
    /// Basename of the binary, for the process-tree inspector.
    pub fn process_name(&self) -> String {
        if let Some(name) = &self.process_name {
            return name.clone();
        }
        self.command
            .split_whitespace()
            .next()
            .and_then(|first| first.rsplit('/').next())
            .unwrap_or("sh")
            .to_string()
    }

    /// Whether a `/command` prompt is accepted by this backend.
    pub fn supports_slash(&self, prompt: &str) -> bool {
        let word = prompt.split_whitespace().next().unwrap_or(prompt);
        self.slash_commands
            .iter()
            .any(|c| c == "*" || c == word)
    }
}

#[derive(Debug, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    backends: HashMap<String, BackendSpec>,
}

/// All known backends.
#[derive(Debug, Clone, Default)]
pub struct BackendRegistry {
    backends: HashMap<String, BackendSpec>,
}

/// Fixed registry path under the user config dir.
pub fn default_registry_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("/etc"))
        .join("anvil")
        .join("backends.toml")
}

impl BackendRegistry {
    /// Registry with only the built-in `fake` backend.
    pub fn builtin() -> Self {
        let mut backends = HashMap::new();
        backends.insert(
            "fake".to_string(),
            BackendSpec {
                command: "cat".to_string(),
                process_name: None,
                startup_handler: StartupHandlerKind::None,
                slash_commands: Vec::new(),
                context: String::new(),
            },
        );
        Self { backends }
    }

    /// Load the registry file on top of the built-ins. A missing file is
    /// fine; a malformed one is an error.
    pub fn load(path: &Path) -> Result<Self, BackendError> {
        let mut registry = Self::builtin();
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no backend registry, using built-ins");
                return Ok(registry);
            }
            Err(source) => {
                return Err(BackendError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        let file: RegistryFile = toml::from_str(&contents).map_err(|source| BackendError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        registry.backends.extend(file.backends);
        info!(count = registry.backends.len(), "backend registry loaded");
        Ok(registry)
    }

    pub fn get(&self, name: &str) -> Option<&BackendSpec> {
        self.backends.get(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.backends.keys().cloned().collect()
    }
}

#[cfg(test)]
#[path = "backend_tests.rs"]
mod tests;
