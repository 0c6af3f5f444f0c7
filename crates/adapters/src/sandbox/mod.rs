// SPDX-License-Identifier: MIT

//! Sandbox composition: layered YAML permissions -> launcher argv.
//!
//! Four layers stack per session: the system baseline, the backend layer,
//! the role layer, and one layer per task tag. The merged result wraps the
//! backend command in an invocation of the external Landlock launcher.

mod layer;
mod template;

pub use layer::{Access, Layer, NetworkMode, NetworkPolicy, SandboxMode, SandboxSpec};
pub use template::{expand, TemplateCtx, TemplateError};

use crate::subprocess::shell_quote;
use anvil_core::validate_name;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("invalid layer name: {0}")]
    InvalidName(String),
    #[error("bad layer {path}: {source}")]
    Config {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("sandbox launcher {0} not found")]
    Unavailable(String),
    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Composes per-session sandbox argv from the layered YAML configuration.
#[derive(Clone)]
pub struct SandboxComposer {
    config_dir: PathBuf,
    launcher: String,
}

/// Fixed XDG-style configuration directory for sandbox layers.
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("/etc"))
        .join("anvil")
        .join("sandbox")
}

impl SandboxComposer {
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
            launcher: "landrun".to_string(),
        }
    }

    pub fn with_launcher(mut self, launcher: impl Into<String>) -> Self {
        self.launcher = launcher.into();
        self
    }

    /// Merge the system, backend, role, and task layers for one session.
    ///
    /// Missing layer files contribute nothing; an unparseable file is an
    /// error (a broken sandbox config must not silently widen access).
    pub fn compose(
        &self,
        backend: &str,
        role: Option<&str>,
        tasks: &[String],
        ctx: &TemplateCtx,
    ) -> Result<SandboxSpec, SandboxError> {
        if let Some(role) = role {
            if !validate_name(role) {
                return Err(SandboxError::InvalidName(role.to_string()));
            }
        }
        for task in tasks {
            if !validate_name(task) {
                return Err(SandboxError::InvalidName(task.clone()));
            }
        }

        let mut paths = vec![self.config_dir.join("system.yaml")];
        paths.push(self.config_dir.join("backends").join(format!("{backend}.yaml")));
        if let Some(role) = role {
            paths.push(self.config_dir.join("roles").join(format!("{role}.yaml")));
        }
        for task in tasks {
            paths.push(self.config_dir.join("tasks").join(format!("{task}.yaml")));
        }

        let mut spec = SandboxSpec::default();
        for (index, path) in paths.iter().enumerate() {
            let Some(layer) = self.load_layer(path)? else {
                continue;
            };
            // Only the system layer (index 0) may set the failure mode
            if index == 0 {
                spec.mode = layer.mode.unwrap_or_default();
            }
            for (tmpl, access) in layer.path_entries() {
                match expand(tmpl, ctx) {
                    Ok(expanded) => spec.absorb_path(expanded, access),
                    Err(e) => {
                        warn!(layer = %path.display(), template = tmpl, error = %e,
                            "skipping sandbox path with unresolved template");
                    }
                }
            }
            spec.absorb_network(&layer.network);
            spec.env.extend(layer.env.iter().cloned());
            spec.flags.extend(layer.flags.iter().cloned());
        }

        debug!(
            backend,
            role = role.unwrap_or("-"),
            paths = spec.paths.len(),
            network = ?spec.network,
            "composed sandbox spec"
        );
        Ok(spec)
    }

    /// Wrap `command` in the launcher invocation for `spec`.
    ///
    /// Returns the command unchanged (with a warning) when the launcher is
    /// absent in best-effort mode; strict mode refuses.
    pub fn wrap(&self, spec: &SandboxSpec, command: &str) -> Result<String, SandboxError> {
        if !launcher_on_path(&self.launcher) {
            return match spec.mode {
                SandboxMode::Strict => Err(SandboxError::Unavailable(self.launcher.clone())),
                SandboxMode::BestEffort => {
                    warn!(
                        launcher = %self.launcher,
                        "sandbox launcher missing, running backend unwrapped"
                    );
                    Ok(command.to_string())
                }
            };
        }

        let mut argv: Vec<String> = vec![self.launcher.clone()];
        // BTreeMap iteration is lexicographic, so parents precede children
        for (path, access) in &spec.paths {
            argv.push(access.flag().to_string());
            argv.push(shell_quote(path));
        }
        for var in &spec.env {
            argv.push("--env".to_string());
            argv.push(shell_quote(var));
        }
        match spec.network {
            NetworkMode::Unrestricted => argv.push("--unrestricted-network".to_string()),
            NetworkMode::Restricted => {
                for port in &spec.ports {
                    argv.push("--connect-tcp".to_string());
                    argv.push(port.to_string());
                }
            }
            NetworkMode::Disabled => {}
        }
        for flag in &spec.flags {
            argv.push(shell_quote(flag));
        }
        argv.push("--".to_string());
        argv.push("sh".to_string());
        argv.push("-c".to_string());
        argv.push(shell_quote(command));

        Ok(argv.join(" "))
    }

    fn load_layer(&self, path: &Path) -> Result<Option<Layer>, SandboxError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(SandboxError::Io {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };
        let layer = serde_yaml::from_str(&contents).map_err(|source| SandboxError::Config {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Some(layer))
    }
}

/// Look for an executable `name` on `PATH`.
fn launcher_on_path(name: &str) -> bool {
    if name.contains('/') {
        return Path::new(name).exists();
    }
    let Some(path_var) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&path_var).any(|dir| dir.join(name).is_file())
}

#[cfg(test)]
#[path = "composer_tests.rs"]
mod tests;
