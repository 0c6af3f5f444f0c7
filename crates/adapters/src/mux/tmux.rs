// SPDX-License-Identifier: MIT

//! Tmux window adapter

use super::{Mux, MuxError, WindowTarget};
use crate::subprocess::{run_with_timeout, shell_quote, TMUX_TIMEOUT};
use async_trait::async_trait;
use std::path::Path;
use std::process::Output;
use tokio::process::Command;

/// Tmux-based multiplexer adapter.
#[derive(Clone, Default)]
pub struct TmuxMux;

impl TmuxMux {
    pub fn new() -> Self {
        Self
    }

    async fn run(&self, args: &[&str], description: &str) -> Result<Output, MuxError> {
        let mut cmd = Command::new("tmux");
        cmd.args(args);
        run_with_timeout(cmd, TMUX_TIMEOUT, description)
            .await
            .map_err(MuxError::Unreachable)
    }

    /// Classify a non-success tmux exit by its stderr.
    fn failure(target: &WindowTarget, output: &Output) -> MuxError {
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("can't find") || stderr.contains("no such") {
            MuxError::NoSuchTarget(target.to_string())
        } else {
            MuxError::CommandFailed(stderr.trim().to_string())
        }
    }
}

#[async_trait]
impl Mux for TmuxMux {
    async fn ensure_session(&self, name: &str) -> Result<(), MuxError> {
        let probe = self
            .run(&["has-session", "-t", &format!("={name}")], "tmux has-session")
            .await?;
        if probe.status.success() {
            return Ok(());
        }

        // Detached session with a placeholder window; agent windows are
        // created individually and the placeholder is never used.
        let output = self
            .run(
                &["new-session", "-d", "-s", name, "-n", "anvil"],
                "tmux new-session",
            )
            .await?;
        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            // Lost the race against a concurrent create
            if stderr.contains("duplicate session") {
                Ok(())
            } else {
                Err(MuxError::CommandFailed(stderr.trim().to_string()))
            }
        }
    }

    async fn new_window(
        &self,
        target: &WindowTarget,
        cwd: &Path,
        env: &[(String, String)],
        command: &str,
    ) -> Result<u32, MuxError> {
        if !cwd.exists() {
            return Err(MuxError::CommandFailed(format!(
                "working directory does not exist: {}",
                cwd.display()
            )));
        }

        let cwd_str = cwd.display().to_string();
        let mut args: Vec<String> = vec![
            "new-window".into(),
            "-d".into(),
            "-P".into(),
            "-F".into(),
            "#{pane_pid}".into(),
            "-t".into(),
            format!("{}:", target.session),
            "-n".into(),
            target.window.clone(),
            "-c".into(),
            cwd_str,
        ];
        for (key, value) in env {
            args.push("-e".into());
            args.push(format!("{key}={value}"));
        }
        // Run under a shell so the pane survives as `sh` with the backend
        // as its child - the process-tree inspector depends on that shape.
        args.push(format!("sh -c {}", shell_quote(command)));

        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = self.run(&arg_refs, "tmux new-window").await?;
        if !output.status.success() {
            return Err(Self::failure(target, &output));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        stdout
            .trim()
            .parse()
            .map_err(|_| MuxError::CommandFailed(format!("unparseable pane pid: {stdout:?}")))
    }

    async fn kill_window(&self, target: &WindowTarget) -> Result<(), MuxError> {
        let output = self
            .run(
                &["kill-window", "-t", &target.to_string()],
                "tmux kill-window",
            )
            .await?;
        // Window already gone is success for kill
        if output.status.success() || matches!(Self::failure(target, &output), MuxError::NoSuchTarget(_))
        {
            Ok(())
        } else {
            Err(Self::failure(target, &output))
        }
    }

    async fn window_exists(&self, target: &WindowTarget) -> Result<bool, MuxError> {
        let output = self
            .run(
                &[
                    "list-windows",
                    "-t",
                    &format!("{}:", target.session),
                    "-F",
                    "#{window_name}",
                ],
                "tmux list-windows",
            )
            .await?;
        if !output.status.success() {
            return Ok(false); // session gone means window gone
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout.lines().any(|name| name == target.window))
    }

    async fn send_literal(&self, target: &WindowTarget, text: &str) -> Result<(), MuxError> {
        // -l = literal mode (no key name interpretation)
        // -- = end of options (handles text starting with -)
        let output = self
            .run(
                &["send-keys", "-t", &target.to_string(), "-l", "--", text],
                "tmux send-keys -l",
            )
            .await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(Self::failure(target, &output))
        }
    }

    async fn send_keys(&self, target: &WindowTarget, keys: &[&str]) -> Result<(), MuxError> {
        let target_str = target.to_string();
        let mut args = vec!["send-keys", "-t", &target_str];
        args.extend_from_slice(keys);
        let output = self.run(&args, "tmux send-keys").await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(Self::failure(target, &output))
        }
    }

    async fn pipe_pane(&self, target: &WindowTarget, fifo: &Path) -> Result<(), MuxError> {
        let sink = format!("cat >> {}", shell_quote(&fifo.display().to_string()));
        let output = self
            .run(
                &["pipe-pane", "-t", &target.to_string(), &sink],
                "tmux pipe-pane",
            )
            .await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(Self::failure(target, &output))
        }
    }

    async fn close_pipe_pane(&self, target: &WindowTarget) -> Result<(), MuxError> {
        // pipe-pane with no command closes the existing pipe
        let output = self
            .run(
                &["pipe-pane", "-t", &target.to_string()],
                "tmux pipe-pane (close)",
            )
            .await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(Self::failure(target, &output))
        }
    }

    async fn pane_pid(&self, target: &WindowTarget) -> Result<u32, MuxError> {
        let output = self
            .run(
                &[
                    "display-message",
                    "-p",
                    "-t",
                    &target.to_string(),
                    "#{pane_pid}",
                ],
                "tmux display-message",
            )
            .await?;
        if !output.status.success() {
            return Err(Self::failure(target, &output));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        stdout
            .trim()
            .parse()
            .map_err(|_| MuxError::CommandFailed(format!("unparseable pane pid: {stdout:?}")))
    }
}

#[cfg(test)]
#[path = "tmux_tests.rs"]
mod tests;
