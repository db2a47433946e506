//! External command execution
//!
//! Stage actions and hooks shell out through a [`ProcessRunner`] so tests
//! can replace the system shell.

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Command;

use crate::{Error, Result};

/// Captured result of one command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// `-1` when the process was terminated by a signal
    pub exit_code: i32,
    /// stdout followed by stderr
    pub output: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs shell command lines
pub trait ProcessRunner: Send + Sync {
    fn run(&self, command: &str, cwd: &Path, env: &BTreeMap<String, String>) -> Result<ProcessOutput>;

    /// Run `command`, failing with [`Error::Process`] on a non-zero exit.
    fn run_checked(
        &self,
        command: &str,
        cwd: &Path,
        env: &BTreeMap<String, String>,
    ) -> Result<String> {
        let result = self.run(command, cwd, env)?;
        if result.success() {
            Ok(result.output)
        } else {
            Err(Error::Process {
                command: command.to_string(),
                code: result.exit_code,
                output: result.output,
            })
        }
    }
}

/// Runs commands through the platform shell
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl SystemRunner {
    fn shell(command: &str) -> Command {
        if cfg!(windows) {
            let mut cmd = Command::new("cmd");
            cmd.args(["/C", command]);
            cmd
        } else {
            let mut cmd = Command::new("sh");
            cmd.args(["-c", command]);
            cmd
        }
    }
}

impl ProcessRunner for SystemRunner {
    fn run(&self, command: &str, cwd: &Path, env: &BTreeMap<String, String>) -> Result<ProcessOutput> {
        tracing::debug!(command, cwd = %cwd.display(), "running command");
        let output = Self::shell(command)
            .current_dir(cwd)
            .envs(env)
            .output()
            .map_err(|source| Error::Spawn {
                command: command.to_string(),
                source,
            })?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(ProcessOutput {
            exit_code: output.status.code().unwrap_or(-1),
            output: text,
        })
    }
}
