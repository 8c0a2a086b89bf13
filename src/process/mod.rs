//! External command execution
//!
//! Every external tool the dump drives (`oc`, `tar`) goes through
//! [`CommandRunner`] so tests can record invocations instead of spawning.

use crate::error::{DumpError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A single command line to execute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            cwd: None,
        }
    }

    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }
}

/// Captured result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    /// Successful output with the given stdout
    pub fn ok(stdout: impl Into<Vec<u8>>) -> Self {
        Self {
            success: true,
            code: Some(0),
            stdout: stdout.into(),
            stderr: Vec::new(),
        }
    }

    /// Failed output with the given exit code and stderr
    pub fn failed(code: i32, stderr: impl Into<Vec<u8>>) -> Self {
        Self {
            success: false,
            code: Some(code),
            stdout: Vec::new(),
            stderr: stderr.into(),
        }
    }

    /// Stdout followed by stderr
    pub fn combined(&self) -> Vec<u8> {
        let mut out = self.stdout.clone();
        out.extend_from_slice(&self.stderr);
        out
    }

    pub fn combined_lossy(&self) -> String {
        String::from_utf8_lossy(&self.combined()).into_owned()
    }

    /// Short description of a non-zero exit
    pub fn status_text(&self) -> String {
        match self.code {
            Some(code) => format!("exit status {}", code),
            None => "terminated by signal".to_string(),
        }
    }
}

impl From<std::process::Output> for CommandOutput {
    fn from(output: std::process::Output) -> Self {
        Self {
            success: output.status.success(),
            code: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
        }
    }
}

/// Trait for executing external commands (allows recording in tests)
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Locate a program, returning its path when it can be executed
    fn resolve(&self, program: &str) -> Option<PathBuf>;

    /// Run to completion and capture output.
    ///
    /// A non-zero exit is returned as `Ok` with `success == false`; `Err` means
    /// the process never ran or the run was cancelled.
    async fn run(&self, invocation: &Invocation, cancel: &CancellationToken)
        -> Result<CommandOutput>;
}

/// Runner backed by `tokio::process`
#[derive(Debug, Default, Clone)]
pub struct TokioCommandRunner;

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    fn resolve(&self, program: &str) -> Option<PathBuf> {
        find_executable(program)
    }

    async fn run(
        &self,
        invocation: &Invocation,
        cancel: &CancellationToken,
    ) -> Result<CommandOutput> {
        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = &invocation.cwd {
            cmd.current_dir(dir);
        }

        debug!(program = %invocation.program.display(), args = ?invocation.args, "Executing command");

        tokio::select! {
            _ = cancel.cancelled() => Err(DumpError::Cancelled),
            output = cmd.output() => output
                .map(CommandOutput::from)
                .map_err(|e| DumpError::Spawn {
                    program: invocation.program.display().to_string(),
                    message: e.to_string(),
                }),
        }
    }
}

/// Search `PATH` for an executable, accepting explicit paths as-is
pub fn find_executable(program: &str) -> Option<PathBuf> {
    if program.is_empty() {
        return None;
    }
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|path| is_executable(path))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combined_output_order() {
        let out = CommandOutput {
            success: false,
            code: Some(1),
            stdout: b"out\n".to_vec(),
            stderr: b"err\n".to_vec(),
        };
        assert_eq!(out.combined_lossy(), "out\nerr\n");
        assert_eq!(out.status_text(), "exit status 1");
    }

    #[test]
    fn test_find_executable_missing() {
        assert!(find_executable("").is_none());
        assert!(find_executable("definitely-not-a-real-binary-hcdump").is_none());
        assert!(find_executable("/nonexistent/dir/oc").is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_find_executable_on_path() {
        assert!(find_executable("sh").is_some());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_runner_reports_exit_status() {
        let runner = TokioCommandRunner;
        let cancel = CancellationToken::new();
        let inv = Invocation::new("sh", vec!["-c".into(), "echo hi; exit 3".into()]);
        let out = runner.run(&inv, &cancel).await.unwrap();
        assert!(!out.success);
        assert_eq!(out.code, Some(3));
        assert_eq!(out.stdout, b"hi\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_runner_honours_cancellation() {
        let runner = TokioCommandRunner;
        let cancel = CancellationToken::new();
        cancel.cancel();
        let inv = Invocation::new("sleep", vec!["5".into()]);
        let result = runner.run(&inv, &cancel).await;
        assert!(matches!(result, Err(DumpError::Cancelled)));
    }
}
