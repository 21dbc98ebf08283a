//! `tokio::process`-backed [`CommandExecutor`].

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use super::{CommandExecutor, Environment, ExecError};

/// Runs commands through `sh -c` with a hard timeout.
///
/// The child is killed when the timeout fires (`kill_on_drop`).
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    timeout: Duration,
    shell: String,
}

impl ProcessExecutor {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            shell: "sh".to_string(),
        }
    }

    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }
}

#[async_trait]
impl CommandExecutor for ProcessExecutor {
    async fn execute(
        &self,
        command: &str,
        working_dir: Option<&Path>,
        env: &Environment,
    ) -> Result<String, ExecError> {
        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c")
            .arg(command)
            .envs(env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = working_dir {
            if !dir.is_dir() {
                return Err(ExecError::WorkingDirectoryMismatch {
                    expected: Some(dir.display().to_string()),
                    actual: None,
                });
            }
            cmd.current_dir(dir);
        }

        tracing::debug!(command, "executing command");
        let child = cmd.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ExecError::NotFound(self.shell.clone()),
            _ => ExecError::Failed {
                exit_code: None,
                stderr: e.to_string(),
            },
        })?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| ExecError::Failed {
                exit_code: None,
                stderr: e.to_string(),
            })?,
            Err(_) => return Err(ExecError::Timeout),
        };

        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        // `sh` reports an unknown program with exit code 127.
        if output.status.code() == Some(127) {
            return Err(ExecError::NotFound(command.to_string()));
        }
        Err(ExecError::Failed {
            exit_code: output.status.code(),
            stderr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn executor() -> ProcessExecutor {
        ProcessExecutor::new(Duration::from_secs(5))
    }

    #[tokio::test]
    async fn captures_stdout() {
        let out = executor()
            .execute("echo hello", None, &Environment::new())
            .await
            .unwrap();
        assert_eq!(out.trim(), "hello");
    }

    #[tokio::test]
    async fn passes_environment() {
        let mut env = Environment::new();
        env.insert("CHX_EXEC_GREETING".into(), "hi there".into());
        let out = executor()
            .execute("printf '%s' \"$CHX_EXEC_GREETING\"", None, &env)
            .await
            .unwrap();
        assert_eq!(out, "hi there");
    }

    #[tokio::test]
    async fn runs_in_working_directory() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::write(tmp.path().join("marker.txt"), "present").unwrap();
        let out = executor()
            .execute("cat marker.txt", Some(tmp.path()), &Environment::new())
            .await
            .unwrap();
        assert_eq!(out, "present");
    }

    #[tokio::test]
    async fn nonzero_exit_is_failed() {
        let err = executor()
            .execute("echo oops >&2; exit 3", None, &Environment::new())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ExecError::Failed {
                exit_code: Some(3),
                stderr: "oops".into()
            }
        );
    }

    #[tokio::test]
    async fn unknown_program_is_not_found() {
        let err = executor()
            .execute("chx-definitely-not-a-command-xyz", None, &Environment::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::NotFound(_)));
    }

    #[tokio::test]
    async fn slow_command_times_out() {
        let err = ProcessExecutor::new(Duration::from_millis(100))
            .execute("sleep 5", None, &Environment::new())
            .await
            .unwrap_err();
        assert_eq!(err, ExecError::Timeout);
    }

    #[tokio::test]
    async fn missing_working_directory_is_rejected() {
        let err = executor()
            .execute(
                "true",
                Some(Path::new("/definitely/not/here")),
                &Environment::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::WorkingDirectoryMismatch { .. }));
    }

    #[tokio::test]
    async fn missing_shell_is_not_found() {
        let err = executor()
            .with_shell("/no/such/shell")
            .execute("true", None, &Environment::new())
            .await
            .unwrap_err();
        assert_eq!(err, ExecError::NotFound("/no/such/shell".into()));
    }
}
