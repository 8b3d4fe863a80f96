//! External format-conversion hook.
//!
//! The command is opaque to the pipeline: it runs inside the staging directory
//! after fetch and before hashing, and only its exit status matters.

use std::path::Path;
use std::time::Duration;

use tokio::process::Command;

use crate::error::SyncError;

/// Placeholder replaced with the staging directory in every argument.
pub const DIR_PLACEHOLDER: &str = "{dir}";

const STDERR_TAIL: usize = 400;

/// Run `command` with `{dir}` substituted, bounded by `timeout`.
///
/// The child is killed if the returned future is dropped.
pub async fn run_converter(
    command: &[String],
    dir: &Path,
    timeout: Duration,
) -> Result<(), SyncError> {
    let dir_str = dir.to_string_lossy();
    let args: Vec<String> = command
        .iter()
        .map(|arg| arg.replace(DIR_PLACEHOLDER, &dir_str))
        .collect();
    let rendered = args.join(" ");
    let Some((program, rest)) = args.split_first() else {
        return Err(SyncError::Convert {
            command: rendered,
            reason: "empty command".to_string(),
        });
    };

    tracing::info!(command = %rendered, "running conversion");
    let mut cmd = Command::new(program);
    cmd.args(rest).current_dir(dir).kill_on_drop(true);

    let output = match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            return Err(SyncError::Convert {
                command: rendered,
                reason: format!("failed to spawn: {e}"),
            })
        }
        Err(_) => {
            return Err(SyncError::Convert {
                command: rendered,
                reason: format!("timed out after {timeout:?}"),
            })
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let tail: String = stderr
            .chars()
            .rev()
            .take(STDERR_TAIL)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        return Err(SyncError::Convert {
            command: rendered,
            reason: format!("{}: {}", output.status, tail.trim()),
        });
    }
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }

    #[tokio::test]
    async fn successful_command_can_write_into_staging_dir() {
        let tmp = TempDir::new().unwrap();
        run_converter(
            &sh("printf converted > {dir}/model.json"),
            tmp.path(),
            Duration::from_secs(10),
        )
        .await
        .unwrap();
        let written = std::fs::read_to_string(tmp.path().join("model.json")).unwrap();
        assert_eq!(written, "converted");
    }

    #[tokio::test]
    async fn non_zero_exit_fails_with_stderr() {
        let tmp = TempDir::new().unwrap();
        let err = run_converter(
            &sh("echo 'unsupported op' >&2; exit 3"),
            tmp.path(),
            Duration::from_secs(10),
        )
        .await
        .unwrap_err();
        let msg = err.to_string();
        assert!(matches!(err, SyncError::Convert { .. }));
        assert!(msg.contains("unsupported op"), "got {msg}");
    }

    #[tokio::test]
    async fn missing_program_fails_to_spawn() {
        let tmp = TempDir::new().unwrap();
        let err = run_converter(
            &["definitely-not-a-real-converter-binary".to_string()],
            tmp.path(),
            Duration::from_secs(10),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("failed to spawn"), "got {err}");
    }

    #[tokio::test]
    async fn empty_command_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let err = run_converter(&[], tmp.path(), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("empty command"));
    }
}
