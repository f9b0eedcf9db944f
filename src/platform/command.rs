//! External command execution shared by platform backends

use crate::error::{TunnelError, TunnelResult};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Run `program` with `args` and return its stdout
pub async fn run(program: &str, args: &[&str]) -> TunnelResult<String> {
    run_with_input(program, args, None).await
}

/// Run `program`, optionally feeding `input` on stdin, and return its stdout
///
/// The child is killed if the returned future is dropped, so callers can
/// bound it with `tokio::time::timeout`.
pub async fn run_with_input(program: &str, args: &[&str], input: Option<&str>) -> TunnelResult<String> {
    let cmd_str = if args.is_empty() {
        program.to_string()
    } else {
        format!("{} {}", program, args.join(" "))
    };
    debug!(command = %cmd_str, "Running platform command");

    let spawn_failed = |e: std::io::Error| TunnelError::CommandFailed {
        cmd: cmd_str.clone(),
        code: None,
        stderr: e.to_string(),
    };

    let mut child = Command::new(program)
        .args(args)
        .stdin(if input.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(spawn_failed)?;

    if let Some(input) = input {
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(input.as_bytes()).await?;
            // Dropping stdin closes the pipe so the child sees EOF
        }
    }

    let output = child.wait_with_output().await?;

    if !output.status.success() {
        let stderr = String::from_utf8(output.stderr)
            .unwrap_or_else(|e| String::from_utf8_lossy(&e.into_bytes()).to_string());
        return Err(TunnelError::CommandFailed {
            cmd: cmd_str,
            code: output.status.code(),
            stderr: stderr.trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_captures_stdout() {
        let out = run("echo", &["hello"]).await.unwrap();
        assert_eq!(out.trim(), "hello");
    }

    #[tokio::test]
    async fn test_run_with_input() {
        let out = run_with_input("cat", &[], Some("list State:/Network\n")).await.unwrap();
        assert_eq!(out, "list State:/Network\n");
    }

    #[tokio::test]
    async fn test_run_reports_exit_code() {
        match run("sh", &["-c", "echo oops >&2; exit 3"]).await {
            Err(TunnelError::CommandFailed { code, stderr, .. }) => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "oops");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_run_missing_binary() {
        let err = run("tunnelctl-no-such-binary", &[]).await.unwrap_err();
        assert!(matches!(err, TunnelError::CommandFailed { code: None, .. }));
    }

    #[tokio::test]
    async fn test_stdin_failure_is_io_error() {
        // `true` exits without reading, so a large write hits a closed pipe
        let input = "x".repeat(1 << 20);
        match run_with_input("true", &[], Some(&input)).await {
            Err(TunnelError::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::BrokenPipe),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_run_can_be_bounded() {
        let started = std::time::Instant::now();
        let result = tokio::time::timeout(
            std::time::Duration::from_millis(100),
            run("sleep", &["30"]),
        )
        .await;
        assert!(result.is_err());
        assert!(started.elapsed() < std::time::Duration::from_secs(5));
    }
}
