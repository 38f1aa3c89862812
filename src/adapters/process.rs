use crate::domain::model::{ProcessInvocation, ProcessOutcome};
use crate::domain::ports::ProcessRunner;
use crate::utils::error::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// 以 tokio 子行程執行外部程式
#[derive(Debug, Clone, Default)]
pub struct TokioProcessRunner;

impl TokioProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(&self, invocation: &ProcessInvocation) -> Result<ProcessOutcome> {
        tracing::debug!("▶️ {}", invocation.command_line());

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args);
        for (key, value) in &invocation.envs {
            cmd.env(key, value);
        }

        if invocation.quiet {
            cmd.stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null());
        } else {
            cmd.stdin(Stdio::inherit())
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit());
        }

        let status = cmd.status().await?;

        Ok(ProcessOutcome {
            success: status.success(),
            code: status.code(),
        })
    }
}

/// 依 PATH 尋找程式；含路徑分隔符時直接檢查該檔案
pub fn find_program(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 || candidate.is_absolute() {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }

    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|path| path.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_program_with_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let tool = dir.path().join("exiftool");
        std::fs::write(&tool, "#!/bin/sh\n").unwrap();

        assert_eq!(find_program(tool.to_str().unwrap()), Some(tool.clone()));
        assert_eq!(
            find_program(dir.path().join("missing").to_str().unwrap()),
            None
        );
    }

    #[test]
    fn test_find_program_unknown_name() {
        assert!(find_program("photo-recon-definitely-not-installed").is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_runner_reports_exit_status() {
        let runner = TokioProcessRunner::new();

        let ok = runner
            .run(&ProcessInvocation::new("true", "sh").flag("-c", "exit 0").quiet())
            .await
            .unwrap();
        assert!(ok.success);

        let failed = runner
            .run(&ProcessInvocation::new("false", "sh").flag("-c", "exit 3").quiet())
            .await
            .unwrap();
        assert!(!failed.success);
        assert_eq!(failed.code, Some(3));
    }

    #[tokio::test]
    async fn test_runner_spawn_failure_is_io_error() {
        let runner = TokioProcessRunner::new();
        let result = runner
            .run(&ProcessInvocation::new("missing", "/nonexistent/aliceVision_cameraInit"))
            .await;
        assert!(matches!(
            result,
            Err(crate::utils::error::ReconError::IoError(_))
        ));
    }
}
