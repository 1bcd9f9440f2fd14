//! Toolkit implementation that shells out to an external executable.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use crate::config::ToolkitConfig;
use crate::model::PreservationStatus;

use super::error::ToolkitError;
use super::traits::PreservationToolkit;
use super::types::{DownloadedObject, SipDates};

/// Exit code the toolkit uses to signal a preservation error.
pub const PRESERVATION_ERROR_EXIT_CODE: i32 = 3;

/// Body written to stderr together with [`PRESERVATION_ERROR_EXIT_CODE`].
#[derive(Debug, Deserialize)]
struct PreservationErrorReport {
    error: String,
    #[serde(default)]
    detail: String,
}

/// Runs `{command} {args...} <subcommand> --object-id ... --package-dir ... --sip-id ...`.
///
/// Successful runs print JSON on stdout when the stage returns data. The
/// `download` output names the package `{object_id}-{sip_id}.tar`.
pub struct CommandToolkit {
    config: ToolkitConfig,
}

impl CommandToolkit {
    pub fn new(config: ToolkitConfig) -> Self {
        Self { config }
    }

    fn command(&self, subcommand: &str, object_id: i64, package_dir: &Path, sip_id: &str) -> Command {
        let mut command = Command::new(&self.config.command);
        command
            .args(&self.config.args)
            .arg(subcommand)
            .arg("--object-id")
            .arg(object_id.to_string())
            .arg("--package-dir")
            .arg(package_dir)
            .arg("--sip-id")
            .arg(sip_id)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }

    async fn run(&self, subcommand: &str, mut command: Command) -> Result<Vec<u8>, ToolkitError> {
        debug!(command = %self.config.command, subcommand, "Running toolkit");

        let output = command.output().await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ToolkitError::Unavailable(format!(
                    "toolkit executable not found: {}",
                    self.config.command
                ))
            } else {
                ToolkitError::from(e)
            }
        })?;

        if output.status.success() {
            return Ok(output.stdout);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if output.status.code() == Some(PRESERVATION_ERROR_EXIT_CODE) {
            return Err(match serde_json::from_str::<PreservationErrorReport>(stderr.trim()) {
                Ok(report) => ToolkitError::preservation(report.detail, report.error),
                Err(_) => ToolkitError::preservation(stderr.trim(), stderr.trim()),
            });
        }

        Err(ToolkitError::Unavailable(format!(
            "{} {} exited with {:?}: {}",
            self.config.command,
            subcommand,
            output.status.code(),
            stderr.trim()
        )))
    }

    fn parse<T: DeserializeOwned>(subcommand: &str, stdout: &[u8]) -> Result<T, ToolkitError> {
        serde_json::from_slice(stdout).map_err(|e| {
            ToolkitError::Unavailable(format!("invalid {} output: {}", subcommand, e))
        })
    }
}

#[async_trait]
impl PreservationToolkit for CommandToolkit {
    fn name(&self) -> &str {
        "command"
    }

    async fn download_object(
        &self,
        object_id: i64,
        package_dir: &Path,
        sip_id: &str,
    ) -> Result<DownloadedObject, ToolkitError> {
        let command = self.command("download", object_id, package_dir, sip_id);
        let stdout = self.run("download", command).await?;
        Self::parse("download", &stdout)
    }

    async fn create_sip(
        &self,
        object_id: i64,
        package_dir: &Path,
        sip_id: &str,
        dates: SipDates,
    ) -> Result<(), ToolkitError> {
        let mut command = self.command("create-sip", object_id, package_dir, sip_id);
        command
            .arg("--create-date")
            .arg(dates.create_date.to_rfc3339());
        if let Some(modify_date) = dates.modify_date {
            command
                .arg("--modify-date")
                .arg(modify_date.to_rfc3339())
                .arg("--update");
        }
        self.run("create-sip", command).await?;
        Ok(())
    }

    async fn submit_sip(
        &self,
        object_id: i64,
        package_dir: &Path,
        sip_id: &str,
    ) -> Result<(), ToolkitError> {
        let command = self.command("submit", object_id, package_dir, sip_id);
        self.run("submit", command).await?;
        Ok(())
    }

    async fn confirm_sip(
        &self,
        object_id: i64,
        package_dir: &Path,
        archive_dir: &Path,
        sip_id: &str,
        status: PreservationStatus,
    ) -> Result<(), ToolkitError> {
        let mut command = self.command("confirm", object_id, package_dir, sip_id);
        command
            .arg("--archive-dir")
            .arg(archive_dir)
            .arg("--status")
            .arg(status.as_str());
        self.run("confirm", command).await?;
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn shell_toolkit(script: &str) -> CommandToolkit {
        CommandToolkit::new(ToolkitConfig {
            command: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string(), "toolkit".to_string()],
        })
    }

    #[tokio::test]
    async fn test_download_parses_stdout() {
        let toolkit = shell_toolkit(
            r#"echo '{"sip_filename":"7-20190203-120000.tar","attachment_ids":[70,140]}'"#,
        );
        let downloaded = toolkit
            .download_object(7, Path::new("/tmp"), "20190203-120000")
            .await
            .unwrap();
        assert_eq!(downloaded.sip_filename, "7-20190203-120000.tar");
        assert_eq!(downloaded.attachment_ids, vec![70, 140]);
        assert!(downloaded.modified_date.is_none());
    }

    #[tokio::test]
    async fn test_subcommand_and_options_are_passed() {
        let toolkit = shell_toolkit(r#"[ "$1" = "submit" ] && [ "$3" = "7" ] && [ "$7" = "abc" ]"#);
        toolkit.submit_sip(7, Path::new("/tmp"), "abc").await.unwrap();
    }

    #[tokio::test]
    async fn test_exit_code_three_is_preservation_error() {
        let toolkit = shell_toolkit(
            r#"echo '{"error":"Filename was not supported","detail":"bad.exe"}' >&2; exit 3"#,
        );
        let err = toolkit
            .download_object(7, Path::new("/tmp"), "20190203-120000")
            .await
            .unwrap_err();
        match err {
            ToolkitError::Preservation { detail, error } => {
                assert_eq!(error, "Filename was not supported");
                assert_eq!(detail, "bad.exe");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_other_failures_are_infrastructure_errors() {
        let toolkit = shell_toolkit("echo 'connection refused' >&2; exit 1");
        let err = toolkit
            .submit_sip(7, Path::new("/tmp"), "20190203-120000")
            .await
            .unwrap_err();
        assert!(!err.is_domain());
        assert!(err.to_string().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_missing_executable_is_unavailable() {
        let toolkit = CommandToolkit::new(ToolkitConfig {
            command: "/nonexistent/preservation-toolkit".to_string(),
            args: vec![],
        });
        let err = toolkit
            .submit_sip(7, Path::new("/tmp"), "20190203-120000")
            .await
            .unwrap_err();
        assert!(matches!(err, ToolkitError::Unavailable(_)));
    }
}
