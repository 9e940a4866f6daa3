//! Runs the external `atest` engine against a recording.
//!
//! Error handling policy:
//! - a missing input file or an unknown host OS is fatal and reported before any
//!   process is spawned
//! - everything that goes wrong with the engine process itself (launch, I/O, non-zero
//!   exit, deadline) becomes a [`ProcessFailure`] next to an empty report

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::opts::Opts;
use crate::report::RawReport;
use crate::{Error, Result};

/// Host operating systems with a known engine invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    Linux,
    MacOs,
}

impl Platform {
    /// The platform this binary runs on.
    pub fn current() -> Result<Self> {
        Self::from_os(std::env::consts::OS)
    }

    /// Map an OS name as reported by `std::env::consts::OS`.
    pub fn from_os(os: &str) -> Result<Self> {
        match os {
            "windows" => Ok(Self::Windows),
            "linux" => Ok(Self::Linux),
            "macos" => Ok(Self::MacOs),
            other => Err(Error::UnsupportedPlatform {
                os: other.to_owned(),
            }),
        }
    }

    /// Default engine invocation for this platform.
    pub fn program(self) -> &'static str {
        match self {
            Self::Windows => "atest",
            Self::Linux | Self::MacOs => "./atest",
        }
    }
}

/// One decode call: a recording and the baud rate to decode it at.
///
/// The baud rate is passed through to the engine untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeRequest {
    pub file_path: PathBuf,
    pub baud_rate: String,
}

impl DecodeRequest {
    pub fn new(file_path: impl Into<PathBuf>, baud_rate: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            baud_rate: baud_rate.into(),
        }
    }
}

/// Why an engine run produced no report.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProcessFailure {
    #[error("failed to launch '{program}': {message}")]
    Launch { program: String, message: String },

    #[error("failed to read decoder output: {message}")]
    Io { message: String },

    #[error("decoder exited with status {}", exit_code_label(.code))]
    Exit { code: Option<i32> },

    #[error("decoder timed out after {after_ms} ms")]
    TimedOut { after_ms: u64 },
}

fn exit_code_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "signal".to_owned(),
    }
}

/// Outcome of one engine run.
///
/// `report` is empty whenever `failure` is set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocation {
    pub report: RawReport,
    pub failure: Option<ProcessFailure>,
}

impl Invocation {
    fn completed(report: RawReport) -> Self {
        Self {
            report,
            failure: None,
        }
    }

    fn failed(failure: ProcessFailure) -> Self {
        warn!(error = %failure, "decoder run failed, returning empty report");
        Self {
            report: RawReport::empty(),
            failure: Some(failure),
        }
    }
}

/// Builds and runs `<program> -B <baud> -h <file>`.
#[derive(Debug, Clone)]
pub struct Invoker {
    opts: Opts,
    os: String,
}

impl Invoker {
    /// Create an invoker for the host operating system.
    pub fn new(opts: Opts) -> Result<Self> {
        Self::for_os(opts, std::env::consts::OS)
    }

    /// Create an invoker that resolves its program as if running on `os`.
    ///
    /// The OS is only checked when a decode runs, after the input file check.
    pub fn for_os(opts: Opts, os: impl Into<String>) -> Result<Self> {
        opts.validate()?;
        Ok(Self {
            opts,
            os: os.into(),
        })
    }

    pub fn opts(&self) -> &Opts {
        &self.opts
    }

    /// Run the engine once and capture its combined stdout/stderr.
    pub async fn decode(&self, request: &DecodeRequest) -> Result<Invocation> {
        if !request.file_path.exists() {
            debug!(path = %request.file_path.display(), "input file does not exist");
            return Err(Error::NotFound);
        }

        let platform = Platform::from_os(&self.os)?;
        let program = self.program(platform);

        let mut command = Command::new(&program);
        command
            .arg("-B")
            .arg(&request.baud_rate)
            .arg("-h")
            .arg(&request.file_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &self.opts.working_dir {
            command.current_dir(dir);
        }

        info!(
            program = %program.display(),
            baud_rate = %request.baud_rate,
            path = %request.file_path.display(),
            "running decoder"
        );

        let child = match command.spawn() {
            Ok(child) => child,
            Err(err) => {
                return Ok(Invocation::failed(ProcessFailure::Launch {
                    program: program.display().to_string(),
                    message: err.to_string(),
                }));
            }
        };

        // Dropping the run future drops the child, and `kill_on_drop` terminates it.
        let run = capture_combined_output(child);
        let captured = match self.opts.timeout {
            Some(deadline) => match tokio::time::timeout(deadline, run).await {
                Ok(res) => res,
                Err(_) => Err(ProcessFailure::TimedOut {
                    after_ms: duration_ms(deadline),
                }),
            },
            None => run.await,
        };

        match captured {
            Ok(bytes) => {
                debug!(bytes = bytes.len(), "decoder finished");
                Ok(Invocation::completed(RawReport::from_bytes_lossy(&bytes)))
            }
            Err(failure) => Ok(Invocation::failed(failure)),
        }
    }

    fn program(&self, platform: Platform) -> PathBuf {
        match &self.opts.program {
            Some(program) => program.clone(),
            None => PathBuf::from(platform.program()),
        }
    }
}

/// Drain stdout and stderr into one buffer in arrival order, then wait for exit.
///
/// The two streams are separate pipes, so "arrival order" is the order reads complete
/// here. Writes the engine makes to both streams in quick succession may land in either
/// order, unlike a single shared pipe.
async fn capture_combined_output(
    mut child: Child,
) -> std::result::Result<Vec<u8>, ProcessFailure> {
    let (Some(mut stdout), Some(mut stderr)) = (child.stdout.take(), child.stderr.take()) else {
        return Err(ProcessFailure::Io {
            message: "decoder output pipes were not captured".to_owned(),
        });
    };

    let mut combined = Vec::new();
    let mut out_buf = [0u8; 4096];
    let mut err_buf = [0u8; 4096];
    let mut out_open = true;
    let mut err_open = true;

    while out_open || err_open {
        tokio::select! {
            read = stdout.read(&mut out_buf), if out_open => match read.map_err(io_failure)? {
                0 => out_open = false,
                n => combined.extend_from_slice(&out_buf[..n]),
            },
            read = stderr.read(&mut err_buf), if err_open => match read.map_err(io_failure)? {
                0 => err_open = false,
                n => combined.extend_from_slice(&err_buf[..n]),
            },
        }
    }

    let status = child.wait().await.map_err(io_failure)?;
    if !status.success() {
        return Err(ProcessFailure::Exit {
            code: status.code(),
        });
    }

    Ok(combined)
}

fn io_failure(err: std::io::Error) -> ProcessFailure {
    ProcessFailure::Io {
        message: err.to_string(),
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_platforms_map_to_one_invocation_each() -> anyhow::Result<()> {
        assert_eq!(Platform::from_os("windows")?.program(), "atest");
        assert_eq!(Platform::from_os("linux")?.program(), "./atest");
        assert_eq!(Platform::from_os("macos")?.program(), "./atest");
        Ok(())
    }

    #[test]
    fn unknown_platform_is_rejected() {
        let err = Platform::from_os("freebsd").unwrap_err();
        assert!(matches!(err, Error::UnsupportedPlatform { ref os } if os == "freebsd"));
    }

    #[test]
    fn exit_failure_labels_signal_deaths() {
        assert_eq!(
            ProcessFailure::Exit { code: Some(2) }.to_string(),
            "decoder exited with status 2"
        );
        assert_eq!(
            ProcessFailure::Exit { code: None }.to_string(),
            "decoder exited with status signal"
        );
    }

    #[tokio::test]
    async fn missing_file_fails_before_spawning() -> anyhow::Result<()> {
        // The program does not exist, so reaching the spawn would degrade instead of failing.
        let opts = Opts {
            program: Some(PathBuf::from("/nonexistent/atest")),
            ..Opts::default()
        };
        let invoker = Invoker::for_os(opts, "linux")?;
        let err = invoker
            .decode(&DecodeRequest::new("/nonexistent/recording.wav", "1200"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound));
        Ok(())
    }

    #[tokio::test]
    async fn unsupported_platform_fails_without_spawning() -> anyhow::Result<()> {
        let file = tempfile::NamedTempFile::new()?;
        let invoker = Invoker::for_os(Opts::default(), "solaris")?;
        let err = invoker
            .decode(&DecodeRequest::new(file.path(), "1200"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedPlatform { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn launch_failure_degrades_to_empty_report() -> anyhow::Result<()> {
        let file = tempfile::NamedTempFile::new()?;
        let opts = Opts {
            program: Some(PathBuf::from("/nonexistent/atest")),
            ..Opts::default()
        };
        let invoker = Invoker::for_os(opts, "linux")?;
        let invocation = invoker
            .decode(&DecodeRequest::new(file.path(), "1200"))
            .await?;
        assert!(invocation.report.is_empty());
        assert!(matches!(
            invocation.failure,
            Some(ProcessFailure::Launch { .. })
        ));
        Ok(())
    }

    #[test]
    fn invalid_opts_are_rejected_at_construction() {
        let opts = Opts {
            timeout: Some(Duration::ZERO),
            ..Opts::default()
        };
        assert!(Invoker::new(opts).is_err());
    }
}
