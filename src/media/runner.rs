use std::path::{Path, PathBuf};
use std::process::Output;

use chrono::Local;
use tokio::process::Command;
use tracing::{debug, error, warn};

/// A failed external-process invocation.
///
/// The captured combined stdout/stderr has already been persisted to a
/// timestamped log file by the time this is returned, so the operator
/// always has a forensic artifact to look at.
#[derive(Debug)]
pub struct ProcessFailure {
    pub program: String,
    pub status: Option<i32>,
    pub log_path: Option<PathBuf>,
}

impl std::fmt::Display for ProcessFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(code) => write!(f, "{} exited with status {}", self.program, code)?,
            None => write!(f, "{} was terminated by a signal", self.program)?,
        }
        if let Some(ref log) = self.log_path {
            write!(f, " (output saved to {})", log.display())?;
        }
        Ok(())
    }
}

/// Runs external commands, capturing their output. Any failing invocation
/// leaves a `fail-<timestamp>.log` in the log directory before the error
/// is surfaced.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    log_dir: PathBuf,
}

impl CommandRunner {
    pub fn new(log_dir: &Path) -> Self {
        Self {
            log_dir: log_dir.to_path_buf(),
        }
    }

    /// Run `program` with `args`, returning the captured output on success.
    pub async fn run(
        &self,
        program: &str,
        args: &[String],
    ) -> std::result::Result<Output, ProcessFailure> {
        debug!("Running {} {}", program, args.join(" "));

        let output = Command::new(program)
            .args(args)
            .output()
            .await
            .map_err(|e| {
                error!("Failed to spawn {}: {}", program, e);
                ProcessFailure {
                    program: program.to_string(),
                    status: None,
                    log_path: None,
                }
            })?;

        if output.status.success() {
            return Ok(output);
        }

        let log_path = self.persist_failure(program, &output);
        Err(ProcessFailure {
            program: program.to_string(),
            status: output.status.code(),
            log_path,
        })
    }

    fn persist_failure(&self, program: &str, output: &Output) -> Option<PathBuf> {
        let timestamp = Local::now().format("%Y-%m-%d_%H-%M-%S");
        let log_path = self.log_dir.join(format!("fail-{timestamp}.log"));

        let mut combined =
            Vec::with_capacity(output.stdout.len() + output.stderr.len());
        combined.extend_from_slice(&output.stdout);
        combined.extend_from_slice(&output.stderr);

        match std::fs::write(&log_path, &combined) {
            Ok(()) => {
                warn!(
                    "{} failed, output saved to {}",
                    program,
                    log_path.display()
                );
                Some(log_path)
            }
            Err(e) => {
                error!("Could not write failure log {}: {}", log_path.display(), e);
                None
            }
        }
    }
}
