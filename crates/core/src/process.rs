//! Bounded external process execution.
//!
//! Every tool the pipeline shells out to (encoder, local speech engines) runs
//! through here so that timeouts and cancellation kill the child instead of
//! leaving it orphaned.

use std::{process::ExitStatus, process::Stdio, time::Duration};

use thiserror::Error;
use tokio::{io::AsyncWriteExt, process::Command};
use tracing::debug;

use crate::cancel::CancelToken;

#[derive(Debug)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Combined stderr and stdout, lossily decoded.
    pub fn diagnostics(&self) -> String {
        let stderr = String::from_utf8_lossy(&self.stderr);
        let stdout = String::from_utf8_lossy(&self.stdout);
        match (stderr.trim().is_empty(), stdout.trim().is_empty()) {
            (false, false) => format!("{}\n{}", stderr.trim_end(), stdout.trim_end()),
            (false, true) => stderr.trim_end().to_string(),
            (true, false) => stdout.trim_end().to_string(),
            (true, true) => String::new(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {timeout:?}")]
    TimedOut { program: String, timeout: Duration },

    #[error("{program} was cancelled")]
    Cancelled { program: String },

    #[error("i/o error while running {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

pub async fn run(
    command: Command,
    timeout: Duration,
    cancel: &CancelToken,
) -> Result<ProcessOutput, ProcessError> {
    run_with_input(command, None, timeout, cancel).await
}

/// Runs `command` to completion, optionally feeding `input` on stdin.
///
/// The child is spawned with `kill_on_drop`, so losing the race against the
/// deadline or the cancel token terminates it.
pub async fn run_with_input(
    mut command: Command,
    input: Option<&[u8]>,
    timeout: Duration,
    cancel: &CancelToken,
) -> Result<ProcessOutput, ProcessError> {
    let program = command
        .as_std()
        .get_program()
        .to_string_lossy()
        .into_owned();

    command
        .stdin(if input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!(program = %program, "spawning process");
    let mut child = command.spawn().map_err(|source| ProcessError::Spawn {
        program: program.clone(),
        source,
    })?;

    // Fed from its own task so a child that fills stdout before reading
    // stdin cannot stall the exchange.
    let writer = match (child.stdin.take(), input) {
        (Some(mut stdin), Some(input)) => {
            let input = input.to_vec();
            Some(tokio::spawn(async move {
                stdin.write_all(&input).await?;
                stdin.shutdown().await
            }))
        }
        _ => None,
    };
    let exchange = async move {
        let output = child.wait_with_output().await?;
        if let Some(writer) = writer {
            match writer.await {
                // The child stopped reading; its exit status tells why.
                Ok(Err(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                Ok(result) => result?,
                Err(join) => return Err(std::io::Error::other(join)),
            }
        }
        Ok::<_, std::io::Error>(output)
    };

    tokio::select! {
        outcome = tokio::time::timeout(timeout, exchange) => match outcome {
            Ok(Ok(output)) => Ok(ProcessOutput {
                status: output.status,
                stdout: output.stdout,
                stderr: output.stderr,
            }),
            Ok(Err(source)) => Err(ProcessError::Wait { program, source }),
            Err(_) => Err(ProcessError::TimedOut { program, timeout }),
        },
        _ = cancel.cancelled() => Err(ProcessError::Cancelled { program }),
    }
}
