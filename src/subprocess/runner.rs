//! Spawning and draining child processes without losing output.
//!
//! Every spawned tool gets a dedicated reader task per pipe so stdout and
//! stderr are pulled off the kernel buffers as soon as the child writes
//! them. Callers either pump chunks to a sink as they arrive
//! ([`StreamingProcess::stream_to_sink`]) or poll with
//! [`StreamingProcess::flush_available`] / [`StreamingProcess::poll`] and
//! finish with [`StreamingProcess::drain_remaining`] once the child has
//! exited.

use std::path::PathBuf;
use std::process::Stdio;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

use super::error::ProcessError;
use crate::sink::OutputSink;

/// Pipe read size. Large enough that a busy tool does not thrash the
/// reader task, small enough that partial output shows up promptly.
const READ_CHUNK: usize = 4096;

/// A command to execute, with no shell interpretation anywhere.
/// Construction chains like `std::process::Command`:
///
/// ```
/// use lexbench::subprocess::ProcessCommand;
///
/// let cmd = ProcessCommand::new("lex").arg("-d").arg("calc.l");
/// assert_eq!(cmd.args, ["-d", "calc.l"]);
/// ```
#[derive(Debug, Clone)]
pub struct ProcessCommand {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
}

impl ProcessCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.args.extend(args.into_iter().map(|s| s.as_ref().to_string()));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

/// How a child process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    /// Nonzero exit code.
    Error(i32),
    /// Terminated by a signal.
    Signal(i32),
}

impl ExitStatus {
    pub fn success(&self) -> bool {
        matches!(self, ExitStatus::Success)
    }

    /// Exit code for reporting. Signal termination maps to the negated
    /// signal number, the convention interactive shells use.
    pub fn code(&self) -> i32 {
        match self {
            ExitStatus::Success => 0,
            ExitStatus::Error(code) => *code,
            ExitStatus::Signal(sig) => -sig,
        }
    }

    fn from_std(status: std::process::ExitStatus) -> Self {
        if status.success() {
            return ExitStatus::Success;
        }
        if let Some(code) = status.code() {
            return ExitStatus::Error(code);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(sig) = status.signal() {
                return ExitStatus::Signal(sig);
            }
        }
        ExitStatus::Error(1)
    }
}

/// Output collected by a drain call, still split by stream.
#[derive(Debug, Default)]
pub struct Drained {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl Drained {
    pub fn is_empty(&self) -> bool {
        self.stdout.is_empty() && self.stderr.is_empty()
    }
}

/// A running child whose output is captured incrementally.
pub struct StreamingProcess {
    child: Child,
    stdout_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    stderr_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    status: Option<ExitStatus>,
}

impl StreamingProcess {
    /// Spawns the command with both output pipes captured and reader tasks
    /// attached. stdin is closed; tools that want input get a pty session
    /// instead.
    pub fn spawn(command: ProcessCommand) -> Result<Self, ProcessError> {
        tracing::debug!(
            "Spawning process: {} {}",
            command.program,
            command.args.join(" ")
        );

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &command.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| ProcessError::from_spawn(&command.program, e))?;

        let stdout = child.stdout.take().ok_or_else(|| {
            ProcessError::Io(std::io::Error::other("child stdout was not captured"))
        })?;
        let stderr = child.stderr.take().ok_or_else(|| {
            ProcessError::Io(std::io::Error::other("child stderr was not captured"))
        })?;

        let (stdout_tx, stdout_rx) = mpsc::unbounded_channel();
        let (stderr_tx, stderr_rx) = mpsc::unbounded_channel();
        spawn_reader(stdout, stdout_tx);
        spawn_reader(stderr, stderr_tx);

        Ok(Self {
            child,
            stdout_rx,
            stderr_rx,
            status: None,
        })
    }

    /// Returns whatever output has accumulated since the last drain,
    /// without blocking.
    pub fn flush_available(&mut self) -> Drained {
        let mut drained = Drained::default();
        while let Ok(chunk) = self.stdout_rx.try_recv() {
            drained.stdout.extend_from_slice(&chunk);
        }
        while let Ok(chunk) = self.stderr_rx.try_recv() {
            drained.stderr.extend_from_slice(&chunk);
        }
        drained
    }

    /// Checks for exit without blocking. `None` means still running.
    pub fn poll(&mut self) -> Result<Option<ExitStatus>, ProcessError> {
        if let Some(status) = self.status {
            return Ok(Some(status));
        }
        match self.child.try_wait()? {
            Some(status) => {
                let status = ExitStatus::from_std(status);
                self.status = Some(status);
                Ok(Some(status))
            }
            None => Ok(None),
        }
    }

    /// Waits for the child to exit. No timeout: a tool that hangs hangs the
    /// request, matching interactive use where the operator interrupts.
    pub async fn wait(&mut self) -> Result<ExitStatus, ProcessError> {
        if let Some(status) = self.status {
            return Ok(status);
        }
        let status = ExitStatus::from_std(self.child.wait().await?);
        self.status = Some(status);
        Ok(status)
    }

    /// Collects everything still buffered or in flight, waiting until both
    /// pipes reach end of file. Call this once after the child has exited:
    /// exit notification can race the last pipe chunks, and this is the
    /// drain that is guaranteed not to lose them.
    pub async fn drain_remaining(&mut self) -> Drained {
        let mut drained = Drained::default();
        while let Some(chunk) = self.stdout_rx.recv().await {
            drained.stdout.extend_from_slice(&chunk);
        }
        while let Some(chunk) = self.stderr_rx.recv().await {
            drained.stderr.extend_from_slice(&chunk);
        }
        drained
    }

    /// Forwards output to `sink` as it arrives until the child has exited
    /// and both pipes are fully drained, then returns the exit status.
    /// Chunks are decoded lossily; invalid UTF-8 becomes replacement
    /// characters rather than an error.
    pub async fn stream_to_sink(
        &mut self,
        sink: &dyn OutputSink,
    ) -> Result<ExitStatus, ProcessError> {
        let mut exited = self.status.is_some();
        let mut stdout_open = true;
        let mut stderr_open = true;

        while !exited || stdout_open || stderr_open {
            tokio::select! {
                chunk = self.stdout_rx.recv(), if stdout_open => match chunk {
                    Some(bytes) => forward(sink, &bytes, false).await,
                    None => stdout_open = false,
                },
                chunk = self.stderr_rx.recv(), if stderr_open => match chunk {
                    Some(bytes) => forward(sink, &bytes, true).await,
                    None => stderr_open = false,
                },
                status = self.child.wait(), if !exited => {
                    self.status = Some(ExitStatus::from_std(status?));
                    exited = true;
                }
            }
        }

        self.wait().await
    }
}

async fn forward(sink: &dyn OutputSink, bytes: &[u8], is_stderr: bool) {
    let text = String::from_utf8_lossy(bytes);
    let result = if is_stderr {
        sink.write_stderr(&text).await
    } else {
        sink.write_stdout(&text).await
    };
    if let Err(err) = result {
        tracing::warn!("Failed to deliver output chunk: {err}");
    }
}

fn spawn_reader<R>(mut stream: R, tx: mpsc::UnboundedSender<Vec<u8>>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = [0u8; READ_CHUNK];
        loop {
            match stream.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    if tx.send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
                Err(err) => {
                    tracing::debug!("Pipe read ended: {err}");
                    break;
                }
            }
        }
    });
}
