//! Request dispatch.
//!
//! One request block in, streamed tool output plus status notes out, and
//! an acknowledgement with the running request counter back to the caller.
//! Tool failures and malformed tags are reported as stream content; a
//! request never fails out of band.

pub mod request;

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::config::ToolchainConfig;
use crate::pty::diff::script_diff;
use crate::pty::{self, PtyError, SessionOutput};
use crate::sink::OutputSink;
use crate::subprocess::{ProcessCommand, StreamingProcess};

use request::Command;

/// Name the C compiler gives linked binaries, and the name the run
/// command looks for.
const DEFAULT_BINARY: &str = "a.out";
/// Name of the private copy the custom-run command executes.
const CUSTOM_BINARY: &str = "uecc";

/// Asks yacc for counterexamples when the grammar has conflicts.
const YACC_CONFLICT_FLAG: &str = "-Wcounterexamples";
/// Trailing C compile flags: suppress warnings, link the lex and yacc
/// runtime libraries.
const CC_TAIL_FLAGS: [&str; 3] = ["-w", "-ll", "-ly"];
/// Assembly compile flags. Generated listings assume absolute addresses
/// and an executable stack.
const ASM_FLAGS: [&str; 3] = ["-no-pie", "-z", "execstack"];

/// Fixed reporting strings for one build step. The display name states
/// the conventional tool regardless of which program the configuration
/// actually spawns.
struct ToolReport {
    label: &'static str,
    display: &'static str,
    artifact: &'static str,
}

impl ToolReport {
    fn success_note(&self) -> String {
        format!(
            "{} {} generates {} successfully",
            self.label, self.display, self.artifact
        )
    }

    fn failure_note(&self, code: i32) -> String {
        format!("{} {} exited with code {}", self.label, self.display, code)
    }

    fn not_found_note(&self, program: &str) -> String {
        format!("{} Error: {} not found", self.label, program)
    }
}

const LEX_REPORT: ToolReport = ToolReport {
    label: "[Lex]",
    display: "flex",
    artifact: "lex.yy.c",
};
const YACC_REPORT: ToolReport = ToolReport {
    label: "[Yacc]",
    display: "bison",
    artifact: "y.tab.c",
};
const CC_REPORT: ToolReport = ToolReport {
    label: "[C]",
    display: "gcc",
    artifact: "a.out",
};
const ASM_REPORT: ToolReport = ToolReport {
    label: "[UECC]",
    display: "cc",
    artifact: "a.out",
};

/// Acknowledgement returned for every request, failed ones included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecuteReply {
    /// Position of this request in the session, starting at 1.
    pub execution_count: u64,
}

/// Executes request blocks against a working directory.
///
/// The dispatcher owns the request counter and the registry of files it
/// has written; both live as long as the session.
pub struct Dispatcher {
    config: ToolchainConfig,
    workdir: PathBuf,
    created_files: Vec<PathBuf>,
    execution_count: u64,
}

impl Dispatcher {
    pub fn new(config: ToolchainConfig, workdir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            workdir: workdir.into(),
            created_files: Vec::new(),
            execution_count: 0,
        }
    }

    /// Number of requests executed so far.
    pub fn execution_count(&self) -> u64 {
        self.execution_count
    }

    /// Files this dispatcher has written or copied, in creation order.
    pub fn created_files(&self) -> &[PathBuf] {
        &self.created_files
    }

    /// Runs one request block. Everything the block produces goes to
    /// `sink`; the reply only acknowledges that the request was handled.
    /// Internal failures become a `[Kernel]` error line on the error
    /// stream rather than a failed reply.
    pub async fn execute(&mut self, code: &str, sink: &dyn OutputSink) -> ExecuteReply {
        self.execution_count += 1;
        tracing::debug!("Executing request {}", self.execution_count);

        if let Err(err) = self.run(code, sink).await {
            let line = format!("[Kernel] Error: {err:#}\n");
            if let Err(sink_err) = sink.write_stderr(&line).await {
                tracing::warn!("Failed to report request error: {sink_err}");
            }
        }

        ExecuteReply {
            execution_count: self.execution_count,
        }
    }

    /// Deletes every file this dispatcher created. Files a tool already
    /// overwrote or removed are skipped silently.
    pub fn cleanup_files(&mut self) {
        for path in self.created_files.drain(..) {
            match std::fs::remove_file(&path) {
                Ok(()) => tracing::debug!("Removed {}", path.display()),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => tracing::warn!("Failed to remove {}: {err}", path.display()),
            }
        }
    }

    async fn run(&mut self, code: &str, sink: &dyn OutputSink) -> Result<()> {
        let request = match request::parse(code) {
            Ok(request) => request,
            Err(err) => return send_error_note(sink, &err.to_string()).await,
        };

        match request.command {
            Command::Lex { source, options } => {
                self.write_source(&source, &request.body).await?;
                let command = self.lex_command(&source, &options);
                self.run_tool(command, &LEX_REPORT, sink).await
            }
            Command::Yacc { source, options } => {
                self.write_source(&source, &request.body).await?;
                let command = self.yacc_command(&source, &options);
                self.run_tool(command, &YACC_REPORT, sink).await
            }
            Command::CompileC { source, options } => {
                self.write_source(&source, &request.body).await?;
                let command = self.cc_command(&source, &options);
                self.run_tool(command, &CC_REPORT, sink).await
            }
            Command::RunBinary => self.run_binary(&request.body, sink).await,
            Command::RunCustom { source } => self.run_custom(&source, &request.body, sink).await,
        }
    }

    fn lex_command(&self, source: &str, options: &[String]) -> ProcessCommand {
        ProcessCommand::new(&self.config.lex_program)
            .args(options)
            .arg(source)
            .current_dir(&self.workdir)
    }

    fn yacc_command(&self, source: &str, options: &[String]) -> ProcessCommand {
        ProcessCommand::new(&self.config.yacc_program)
            .arg(source)
            .arg(YACC_CONFLICT_FLAG)
            .args(options)
            .current_dir(&self.workdir)
    }

    fn cc_command(&self, source: &str, options: &[String]) -> ProcessCommand {
        ProcessCommand::new(&self.config.cc_program)
            .arg(source)
            .args(options)
            .args(CC_TAIL_FLAGS)
            .current_dir(&self.workdir)
    }

    fn asm_command(&self, listing: &str) -> ProcessCommand {
        ProcessCommand::new(&self.config.asm_program)
            .args(ASM_FLAGS)
            .arg(listing)
            .current_dir(&self.workdir)
    }

    /// Writes the request body to `name` inside the working directory,
    /// with a trailing newline so tools always see a complete last line.
    async fn write_source(&mut self, name: &str, body: &[String]) -> Result<PathBuf> {
        let path = self.workdir.join(name);
        let mut contents = body.join("\n");
        contents.push('\n');
        tokio::fs::write(&path, contents)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        self.created_files.push(path.clone());
        Ok(path)
    }

    /// Streams one build tool to completion, then reports its outcome as
    /// a status note after all of its own output.
    async fn run_tool(
        &self,
        command: ProcessCommand,
        report: &ToolReport,
        sink: &dyn OutputSink,
    ) -> Result<()> {
        let program = command.program.clone();
        let mut child = match StreamingProcess::spawn(command) {
            Ok(child) => child,
            Err(err) if err.is_spawn_failure() => {
                tracing::debug!("Tool spawn failed: {err}");
                return send_error_note(sink, &report.not_found_note(&program)).await;
            }
            Err(err) => return Err(err.into()),
        };

        let status = child.stream_to_sink(sink).await?;
        if status.success() {
            send_note(sink, &report.success_note()).await
        } else {
            send_error_note(sink, &report.failure_note(status.code())).await
        }
    }

    /// Runs the compiled binary against the body and writes the
    /// transcript lines the script does not account for.
    async fn run_binary(&self, body: &[String], sink: &dyn OutputSink) -> Result<()> {
        let binary = self.workdir.join(DEFAULT_BINARY);
        if !binary.exists() {
            return send_error_note(sink, "[A.OUT] Error: a.out not found").await;
        }

        let output = match self.run_session(binary, body).await {
            Ok(output) => output,
            Err(PtyError::Spawn { .. }) => {
                return send_error_note(sink, "[A.OUT] Error: a.out not found").await;
            }
            Err(err) => return Err(err.into()),
        };

        write_diff(&output, body, sink).await?;
        Ok(())
    }

    /// Runs a private copy of the binary, keeps the transcript diff as an
    /// assembly listing next to the source, and compiles the listing.
    async fn run_custom(
        &mut self,
        source: &str,
        body: &[String],
        sink: &dyn OutputSink,
    ) -> Result<()> {
        let binary = self.workdir.join(DEFAULT_BINARY);
        let copy = self.workdir.join(CUSTOM_BINARY);
        if let Err(err) = tokio::fs::copy(&binary, &copy).await {
            tracing::debug!("Binary copy failed: {err}");
            return send_error_note(sink, "[UECC] Error: a.out not found").await;
        }
        self.created_files.push(copy.clone());

        self.write_source(source, body).await?;

        let output = match self.run_session(copy, body).await {
            Ok(output) => output,
            Err(PtyError::Spawn { .. }) => {
                return send_error_note(sink, "[UECC] Error: a.out not found").await;
            }
            Err(err) => return Err(err.into()),
        };
        let diff_text = write_diff(&output, body, sink).await?;

        let listing = format!("{source}.s");
        let listing_path = self.workdir.join(&listing);
        tokio::fs::write(&listing_path, &diff_text)
            .await
            .with_context(|| format!("Failed to write {}", listing_path.display()))?;
        self.created_files.push(listing_path);

        // The listing compiles whether or not the diff came out clean.
        let command = self.asm_command(&listing);
        self.run_tool(command, &ASM_REPORT, sink).await
    }

    /// Interactive sessions block on terminal reads, so they run on the
    /// blocking pool.
    async fn run_session(
        &self,
        program: PathBuf,
        input: &[String],
    ) -> Result<SessionOutput, PtyError> {
        let workdir = self.workdir.clone();
        let input = input.to_vec();
        tokio::task::spawn_blocking(move || pty::run_script(&program, &workdir, &input))
            .await
            .map_err(|err| PtyError::Io(std::io::Error::other(err)))?
    }
}

/// The diff is payload rather than a status note: written verbatim, even
/// when empty, with no appended newline.
async fn write_diff(
    output: &SessionOutput,
    script: &[String],
    sink: &dyn OutputSink,
) -> Result<String> {
    let diff = script_diff(&output.lines(), script);
    let text = diff.join("\n");
    sink.write_stdout(&text).await?;
    Ok(text)
}

async fn send_note(sink: &dyn OutputSink, text: &str) -> Result<()> {
    sink.write_stdout(&format!("{text}\n")).await
}

async fn send_error_note(sink: &dyn OutputSink, text: &str) -> Result<()> {
    sink.write_stderr(&format!("{text}\n")).await
}
