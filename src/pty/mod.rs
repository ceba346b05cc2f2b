//! Interactive sessions on a pseudo-terminal.
//!
//! Compiled binaries built from lex/yacc grammars are line-oriented and
//! often misbehave on plain pipes (full buffering, no prompt flushing), so
//! they run on a pty instead. The terminal line discipline echoes every fed
//! input line back into the transcript; [`diff::script_diff`] relies on
//! that echo to separate what the program printed from what it was fed.

pub mod diff;

use std::io::{self, Read, Write};
use std::path::Path;

use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};

/// Transcript read size.
const READ_CHUNK: usize = 4096;

/// End-of-transmission byte. At the start of a line the terminal turns it
/// into end of file on the child's stdin, the same signal an interactive
/// user sends with Ctrl-D.
const EOF_CHAR: u8 = 0x04;

const PTY_ROWS: u16 = 24;
const PTY_COLS: u16 = 80;

#[derive(Debug, thiserror::Error)]
pub enum PtyError {
    #[error("Failed to allocate pseudo-terminal: {0}")]
    Allocate(anyhow::Error),

    #[error("Failed to spawn {program}: {reason}")]
    Spawn { program: String, reason: anyhow::Error },

    #[error("IO error on pseudo-terminal: {0}")]
    Io(#[from] io::Error),
}

/// Everything a finished session left behind.
#[derive(Debug)]
pub struct SessionOutput {
    /// Raw transcript bytes, echoes and carriage returns included.
    pub bytes: Vec<u8>,
    /// Child exit code. Informational; an interactive run is judged by its
    /// transcript, not its exit status.
    pub exit_code: u32,
}

impl SessionOutput {
    /// Transcript decoded lossily.
    pub fn text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }

    /// Transcript split into lines with the carriage returns the terminal
    /// discipline appends stripped. A transcript that ends in a newline
    /// yields a final empty line; callers treat it like any other line.
    pub fn lines(&self) -> Vec<String> {
        self.text()
            .split('\n')
            .map(|line| line.strip_suffix('\r').unwrap_or(line).to_string())
            .collect()
    }
}

/// A child process attached to a fresh pseudo-terminal.
///
/// The session is scripted, not conversational: feed the whole input up
/// front, close the input side, then collect the transcript. All calls
/// block; async callers wrap the session in `spawn_blocking`.
pub struct PtySession {
    master: Box<dyn MasterPty + Send>,
    child: Box<dyn Child + Send + Sync>,
    reader: Box<dyn Read + Send>,
    // Held until the child is reaped. The writer sends a parting newline
    // when dropped, and the terminal would echo that into the transcript
    // as a phantom empty line.
    writer: Box<dyn Write + Send>,
    input_closed: bool,
}

impl PtySession {
    /// Spawns `program` with no arguments on a new pty, running in
    /// `workdir`.
    pub fn spawn(program: &Path, workdir: &Path) -> Result<Self, PtyError> {
        tracing::debug!("Spawning pty session: {}", program.display());

        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows: PTY_ROWS,
                cols: PTY_COLS,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(PtyError::Allocate)?;

        let mut cmd = CommandBuilder::new(program);
        cmd.cwd(workdir);
        let child = pair.slave.spawn_command(cmd).map_err(|e| PtyError::Spawn {
            program: program.display().to_string(),
            reason: e,
        })?;

        let reader = pair.master.try_clone_reader().map_err(PtyError::Allocate)?;
        let writer = pair.master.take_writer().map_err(PtyError::Allocate)?;

        // The child holds its own slave handle; dropping ours is what lets
        // the master read reach end of file once the child exits.
        drop(pair.slave);

        Ok(Self {
            master: pair.master,
            child,
            reader,
            writer,
            input_closed: false,
        })
    }

    /// Writes each line followed by a newline to the child's terminal.
    /// The line discipline echoes everything fed here back into the
    /// transcript, and it echoes each write contiguously; a line and its
    /// newline must go out as a single write or child output can land in
    /// the middle of the echoed line.
    pub fn feed_lines<I, S>(&mut self, lines: I) -> Result<(), PtyError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if self.input_closed {
            return Err(PtyError::Io(io::Error::other("session input already closed")));
        }
        for line in lines {
            let line = line.as_ref();
            let mut buf = Vec::with_capacity(line.len() + 1);
            buf.extend_from_slice(line.as_bytes());
            buf.push(b'\n');
            self.writer.write_all(&buf)?;
        }
        self.writer.flush()?;
        Ok(())
    }

    /// Signals end of input to the child. Idempotent. Only the EOF byte is
    /// sent; the writer itself stays open until the session ends.
    pub fn close_input(&mut self) -> Result<(), PtyError> {
        if !self.input_closed {
            self.input_closed = true;
            self.writer.write_all(&[EOF_CHAR])?;
            self.writer.flush()?;
        }
        Ok(())
    }

    /// Reads the transcript until the terminal closes, then reaps the
    /// child. Closes the input side first if the caller has not; a close
    /// failure at this point means the child is already gone and is not an
    /// error.
    pub fn wait_for_end(mut self) -> Result<SessionOutput, PtyError> {
        if !self.input_closed {
            if let Err(err) = self.close_input() {
                tracing::debug!("Input close raced child exit: {err}");
            }
        }

        let mut bytes = Vec::new();
        let mut buf = [0u8; READ_CHUNK];
        loop {
            match self.reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => bytes.extend_from_slice(&buf[..n]),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => {
                    // Linux reports EIO instead of EOF once the child side
                    // of the terminal is gone.
                    tracing::debug!("Pty read ended: {err}");
                    break;
                }
            }
        }

        let status = self.child.wait()?;
        drop(self.master);
        Ok(SessionOutput {
            bytes,
            exit_code: status.exit_code(),
        })
    }
}

/// Runs `program` to completion on a pty, feeding it `input` line by line.
pub fn run_script(
    program: &Path,
    workdir: &Path,
    input: &[String],
) -> Result<SessionOutput, PtyError> {
    let mut session = PtySession::spawn(program, workdir)?;
    session.feed_lines(input)?;
    session.wait_for_end()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;

    fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, body).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn captures_child_output_and_input_echo() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(
            dir.path(),
            "reply",
            "#!/bin/sh\nwhile read line; do echo \"got $line\"; done\n",
        );

        let output = run_script(&script, dir.path(), &["alpha".into(), "beta".into()]).unwrap();
        let lines = output.lines();

        assert!(lines.contains(&"alpha".to_string()), "echo missing: {lines:?}");
        assert!(lines.contains(&"got alpha".to_string()), "output missing: {lines:?}");
        assert!(lines.contains(&"got beta".to_string()), "output missing: {lines:?}");
    }

    #[test]
    fn transcript_lines_drop_carriage_returns() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "emit", "#!/bin/sh\nprintf 'one\\ntwo\\n'\n");

        let output = run_script(&script, dir.path(), &[]).unwrap();

        // The terminal rewrites every newline as \r\n on the wire.
        assert!(output.bytes.windows(2).any(|w| w == b"\r\n"));
        assert_eq!(output.lines(), vec!["one", "two", ""]);
    }

    #[test]
    fn closing_input_adds_nothing_to_the_transcript() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(
            dir.path(),
            "consume",
            "#!/bin/sh\nwhile read line; do :; done\n",
        );

        let output = run_script(&script, dir.path(), &["alpha".into(), "beta".into()]).unwrap();

        // A silent consumer leaves exactly the echoed script behind, with
        // no extra blank line from the input side shutting down.
        assert_eq!(output.lines(), vec!["alpha", "beta", ""]);
    }

    #[test]
    fn echoed_lines_stay_whole_when_the_child_writes_at_startup() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(
            dir.path(),
            "banner",
            "#!/bin/sh\necho ready\nwhile read line; do echo \"got $line\"; done\n",
        );

        // The banner races the first fed line; each echo must still come
        // out as its own intact transcript line.
        let output = run_script(&script, dir.path(), &["first".into(), "second".into()]).unwrap();
        let lines = output.lines();

        assert!(lines.contains(&"first".to_string()), "echo split: {lines:?}");
        assert!(lines.contains(&"second".to_string()), "echo split: {lines:?}");
        assert!(lines.contains(&"ready".to_string()), "banner missing: {lines:?}");
    }

    #[test]
    fn reports_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "fail", "#!/bin/sh\nexit 7\n");

        let output = run_script(&script, dir.path(), &[]).unwrap();

        assert_eq!(output.exit_code, 7);
    }

    #[test]
    fn missing_program_fails_to_spawn() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("no-such-binary");

        match PtySession::spawn(&missing, dir.path()) {
            Err(PtyError::Spawn { program, .. }) => {
                assert!(program.ends_with("no-such-binary"));
            }
            other => panic!("expected spawn failure, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn runs_in_requested_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "where", "#!/bin/sh\npwd\n");

        let output = run_script(&script, dir.path(), &[]).unwrap();
        let printed = output.lines().first().cloned().unwrap();

        assert_eq!(
            fs::canonicalize(printed).unwrap(),
            fs::canonicalize(dir.path()).unwrap()
        );
    }
}
