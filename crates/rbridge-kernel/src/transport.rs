//! The pipe pair between the session and the engine.
//!
//! `EngineTransport` is the seam between protocol logic and process
//! plumbing. `ProcessTransport` drives a real child process; tests plug in
//! an in-process engine instead.

use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::thread::JoinHandle;

/// A line-oriented, strictly sequential conversation with the engine.
pub trait EngineTransport: Send {
    /// Write one command (newline appended) and flush it.
    fn send(&mut self, command: &str) -> io::Result<()>;

    /// Next reply line without its terminator; `Ok(None)` once the engine
    /// has closed its output.
    fn read_line(&mut self) -> io::Result<Option<String>>;

    /// Wait for the engine to exit and release both pipes.
    ///
    /// Every step runs even if an earlier one failed; the returned list
    /// describes each failure.
    fn finish(&mut self) -> Vec<String>;
}

/// Engine running as a child process.
pub struct ProcessTransport {
    child: Child,
    writer: Option<BufWriter<ChildStdin>>,
    reader: Option<BufReader<ChildStdout>>,
    stderr_drain: Option<JoinHandle<()>>,
    finished: bool,
}

impl ProcessTransport {
    /// Spawn `exe` with `args`, running in `cwd`.
    ///
    /// Engine stderr is forwarded line by line to `tracing` warnings from a
    /// background thread so the pipe can never fill up and stall the engine.
    pub fn spawn(exe: &Path, args: &[String], cwd: &Path) -> io::Result<Self> {
        let mut child = Command::new(exe)
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| io::Error::other("engine stdin was not captured"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("engine stdout was not captured"))?;

        let stderr_drain = match child.stderr.take() {
            Some(stderr) => Some(
                std::thread::Builder::new()
                    .name("rbridge-stderr".to_string())
                    .spawn(move || {
                        for line in BufReader::new(stderr).lines() {
                            match line {
                                Ok(line) if !line.trim().is_empty() => {
                                    tracing::warn!(target: "rbridge::engine", "{}", line)
                                }
                                Ok(_) => {}
                                Err(_) => break,
                            }
                        }
                    })?,
            ),
            None => None,
        };

        tracing::debug!(engine = %exe.display(), pid = child.id(), "engine started");

        Ok(Self {
            child,
            writer: Some(BufWriter::new(stdin)),
            reader: Some(BufReader::new(stdout)),
            stderr_drain,
            finished: false,
        })
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }
}

impl EngineTransport for ProcessTransport {
    fn send(&mut self, command: &str) -> io::Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "engine stdin closed"))?;
        writer.write_all(command.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()
    }

    fn read_line(&mut self) -> io::Result<Option<String>> {
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "engine stdout closed"))?;
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Ok(Some(line))
    }

    fn finish(&mut self) -> Vec<String> {
        let mut failures = Vec::new();
        self.finished = true;

        // Closing stdin lets the engine see EOF even if the quit command was lost
        if let Some(mut writer) = self.writer.take()
            && let Err(e) = writer.flush()
        {
            failures.push(format!("flushing engine stdin: {}", e));
        }

        match self.child.wait() {
            Ok(status) if status.success() => {
                tracing::debug!(%status, "engine exited");
            }
            Ok(status) => failures.push(format!("engine exited with {}", status)),
            Err(e) => failures.push(format!("waiting for engine exit: {}", e)),
        }

        self.reader.take();

        if let Some(handle) = self.stderr_drain.take()
            && handle.join().is_err()
        {
            failures.push("stderr drain thread panicked".to_string());
        }

        failures
    }
}

impl Drop for ProcessTransport {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!(pid = self.child.id(), "engine dropped without shutdown, killing");
            self.writer.take();
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn cat_transport(dir: &Path) -> ProcessTransport {
        ProcessTransport::spawn(Path::new("/bin/cat"), &[], dir).expect("spawn cat")
    }

    #[test]
    fn echo_round_trip_through_cat() {
        let dir = tempfile::tempdir().unwrap();
        let mut t = cat_transport(dir.path());
        t.send("hello").unwrap();
        assert_eq!(t.read_line().unwrap(), Some("hello".to_string()));
        t.send("a\nb").unwrap();
        assert_eq!(t.read_line().unwrap(), Some("a".to_string()));
        assert_eq!(t.read_line().unwrap(), Some("b".to_string()));
        assert!(t.finish().is_empty());
    }

    #[test]
    fn eof_after_finish() {
        let dir = tempfile::tempdir().unwrap();
        let mut t = cat_transport(dir.path());
        assert!(t.finish().is_empty());
        assert!(t.send("late").is_err());
        assert!(t.read_line().is_err());
    }

    #[test]
    fn nonzero_exit_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut t = ProcessTransport::spawn(
            Path::new("/bin/sh"),
            &["-c".to_string(), "exit 3".to_string()],
            dir.path(),
        )
        .unwrap();
        let failures = t.finish();
        assert_eq!(failures.len(), 1);
        assert!(failures[0].contains("exited"), "{:?}", failures);
    }

    #[test]
    fn spawn_missing_executable_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ProcessTransport::spawn(Path::new("/nonexistent/engine"), &[], dir.path()).is_err());
    }
}
