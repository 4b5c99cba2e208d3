//! In-process engine speaking the bridge's line protocol.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

use rbridge_kernel::EngineTransport;

use crate::interp::Interpreter;

#[derive(Debug, Default)]
struct Shared {
    commands: Vec<String>,
    interp: Interpreter,
    replies: VecDeque<String>,
    broken: bool,
    finished: bool,
}

/// A transport backed by [`Interpreter`] instead of a child process.
///
/// Every command is recorded verbatim; replies queue up until read.
#[derive(Debug, Clone, Default)]
pub struct MockEngine {
    shared: Arc<Mutex<Shared>>,
}

/// Observer for a [`MockEngine`] that has been handed to a session.
#[derive(Debug, Clone)]
pub struct MockHandle {
    shared: Arc<Mutex<Shared>>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// The engine as a boxed transport, plus a handle for assertions.
    pub fn boxed() -> (Box<dyn EngineTransport>, MockHandle) {
        let engine = Self::new();
        let handle = engine.handle();
        (Box::new(engine), handle)
    }

    pub fn handle(&self) -> MockHandle {
        MockHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl EngineTransport for MockEngine {
    fn send(&mut self, command: &str) -> io::Result<()> {
        let mut shared = self.lock();
        if shared.broken || shared.finished || shared.interp.quit {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock engine pipe closed"));
        }
        shared.commands.push(command.to_string());
        shared.interp.run(command);
        let lines: Vec<String> = shared.interp.output.drain(..).collect();
        shared.replies.extend(lines);
        Ok(())
    }

    fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut shared = self.lock();
        if shared.broken {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock engine pipe closed"));
        }
        Ok(shared.replies.pop_front())
    }

    fn finish(&mut self) -> Vec<String> {
        let mut shared = self.lock();
        shared.finished = true;
        if shared.interp.quit {
            Vec::new()
        } else {
            vec!["mock engine never received q()".to_string()]
        }
    }
}

impl MockHandle {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Every command sent so far, in order.
    pub fn commands(&self) -> Vec<String> {
        self.lock().commands.clone()
    }

    /// Commands sent after the first `skip`, joined with newlines.
    pub fn script_since(&self, skip: usize) -> String {
        let shared = self.lock();
        let skip = skip.min(shared.commands.len());
        shared.commands[skip..].join("\n")
    }

    pub fn command_count(&self) -> usize {
        self.lock().commands.len()
    }

    /// Whether the engine holds a binding for `name`.
    pub fn has_variable(&self, name: &str) -> bool {
        self.lock().interp.vars.contains_key(name)
    }

    /// Errors the engine reported, as it would on stderr.
    pub fn errors(&self) -> Vec<String> {
        self.lock().interp.errors.clone()
    }

    pub fn quit_received(&self) -> bool {
        self.lock().interp.quit
    }

    pub fn finished(&self) -> bool {
        self.lock().finished
    }

    /// Make every later send and read fail as if the process died.
    pub fn break_pipe(&self) {
        self.lock().broken = true;
    }

    /// Have the engine delete every spooled file as soon as it has read it,
    /// so the session's own purge finds nothing to remove.
    pub fn unlink_scanned_files(&self) {
        self.lock().interp.unlink_scanned = true;
    }

    /// Run a script directly inside the engine, bypassing the protocol.
    pub fn run_directly(&self, script: &str) {
        let mut shared = self.lock();
        shared.interp.run(script);
        shared.interp.output.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_and_replies() {
        let (mut engine, handle) = MockEngine::boxed();
        engine.send("x<-(2);").unwrap();
        engine.send("exists(\"x\");").unwrap();
        assert_eq!(engine.read_line().unwrap(), Some("[1] TRUE".to_string()));
        assert_eq!(engine.read_line().unwrap(), None);
        assert_eq!(handle.commands(), vec!["x<-(2);", "exists(\"x\");"]);
        assert!(handle.has_variable("x"));
    }

    #[test]
    fn broken_pipe_fails_io() {
        let (mut engine, handle) = MockEngine::boxed();
        handle.break_pipe();
        assert_eq!(engine.send("q();").unwrap_err().kind(), io::ErrorKind::BrokenPipe);
        assert!(engine.read_line().is_err());
    }

    #[test]
    fn finish_reports_missing_quit() {
        let (mut engine, handle) = MockEngine::boxed();
        assert_eq!(engine.finish().len(), 1);
        assert!(handle.finished());

        let (mut engine, handle) = MockEngine::boxed();
        engine.send("q();").unwrap();
        assert!(engine.finish().is_empty());
        assert!(handle.quit_received());
    }
}
