//! One conversation with one engine process.
//!
//! The session owns the transport, a private temp directory and the
//! variable registry. All of it sits behind one mutex that is held for a
//! single request/reply exchange. A separate busy flag covers the longer
//! span of an open assignment, so a second caller fails fast instead of
//! interleaving text into a half-built statement.
//!
//! Any pipe failure breaks the session: it is logged, returned as
//! [`BridgeError::Io`], and every later call fails with
//! [`BridgeError::Closed`].

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use rbridge_types::{Matrix, Scalar, ValueType, Variable};
use tempfile::TempDir;

use crate::config::BridgeConfig;
use crate::discovery;
use crate::error::{BridgeError, BridgeResult, ShutdownError, StateError};
use crate::literal;
use crate::marshal::{self, MarshalOptions, MatrixLiteral};
use crate::protocol;
use crate::scope::{Assignment, Statement};
use crate::transport::{EngineTransport, ProcessTransport};

/// Counter for names handed out by [`EngineSession::fresh_variable`].
static FRESH_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Open,
    /// A pipe failed; only `close` still does anything.
    Broken,
    Closed,
}

struct SessionInner {
    transport: Option<Box<dyn EngineTransport>>,
    temp_dir: Option<TempDir>,
    registry: BTreeMap<String, ValueType>,
    state: SessionState,
}

impl SessionInner {
    fn ensure_open(&self) -> BridgeResult<()> {
        match self.state {
            SessionState::Open => Ok(()),
            SessionState::Broken | SessionState::Closed => Err(BridgeError::Closed),
        }
    }

    fn transport(&mut self) -> BridgeResult<&mut Box<dyn EngineTransport>> {
        self.ensure_open()?;
        self.transport.as_mut().ok_or(BridgeError::Closed)
    }

    fn fail(&mut self, context: &'static str, error: io::Error) -> BridgeError {
        tracing::error!(context, %error, "engine pipe failed, session is unusable");
        self.state = SessionState::Broken;
        BridgeError::io(context, error)
    }

    fn send(&mut self, command: &str) -> BridgeResult<()> {
        tracing::debug!(command, "send");
        let result = self.transport()?.send(command);
        result.map_err(|e| self.fail("writing to the engine", e))
    }

    fn read_line(&mut self, context: &'static str) -> BridgeResult<String> {
        let result = self.transport()?.read_line();
        match result {
            Ok(Some(line)) => {
                tracing::trace!(line, "reply");
                Ok(line)
            }
            Ok(None) => Err(self.fail(
                context,
                io::Error::new(io::ErrorKind::UnexpectedEof, "engine closed its output"),
            )),
            Err(e) => Err(self.fail(context, e)),
        }
    }

    fn read_non_blank(&mut self, context: &'static str) -> BridgeResult<String> {
        loop {
            let line = self.read_line(context)?;
            if !line.trim().is_empty() {
                return Ok(line);
            }
        }
    }

    /// Every line before the one carrying `marker`.
    fn read_until(&mut self, marker: &str, context: &'static str) -> BridgeResult<Vec<String>> {
        let mut lines = Vec::new();
        loop {
            let line = self.read_line(context)?;
            if line.contains(marker) {
                return Ok(lines);
            }
            lines.push(line);
        }
    }

    /// Send a statement, then block on the existence fence for `name`.
    fn send_fenced(&mut self, statement: &str, name: &str) -> BridgeResult<String> {
        self.send(statement)?;
        self.send(&protocol::fence(name))?;
        self.read_non_blank("waiting for the assignment fence")
    }

    /// Registered kind of a bound variable.
    fn bound_type(&self, name: &str) -> BridgeResult<ValueType> {
        match self.registry.get(name) {
            Some(ValueType::Unknown) | None => Err(BridgeError::NotBound(name.to_string())),
            Some(ty) => Ok(*ty),
        }
    }
}

/// Marks a session busy until dropped.
pub(crate) struct BusyGuard<'s> {
    flag: &'s AtomicBool,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// A running engine and everything the bridge knows about it.
pub struct EngineSession {
    inner: Mutex<SessionInner>,
    busy: AtomicBool,
    marshal: MarshalOptions,
    end_marker: String,
    temp_path: PathBuf,
}

impl EngineSession {
    /// Discover the engine and start a session with it.
    pub fn start(config: &BridgeConfig) -> BridgeResult<Self> {
        let exe = discovery::discover(config)?;
        Self::spawn(&exe, config)
    }

    /// Start a session with a known engine executable.
    #[tracing::instrument(level = "debug", skip(config), fields(engine = %exe.display()))]
    pub fn spawn(exe: &Path, config: &BridgeConfig) -> BridgeResult<Self> {
        let temp_dir = create_temp_dir(config)?;
        let transport = ProcessTransport::spawn(exe, &config.engine_args, temp_dir.path())
            .map_err(|e| BridgeError::io("starting the engine", e))?;
        Self::assemble(Box::new(transport), temp_dir, config)
    }

    /// Run the session over an already-connected transport.
    pub fn with_transport(
        transport: Box<dyn EngineTransport>,
        config: &BridgeConfig,
    ) -> BridgeResult<Self> {
        let temp_dir = create_temp_dir(config)?;
        Self::assemble(transport, temp_dir, config)
    }

    fn assemble(
        transport: Box<dyn EngineTransport>,
        temp_dir: TempDir,
        config: &BridgeConfig,
    ) -> BridgeResult<Self> {
        let session = Self {
            temp_path: temp_dir.path().to_path_buf(),
            inner: Mutex::new(SessionInner {
                transport: Some(transport),
                temp_dir: Some(temp_dir),
                registry: BTreeMap::new(),
                state: SessionState::Open,
            }),
            busy: AtomicBool::new(false),
            marshal: MarshalOptions {
                spool_threshold: config.spool_threshold,
                elements_per_line: config.elements_per_line,
            },
            end_marker: config.end_marker.clone(),
        };

        if !config.init_script.trim().is_empty() {
            session.execute(&config.init_script)?;
        }
        Ok(session)
    }

    /// Private directory the engine runs in; spooled values live here.
    pub fn temp_dir(&self) -> &Path {
        &self.temp_path
    }

    pub fn is_closed(&self) -> bool {
        self.lock().state != SessionState::Open
    }

    /// Whether an assignment or engine call is in progress.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Scope builder
    // ═══════════════════════════════════════════════════════════════════

    /// Open an assignment to `name`.
    ///
    /// The session stays busy until the returned guard is closed or
    /// dropped. Nothing reaches the engine until `close`.
    pub fn assign(&self, name: &str) -> BridgeResult<Assignment<'_>> {
        let busy = self.begin()?;
        check_name(name)?;
        self.lock().ensure_open()?;
        Assignment::open(self, name, busy)
    }

    /// Send a finished statement, fence it, and record its kind.
    ///
    /// Temp files registered under the statement are purged whatever the
    /// outcome; a purge failure is reported after the binding is recorded.
    #[tracing::instrument(level = "debug", skip(self, statement), fields(name = %statement.target, ty = %statement.ty))]
    pub(crate) fn commit(&self, statement: Statement) -> BridgeResult<Variable> {
        let Statement {
            target,
            ty,
            text,
            mut pending,
        } = statement;

        let bound = {
            let mut inner = self.lock();
            match inner.send_fenced(&text, &target) {
                Ok(reply) if literal::fence_confirms(&reply) => {
                    inner.registry.insert(target.clone(), ty);
                    Ok(Variable::new(target, ty))
                }
                Ok(reply) => {
                    tracing::warn!(name = %target, reply, "engine did not bind variable");
                    Err(BridgeError::Rejected(target))
                }
                Err(e) => Err(e),
            }
        };

        let purged = pending.purge();
        let variable = bound?;
        purged?;
        Ok(variable)
    }

    /// Registered kind of a bound variable, for variable references.
    pub(crate) fn lookup(&self, name: &str) -> BridgeResult<ValueType> {
        check_name(name)?;
        self.lock().bound_type(name)
    }

    /// Literal for a matrix or vector, spooled into the session directory
    /// when it is large.
    pub(crate) fn matrix_literal(&self, matrix: &Matrix, as_vector: bool) -> BridgeResult<MatrixLiteral> {
        marshal::matrix_literal(matrix, as_vector, &self.marshal, &self.temp_path)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Flat API
    // ═══════════════════════════════════════════════════════════════════

    /// Bind a scalar: `name<-(literal);` then the fence.
    pub fn set_scalar(&self, name: &str, value: impl Into<Scalar>) -> BridgeResult<Variable> {
        let value = value.into();
        let mut assignment = self.assign(name)?;
        {
            let mut expression = assignment.expression()?;
            expression.literal(value)?;
            expression.close()?;
        }
        assignment.close()
    }

    /// Bind a matrix, or a one-row/one-column vector when `as_vector`.
    pub fn set_matrix(&self, name: &str, matrix: &Matrix, as_vector: bool) -> BridgeResult<Variable> {
        let mut assignment = self.assign(name)?;
        {
            let mut expression = assignment.expression()?;
            if as_vector {
                expression.vector(matrix)?;
            } else {
                expression.matrix(matrix)?;
            }
            expression.close()?;
        }
        assignment.close()
    }

    /// Read a scalar variable.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn get_scalar(&self, name: &str) -> BridgeResult<Scalar> {
        let _busy = self.begin()?;
        check_name(name)?;
        let mut inner = self.lock();
        inner.ensure_open()?;

        let ty = inner.bound_type(name)?;
        if !ty.is_scalar() {
            return Err(StateError::TypeMismatch {
                name: name.to_string(),
                expected: "scalar",
                actual: ty,
            }
            .into());
        }

        inner.send(&protocol::scalar_probe(name))?;
        let line = inner.read_non_blank("reading a scalar")?;
        literal::decode_scalar(&line, ty).map_err(|reason| BridgeError::decode(line, reason))
    }

    /// Read a vector or matrix variable.
    ///
    /// Vectors come back as a single column, the way the engine prints them.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn get_matrix(&self, name: &str) -> BridgeResult<Matrix> {
        let _busy = self.begin()?;
        check_name(name)?;
        let mut inner = self.lock();
        inner.ensure_open()?;

        let ty = inner.bound_type(name)?;
        if !ty.is_tabular() {
            return Err(StateError::TypeMismatch {
                name: name.to_string(),
                expected: "matrix",
                actual: ty,
            }
            .into());
        }

        inner.send(&protocol::table_dump(name, &self.end_marker))?;
        let lines = inner.read_until(&self.end_marker, "reading a table")?;
        marshal::parse_table(&lines)
    }

    /// Remove a variable from the engine and the registry. Not fenced.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn dispose(&self, name: &str) -> BridgeResult<()> {
        let _busy = self.begin()?;
        check_name(name)?;
        let mut inner = self.lock();
        inner.send(&protocol::dispose(name))?;
        inner.registry.remove(name);
        Ok(())
    }

    /// Run a script verbatim and return the output it printed.
    ///
    /// A marker is printed after the script and everything before it is
    /// returned, so script output never lingers in the pipe. Variables the
    /// script creates are not registered.
    #[tracing::instrument(level = "debug", skip(self, script))]
    pub fn execute(&self, script: &str) -> BridgeResult<Vec<String>> {
        let _busy = self.begin()?;
        let mut inner = self.lock();
        inner.send(script)?;
        inner.send(&protocol::end_mark(&self.end_marker))?;
        inner.read_until(&self.end_marker, "reading script output")
    }

    /// A name no other variable of this process uses, registered as unbound.
    pub fn fresh_variable(&self) -> BridgeResult<Variable> {
        let mut inner = self.lock();
        inner.ensure_open()?;
        loop {
            let n = FRESH_COUNTER.fetch_add(1, Ordering::Relaxed);
            let name = format!("rb_tmp_{}", n);
            if !inner.registry.contains_key(&name) {
                inner.registry.insert(name.clone(), ValueType::Unknown);
                return Ok(Variable::unbound(name));
            }
        }
    }

    /// Snapshot of the registry, sorted by name.
    pub fn variables(&self) -> Vec<Variable> {
        self.lock()
            .registry
            .iter()
            .map(|(name, ty)| Variable::new(name.clone(), *ty))
            .collect()
    }

    /// Registered kind of `name`, if the session knows it.
    pub fn variable_type(&self, name: &str) -> Option<ValueType> {
        self.lock().registry.get(name).copied()
    }

    /// Quit the engine and release the pipes and the temp directory.
    ///
    /// Every step runs even when an earlier one fails; the failures are
    /// reported together. Closing twice is a no-op.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn close(&self) -> BridgeResult<()> {
        let mut inner = self.lock();
        if inner.state == SessionState::Closed {
            return Ok(());
        }

        let mut failures = Vec::new();
        if inner.state == SessionState::Open
            && let Err(e) = inner.send(protocol::QUIT)
        {
            failures.push(e.to_string());
        }
        inner.state = SessionState::Closed;

        if let Some(mut transport) = inner.transport.take() {
            failures.extend(transport.finish());
        }

        if let Some(dir) = inner.temp_dir.take() {
            let path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                failures.push(format!("removing {}: {}", path.display(), e));
            }
        }
        inner.registry.clear();

        if failures.is_empty() {
            tracing::debug!("session closed");
            Ok(())
        } else {
            for failure in &failures {
                tracing::warn!(failure, "shutdown step failed");
            }
            Err(ShutdownError { failures }.into())
        }
    }

    fn begin(&self) -> BridgeResult<BusyGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| StateError::Busy)?;
        Ok(BusyGuard { flag: &self.busy })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for EngineSession {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::error!(error = %e, "engine session teardown failed");
        }
    }
}

impl std::fmt::Debug for EngineSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineSession")
            .field("temp_dir", &self.temp_path)
            .field("busy", &self.is_busy())
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn check_name(name: &str) -> BridgeResult<()> {
    if protocol::is_valid_name(name) {
        Ok(())
    } else {
        Err(BridgeError::InvalidName(name.to_string()))
    }
}

fn create_temp_dir(config: &BridgeConfig) -> BridgeResult<TempDir> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("rbridge-");
    let dir = match &config.temp_root {
        Some(root) => builder.tempdir_in(root),
        None => builder.tempdir(),
    };
    dir.map_err(|e| BridgeError::io("creating the session temp directory", e))
}
