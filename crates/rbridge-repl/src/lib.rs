//! rbridge REPL: an interactive console over one engine session.
//!
//! This REPL handles:
//! - Meta-commands: `/help`, `/quit`, `/vars`, `/get`, `/set`, `/call`, `/rm`, `/engine`
//! - Raw engine scripts via [`EngineSession::execute`]
//! - Value formatting in the engine's console style
//! - Command history via rustyline

pub mod format;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::Editor;

use rbridge_kernel::{
    discovery, paths, BridgeConfig, BridgeError, BridgeResult, EngineSession, Matrix,
    NamedFunction, Scalar, ValueType, Variable,
};

/// Error text `process_line` returns when the user asked to leave.
pub const EXIT_SIGNAL: &str = "__REPL_EXIT__";

/// Result from meta-command handling.
#[derive(Debug)]
enum MetaResult {
    /// Continue with optional output
    Continue(Option<String>),
    /// Exit the REPL (caller should save history and exit)
    Exit,
}

/// A value typed after `/set NAME`.
#[derive(Debug, Clone, PartialEq)]
pub enum InputValue {
    Scalar(Scalar),
    Vector(Matrix),
    Matrix(Matrix),
}

/// REPL state: the session plus where its engine came from.
pub struct Repl {
    session: EngineSession,
    engine: Option<PathBuf>,
}

impl Repl {
    /// Discover an engine with the user's configuration and start a session.
    pub fn new() -> Result<Self> {
        let config = BridgeConfig::load()?;
        Self::with_config(&config)
    }

    /// Discover an engine with an explicit configuration and start a session.
    pub fn with_config(config: &BridgeConfig) -> Result<Self> {
        let exe = discovery::discover(config).context("No usable engine found")?;
        let session = EngineSession::spawn(&exe, config)
            .with_context(|| format!("Failed to start engine {}", exe.display()))?;
        Ok(Self {
            session,
            engine: Some(exe),
        })
    }

    /// Wrap a session that is already running, e.g. one over a mock engine.
    pub fn with_session(session: EngineSession) -> Self {
        Self {
            session,
            engine: None,
        }
    }

    pub fn session(&self) -> &EngineSession {
        &self.session
    }

    /// Shut the engine down; errors from every cleanup step are reported.
    pub fn close(self) -> Result<()> {
        self.session.close().context("Engine shutdown was not clean")
    }

    /// Process a single line of input.
    /// Returns Ok(None) for empty input, Ok(Some(output)) for output to display,
    /// or Err carrying [`EXIT_SIGNAL`] when the REPL should exit.
    pub fn process_line(&mut self, line: &str) -> Result<Option<String>> {
        let trimmed = line.trim();

        if trimmed.starts_with('/') {
            return match self.handle_meta_command(trimmed) {
                MetaResult::Continue(output) => Ok(output),
                MetaResult::Exit => Err(anyhow::anyhow!(EXIT_SIGNAL)),
            };
        }

        // q() would stop the engine behind the session's back
        if matches!(trimmed, "quit" | "exit" | "q()" | "quit()") {
            return Err(anyhow::anyhow!(EXIT_SIGNAL));
        }

        if trimmed.is_empty() || trimmed.starts_with('#') {
            return Ok(None);
        }

        match self.session.execute(trimmed) {
            Ok(lines) if lines.is_empty() => Ok(None),
            Ok(lines) => Ok(Some(lines.join("\n"))),
            Err(e) => Ok(Some(format_error(&e))),
        }
    }

    /// Handle a meta-command (starts with /).
    fn handle_meta_command(&mut self, cmd: &str) -> MetaResult {
        let parts: Vec<&str> = cmd.split_whitespace().collect();
        let command = parts.first().copied().unwrap_or("");

        let output = match command {
            "/help" | "/h" | "/?" => Ok(HELP_TEXT.to_string()),
            "/quit" | "/q" | "/exit" => return MetaResult::Exit,
            "/vars" | "/v" => Ok(format::format_variables(&self.session.variables())),
            "/get" | "/matrix" => match parts.get(1) {
                Some(name) => self.show(name, command == "/matrix"),
                None => return usage("/get NAME"),
            },
            "/set" => match (parts.get(1), parts.len() > 2) {
                (Some(name), true) => self.set(name, &parts[2..].join(" ")),
                _ => return usage("/set NAME VALUE"),
            },
            "/call" => match parts.as_slice() {
                [_, target, function, args @ ..] => self.call(target, function, args),
                _ => return usage("/call TARGET FUNCTION [ARG...]"),
            },
            "/rm" => match parts.get(1) {
                Some(name) => self.session.dispose(name).map(|()| format!("removed {name}")),
                None => return usage("/rm NAME"),
            },
            "/fresh" => self.session.fresh_variable().map(|v| v.name),
            "/engine" => Ok(self.describe_engine()),
            _ => {
                return MetaResult::Continue(Some(format!(
                    "Unknown command: {}\nType /help for available commands.",
                    command
                )));
            }
        };

        match output {
            Ok(text) => MetaResult::Continue(Some(text)),
            Err(e) => MetaResult::Continue(Some(format_error(&e))),
        }
    }

    /// Read a variable back using the kind the registry recorded for it.
    fn show(&self, name: &str, as_matrix: bool) -> BridgeResult<String> {
        let ty = self.session.variable_type(name);
        if as_matrix || ty == Some(ValueType::Matrix) {
            return self.session.get_matrix(name).map(|m| format::format_matrix(&m));
        }
        match ty {
            Some(ValueType::Vector) => self.session.get_matrix(name).map(|m| format::format_vector(&m)),
            _ => self.session.get_scalar(name).map(|s| format::format_scalar(&s)),
        }
    }

    fn set(&self, name: &str, text: &str) -> BridgeResult<String> {
        let value = match parse_value(text) {
            Ok(value) => value,
            Err(reason) => return Ok(format!("Cannot parse value: {reason}")),
        };
        let var = match value {
            InputValue::Scalar(s) => self.session.set_scalar(name, s)?,
            InputValue::Vector(v) => self.session.set_matrix(name, &v, true)?,
            InputValue::Matrix(m) => self.session.set_matrix(name, &m, false)?,
        };
        Ok(describe(&var))
    }

    fn call(&self, target: &str, function: &str, args: &[&str]) -> BridgeResult<String> {
        let Some(function) = NamedFunction::from_name(function) else {
            return Ok(format!("Unknown function: {function}"));
        };
        build_call(&self.session, target, function, args).map(|var| describe(&var))
    }

    fn describe_engine(&self) -> String {
        let engine = self
            .engine
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(attached session)".to_string());
        format!(
            "engine:    {}\ntemp dir:  {}\nvariables: {}",
            engine,
            self.session.temp_dir().display(),
            self.session.variables().len()
        )
    }
}

/// Assign `target <- function(args...)` through the scope builder.
///
/// Numeric and `TRUE`/`FALSE` arguments are literals; anything else names
/// a variable the session already knows.
pub fn build_call(
    session: &EngineSession,
    target: &str,
    function: NamedFunction,
    args: &[&str],
) -> BridgeResult<Variable> {
    let mut assignment = session.assign(target)?;
    {
        let mut expression = assignment.expression()?;
        let mut call = expression.function(function)?;
        for arg in args {
            match parse_scalar(arg) {
                Some(value) => call.literal_arg(value)?,
                None => call.variable_arg(arg)?,
            }
        }
        call.close()?;
        expression.close()?;
    }
    assignment.close()
}

/// Parse a scalar: `TRUE`/`FALSE`, an integer, or a double.
pub fn parse_scalar(text: &str) -> Option<Scalar> {
    match text {
        "TRUE" | "true" => return Some(Scalar::Bool(true)),
        "FALSE" | "false" => return Some(Scalar::Bool(false)),
        _ => {}
    }
    if let Ok(n) = text.parse::<i64>() {
        return Some(Scalar::Long(n));
    }
    match text {
        "Inf" => Some(Scalar::Double(f64::INFINITY)),
        "-Inf" => Some(Scalar::Double(f64::NEG_INFINITY)),
        "NaN" => Some(Scalar::Double(f64::NAN)),
        // Words like `inf` or `nan` are variable names here
        _ if text.chars().any(|c| c.is_ascii_alphabetic() && !matches!(c, 'e' | 'E')) => None,
        _ => text.parse::<f64>().ok().map(Scalar::Double),
    }
}

/// Parse the value part of `/set`.
///
/// One token is a scalar, several tokens a vector, and `;`-separated rows
/// a matrix. Elements may be separated by spaces or commas.
pub fn parse_value(text: &str) -> Result<InputValue, String> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    if let [single] = tokens.as_slice()
        && !single.contains([',', ';'])
    {
        return parse_scalar(single)
            .map(InputValue::Scalar)
            .ok_or_else(|| format!("not a number: {single}"));
    }

    let rows: Vec<Vec<f64>> = text
        .split(';')
        .map(|row| {
            row.split(|c: char| c == ',' || c.is_whitespace())
                .filter(|t| !t.is_empty())
                .map(parse_element)
                .collect::<Result<Vec<_>, _>>()
        })
        .collect::<Result<_, _>>()?;

    if text.contains(';') {
        return Matrix::from_rows(rows).map(InputValue::Matrix).map_err(|e| e.to_string());
    }

    let values = rows.into_iter().flatten().collect();
    Ok(InputValue::Vector(Matrix::column(values)))
}

fn parse_element(token: &str) -> Result<f64, String> {
    match parse_scalar(token) {
        Some(Scalar::Double(d)) => Ok(d),
        Some(Scalar::Long(n)) => Ok(n as f64),
        Some(Scalar::Bool(_)) | None => Err(format!("not a number: {token}")),
    }
}

fn describe(var: &Variable) -> String {
    format!("{}: {}", var.name, var.ty)
}

fn usage(text: &str) -> MetaResult {
    MetaResult::Continue(Some(format!("Usage: {text}")))
}

fn format_error(e: &BridgeError) -> String {
    if e.is_fatal() {
        format!("Error: {e}\nThe engine session is gone; restart rbridge.")
    } else {
        format!("Error: {e}")
    }
}

const HELP_TEXT: &str = r#"rbridge REPL

Anything not starting with / is sent to the engine as a script and its
printed output is shown.

Meta Commands:
  /help, /h, /?           Show this help
  /quit, /q, /exit        Exit the REPL (also: quit, exit, q())
  /vars, /v               List bridged variables and their kinds
  /get NAME               Read a variable back using its recorded kind
  /matrix NAME            Read a variable back as a matrix
  /set NAME VALUE         Bind a value:
                            /set x 2.5         double
                            /set n 7           long
                            /set b TRUE        boolean
                            /set v 1 2 3       vector
                            /set m 1 2; 3 4    matrix (rows split by ;)
  /call TARGET FN ARGS    Assign TARGET <- FN(ARGS); FN is one of
                            + - * / %*% t solve det sum mean length
  /rm NAME                Remove a variable from the engine
  /fresh                  Reserve an unused variable name
  /engine                 Show the engine executable and temp directory

Examples:
  /set a 2 0; 0 4
  /call d det a
  /get d
  print(solve(a))
"#;

/// Save REPL history to disk.
fn save_history(rl: &mut Editor<(), DefaultHistory>, history_path: &Path) {
    if let Some(parent) = history_path.parent()
        && let Err(e) = std::fs::create_dir_all(parent)
    {
        tracing::warn!("Failed to create history directory: {}", e);
    }
    if let Err(e) = rl.save_history(history_path) {
        tracing::warn!("Failed to save history: {}", e);
    }
}

/// Run the REPL.
pub fn run() -> Result<()> {
    println!("rbridge v{}", env!("CARGO_PKG_VERSION"));
    println!("Type /help for commands, /quit to exit.");

    let mut rl: Editor<(), DefaultHistory> =
        Editor::new().context("Failed to create editor")?;

    let history_path = paths::history_file();
    if let Err(e) = rl.load_history(&history_path) {
        // Missing history is expected on first run
        let is_not_found = matches!(&e, ReadlineError::Io(io_err) if io_err.kind() == std::io::ErrorKind::NotFound);
        if !is_not_found {
            tracing::warn!("Failed to load history: {}", e);
        }
    }

    let mut repl = Repl::new()?;
    println!();

    loop {
        match rl.readline("rbridge> ") {
            Ok(line) => {
                if let Err(e) = rl.add_history_entry(line.as_str()) {
                    tracing::warn!("Failed to add history entry: {}", e);
                }

                match repl.process_line(&line) {
                    Ok(Some(output)) => println!("{}", output),
                    Ok(None) => {}
                    Err(e) if e.to_string() == EXIT_SIGNAL => break,
                    Err(e) => eprintln!("Error: {}", e),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("^D");
                break;
            }
            Err(err) => {
                eprintln!("Error: {}", err);
                break;
            }
        }
    }

    save_history(&mut rl, &history_path);
    repl.close()
}
