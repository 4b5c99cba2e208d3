//! rbridge-kernel: drive an R-like math engine over its text pipes.
//!
//! This crate provides:
//!
//! - **Discovery**: find an engine executable on `PATH` and probe it
//! - **Session**: one engine process, its pipes, temp directory and variable registry
//! - **Scope**: nested assignment builder with drop-safe guards
//! - **Marshal**: scalar, vector and matrix literals, inline or spooled to a file
//! - **Protocol**: the line-oriented command set and reply decoding
//! - **Config**: TOML configuration with an environment override
//! - **Paths**: XDG-compliant path helpers

pub mod config;
pub mod discovery;
pub mod error;
pub mod literal;
pub mod marshal;
pub mod paths;
pub mod pending;
pub mod protocol;
pub mod scope;
pub mod session;
pub mod transport;

pub use config::BridgeConfig;
pub use error::{BridgeError, BridgeResult, CleanupError, ShutdownError, StateError};
pub use scope::{Assignment, Expression, Function, FunctionSpec, NamedFunction, Parameter};
pub use session::EngineSession;
pub use transport::{EngineTransport, ProcessTransport};

// Value types, so embedders need only one dependency
pub use rbridge_types::{Matrix, Scalar, ShapeError, ValueType, Variable};
