//! Test utilities for rbridge.
//!
//! `MockEngine` stands in for the real engine process: it interprets the
//! script subset the bridge emits (assignments, `c`, `matrix`, `scan`,
//! arithmetic, `exists`, `cat`, `write.table`, `print`, `rm`, `q`) and
//! records every command it receives, so session tests can assert the exact
//! command stream without an engine installed.

pub mod engine;
pub mod interp;

pub use engine::{MockEngine, MockHandle};
pub use interp::Interpreter;

use rbridge_kernel::{BridgeConfig, BridgeResult, EngineSession};

/// A session over a fresh mock engine.
pub fn mock_session() -> BridgeResult<(EngineSession, MockHandle)> {
    mock_session_with(&BridgeConfig::default())
}

/// A session over a fresh mock engine with an explicit configuration.
pub fn mock_session_with(config: &BridgeConfig) -> BridgeResult<(EngineSession, MockHandle)> {
    let (transport, handle) = MockEngine::boxed();
    let session = EngineSession::with_transport(transport, config)?;
    Ok((session, handle))
}
