//! Pure data types for rbridge: value kinds, scalars, matrices.
//!
//! This crate is a leaf dependency with no process handling and no I/O.
//! It exists so that consumers (report generators, chart code) can work with
//! values fetched from the engine without pulling in the kernel.

pub mod matrix;
pub mod value;

// Flat re-exports for convenience
pub use matrix::*;
pub use value::*;
