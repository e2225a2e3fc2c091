//! Pipe transport for the recognizer messaging substrate.
//!
//! This is the lowest layer of recmux. It provides:
//! - [`PipeEnd`], an owned, close-on-exec pipe descriptor that implements
//!   `Read + Write` and can be switched to non-blocking mode
//! - [`FdSet`] and [`select`], a thin wrapper over the `select(2)` readiness wait
//!
//! Everything above this layer works on these two building blocks.

#![cfg(unix)]

pub mod error;
pub mod pipe;
pub mod select;

pub use error::{Result, TransportError};
pub use pipe::{pipe, PipeEnd};
pub use select::{select, FdSet, MAX_SELECT_FD};
