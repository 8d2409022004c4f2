//! # System Call Handlers
//!
//! - `io`: console output and input, text color, clear screen
//! - `process`: getpid, fork, kill, the self-test call
//! - `time`: sleep, tick counter
//! - `memory`: physical page counters

pub mod io;
pub mod memory;
pub mod process;
pub mod time;
