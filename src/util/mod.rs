//! Shared utilities (hex dump formatting and concrete tag sinks).

pub mod hex;
pub mod sink;
