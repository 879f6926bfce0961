//! Crate-level tests.

mod behaviour;
#[cfg(unix)]
mod support;
