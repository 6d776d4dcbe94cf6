//! Test utilities for Campus services.
//!
//! For `#[cfg(test)]` blocks and `tests/` only.

pub mod auth;
