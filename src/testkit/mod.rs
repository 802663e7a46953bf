//! Shared fixtures for unit tests
//!
//! Throwaway ledgers in temporary directories, mined at a low target so tests
//! finish quickly.

pub mod test_utils;

pub use test_utils::*;
