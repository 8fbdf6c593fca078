//! Helpers for tests that need a throwaway ledger on disk

pub mod test_utils;

pub use test_utils::*;
