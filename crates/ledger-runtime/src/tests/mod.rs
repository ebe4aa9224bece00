//! Integration tests for the ledger runtime
