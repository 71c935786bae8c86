//! End-to-end tests for the mechanic crates live in `tests/`.
