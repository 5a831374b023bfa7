//! Shared fixtures for the Tessera integration tests.

pub mod helpers;
