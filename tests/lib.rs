//! Shared fixtures for Tether integration tests

pub mod fixtures;
