//! Library crate for mapvote-back, exposing modules for the binary and tests.

/// Configuration file loading and reload.
pub mod config;
/// Persisted records and the storage seam.
pub mod dao;
mod dto;
/// Service and HTTP error types.
pub mod error;
/// HTTP routes.
pub mod routes;
/// Round lifecycle, scheduling and game-server integration.
pub mod services;
/// Shared application state and the vote domain.
pub mod state;

#[cfg(test)]
mod test_support;
