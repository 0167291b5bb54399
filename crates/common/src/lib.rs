//! Common utilities and types shared across the classroom session crates.

#![warn(clippy::pedantic)]

/// Module for session and participant identifiers
pub mod types;

/// Module for common configuration
pub mod config;

/// Module for secret types that prevent accidental logging
pub mod secret;

/// Module for exchanging a participant identity for a transport session token
pub mod token_issuer;
