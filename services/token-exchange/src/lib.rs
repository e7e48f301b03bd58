//! Token exchange service library crate.
//!
//! # Purpose
//! Exposes the passport broker, its collaborator clients, configuration, and
//! the HTTP router for use by the binary and by integration tests.
//!
//! # Notes
//! The broker signs two kinds of passport with the same key: an intermediate
//! one presented to the visa issuer, and the final one returned to callers.
//! They differ only in `iss` and in whether visas are embedded.
pub mod api;
pub mod app;
pub mod broker;
pub mod config;
pub mod directory;
pub mod visa_client;
