//! Visa issuer service library crate.
//!
//! # Purpose
//! Exposes the issuance core, configuration, group loading, and HTTP router
//! for use by the binary and by tests, including the token exchange's
//! end-to-end tests, which run this service in-process.
//!
//! # Notes
//! The issuer is its own trust domain: it publishes its own key set and
//! accepts a subject token only after verifying it against the key set the
//! token's header names.
pub mod api;
pub mod app;
pub mod config;
pub mod groups;
pub mod issuer;
