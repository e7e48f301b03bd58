//! Ambient plumbing shared by the visa issuer and token exchange services.
//!
//! # Purpose
//! Keeps tracing, OpenTelemetry propagation, Prometheus metrics, and the
//! JSON error envelope identical across services so logs, traces, and error
//! bodies line up when a request crosses from one service to the next.
pub mod error;
pub mod observability;
pub mod wellknown;

pub use error::{ApiError, ErrorResponse};
