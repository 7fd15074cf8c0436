//! CampusCart authentication HTTP server.
//!
//! Thin HTTP shell over the [`campuscart`] library: routing, rate limiting,
//! cookie handling, and configuration. Exposed as a library so integration
//! tests can drive the full router in-process.

pub mod api;
pub mod config;
pub mod logging;
pub mod metrics;
