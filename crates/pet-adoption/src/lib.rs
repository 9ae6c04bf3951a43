//! Pet adoption listings, adoption applications, and the workflow that keeps them consistent.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
