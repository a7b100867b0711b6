//! Tracing setup shared by the cors-relay binaries: fmt logging to stderr,
//! optional OTLP span export, and span builder macros.

pub mod config;
pub mod otlp;
pub mod spans;

pub use config::{OtlpProtocol, TracingConfig};
pub use otlp::{init_tracing, TracingGuard};
