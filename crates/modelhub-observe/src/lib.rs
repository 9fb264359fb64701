//! Observability setup for the Model Routing Hub.
//!
//! Tracing subscriber initialization (structured fmt layer with optional
//! OpenTelemetry export) and the OTel GenAI semantic-convention attribute
//! constants used to instrument provider calls.

pub mod genai_attrs;
pub mod tracing_setup;
