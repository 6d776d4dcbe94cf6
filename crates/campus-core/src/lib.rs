//! Cross-cutting plumbing shared by Campus services: tracing setup, health
//! probes, request ids, wire helpers and the gateway identity extractor.

pub mod health;
pub mod identity;
pub mod middleware;
pub mod serde;
pub mod tracing;
