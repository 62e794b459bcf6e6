//! Consolidated integration tests for permit-core.
//!
//! Upstream services are played by a `wiremock` server; secrets come from an
//! in-memory store.

mod clients;
mod pipeline;
mod support;
