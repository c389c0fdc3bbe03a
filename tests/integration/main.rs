//! Integration tests for Group-Harvest
//!
//! The collection tests drive the coordinator through fake tabs; the HTTP
//! tests use wiremock to serve group pages end-to-end.

mod common;
mod control_tests;
mod coordinator_tests;
mod http_tests;
