//! # periscope-client — Headless Stream Probe
//!
//! A thin shell around `periscope-core`: CLI parsing, TOML
//! configuration, tracing setup, and a probe codec backend that runs
//! the whole engine without a real decoder. Point it at a stream
//! server to check reachability, frame rate, bandwidth and stream
//! health before wiring up a full client.

pub mod config;
pub mod probe;
