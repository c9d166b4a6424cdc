//! Codecritic library crate
//!
//! Exposes the review pipeline so the CLI, benchmarks and other hosts can
//! drive it without going through argument parsing.

pub mod cache;
pub mod client;
pub mod config;
pub mod eligibility;
pub mod error;
pub mod pipeline;
pub mod report;
pub mod retry;
pub mod review;
pub mod sinks;
pub mod util;
pub mod workspace;

#[cfg(test)]
mod test_support;
