//! Identity contract integration
//!
//! Builds the contract and pep-module operations the agent submits and
//! interprets their execution results.

mod client;
pub mod messages;

pub use client::ContractClient;
