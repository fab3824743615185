//! Stdio JSON-RPC client for agent subprocesses.
//!
//! One [`AcpClient`] owns one long-lived agent process: its pipes, a stdout
//! reader that correlates responses and routes streaming chunks, a stderr
//! drain, and the session registry that keeps backend conversations alive
//! across prompt calls sharing a session key.

mod client;
mod launch;

pub use client::{AcpClient, CONTROL_TIMEOUT, PROMPT_TIMEOUT};
pub use launch::LaunchSpec;
