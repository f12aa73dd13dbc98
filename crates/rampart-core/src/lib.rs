//! Core library for Rampart - run resilience and quality gates
//!
//! Protects long-running, tool-calling agent work in three ways:
//! - `agent::LoopDetector` - flags no-progress tool loops before a run
//!   burns its budget re-running the same call
//! - `ai::retry` - absorbs transient provider failures with jittered
//!   exponential backoff and server-supplied Retry-After overrides
//! - `agent::hooks::HookEngine` - gates delegated work against configured
//!   quality checks (shell commands or reviewer agents)
//!
//! `ai::normalize` additionally repairs conversations that violate a
//! provider's signature-echo requirement before they are resent.

pub mod agent;
pub mod ai;
