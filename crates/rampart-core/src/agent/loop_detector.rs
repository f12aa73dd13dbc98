//! No-progress tool loop detection.
//!
//! Fingerprints every tool invocation and its result over a bounded
//! per-run history. Only *identical arguments producing identical output
//! repeatedly* counts as a stuck loop: differing arguments mean the model
//! is trying new things, differing results mean it is making progress
//! (e.g. paginating), and neither may trigger a signal.

use std::collections::VecDeque;

use serde_json::Value;

use crate::agent::canonical::{hash_result, hash_tool_call};

/// Thresholds and history bounds, injected at construction.
#[derive(Debug, Clone)]
pub struct LoopDetectorConfig {
    /// Sliding window of recent tool calls kept per run.
    pub history_capacity: usize,
    /// Identical (args, result) repeats before the model is warned.
    pub warning_threshold: usize,
    /// Identical repeats before the run must stop.
    pub critical_threshold: usize,
}

impl Default for LoopDetectorConfig {
    fn default() -> Self {
        Self {
            history_capacity: 30,
            warning_threshold: 5,
            critical_threshold: 10,
        }
    }
}

/// Severity of a detected loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopLevel {
    /// Inject the message into the conversation and keep going.
    Warning,
    /// Stop the run; the message is its terminal output.
    Critical,
}

/// A flagged no-progress loop.
#[derive(Debug, Clone)]
pub struct LoopDetection {
    pub level: LoopLevel,
    pub message: String,
}

#[derive(Debug, Clone)]
struct ToolCallRecord {
    tool_name: String,
    args_hash: String,
    /// Empty until the matching result arrives.
    result_hash: String,
}

/// Per-run detector state. Owned by exactly one run, never shared.
#[derive(Debug)]
pub struct LoopDetector {
    config: LoopDetectorConfig,
    history: VecDeque<ToolCallRecord>,
}

impl Default for LoopDetector {
    fn default() -> Self {
        Self::new(LoopDetectorConfig::default())
    }
}

impl LoopDetector {
    pub fn new(config: LoopDetectorConfig) -> Self {
        let capacity = config.history_capacity;
        Self {
            config,
            history: VecDeque::with_capacity(capacity),
        }
    }

    /// Record an outgoing tool call. Returns the argument fingerprint the
    /// caller passes back to `record_result` and `detect`.
    pub fn record(&mut self, tool_name: &str, args: &Value) -> String {
        let args_hash = hash_tool_call(tool_name, args);
        self.history.push_back(ToolCallRecord {
            tool_name: tool_name.to_string(),
            args_hash: args_hash.clone(),
            result_hash: String::new(),
        });
        while self.history.len() > self.config.history_capacity {
            self.history.pop_front();
        }
        args_hash
    }

    /// Attach a result to the most recent unresolved call with this
    /// fingerprint. Unknown fingerprints are ignored so an evicted or
    /// out-of-order result can never fail the run.
    pub fn record_result(&mut self, args_hash: &str, result_content: &str) {
        let result_hash = hash_result(result_content);
        for record in self.history.iter_mut().rev() {
            if record.args_hash == args_hash && record.result_hash.is_empty() {
                record.result_hash = result_hash;
                return;
            }
        }
    }

    /// Check whether this call signature is looping.
    ///
    /// The most recent resolved record with this fingerprint fixes the
    /// reference result; only matches sharing that exact result are counted.
    pub fn detect(&self, tool_name: &str, args_hash: &str) -> Option<LoopDetection> {
        if self.history.len() < self.config.warning_threshold {
            return None;
        }

        let mut reference: Option<&str> = None;
        let mut count = 0usize;
        for record in self.history.iter().rev() {
            if record.args_hash != args_hash || record.result_hash.is_empty() {
                continue;
            }
            match reference {
                None => {
                    reference = Some(&record.result_hash);
                    count = 1;
                }
                Some(hash) if record.result_hash == hash => count += 1,
                Some(_) => {}
            }
        }

        if count >= self.config.critical_threshold {
            Some(LoopDetection {
                level: LoopLevel::Critical,
                message: format!(
                    "Tool '{}' returned the exact same result {} times with identical arguments. \
                     Stopping the run: no progress is being made.",
                    tool_name, count
                ),
            })
        } else if count >= self.config.warning_threshold {
            Some(LoopDetection {
                level: LoopLevel::Warning,
                message: format!(
                    "Tool '{}' has returned an identical result {} times with identical arguments. \
                     A different strategy is required.",
                    tool_name, count
                ),
            })
        } else {
            None
        }
    }
}
