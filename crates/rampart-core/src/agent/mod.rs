//! Run-protection components
//!
//! ## Loop Detection
//! - `LoopDetector` - per-run fingerprint history, warns on repeated
//!   identical tool calls and stops the run when they never progress
//!
//! ## Quality Gates
//! - `HookEngine` - registry of gate evaluators, sequential evaluation
//! - `CommandEvaluator` - shell-command gates
//! - `DelegateEvaluator` - reviewer-agent gates

pub mod canonical;
pub mod hooks;
pub mod loop_detector;

pub use hooks::{
    CommandEvaluator, DelegateEvaluator, DelegateScope, HookConfig, HookContext, HookEngine,
    HookError, HookEvaluator, HookOutcome, ReviewerDelegate,
};
pub use loop_detector::{LoopDetection, LoopDetector, LoopDetectorConfig, LoopLevel};
