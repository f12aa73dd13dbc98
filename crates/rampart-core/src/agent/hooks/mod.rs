//! Quality-gate evaluation for delegated work.
//!
//! Gates ("hooks") are declarative checks run against the output of a unit
//! of work before it is trusted. A gate either runs a shell command or
//! delegates the judgment to a reviewer agent; custom evaluators can be
//! registered under new type tags.
//!
//! Gates run strictly sequentially so a cheap blocking failure pre-empts
//! later, possibly expensive, gates. A gate malfunction (unknown type,
//! evaluator error) is logged and skipped - it must never block the run
//! outright.

mod command;
mod delegate;

pub use command::CommandEvaluator;
pub use delegate::{DelegateEvaluator, DelegateScope, ReviewerDelegate};

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Seconds a gate may run when its config leaves the timeout unset.
pub const DEFAULT_HOOK_TIMEOUT_SECS: u64 = 60;

/// Declarative gate configuration, supplied externally and read-only to
/// the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookConfig {
    /// Lifecycle event this gate applies to.
    pub event: String,
    /// Evaluator type tag ("command", "delegate", or a registered custom tag).
    #[serde(rename = "type")]
    pub hook_type: String,
    /// Shell command, for command gates.
    #[serde(default)]
    pub command: Option<String>,
    /// Reviewer agent key, for delegate gates.
    #[serde(default)]
    pub agent_key: Option<String>,
    /// Whether a failure blocks acceptance of the work.
    #[serde(default)]
    pub block_on_failure: bool,
    /// Remediation attempts the caller may make after a blocking failure.
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

impl HookConfig {
    /// Per-gate timeout, falling back to the 60s default.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds.unwrap_or(DEFAULT_HOOK_TIMEOUT_SECS))
    }
}

/// Everything an evaluator may need about the work under review. Built
/// fresh per evaluation, never retained.
#[derive(Debug, Clone, Default)]
pub struct HookContext {
    pub event: String,
    pub source_agent: String,
    pub target_agent: String,
    pub user_id: String,
    /// Output under review.
    pub content: String,
    /// Original instruction that produced the output.
    pub task: String,
    pub metadata: HashMap<String, String>,
}

/// Verdict from a single gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookOutcome {
    pub passed: bool,
    /// Populated on failure; fed back to the worker on a retry.
    pub feedback: String,
}

impl HookOutcome {
    pub fn pass() -> Self {
        Self {
            passed: true,
            feedback: String::new(),
        }
    }

    pub fn fail(feedback: impl Into<String>) -> Self {
        Self {
            passed: false,
            feedback: feedback.into(),
        }
    }
}

/// Errors surfaced by `evaluate_one`. `evaluate_all` tolerates both cases.
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error("unknown hook type '{0}'")]
    UnknownHookType(String),
    #[error(transparent)]
    Evaluator(#[from] anyhow::Error),
}

/// A pluggable gate evaluator.
#[async_trait]
pub trait HookEvaluator: Send + Sync {
    /// Judge the work in `ctx` against `hook`. An `Err` means the evaluator
    /// itself failed (spawn failure, delegate unreachable), not that the
    /// work was rejected.
    async fn evaluate(&self, hook: &HookConfig, ctx: &HookContext)
        -> anyhow::Result<HookOutcome>;
}

/// Registry and sequential runner for gate evaluators.
pub struct HookEngine {
    evaluators: HashMap<String, Arc<dyn HookEvaluator>>,
}

impl Default for HookEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl HookEngine {
    /// An empty engine with no evaluators registered.
    pub fn new() -> Self {
        Self {
            evaluators: HashMap::new(),
        }
    }

    /// An engine with the built-in command and delegate evaluators.
    pub fn with_builtins(workdir: impl Into<PathBuf>, delegate: Arc<dyn ReviewerDelegate>) -> Self {
        let mut engine = Self::new();
        engine.register("command", Arc::new(CommandEvaluator::new(workdir)));
        engine.register("delegate", Arc::new(DelegateEvaluator::new(delegate)));
        engine
    }

    /// Register an evaluator under a type tag, replacing any existing one.
    pub fn register(&mut self, hook_type: impl Into<String>, evaluator: Arc<dyn HookEvaluator>) {
        self.evaluators.insert(hook_type.into(), evaluator);
    }

    /// Run every gate configured for `event`, in configured order.
    ///
    /// The first blocking failure is returned immediately and later gates
    /// are not evaluated. Non-blocking failures are logged and skipped, as
    /// are unknown hook types and evaluator malfunctions. An empty or
    /// fully-passing list yields a pass.
    pub async fn evaluate_all(
        &self,
        hooks: &[HookConfig],
        event: &str,
        ctx: &HookContext,
    ) -> HookOutcome {
        for hook in hooks {
            if hook.event != event {
                continue;
            }

            let Some(evaluator) = self.evaluators.get(&hook.hook_type) else {
                warn!(
                    hook_type = %hook.hook_type,
                    event,
                    "No evaluator registered for hook type, skipping"
                );
                continue;
            };

            let outcome = match evaluator.evaluate(hook, ctx).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(
                        hook_type = %hook.hook_type,
                        event,
                        error = %e,
                        "Hook evaluator failed, skipping"
                    );
                    continue;
                }
            };

            if outcome.passed {
                continue;
            }
            if hook.block_on_failure {
                info!(
                    hook_type = %hook.hook_type,
                    event,
                    feedback = %outcome.feedback,
                    "Blocking hook failed"
                );
                return outcome;
            }
            warn!(
                hook_type = %hook.hook_type,
                event,
                feedback = %outcome.feedback,
                "Non-blocking hook failed, continuing"
            );
        }

        HookOutcome::pass()
    }

    /// Run exactly one gate, surfacing infrastructure problems to the
    /// caller. Intended for callers running their own retry-with-feedback
    /// loop against a single gate after a remediation attempt.
    pub async fn evaluate_one(
        &self,
        hook: &HookConfig,
        ctx: &HookContext,
    ) -> Result<HookOutcome, HookError> {
        let evaluator = self
            .evaluators
            .get(&hook.hook_type)
            .ok_or_else(|| HookError::UnknownHookType(hook.hook_type.clone()))?;
        Ok(evaluator.evaluate(hook, ctx).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedEvaluator {
        outcome: HookOutcome,
        calls: AtomicUsize,
    }

    impl FixedEvaluator {
        fn new(outcome: HookOutcome) -> Arc<Self> {
            Arc::new(Self {
                outcome,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl HookEvaluator for FixedEvaluator {
        async fn evaluate(
            &self,
            _hook: &HookConfig,
            _ctx: &HookContext,
        ) -> anyhow::Result<HookOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.outcome.clone())
        }
    }

    struct BrokenEvaluator;

    #[async_trait]
    impl HookEvaluator for BrokenEvaluator {
        async fn evaluate(
            &self,
            _hook: &HookConfig,
            _ctx: &HookContext,
        ) -> anyhow::Result<HookOutcome> {
            Err(anyhow::anyhow!("evaluator infrastructure is down"))
        }
    }

    fn hook(hook_type: &str, event: &str, blocking: bool) -> HookConfig {
        HookConfig {
            event: event.to_string(),
            hook_type: hook_type.to_string(),
            command: None,
            agent_key: None,
            block_on_failure: blocking,
            max_retries: 0,
            timeout_seconds: None,
        }
    }

    #[tokio::test]
    async fn blocking_failure_short_circuits() {
        let failing = FixedEvaluator::new(HookOutcome::fail("not good enough"));
        let later = FixedEvaluator::new(HookOutcome::pass());

        let mut engine = HookEngine::new();
        engine.register("lint", failing.clone());
        engine.register("review", later.clone());

        let hooks = vec![hook("lint", "done", true), hook("review", "done", true)];
        let outcome = engine.evaluate_all(&hooks, "done", &HookContext::default()).await;

        assert!(!outcome.passed);
        assert_eq!(outcome.feedback, "not good enough");
        assert_eq!(later.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn non_blocking_failure_continues_to_overall_pass() {
        let failing = FixedEvaluator::new(HookOutcome::fail("style nit"));
        let passing = FixedEvaluator::new(HookOutcome::pass());

        let mut engine = HookEngine::new();
        engine.register("lint", failing);
        engine.register("review", passing.clone());

        let hooks = vec![hook("lint", "done", false), hook("review", "done", true)];
        let outcome = engine.evaluate_all(&hooks, "done", &HookContext::default()).await;

        assert!(outcome.passed);
        assert_eq!(passing.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn non_matching_events_are_skipped() {
        let evaluator = FixedEvaluator::new(HookOutcome::fail("should not run"));
        let mut engine = HookEngine::new();
        engine.register("lint", evaluator.clone());

        let hooks = vec![hook("lint", "other_event", true)];
        let outcome = engine.evaluate_all(&hooks, "done", &HookContext::default()).await;

        assert!(outcome.passed);
        assert_eq!(evaluator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_type_is_tolerated_in_evaluate_all() {
        let engine = HookEngine::new();
        let hooks = vec![hook("nonexistent", "done", true)];
        let outcome = engine.evaluate_all(&hooks, "done", &HookContext::default()).await;
        assert!(outcome.passed);
    }

    #[tokio::test]
    async fn evaluator_error_is_tolerated_in_evaluate_all() {
        let mut engine = HookEngine::new();
        engine.register("broken", Arc::new(BrokenEvaluator));

        let hooks = vec![hook("broken", "done", true)];
        let outcome = engine.evaluate_all(&hooks, "done", &HookContext::default()).await;
        assert!(outcome.passed);
    }

    #[tokio::test]
    async fn unknown_type_is_an_error_in_evaluate_one() {
        let engine = HookEngine::new();
        let result = engine
            .evaluate_one(&hook("nonexistent", "done", true), &HookContext::default())
            .await;
        assert!(matches!(result, Err(HookError::UnknownHookType(t)) if t == "nonexistent"));
    }

    #[tokio::test]
    async fn evaluator_error_surfaces_in_evaluate_one() {
        let mut engine = HookEngine::new();
        engine.register("broken", Arc::new(BrokenEvaluator));

        let result = engine
            .evaluate_one(&hook("broken", "done", true), &HookContext::default())
            .await;
        assert!(matches!(result, Err(HookError::Evaluator(_))));
    }

    #[test]
    fn hook_config_deserializes_with_defaults() {
        let config: HookConfig = serde_json::from_str(
            r#"{"event": "task_complete", "type": "command", "command": "true"}"#,
        )
        .expect("minimal config should parse");
        assert!(!config.block_on_failure);
        assert_eq!(config.max_retries, 0);
        assert_eq!(config.timeout(), Duration::from_secs(60));
    }

    #[test]
    fn explicit_timeout_wins() {
        let config = HookConfig {
            timeout_seconds: Some(5),
            ..hook("command", "done", false)
        };
        assert_eq!(config.timeout(), Duration::from_secs(5));
    }
}
