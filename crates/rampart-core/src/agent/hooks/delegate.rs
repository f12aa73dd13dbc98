//! Reviewer-delegation gate evaluator.
//!
//! Delegates the quality judgment to a second, independent agent
//! invocation. The reviewer answers in plain text: `APPROVED` (optionally
//! followed by comments) or `REJECTED: <feedback>`.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;

use super::{HookConfig, HookContext, HookEvaluator, HookOutcome};

/// Marker a rejecting reviewer must include. Matched case-insensitively;
/// the feedback after it keeps its original casing.
const REJECTED_MARKER: &str = "REJECTED:";

/// Scope threaded into a delegated invocation.
#[derive(Debug, Clone, Default)]
pub struct DelegateScope {
    /// Suppresses gate evaluation of the reviewer's own output. Without
    /// this, the reviewer's response would re-enter the gate engine and
    /// recurse indefinitely.
    pub suppress_gates: bool,
}

/// Runs a unit of work on behalf of the gate engine. Supplied by the layer
/// that owns agent identity and registry resolution; the engine never
/// resolves agents itself.
#[async_trait]
pub trait ReviewerDelegate: Send + Sync {
    async fn review(&self, scope: &DelegateScope, agent_key: &str, task: &str) -> Result<String>;
}

/// Runs a gate by asking a reviewer agent for a verdict.
pub struct DelegateEvaluator {
    delegate: Arc<dyn ReviewerDelegate>,
}

impl DelegateEvaluator {
    pub fn new(delegate: Arc<dyn ReviewerDelegate>) -> Self {
        Self { delegate }
    }
}

#[async_trait]
impl HookEvaluator for DelegateEvaluator {
    async fn evaluate(&self, hook: &HookConfig, ctx: &HookContext) -> Result<HookOutcome> {
        let agent_key = hook
            .agent_key
            .as_deref()
            .context("delegate hook has no agent_key configured")?;

        let prompt = build_review_prompt(ctx);
        let scope = DelegateScope {
            suppress_gates: true,
        };
        let response = self
            .delegate
            .review(&scope, agent_key, &prompt)
            .await
            .context("reviewer delegate call failed")?;
        debug!(agent_key, response_len = response.len(), "Reviewer responded");

        Ok(parse_review_response(&response))
    }
}

fn build_review_prompt(ctx: &HookContext) -> String {
    format!(
        "You are reviewing the output of a delegated task.\n\n\
         Original task (from {source} to {target}):\n{task}\n\n\
         Output to review:\n{content}\n\n\
         Respond with exactly one of:\n\
         - \"APPROVED\" (optionally followed by comments)\n\
         - \"REJECTED: <feedback explaining what must change>\"",
        source = ctx.source_agent,
        target = ctx.target_agent,
        task = ctx.task,
        content = ctx.content,
    )
}

fn parse_review_response(response: &str) -> HookOutcome {
    let trimmed = response.trim();
    // ASCII uppercasing keeps byte offsets aligned with the original text,
    // so marker positions can index into `trimmed` directly.
    let matchable = trimmed.to_ascii_uppercase();

    if matchable.starts_with("APPROVED") {
        return HookOutcome::pass();
    }
    if let Some(pos) = matchable.find(REJECTED_MARKER) {
        let feedback = trimmed[pos + REJECTED_MARKER.len()..].trim();
        return HookOutcome::fail(feedback);
    }
    // No marker at all: treat the whole response as the feedback.
    HookOutcome::fail(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct ScriptedReviewer {
        response: String,
        seen_scope: Mutex<Option<DelegateScope>>,
        seen_task: Mutex<Option<String>>,
    }

    impl ScriptedReviewer {
        fn new(response: &str) -> Arc<Self> {
            Arc::new(Self {
                response: response.to_string(),
                seen_scope: Mutex::new(None),
                seen_task: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl ReviewerDelegate for ScriptedReviewer {
        async fn review(
            &self,
            scope: &DelegateScope,
            _agent_key: &str,
            task: &str,
        ) -> Result<String> {
            *self.seen_scope.lock().unwrap() = Some(scope.clone());
            *self.seen_task.lock().unwrap() = Some(task.to_string());
            Ok(self.response.clone())
        }
    }

    struct UnreachableReviewer;

    #[async_trait]
    impl ReviewerDelegate for UnreachableReviewer {
        async fn review(&self, _: &DelegateScope, _: &str, _: &str) -> Result<String> {
            Err(anyhow::anyhow!("reviewer agent is offline"))
        }
    }

    fn delegate_hook() -> HookConfig {
        HookConfig {
            event: "task_complete".to_string(),
            hook_type: "delegate".to_string(),
            command: None,
            agent_key: Some("reviewer".to_string()),
            block_on_failure: true,
            max_retries: 2,
            timeout_seconds: None,
        }
    }

    fn context() -> HookContext {
        HookContext {
            event: "task_complete".to_string(),
            source_agent: "lead".to_string(),
            target_agent: "worker".to_string(),
            content: "draft report".to_string(),
            task: "write the report".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn approved_with_comments_passes() {
        let outcome = parse_review_response("APPROVED, looks good");
        assert!(outcome.passed);
    }

    #[test]
    fn approval_match_is_case_insensitive() {
        assert!(parse_review_response("  approved").passed);
    }

    #[test]
    fn rejection_extracts_feedback_with_original_casing() {
        let outcome = parse_review_response("REJECTED: Missing citation");
        assert!(!outcome.passed);
        assert_eq!(outcome.feedback, "Missing citation");
    }

    #[test]
    fn rejection_marker_is_case_insensitive() {
        let outcome = parse_review_response("rejected: needs work");
        assert!(!outcome.passed);
        assert_eq!(outcome.feedback, "needs work");
    }

    #[test]
    fn markerless_response_becomes_the_feedback() {
        let outcome = parse_review_response("I am not sure about this one");
        assert!(!outcome.passed);
        assert_eq!(outcome.feedback, "I am not sure about this one");
    }

    #[tokio::test]
    async fn delegate_call_suppresses_recursive_gates() {
        let reviewer = ScriptedReviewer::new("APPROVED");
        let evaluator = DelegateEvaluator::new(reviewer.clone());

        let outcome = evaluator.evaluate(&delegate_hook(), &context()).await.unwrap();
        assert!(outcome.passed);

        let scope = reviewer.seen_scope.lock().unwrap().clone().unwrap();
        assert!(scope.suppress_gates);
    }

    #[tokio::test]
    async fn review_prompt_embeds_task_and_content() {
        let reviewer = ScriptedReviewer::new("APPROVED");
        let evaluator = DelegateEvaluator::new(reviewer.clone());
        evaluator.evaluate(&delegate_hook(), &context()).await.unwrap();

        let task = reviewer.seen_task.lock().unwrap().clone().unwrap();
        assert!(task.contains("write the report"));
        assert!(task.contains("draft report"));
        assert!(task.contains("lead"));
        assert!(task.contains("worker"));
        assert!(task.contains("REJECTED:"));
    }

    #[tokio::test]
    async fn unreachable_reviewer_is_an_infrastructure_error() {
        let evaluator = DelegateEvaluator::new(Arc::new(UnreachableReviewer));
        assert!(evaluator.evaluate(&delegate_hook(), &context()).await.is_err());
    }

    #[tokio::test]
    async fn missing_agent_key_is_an_infrastructure_error() {
        let reviewer = ScriptedReviewer::new("APPROVED");
        let evaluator = DelegateEvaluator::new(reviewer);
        let hook = HookConfig {
            agent_key: None,
            ..delegate_hook()
        };
        assert!(evaluator.evaluate(&hook, &context()).await.is_err());
    }
}
