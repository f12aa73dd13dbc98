//! Conversation repair for signature-echo providers.
//!
//! One provider family issues an opaque signature with each tool call and
//! rejects a resent conversation unless every call echoes it back. An
//! upstream model sometimes drops the signature, so the affected calls
//! cannot be resent as tool calls at all; collapse them to plain text and
//! fold their results into a single synthetic user message instead.

use std::collections::HashSet;

use tracing::debug;

use crate::ai::types::{ModelMessage, Role, ToolCall};

/// Metadata key under which the provider's echo token is stored.
pub const SIGNATURE_KEY: &str = "signature";

fn has_signature(call: &ToolCall) -> bool {
    call.metadata
        .get(SIGNATURE_KEY)
        .and_then(|v| v.as_str())
        .is_some_and(|s| !s.is_empty())
}

/// Rewrite messages so no tool call missing its echo token is resent.
/// Returns the input unchanged when every call carries its token.
///
/// Collapse is all-or-nothing per assistant message: partial echo is not a
/// state the provider accepts, so one missing signature flags every call id
/// in that message.
pub fn normalize_tool_signatures(messages: Vec<ModelMessage>) -> Vec<ModelMessage> {
    let mut flagged: HashSet<String> = HashSet::new();
    for msg in &messages {
        if msg.role == Role::Assistant
            && !msg.tool_calls.is_empty()
            && msg.tool_calls.iter().any(|call| !has_signature(call))
        {
            flagged.extend(msg.tool_calls.iter().map(|call| call.id.clone()));
        }
    }
    if flagged.is_empty() {
        return messages;
    }
    debug!(
        flagged = flagged.len(),
        "Collapsing tool calls missing signature tokens"
    );

    let mut result = Vec::with_capacity(messages.len());
    let mut iter = messages.into_iter().peekable();

    while let Some(msg) = iter.next() {
        let collapse = msg.role == Role::Assistant
            && msg.tool_calls.iter().any(|call| flagged.contains(&call.id));

        if !collapse {
            // A result referencing a collapsed call that was not consumed
            // below would arrive orphaned; dropping it is the safe option.
            if msg.role == Role::Tool
                && msg
                    .tool_call_id
                    .as_ref()
                    .is_some_and(|id| flagged.contains(id))
            {
                debug!(tool_call_id = ?msg.tool_call_id, "Dropping orphaned tool result");
                continue;
            }
            result.push(msg);
            continue;
        }

        let ids: HashSet<String> = msg.tool_calls.iter().map(|call| call.id.clone()).collect();

        if !msg.content.trim().is_empty() {
            result.push(ModelMessage::text(Role::Assistant, msg.content));
        }

        // Consume the results that immediately follow this message and
        // fold them into one synthetic user message.
        let mut combined: Vec<String> = Vec::new();
        while let Some(next) = iter.next_if(|m| {
            m.role == Role::Tool
                && m.tool_call_id
                    .as_ref()
                    .is_some_and(|id| ids.contains(id))
        }) {
            let text = next.content.trim();
            if !text.is_empty() {
                combined.push(text.to_string());
            }
        }
        if !combined.is_empty() {
            result.push(ModelMessage::text(Role::User, combined.join("\n\n")));
        }
    }

    result
}
