//! Provider-facing resilience layer
//!
//! Wraps outbound provider calls with retry/backoff and repairs
//! conversations that would violate a provider's signature-echo
//! requirement before they are resent.

pub mod error;
pub mod normalize;
pub mod retry;
pub mod types;

pub use error::{extract_status_from_error, AiError};
pub use normalize::{normalize_tool_signatures, SIGNATURE_KEY};
pub use types::{ModelMessage, Role, ToolCall};
