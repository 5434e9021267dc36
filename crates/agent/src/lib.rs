//! Agent runtime for catalog questions.
//!
//! The model never answers from memory: every answer is driven through a tool
//! loop over read-only catalog lookups.
//!
//! - `llm`: model boundary and the Messages API client
//! - `tools`: the catalog tool set and the parallel dispatcher
//! - `session`: per-question transcript and round limits
//! - `guardrails`: checks applied before an answer goes out
//! - `runtime`: the loop itself

pub mod guardrails;
pub mod llm;
pub mod prompts;
pub mod runtime;
pub mod session;
pub mod tools;

pub use guardrails::{AnswerCheck, GuardrailDecision, GuardrailPolicy};
pub use llm::{AnthropicClient, LlmClient, LlmError, LlmRequest, LlmResponse, ToolChoice, ToolSchema};
pub use runtime::{AgentAnswer, AgentRuntime, AnswerOutcome, RuntimeSettings};
pub use session::{RoundLimits, Session};
pub use tools::{CatalogTool, ToolError, ToolRegistry};
