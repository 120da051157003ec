//! Generation-side half of the negotiation engine.
//!
//! The policy decision is made upstream in `tawar-core`; this crate turns a
//! decided branch into a grounded backend request and turns the raw reply
//! back into a typed decision:
//! 1. **Prompt rendering** (`prompt`) - persona + economics + the already
//!    decided branch, rendered with Tera
//! 2. **Backend call** (`llm`) - OpenAI-compatible chat completion under a
//!    bounded timeout
//! 3. **Interpretation** (`interpreter`) - acceptance-marker handling, leak
//!    checks, and the closed `AgentDecision` union
//!
//! # Safety Principle
//!
//! The LLM is strictly a copywriter. It never decides whether a deal
//! happens or at what price; those are integer decisions made before the
//! request is built.

pub mod interpreter;
pub mod llm;
pub mod prompt;

pub use interpreter::{
    interpret, AgentDecision, InterpretError, InterpretedReply, ACCEPTANCE_MARKER,
};
pub use llm::{
    ChatMessage, ChatRole, CompletionRequest, LlmClient, LlmError, OpenAiCompatClient, ScriptedLlm,
};
pub use prompt::{completion_request, format_rupiah, PromptError, PromptRenderer};
