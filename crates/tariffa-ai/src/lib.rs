//! Reasoning oracle adapter and product understanding.
//!
//! The oracle is an untrusted capability: every response is decoded against
//! a strict shape and validated before use, and every call is bounded by a
//! timeout and a retry budget. [`HeuristicOracle`] is the deterministic
//! stand-in used when the oracle is unavailable and in tests.

pub mod decode;
pub mod heuristic;
#[cfg(feature = "http")]
pub mod http;
pub mod llm;
pub mod oracle;
pub mod understanding;

pub use heuristic::HeuristicOracle;
#[cfg(feature = "http")]
pub use http::HttpCompletion;
pub use llm::LlmOracle;
pub use oracle::{
    BranchPick, BranchSummary, CodeSelection, CompletionRequest, CompletionService, OracleError,
    ReasoningOracle, UnderstandingDraft, UnderstandingRequest,
};
pub use understanding::{Understood, understand};
