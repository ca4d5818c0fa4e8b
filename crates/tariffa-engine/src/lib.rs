//! Classification engine.
//!
//! Control flow per session: understand, search, score, then per answer
//! round refine the bucket; finally select (oracle), validate (rule table,
//! one bounded re-search), decide (narrowing), and resolve duty.

mod engine;
pub mod narrowing;
pub mod scorer;
pub mod search;
mod session;
pub mod validator;

pub use engine::{AnswerRound, ClassifyOutcome, ClassifyRequest, Engine, EngineError, NO_MATCH_MESSAGE};
pub use narrowing::Decision;
pub use scorer::Scorer;
pub use session::Session;
pub use validator::{ConflictRule, Severity, Validation};
