//! Duty Resolver: the general rate for a code (inherited from the nearest
//! rated ancestor when the code has none) plus every trade-remedy program
//! that applies to the origin, stacked by addition.

mod error;
pub mod programs;
pub mod rate;
mod resolver;

pub use error::DutyError;
pub use programs::{ProgramEntry, ProgramScope, ProgramTable, ScopeMatch};
pub use rate::{ParsedRate, RateParser};
pub use resolver::DutyResolver;
