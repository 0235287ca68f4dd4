//! The turn loop for twinsearch.
//!
//! One turn runs a fixed cycle:
//!
//! 1. **Generate**: the [`Responder`] asks the model for an answer or for
//!    searches
//! 2. **Search**: the [`Router`] fans the requested searches out
//!    concurrently and appends their results
//! 3. **Generate** again, now with both search results in view
//! 4. **Bookkeep**: usage and answer similarity run once, always
//!
//! [`TurnOrchestrator`] drives the cycle and returns a [`TurnOutcome`].

pub mod orchestrator;
pub mod responder;
pub mod router;

#[cfg(test)]
mod test_helpers;

pub use orchestrator::{TurnOrchestrator, TurnOutcome};
pub use responder::{Responder, ResponderOutput, Response};
pub use router::{BookkeepingResult, PendingCalls, Router, TurnPhase};
