//! Agent session management
//!
//! Provides [`SessionManager`], the runtime around one lifecycle machine:
//! it serializes events, executes the effects of each transition, runs
//! generations in the background and resolves the user's plan, task and
//! connector decisions.
//!
//! # Module Structure
//!
//! - `session_manager` - Core `SessionManager` with public API and its builder
//! - `generation` - Scratch preparation and stream driving for one generation
//! - `approvals` - Decisions parked by the tools until the user answers
//! - `review_actions` - Accept and decline of the pending review
//! - `prompts` - System and user prompt assembly

mod approvals;
mod generation;
mod prompts;
mod review_actions;
mod session_manager;

pub use session_manager::{PromptSubmission, SessionManager, SessionManagerBuilder};
