//! Session lifecycle state machine
//!
//! The machine is a plain value: [`ChatMachine::apply`] takes one
//! [`ChatEvent`], updates the state and [`SessionContext`], and returns the
//! [`Effect`]s that the session manager executes afterwards (persistence,
//! checkpoint capture, starting generations).
//!
//! Events fall into two groups. Global events (prompt submission, reset,
//! restore, error, finish, connector requests, review-action toggles, chat
//! updates, approval mode) are handled in any state. Every other event is
//! only meaningful in specific states and is a no-op elsewhere.

pub mod context;
pub mod state;
pub mod transition;

pub use context::{ConnectorSpecRequest, SessionContext, SessionSnapshot};
pub use state::{ChatEvent, ChatState, Effect};
pub use transition::{ChatMachine, MachineConfig};
