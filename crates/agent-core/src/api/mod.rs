//! Agent API implementation submodules.
//!
//! Each submodule contains `impl OfflineAgent` blocks. The struct itself is
//! defined in `lib.rs`.

mod builder;
mod events;
mod state;
mod status;

pub use builder::OfflineAgentBuilder;
pub use events::{AgentEvent, EventOutcome};
pub(crate) use state::AgentState;
pub use status::AgentStatus;
