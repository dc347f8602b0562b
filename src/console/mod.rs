//! Console progress reporting and fan-out primitives

pub mod context;
pub mod join;
pub mod status;

pub use context::{Context, ContextOptions, Outcome, ScopeKind, ScopeSnapshot};
pub use join::{join, wait, Joiner, Waiter};
pub use status::{Status, StatusWriter};
