//! Window-list bookkeeping for foreign toplevels.
//!
//! Nothing in here talks to the compositor. The protocol listener decodes
//! wire events into [`ToplevelEvent`]s and feeds them to a
//! [`ToplevelRegistry`], which keeps records, parent/child links and the
//! per-output container consistent.

pub mod binding;
pub mod record;
pub mod registry;

pub use binding::{BindingChange, OutputBinding};
pub use record::{ToplevelRecord, ToplevelState};
pub use registry::{OrphanPolicy, ToplevelEvent, ToplevelRegistry};

/// Requests the shell sends back to the compositor for a toplevel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToplevelCommand {
    Activate,
    Close,
    SetMinimized(bool),
    SetMaximized(bool),
}
