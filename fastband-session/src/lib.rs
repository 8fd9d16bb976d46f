//! Fastband Session - Coordinator Facade
//!
//! The thin per-session facade a ticket owner interacts with. Wires the
//! token meter into the budget manager, the budget edges into handoff
//! preparation, and consults the ops log for admission.

mod coordinator;
mod ticket;
mod worker;

pub use coordinator::*;
pub use ticket::*;
