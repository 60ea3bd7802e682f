//! Core conversation state machine
//!
//! Implements the Elm Architecture pattern with pure state transitions.

mod effect;
pub mod event;
pub mod state;
pub(crate) mod transition;


pub use effect::{Effect, Notice};
pub use event::Event;
pub use state::{ConvContext, PatientState, PatientUpdate, Role, Stage, Turn, TurnPhase};
pub use transition::{transition, TransitionError};
