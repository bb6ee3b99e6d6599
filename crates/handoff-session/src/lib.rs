//! Session state for the handoff chat hub.
//!
//! Holds each conversation's [`ChatHistoryBuffer`] and responder mode, the
//! [`SessionManager`] table that creates sessions on first use, and the
//! [`HandoffController`] state machine that moves a session between the bot
//! and a human agent. Collaborators are reached through traits:
//! [`QueryEngine`], [`HumanHandoff`] and [`HistoryArchive`].

pub mod archive;
pub mod engine;
pub mod handoff;
pub mod history;
pub mod manager;
pub mod session;

pub use archive::{ArchivedSession, FileHistoryArchive, HistoryArchive};
pub use engine::{QueryEngine, ResponseRequest};
pub use handoff::{
    HandoffController, HumanHandoff, ScriptedHandoff, StaffTurn, ToggleReason, Transition,
};
pub use history::ChatHistoryBuffer;
pub use manager::{SessionHandle, SessionManager};
pub use session::SessionState;
