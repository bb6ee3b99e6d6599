//! Core types and error definitions for the handoff chat hub.
//!
//! This crate provides the foundational types shared across all handoff
//! crates: error handling, chat roles and turns, and the wire frames spoken
//! over customer and staff connections.
//!
//! # Main types
//!
//! - [`HandoffError`]: Unified error enum for all subsystems.
//! - [`HandoffResult`]: Convenience alias for `Result<T, HandoffError>`.
//! - [`MessageRole`]: Author of a chat turn (user, bot, human agent, system).
//! - [`ChatTurn`]: A single entry in a session's conversation log.
//! - [`ClientRole`]: Customer or staff connection.
//! - [`Responder`]: Who currently answers a session (bot or human).
//! - [`InboundFrame`] / [`OutboundFrame`]: Tagged wire frames.

pub mod error;
pub mod frame;
pub mod message;

pub use error::{HandoffError, HandoffResult};
pub use frame::{FrameMessage, InboundFrame, OutboundFrame};
pub use message::{ChatTurn, ClientRole, MessageRole, Responder};
