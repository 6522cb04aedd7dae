//! A small typed interpreter for multi-step conversational-agent
//! programs.
//!
//! The building blocks, leaf first:
//!
//! - [`conversation::ConversationThread`] — immutable conversation state
//!   (ordered messages plus template variables); every transformation
//!   returns a new thread.
//! - [`cell`] — the generic interpreter substrate: a [`cell::Cell`] is a
//!   pure, possibly-suspending state transformation, composed into
//!   sequences, conditionals, and loops, and executed by the
//!   [`cell::CellRunner`].
//! - [`agent`] — policies that generate the *next* cell program to run
//!   against the current thread. [`agent::CustomAgent`] is the primitive
//!   single-turn responder; [`agent::ToolAgent`] composes a select →
//!   execute → respond pipeline over it.
//! - [`tool`] — the structured sub-protocol that routes a model's
//!   tool-selection output to a registered [`tool::Tool`].
//! - [`strategy`] — pure appliers deciding where rendered instructions
//!   and tool outputs are placed in the message list.
//!
//! Execution is single-threaded and cooperative: the runner awaits each
//! cell in turn, and a cancellation token threaded through the
//! [`cell::RunContext`] is honored at every suspension point.

#![deny(missing_docs)]
#![deny(clippy::missing_safety_doc)]

#[macro_use]
extern crate tracing;

pub mod agent;
pub mod cell;
pub mod conversation;
mod error;
pub mod persistence;
pub mod prompt;
pub mod strategy;
pub mod tool;

pub use error::Error;
