//! The collaborator contracts consumed by the interpreter core.
//!
//! This crate establishes the shared vocabulary between the cell
//! interpreter and its external collaborators: the message types that
//! make up a conversation, and the completions-client protocol for
//! requesting a single chat turn from a model backend.
//!
//! Types in this crate don't define any behavior, instead they are the
//! constraints that the implementors should adhere to. Concrete clients
//! (HTTP backends, scripted test doubles) live in their own crates.

#![deny(missing_docs)]

mod client;
mod error;
mod message;
mod role;

pub use client::*;
pub use error::*;
pub use message::*;
pub use role::*;
