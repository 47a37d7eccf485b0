//! State management module
//!
//! This module contains the server context and its components.

mod main;
mod protocols;
pub mod validation;

pub(crate) use main::ClientToplevel;
pub use main::{client_session, ClientState, CompositorMode, Server};
pub use protocols::ProtocolState;
