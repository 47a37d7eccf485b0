//! treeland - Wayland compositor control plane
//!
//! treeland publishes the desktop's private protocol extensions and keeps
//! the window and output state those protocols expose:
//!
//! - **Protocol extensions**: the treeland globals covering shortcuts, output
//!   colour, window management, capture, the dde shell and personalization,
//!   next to the standard session lock and toplevel list
//! - **Surface wrappers**: one state machine per window with geometry,
//!   animation, activation and visibility
//! - **Output lifecycle**: primary output tracking, surface migration and
//!   copy mode
//!
//! # Architecture
//!
//! - [`protocols`]: Generated bindings and the resource bookkeeping table
//! - [`extensions`]: Per-global state and request handling
//! - [`handlers`]: Handler trait implementations on the server
//! - [`state`]: The server context, its globals and the client socket
//! - [`surface`]: Surface wrappers and their registry
//! - [`output`]: Outputs and the lifecycle manager
//! - [`workspace`]: Workspace organization and switching

#![warn(rust_2018_idioms)]

pub mod config;
pub mod error;
pub mod extensions;
pub mod handlers;
pub mod output;
pub mod protocols;
pub mod state;
pub mod surface;
pub mod workspace;

pub use state::Server;
