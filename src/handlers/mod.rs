//! Protocol handler implementations for treeland
//!
//! Each file implements the handler traits of a group of extensions on
//! [`Server`](crate::state::Server) and the compositor-side entry points that
//! drive them.

mod compositor;
mod desktop;
mod output;
mod seat;
mod session;
mod shell;
