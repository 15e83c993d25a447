//! # beacon-server
//!
//! Daemon library for beacon-relay.
//!
//! This library provides the status API handlers, shared state and logging
//! setup used by the `beacon-server` binary.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod api;
pub mod logging;
pub mod state;
