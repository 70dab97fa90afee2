//! CLI command implementations.
//!
//! - [`config`] - Configuration file management (init, show, path)
//! - [`drive`] - Courier mode fed from stdin
//! - [`simulate`] - Demo courier walking waypoints
//! - [`watch`] - Observer mode printing render events

pub mod common;
pub mod config;
pub mod drive;
pub mod simulate;
pub mod watch;
