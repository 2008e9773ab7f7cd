//! Pull-to-refresh recognition for touch surfaces.
//!
//! [`controller::PullToRefresh`] is the entry point: register a container,
//! mount it, feed it [`tracker::TouchEvent`]s and poll for settled refreshes.

pub mod cli;
pub mod config;
pub mod controller;
pub mod input;
pub mod logging;
pub mod pull;
pub mod refresh;
pub mod script;
pub mod settings;
pub mod surface;
pub mod tracker;
pub mod viewport;
pub mod watch;
