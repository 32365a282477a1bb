//! Live-stream recording supervisor and its operator surface.
//!
//! Two processes share one data directory: `recorder-monitor` runs the
//! [`recording::Supervisor`] polling loop, and `recorder-server` serves the
//! [`control::ControlPlane`] over HTTP. They communicate only through the
//! JSON documents of the [`store::StateStore`].

pub mod api;
pub mod config;
pub mod control;
pub mod error;
pub mod library;
pub mod logging;
pub mod probe;
pub mod recording;
pub mod signal;
pub mod store;
pub mod upload;

pub use error::{RecorderError, Result};
