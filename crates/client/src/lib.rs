//! # cartographer_client
//!
//! Talks to the NeuroCartographer analysis backend and drives the dashboard
//! state from [`cartographer`].
//!
//! - [`client`]: the [`AnalysisBackend`](client::AnalysisBackend) trait and its HTTP implementation
//! - [`controller`]: [`Dashboard`](controller::Dashboard), sequencing operations against shared state
//! - [`config`]: defaults, config file and environment overrides
//! - [`render`]: plain-text views used by the `cartographer` binary

pub mod client;
pub mod config;
pub mod controller;
pub mod error;
pub mod paths;
pub mod render;

pub use client::{AnalysisBackend, AnalysisClient};
pub use config::ClientConfig;
pub use controller::Dashboard;
pub use error::ApiError;
