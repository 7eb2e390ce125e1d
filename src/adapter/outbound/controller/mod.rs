//! HTTP implementation of the controller port.

pub mod client;
pub mod dto;
pub mod settings;

pub use client::HttpControllerClient;
pub use settings::{ControllerConfig, ControllerHttpConfig};
