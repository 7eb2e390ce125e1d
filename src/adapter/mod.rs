//! Adapters binding the ports to the outside world.

pub mod inbound;
pub mod outbound;
