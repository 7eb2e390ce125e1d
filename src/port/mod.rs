//! Trait definitions (hexagonal ports). Depend only on domain.
//!
//! The control loop talks to the outside world through two outbound ports:
//! the traffic controller that runs tests, and the sink that records one
//! result row per sampling tick.
//!
//! ```text
//!                ┌─────────────────────────┐
//!                │      Application        │
//!     ┌──────────┤  setup · seek · runner  ├──────────┐
//!     │          └─────────────────────────┘          │
//!     ▼                                               ▼
//! ┌────────────┐                               ┌─────────────┐
//! │ Controller │                               │ Result sink │
//! │  Adapter   │                               │   Adapter   │
//! └────────────┘                               └─────────────┘
//! ```

pub mod outbound;
