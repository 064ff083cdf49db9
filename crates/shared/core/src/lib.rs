//! Fixgate Core Domain
//!
//! Venue vocabulary shared by the gateway: order sides, types, statuses,
//! execution types, reject tables and connection classes, each with its
//! wire code.
//! This crate contains no async, no I/O, and is 100% unit testable.

pub mod entities;
pub mod values;

// Re-export commonly used types at crate root
pub use entities::{
    ConnectionClass, ExecType, OrderRejectReason, OrderStatus, OrderType, RejectReason, Side,
    TimeInForce,
};
pub use values::Symbol;
