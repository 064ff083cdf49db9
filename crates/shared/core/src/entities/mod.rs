mod connection;
mod exec_type;
mod order_status;
mod order_type;
mod reject;
mod side;
mod time_in_force;

pub use connection::ConnectionClass;
pub use exec_type::ExecType;
pub use order_status::OrderStatus;
pub use order_type::OrderType;
pub use reject::{OrderRejectReason, RejectReason};
pub use side::Side;
pub use time_in_force::TimeInForce;
