use fixgate_core::Symbol;
use tokio::sync::oneshot;

use crate::codec::Field;

/// Commands that can be sent to a session worker
#[derive(Debug)]
pub enum WorkerCommand {
    /// Send an application message; `correlation_id` names the pending
    /// entry that gets the outbound sequence number
    Send {
        msg_type: String,
        fields: Vec<Field>,
        correlation_id: Option<String>,
    },

    /// Forget the cached book for a symbol
    DropBook { symbol: Symbol },

    /// Send a heartbeat now
    Heartbeat,

    /// Log out, fail pending requests, exit
    Shutdown { done: oneshot::Sender<()> },
}
