use crate::config::NspConfig;
use crate::connection::{Channel, Connection};
use crate::reason::{DisconnectKind, ReasonCode};
use crate::seq_num::SeqNum;
#[cfg(test)] use mockall::automock;

/// Addressing information for a reply to a message that has no connection: the reply goes
///  back to the node the message came from, with the ports swapped
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct ReturnAddress {
    pub remote_node: u16,
    pub local_node: u16,
    /// the port the message was addressed to
    pub local_port: u16,
    /// the port the message came from
    pub remote_port: u16,
}

/// Deferred work for the outbound path, executed outside the receive path
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum PendingAction {
    /// the connection became established, start the regular send processing
    Idle,
    /// the local flow control switch changed and must be reported to the peer
    FlowSwitch,
}

/// The outbound half of NSP as far as the receive path needs it: message encoding,
///  transmit queues, retransmission and timers all live behind this interface.
#[cfg_attr(test, automock)]
pub trait NspOutput: Send + Sync + 'static {
    fn send_data_ack(&self, conn: &Connection);

    fn send_other_ack(&self, conn: &Connection);

    fn send_disconnect(&self, conn: &Connection, kind: DisconnectKind, reason: ReasonCode);

    /// reply to a message that does not belong to any connection
    fn return_disconnect(&self, addr: &ReturnAddress, kind: DisconnectKind, reason: ReasonCode);

    /// Release all segments on the channel's transmit queue up to and including `acked`.
    ///  Returns true if this opened room in the send window.
    fn check_transmit_queue(&self, conn: &Connection, channel: Channel, acked: SeqNum) -> bool;

    /// try to send whatever is queued for the connection
    fn output(&self, conn: &Connection);

    fn schedule_pending(&self, conn: &Connection, action: PendingAction);
}

/// Everything protocol handlers need besides the connection itself
#[derive(Clone, Copy)]
pub struct ReceiveContext<'a> {
    pub config: &'a NspConfig,
    pub output: &'a dyn NspOutput,
}
