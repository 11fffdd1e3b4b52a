use crate::connection::{Connection, FlowControlMode, FlowSwitch};
use crate::output::ReceiveContext;
use crate::seq_num::SeqNum;
use bitflags::bitflags;
use tracing::{debug, trace};

bitflags! {
    /// The flags byte of a link service message
    #[derive(PartialEq, Eq, Copy, Clone, Debug)]
    struct LinkServiceFlags: u8 {
        const MASK_RESERVED = 0b1111_1000;
        const INTERRUPT     = 0b0000_0100;
        const MASK_MODE     = 0b0000_0011;

        const MODE_NO_CHANGE = 0b0000_0000;
        const MODE_DONT_SEND = 0b0000_0001;
        const MODE_SEND      = 0b0000_0010;
    }
}

/// A decoded link service request
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum FlowRequest {
    /// adjust the peer's data credit by a (signed) number of segments or messages
    DataCredit(i8),
    Stop,
    Resume,
    /// grant credit for other-data messages; only positive values have an effect
    InterruptCredit(i8),
    Reserved,
}

impl FlowRequest {
    /// `None` if reserved flag bits are set
    pub fn decode(flags: u8, value: i8) -> Option<FlowRequest> {
        let flags = LinkServiceFlags::from_bits_retain(flags);
        if flags.intersects(LinkServiceFlags::MASK_RESERVED) {
            return None;
        }
        if flags.contains(LinkServiceFlags::INTERRUPT) {
            return Some(FlowRequest::InterruptCredit(value));
        }
        let request = match flags & LinkServiceFlags::MASK_MODE {
            LinkServiceFlags::MODE_NO_CHANGE => FlowRequest::DataCredit(value),
            LinkServiceFlags::MODE_DONT_SEND => FlowRequest::Stop,
            LinkServiceFlags::MODE_SEND => FlowRequest::Resume,
            _ => FlowRequest::Reserved,
        };
        Some(request)
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum LinkServiceOutcome {
    Applied(FlowRequest),
    OutOfSequence,
    /// wrong length or reserved flags: dropped before sequence checking
    Malformed,
}

/// `body` is the message after the ack fields: segment number, flags, value. Link service
///  messages share the other-data channel's sequence numbers.
pub fn on_link_service(conn: &mut Connection, body: &[u8], ctx: &ReceiveContext) -> LinkServiceOutcome {
    let &[seq_lo, seq_hi, flags, value] = body else {
        trace!("link service message with {} bytes - dropping", body.len());
        return LinkServiceOutcome::Malformed;
    };
    let Some(request) = FlowRequest::decode(flags, value as i8) else {
        debug!("link service message with reserved flags {:#04x} - dropping", flags);
        return LinkServiceOutcome::Malformed;
    };

    let seq = SeqNum::from_raw(u16::from_le_bytes([seq_lo, seq_hi]));
    let outcome = if conn.other_seq_recv.is_next(seq) {
        conn.other_seq_recv.advance();
        trace!("link service {}: {:?}", seq, request);

        if apply(conn, request, ctx) {
            conn.notify();
        }
        LinkServiceOutcome::Applied(request)
    }
    else {
        trace!("link service {} out of sequence, expected {}", seq, conn.other_seq_recv);
        LinkServiceOutcome::OutOfSequence
    };

    ctx.output.send_other_ack(conn);
    outcome
}

/// returns true if the application may be able to send more
fn apply(conn: &mut Connection, request: FlowRequest, ctx: &ReceiveContext) -> bool {
    match request {
        FlowRequest::DataCredit(value) if value < 0 => {
            let decrement = -(value as i32);
            if conn.flow_remote_data_credit > decrement && conn.remote_flow_control() == FlowControlMode::MessageCount {
                conn.flow_remote_data_credit -= decrement;
            }
            false
        }
        FlowRequest::DataCredit(value) if value > 0 => {
            conn.flow_remote_data_credit = conn.flow_remote_data_credit.saturating_add(value as i32);
            true
        }
        FlowRequest::DataCredit(_) => false,
        FlowRequest::Stop => {
            conn.flow_remote_switch = FlowSwitch::DontSend;
            false
        }
        FlowRequest::Resume => {
            conn.flow_remote_switch = FlowSwitch::Send;
            ctx.output.output(conn);
            true
        }
        FlowRequest::InterruptCredit(value) if value > 0 => {
            conn.flow_remote_other_credit = conn.flow_remote_other_credit.saturating_add(value as i32);
            true
        }
        FlowRequest::InterruptCredit(_) => false,
        FlowRequest::Reserved => false,
    }
}
