use crate::connection::{AdmissionError, Channel, Connection, FlowSwitch};
use crate::frame_cursor::FrameCursor;
use crate::output::{PendingAction, ReceiveContext};
use crate::seq_num::SeqNum;
use bytes::Bytes;
use tracing::{debug, trace};

/// What happened to a data or other-data segment
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SegmentOutcome {
    /// handed to the application, receive cursor advanced
    Accepted,
    /// not the next expected segment: a duplicate, or a segment after a gap
    OutOfSequence,
    /// in sequence, but refused by receive buffer admission
    Rejected(AdmissionError),
    /// no segment number
    Truncated,
}

/// Acknowledgements for every second data segment are held back: there is a good chance they
///  can be piggy-backed on outgoing traffic, and the next segment's ack covers them anyway
fn should_delay_ack(seq: SeqNum) -> bool {
    seq.to_raw() % 2 == 0
}

fn read_segment(body: &Bytes) -> Option<(SeqNum, Bytes)> {
    let raw = FrameCursor::new(body).read_u16_le().ok()?;
    Some((SeqNum::from_raw(raw), body.slice(2..)))
}

fn admit(conn: &mut Connection, channel: Channel, seq: SeqNum, payload: Bytes) -> SegmentOutcome {
    match conn.hooks().enqueue(channel, payload) {
        Ok(()) => {
            trace!("accepted {:?} segment {}", channel, seq);
            SegmentOutcome::Accepted
        }
        Err(e) => {
            debug!("dropping {:?} segment {}: {}", channel, seq, e);
            conn.drops += 1;
            SegmentOutcome::Rejected(e)
        }
    }
}

/// `body` starts with the segment number, i.e. after the ack fields
pub fn on_data_segment(conn: &mut Connection, body: Bytes, ctx: &ReceiveContext) -> SegmentOutcome {
    let Some((seq, payload)) = read_segment(&body) else {
        trace!("data segment without segment number - dropping");
        return SegmentOutcome::Truncated;
    };

    let outcome = if conn.data_seq_recv.is_next(seq) {
        let outcome = admit(conn, Channel::Data, seq, payload);
        if outcome == SegmentOutcome::Accepted {
            conn.data_seq_recv.advance();
        }

        if conn.flow_local_switch == FlowSwitch::Send && conn.hooks().is_congested() {
            debug!("receive buffer congested - asking peer to stop sending");
            conn.flow_local_switch = FlowSwitch::DontSend;
            ctx.output.schedule_pending(conn, PendingAction::FlowSwitch);
        }
        outcome
    }
    else {
        trace!("data segment {} out of sequence, expected {}", seq, conn.data_seq_recv);
        SegmentOutcome::OutOfSequence
    };

    if outcome == SegmentOutcome::Accepted && should_delay_ack(seq) {
        if !conn.ack_delay_pending() {
            conn.timers.ack_delay = Some(ctx.config.ack_delay);
        }
    }
    else {
        conn.timers.ack_delay = None;
        ctx.output.send_data_ack(conn);
    }
    outcome
}

/// Other-data segments are acknowledged immediately, whatever happens to them
pub fn on_other_data(conn: &mut Connection, body: Bytes, ctx: &ReceiveContext) -> SegmentOutcome {
    let Some((seq, payload)) = read_segment(&body) else {
        trace!("other data segment without segment number - dropping");
        return SegmentOutcome::Truncated;
    };

    let outcome = if conn.other_seq_recv.is_next(seq) {
        let outcome = admit(conn, Channel::OtherData, seq, payload);
        if outcome == SegmentOutcome::Accepted {
            conn.other_seq_recv.advance();
            conn.other_report = false;
        }
        outcome
    }
    else {
        trace!("other data segment {} out of sequence, expected {}", seq, conn.other_seq_recv);
        SegmentOutcome::OutOfSequence
    };

    ctx.output.send_other_ack(conn);
    outcome
}
