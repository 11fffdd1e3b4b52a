use crate::connection::{Channel, Connection};
use crate::frame_cursor::FrameCursor;
use crate::output::NspOutput;
use crate::seq_num::SeqNum;
use tracing::trace;

/// A decoded piggy-backed acknowledgement field
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum AckField {
    DataAck(SeqNum),
    DataNak(SeqNum),
    OtherAck(SeqNum),
    OtherNak(SeqNum),
}

impl AckField {
    const PRESENT: u16 = 0x8000;
    /// either bit marks a negative acknowledgement: bit 12 is the qualifier NSP defines, bit 14
    ///  is set by some implementations
    const MASK_NAK: u16 = 0x5000;
    #[cfg(test)]
    const NAK: u16 = 0x1000;

    /// ack fields in other-data and link service messages refer to the data channel unless
    ///  this bit is set, and vice versa
    pub const CROSS_CHANNEL: u16 = 0x2000;

    /// Decodes an ack field, or returns `None` if it does not have the 'present' flag
    pub fn decode(raw: u16) -> Option<AckField> {
        if raw & Self::PRESENT == 0 {
            return None;
        }
        let seq = SeqNum::from_raw(raw);
        let is_nak = raw & Self::MASK_NAK != 0;
        let field = match (raw & Self::CROSS_CHANNEL != 0, is_nak) {
            (false, false) => AckField::DataAck(seq),
            (false, true) => AckField::DataNak(seq),
            (true, false) => AckField::OtherAck(seq),
            (true, true) => AckField::OtherNak(seq),
        };
        Some(field)
    }

    #[cfg(test)]
    pub fn encode(&self) -> u16 {
        let (flags, seq) = match self {
            AckField::DataAck(seq) => (0, seq),
            AckField::DataNak(seq) => (Self::NAK, seq),
            AckField::OtherAck(seq) => (Self::CROSS_CHANNEL, seq),
            AckField::OtherNak(seq) => (Self::CROSS_CHANNEL | Self::NAK, seq),
        };
        Self::PRESENT | flags | seq.to_raw()
    }
}

/// Reads up to two ack fields from the front of a message and applies them to the
///  connection's send side. `cross_channel` is set for messages travelling on the other-data
///  channel.
///
/// Returns the number of bytes consumed: two per field that has the 'present' flag, whether or
///  not the field was applied. A field without the flag ends ack processing and stays in the
///  cursor.
pub fn process_acks(conn: &mut Connection, cursor: &mut FrameCursor, cross_channel: bool, output: &dyn NspOutput) -> usize {
    let mut consumed = 0;
    let mut window_opened = false;

    while consumed < 4 {
        let raw = match cursor.peek_u16_le() {
            Ok(raw) => raw,
            Err(_) => break,
        };
        let raw = if cross_channel { raw ^ AckField::CROSS_CHANNEL } else { raw };
        let Some(field) = AckField::decode(raw) else {
            break;
        };
        if cursor.skip(2).is_err() {
            break;
        }
        consumed += 2;

        match field {
            AckField::DataAck(seq) => {
                if seq.is_after(conn.ack_recv_data) {
                    trace!("data acked up to {}", seq);
                    conn.ack_recv_data = seq;
                    window_opened |= output.check_transmit_queue(conn, Channel::Data, seq);
                }
            }
            AckField::OtherAck(seq) => {
                if seq.is_after(conn.ack_recv_other) {
                    trace!("other data acked up to {}", seq);
                    conn.ack_recv_other = seq;
                    window_opened |= output.check_transmit_queue(conn, Channel::OtherData, seq);
                }
            }
            AckField::DataNak(seq) | AckField::OtherNak(seq) => {
                trace!("ignoring NAK for {}", seq);
            }
        }
    }

    if window_opened {
        conn.notify();
    }
    consumed
}
