use bitflags::bitflags;
use std::fmt::Debug;
use thiserror::Error;

bitflags! {
    /// NSP message flags (the first byte of every NSP message)
    #[derive(PartialEq, Eq, Copy, Clone, Debug)]
    struct MsgFlags: u8 {
        const MASK_RESERVED = 0b1000_0011;
        const MASK_CLASS    = 0b0000_1100;
        const MASK_SUBTYPE  = 0b0111_0000;

        const CLASS_DATA     = 0b0000_0000;
        const CLASS_ACK      = 0b0000_0100;
        const CLASS_CONTROL  = 0b0000_1000;

        // data class
        const SUB_LINK_SERVICE = 0b0001_0000;
        const SUB_OTHER_DATA   = 0b0011_0000;
        const DATA_BOM         = 0b0010_0000;
        const DATA_EOM         = 0b0100_0000;

        // ack class
        const SUB_DATA_ACK    = 0b0000_0000;
        const SUB_OTHER_ACK   = 0b0001_0000;
        const SUB_CONNECT_ACK = 0b0010_0000;

        // control class
        const SUB_NOP              = 0b0000_0000;
        const SUB_CONNECT_INIT     = 0b0001_0000;
        const SUB_CONNECT_CONFIRM  = 0b0010_0000;
        const SUB_DISCONNECT_INIT  = 0b0011_0000;
        const SUB_DISCONNECT_CONF  = 0b0100_0000;
        const SUB_PHASE2_INIT      = 0b0101_0000;
        const SUB_RETRANSMITTED_CI = 0b0110_0000;
        const SUB_RESERVED         = 0b0111_0000;
    }
}

bitflags! {
    /// Flags the routing layer reports along with each NSP message
    #[derive(PartialEq, Eq, Copy, Clone, Debug, Default)]
    pub struct RouteFlags: u8 {
        const MASK_PACKET_TYPE = 0b0000_0110;
        const RETURN_TO_SENDER = 0b0001_0000;
        const INTRA_ETHERNET   = 0b0010_0000;
    }
}

impl RouteFlags {
    const SHORT_HEADER: u8 = 0b0000_0010;

    pub fn from_raw(raw: u8) -> RouteFlags {
        RouteFlags::from_bits_retain(raw)
    }

    pub fn is_returned(&self) -> bool {
        self.contains(RouteFlags::RETURN_TO_SENDER)
    }

    pub fn is_short_header(&self) -> bool {
        (*self & RouteFlags::MASK_PACKET_TYPE).bits() == Self::SHORT_HEADER
    }

    /// A message that arrived with a short routing header or without the intra-ethernet flag
    ///  travelled (or will travel) off the local ethernet, so the peer's segment size can not
    ///  be trusted for the reverse path.
    pub fn is_off_ethernet(&self) -> bool {
        self.is_short_header() || !self.contains(RouteFlags::INTRA_ETHERNET)
    }
}

#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum ControlKind {
    ConnectInit { retransmitted: bool },
    ConnectConfirm,
    DisconnectInit,
    DisconnectConfirm,
}

/// The decoded message type of an NSP message. Decoding happens once, when the message enters
///  the receive path; everything downstream matches on these variants.
#[derive(Clone, Copy, Eq, PartialEq)]
pub enum FrameKind {
    Control(ControlKind),
    ConnectAck,
    DataAck,
    OtherDataAck,
    Data { begin_of_message: bool, end_of_message: bool },
    OtherData,
    LinkService,
}

impl Debug for FrameKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameKind::Control(ControlKind::ConnectInit { retransmitted: false }) => write!(f, "CI"),
            FrameKind::Control(ControlKind::ConnectInit { retransmitted: true }) => write!(f, "RCI"),
            FrameKind::Control(ControlKind::ConnectConfirm) => write!(f, "CC"),
            FrameKind::Control(ControlKind::DisconnectInit) => write!(f, "DI"),
            FrameKind::Control(ControlKind::DisconnectConfirm) => write!(f, "DC"),
            FrameKind::ConnectAck => write!(f, "CONNACK"),
            FrameKind::DataAck => write!(f, "ACK"),
            FrameKind::OtherDataAck => write!(f, "OTHACK"),
            FrameKind::Data { begin_of_message, end_of_message } => {
                write!(f, "DATA({}{})",
                       if *begin_of_message { "B" } else { "-" },
                       if *end_of_message { "E" } else { "-" },
                )
            }
            FrameKind::OtherData => write!(f, "OTH"),
            FrameKind::LinkService => write!(f, "LS"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FrameKindError {
    #[error("reserved bits set in message flags {0:#04x}")]
    Malformed(u8),
    #[error("no-op or reserved message type {0:#04x}")]
    Ignored(u8),
}

impl FrameKind {
    pub fn decode(raw: u8) -> Result<FrameKind, FrameKindError> {
        let flags = MsgFlags::from_bits_retain(raw);
        if flags.intersects(MsgFlags::MASK_RESERVED) {
            return Err(FrameKindError::Malformed(raw));
        }

        let sub_type = flags & MsgFlags::MASK_SUBTYPE;
        let kind = match flags & MsgFlags::MASK_CLASS {
            MsgFlags::CLASS_DATA => match sub_type {
                MsgFlags::SUB_LINK_SERVICE => FrameKind::LinkService,
                MsgFlags::SUB_OTHER_DATA => FrameKind::OtherData,
                _ if sub_type.contains(MsgFlags::SUB_LINK_SERVICE) => return Err(FrameKindError::Ignored(raw)),
                _ => FrameKind::Data {
                    begin_of_message: flags.contains(MsgFlags::DATA_BOM),
                    end_of_message: flags.contains(MsgFlags::DATA_EOM),
                },
            },
            MsgFlags::CLASS_ACK => match sub_type {
                MsgFlags::SUB_DATA_ACK => FrameKind::DataAck,
                MsgFlags::SUB_OTHER_ACK => FrameKind::OtherDataAck,
                MsgFlags::SUB_CONNECT_ACK => FrameKind::ConnectAck,
                _ => return Err(FrameKindError::Ignored(raw)),
            },
            MsgFlags::CLASS_CONTROL => match sub_type {
                MsgFlags::SUB_CONNECT_INIT => FrameKind::Control(ControlKind::ConnectInit { retransmitted: false }),
                MsgFlags::SUB_RETRANSMITTED_CI => FrameKind::Control(ControlKind::ConnectInit { retransmitted: true }),
                MsgFlags::SUB_CONNECT_CONFIRM => FrameKind::Control(ControlKind::ConnectConfirm),
                MsgFlags::SUB_DISCONNECT_INIT => FrameKind::Control(ControlKind::DisconnectInit),
                MsgFlags::SUB_DISCONNECT_CONF => FrameKind::Control(ControlKind::DisconnectConfirm),
                MsgFlags::SUB_NOP | MsgFlags::SUB_PHASE2_INIT | MsgFlags::SUB_RESERVED => return Err(FrameKindError::Ignored(raw)),
                _ => return Err(FrameKindError::Ignored(raw)),
            },
            _ => return Err(FrameKindError::Ignored(raw)),
        };
        Ok(kind)
    }

    #[cfg(test)]
    pub fn to_flags(&self) -> u8 {
        let flags = match self {
            FrameKind::Control(ControlKind::ConnectInit { retransmitted: false }) => MsgFlags::CLASS_CONTROL | MsgFlags::SUB_CONNECT_INIT,
            FrameKind::Control(ControlKind::ConnectInit { retransmitted: true }) => MsgFlags::CLASS_CONTROL | MsgFlags::SUB_RETRANSMITTED_CI,
            FrameKind::Control(ControlKind::ConnectConfirm) => MsgFlags::CLASS_CONTROL | MsgFlags::SUB_CONNECT_CONFIRM,
            FrameKind::Control(ControlKind::DisconnectInit) => MsgFlags::CLASS_CONTROL | MsgFlags::SUB_DISCONNECT_INIT,
            FrameKind::Control(ControlKind::DisconnectConfirm) => MsgFlags::CLASS_CONTROL | MsgFlags::SUB_DISCONNECT_CONF,
            FrameKind::ConnectAck => MsgFlags::CLASS_ACK | MsgFlags::SUB_CONNECT_ACK,
            FrameKind::DataAck => MsgFlags::CLASS_ACK | MsgFlags::SUB_DATA_ACK,
            FrameKind::OtherDataAck => MsgFlags::CLASS_ACK | MsgFlags::SUB_OTHER_ACK,
            FrameKind::Data { begin_of_message, end_of_message } => {
                let mut flags = MsgFlags::CLASS_DATA;
                if *begin_of_message {
                    flags |= MsgFlags::DATA_BOM;
                }
                if *end_of_message {
                    flags |= MsgFlags::DATA_EOM;
                }
                flags
            }
            FrameKind::OtherData => MsgFlags::CLASS_DATA | MsgFlags::SUB_OTHER_DATA,
            FrameKind::LinkService => MsgFlags::CLASS_DATA | MsgFlags::SUB_LINK_SERVICE,
        };
        flags.bits()
    }

    /// true for every message that is prefixed with piggy-backed ack sub-fields
    pub fn carries_acks(&self) -> bool {
        !matches!(self, FrameKind::Control(_) | FrameKind::ConnectAck)
    }

    /// true for messages on the other-data sub-channel, whose ack sub-fields by default refer to
    ///  the other-data channel rather than the data channel
    pub fn is_other_channel(&self) -> bool {
        matches!(self, FrameKind::OtherData | FrameKind::LinkService | FrameKind::OtherDataAck)
    }

    /// data, other-data and link service messages carry a segment number and a payload
    pub fn is_segment(&self) -> bool {
        matches!(self, FrameKind::Data { .. } | FrameKind::OtherData | FrameKind::LinkService)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use ControlKind::*;
    use FrameKind::*;

    #[rstest]
    #[case::data(0x00, Data { begin_of_message: false, end_of_message: false }, "DATA(--)")]
    #[case::data_bom(0x20, Data { begin_of_message: true, end_of_message: false }, "DATA(B-)")]
    #[case::data_eom(0x40, Data { begin_of_message: false, end_of_message: true }, "DATA(-E)")]
    #[case::data_single(0x60, Data { begin_of_message: true, end_of_message: true }, "DATA(BE)")]
    #[case::link_service(0x10, LinkService, "LS")]
    #[case::other_data(0x30, OtherData, "OTH")]
    #[case::data_ack(0x04, DataAck, "ACK")]
    #[case::other_ack(0x14, OtherDataAck, "OTHACK")]
    #[case::conn_ack(0x24, ConnectAck, "CONNACK")]
    #[case::ci(0x18, Control(ConnectInit { retransmitted: false }), "CI")]
    #[case::rci(0x68, Control(ConnectInit { retransmitted: true }), "RCI")]
    #[case::cc(0x28, Control(ConnectConfirm), "CC")]
    #[case::di(0x38, Control(DisconnectInit), "DI")]
    #[case::dc(0x48, Control(DisconnectConfirm), "DC")]
    fn test_decode(#[case] raw: u8, #[case] expected: FrameKind, #[case] debug: &str) {
        let kind = FrameKind::decode(raw).unwrap();
        assert_eq!(kind, expected);
        assert_eq!(kind.to_flags(), raw);
        assert_eq!(format!("{:?}", kind), debug);
    }

    #[rstest]
    #[case::bit0(0x01)]
    #[case::bit1(0x02)]
    #[case::bit7(0x80)]
    #[case::bit7_ci(0x98)]
    fn test_decode_malformed(#[case] raw: u8) {
        assert_eq!(FrameKind::decode(raw), Err(FrameKindError::Malformed(raw)));
    }

    #[rstest]
    #[case::nop(0x08)]
    #[case::phase2_init(0x58)]
    #[case::reserved_control(0x78)]
    #[case::reserved_class(0x0c)]
    #[case::reserved_data_50(0x50)]
    #[case::reserved_data_70(0x70)]
    #[case::reserved_ack(0x34)]
    fn test_decode_ignored(#[case] raw: u8) {
        assert_eq!(FrameKind::decode(raw), Err(FrameKindError::Ignored(raw)));
    }

    #[test]
    fn test_properties() {
        assert!(!Control(ConnectConfirm).carries_acks());
        assert!(!ConnectAck.carries_acks());
        assert!(DataAck.carries_acks());
        assert!(LinkService.carries_acks());

        assert!(OtherData.is_other_channel());
        assert!(LinkService.is_other_channel());
        assert!(OtherDataAck.is_other_channel());
        assert!(!DataAck.is_other_channel());
        assert!(!Data { begin_of_message: true, end_of_message: true }.is_other_channel());

        assert!(LinkService.is_segment());
        assert!(!OtherDataAck.is_segment());
    }

    #[rstest]
    #[case::intra_ethernet_long(0x20 | 0x06, false)]
    #[case::intra_ethernet_short(0x20 | 0x02, true)]
    #[case::no_intra_ethernet(0x06, true)]
    fn test_route_flags_off_ethernet(#[case] raw: u8, #[case] expected: bool) {
        assert_eq!(RouteFlags::from_raw(raw).is_off_ethernet(), expected);
    }

    #[test]
    fn test_route_flags_returned() {
        assert!(RouteFlags::from_raw(0x10).is_returned());
        assert!(!RouteFlags::from_raw(0x20).is_returned());
    }
}
