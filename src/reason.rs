use num_enum::{FromPrimitive, IntoPrimitive};

/// Disconnect reason codes as they appear on the wire (u16, little endian). The numeric values
///  are shared with every other NSP implementation and must not change.
#[repr(u16)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, FromPrimitive, IntoPrimitive)]
pub enum ReasonCode {
    /// no error - for a malformed connect-init this means "do not reply"
    Ok = 0,
    NoResources = 1,
    UnrecognisedNode = 2,
    NodeShutdown = 3,
    InvalidDestination = 4,
    EndUserNoResources = 5,
    ObjectBusy = 6,
    Unspecified = 7,
    ThirdPartyAbort = 8,
    UserAbort = 9,
    InvalidNodeFormat = 10,
    LocalNodeShutdown = 11,
    NodeNoLinkResources = 32,
    UserNoLinkResources = 33,
    BadAccessControl = 34,
    BadAccount = 36,
    TimedOut = 38,
    NodeUnreachable = 39,
    /// sent for frames that address no known connection
    NoLink = 41,
    DisconnectComplete = 42,
    ImageDataOverflow = 43,
    #[num_enum(catch_all)]
    Other(u16),
}

impl ReasonCode {
    pub fn is_no_reply(&self) -> bool {
        *self == ReasonCode::Ok
    }
}

impl Default for ReasonCode {
    fn default() -> Self {
        ReasonCode::Ok
    }
}

/// Message type of an outgoing disconnect, identified by its flags byte
#[repr(u8)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, IntoPrimitive)]
pub enum DisconnectKind {
    Init = 0x38,
    Confirm = 0x48,
}
