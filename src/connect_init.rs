use crate::frame_cursor::{CursorError, FrameCursor};
use crate::image_data::{check_image_data, EndUser};
use crate::reason::ReasonCode;
use bitflags::bitflags;
use bytes::Bytes;
use thiserror::Error;

bitflags! {
    /// The 'menu version' byte of a connect-init message: which optional fields follow the
    ///  end user names
    #[derive(PartialEq, Eq, Copy, Clone, Debug, Default)]
    pub struct MenuVersion: u8 {
        const ACCESS_DATA = 0x01;
        const USER_DATA   = 0x02;
        const PROXY       = 0x04;
        const UIC         = 0x08;
    }
}

/// Fixed-size part of a connect-init message (including the flags byte)
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ConnectInitHeader {
    pub dst_port: u16,
    pub src_port: u16,
    pub services: u8,
    pub info: u8,
    pub segment_size: u16,
}

impl ConnectInitHeader {
    pub const SERIALIZED_LEN: usize = 9;

    pub fn parse(cursor: &mut FrameCursor) -> Option<ConnectInitHeader> {
        if cursor.remaining() < Self::SERIALIZED_LEN {
            return None;
        }
        Self::try_parse(cursor).ok()
    }

    fn try_parse(cursor: &mut FrameCursor) -> Result<ConnectInitHeader, CursorError> {
        let _flags = cursor.read_u8()?;
        Ok(ConnectInitHeader {
            dst_port: cursor.read_u16_le()?,
            src_port: cursor.read_u16_le()?,
            services: cursor.read_u8()?,
            info: cursor.read_u8()?,
            segment_size: cursor.read_u16_le()?,
        })
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AccessData {
    pub user: Bytes,
    pub password: Bytes,
    pub account: Bytes,
}

/// A syntactically valid connect-init message
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConnectRequest {
    pub header: ConnectInitHeader,
    pub destination: EndUser,
    pub source: EndUser,
    pub menu_version: MenuVersion,
    pub access: Option<AccessData>,
    pub user_data: Option<Bytes>,
}

/// The ways a connect-init message can be malformed, in the order they are checked. Each maps
///  to the reason code sent back to the peer, with [ReasonCode::Ok] meaning 'no reply'.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConnectInitError {
    #[error("CI: Truncated message")]
    Truncated,
    #[error("CI: Destination username error")]
    DestinationUsername,
    #[error("CI: Destination username type")]
    DestinationType,
    #[error("CI: Source username error")]
    SourceUsername,
    #[error("CI: Truncated at menuver")]
    TruncatedAtMenuVersion,
    #[error("CI: Truncated before access or user data")]
    TruncatedBeforeOptionalData,
    #[error("CI: Access data format error")]
    AccessDataFormat,
    #[error("CI: User data format error")]
    UserDataFormat,
}

impl ConnectInitError {
    pub fn reason(&self) -> ReasonCode {
        match self {
            ConnectInitError::Truncated => ReasonCode::Ok,
            ConnectInitError::DestinationUsername => ReasonCode::InvalidDestination,
            ConnectInitError::DestinationType => ReasonCode::InvalidDestination,
            ConnectInitError::SourceUsername => ReasonCode::Unspecified,
            ConnectInitError::TruncatedAtMenuVersion => ReasonCode::Ok,
            ConnectInitError::TruncatedBeforeOptionalData => ReasonCode::Ok,
            ConnectInitError::AccessDataFormat => ReasonCode::ImageDataOverflow,
            ConnectInitError::UserDataFormat => ReasonCode::ImageDataOverflow,
        }
    }
}

const MAX_ACCESS_FIELD_LEN: usize = 39;
const MAX_USER_DATA_LEN: usize = 16;

/// Validates a complete connect-init (or retransmitted connect-init) message, starting with
///  its flags byte. This has no side effects: the caller decides what to do with the request
///  or the failure.
pub fn validate_connect_init(frame: &[u8]) -> Result<ConnectRequest, ConnectInitError> {
    let mut cursor = FrameCursor::new(frame);
    let header = ConnectInitHeader::parse(&mut cursor)
        .ok_or(ConnectInitError::Truncated)?;

    let destination = EndUser::parse(&mut cursor)
        .map_err(|_| ConnectInitError::DestinationUsername)?;
    if destination.format > 1 {
        return Err(ConnectInitError::DestinationType);
    }

    let source = EndUser::parse(&mut cursor)
        .map_err(|_| ConnectInitError::SourceUsername)?;

    let menu_version = cursor.read_u8()
        .map(MenuVersion::from_bits_retain)
        .map_err(|_| ConnectInitError::TruncatedAtMenuVersion)?;

    if menu_version.intersects(MenuVersion::ACCESS_DATA | MenuVersion::USER_DATA) && cursor.is_empty() {
        return Err(ConnectInitError::TruncatedBeforeOptionalData);
    }

    let access = if menu_version.contains(MenuVersion::ACCESS_DATA) {
        let mut field = || check_image_data(&mut cursor, MAX_ACCESS_FIELD_LEN)
            .map(Bytes::copy_from_slice)
            .map_err(|_| ConnectInitError::AccessDataFormat);
        Some(AccessData {
            user: field()?,
            password: field()?,
            account: field()?,
        })
    }
    else {
        None
    };

    let user_data = if menu_version.contains(MenuVersion::USER_DATA) {
        let data = check_image_data(&mut cursor, MAX_USER_DATA_LEN)
            .map_err(|_| ConnectInitError::UserDataFormat)?;
        Some(Bytes::copy_from_slice(data))
    }
    else {
        None
    };

    Ok(ConnectRequest {
        header,
        destination,
        source,
        menu_version,
        access,
        user_data,
    })
}

/// A validated connect request that was handed to a listening connection's accept backlog
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PendingConnect {
    pub request: ConnectRequest,
    pub remote_node: u16,
}
