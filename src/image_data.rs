use crate::frame_cursor::{CursorError, FrameCursor};
use bytes::Bytes;
use std::fmt::{Debug, Formatter};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ImageDataError {
    #[error(transparent)]
    Truncated(#[from] CursorError),
    #[error("image data field of {len} bytes exceeds its maximum of {max}")]
    TooLong { len: usize, max: usize },
    #[error("unknown end user name format {0}")]
    UnknownFormat(u8),
}

/// Reads a counted 'image data' field: one length byte followed by that many bytes. The length
///  must neither exceed `max` nor the bytes remaining in the frame.
pub fn check_image_data<'a>(cursor: &mut FrameCursor<'a>, max: usize) -> Result<&'a [u8], ImageDataError> {
    let len = cursor.read_u8()? as usize;
    if len > max {
        return Err(ImageDataError::TooLong { len, max });
    }
    Ok(cursor.take(len)?)
}

/// The key a connect request is matched against listening connections with
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum ListenerKey {
    Object(u8),
    Name(Bytes),
}

/// An end user (source or destination) as carried in a connect-init message.
#[derive(Clone, Debug, Eq, PartialEq, Default)]
pub struct EndUser {
    pub format: u8,
    pub object_number: u8,
    /// group / user code for formats 2 and 4, empty otherwise
    pub group_user: Bytes,
    pub name: Bytes,
}

impl EndUser {
    const MAX_NAME_LEN: usize = 16;
    const MAX_NAME_LEN_WITH_GROUP: usize = 12;

    pub fn object(object_number: u8) -> EndUser {
        EndUser {
            format: 0,
            object_number,
            ..Default::default()
        }
    }

    pub fn named(name: &[u8]) -> EndUser {
        EndUser {
            format: 1,
            object_number: 0,
            group_user: Bytes::new(),
            name: Bytes::copy_from_slice(name),
        }
    }

    /// Parses a complete end user field. The cursor is left behind the field on success and at
    ///  an unspecified position on failure.
    pub fn parse(cursor: &mut FrameCursor) -> Result<EndUser, ImageDataError> {
        let format = cursor.read_u8()?;
        let object_number = cursor.read_u8()?;

        let (group_user, max_name_len) = match format {
            0 => return Ok(EndUser::object(object_number)),
            1 => (&[][..], Self::MAX_NAME_LEN),
            2 => (cursor.take(4)?, Self::MAX_NAME_LEN_WITH_GROUP),
            4 => (cursor.take(8)?, Self::MAX_NAME_LEN_WITH_GROUP),
            other => return Err(ImageDataError::UnknownFormat(other)),
        };
        let name = check_image_data(cursor, max_name_len)?;

        Ok(EndUser {
            format,
            object_number,
            group_user: Bytes::copy_from_slice(group_user),
            name: Bytes::copy_from_slice(name),
        })
    }

    /// Format 0 addresses a listener by object number, all other formats by name
    pub fn listener_key(&self) -> ListenerKey {
        if self.format == 0 {
            ListenerKey::Object(self.object_number)
        }
        else {
            ListenerKey::Name(self.name.clone())
        }
    }
}

/// Up to 16 bytes of optional data as carried by connect-confirm and disconnect-init messages
#[derive(Clone, Copy, Eq, PartialEq, Default)]
pub struct OptionalData {
    len: u8,
    data: [u8; OptionalData::MAX_LEN],
}

impl Debug for OptionalData {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "OptionalData({:?})", self.as_bytes())
    }
}

impl OptionalData {
    pub const MAX_LEN: usize = 16;

    pub fn new(data: &[u8]) -> Option<OptionalData> {
        if data.len() > Self::MAX_LEN {
            return None;
        }
        let mut result = OptionalData::default();
        result.data[..data.len()].copy_from_slice(data);
        result.len = data.len() as u8;
        Some(result)
    }

    /// Reads optional data from the rest of a frame. A missing length byte means 'no data', and
    ///  so does a length that is out of bounds: the field is then ignored rather than failing the
    ///  whole message.
    pub fn parse(cursor: &mut FrameCursor) -> Option<OptionalData> {
        if cursor.is_empty() {
            return None;
        }
        check_image_data(cursor, Self::MAX_LEN)
            .ok()
            .and_then(OptionalData::new)
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.len()]
    }
}
