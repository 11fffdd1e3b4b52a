use bytes::Buf;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("frame truncated: needed {needed} bytes, {remaining} remaining")]
pub struct CursorError {
    pub needed: usize,
    pub remaining: usize,
}

macro_rules! get_try_impl {
    ($try_getter: ident, $ty:ty, $getter: ident) => {
        pub fn $try_getter(&mut self) -> Result<$ty, CursorError> {
            self.ensure(size_of::<$ty>())?;
            Ok(self.buf.$getter())
        }
    }
}

/// Read cursor over an inbound frame. Every read is bounds-checked and fails with a
///  [CursorError] rather than reading past the end of the frame. All multi-byte values are
///  little endian on the NSP wire.
#[derive(Debug, Clone)]
pub struct FrameCursor<'a> {
    buf: &'a [u8],
}

impl<'a> FrameCursor<'a> {
    pub fn new(buf: &'a [u8]) -> FrameCursor<'a> {
        FrameCursor { buf }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// the unread rest of the frame, without consuming it
    pub fn rest(&self) -> &'a [u8] {
        self.buf
    }

    fn ensure(&self, needed: usize) -> Result<(), CursorError> {
        if self.buf.len() < needed {
            return Err(CursorError { needed, remaining: self.buf.len() });
        }
        Ok(())
    }

    get_try_impl!(read_u8, u8, get_u8);
    get_try_impl!(read_i8, i8, get_i8);
    get_try_impl!(read_u16_le, u16, get_u16_le);

    pub fn peek_u16_le(&self) -> Result<u16, CursorError> {
        self.clone().read_u16_le()
    }

    pub fn take(&mut self, n: usize) -> Result<&'a [u8], CursorError> {
        self.ensure(n)?;
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    pub fn skip(&mut self, n: usize) -> Result<(), CursorError> {
        self.take(n).map(|_| ())
    }
}
