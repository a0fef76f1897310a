use bytes::{Buf, Bytes, BytesMut};

/// Received frame bytes, consumed front to back while decoding.
#[derive(Debug, Clone, Default)]
pub struct Payload(Bytes);

impl Payload {
    pub fn advance(&mut self, offset: usize) {
        self.0.advance(offset.min(self.0.len()));
    }
}

impl std::ops::Deref for Payload {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Bytes> for Payload {
    fn from(value: Bytes) -> Self {
        Self(value)
    }
}

impl From<BytesMut> for Payload {
    fn from(value: BytesMut) -> Self {
        Self(value.freeze())
    }
}

impl From<&[u8]> for Payload {
    fn from(value: &[u8]) -> Self {
        Self(Bytes::copy_from_slice(value))
    }
}
